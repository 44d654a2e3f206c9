//! Change notifications - published after every content-changing write.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate name carried on every published catalog event.
pub const EVENT_AGGREGATE: &str = "AGGREGATE";

/// Describes one change for downstream indexers and consumers.
///
/// Serializes with the wire keys the catalog event contract uses:
/// `type`, `store`, `modifiedDateTime` (ISO-8601 offset date-time, UTC),
/// and `codes`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub store: String,
    #[serde(rename = "modifiedDateTime")]
    pub modified_date_time: DateTime<Utc>,
    pub codes: Vec<String>,
}

/// Error publishing a notification.
///
/// A publish failure never unwinds the store write it follows; the engine
/// surfaces it separately once the write is durable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotifyError {
    BufferPoisoned,
    Publish(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::BufferPoisoned => write!(f, "notification buffer poisoned"),
            NotifyError::Publish(message) => write!(f, "publish failed: {}", message),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Publishes change events to downstream consumers.
pub trait ChangeNotifier: Send + Sync {
    fn publish(
        &self,
        event_type: &str,
        aggregate: &str,
        notification: &ChangeNotification,
    ) -> Result<(), NotifyError>;
}

/// A notifier that logs events to stdout, or captures them in a shared buffer
/// for assertions.
pub struct LogNotifier {
    buffer: Option<Arc<Mutex<Vec<(String, ChangeNotification)>>>>,
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LogNotifier {
    pub fn new() -> Self {
        LogNotifier { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<(String, ChangeNotification)>>>) -> Self {
        LogNotifier {
            buffer: Some(buffer),
        }
    }
}

impl ChangeNotifier for LogNotifier {
    fn publish(
        &self,
        event_type: &str,
        aggregate: &str,
        notification: &ChangeNotification,
    ) -> Result<(), NotifyError> {
        if let Some(buffer) = &self.buffer {
            let mut buffer = buffer.lock().map_err(|_| NotifyError::BufferPoisoned)?;
            buffer.push((event_type.to_string(), notification.clone()));
        } else {
            let data = serde_json::to_string(notification)
                .map_err(|e| NotifyError::Publish(e.to_string()))?;
            println!("[CATALOG] {} {} {}", event_type, aggregate, data);
        }
        Ok(())
    }
}

/// A notifier that emits events via an EventEmitter for in-process
/// subscribers. The payload handed to subscribers is the notification's JSON.
#[cfg(feature = "emitter")]
pub struct EmitterNotifier {
    emitter: Mutex<event_emitter_rs::EventEmitter>,
}

#[cfg(feature = "emitter")]
impl EmitterNotifier {
    pub fn new(emitter: event_emitter_rs::EventEmitter) -> Self {
        EmitterNotifier {
            emitter: Mutex::new(emitter),
        }
    }
}

#[cfg(feature = "emitter")]
impl ChangeNotifier for EmitterNotifier {
    fn publish(
        &self,
        event_type: &str,
        _aggregate: &str,
        notification: &ChangeNotification,
    ) -> Result<(), NotifyError> {
        let data = serde_json::to_string(notification)
            .map_err(|e| NotifyError::Publish(e.to_string()))?;
        let mut emitter = self.emitter.lock().map_err(|_| NotifyError::BufferPoisoned)?;
        emitter.emit(event_type, data);
        Ok(())
    }
}
