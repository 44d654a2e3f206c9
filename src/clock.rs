//! Clock - injectable time source for deterministic tests.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

/// Supplies the current time to the engine.
///
/// Every timestamp the engine persists or publishes flows through this trait,
/// so tests can pin time with [`FixedClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a configurable instant. Clone-friendly via Arc; clones
/// share the same instant, so advancing one advances all.
#[derive(Clone)]
pub struct FixedClock {
    instant: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        FixedClock {
            instant: Arc::new(RwLock::new(instant)),
        }
    }

    /// Move the clock to a new instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut current) = self.instant.write() {
            *current = instant;
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut current) = self.instant.write() {
            *current = *current + by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
            .read()
            .map(|instant| *instant)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}
