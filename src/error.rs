//! SyncError - the engine's caller-facing error taxonomy.

use std::fmt;

use crate::identity::ValidationError;
use crate::store::StoreError;

/// Errors surfaced by [`CatalogSyncEngine`](crate::CatalogSyncEngine).
///
/// Absent records are not errors; reads return `Option` or shorter vectors.
/// Concurrency conflicts are recovered internally and never appear here
/// directly — only as the `last` cause of an exhausted retry budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncError {
    /// Malformed identity. Fatal, never retried.
    Validation { reason: String },
    /// The write-retry budget was exhausted under sustained contention.
    /// Callers must treat this as a request-level failure, not auto-retry.
    OverflowAttempts { attempts: usize, last: StoreError },
    /// Non-conflict store failure, propagated unchanged.
    Store(StoreError),
    /// The store write committed but the change notification did not go out.
    /// The write stands; delivery downstream is at-least-once.
    PublishFailed { event_type: String, reason: String },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Validation { reason } => write!(f, "validation failed: {}", reason),
            SyncError::OverflowAttempts { attempts, last } => write!(
                f,
                "write retry budget exhausted after {} attempts: {}",
                attempts, last
            ),
            SyncError::Store(err) => write!(f, "{}", err),
            SyncError::PublishFailed { event_type, reason } => write!(
                f,
                "committed write but failed to publish {}: {}",
                event_type, reason
            ),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Store(err)
    }
}

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::Validation { reason: err.reason }
    }
}
