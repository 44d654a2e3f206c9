//! Store seams - persistence traits the engine drives, and their error type.

mod in_memory;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::identity::NameIdentity;
use crate::record::{HistoryRecord, ProjectionRecord};

/// Error type for store operations.
///
/// The two conflict variants are the store's optimistic-concurrency signals;
/// the engine recovers from them with a bounded retry. Everything else is
/// fatal and propagates unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// An insert raced another writer that created the row first.
    DuplicateKey { identity: NameIdentity },
    /// A version-checked write lost against a concurrent update.
    StaleVersion {
        identity: NameIdentity,
        expected: u64,
        actual: u64,
    },
    /// Storage-level failure.
    Storage(String),
    /// Serialization/deserialization failure.
    Serde(String),
}

impl StoreError {
    /// True for the concurrency-conflict signals the engine may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::DuplicateKey { .. } | StoreError::StaleVersion { .. }
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateKey { identity } => {
                write!(f, "duplicate key on insert for {}", identity)
            }
            StoreError::StaleVersion {
                identity,
                expected,
                actual,
            } => write!(
                f,
                "stale version for {} (expected {}, actual {})",
                identity, expected, actual
            ),
            StoreError::Storage(message) => write!(f, "store error: {}", message),
            StoreError::Serde(message) => write!(f, "store serialization error: {}", message),
        }
    }
}

impl std::error::Error for StoreError {}

/// Key-value persistence for projection records with optimistic concurrency
/// and code-ordered range scans.
pub trait ProjectionStore: Send + Sync {
    /// Get the record for an identity, tombstoned or not. None if absent.
    fn get(&self, identity: &NameIdentity) -> Result<Option<ProjectionRecord>, StoreError>;

    /// All not-deleted records for (kind, code), across stores.
    fn get_all_not_deleted(
        &self,
        kind: &str,
        code: &str,
    ) -> Result<Vec<ProjectionRecord>, StoreError>;

    /// Up to `limit` not-deleted records for (kind, store), ordered by code,
    /// strictly after `start_after`.
    fn range_scan(
        &self,
        kind: &str,
        store: &str,
        limit: usize,
        start_after: &str,
    ) -> Result<Vec<ProjectionRecord>, StoreError>;

    /// Same as [`range_scan`](ProjectionStore::range_scan), additionally
    /// bounded to records with `modified >= since`.
    fn range_scan_modified_since(
        &self,
        kind: &str,
        store: &str,
        limit: usize,
        start_after: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProjectionRecord>, StoreError>;

    /// Persist a record and return it with its new version.
    ///
    /// `version == 0` is an insert: an existing row is a
    /// [`StoreError::DuplicateKey`]. Any other version is a compare-and-swap:
    /// a mismatch is a [`StoreError::StaleVersion`].
    fn write(&self, record: &ProjectionRecord) -> Result<ProjectionRecord, StoreError>;
}

/// Append-only archive of superseded projection versions.
pub trait HistoryStore: Send + Sync {
    /// Append one archived snapshot. A failure here aborts the logical write
    /// attempt it belongs to; the engine retries history and primary write
    /// together, never independently.
    fn append(&self, record: &HistoryRecord) -> Result<(), StoreError>;
}

pub use in_memory::{InMemoryHistoryStore, InMemoryProjectionStore};
