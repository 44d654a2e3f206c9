//! Persisted and archived forms of a projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::NameIdentity;

/// The stored form of a projection.
///
/// `content` is the canonical JSON envelope the content hash is computed over;
/// `version` is the store's optimistic token. A version of `0` means the record
/// has never been persisted: the store treats the write as an insert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRecord {
    pub identity: NameIdentity,
    pub content: Value,
    pub content_hash: String,
    pub modified: DateTime<Utc>,
    pub deleted: bool,
    pub version: u64,
}

impl ProjectionRecord {
    /// True when the record has never been written to a store.
    pub fn is_new(&self) -> bool {
        self.version == 0
    }
}

/// Immutable snapshot of a [`ProjectionRecord`] taken immediately before it is
/// overwritten or tombstoned. Keyed by (kind, code, store, archived_at).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub identity: NameIdentity,
    pub content: Value,
    pub content_hash: String,
    pub modified: DateTime<Utc>,
    pub deleted: bool,
    pub archived_at: DateTime<Utc>,
}
