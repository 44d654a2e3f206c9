//! Converter - maps domain projections to and from their persisted forms.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::projection::Projection;
use crate::record::{HistoryRecord, ProjectionRecord};
use crate::store::StoreError;

/// Maps Projection ⇄ ProjectionRecord ⇄ HistoryRecord.
///
/// The converter owns the content-hash computation: two projections with the
/// same payload and adjacency must produce records with the same hash, since
/// the engine uses hash equality to skip no-op writes.
pub trait Converter: Send + Sync {
    fn to_record(&self, projection: &Projection) -> Result<ProjectionRecord, StoreError>;

    fn to_projection(&self, record: &ProjectionRecord) -> Result<Projection, StoreError>;

    /// Snapshot a record into the archive form, stamped with the archival time.
    fn to_history(&self, record: &ProjectionRecord, archived_at: DateTime<Utc>) -> HistoryRecord;

    /// Tombstone a record: content and hash cleared, `deleted` set, `modified`
    /// set to the delete time. Identity and version survive so the write is
    /// still version-checked.
    fn to_tombstone(&self, record: &ProjectionRecord, at: DateTime<Utc>) -> ProjectionRecord;
}

/// The canonical content envelope the hash is computed over. Field order is
/// fixed by the struct, so equal envelopes serialize to equal bytes.
#[derive(Serialize, Deserialize)]
struct ContentEnvelope {
    payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<String>,
}

/// Default converter: canonical JSON content, SHA-256 content hash rendered
/// as base64.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonConverter;

impl JsonConverter {
    pub fn new() -> Self {
        JsonConverter
    }

    fn hash(content_bytes: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        STANDARD.encode(Sha256::digest(content_bytes))
    }
}

impl Converter for JsonConverter {
    fn to_record(&self, projection: &Projection) -> Result<ProjectionRecord, StoreError> {
        let envelope = ContentEnvelope {
            payload: projection.payload.clone(),
            parent: projection.parent.clone(),
            children: projection.children.clone(),
        };
        let bytes =
            serde_json::to_vec(&envelope).map_err(|e| StoreError::Serde(e.to_string()))?;
        let content =
            serde_json::to_value(&envelope).map_err(|e| StoreError::Serde(e.to_string()))?;

        Ok(ProjectionRecord {
            identity: projection.identity.clone(),
            content,
            content_hash: Self::hash(&bytes),
            modified: projection.modified,
            deleted: projection.deleted,
            version: 0,
        })
    }

    fn to_projection(&self, record: &ProjectionRecord) -> Result<Projection, StoreError> {
        let envelope: ContentEnvelope = if record.content.is_null() {
            ContentEnvelope {
                payload: Value::Null,
                parent: None,
                children: Vec::new(),
            }
        } else {
            serde_json::from_value(record.content.clone())
                .map_err(|e| StoreError::Serde(e.to_string()))?
        };

        Ok(Projection {
            identity: record.identity.clone(),
            payload: envelope.payload,
            parent: envelope.parent,
            children: envelope.children,
            modified: record.modified,
            deleted: record.deleted,
        })
    }

    fn to_history(&self, record: &ProjectionRecord, archived_at: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            identity: record.identity.clone(),
            content: record.content.clone(),
            content_hash: record.content_hash.clone(),
            modified: record.modified,
            deleted: record.deleted,
            archived_at,
        }
    }

    fn to_tombstone(&self, record: &ProjectionRecord, at: DateTime<Utc>) -> ProjectionRecord {
        ProjectionRecord {
            identity: record.identity.clone(),
            content: Value::Null,
            content_hash: String::new(),
            modified: at,
            deleted: true,
            version: record.version,
        }
    }
}
