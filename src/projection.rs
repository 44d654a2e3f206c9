//! Projection - a denormalized, versioned snapshot of a domain entity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::NameIdentity;

/// Projection type whose deletes cascade one hop to the parent projection.
pub const CATEGORY_KIND: &str = "category";

/// A denormalized snapshot of a commerce entity, intended for downstream
/// consumers (search indexers, read-only APIs).
///
/// Hierarchical projections carry their graph adjacency explicitly: `parent`
/// is the code of the parent projection of the same kind, `children` the codes
/// of direct children. Both participate in the content hash, so a change in
/// either is a content change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub identity: NameIdentity,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl Projection {
    pub fn new(identity: NameIdentity, payload: Value, modified: DateTime<Utc>) -> Self {
        Projection {
            identity,
            payload,
            parent: None,
            children: Vec::new(),
            modified,
            deleted: false,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = children;
        self
    }
}

/// A caller-supplied lower bound on `modified` for paginated reads.
///
/// The effective bound is `instant - offset_minutes`; the offset compensates
/// for clock skew between the caller's anchor and the store's write times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModifiedSince {
    pub instant: DateTime<Utc>,
    pub offset_minutes: Option<i64>,
}

impl ModifiedSince {
    pub fn new(instant: DateTime<Utc>) -> Self {
        ModifiedSince {
            instant,
            offset_minutes: None,
        }
    }

    pub fn with_offset_minutes(mut self, minutes: i64) -> Self {
        self.offset_minutes = Some(minutes);
        self
    }

    /// The bound actually applied to the scan, falling back to the engine's
    /// default offset when the caller supplied none.
    pub fn effective(&self, default_offset_minutes: i64) -> DateTime<Utc> {
        let offset = self.offset_minutes.unwrap_or(default_offset_minutes);
        self.instant - Duration::minutes(offset)
    }
}
