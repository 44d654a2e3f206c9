//! NameIdentity - the (type, code, store) key that identifies a projection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error raised when an identity is missing one of its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid projection identity: {}", self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// The logical identity of a projection.
///
/// `kind` is the projection type ("category", "option", "offer", ...); `code`
/// is the natural key within that type; `store` scopes the projection to one
/// storefront. The same identity is used across the store, history, and
/// notification seams.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameIdentity {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
    pub store: String,
}

impl NameIdentity {
    pub fn new(
        kind: impl Into<String>,
        code: impl Into<String>,
        store: impl Into<String>,
    ) -> Self {
        NameIdentity {
            kind: kind.into(),
            code: code.into(),
            store: store.into(),
        }
    }

    /// Check that every part of the identity is present.
    ///
    /// A malformed identity is fatal to the caller; it is never retried.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.kind.is_empty() {
            return Err(ValidationError {
                reason: "type must not be empty".into(),
            });
        }
        if self.code.is_empty() {
            return Err(ValidationError {
                reason: "code must not be empty".into(),
            });
        }
        if self.store.is_empty() {
            return Err(ValidationError {
                reason: "store must not be empty".into(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for NameIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.code, self.store)
    }
}
