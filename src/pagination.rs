//! Keyset pagination - opaque page tokens and the paginated read response.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::projection::Projection;

/// Page size used when a request carries no usable limit.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Error decoding an opaque page token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorError {
    pub message: String,
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid page token: {}", self.message)
    }
}

impl std::error::Error for CursorError {}

/// Token contents as they appear on the wire, before normalization.
#[derive(Serialize, Deserialize)]
struct WireCursor {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(rename = "startAfter", default)]
    start_after: Option<String>,
}

/// One page of a keyset scan: how many rows, starting strictly after which
/// code. An empty `start_after` means "from the beginning".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationRequest {
    pub limit: usize,
    pub start_after: String,
}

impl Default for PaginationRequest {
    fn default() -> Self {
        PaginationRequest {
            limit: DEFAULT_PAGE_SIZE,
            start_after: String::new(),
        }
    }
}

impl PaginationRequest {
    /// Build a request, replacing a non-positive limit with the default.
    pub fn new(limit: i64, start_after: impl Into<String>) -> Self {
        PaginationRequest {
            limit: if limit > 0 {
                limit as usize
            } else {
                DEFAULT_PAGE_SIZE
            },
            start_after: start_after.into(),
        }
    }

    /// Encode as an opaque token: URL-safe base64 over the JSON cursor.
    pub fn encode(&self) -> String {
        let wire = WireCursor {
            limit: Some(self.limit as i64),
            start_after: Some(self.start_after.clone()),
        };
        // Serializing a two-field struct cannot fail.
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode an opaque token. An empty token is the default first page;
    /// missing or non-positive fields are normalized.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        if token.is_empty() {
            return Ok(PaginationRequest::default());
        }

        let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|e| CursorError {
            message: e.to_string(),
        })?;
        let wire: WireCursor = serde_json::from_slice(&bytes).map_err(|e| CursorError {
            message: e.to_string(),
        })?;

        Ok(PaginationRequest::new(
            wire.limit.unwrap_or(0),
            wire.start_after.unwrap_or_default(),
        ))
    }
}

/// Where the next page starts, and whether one exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationResponse {
    pub next: PaginationRequest,
    pub has_more: bool,
}

/// Result of a paginated read.
///
/// `current_date_time` is set only when the caller supplied no modified-since
/// window: it anchors an "as-of" instant the caller can feed back as the next
/// call's window. When the caller already pinned a window it stays `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct FindAllResponse {
    pub results: Vec<Projection>,
    pub pagination: PaginationResponse,
    pub current_date_time: Option<DateTime<Utc>>,
}
