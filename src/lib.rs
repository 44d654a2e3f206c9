//! catalog_sync - projection synchronization for commerce catalogs.
//!
//! Maintains denormalized, versioned snapshots (projections) of catalog
//! entities for downstream consumers. The [`CatalogSyncEngine`] decides
//! whether a write is a no-op by content hash, archives superseded versions,
//! retries contended writes with a bounded budget, cascades category deletes
//! one hop to the parent, and publishes change notifications after every
//! content-changing write.
//!
//! Persistence, archival, time, and event publication are all consumed
//! through narrow traits; in-memory reference implementations back tests and
//! development.

mod clock;
mod converter;
mod engine;
mod error;
mod identity;
mod notify;
mod pagination;
mod projection;
mod record;
mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use converter::{Converter, JsonConverter};
pub use engine::{
    event_type_for, CatalogSyncEngine, DEFAULT_MODIFIED_SINCE_OFFSET_MINUTES, MAX_WRITE_ATTEMPTS,
};
pub use error::SyncError;
pub use identity::{NameIdentity, ValidationError};
#[cfg(feature = "emitter")]
pub use notify::EmitterNotifier;
pub use notify::{ChangeNotification, ChangeNotifier, LogNotifier, NotifyError, EVENT_AGGREGATE};
pub use pagination::{
    CursorError, FindAllResponse, PaginationRequest, PaginationResponse, DEFAULT_PAGE_SIZE,
};
pub use projection::{ModifiedSince, Projection, CATEGORY_KIND};
pub use record::{HistoryRecord, ProjectionRecord};
pub use store::{
    HistoryStore, InMemoryHistoryStore, InMemoryProjectionStore, ProjectionStore, StoreError,
};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
