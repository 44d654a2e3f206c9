//! CatalogSyncEngine - the projection synchronization orchestrator.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::converter::Converter;
use crate::error::SyncError;
use crate::identity::NameIdentity;
use crate::notify::{ChangeNotification, ChangeNotifier, EVENT_AGGREGATE};
use crate::pagination::{FindAllResponse, PaginationRequest, PaginationResponse};
use crate::projection::{ModifiedSince, Projection, CATEGORY_KIND};
use crate::record::ProjectionRecord;
use crate::store::{HistoryStore, ProjectionStore};

/// Total attempts allowed per logical write: the first try plus two retries.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Offset applied to a modified-since bound when the caller supplies none,
/// in minutes.
pub const DEFAULT_MODIFIED_SINCE_OFFSET_MINUTES: i64 = 30;

/// Orchestrates projection writes and reads over pluggable stores.
///
/// The engine holds no mutable shared state; any number of threads may call
/// it concurrently. Contention is handled entirely through the store's
/// optimistic primitives, recovered with a synchronous, bounded retry —
/// never an in-process lock.
pub struct CatalogSyncEngine<S, H, V, N, C> {
    store: S,
    history: H,
    converter: V,
    notifier: N,
    clock: C,
    modified_since_offset: i64,
}

impl<S, H, V, N, C> CatalogSyncEngine<S, H, V, N, C>
where
    S: ProjectionStore,
    H: HistoryStore,
    V: Converter,
    N: ChangeNotifier,
    C: Clock,
{
    pub fn new(store: S, history: H, converter: V, notifier: N, clock: C) -> Self {
        CatalogSyncEngine {
            store,
            history,
            converter,
            notifier,
            clock,
            modified_since_offset: DEFAULT_MODIFIED_SINCE_OFFSET_MINUTES,
        }
    }

    /// Override the default modified-since offset (minutes).
    pub fn with_modified_since_offset(mut self, minutes: i64) -> Self {
        self.modified_since_offset = minutes;
        self
    }

    /// Save a new projection or update an existing one.
    ///
    /// Returns `Ok(true)` iff a row was actually written. An unchanged content
    /// hash is a no-op: nothing is written, nothing is published, and the
    /// result is `Ok(false)`.
    pub fn save_or_update(&self, projection: &Projection) -> Result<bool, SyncError> {
        projection.identity.validate()?;
        self.with_write_retry(|| self.try_save_or_update(projection))
    }

    /// One attempt: look up, compare hashes, write, then archive.
    ///
    /// A duplicate-key insert or a stale-version update surfaces as a conflict
    /// the retry loop catches; the next attempt re-reads and recomputes, so an
    /// insert race naturally falls back to the update path. The archived
    /// snapshot is staged before the write but appended only after it commits,
    /// so a conflicted attempt leaves no history behind and a successful write
    /// archives exactly once.
    fn try_save_or_update(&self, projection: &Projection) -> Result<bool, SyncError> {
        let mut candidate = self.converter.to_record(projection)?;

        match self.store.get(&projection.identity)? {
            Some(current) => {
                if current.content_hash == candidate.content_hash {
                    return Ok(false);
                }
                let archived = self.converter.to_history(&current, self.clock.now());
                candidate.version = current.version;
                let written = self.store.write(&candidate)?;
                self.history.append(&archived)?;
                self.notify_record(&written)?;
                Ok(true)
            }
            None => {
                let written = self.store.write(&candidate)?;
                self.notify_record(&written)?;
                Ok(true)
            }
        }
    }

    /// Tombstone every live record for (kind, code), across stores.
    ///
    /// Each tombstone archives the pre-delete state and is written with the
    /// same retry discipline as [`save_or_update`](Self::save_or_update).
    /// Deleting a category with a parent removes the code from the parent's
    /// child list and re-saves the parent — a single-hop cascade.
    pub fn delete(&self, kind: &str, code: &str) -> Result<(), SyncError> {
        if kind.is_empty() {
            return Err(SyncError::Validation {
                reason: "type must not be empty".into(),
            });
        }
        if code.is_empty() {
            return Err(SyncError::Validation {
                reason: "code must not be empty".into(),
            });
        }

        let live = self.store.get_all_not_deleted(kind, code)?;
        if live.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let mut parents = BTreeSet::new();

        for record in &live {
            if kind == CATEGORY_KIND {
                let projection = self.converter.to_projection(record)?;
                if let Some(parent) = projection.parent {
                    parents.insert(parent);
                }
            }
            // Publish-after-write per store: a later store's failure must not
            // swallow the notification for a tombstone that already committed.
            let written = self.with_write_retry(|| self.try_tombstone(&record.identity, now))?;
            if written {
                self.publish_change(
                    kind,
                    &record.identity.store,
                    vec![record.identity.code.clone()],
                    now,
                )?;
            }
        }

        for parent in parents {
            self.detach_child(&parent, code, now)?;
        }

        Ok(())
    }

    /// One tombstone attempt. Re-reads the current row so a retry after a
    /// stale-version conflict operates on the latest state; a row another
    /// writer already tombstoned needs no further work. Returns whether a
    /// tombstone was actually written. As in
    /// [`try_save_or_update`](Self::try_save_or_update), the archive lands
    /// only after the write commits.
    fn try_tombstone(&self, identity: &NameIdentity, at: DateTime<Utc>) -> Result<bool, SyncError> {
        let current = match self.store.get(identity)? {
            Some(record) if !record.deleted => record,
            _ => return Ok(false),
        };

        let archived = self.converter.to_history(&current, at);
        let tombstone = self.converter.to_tombstone(&current, at);
        self.store.write(&tombstone)?;
        self.history.append(&archived)?;
        Ok(true)
    }

    /// Remove `child` from every live parent projection's child list and
    /// re-save it through the normal save path, which archives, versions,
    /// and notifies the parent change.
    fn detach_child(
        &self,
        parent_code: &str,
        child: &str,
        at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let parents = self.store.get_all_not_deleted(CATEGORY_KIND, parent_code)?;

        for record in parents {
            let mut parent = self.converter.to_projection(&record)?;
            let before = parent.children.len();
            parent.children.retain(|code| code != child);
            if parent.children.len() == before {
                continue;
            }
            parent.modified = at;
            self.save_or_update(&parent)?;
        }

        Ok(())
    }

    /// Read one projection. `None` when the key is absent or tombstoned:
    /// deletion is read-time invisible regardless of physical retention.
    pub fn read(
        &self,
        kind: &str,
        code: &str,
        store: &str,
    ) -> Result<Option<Projection>, SyncError> {
        let identity = NameIdentity::new(kind, code, store);
        match self.store.get(&identity)? {
            Some(record) if !record.deleted => Ok(Some(self.converter.to_projection(&record)?)),
            _ => Ok(None),
        }
    }

    /// All live store variants of one (kind, code).
    pub fn read_versions(&self, kind: &str, code: &str) -> Result<Vec<Projection>, SyncError> {
        self.store
            .get_all_not_deleted(kind, code)?
            .iter()
            .map(|record| self.converter.to_projection(record).map_err(SyncError::from))
            .collect()
    }

    /// Batch key lookup for one (kind, store); absent or tombstoned codes are
    /// silently skipped.
    pub fn read_by_codes(
        &self,
        kind: &str,
        store: &str,
        codes: &[String],
    ) -> Result<Vec<Projection>, SyncError> {
        let mut results = Vec::with_capacity(codes.len());
        for code in codes {
            if let Some(projection) = self.read(kind, code, store)? {
                results.push(projection);
            }
        }
        Ok(results)
    }

    /// Keyset-paginated read of live projections for one (kind, store),
    /// ordered by code.
    ///
    /// Scans `limit + 1` rows to probe for a further page; the probe row is
    /// discarded. Note that concurrent writers get no cross-page isolation:
    /// a row inserted between two page fetches may appear on neither, one,
    /// or both pages.
    pub fn read_all(
        &self,
        kind: &str,
        store: &str,
        pagination: &PaginationRequest,
        modified_since: Option<&ModifiedSince>,
    ) -> Result<FindAllResponse, SyncError> {
        let fetch = pagination.limit.saturating_add(1);
        let rows = match modified_since {
            None => self
                .store
                .range_scan(kind, store, fetch, &pagination.start_after)?,
            Some(window) => self.store.range_scan_modified_since(
                kind,
                store,
                fetch,
                &pagination.start_after,
                window.effective(self.modified_since_offset),
            )?,
        };

        let has_more = rows.len() > pagination.limit;
        let page = &rows[..rows.len().min(pagination.limit)];
        let results = page
            .iter()
            .map(|record| self.converter.to_projection(record).map_err(SyncError::from))
            .collect::<Result<Vec<_>, _>>()?;

        let next = if has_more {
            PaginationRequest {
                limit: pagination.limit,
                start_after: results
                    .last()
                    .map(|p| p.identity.code.clone())
                    .unwrap_or_default(),
            }
        } else {
            PaginationRequest {
                limit: pagination.limit,
                start_after: String::new(),
            }
        };

        // The as-of anchor is only meaningful when the caller has not already
        // pinned a modified-since window of their own.
        let current_date_time = match modified_since {
            None => Some(self.clock.now()),
            Some(_) => None,
        };

        Ok(FindAllResponse {
            results,
            pagination: PaginationResponse { next, has_more },
            current_date_time,
        })
    }

    /// Run one logical write with the shared retry budget. Only the store's
    /// concurrency-conflict signals are retried; everything else propagates
    /// on the spot.
    fn with_write_retry<T>(
        &self,
        mut attempt: impl FnMut() -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let mut attempts = 0;
        loop {
            match attempt() {
                Err(SyncError::Store(err)) if err.is_conflict() => {
                    attempts += 1;
                    if attempts >= MAX_WRITE_ATTEMPTS {
                        return Err(SyncError::OverflowAttempts {
                            attempts,
                            last: err,
                        });
                    }
                }
                outcome => return outcome,
            }
        }
    }

    fn notify_record(&self, record: &ProjectionRecord) -> Result<(), SyncError> {
        self.publish_change(
            &record.identity.kind,
            &record.identity.store,
            vec![record.identity.code.clone()],
            record.modified,
        )
    }

    /// Publish-after-write: by the time this runs the row is durable, so a
    /// publish failure surfaces separately and never unwinds the write.
    fn publish_change(
        &self,
        kind: &str,
        store: &str,
        codes: Vec<String>,
        at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let event_type = event_type_for(kind);
        let notification = ChangeNotification {
            kind: kind.to_string(),
            store: store.to_string(),
            modified_date_time: at,
            codes,
        };
        self.notifier
            .publish(&event_type, EVENT_AGGREGATE, &notification)
            .map_err(|err| SyncError::PublishFailed {
                event_type,
                reason: err.to_string(),
            })
    }
}

/// Event type published for changes to projections of `kind`.
pub fn event_type_for(kind: &str) -> String {
    format!("catalog.{}.changed", kind)
}
