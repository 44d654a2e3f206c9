//! In-memory reference stores for testing and development.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::{HistoryStore, ProjectionStore, StoreError};
use crate::identity::NameIdentity;
use crate::record::{HistoryRecord, ProjectionRecord};

/// Ordering key: (kind, store, code), so a scan over one (kind, store) pair
/// walks codes in ascending order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RecordKey {
    kind: String,
    store: String,
    code: String,
}

impl RecordKey {
    fn of(identity: &NameIdentity) -> Self {
        RecordKey {
            kind: identity.kind.clone(),
            store: identity.store.clone(),
            code: identity.code.clone(),
        }
    }
}

/// BTreeMap-backed projection store. Clone-friendly via Arc; clones share
/// storage.
#[derive(Clone, Default)]
pub struct InMemoryProjectionStore {
    records: Arc<RwLock<BTreeMap<RecordKey, ProjectionRecord>>>,
}

impl InMemoryProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, tombstones included.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn scan(
        &self,
        kind: &str,
        store: &str,
        limit: usize,
        start_after: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ProjectionRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))?;

        let from = RecordKey {
            kind: kind.to_string(),
            store: store.to_string(),
            code: start_after.to_string(),
        };

        let results = records
            .range((Bound::Excluded(from), Bound::Unbounded))
            .take_while(|(key, _)| key.kind == kind && key.store == store)
            .filter(|(_, record)| !record.deleted)
            .filter(|(_, record)| since.map_or(true, |bound| record.modified >= bound))
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect();

        Ok(results)
    }
}

impl ProjectionStore for InMemoryProjectionStore {
    fn get(&self, identity: &NameIdentity) -> Result<Option<ProjectionRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))?;

        Ok(records.get(&RecordKey::of(identity)).cloned())
    }

    fn get_all_not_deleted(
        &self,
        kind: &str,
        code: &str,
    ) -> Result<Vec<ProjectionRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))?;

        Ok(records
            .values()
            .filter(|record| {
                record.identity.kind == kind && record.identity.code == code && !record.deleted
            })
            .cloned()
            .collect())
    }

    fn range_scan(
        &self,
        kind: &str,
        store: &str,
        limit: usize,
        start_after: &str,
    ) -> Result<Vec<ProjectionRecord>, StoreError> {
        self.scan(kind, store, limit, start_after, None)
    }

    fn range_scan_modified_since(
        &self,
        kind: &str,
        store: &str,
        limit: usize,
        start_after: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProjectionRecord>, StoreError> {
        self.scan(kind, store, limit, start_after, Some(since))
    }

    fn write(&self, record: &ProjectionRecord) -> Result<ProjectionRecord, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))?;

        let key = RecordKey::of(&record.identity);

        if record.is_new() {
            if records.contains_key(&key) {
                return Err(StoreError::DuplicateKey {
                    identity: record.identity.clone(),
                });
            }
            let mut stored = record.clone();
            stored.version = 1;
            records.insert(key, stored.clone());
            return Ok(stored);
        }

        let actual = records.get(&key).map(|r| r.version).unwrap_or(0);
        if actual != record.version {
            return Err(StoreError::StaleVersion {
                identity: record.identity.clone(),
                expected: record.version,
                actual,
            });
        }

        let mut stored = record.clone();
        stored.version = actual + 1;
        records.insert(key, stored.clone());
        Ok(stored)
    }
}

/// Vec-backed history archive with query helpers for tests.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    entries: Arc<RwLock<Vec<HistoryRecord>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<HistoryRecord> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Archived snapshots for one identity, in append order.
    pub fn for_key(&self, identity: &NameIdentity) -> Vec<HistoryRecord> {
        self.all()
            .into_iter()
            .filter(|record| &record.identity == identity)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))?;

        entries.push(record.clone());
        Ok(())
    }
}
