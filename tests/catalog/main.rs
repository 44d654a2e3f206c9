//! Integration tests for the catalog sync engine over the in-memory stores.


use catalog_sync::{
    CatalogSyncEngine, Clock, FixedClock, InMemoryHistoryStore, JsonConverter, LogNotifier,
    ModifiedSince, PaginationRequest, SyncError, MAX_WRITE_ATTEMPTS,
};
use chrono::Duration;
use serde_json::json;
use std::sync::{Arc, Mutex};
use support::{
    category, epoch, harness, projection, CapturedEvents, ConflictingStore, StorePinnedConflicts,
};

#[test]
fn idempotent_resave_leaves_one_history_record() {
    let h = harness();
    let v1 = projection("option", "color", "s1", json!({"values": ["red"]}));
    let v2 = projection("option", "color", "s1", json!({"values": ["red", "blue"]}));

    assert!(h.engine.save_or_update(&v1).unwrap());
    assert!(h.engine.save_or_update(&v2).unwrap());
    assert!(!h.engine.save_or_update(&v2).unwrap());

    assert_eq!(h.history.len(), 1);
    assert_eq!(h.event_count(), 2);
}

#[test]
fn every_hash_change_archives_and_notifies_exactly_once() {
    let h = harness();
    for (i, values) in [json!(["a"]), json!(["a", "b"]), json!(["a", "b", "c"])]
        .iter()
        .enumerate()
    {
        h.engine
            .save_or_update(&projection("option", "size", "s1", json!({"values": values})))
            .unwrap();
        assert_eq!(h.history.len(), i); // first save is an insert, no archive
        assert_eq!(h.event_count(), i + 1);
    }
}

#[test]
fn pagination_walks_six_entries_with_limit_five() {
    let h = harness();
    for code in ["A", "B", "C", "D", "E", "F"] {
        h.engine
            .save_or_update(&projection("option", code, "s1", json!({"code": code})))
            .unwrap();
    }

    let first = h
        .engine
        .read_all("option", "s1", &PaginationRequest::new(5, ""), None)
        .unwrap();
    let codes: Vec<_> = first
        .results
        .iter()
        .map(|p| p.identity.code.as_str())
        .collect();
    assert_eq!(codes, vec!["A", "B", "C", "D", "E"]);
    assert!(first.pagination.has_more);
    assert_eq!(first.pagination.next.start_after, "E");
    assert_eq!(first.pagination.next.limit, 5);

    let second = h
        .engine
        .read_all("option", "s1", &first.pagination.next, None)
        .unwrap();
    let codes: Vec<_> = second
        .results
        .iter()
        .map(|p| p.identity.code.as_str())
        .collect();
    assert_eq!(codes, vec!["F"]);
    assert!(!second.pagination.has_more);
    assert_eq!(second.pagination.next.start_after, "");
}

#[test]
fn pagination_mid_stream_start_after() {
    let h = harness();
    for code in ["A", "B", "C", "D", "E", "F"] {
        h.engine
            .save_or_update(&projection("option", code, "s1", json!({"code": code})))
            .unwrap();
    }

    let page = h
        .engine
        .read_all("option", "s1", &PaginationRequest::new(2, "B"), None)
        .unwrap();
    let codes: Vec<_> = page
        .results
        .iter()
        .map(|p| p.identity.code.as_str())
        .collect();
    assert_eq!(codes, vec!["C", "D"]);
    assert!(page.pagination.has_more);
    assert_eq!(page.pagination.next.start_after, "D");
}

#[test]
fn pagination_is_complete_without_duplicates() {
    let h = harness();
    let codes: Vec<String> = (0..23).map(|i| format!("code-{:02}", i)).collect();
    for code in &codes {
        h.engine
            .save_or_update(&projection("offer", code, "s1", json!({"code": code})))
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut request = PaginationRequest::new(4, "");
    loop {
        let page = h.engine.read_all("offer", "s1", &request, None).unwrap();
        seen.extend(page.results.iter().map(|p| p.identity.code.clone()));
        if !page.pagination.has_more {
            assert_eq!(page.pagination.next.start_after, "");
            break;
        }
        // Round-trip the cursor through its opaque token, as a caller would.
        let token = page.pagination.next.encode();
        request = PaginationRequest::decode(&token).unwrap();
    }

    assert_eq!(seen, codes);
}

#[test]
fn hand_built_maximum_limit_is_served_without_probe_overflow() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "A", "s1", json!({"v": 1})))
        .unwrap();

    // Callers can build the request directly, bypassing new()'s clamping.
    let request = PaginationRequest {
        limit: usize::MAX,
        start_after: String::new(),
    };
    let page = h.engine.read_all("option", "s1", &request, None).unwrap();
    assert_eq!(page.results.len(), 1);
    assert!(!page.pagination.has_more);
}

#[test]
fn final_page_with_exactly_limit_rows_reports_no_more() {
    let h = harness();
    for code in ["A", "B", "C", "D", "E", "F"] {
        h.engine
            .save_or_update(&projection("option", code, "s1", json!({"code": code})))
            .unwrap();
    }

    let second = h
        .engine
        .read_all("option", "s1", &PaginationRequest::new(3, "C"), None)
        .unwrap();
    assert_eq!(second.results.len(), 3);
    assert!(!second.pagination.has_more);
    assert_eq!(second.pagination.next.start_after, "");
}

#[test]
fn modified_since_window_bounds_the_scan() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "old", "s1", json!({"v": 1})))
        .unwrap();

    h.clock.advance(Duration::hours(2));
    let mut fresh = projection("option", "new", "s1", json!({"v": 2}));
    fresh.modified = h.clock.now();
    h.engine.save_or_update(&fresh).unwrap();

    let window = ModifiedSince::new(epoch() + Duration::hours(1)).with_offset_minutes(0);
    let page = h
        .engine
        .read_all("option", "s1", &PaginationRequest::default(), Some(&window))
        .unwrap();

    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].identity.code, "new");
    // Caller pinned the window, so no as-of anchor comes back.
    assert_eq!(page.current_date_time, None);
}

#[test]
fn modified_since_offset_widens_the_window() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "old", "s1", json!({"v": 1})))
        .unwrap();

    // Window starts an hour after the write, but a 90-minute offset reaches
    // back past it.
    let window = ModifiedSince::new(epoch() + Duration::hours(1)).with_offset_minutes(90);
    let page = h
        .engine
        .read_all("option", "s1", &PaginationRequest::default(), Some(&window))
        .unwrap();
    assert_eq!(page.results.len(), 1);
}

#[test]
fn unwindowed_read_anchors_as_of_time() {
    let h = harness();
    let page = h
        .engine
        .read_all("option", "s1", &PaginationRequest::default(), None)
        .unwrap();
    assert_eq!(page.current_date_time, Some(epoch()));
}

#[test]
fn delete_hides_every_store_variant() {
    let h = harness();
    for store in ["s1", "s2", "s3"] {
        h.engine
            .save_or_update(&projection("option", "color", store, json!({"v": 1})))
            .unwrap();
    }

    h.clock.advance(Duration::minutes(5));
    h.engine.delete("option", "color").unwrap();

    for store in ["s1", "s2", "s3"] {
        assert!(h.engine.read("option", "color", store).unwrap().is_none());
    }
    // Tombstoned, not removed: three archives, three live tombstones.
    assert_eq!(h.history.len(), 3);
    assert_eq!(h.store.len(), 3);

    // One notification per affected store, stamped with the delete time.
    let delete_time = epoch() + Duration::minutes(5);
    let delete_events: Vec<_> = h
        .events()
        .into_iter()
        .filter(|(_, n)| n.modified_date_time == delete_time)
        .collect();
    assert_eq!(delete_events.len(), 3);
    let mut stores: Vec<_> = delete_events.iter().map(|(_, n)| n.store.clone()).collect();
    stores.sort();
    assert_eq!(stores, vec!["s1", "s2", "s3"]);
}

#[test]
fn deleted_projection_survives_in_history() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 1})))
        .unwrap();
    h.engine.delete("option", "color").unwrap();

    let archived = h.history.all();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].content["payload"]["v"], json!(1));
    assert!(!archived[0].deleted);
}

#[test]
fn resave_after_delete_revives_the_projection() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 1})))
        .unwrap();
    h.engine.delete("option", "color").unwrap();

    assert!(h
        .engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 2})))
        .unwrap());

    let revived = h.engine.read("option", "color", "s1").unwrap().unwrap();
    assert_eq!(revived.payload["v"], json!(2));
    // Archives: pre-delete state, then the tombstone itself.
    assert_eq!(h.history.len(), 2);
    assert!(h.history.all()[1].deleted);
}

#[test]
fn deleting_child_category_cascades_to_parent() {
    let h = harness();
    let parent = category("apparel", "s1").with_children(vec!["shirts".into(), "pants".into()]);
    let child = category("shirts", "s1").with_parent("apparel");
    h.engine.save_or_update(&parent).unwrap();
    h.engine.save_or_update(&child).unwrap();
    let history_before = h.history.len();
    let events_before = h.event_count();

    h.engine.delete("category", "shirts").unwrap();

    // Child tombstone archive plus the parent's superseded version.
    assert_eq!(h.history.len(), history_before + 2);
    // Parent change notification plus the delete notification.
    assert_eq!(h.event_count(), events_before + 2);

    let parent = h.engine.read("category", "apparel", "s1").unwrap().unwrap();
    assert_eq!(parent.children, vec!["pants"]);

    let parent_events: Vec<_> = h
        .events()
        .into_iter()
        .filter(|(_, n)| n.codes == vec!["apparel"])
        .collect();
    assert_eq!(parent_events.len(), 2); // initial save + cascade
}

#[test]
fn cascade_is_single_hop() {
    let h = harness();
    let grandparent = category("root", "s1").with_children(vec!["apparel".into()]);
    let parent = category("apparel", "s1")
        .with_parent("root")
        .with_children(vec!["shirts".into()]);
    let child = category("shirts", "s1").with_parent("apparel");
    h.engine.save_or_update(&grandparent).unwrap();
    h.engine.save_or_update(&parent).unwrap();
    h.engine.save_or_update(&child).unwrap();

    h.engine.delete("category", "shirts").unwrap();

    // The grandparent still lists the parent; only one hop was recomputed.
    let root = h.engine.read("category", "root", "s1").unwrap().unwrap();
    assert_eq!(root.children, vec!["apparel"]);
    let apparel = h.engine.read("category", "apparel", "s1").unwrap().unwrap();
    assert!(apparel.children.is_empty());
}

#[test]
fn delete_of_non_hierarchical_kind_does_not_cascade() {
    let h = harness();
    let option = projection("option", "color", "s1", json!({"v": 1})).with_parent("palette");
    h.engine.save_or_update(&option).unwrap();
    let events_before = h.event_count();

    h.engine.delete("option", "color").unwrap();

    // Only the delete notification; no parent re-save happened.
    assert_eq!(h.event_count(), events_before + 1);
}

fn contended_engine(
    store: ConflictingStore,
) -> (
    CatalogSyncEngine<ConflictingStore, InMemoryHistoryStore, JsonConverter, LogNotifier, FixedClock>,
    InMemoryHistoryStore,
) {
    let history = InMemoryHistoryStore::new();
    let engine = CatalogSyncEngine::new(
        store,
        history.clone(),
        JsonConverter::new(),
        LogNotifier::with_buffer(Arc::new(Mutex::new(Vec::new()))),
        FixedClock::new(epoch()),
    );
    (engine, history)
}

#[test]
fn one_stale_version_conflict_is_recovered() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 1})))
        .unwrap();

    let (engine, history) = contended_engine(ConflictingStore::stale_versions(h.store.clone(), 1));
    let changed = engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 2})))
        .unwrap();
    assert!(changed);

    let updated = h.engine.read("option", "color", "s1").unwrap().unwrap();
    assert_eq!(updated.payload["v"], json!(2));
    // The conflicted attempt must not archive: one write, one history record.
    assert_eq!(history.len(), 1);
}

#[test]
fn duplicate_key_insert_race_is_recovered() {
    let h = harness();
    let (engine, _) = contended_engine(ConflictingStore::duplicate_keys(h.store.clone(), 1));

    let changed = engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 1})))
        .unwrap();
    assert!(changed);
    assert!(h.engine.read("option", "color", "s1").unwrap().is_some());
}

#[test]
fn sustained_contention_overflows_and_writes_nothing() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 1})))
        .unwrap();

    let (engine, history) = contended_engine(ConflictingStore::stale_versions(
        h.store.clone(),
        MAX_WRITE_ATTEMPTS,
    ));
    let err = engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 2})))
        .unwrap_err();
    assert!(matches!(err, SyncError::OverflowAttempts { .. }));

    // The stored row is untouched by the failed attempts, and no orphan
    // archives were left behind.
    let current = h.engine.read("option", "color", "s1").unwrap().unwrap();
    assert_eq!(current.payload["v"], json!(1));
    assert!(history.is_empty());
}

#[test]
fn contended_delete_retries_and_succeeds() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 1})))
        .unwrap();

    let (engine, _) = contended_engine(ConflictingStore::stale_versions(h.store.clone(), 2));
    engine.delete("option", "color").unwrap();

    assert!(h.engine.read("option", "color", "s1").unwrap().is_none());
}

#[test]
fn contended_delete_overflows_at_the_budget() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 1})))
        .unwrap();

    let (engine, history) = contended_engine(ConflictingStore::stale_versions(
        h.store.clone(),
        MAX_WRITE_ATTEMPTS,
    ));
    let err = engine.delete("option", "color").unwrap_err();
    assert!(matches!(err, SyncError::OverflowAttempts { .. }));

    // Still live: the tombstone never landed, and nothing was archived.
    assert!(h.engine.read("option", "color", "s1").unwrap().is_some());
    assert!(history.is_empty());
}

#[test]
fn partially_failed_delete_notifies_the_committed_stores() {
    let h = harness();
    for store in ["s1", "s2"] {
        h.engine
            .save_or_update(&projection("option", "color", store, json!({"v": 1})))
            .unwrap();
    }

    let events: CapturedEvents = Arc::new(Mutex::new(Vec::new()));
    let history = InMemoryHistoryStore::new();
    let engine = CatalogSyncEngine::new(
        StorePinnedConflicts::new(h.store.clone(), "s2"),
        history.clone(),
        JsonConverter::new(),
        LogNotifier::with_buffer(events.clone()),
        FixedClock::new(epoch()),
    );

    let err = engine.delete("option", "color").unwrap_err();
    assert!(matches!(err, SyncError::OverflowAttempts { .. }));

    // s1's tombstone committed before s2 overflowed, so its notification and
    // archive are in place; s2 is untouched.
    let published = events.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1.store, "s1");
    assert_eq!(published[0].1.codes, vec!["color"]);
    assert!(h.engine.read("option", "color", "s1").unwrap().is_none());
    assert!(h.engine.read("option", "color", "s2").unwrap().is_some());
    assert_eq!(history.len(), 1);
    assert_eq!(history.all()[0].identity.store, "s1");

    // A retried delete picks up the remaining store and emits its event.
    let before = h.event_count();
    h.engine.delete("option", "color").unwrap();
    assert!(h.engine.read("option", "color", "s2").unwrap().is_none());
    assert_eq!(h.event_count(), before + 1);
    let (_, notification) = h.events().pop().unwrap();
    assert_eq!(notification.store, "s2");
}

#[test]
fn read_versions_spans_stores() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 1})))
        .unwrap();
    h.engine
        .save_or_update(&projection("option", "color", "s2", json!({"v": 2})))
        .unwrap();
    h.engine
        .save_or_update(&projection("option", "other", "s1", json!({"v": 3})))
        .unwrap();

    let versions = h.engine.read_versions("option", "color").unwrap();
    assert_eq!(versions.len(), 2);
    let stores: Vec<_> = versions.iter().map(|p| p.identity.store.as_str()).collect();
    assert_eq!(stores, vec!["s1", "s2"]);
}

#[test]
fn notification_carries_write_time_not_payload_time() {
    let h = harness();
    h.engine
        .save_or_update(&projection("option", "color", "s1", json!({"v": 1})))
        .unwrap();

    let events = h.events();
    assert_eq!(events[0].1.kind, "option");
    assert_eq!(events[0].1.store, "s1");
    assert_eq!(events[0].1.modified_date_time, epoch());
}
