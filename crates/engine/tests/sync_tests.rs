//! End-to-end tests for saves, rebuilds and query resolution
//!
//! Each test wires the real allocator, controller, save path and resolver
//! over test doubles for the store, the indexer and the search daemon.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use common::{hit, CountingStore, Harness, RecordingIndexer, Script, ScriptedClient};
use docsync_core::{
    fields, DocsyncConfig, Error, IndexPartition, PartitionKind, RecordId, SearchId, TypeName,
    Value,
};
use docsync_engine::{
    AttrValue, IdentifierAllocator, IndexSyncController, MatchMode, MatchRef, QueryResponse,
    RawMatch, RebuildOutcome, RebuildTicket, SaveOptions, SearchOptions, SearchOutcome, SortMode,
};
use docsync_storage::RecordStore;
use proptest::prelude::*;

// ============================================================================
// Query resolution
// ============================================================================

#[test]
fn test_unknown_discriminator_is_dropped() {
    let h = Harness::with_client(ScriptedClient::responding(vec![
        hit("Post", 7),
        hit("Unknown", 9),
    ]));
    h.seed("Post", "p7", 7, false);

    let records = h
        .resolver
        .search_records("first", &SearchOptions::default())
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, RecordId::from("p7"));
    assert_eq!(records[0].search_id, SearchId::new(7));
}

#[test]
fn test_raw_mode_skips_store() {
    let h = Harness::with_client(ScriptedClient::responding(vec![hit("Post", 7)]));

    let outcome = h
        .resolver
        .search("first", &SearchOptions::default().raw())
        .unwrap();
    assert_eq!(
        outcome,
        SearchOutcome::Raw(vec![MatchRef {
            type_name: TypeName::from("Post"),
            search_id: SearchId::new(7).unwrap(),
            weight: 1,
        }])
    );
    assert_eq!(h.store.lookups(), 0);
}

#[test]
fn test_missing_record_is_dropped_silently() {
    let h = Harness::with_client(ScriptedClient::responding(vec![
        hit("Post", 3),
        hit("Post", 4),
        hit("Post", 5),
    ]));
    h.seed("Post", "p3", 3, false);
    h.seed("Post", "p5", 5, false);

    let records = h
        .resolver
        .search_records("x", &SearchOptions::default())
        .unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["p3", "p5"]);
    assert_eq!(h.store.lookups(), 3);
}

#[test]
fn test_results_follow_engine_order() {
    let h = Harness::with_client(ScriptedClient::responding(vec![
        hit("Post", 9),
        hit("Comment", 1),
        hit("Post", 2),
    ]));
    h.seed("Post", "p9", 9, false);
    h.seed("Post", "p2", 2, false);
    h.seed("Comment", "c1", 1, false);

    let records = h
        .resolver
        .search_records("x", &SearchOptions::default())
        .unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["p9", "c1", "p2"]);
}

#[test]
fn test_char_code_discriminator() {
    let codes = "Post".chars().map(|c| c as i64).collect();
    let client = ScriptedClient::responding(vec![RawMatch {
        doc_id: 11,
        weight: 3,
        attributes: vec![("classname".to_string(), AttrValue::Multi(codes))],
    }]);
    let h = Harness::with_client(client);

    let refs = h
        .resolver
        .search_raw("x", &SearchOptions::default())
        .unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].type_name, TypeName::from("Post"));
    assert_eq!(refs[0].search_id.get(), 11);
}

#[test]
fn test_partition_names() {
    let h = Harness::with_client(ScriptedClient::responding(Vec::new()));
    let names = h
        .resolver
        .partition_names(&[TypeName::from("Post"), TypeName::from("Comment")])
        .unwrap();
    assert_eq!(names, vec!["post_core", "post_delta", "comment_core"]);
    assert_eq!(h.resolver.partition_names(&[]).unwrap(), vec!["*"]);
}

#[test]
fn test_request_for_all_types() {
    let client = ScriptedClient::responding(Vec::new());
    let h = Harness::with_client(client.clone());
    h.resolver
        .search("hello world", &SearchOptions::default())
        .unwrap();

    let (endpoint, request) = client.last_request();
    assert_eq!(endpoint.to_string(), "127.0.0.1:9312");
    assert_eq!(request.query, "hello world");
    assert_eq!(request.indexes, "*");
    assert_eq!(request.match_mode, MatchMode::Extended);
    assert_eq!(request.sort_mode, SortMode::Relevance);
    assert_eq!(request.max_matches, 1000);
    assert_eq!(request.limit, None);
}

#[test]
fn test_single_type_request_restricts_and_routes() {
    let client = ScriptedClient::responding(Vec::new());
    let h = Harness::with_client(client.clone());
    let options = SearchOptions {
        match_mode: Some(MatchMode::Any),
        max_matches: Some(50),
        ..SearchOptions::for_type("Comment")
            .sort_by("@weight DESC")
            .limit(20)
    };
    h.resolver.search("nice", &options).unwrap();

    let (endpoint, request) = client.last_request();
    assert_eq!(endpoint.host, "comments.search.internal");
    assert_eq!(endpoint.port, 9400);
    assert_eq!(request.query, "nice @classname Comment");
    assert_eq!(request.indexes, "comment_core");
    assert_eq!(request.match_mode, MatchMode::Any);
    assert_eq!(request.sort_mode, SortMode::Extended);
    assert_eq!(request.sort_by.as_deref(), Some("@weight DESC"));
    assert_eq!(request.limit, Some(20));
    assert_eq!(request.max_matches, 50);
}

#[test]
fn test_multi_type_request_has_no_classname_filter() {
    let client = ScriptedClient::responding(Vec::new());
    let h = Harness::with_client(client.clone());
    let options = SearchOptions {
        types: vec![TypeName::from("Post"), TypeName::from("Comment")],
        ..SearchOptions::default()
    };
    h.resolver.search("q", &options).unwrap();

    let (endpoint, request) = client.last_request();
    assert_eq!(request.query, "q");
    assert_eq!(request.indexes, "post_core post_delta comment_core");
    assert_eq!(endpoint.port, 9312);
}

#[test]
fn test_unknown_requested_type_is_an_error() {
    let client = ScriptedClient::responding(vec![hit("Post", 1)]);
    let h = Harness::with_client(client.clone());
    let err = h
        .resolver
        .search("q", &SearchOptions::for_type("Ghost"))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownType(_)));
    assert!(client.requests.lock().is_empty());
}

#[test]
fn test_non_zero_status_yields_empty() {
    let client = ScriptedClient::new(Script::Respond(QueryResponse {
        status: 1,
        error: Some("index post_core: out of memory".to_string()),
        matches: vec![hit("Post", 7)],
        total_found: 1,
    }));
    let h = Harness::with_client(client);
    h.seed("Post", "p7", 7, false);

    let outcome = h.resolver.search("q", &SearchOptions::default()).unwrap();
    assert!(outcome.is_empty());
    assert_eq!(h.store.lookups(), 0);
}

#[test]
fn test_unreachable_daemon_yields_empty() {
    let h = Harness::with_client(ScriptedClient::new(Script::Unavailable));
    let raw = h
        .resolver
        .search("q", &SearchOptions::default().raw())
        .unwrap();
    assert_eq!(raw, SearchOutcome::Raw(Vec::new()));
}

#[test]
fn test_store_failure_drops_matches() {
    let h = Harness::with_client(ScriptedClient::responding(vec![hit("Post", 1)]));
    h.seed("Post", "p1", 1, false);
    h.store
        .offline
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let records = h
        .resolver
        .search_records("q", &SearchOptions::default())
        .unwrap();
    assert!(records.is_empty());
}

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn test_concurrent_creates_get_unique_ids() {
    let h = Arc::new(Harness::with_indexer(RecordingIndexer::new()));
    let mut handles = Vec::new();
    for t in 0..8 {
        let h = Arc::clone(&h);
        handles.push(thread::spawn(move || {
            (0..50)
                .map(|i| {
                    h.records
                        .create(
                            &TypeName::from("Comment"),
                            RecordId::new(format!("c{}-{}", t, i)),
                            fields([("text", "hi")]),
                        )
                        .unwrap()
                        .search_id
                        .unwrap()
                        .get()
                })
                .collect::<Vec<_>>()
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "search id {} handed out twice", id);
        }
    }
    assert_eq!(ids.len(), 400);
    assert_eq!(ids.iter().next().copied(), Some(1));
    assert_eq!(ids.iter().next_back().copied(), Some(400));
}

#[test]
fn test_store_failure_fails_create() {
    let h = Harness::with_indexer(RecordingIndexer::new());
    h.store
        .offline
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let err = h
        .records
        .create(&Harness::post(), RecordId::from("p1"), fields([("title", "x")]))
        .unwrap_err();
    assert!(matches!(err, Error::Allocation { .. }));

    h.store
        .offline
        .store(false, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(h.store.inner.count(&Harness::post()), 0);

    // The failed seed is not cached
    let created = h
        .records
        .create(&Harness::post(), RecordId::from("p1"), fields([("title", "x")]))
        .unwrap();
    assert_eq!(created.search_id, SearchId::new(1));
}

#[test]
fn test_allocation_continues_after_existing_records() {
    let h = Harness::with_indexer(RecordingIndexer::new());
    h.seed("Comment", "old", 120, false);
    let created = h
        .records
        .create(&TypeName::from("Comment"), RecordId::from("new"), fields([("text", "x")]))
        .unwrap();
    assert_eq!(created.search_id, SearchId::new(121));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_ids_strictly_increase_per_type(picks in prop::collection::vec(any::<bool>(), 1..60)) {
        let store: Arc<dyn RecordStore> = Arc::new(CountingStore::default());
        let allocator = IdentifierAllocator::new(Arc::new(common::registry()), store);
        let mut last = [0u64; 2];
        for pick in picks {
            let (slot, name) = if pick { (0, "Post") } else { (1, "Comment") };
            let id = allocator.allocate(&TypeName::from(name)).unwrap().get();
            prop_assert!(id > last[slot]);
            prop_assert_eq!(id, last[slot] + 1);
            last[slot] = id;
        }
    }
}

// ============================================================================
// Dirty tracking through the save path
// ============================================================================

#[test]
fn test_non_indexed_update_leaves_clean_record_clean() {
    let h = Harness::with_indexer(RecordingIndexer::new());
    h.seed("Post", "p1", 1, false);

    let saved = h
        .records
        .update(
            &Harness::post(),
            &RecordId::from("p1"),
            fields([("views", Value::Int(10))]),
            SaveOptions::default(),
        )
        .unwrap();
    assert!(!saved.dirty);
    h.controller.wait_idle();
    assert_eq!(h.indexer.calls(), 0);
}

#[test]
fn test_indexed_update_marks_dirty_and_rebuilds_delta() {
    let h = Harness::with_indexer(RecordingIndexer::new());
    h.seed("Post", "p1", 1, false);
    h.seed("Post", "p2", 2, false);

    let saved = h
        .records
        .update(
            &Harness::post(),
            &RecordId::from("p1"),
            fields([("title", "retitled")]),
            SaveOptions::default(),
        )
        .unwrap();
    assert!(saved.dirty);
    assert_eq!(saved.get("title"), Some(&Value::from("retitled")));

    h.controller.wait_idle();
    assert_eq!(
        *h.indexer.seen.lock(),
        vec![("post_delta".to_string(), vec![1])]
    );
    let reloaded = h.records.find(&Harness::post(), &RecordId::from("p1")).unwrap();
    assert!(!reloaded.dirty);
}

#[test]
fn test_skip_options() {
    let h = Harness::with_indexer(RecordingIndexer::new());
    h.seed("Post", "p1", 1, false);

    let saved = h
        .records
        .update(
            &Harness::post(),
            &RecordId::from("p1"),
            fields([("title", "quiet")]),
            SaveOptions::quiet(),
        )
        .unwrap();
    assert!(!saved.dirty);

    let saved = h
        .records
        .update(
            &Harness::post(),
            &RecordId::from("p1"),
            fields([("title", "marked only")]),
            SaveOptions {
                skip_delta_rebuild: true,
                ..SaveOptions::default()
            },
        )
        .unwrap();
    assert!(saved.dirty);
    h.controller.wait_idle();
    assert_eq!(h.indexer.calls(), 0);
}

#[test]
fn test_non_delta_type_never_dirty() {
    let h = Harness::with_indexer(RecordingIndexer::new());
    let created = h
        .records
        .create(&TypeName::from("Comment"), RecordId::from("c1"), fields([("text", "a")]))
        .unwrap();
    assert!(!created.dirty);
    let saved = h
        .records
        .update(
            &TypeName::from("Comment"),
            &RecordId::from("c1"),
            fields([("text", "b")]),
            SaveOptions::default(),
        )
        .unwrap();
    assert!(!saved.dirty);
}

#[test]
fn test_update_missing_record() {
    let h = Harness::with_indexer(RecordingIndexer::new());
    let err = h
        .records
        .update(
            &Harness::post(),
            &RecordId::from("nope"),
            fields([("title", "x")]),
            SaveOptions::default(),
        )
        .unwrap_err();
    assert!(err.is_not_found());
}

// ============================================================================
// Rebuilds
// ============================================================================

#[test]
fn test_rebuild_in_flight_is_coalesced() {
    let indexer = RecordingIndexer::holding();
    let h = Harness::with_indexer(indexer.clone());
    h.seed("Post", "p1", 1, true);

    let post = Harness::post();
    assert_eq!(
        h.controller.rebuild(&post, PartitionKind::Delta).unwrap(),
        RebuildTicket::Scheduled
    );
    indexer.fed.wait();
    assert_eq!(
        h.controller.rebuild(&post, PartitionKind::Delta).unwrap(),
        RebuildTicket::Coalesced
    );
    // A different partition of the same type is independent
    assert_eq!(
        h.controller.rebuild(&post, PartitionKind::Core).unwrap(),
        RebuildTicket::Scheduled
    );

    indexer.release.open();
    h.controller.wait_idle();
    assert_eq!(indexer.calls(), 2);
    assert_eq!(
        h.controller
            .status(&IndexPartition::delta(post.clone()))
            .completed,
        1
    );

    // Once idle, the next request schedules again
    assert_eq!(
        h.controller.rebuild(&post, PartitionKind::Delta).unwrap(),
        RebuildTicket::Scheduled
    );
    h.controller.wait_idle();
    assert_eq!(indexer.calls(), 3);

    let stats = h.controller.scheduler_stats();
    assert_eq!(stats.completed, 3);
    assert_eq!((stats.queued, stats.running), (0, 0));
    assert_eq!(stats.workers, DocsyncConfig::default().indexer_threads);
}

#[test]
fn test_controller_rejects_invalid_config() {
    let config = DocsyncConfig {
        indexer_threads: 0,
        ..DocsyncConfig::default()
    };
    let err = IndexSyncController::new(
        Arc::new(common::registry()),
        Arc::new(CountingStore::default()),
        RecordingIndexer::new(),
        &config,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn test_writes_during_rebuild_stay_dirty() {
    let indexer = RecordingIndexer::holding();
    let h = Harness::with_indexer(indexer.clone());
    for i in 1..=6u64 {
        h.seed("Post", &format!("p{}", i), i, true);
    }

    let post = Harness::post();
    h.controller.rebuild(&post, PartitionKind::Delta).unwrap();
    indexer.fed.wait();

    // Feed is captured; change p2 and p5 before the rebuild completes
    for id in ["p2", "p5"] {
        h.records
            .update(
                &post,
                &RecordId::from(id),
                fields([("body", "late edit")]),
                SaveOptions::default(),
            )
            .unwrap();
    }
    indexer.release.open();
    h.controller.wait_idle();

    let dirty: Vec<String> = (1..=6)
        .map(|i| h.store.inner.find(&post, &RecordId::new(format!("p{}", i))).unwrap())
        .filter(|r| r.dirty)
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(dirty, vec!["p2", "p5"]);

    let status = h.controller.status(&IndexPartition::delta(post));
    match status.last_outcome {
        Some(RebuildOutcome::Succeeded {
            indexed, cleared, ..
        }) => {
            assert_eq!(indexed, 6);
            assert_eq!(cleared, 4);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_failed_rebuild_keeps_dirty_flags() {
    let h = Harness::with_indexer(RecordingIndexer::failing());
    h.seed("Post", "p1", 1, true);

    let post = Harness::post();
    h.controller.rebuild(&post, PartitionKind::Delta).unwrap();
    h.controller.wait_idle();

    assert_eq!(h.store.inner.dirty_count(&post), 1);
    let status = h.controller.status(&IndexPartition::delta(post));
    assert!(matches!(status.last_outcome, Some(RebuildOutcome::Failed(_))));
    assert_eq!(status.completed, 1);
}

#[test]
fn test_core_feed_paged_and_ordered() {
    let h = Harness::with_indexer(RecordingIndexer::new());
    for sid in [10u64, 3, 7, 1, 22, 15, 4, 9, 2] {
        h.seed("Post", &format!("p{}", sid), sid, false);
    }
    h.records.reindex_core(&Harness::post()).unwrap();
    h.controller.wait_idle();

    let seen = h.indexer.seen.lock();
    assert_eq!(seen[0].0, "post_core");
    assert_eq!(seen[0].1, vec![1, 2, 3, 4, 7, 9, 10, 15, 22]);
}

#[test]
fn test_unrepresentable_record_skipped_in_rebuild() {
    let h = Harness::with_indexer(RecordingIndexer::new());
    h.seed("Post", "p1", 1, true);
    h.seed("Post", "p2", 2, true);
    h.store
        .inner
        .update(
            &Harness::post(),
            &RecordId::from("p2"),
            docsync_storage::RecordUpdate::set(fields([("body", Value::Bytes(vec![1, 2]))])),
        )
        .unwrap();

    h.records.reindex_delta(&Harness::post()).unwrap();
    h.controller.wait_idle();

    assert_eq!(h.indexer.seen.lock()[0].1, vec![1]);
    // Skipped records were not fed, so they stay dirty
    let p2 = h.store.inner.find(&Harness::post(), &RecordId::from("p2")).unwrap();
    assert!(p2.dirty);
    match h
        .controller
        .status(&IndexPartition::delta(Harness::post()))
        .last_outcome
    {
        Some(RebuildOutcome::Succeeded { skipped, .. }) => assert_eq!(skipped, 1),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_control_characters_skip_only_that_record() {
    let h = Harness::with_indexer(RecordingIndexer::new());
    for sid in 1..=3u64 {
        h.seed("Post", &format!("p{}", sid), sid, false);
    }
    h.store
        .inner
        .update(
            &Harness::post(),
            &RecordId::from("p2"),
            docsync_storage::RecordUpdate::set(fields([("title", "bad\u{1}\u{0}text")])),
        )
        .unwrap();

    h.records.reindex_core(&Harness::post()).unwrap();
    h.controller.wait_idle();

    assert_eq!(h.indexer.seen.lock()[0].1, vec![1, 3]);
    match h
        .controller
        .status(&IndexPartition::core(Harness::post()))
        .last_outcome
    {
        Some(RebuildOutcome::Succeeded {
            indexed, skipped, ..
        }) => {
            assert_eq!(indexed, 2);
            assert_eq!(skipped, 1);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}
