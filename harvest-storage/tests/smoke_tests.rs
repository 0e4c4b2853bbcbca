//! End-to-end pass over one performance layer backed by an in-memory store.

use std::time::Duration;

use harvest_test_utils::assertions::{assert_config_error, assert_unknown_category};
use harvest_test_utils::fixtures::{access_log, memory_layer, memory_layer_with, numbered_logs, system_log, test_config};
use harvest_test_utils::{
    categories, default_registry, Filter, HarvestError, MemoryStore, OpContext, PageRequest,
    PerfLayer, QueryVerb,
};
use serde_json::json;

#[tokio::test]
async fn test_full_cycle_feeds_report() {
    let (layer, store) = memory_layer();
    let ctx = OpContext::background();

    layer.cache().set("f1", json!({ "name": "A" }), Duration::from_secs(60));
    assert_eq!(layer.cache().get("f1"), Some(json!({ "name": "A" })));
    assert_eq!(layer.cache().get("missing"), None);

    let mut logs = numbered_logs(25);
    logs.push(system_log("debug", 45));
    layer
        .batch_insert(categories::SYSTEM_LOG, &logs, Some(10), &ctx)
        .await
        .unwrap();
    layer
        .batch_insert(categories::ACCESS_LOG, &[access_log(200, 60), access_log(503, 60)], None, &ctx)
        .await
        .unwrap();

    let page = layer
        .paginate(
            categories::SYSTEM_LOG,
            PageRequest::new().with_filter(Filter::all().eq("level", "info")).with_limit(10).with_page(3),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(page.data.len(), 5);
    assert_eq!(page.pagination.total, 25);

    let deleted = layer.cleanup_old_data(30, &ctx).await.unwrap();
    assert_eq!(deleted.get(categories::SYSTEM_LOG), Some(1));
    assert_eq!(deleted.get(categories::ACCESS_LOG), Some(1));
    assert_eq!(store.row_count("system_logs").unwrap(), 25);

    let report = layer.performance_report();
    assert_eq!(report.cache.entry_count, 1);
    assert_eq!(report.cache.hits, 1);
    assert_eq!(report.cache.misses, 0);
    assert_eq!(report.queries[&QueryVerb::Insert].count, 4);
    assert_eq!(report.queries[&QueryVerb::Select].count, 2);
    assert_eq!(report.queries[&QueryVerb::Delete].count, 3);
    assert_eq!(report.queries[&QueryVerb::Update].count, 0);
    assert_eq!(report.slow_query_count, 0);

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["generatedAt"].is_string());
    assert_eq!(json["queries"]["INSERT"]["count"], 4);
}

#[tokio::test]
async fn test_unknown_category_everywhere() {
    let (layer, store) = memory_layer();
    let ctx = OpContext::background();

    assert_unknown_category(&layer.batch_insert("crops", &numbered_logs(1), None, &ctx).await, "crops");
    assert_unknown_category(&layer.paginate("crops", PageRequest::new(), &ctx).await, "crops");
    assert_eq!(store.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_interrupts_slow_batch() {
    let (layer, _) = memory_layer();
    let ctx = OpContext::with_timeout(Duration::from_millis(50));

    // The deadline has passed before any chunk starts.
    tokio::time::advance(Duration::from_millis(60)).await;
    let err = layer
        .batch_insert(categories::SYSTEM_LOG, &numbered_logs(3), None, &ctx)
        .await
        .unwrap_err();

    match err {
        HarvestError::Batch(failure) => {
            assert_eq!(failure.chunk_index, 0);
            assert!(!failure.in_doubt);
            assert!(matches!(*failure.source, HarvestError::DeadlineExceeded { .. }));
        }
        other => panic!("expected batch failure, got {:?}", other),
    }
}

#[test]
fn test_invalid_config_rejected_at_startup() {
    for config in [
        test_config().with_page_limits(50, 10),
        test_config().with_chunk_size(0),
        test_config().with_sweep_interval(Duration::ZERO),
    ] {
        let result = PerfLayer::new(MemoryStore::new(), default_registry(), config, Vec::new());
        assert_config_error(&result.map(|_| ()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_layer_sweeper_uses_configured_interval() {
    let (layer, _) = memory_layer_with(test_config().with_sweep_interval(Duration::from_secs(10)));
    layer.cache().set("short", json!(1), Duration::from_secs(5));
    let handle = layer.start_cache_sweeper().unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    tokio::task::yield_now().await;
    assert!(layer.cache().is_empty());
    assert!(layer.cache().key_stats("short").is_none());

    handle.shutdown().await;
}
