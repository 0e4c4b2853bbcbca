//! Property-Based Tests for Chunked Batch Inserts
//!
//! For any record count, chunk size and failing chunk index, the writer
//! commits exactly the chunks before the failure and none after it.

use std::sync::Arc;

use harvest_storage::{BatchWriter, DataStore, FaultyStore, MemoryStore, OpContext};
use harvest_test_utils::assertions::{assert_invalid_value, assert_unknown_category};
use harvest_test_utils::fixtures::{self, numbered_logs};
use harvest_test_utils::generators::{arb_chunk_size, arb_system_log_record};
use harvest_test_utils::{categories, default_registry, HarvestError};
use proptest::prelude::*;
use tokio::runtime::Runtime;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn writer(store: Arc<dyn DataStore>) -> BatchWriter {
    BatchWriter::new(store, Arc::new(default_registry()), 100)
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_partial_failure_commits_prefix(
        count in 1usize..120,
        chunk_size in arb_chunk_size(),
        fail_seed in any::<prop::sample::Index>(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let chunks = count.div_ceil(chunk_size);
            let failing = fail_seed.index(chunks);

            let memory = Arc::new(MemoryStore::new());
            let store = Arc::new(FaultyStore::failing_call(memory.clone(), failing as u64));
            let records = numbered_logs(count);

            let err = writer(store.clone())
                .insert_batches(categories::SYSTEM_LOG, &records, Some(chunk_size), &OpContext::background())
                .await
                .expect_err("injected fault must surface");

            let failure = match err {
                HarvestError::Batch(failure) => failure,
                other => return Err(TestCaseError::fail(format!("unexpected error: {:?}", other))),
            };
            prop_assert_eq!(failure.chunk_index, failing);
            prop_assert_eq!(failure.completed.len(), failing);
            prop_assert!(failure.completed.iter().enumerate().all(|(i, c)| c.index == i));

            let committed = (failing * chunk_size) as u64;
            prop_assert_eq!(failure.committed_rows(), committed);
            prop_assert_eq!(memory.row_count("system_logs").unwrap() as u64, committed);
            // No chunk after the failing one was attempted.
            prop_assert_eq!(store.calls(), failing as u64 + 1);
            Ok(())
        })?;
    }

    #[test]
    fn prop_chunks_cover_input(
        records in prop::collection::vec(arb_system_log_record(), 0..80),
        chunk_size in arb_chunk_size(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let memory = Arc::new(MemoryStore::new());
            let results = writer(memory.clone())
                .insert_batches(categories::SYSTEM_LOG, &records, Some(chunk_size), &OpContext::background())
                .await
                .map_err(|e| TestCaseError::fail(format!("insert failed: {}", e)))?;

            prop_assert_eq!(results.len(), records.len().div_ceil(chunk_size));
            let attempted: usize = results.iter().map(|c| c.attempted).sum();
            prop_assert_eq!(attempted, records.len());
            prop_assert!(results.iter().all(|c| c.attempted <= chunk_size && c.attempted > 0));
            prop_assert_eq!(memory.row_count("system_logs").unwrap(), records.len());
            Ok(())
        })?;
    }
}

// ============================================================================
// EDGE CASES
// ============================================================================

#[tokio::test]
async fn test_empty_input_touches_nothing() {
    let memory = Arc::new(MemoryStore::new());
    let results = writer(memory.clone())
        .insert_batches(categories::SYSTEM_LOG, &[], None, &OpContext::background())
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(memory.calls(), 0);
}

#[tokio::test]
async fn test_zero_chunk_size_rejected() {
    let memory = Arc::new(MemoryStore::new());
    let result = writer(memory.clone())
        .insert_batches(categories::SYSTEM_LOG, &numbered_logs(3), Some(0), &OpContext::background())
        .await;

    assert_invalid_value(&result, "chunk_size");
    assert_eq!(memory.calls(), 0);
}

#[tokio::test]
async fn test_unknown_category_rejected() {
    let result = writer(Arc::new(MemoryStore::new()))
        .insert_batches("harvest_moons", &numbered_logs(1), None, &OpContext::background())
        .await;

    assert_unknown_category(&result, "harvest_moons");
}

#[tokio::test]
async fn test_duplicates_skipped_not_counted() {
    let memory = Arc::new(MemoryStore::new());
    let writer = writer(memory.clone());
    let ctx = OpContext::background();

    writer
        .insert_batches(categories::SYSTEM_LOG, &numbered_logs(4), Some(10), &ctx)
        .await
        .unwrap();
    let again = writer
        .insert_batches(categories::SYSTEM_LOG, &numbered_logs(6), Some(10), &ctx)
        .await
        .unwrap();

    assert_eq!(again[0].attempted, 6);
    assert_eq!(again[0].inserted, 2);
    assert_eq!(memory.row_count("system_logs").unwrap(), 6);
}

#[tokio::test]
async fn test_factories_get_generated_ids() {
    let memory = Arc::new(MemoryStore::new());
    let records = vec![fixtures::factory("north", "NL"), fixtures::factory("south", "ES")];

    writer(memory.clone())
        .insert_batches(categories::FACTORY, &records, None, &OpContext::background())
        .await
        .unwrap();

    let rows = memory.rows("factories").unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["id"].is_string()));
    assert_ne!(rows[0]["id"], rows[1]["id"]);
}
