//! Property-Based Tests for Offset Pagination
//!
//! For any table size and any valid page request:
//! - the page holds `min(limit, max(0, total - offset))` records
//! - the metadata is internally consistent
//! - walking every page in a stable order yields each record exactly once

use std::collections::BTreeSet;
use std::sync::Arc;

use harvest_storage::{OpContext, Paginator};
use harvest_test_utils::assertions::{assert_pagination_consistent, assert_validation_error};
use harvest_test_utils::fixtures::{self, numbered_logs, seed};
use harvest_test_utils::generators::arb_page_request;
use harvest_test_utils::{categories, default_registry, Filter, MemoryStore, OrderBy, PageRequest, PerfConfig};
use proptest::prelude::*;
use serde_json::json;
use tokio::runtime::Runtime;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

async fn seeded_logs(count: usize) -> Paginator {
    let store = Arc::new(MemoryStore::new());
    if count > 0 {
        seed(&*store, categories::SYSTEM_LOG, &numbered_logs(count)).await;
    }
    Paginator::new(store, Arc::new(default_registry()), &PerfConfig::default())
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_page_size_and_metadata(count in 0usize..150, request in arb_page_request()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let paginator = seeded_logs(count).await;
            let page_no = request.page;
            let limit = request.limit.unwrap_or(20);

            let page = paginator
                .paginate(categories::SYSTEM_LOG, request, &OpContext::background())
                .await
                .map_err(|e| TestCaseError::fail(format!("paginate failed: {}", e)))?;

            let offset = u64::from(page_no - 1) * u64::from(limit);
            let expected = (count as u64).saturating_sub(offset).min(u64::from(limit));
            prop_assert_eq!(page.data.len() as u64, expected);
            prop_assert_eq!(page.pagination.total, count as u64);
            prop_assert_eq!(page.pagination.page, page_no);
            prop_assert_eq!(page.pagination.limit, limit);
            assert_pagination_consistent(&page.pagination);
            Ok(())
        })?;
    }

    #[test]
    fn prop_walking_pages_visits_each_row_once(count in 1usize..90, limit in 1u32..25) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let paginator = seeded_logs(count).await;
            let ctx = OpContext::background();
            let mut seen = BTreeSet::new();
            let mut page_no = 1;

            loop {
                let request = PageRequest::new()
                    .with_order(OrderBy::asc("id"))
                    .with_limit(limit)
                    .with_page(page_no);
                let page = paginator
                    .paginate(categories::SYSTEM_LOG, request, &ctx)
                    .await
                    .map_err(|e| TestCaseError::fail(format!("paginate failed: {}", e)))?;

                for row in &page.data {
                    let id = row["id"].as_i64().unwrap_or_default();
                    prop_assert!(seen.insert(id), "row {} returned twice", id);
                }
                if !page.pagination.has_next {
                    prop_assert_eq!(u64::from(page_no), page.pagination.total_pages);
                    break;
                }
                page_no += 1;
            }

            prop_assert_eq!(seen.len(), count);
            Ok(())
        })?;
    }
}

// ============================================================================
// SHAPING
// ============================================================================

#[tokio::test]
async fn test_projection_and_relation_embedding() {
    let store = Arc::new(MemoryStore::new());
    seed(&*store, categories::FACTORY, &[fixtures::factory("north", "NL")]).await;
    let factory_id = store.rows("factories").unwrap()[0]["id"].clone();
    let users = vec![
        fixtures::record(json!({ "factory_id": &factory_id, "email": "a@north.example", "role": "admin" })),
        fixtures::record(json!({ "factory_id": &factory_id, "email": "b@north.example", "role": "viewer" })),
    ];
    seed(&*store, categories::USER, &users).await;

    let paginator = Paginator::new(store, Arc::new(default_registry()), &PerfConfig::default());
    let page = paginator
        .paginate(
            categories::FACTORY,
            PageRequest::new()
                .with_select(["id", "name"])
                .with_include("users")
                .with_filter(Filter::all().eq("region", "NL")),
            &OpContext::background(),
        )
        .await
        .unwrap();

    assert_eq!(page.data.len(), 1);
    let row = &page.data[0];
    assert_eq!(row["name"], "north");
    assert!(!row.contains_key("region"));
    assert_eq!(row["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_relation_rejected() {
    let paginator = seeded_logs(1).await;
    let result = paginator
        .paginate(
            categories::SYSTEM_LOG,
            PageRequest::new().with_include("users"),
            &OpContext::background(),
        )
        .await;

    assert_validation_error(&result);
}
