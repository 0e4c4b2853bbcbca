//! Harvest Test Utilities
//!
//! Shared test infrastructure for the Harvest workspace:
//! - Proptest generators for filters, page requests and log records
//! - Fixtures for seeding an in-memory store and building a layer over it
//! - Assertion helpers for the error variants the layer reports
//!
//! Only integration tests (`tests/` directories) should depend on this
//! crate; unit tests inside `harvest-storage` would see a second copy of
//! its types.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use serde_json::{json, Value as JsonValue};

// Re-export the pieces tests reach for most often.
pub use harvest_core::{
    ChunkResult, CompareOp, ConfigError, Filter, FilterValue, HarvestError, HarvestResult,
    OrderBy, PageRequest, PageResult, Pagination, PerfConfig, QueryVerb, Record, RetentionResult,
    StorageError, Timestamp, ValidationError,
};
pub use harvest_storage::{
    categories, default_registry, CategoryRegistry, DataStore, FaultyStore, MemoryStore,
    OpContext, PerfLayer,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Harvest query and record types.

    use super::*;
    use proptest::prelude::*;

    // === Scalar Generators ===

    /// A timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// A non-list filter operand.
    pub fn arb_scalar_filter_value() -> impl Strategy<Value = FilterValue> {
        prop_oneof![
            Just(FilterValue::Null),
            any::<bool>().prop_map(FilterValue::Bool),
            any::<i64>().prop_map(FilterValue::Int),
            (-1.0e9f64..1.0e9f64).prop_map(FilterValue::Float),
            "[a-z0-9 ]{0,16}".prop_map(FilterValue::Text),
            arb_timestamp().prop_map(FilterValue::Timestamp),
        ]
    }

    /// A list operand for `IN` / `NOT IN`.
    pub fn arb_list_filter_value() -> impl Strategy<Value = FilterValue> {
        prop::collection::vec(arb_scalar_filter_value(), 0..6).prop_map(FilterValue::List)
    }

    // === Domain Generators ===

    pub fn arb_log_level() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("debug"),
            Just("info"),
            Just("warn"),
            Just("error"),
            Just("fatal"),
        ]
    }

    pub fn arb_status_code() -> impl Strategy<Value = i64> {
        prop_oneof![
            Just(200i64),
            Just(201),
            Just(204),
            Just(302),
            Just(400),
            Just(401),
            Just(404),
            Just(500),
            Just(503),
        ]
    }

    /// Age in days, including rows from the future.
    pub fn arb_age_days() -> impl Strategy<Value = i64> {
        -5i64..120
    }

    pub fn arb_system_log_record() -> impl Strategy<Value = Record> {
        (arb_log_level(), arb_age_days())
            .prop_map(|(level, age)| fixtures::system_log(level, age))
    }

    pub fn arb_access_log_record() -> impl Strategy<Value = Record> {
        (arb_status_code(), arb_age_days())
            .prop_map(|(status, age)| fixtures::access_log(status, age))
    }

    /// A valid chunk size for batch inserts.
    pub fn arb_chunk_size() -> impl Strategy<Value = usize> {
        1usize..64
    }

    /// A page request within the default limit bounds.
    pub fn arb_page_request() -> impl Strategy<Value = PageRequest> {
        (1u32..40, 1u32..=100)
            .prop_map(|(page, limit)| PageRequest::new().with_page(page).with_limit(limit))
    }

    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        "[a-z]{1,3}:[0-9]{1,4}"
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records, stores and layers.

    use super::*;

    /// Turn a JSON object literal into a [`Record`].
    ///
    /// Panics when `value` is not an object.
    #[track_caller]
    pub fn record(value: JsonValue) -> Record {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("fixture record must be a JSON object, got {}", other),
        }
    }

    /// RFC3339 timestamp `days` days before now. Negative values are in the
    /// future.
    pub fn days_ago(days: i64) -> String {
        (Utc::now() - ChronoDuration::days(days)).to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn system_log(level: &str, age_days: i64) -> Record {
        record(json!({
            "level": level,
            "module": "trace",
            "message": format!("{} event", level),
            "created_at": days_ago(age_days),
        }))
    }

    pub fn access_log(status_code: i64, age_days: i64) -> Record {
        record(json!({
            "method": "GET",
            "path": "/api/trace-records",
            "status_code": status_code,
            "duration_ms": 12.5,
            "created_at": days_ago(age_days),
        }))
    }

    /// A cache metric whose entry expires `expires_in_days` from now.
    pub fn cache_metric(key: &str, expires_in_days: i64) -> Record {
        record(json!({
            "cache_key": key,
            "hits": 0,
            "misses": 0,
            "expires_at": days_ago(-expires_in_days),
        }))
    }

    pub fn factory(name: &str, region: &str) -> Record {
        record(json!({
            "name": name,
            "region": region,
            "license_no": format!("LIC-{}", name.to_uppercase()),
            "status": "active",
        }))
    }

    /// `count` system-log rows with sequential explicit ids starting at 1.
    pub fn numbered_logs(count: usize) -> Vec<Record> {
        (1..=count)
            .map(|i| {
                record(json!({
                    "id": i,
                    "level": "info",
                    "module": "batch",
                    "message": format!("row {}", i),
                }))
            })
            .collect()
    }

    /// Config for tests: a small cache and slow log, default thresholds.
    pub fn test_config() -> PerfConfig {
        PerfConfig::default()
            .with_max_entries(64)
            .with_slow_query_capacity(16)
    }

    /// A layer over a fresh in-memory store, plus a handle to that store.
    pub fn memory_layer() -> (PerfLayer, Arc<MemoryStore>) {
        memory_layer_with(test_config())
    }

    #[track_caller]
    pub fn memory_layer_with(config: PerfConfig) -> (PerfLayer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let layer = PerfLayer::new(store.clone(), default_registry(), config, Vec::new())
            .unwrap_or_else(|e| panic!("test layer config rejected: {}", e));
        (layer, store)
    }

    /// Insert `records` into `category` directly, bypassing the monitor.
    pub async fn seed(store: &dyn DataStore, category: &str, records: &[Record]) -> u64 {
        let table = default_registry()
            .resolve(category)
            .unwrap_or_else(|e| panic!("unknown fixture category {}: {}", category, e));
        store
            .insert_many(&table, records, Default::default())
            .await
            .unwrap_or_else(|e| panic!("seeding {} failed: {}", category, e))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for Harvest results.

    use super::*;

    /// Assert that a HarvestResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &HarvestResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a HarvestResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &HarvestResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &HarvestResult<T>) {
        match result {
            Err(HarvestError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &HarvestResult<T>) {
        match result {
            Err(HarvestError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert an `InvalidValue` validation error naming `field`.
    #[track_caller]
    pub fn assert_invalid_value<T: std::fmt::Debug>(result: &HarvestResult<T>, field: &str) {
        match result {
            Err(HarvestError::Validation(ValidationError::InvalidValue { field: f, .. })) => {
                assert_eq!(f, field, "Wrong field in InvalidValue error");
            }
            other => panic!("Expected InvalidValue({}), got: {:?}", field, other),
        }
    }

    #[track_caller]
    pub fn assert_unknown_category<T: std::fmt::Debug>(result: &HarvestResult<T>, category: &str) {
        match result {
            Err(HarvestError::Storage(StorageError::UnknownCategory { category: c })) => {
                assert_eq!(c, category, "Wrong category in UnknownCategory error");
            }
            other => panic!("Expected UnknownCategory({}), got: {:?}", category, other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &HarvestResult<T>) {
        match result {
            Err(HarvestError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that pagination metadata is internally consistent.
    #[track_caller]
    pub fn assert_pagination_consistent(p: &Pagination) {
        let limit = u64::from(p.limit);
        assert!(limit > 0, "limit must be positive: {:?}", p);
        assert_eq!(p.total_pages, p.total.div_ceil(limit), "total_pages: {:?}", p);
        assert_eq!(p.has_prev, p.page > 1, "has_prev: {:?}", p);
        assert_eq!(p.has_next, u64::from(p.page) * limit < p.total, "has_next: {:?}", p);
    }
}
