//! Data retention sweep.
//!
//! Each rule is one `DELETE` through the monitored store. Rules run in
//! policy order and the sweep stops at the first failing rule; counts of
//! the rules that already ran are returned inside the error. A delete
//! abandoned in flight by a deadline or cancellation is reported `in_doubt`.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use harvest_core::{
    Filter, FilterValue, HarvestError, HarvestResult, RetentionCategoryFailure, RetentionResult,
    Timestamp,
};
use tracing::{info, warn};

use crate::context::OpContext;
use crate::registry::{categories, CategoryRegistry};
use crate::store::DataStore;

const OPERATION: &str = "cleanup_old_data";

/// Log levels that may be purged. `error` and `fatal` entries are kept.
pub const PURGEABLE_LOG_LEVELS: [&str; 3] = ["debug", "info", "warn"];

/// Access-log rows with a status below this are purged; error responses
/// are kept for audit.
pub const ACCESS_LOG_KEEP_STATUS_FROM: i64 = 400;

/// Which timestamp makes a row eligible.
#[derive(Debug, Clone, PartialEq)]
pub enum RetentionAge {
    /// `column` is older than `now - retention_days`.
    CreatedBefore { column: String },
    /// `column` holds an explicit expiry that has passed. Independent of
    /// the retention window.
    ExpiredAt { column: String },
}

/// Deletion rule for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionRule {
    pub category: String,
    pub age: RetentionAge,
    /// Extra conditions a row must also match to be deleted.
    pub only: Filter,
}

impl RetentionRule {
    pub fn created_before(category: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            age: RetentionAge::CreatedBefore {
                column: column.into(),
            },
            only: Filter::all(),
        }
    }

    pub fn expired_at(category: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            age: RetentionAge::ExpiredAt {
                column: column.into(),
            },
            only: Filter::all(),
        }
    }

    pub fn only(mut self, filter: Filter) -> Self {
        self.only = filter;
        self
    }

    /// Delete filter for a sweep at `now` with the given cutoff.
    pub fn filter(&self, cutoff: Timestamp, now: Timestamp) -> Filter {
        let age = match &self.age {
            RetentionAge::CreatedBefore { column } => Filter::all().lt(column.as_str(), cutoff),
            RetentionAge::ExpiredAt { column } => Filter::all().lt(column.as_str(), now),
        };
        let mut filter = age;
        filter.conditions.extend(self.only.conditions.iter().cloned());
        filter
    }
}

/// Ordered set of retention rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetentionPolicy {
    pub rules: Vec<RetentionRule>,
}

impl RetentionPolicy {
    pub fn new(rules: Vec<RetentionRule>) -> Self {
        Self { rules }
    }

    /// Low-severity system logs, successful access logs, expired cache
    /// metrics.
    pub fn standard() -> Self {
        let levels: Vec<FilterValue> = PURGEABLE_LOG_LEVELS.iter().map(|l| (*l).into()).collect();
        Self::new(vec![
            RetentionRule::created_before(categories::SYSTEM_LOG, "created_at")
                .only(Filter::all().is_in("level", FilterValue::List(levels))),
            RetentionRule::created_before(categories::ACCESS_LOG, "created_at")
                .only(Filter::all().lt("status_code", ACCESS_LOG_KEEP_STATUS_FROM)),
            RetentionRule::expired_at(categories::CACHE_METRIC, "expires_at"),
        ])
    }
}

pub struct RetentionSweeper {
    store: Arc<dyn DataStore>,
    registry: Arc<CategoryRegistry>,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn DataStore>,
        registry: Arc<CategoryRegistry>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            policy,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Delete every row older than `retention_days` that the policy allows
    /// to be purged. `0` makes every eligible row go regardless of age.
    ///
    /// Running the sweep twice in a row deletes nothing the second time.
    pub async fn cleanup_old_data(
        &self,
        retention_days: u32,
        ctx: &OpContext,
    ) -> HarvestResult<RetentionResult> {
        let now = Utc::now();
        let cutoff = now
            .checked_sub_signed(ChronoDuration::days(i64::from(retention_days)))
            .ok_or_else(|| {
                HarvestError::invalid_value("retention_days", "retention window out of range")
            })?;

        info!(
            retention_days,
            cutoff = %cutoff.to_rfc3339(),
            rules = self.policy.rules.len(),
            "Starting retention sweep"
        );

        let mut result = RetentionResult::new();
        for rule in &self.policy.rules {
            let outcome = match self.registry.resolve(&rule.category) {
                Ok(table) => match ctx.check(OPERATION) {
                    Ok(()) => {
                        let filter = rule.filter(cutoff, now);
                        ctx.race(OPERATION, self.store.delete_many(&table, &filter))
                            .await
                            .map_err(|e| {
                                let in_doubt = e.is_interruption();
                                (e, in_doubt)
                            })
                    }
                    Err(e) => Err((e, false)),
                },
                Err(e) => Err((e, false)),
            };

            match outcome {
                Ok(deleted) => {
                    info!(category = %rule.category, deleted, "Retention rule applied");
                    result.record(rule.category.clone(), deleted);
                }
                Err((source, in_doubt)) => {
                    warn!(
                        category = %rule.category,
                        completed = result.len(),
                        in_doubt,
                        error = %source,
                        "Retention sweep aborted"
                    );
                    return Err(RetentionCategoryFailure {
                        category: rule.category.clone(),
                        completed: result,
                        in_doubt,
                        source: Box::new(source),
                    }
                    .into());
                }
            }
        }

        info!(total_deleted = result.total(), "Retention sweep complete");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FaultyStore, MemoryStore};
    use crate::registry::default_registry;
    use crate::store::InsertOptions;
    use harvest_core::Record;
    use serde_json::json;
    use std::time::Duration;

    fn rows(values: Vec<serde_json::Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn days_ago(days: i64) -> String {
        (Utc::now() - ChronoDuration::days(days)).to_rfc3339()
    }

    async fn seed(store: &dyn DataStore) {
        let registry = default_registry();
        let logs = registry.resolve(categories::SYSTEM_LOG).unwrap();
        let access = registry.resolve(categories::ACCESS_LOG).unwrap();
        let metrics = registry.resolve(categories::CACHE_METRIC).unwrap();
        let opts = InsertOptions::default();

        store
            .insert_many(
                &logs,
                &rows(vec![
                    json!({ "level": "debug", "created_at": days_ago(40) }),
                    json!({ "level": "info", "created_at": days_ago(40) }),
                    json!({ "level": "warn", "created_at": days_ago(31) }),
                    json!({ "level": "error", "created_at": days_ago(90) }),
                    json!({ "level": "fatal", "created_at": days_ago(90) }),
                    json!({ "level": "info", "created_at": days_ago(2) }),
                ]),
                opts,
            )
            .await
            .unwrap();
        store
            .insert_many(
                &access,
                &rows(vec![
                    json!({ "status_code": 200, "created_at": days_ago(45) }),
                    json!({ "status_code": 302, "created_at": days_ago(45) }),
                    json!({ "status_code": 404, "created_at": days_ago(45) }),
                    json!({ "status_code": 500, "created_at": days_ago(45) }),
                    json!({ "status_code": 200, "created_at": days_ago(1) }),
                ]),
                opts,
            )
            .await
            .unwrap();
        store
            .insert_many(
                &metrics,
                &rows(vec![
                    json!({ "cache_key": "a", "expires_at": days_ago(1) }),
                    json!({ "cache_key": "b", "expires_at": days_ago(-1) }),
                ]),
                opts,
            )
            .await
            .unwrap();
    }

    fn sweeper(store: Arc<dyn DataStore>) -> RetentionSweeper {
        RetentionSweeper::new(store, Arc::new(default_registry()), RetentionPolicy::standard())
    }

    #[tokio::test]
    async fn test_standard_policy_keeps_errors_and_recent_rows() {
        let store = Arc::new(MemoryStore::new());
        seed(&*store).await;

        let result = sweeper(store.clone())
            .cleanup_old_data(30, &OpContext::background())
            .await
            .unwrap();

        assert_eq!(result.get(categories::SYSTEM_LOG), Some(3));
        assert_eq!(result.get(categories::ACCESS_LOG), Some(2));
        assert_eq!(result.get(categories::CACHE_METRIC), Some(1));
        assert_eq!(result.total(), 6);

        let levels: Vec<String> = store
            .rows("system_logs")
            .unwrap()
            .iter()
            .map(|r| r["level"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(levels, vec!["error", "fatal", "info"]);
    }

    #[tokio::test]
    async fn test_second_run_deletes_nothing() {
        let store = Arc::new(MemoryStore::new());
        seed(&*store).await;
        let sweeper = sweeper(store);
        let ctx = OpContext::background();

        sweeper.cleanup_old_data(30, &ctx).await.unwrap();
        let second = sweeper.cleanup_old_data(30, &ctx).await.unwrap();
        assert_eq!(second.total(), 0);
        assert_eq!(second.len(), 3);
    }

    #[tokio::test]
    async fn test_zero_days_purges_everything_eligible() {
        let store = Arc::new(MemoryStore::new());
        seed(&*store).await;

        let result = sweeper(store.clone())
            .cleanup_old_data(0, &OpContext::background())
            .await
            .unwrap();

        assert_eq!(result.get(categories::SYSTEM_LOG), Some(4));
        assert_eq!(result.get(categories::ACCESS_LOG), Some(3));
        assert_eq!(store.row_count("system_logs").unwrap(), 2);
        assert_eq!(store.row_count("api_access_logs").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failure_reports_completed_categories() {
        let store = Arc::new(FaultyStore::failing_table(MemoryStore::new(), "api_access_logs"));
        seed(store.inner()).await;

        let err = sweeper(store.clone())
            .cleanup_old_data(30, &OpContext::background())
            .await
            .unwrap_err();

        match err {
            HarvestError::Retention(failure) => {
                assert_eq!(failure.category, categories::ACCESS_LOG);
                assert_eq!(failure.completed.get(categories::SYSTEM_LOG), Some(3));
                assert_eq!(failure.completed.len(), 1);
                assert!(!failure.in_doubt);
            }
            other => panic!("expected retention failure, got {:?}", other),
        }
        // The cache-metric rule never ran.
        assert_eq!(store.inner().row_count("cache_metrics").unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_delete_that_landed_is_in_doubt() {
        let store = Arc::new(MemoryStore::new().with_ack_latency(Duration::from_millis(60)));
        seed(&*store).await;
        // Seeding took three acknowledgements; start the clock from here.
        let ctx = OpContext::with_timeout(Duration::from_millis(100));

        let err = sweeper(store.clone())
            .cleanup_old_data(30, &ctx)
            .await
            .unwrap_err();

        match err {
            HarvestError::Retention(failure) => {
                assert_eq!(failure.category, categories::ACCESS_LOG);
                assert_eq!(failure.completed.get(categories::SYSTEM_LOG), Some(3));
                assert!(failure.in_doubt);
                assert!(failure.source.is_interruption());
            }
            other => panic!("expected retention failure, got {:?}", other),
        }
        // The abandoned delete was applied anyway.
        assert_eq!(store.row_count("api_access_logs").unwrap(), 3);
        assert_eq!(store.row_count("cache_metrics").unwrap(), 2);
    }

    #[test]
    fn test_rule_filter_composition() {
        let now = Utc::now();
        let cutoff = now - ChronoDuration::days(30);
        let policy = RetentionPolicy::standard();

        let logs = policy.rules[0].filter(cutoff, now);
        assert_eq!(logs.conditions.len(), 2);
        assert_eq!(logs.conditions[0].field, "created_at");
        assert_eq!(logs.conditions[0].value, FilterValue::Timestamp(cutoff));

        let metrics = policy.rules[2].filter(cutoff, now);
        assert_eq!(metrics.conditions.len(), 1);
        assert_eq!(metrics.conditions[0].value, FilterValue::Timestamp(now));
    }
}
