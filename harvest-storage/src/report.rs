//! Performance snapshot for dashboards and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use harvest_core::QueryVerb;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheStats, CacheStatsSource};
use crate::monitor::{QueryMonitor, QueryRecord, QueryTypeStats};

/// A slow query as exposed in reports: no parameters, text already cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowQuerySummary {
    pub verb: QueryVerb,
    pub duration_ms: f64,
    pub recorded_at: DateTime<Utc>,
    pub text: String,
}

impl From<QueryRecord> for SlowQuerySummary {
    fn from(record: QueryRecord) -> Self {
        Self {
            verb: record.verb,
            duration_ms: record.duration_ms,
            recorded_at: record.recorded_at,
            text: record.text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub cache: CacheStats,
    pub queries: BTreeMap<QueryVerb, QueryTypeStats>,
    pub slow_query_count: u64,
    pub recent_slow_queries: Vec<SlowQuerySummary>,
    pub observer_faults: u64,
}

/// Read-only aggregation over a cache and a query monitor.
pub struct PerformanceReporter {
    cache: Arc<dyn CacheStatsSource>,
    monitor: Arc<QueryMonitor>,
    recent_slow: usize,
}

impl PerformanceReporter {
    pub fn new(cache: Arc<dyn CacheStatsSource>, monitor: Arc<QueryMonitor>, recent_slow: usize) -> Self {
        Self {
            cache,
            monitor,
            recent_slow,
        }
    }

    pub fn performance_report(&self) -> PerformanceReport {
        PerformanceReport {
            generated_at: Utc::now(),
            cache: self.cache.cache_stats(),
            queries: self.monitor.query_stats(),
            slow_query_count: self.monitor.slow_query_count(),
            recent_slow_queries: self
                .monitor
                .recent_slow_queries(self.recent_slow)
                .into_iter()
                .map(SlowQuerySummary::from)
                .collect(),
            observer_faults: self.monitor.observer_faults(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ExpiringCache;
    use std::time::Duration;

    #[test]
    fn test_report_aggregates_cache_and_queries() {
        let cache = Arc::new(ExpiringCache::new(16));
        cache.set("f1", 1u32, Duration::from_secs(60));
        cache.get("f1");
        cache.get("f1");

        let monitor = Arc::new(QueryMonitor::new(Duration::from_millis(100), 10, 200));
        monitor.record("SELECT * FROM factories", Duration::from_millis(5));
        for i in 0..4 {
            monitor.record(&format!("DELETE FROM system_logs WHERE id = {}", i), Duration::from_millis(150));
        }

        let reporter = PerformanceReporter::new(cache, monitor, 3);
        let report = reporter.performance_report();

        assert_eq!(report.cache.entry_count, 1);
        assert_eq!(report.cache.hits, 2);
        assert_eq!(report.queries[&QueryVerb::Select].count, 1);
        assert_eq!(report.queries[&QueryVerb::Delete].count, 4);
        assert_eq!(report.slow_query_count, 4);
        assert_eq!(report.recent_slow_queries.len(), 3);
        assert!(report.recent_slow_queries[0].text.ends_with("= 3"));
    }

    #[test]
    fn test_report_serializes_with_verb_keys() {
        let cache: Arc<ExpiringCache<u32>> = Arc::new(ExpiringCache::new(4));
        let monitor = Arc::new(QueryMonitor::default());
        monitor.record("UPDATE users SET role = $1", Duration::from_millis(1));

        let report = PerformanceReporter::new(cache, monitor, 10).performance_report();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["queries"]["UPDATE"]["count"], 1);
        assert_eq!(json["slowQueryCount"], 0);
        assert!(json["cache"]["hitRatio"].is_number());
    }
}
