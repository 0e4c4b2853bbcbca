//! Prometheus Metrics Definitions
//!
//! Collectors for statement traffic, slow queries, cache state and
//! retention sweeps, registered once in the default registry.

use std::time::Duration;

use harvest_core::{QueryVerb, RetentionResult};
use harvest_storage::{CacheStats, QueryEvent, QueryObserver, QueryOutcome};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_counter_vec,
    CounterVec, Encoder, Gauge, HistogramVec, IntCounterVec, TextEncoder,
};

use crate::error::{ServiceError, ServiceResult};

/// Database statement latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s
const DB_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ServiceResult<HarvestMetrics>> = Lazy::new(HarvestMetrics::new);

/// Container for all Harvest metrics.
#[derive(Clone)]
pub struct HarvestMetrics {
    /// Statement counter - labels: verb, status
    pub db_queries_total: IntCounterVec,

    /// Statement duration histogram - labels: verb
    pub db_query_duration_seconds: HistogramVec,

    /// Statements above the slow-query threshold - labels: verb
    pub db_slow_queries_total: IntCounterVec,

    /// Entries held by the expiring cache
    pub cache_entries: Gauge,

    /// Aggregate cache hit ratio (0.0 to 1.0)
    pub cache_hit_ratio: Gauge,

    /// Rows deleted by retention sweeps - labels: category
    pub retention_rows_deleted_total: CounterVec,

    /// Retention sweeps - labels: status
    pub retention_runs_total: IntCounterVec,
}

fn registration(name: &str) -> impl FnOnce(prometheus::Error) -> ServiceError + '_ {
    move |e| {
        tracing::error!(metric = name, error = %e, "Failed to register metric");
        ServiceError::Metrics(e)
    }
}

impl HarvestMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ServiceResult<Self> {
        Ok(Self {
            db_queries_total: register_int_counter_vec!(
                "harvest_db_queries_total",
                "Total number of database statements",
                &["verb", "status"]
            )
            .map_err(registration("harvest_db_queries_total"))?,

            db_query_duration_seconds: register_histogram_vec!(
                "harvest_db_query_duration_seconds",
                "Database statement duration in seconds",
                &["verb"],
                DB_LATENCY_BUCKETS.to_vec()
            )
            .map_err(registration("harvest_db_query_duration_seconds"))?,

            db_slow_queries_total: register_int_counter_vec!(
                "harvest_db_slow_queries_total",
                "Statements slower than the slow-query threshold",
                &["verb"]
            )
            .map_err(registration("harvest_db_slow_queries_total"))?,

            cache_entries: register_gauge!(
                "harvest_cache_entries",
                "Entries currently held by the expiring cache"
            )
            .map_err(registration("harvest_cache_entries"))?,

            cache_hit_ratio: register_gauge!(
                "harvest_cache_hit_ratio",
                "Aggregate hit ratio of the expiring cache"
            )
            .map_err(registration("harvest_cache_hit_ratio"))?,

            retention_rows_deleted_total: register_counter_vec!(
                "harvest_retention_rows_deleted_total",
                "Rows deleted by retention sweeps",
                &["category"]
            )
            .map_err(registration("harvest_retention_rows_deleted_total"))?,

            retention_runs_total: register_int_counter_vec!(
                "harvest_retention_runs_total",
                "Retention sweeps by outcome",
                &["status"]
            )
            .map_err(registration("harvest_retention_runs_total"))?,
        })
    }

    /// Record one executed statement.
    pub fn record_query(&self, verb: QueryVerb, success: bool, duration: Duration, slow: bool) {
        let verb = verb_label(verb);
        let status = if success { "success" } else { "error" };
        self.db_queries_total.with_label_values(&[verb, status]).inc();
        self.db_query_duration_seconds
            .with_label_values(&[verb])
            .observe(duration.as_secs_f64());
        if slow {
            self.db_slow_queries_total.with_label_values(&[verb]).inc();
        }
    }

    pub fn record_cache(&self, stats: &CacheStats) {
        self.cache_entries.set(stats.entry_count as f64);
        self.cache_hit_ratio.set(stats.hit_ratio);
    }

    /// Record a sweep. `deleted` holds whatever categories completed, also
    /// for a failed sweep.
    pub fn record_retention(&self, deleted: &RetentionResult, success: bool) {
        for (category, rows) in deleted.iter() {
            self.retention_rows_deleted_total
                .with_label_values(&[category])
                .inc_by(rows as f64);
        }
        let status = if success { "success" } else { "error" };
        self.retention_runs_total.with_label_values(&[status]).inc();
    }
}

fn verb_label(verb: QueryVerb) -> &'static str {
    match verb {
        QueryVerb::Select => "select",
        QueryVerb::Insert => "insert",
        QueryVerb::Update => "update",
        QueryVerb::Delete => "delete",
        QueryVerb::Other => "other",
    }
}

// ============================================================================
// OBSERVER
// ============================================================================

/// Query observer exporting every statement to Prometheus.
///
/// Chained after the in-process monitor; uses the same threshold so the
/// slow counter matches the slow-query log.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusObserver {
    slow_threshold: Duration,
}

impl PrometheusObserver {
    /// Fails when the collectors could not be registered.
    pub fn new(slow_threshold: Duration) -> ServiceResult<Self> {
        if let Err(e) = METRICS.as_ref() {
            return Err(ServiceError::Telemetry(format!("Metrics unavailable: {}", e)));
        }
        Ok(Self { slow_threshold })
    }
}

impl QueryObserver for PrometheusObserver {
    fn on_query(&self, event: &QueryEvent<'_>) {
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_query(
                QueryVerb::classify(event.text),
                matches!(event.outcome, QueryOutcome::Success { .. }),
                event.duration,
                event.duration > self.slow_threshold,
            );
        }
    }
}

/// Encode the default registry in Prometheus text format.
pub fn render_metrics() -> ServiceResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| ServiceError::Telemetry(format!("Metrics output is not UTF-8: {}", e)))
}
