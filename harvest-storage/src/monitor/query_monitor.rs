//! Per-verb query statistics and slow-query capture.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use harvest_core::{PerfConfig, QueryVerb};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::slow_log::{truncate_chars, QueryRecord, SlowQueryLog};
use super::{QueryEvent, QueryObserver};

/// Aggregated timings of one statement verb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTypeStats {
    pub count: u64,
    pub total_duration_ms: f64,
    pub avg_duration_ms: f64,
}

impl QueryTypeStats {
    fn from_totals(count: u64, total_nanos: u64) -> Self {
        let total_duration_ms = total_nanos as f64 / 1_000_000.0;
        let avg_duration_ms = if count == 0 {
            0.0
        } else {
            total_duration_ms / count as f64
        };
        Self {
            count,
            total_duration_ms,
            avg_duration_ms,
        }
    }
}

#[derive(Debug, Default)]
struct VerbBucket {
    count: AtomicU64,
    total_nanos: AtomicU64,
}

/// In-process statement monitor.
///
/// Verb buckets are lock-free; only the slow-query log takes a lock, and
/// only for statements over the threshold.
#[derive(Debug)]
pub struct QueryMonitor {
    buckets: [VerbBucket; 5],
    slow_log: Mutex<SlowQueryLog>,
    threshold: Duration,
    text_limit: usize,
    observer_faults: AtomicU64,
}

impl QueryMonitor {
    /// `threshold` is exclusive: a statement taking exactly `threshold` is
    /// not slow.
    pub fn new(threshold: Duration, capacity: usize, text_limit: usize) -> Self {
        Self {
            buckets: Default::default(),
            slow_log: Mutex::new(SlowQueryLog::new(capacity)),
            threshold,
            text_limit,
            observer_faults: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &PerfConfig) -> Self {
        Self::new(
            config.slow_query_threshold,
            config.slow_query_capacity,
            config.slow_query_text_limit,
        )
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Record one statement.
    pub fn record(&self, text: &str, duration: Duration) {
        let verb = QueryVerb::classify(text);
        let bucket = &self.buckets[verb.index()];
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        bucket.count.fetch_add(1, Ordering::Relaxed);
        bucket.total_nanos.fetch_add(nanos, Ordering::Relaxed);

        if duration <= self.threshold {
            return;
        }

        let record = QueryRecord {
            verb,
            duration_ms: duration.as_secs_f64() * 1000.0,
            recorded_at: Utc::now(),
            text: truncate_chars(text, self.text_limit),
        };
        warn!(
            verb = %verb,
            duration_ms = record.duration_ms,
            threshold_ms = self.threshold.as_millis() as u64,
            query = %record.text,
            "Slow query"
        );

        match self.slow_log.lock() {
            Ok(mut log) => log.push(record),
            Err(_) => {
                self.observer_faults.fetch_add(1, Ordering::Relaxed);
                warn!(verb = %verb, "Slow query log unavailable, record dropped");
            }
        }
    }

    /// Statistics for every verb, including verbs never seen.
    pub fn query_stats(&self) -> BTreeMap<QueryVerb, QueryTypeStats> {
        QueryVerb::ALL
            .iter()
            .map(|verb| {
                let bucket = &self.buckets[verb.index()];
                let stats = QueryTypeStats::from_totals(
                    bucket.count.load(Ordering::Relaxed),
                    bucket.total_nanos.load(Ordering::Relaxed),
                );
                (*verb, stats)
            })
            .collect()
    }

    /// Up to `n` of the most recent slow queries, newest first.
    pub fn recent_slow_queries(&self, n: usize) -> Vec<QueryRecord> {
        match self.slow_log.lock() {
            Ok(log) => log.recent(n),
            Err(_) => {
                self.observer_faults.fetch_add(1, Ordering::Relaxed);
                warn!("Slow query log unavailable");
                Vec::new()
            }
        }
    }

    /// Slow queries seen since creation or the last [`reset`](Self::reset),
    /// including ones already displaced from the ring buffer.
    pub fn slow_query_count(&self) -> u64 {
        match self.slow_log.lock() {
            Ok(log) => log.total_recorded(),
            Err(_) => {
                self.observer_faults.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Internal faults swallowed while recording.
    pub fn observer_faults(&self) -> u64 {
        self.observer_faults.load(Ordering::Relaxed)
    }

    /// Zero every counter and empty the slow-query log.
    pub fn reset(&self) {
        for bucket in &self.buckets {
            bucket.count.store(0, Ordering::Relaxed);
            bucket.total_nanos.store(0, Ordering::Relaxed);
        }
        match self.slow_log.lock() {
            Ok(mut log) => log.clear(),
            Err(poisoned) => {
                // Clearing leaves a consistent log behind.
                poisoned.into_inner().clear();
                self.slow_log.clear_poison();
            }
        }
    }
}

impl Default for QueryMonitor {
    fn default() -> Self {
        Self::from_config(&PerfConfig::default())
    }
}

impl QueryObserver for QueryMonitor {
    fn on_query(&self, event: &QueryEvent<'_>) {
        self.record(event.text, event.duration);
    }
}
