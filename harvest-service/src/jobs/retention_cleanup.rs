//! Retention Cleanup Background Task
//!
//! Runs the layer's retention sweep on a fixed interval until shutdown.
//! Each run gets its own deadline and is cancelled by the shutdown signal,
//! so a long sweep cannot hold up process exit.
//!
//! # Configuration
//!
//! ```rust
//! use harvest_service::jobs::RetentionJobConfig;
//! use std::time::Duration;
//!
//! let config = RetentionJobConfig {
//!     check_interval: Duration::from_secs(86_400), // Once a day
//!     retention_days: 30,                          // Keep a month
//!     run_timeout: Duration::from_secs(600),       // Give up after 10 minutes
//!     export_metrics: true,
//! };
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use harvest_core::{HarvestError, PerfConfig, RetentionResult};
use harvest_storage::{OpContext, PerfLayer};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::constants::{DEFAULT_RETENTION_CHECK_INTERVAL_SECS, DEFAULT_RETENTION_RUN_TIMEOUT_SECS};
use crate::error::{ServiceError, ServiceResult};
use crate::telemetry::METRICS;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the retention cleanup task.
#[derive(Debug, Clone)]
pub struct RetentionJobConfig {
    /// How often to sweep (default: 24 hours)
    pub check_interval: Duration,

    /// Rows older than this many days are eligible (default: 30)
    pub retention_days: u32,

    /// Deadline for a single sweep (default: 10 minutes)
    pub run_timeout: Duration,

    /// Export sweep results to Prometheus (default: true)
    pub export_metrics: bool,
}

impl Default for RetentionJobConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_RETENTION_CHECK_INTERVAL_SECS),
            retention_days: PerfConfig::default().retention_days,
            run_timeout: Duration::from_secs(DEFAULT_RETENTION_RUN_TIMEOUT_SECS),
            export_metrics: true,
        }
    }
}

impl RetentionJobConfig {
    /// Create RetentionJobConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `HARVEST_RETENTION_CHECK_INTERVAL_SECS`: Sweep interval (default: 86400)
    /// - `HARVEST_RETENTION_DAYS`: Retention window (default: 30)
    /// - `HARVEST_RETENTION_RUN_TIMEOUT_SECS`: Per-sweep deadline (default: 600)
    /// - `HARVEST_METRICS_ENABLED`: Export to Prometheus (default: true)
    pub fn from_env() -> Self {
        let d = Self::default();

        let check_interval = Duration::from_secs(
            std::env::var("HARVEST_RETENTION_CHECK_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETENTION_CHECK_INTERVAL_SECS),
        );

        let retention_days = std::env::var("HARVEST_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(d.retention_days);

        let run_timeout = Duration::from_secs(
            std::env::var("HARVEST_RETENTION_RUN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETENTION_RUN_TIMEOUT_SECS),
        );

        let export_metrics = std::env::var("HARVEST_METRICS_ENABLED")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(d.export_metrics);

        Self {
            check_interval,
            retention_days,
            run_timeout,
            export_metrics,
        }
    }

    /// Short interval and window for local runs.
    pub fn development() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            retention_days: 1,
            run_timeout: Duration::from_secs(30),
            export_metrics: true,
        }
    }

    /// Longer window and deadline for production data volumes.
    pub fn production() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_RETENTION_CHECK_INTERVAL_SECS),
            retention_days: 90,
            run_timeout: Duration::from_secs(1800), // 30 minutes
            export_metrics: true,
        }
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.check_interval.is_zero() {
            return Err(ServiceError::config(
                "HARVEST_RETENTION_CHECK_INTERVAL_SECS",
                "interval must be positive",
            ));
        }
        if self.run_timeout.is_zero() {
            return Err(ServiceError::config(
                "HARVEST_RETENTION_RUN_TIMEOUT_SECS",
                "timeout must be positive",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for retention cleanup activity.
#[derive(Debug, Default)]
pub struct RetentionJobMetrics {
    /// Sweeps started since startup
    pub cycles: AtomicU64,

    /// Rows deleted since startup, including by sweeps that later failed
    pub rows_deleted: AtomicU64,

    /// Sweeps that ended in an error
    pub errors: AtomicU64,
}

impl RetentionJobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RetentionJobSnapshot {
        RetentionJobSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            rows_deleted: self.rows_deleted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of job counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionJobSnapshot {
    pub cycles: u64,
    pub rows_deleted: u64,
    pub errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that periodically runs the retention sweep.
///
/// The first sweep runs immediately. The task returns its counters once
/// `shutdown_rx` turns `true` or its sender is dropped.
pub async fn retention_cleanup_task(
    layer: Arc<PerfLayer>,
    config: RetentionJobConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<RetentionJobMetrics> {
    let metrics = Arc::new(RetentionJobMetrics::new());

    let mut cleanup_interval = interval(config.check_interval);
    cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        retention_days = config.retention_days,
        run_timeout_secs = config.run_timeout.as_secs(),
        "Retention cleanup task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Retention cleanup task shutting down");
                    break;
                }
            }

            _ = cleanup_interval.tick() => {
                run_cycle(&layer, &config, &shutdown_rx, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        rows_deleted = snapshot.rows_deleted,
        errors = snapshot.errors,
        "Retention cleanup task completed"
    );

    metrics
}

/// Perform one sweep.
async fn run_cycle(
    layer: &PerfLayer,
    config: &RetentionJobConfig,
    shutdown_rx: &watch::Receiver<bool>,
    metrics: &RetentionJobMetrics,
) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);
    let ctx = OpContext::with_timeout(config.run_timeout).with_cancel(shutdown_rx.clone());

    match layer.cleanup_old_data(config.retention_days, &ctx).await {
        Ok(result) => {
            metrics.rows_deleted.fetch_add(result.total(), Ordering::Relaxed);
            export(config, &result, true);
            if result.total() > 0 {
                tracing::info!(deleted = result.total(), "Retention cycle completed");
            } else {
                tracing::debug!("Retention cycle completed with nothing to delete");
            }
        }
        Err(HarvestError::Retention(failure)) => {
            metrics
                .rows_deleted
                .fetch_add(failure.completed.total(), Ordering::Relaxed);
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            export(config, &failure.completed, false);
            if failure.source.is_interruption() {
                tracing::warn!(
                    category = %failure.category,
                    in_doubt = failure.in_doubt,
                    error = %failure.source,
                    "Retention cycle interrupted"
                );
            } else {
                tracing::error!(
                    category = %failure.category,
                    deleted_before_failure = failure.completed.total(),
                    in_doubt = failure.in_doubt,
                    error = %failure.source,
                    "Retention cycle failed"
                );
            }
        }
        Err(e) => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            export(config, &RetentionResult::new(), false);
            tracing::error!(error = %e, "Retention cycle failed");
        }
    }
}

fn export(config: &RetentionJobConfig, deleted: &RetentionResult, success: bool) {
    if !config.export_metrics {
        return;
    }
    if let Ok(prom) = METRICS.as_ref() {
        prom.record_retention(deleted, success);
    }
}

// ============================================================================
// TESTS
// ============================================================================
