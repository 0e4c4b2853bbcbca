//! Harvest Service Entry Point
//!
//! Reads configuration, builds the performance layer over Postgres, starts
//! the cache sweeper and the retention job, and logs a performance report
//! periodically until Ctrl-C.

use harvest_service::jobs::retention_cleanup_task;
use harvest_service::telemetry::{init_tracing, METRICS};
use harvest_service::{AppState, ServiceConfig, ServiceResult};
use harvest_storage::PerfLayer;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let config = ServiceConfig::from_env();
    init_tracing(&config.telemetry)?;
    config.validate()?;

    let state = AppState::connect(&config)?;
    let sweeper = state.layer.start_cache_sweeper()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let retention = tokio::spawn(retention_cleanup_task(
        state.layer.clone(),
        config.retention.clone(),
        shutdown_rx,
    ));

    let mut report_interval = interval(config.telemetry.report_interval);
    report_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    report_interval.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = report_interval.tick() => {
                log_report(&state.layer, config.telemetry.metrics_enabled);
            }
        }
    }

    let _ = shutdown_tx.send(true);
    sweeper.shutdown().await;
    match retention.await {
        Ok(metrics) => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                cycles = snapshot.cycles,
                rows_deleted = snapshot.rows_deleted,
                errors = snapshot.errors,
                "Retention job stopped"
            );
        }
        Err(e) => tracing::warn!(error = %e, "Retention job ended abnormally"),
    }

    log_report(&state.layer, config.telemetry.metrics_enabled);
    tracing::info!(uptime_secs = state.uptime_secs(), "Harvest service stopped");
    Ok(())
}

fn log_report(layer: &PerfLayer, export: bool) {
    let report = layer.performance_report();
    if export {
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_cache(&report.cache);
        }
    }

    match serde_json::to_string(&report) {
        Ok(json) => tracing::info!(
            cache_entries = report.cache.entry_count,
            hit_ratio = report.cache.hit_ratio,
            slow_queries = report.slow_query_count,
            deep_page_warnings = layer.deep_page_warnings(),
            report = %json,
            "Performance report"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize performance report"),
    }
}
