//! Shared Application State
//!
//! One [`PerfLayer`] per process, shared by `Arc` between the binary's
//! report loop and the background jobs.

use std::sync::Arc;
use std::time::Instant;

use harvest_storage::{default_registry, DataStore, PerfLayer, QueryObserver};

use crate::config::ServiceConfig;
use crate::db::PgStore;
use crate::error::ServiceResult;
use crate::telemetry::PrometheusObserver;

/// State shared by everything the service runs.
#[derive(Clone)]
pub struct AppState {
    pub layer: Arc<PerfLayer>,
    pub start_time: Instant,
}

impl AppState {
    /// Build the layer over a Postgres pool.
    ///
    /// The pool connects lazily, so this succeeds without a reachable server.
    pub fn connect(config: &ServiceConfig) -> ServiceResult<Self> {
        let store = PgStore::from_config(&config.db)?;
        tracing::info!(
            host = %config.db.host,
            port = config.db.port,
            dbname = %config.db.dbname,
            max_size = config.db.max_size,
            "Database pool created"
        );
        Self::from_store(store, config)
    }

    /// Build the layer over any store.
    ///
    /// With metrics enabled, every statement is also exported to Prometheus.
    pub fn from_store<S>(store: S, config: &ServiceConfig) -> ServiceResult<Self>
    where
        S: DataStore + 'static,
    {
        let mut observers: Vec<Arc<dyn QueryObserver>> = Vec::new();
        if config.telemetry.metrics_enabled {
            observers.push(Arc::new(PrometheusObserver::new(
                config.perf.slow_query_threshold,
            )?));
        }

        let layer = PerfLayer::new(store, default_registry(), config.perf.clone(), observers)?;

        Ok(Self {
            layer: Arc::new(layer),
            start_time: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
