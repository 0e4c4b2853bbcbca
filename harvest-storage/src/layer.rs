//! Wiring of the performance layer.

use std::sync::Arc;

use harvest_core::{
    ChunkResult, HarvestResult, PageRequest, PageResult, PerfConfig, Record, RetentionResult,
};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::batch::BatchWriter;
use crate::cache::{ExpiringCache, SweeperHandle};
use crate::context::OpContext;
use crate::monitor::{MonitoredStore, ObserverChain, QueryMonitor, QueryObserver};
use crate::paginate::Paginator;
use crate::registry::CategoryRegistry;
use crate::report::{PerformanceReport, PerformanceReporter};
use crate::retention::{RetentionPolicy, RetentionSweeper};
use crate::store::DataStore;

/// One cache, one monitor, and the operations that run through the
/// monitored store.
///
/// Construct exactly one per process and share it by `Arc`.
pub struct PerfLayer {
    config: PerfConfig,
    registry: Arc<CategoryRegistry>,
    cache: Arc<ExpiringCache<JsonValue>>,
    monitor: Arc<QueryMonitor>,
    observers: Arc<ObserverChain>,
    store: Arc<dyn DataStore>,
    batch: BatchWriter,
    paginator: Paginator,
    retention: RetentionSweeper,
    reporter: PerformanceReporter,
}

impl PerfLayer {
    /// Wrap `store` in a monitored store and build every component.
    ///
    /// `extra_observers` receive every query after the built-in monitor.
    pub fn new<S>(
        store: S,
        registry: CategoryRegistry,
        config: PerfConfig,
        extra_observers: Vec<Arc<dyn QueryObserver>>,
    ) -> HarvestResult<Self>
    where
        S: DataStore + 'static,
    {
        Self::with_policy(store, registry, config, extra_observers, RetentionPolicy::standard())
    }

    pub fn with_policy<S>(
        store: S,
        registry: CategoryRegistry,
        config: PerfConfig,
        extra_observers: Vec<Arc<dyn QueryObserver>>,
        policy: RetentionPolicy,
    ) -> HarvestResult<Self>
    where
        S: DataStore + 'static,
    {
        config.validate()?;

        let registry = Arc::new(registry);
        let cache = Arc::new(ExpiringCache::from_config(&config));
        let monitor = Arc::new(QueryMonitor::from_config(&config));

        let mut chain = ObserverChain::new().with(monitor.clone());
        for observer in extra_observers {
            chain.push(observer);
        }
        let observers = Arc::new(chain);

        let store: Arc<dyn DataStore> = Arc::new(MonitoredStore::new(store, observers.clone()));

        let batch = BatchWriter::new(store.clone(), registry.clone(), config.batch_chunk_size);
        let paginator = Paginator::new(store.clone(), registry.clone(), &config);
        let retention = RetentionSweeper::new(store.clone(), registry.clone(), policy);
        let reporter = PerformanceReporter::new(
            cache.clone(),
            monitor.clone(),
            config.report_recent_slow_queries,
        );

        info!(
            categories = registry.len(),
            observers = observers.len(),
            slow_query_threshold_ms = config.slow_query_threshold.as_millis() as u64,
            cache_max_entries = config.cache_max_entries,
            "Performance layer ready"
        );

        Ok(Self {
            config,
            registry,
            cache,
            monitor,
            observers,
            store,
            batch,
            paginator,
            retention,
            reporter,
        })
    }

    pub fn config(&self) -> &PerfConfig {
        &self.config
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// The shared cache. Read-through is the caller's job.
    pub fn cache(&self) -> &Arc<ExpiringCache<JsonValue>> {
        &self.cache
    }

    pub fn monitor(&self) -> &Arc<QueryMonitor> {
        &self.monitor
    }

    /// The monitored store, for application queries that should be counted.
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub async fn batch_insert(
        &self,
        category: &str,
        records: &[Record],
        chunk_size: Option<usize>,
        ctx: &OpContext,
    ) -> HarvestResult<Vec<ChunkResult>> {
        self.batch.insert_batches(category, records, chunk_size, ctx).await
    }

    pub async fn paginate(
        &self,
        category: &str,
        request: PageRequest,
        ctx: &OpContext,
    ) -> HarvestResult<PageResult> {
        self.paginator.paginate(category, request, ctx).await
    }

    pub async fn cleanup_old_data(
        &self,
        retention_days: u32,
        ctx: &OpContext,
    ) -> HarvestResult<RetentionResult> {
        self.retention.cleanup_old_data(retention_days, ctx).await
    }

    pub fn deep_page_warnings(&self) -> u64 {
        self.paginator.deep_page_warnings()
    }

    pub fn performance_report(&self) -> PerformanceReport {
        let mut report = self.reporter.performance_report();
        report.observer_faults += self.observers.faults();
        report
    }

    /// Start the periodic cache sweep at the configured interval.
    pub fn start_cache_sweeper(&self) -> HarvestResult<SweeperHandle> {
        self.cache.start_sweeper(self.config.cache_sweep_interval)
    }
}
