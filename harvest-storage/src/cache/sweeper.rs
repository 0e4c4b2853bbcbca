//! Background task reclaiming expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use harvest_core::{HarvestError, HarvestResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::store::ExpiringCache;

/// Handle to a running sweeper task.
///
/// Call [`SweeperHandle::shutdown`] to stop the task and wait for it.
/// Dropping the handle only signals the task to stop.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the task to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Cache sweeper task ended abnormally");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl<V> ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Spawn a task calling [`ExpiringCache::sweep`] every `period`.
    ///
    /// The first sweep happens one full period after the call. Missed ticks
    /// are skipped rather than replayed.
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> HarvestResult<SweeperHandle> {
        if period.is_zero() {
            return Err(HarvestError::invalid_value(
                "cache_sweep_interval",
                "sweep interval must be positive",
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let cache = Arc::clone(self);

        let task = tokio::spawn(async move {
            info!(interval_secs = period.as_secs_f64(), "Cache sweeper started");

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = cache.len(), "Swept expired cache entries");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Cache sweeper stopped");
        });

        Ok(SweeperHandle {
            shutdown_tx,
            task: Some(task),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_expired_entries() {
        let cache = Arc::new(ExpiringCache::new(16));
        cache.set("short", 1u32, Duration::from_secs(5));
        cache.set("long", 2u32, Duration::from_secs(600));
        cache.get("short");

        let handle = cache.start_sweeper(Duration::from_secs(60)).unwrap();

        sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.len(), 2);
        assert!(cache.key_stats("short").is_some());

        sleep(Duration::from_secs(31)).await;
        assert_eq!(cache.len(), 1);
        assert!(cache.key_stats("short").is_none());
        assert_eq!(cache.get("long"), Some(2));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let cache: Arc<ExpiringCache<u32>> = Arc::new(ExpiringCache::new(16));
        let handle = cache.start_sweeper(Duration::from_secs(1)).unwrap();
        assert!(!handle.is_finished());
        handle.shutdown().await;
        // The task released its clone of the cache.
        assert_eq!(Arc::strong_count(&cache), 1);
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let cache: Arc<ExpiringCache<u32>> = Arc::new(ExpiringCache::new(16));
        assert!(cache.start_sweeper(Duration::ZERO).is_err());
    }
}
