//! Query monitoring.
//!
//! Every statement the layer sends to the store passes through a
//! [`MonitoredStore`], which times the call and reports a [`QueryEvent`] to a
//! [`QueryObserver`]. The in-process [`QueryMonitor`] is one observer;
//! exporters (Prometheus in the service crate) are others, combined with an
//! [`ObserverChain`].
//!
//! Observers run synchronously on the caller's task. They must not block on
//! I/O. A panicking observer is caught, counted and logged; it never fails
//! the query it was observing.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

pub mod monitored_store;
pub mod query_monitor;
pub mod slow_log;

pub use monitored_store::MonitoredStore;
pub use query_monitor::{QueryMonitor, QueryTypeStats};
pub use slow_log::{QueryRecord, SlowQueryLog};

/// How a statement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Rows returned or affected.
    Success { rows: u64 },
    Failure,
}

/// One executed statement as seen by observers.
#[derive(Debug, Clone, Copy)]
pub struct QueryEvent<'a> {
    pub text: &'a str,
    pub duration: Duration,
    pub param_count: usize,
    pub outcome: QueryOutcome,
}

/// Receives every statement executed through a [`MonitoredStore`].
pub trait QueryObserver: Send + Sync {
    fn on_query(&self, event: &QueryEvent<'_>);
}

/// Deliver `event`, swallowing a panicking observer. Returns `false` when the
/// observer faulted.
pub(crate) fn observe(observer: &dyn QueryObserver, event: &QueryEvent<'_>) -> bool {
    match catch_unwind(AssertUnwindSafe(|| observer.on_query(event))) {
        Ok(()) => true,
        Err(_) => {
            warn!(
                query_len = event.text.len(),
                duration_ms = event.duration.as_secs_f64() * 1000.0,
                "Query observer panicked, event dropped"
            );
            false
        }
    }
}

/// Fans one event out to several observers, in registration order.
#[derive(Default)]
pub struct ObserverChain {
    observers: Vec<Arc<dyn QueryObserver>>,
    faults: AtomicU64,
}

impl ObserverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: Arc<dyn QueryObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Observer panics caught by this chain.
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ObserverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverChain")
            .field("observers", &self.observers.len())
            .field("faults", &self.faults())
            .finish()
    }
}

impl QueryObserver for ObserverChain {
    fn on_query(&self, event: &QueryEvent<'_>) {
        for observer in &self.observers {
            if !observe(observer.as_ref(), event) {
                self.faults.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::QueryVerb;

    struct Panicking;

    impl QueryObserver for Panicking {
        fn on_query(&self, _event: &QueryEvent<'_>) {
            panic!("observer bug");
        }
    }

    fn event(text: &str, ms: u64) -> QueryEvent<'_> {
        QueryEvent {
            text,
            duration: Duration::from_millis(ms),
            param_count: 0,
            outcome: QueryOutcome::Success { rows: 1 },
        }
    }

    #[test]
    fn test_chain_delivers_to_every_observer() {
        let first = Arc::new(QueryMonitor::default());
        let second = Arc::new(QueryMonitor::default());
        let chain = ObserverChain::new()
            .with(first.clone())
            .with(second.clone());

        chain.on_query(&event("SELECT 1", 3));

        assert_eq!(first.query_stats()[&QueryVerb::Select].count, 1);
        assert_eq!(second.query_stats()[&QueryVerb::Select].count, 1);
        assert_eq!(chain.faults(), 0);
    }

    #[test]
    fn test_panicking_observer_is_contained() {
        let monitor = Arc::new(QueryMonitor::default());
        let chain = ObserverChain::new()
            .with(Arc::new(Panicking))
            .with(monitor.clone());

        chain.on_query(&event("DELETE FROM cache_metrics", 2));

        assert_eq!(chain.faults(), 1);
        assert_eq!(monitor.query_stats()[&QueryVerb::Delete].count, 1);
    }
}
