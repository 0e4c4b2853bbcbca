//! `DataStore` decorator reporting every call to a query observer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use harvest_core::{Filter, HarvestResult, Record};
use tokio::time::Instant;

use super::{observe, QueryEvent, QueryObserver, QueryOutcome};
use crate::registry::TableSpec;
use crate::sql::{self, quote_ident, SqlValue, Statement};
use crate::store::{DataStore, FindQuery, InsertOptions};

/// Wraps a store so that every call is timed and observed.
///
/// The inner result is returned unchanged. Structured calls are described by
/// the SQL they render to, so they classify the same way as raw statements.
pub struct MonitoredStore<S> {
    inner: S,
    observer: Arc<dyn QueryObserver>,
    faults: AtomicU64,
}

impl<S: DataStore> MonitoredStore<S> {
    pub fn new(inner: S, observer: Arc<dyn QueryObserver>) -> Self {
        Self {
            inner,
            observer,
            faults: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Panics of the wrapped observer caught by this store. A chain counts
    /// its members' panics itself.
    pub fn observer_faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    fn report(&self, text: &str, param_count: usize, started: Instant, outcome: QueryOutcome) {
        let event = QueryEvent {
            text,
            duration: started.elapsed(),
            param_count,
            outcome,
        };
        if !observe(self.observer.as_ref(), &event) {
            self.faults.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn outcome_of<T>(result: &HarvestResult<T>, rows: impl FnOnce(&T) -> u64) -> QueryOutcome {
    match result {
        Ok(value) => QueryOutcome::Success { rows: rows(value) },
        Err(_) => QueryOutcome::Failure,
    }
}

/// Statement text and parameter count, or a bare verb-and-table description
/// when the call cannot be rendered (it will then fail validation inside the
/// store as well).
fn describe(rendered: HarvestResult<Statement>, fallback: impl FnOnce() -> String) -> (String, usize) {
    match rendered {
        Ok(statement) => (statement.text, statement.params.len()),
        Err(_) => (fallback(), 0),
    }
}

#[async_trait]
impl<S: DataStore> DataStore for MonitoredStore<S> {
    async fn execute_query(&self, sql: &str, params: &[SqlValue]) -> HarvestResult<Vec<Record>> {
        let started = Instant::now();
        let result = self.inner.execute_query(sql, params).await;
        self.report(sql, params.len(), started, outcome_of(&result, |rows| rows.len() as u64));
        result
    }

    async fn execute_statement(&self, sql: &str, params: &[SqlValue]) -> HarvestResult<u64> {
        let started = Instant::now();
        let result = self.inner.execute_statement(sql, params).await;
        self.report(sql, params.len(), started, outcome_of(&result, |n| *n));
        result
    }

    async fn insert_many(
        &self,
        table: &TableSpec,
        records: &[Record],
        options: InsertOptions,
    ) -> HarvestResult<u64> {
        let (text, param_count) = describe(sql::render_insert(table, records, options), || {
            format!("INSERT INTO {}", quote_ident(&table.table))
        });
        let started = Instant::now();
        let result = self.inner.insert_many(table, records, options).await;
        self.report(&text, param_count, started, outcome_of(&result, |n| *n));
        result
    }

    async fn find_many(&self, table: &TableSpec, query: &FindQuery) -> HarvestResult<Vec<Record>> {
        let (text, param_count) = describe(sql::render_find(table, query), || {
            format!("SELECT FROM {}", quote_ident(&table.table))
        });
        let started = Instant::now();
        let result = self.inner.find_many(table, query).await;
        self.report(&text, param_count, started, outcome_of(&result, |rows| rows.len() as u64));
        result
    }

    async fn count(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        let (text, param_count) = describe(sql::render_count(table, filter), || {
            format!("SELECT COUNT(*) FROM {}", quote_ident(&table.table))
        });
        let started = Instant::now();
        let result = self.inner.count(table, filter).await;
        self.report(&text, param_count, started, outcome_of(&result, |_| 1));
        result
    }

    async fn delete_many(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        let (text, param_count) = describe(sql::render_delete(table, filter), || {
            format!("DELETE FROM {}", quote_ident(&table.table))
        });
        let started = Instant::now();
        let result = self.inner.delete_many(table, filter).await;
        self.report(&text, param_count, started, outcome_of(&result, |n| *n));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FaultyStore, MemoryStore};
    use crate::monitor::QueryMonitor;
    use crate::registry::{categories, default_registry};
    use harvest_core::QueryVerb;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(String, usize, QueryOutcome)>>,
    }

    impl QueryObserver for Recorder {
        fn on_query(&self, event: &QueryEvent<'_>) {
            self.events
                .lock()
                .unwrap()
                .push((event.text.to_string(), event.param_count, event.outcome));
        }
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_structured_calls_are_observed_as_sql() {
        let registry = default_registry();
        let logs = registry.resolve(categories::SYSTEM_LOG).unwrap();
        let recorder = Arc::new(Recorder::default());
        let store = MonitoredStore::new(MemoryStore::new(), recorder.clone());

        let inserted = store
            .insert_many(
                &logs,
                &[record(json!({ "level": "info", "message": "boot" }))],
                InsertOptions::skip_duplicates(),
            )
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let total = store.count(&logs, &Filter::all().eq("level", "info")).await.unwrap();
        assert_eq!(total, 1);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].0.starts_with("INSERT INTO \"system_logs\""));
        assert_eq!(events[0].1, 2);
        assert_eq!(events[0].2, QueryOutcome::Success { rows: 1 });
        assert!(events[1].0.starts_with("SELECT COUNT(*)"));
        assert_eq!(events[1].1, 1);
    }

    #[tokio::test]
    async fn test_failures_are_observed_and_returned_unchanged() {
        let registry = default_registry();
        let logs = registry.resolve(categories::SYSTEM_LOG).unwrap();
        let monitor = Arc::new(QueryMonitor::default());
        let store = MonitoredStore::new(FaultyStore::failing_call(MemoryStore::new(), 0), monitor.clone());

        let result = store.delete_many(&logs, &Filter::all()).await;
        assert!(result.is_err());
        assert_eq!(monitor.query_stats()[&QueryVerb::Delete].count, 1);
    }

    struct Panicking;

    impl QueryObserver for Panicking {
        fn on_query(&self, _event: &QueryEvent<'_>) {
            panic!("observer bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_observer_is_counted() {
        let registry = default_registry();
        let logs = registry.resolve(categories::SYSTEM_LOG).unwrap();
        let store = MonitoredStore::new(MemoryStore::new(), Arc::new(Panicking));

        let inserted = store
            .insert_many(&logs, &[record(json!({ "level": "warn" }))], InsertOptions::default())
            .await
            .unwrap();
        let total = store.count(&logs, &Filter::all()).await.unwrap();

        assert_eq!((inserted, total), (1, 1));
        assert_eq!(store.observer_faults(), 2);
    }

    #[tokio::test]
    async fn test_raw_statements_keep_their_text() {
        let recorder = Arc::new(Recorder::default());
        let store = MonitoredStore::new(MemoryStore::new(), recorder.clone());

        let _ = store.execute_statement("VACUUM ANALYZE", &[]).await;
        let events = recorder.events.lock().unwrap();
        assert_eq!(events[0].0, "VACUUM ANALYZE");
    }
}
