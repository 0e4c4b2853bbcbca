//! In-memory stores for tests and local runs.
//!
//! [`MemoryStore`] evaluates filters, ordering, windows, projection and
//! relation embedding with the same semantics as the rendered SQL, and it
//! validates every call by rendering the statement a SQL store would run.
//! [`FaultyStore`] wraps any store and injects failures.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use harvest_core::{
    Condition, Direction, Filter, FilterValue, HarvestResult, OrderBy, Record, StorageError,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::registry::{ColumnType, TableSpec};
use crate::sql::{self, SqlValue};
use crate::store::{DataStore, FindQuery, InsertOptions};

// ============================================================================
// MEMORY STORE
// ============================================================================

/// A `DataStore` holding rows in process memory, keyed by table name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    next_id: AtomicU64,
    calls: AtomicU64,
    latency: Option<Duration>,
    ack_latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (uses the Tokio clock).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Apply every call at once but hold its reply for `latency`, like a
    /// server that commits before the acknowledgement reaches the client.
    pub fn with_ack_latency(mut self, latency: Duration) -> Self {
        self.ack_latency = Some(latency);
        self
    }

    /// Calls received so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Snapshot of every row in `table`, in insertion order.
    pub fn rows(&self, table: &str) -> HarvestResult<Vec<Record>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.get(table).cloned().unwrap_or_default())
    }

    pub fn row_count(&self, table: &str) -> HarvestResult<usize> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.get(table).map_or(0, Vec::len))
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn acknowledge<T>(&self, result: HarvestResult<T>) -> HarvestResult<T> {
        if let Some(latency) = self.ack_latency {
            tokio::time::sleep(latency).await;
        }
        result
    }

    /// Fill in values the database would default: a primary key and the
    /// creation timestamp.
    fn with_defaults(&self, table: &TableSpec, mut record: Record) -> Record {
        if let Some(explicit) = record.get(&table.primary_key).and_then(JsonValue::as_u64) {
            self.next_id.fetch_max(explicit, Ordering::Relaxed);
        }
        if !record.contains_key(&table.primary_key) {
            let column_type = table
                .column_def(&table.primary_key)
                .map(|c| c.column_type)
                .unwrap_or(ColumnType::BigInt);
            let id = match column_type {
                ColumnType::Uuid => JsonValue::String(Uuid::now_v7().to_string()),
                ColumnType::Text => {
                    JsonValue::String((self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string())
                }
                _ => JsonValue::from(self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
            };
            record.insert(table.primary_key.clone(), id);
        }
        if table.column_def(&table.created_at).is_ok() && !record.contains_key(&table.created_at) {
            record.insert(
                table.created_at.clone(),
                JsonValue::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
            );
        }
        record
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn execute_query(&self, _sql: &str, _params: &[SqlValue]) -> HarvestResult<Vec<Record>> {
        self.enter().await;
        Err(StorageError::Unsupported {
            category: "raw".to_string(),
            reason: "the in-memory store does not execute SQL text".to_string(),
        }
        .into())
    }

    async fn execute_statement(&self, _sql: &str, _params: &[SqlValue]) -> HarvestResult<u64> {
        self.enter().await;
        Err(StorageError::Unsupported {
            category: "raw".to_string(),
            reason: "the in-memory store does not execute SQL text".to_string(),
        }
        .into())
    }

    async fn insert_many(
        &self,
        table: &TableSpec,
        records: &[Record],
        options: InsertOptions,
    ) -> HarvestResult<u64> {
        self.enter().await;
        let applied = self.insert_rows(table, records, options);
        self.acknowledge(applied).await
    }

    async fn find_many(&self, table: &TableSpec, query: &FindQuery) -> HarvestResult<Vec<Record>> {
        self.enter().await;
        let found = self.find_rows(table, query);
        self.acknowledge(found).await
    }

    async fn count(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        self.enter().await;
        let counted = self.count_rows(table, filter);
        self.acknowledge(counted).await
    }

    async fn delete_many(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        self.enter().await;
        let deleted = self.delete_rows(table, filter);
        self.acknowledge(deleted).await
    }
}

// Row operations run under the table lock and never await.
impl MemoryStore {
    fn insert_rows(
        &self,
        table: &TableSpec,
        records: &[Record],
        options: InsertOptions,
    ) -> HarvestResult<u64> {
        sql::render_insert(table, records, options)?;

        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let existing = tables.entry(table.table.clone()).or_default();

        // One statement: either every accepted row lands or none does.
        let mut accepted: Vec<Record> = Vec::with_capacity(records.len());
        for record in records {
            let record = self.with_defaults(table, record.clone());
            let key = record.get(&table.primary_key);
            let duplicate = existing
                .iter()
                .chain(accepted.iter())
                .any(|row| row.get(&table.primary_key) == key);
            if duplicate {
                if options.skip_duplicates {
                    continue;
                }
                return Err(StorageError::ConstraintViolation {
                    constraint: format!("{}_pkey", table.table),
                    reason: format!("duplicate key {:?}", key),
                }
                .into());
            }
            accepted.push(record);
        }

        let inserted = accepted.len() as u64;
        existing.extend(accepted);
        Ok(inserted)
    }

    fn find_rows(&self, table: &TableSpec, query: &FindQuery) -> HarvestResult<Vec<Record>> {
        sql::render_find(table, query)?;
        let filter = typed_filter(table, &query.filter);

        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut rows: Vec<&Record> = tables
            .get(&table.table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).collect())
            .unwrap_or_default();

        rows.sort_by(|a, b| compare_rows(a, b, &query.order_by));

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        let mut out = Vec::new();
        for row in rows.into_iter().skip(skip).take(limit) {
            let mut shaped: Record = match &query.select {
                Some(fields) => fields
                    .iter()
                    .map(|f| (f.clone(), row.get(f).cloned().unwrap_or(JsonValue::Null)))
                    .collect(),
                None => row.clone(),
            };
            for name in &query.include {
                let relation = table.relation_def(name)?;
                let key = row.get(&table.primary_key);
                let related: Vec<JsonValue> = tables
                    .get(&relation.table)
                    .map(|rows| {
                        rows.iter()
                            .filter(|r| key.is_some() && r.get(&relation.foreign_key) == key)
                            .map(|r| JsonValue::Object(r.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                shaped.insert(relation.name.clone(), JsonValue::Array(related));
            }
            out.push(shaped);
        }
        Ok(out)
    }

    fn count_rows(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        sql::render_count(table, filter)?;
        let filter = typed_filter(table, filter);

        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let total = tables
            .get(&table.table)
            .map_or(0, |rows| rows.iter().filter(|r| filter.matches(r)).count());
        Ok(total as u64)
    }

    fn delete_rows(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        sql::render_delete(table, filter)?;
        let filter = typed_filter(table, filter);

        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(rows) = tables.get_mut(&table.table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok((before - rows.len()) as u64)
    }
}

/// Give text operands on timestamp columns the type SQL casts them to, so
/// they compare as instants rather than as strings.
fn typed_filter(table: &TableSpec, filter: &Filter) -> Filter {
    let conditions = filter
        .conditions
        .iter()
        .map(|condition| {
            let is_timestamp = table
                .column_def(&condition.field)
                .is_ok_and(|c| c.column_type == ColumnType::Timestamp);
            let value = if is_timestamp {
                as_timestamp(&condition.value)
            } else {
                condition.value.clone()
            };
            Condition {
                value,
                ..condition.clone()
            }
        })
        .collect();
    Filter { conditions }
}

fn as_timestamp(value: &FilterValue) -> FilterValue {
    match value {
        FilterValue::Text(text) => DateTime::parse_from_rfc3339(text)
            .map(|ts| FilterValue::Timestamp(ts.with_timezone(&Utc)))
            .unwrap_or_else(|_| value.clone()),
        FilterValue::List(items) => FilterValue::List(items.iter().map(as_timestamp).collect()),
        other => other.clone(),
    }
}

fn compare_rows(a: &Record, b: &Record, order_by: &[OrderBy]) -> CmpOrdering {
    for order in order_by {
        let left = a.get(&order.field).unwrap_or(&JsonValue::Null);
        let right = b.get(&order.field).unwrap_or(&JsonValue::Null);
        let ord = compare_values(left, right);
        let ord = match order.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != CmpOrdering::Equal {
            return ord;
        }
    }
    CmpOrdering::Equal
}

/// Ascending order of stored values. NULL sorts after every value, as in
/// PostgreSQL.
fn compare_values(a: &JsonValue, b: &JsonValue) -> CmpOrdering {
    match (a, b) {
        (JsonValue::Null, JsonValue::Null) => CmpOrdering::Equal,
        (JsonValue::Null, _) => CmpOrdering::Greater,
        (_, JsonValue::Null) => CmpOrdering::Less,
        (JsonValue::Number(x), JsonValue::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        _ => CmpOrdering::Equal,
    }
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// Wraps a store and fails selected calls with `StorageError::QueryFailed`.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    fail_call: Option<u64>,
    fail_table: Option<String>,
    calls: AtomicU64,
}

impl<S: DataStore> FaultyStore<S> {
    /// Fail the call with zero-based index `index`; every other call passes
    /// through.
    pub fn failing_call(inner: S, index: u64) -> Self {
        Self {
            inner,
            fail_call: Some(index),
            fail_table: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Fail every structured call against `table`.
    pub fn failing_table(inner: S, table: impl Into<String>) -> Self {
        Self {
            inner,
            fail_call: None,
            fail_table: Some(table.into()),
            calls: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Calls received so far, including failed ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn gate(&self, table: Option<&str>) -> HarvestResult<()> {
        let index = self.calls.fetch_add(1, Ordering::Relaxed);
        let by_index = self.fail_call == Some(index);
        let by_table = table.is_some() && self.fail_table.as_deref() == table;
        if by_index || by_table {
            return Err(StorageError::QueryFailed {
                reason: format!("injected fault on call {}", index),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl<S: DataStore> DataStore for FaultyStore<S> {
    async fn execute_query(&self, sql: &str, params: &[SqlValue]) -> HarvestResult<Vec<Record>> {
        self.gate(None)?;
        self.inner.execute_query(sql, params).await
    }

    async fn execute_statement(&self, sql: &str, params: &[SqlValue]) -> HarvestResult<u64> {
        self.gate(None)?;
        self.inner.execute_statement(sql, params).await
    }

    async fn insert_many(
        &self,
        table: &TableSpec,
        records: &[Record],
        options: InsertOptions,
    ) -> HarvestResult<u64> {
        self.gate(Some(&table.table))?;
        self.inner.insert_many(table, records, options).await
    }

    async fn find_many(&self, table: &TableSpec, query: &FindQuery) -> HarvestResult<Vec<Record>> {
        self.gate(Some(&table.table))?;
        self.inner.find_many(table, query).await
    }

    async fn count(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        self.gate(Some(&table.table))?;
        self.inner.count(table, filter).await
    }

    async fn delete_many(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        self.gate(Some(&table.table))?;
        self.inner.delete_many(table, filter).await
    }
}
