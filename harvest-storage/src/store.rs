//! The data-store boundary.
//!
//! Everything the performance layer does to the database goes through
//! [`DataStore`]. Implementations live elsewhere (Postgres in the service
//! crate, [`crate::mock::MemoryStore`] for tests); the layer wraps whichever
//! one it is given in a [`crate::monitor::MonitoredStore`].

use async_trait::async_trait;
use harvest_core::{Filter, HarvestResult, OrderBy, Record};

use crate::registry::TableSpec;
use crate::sql::SqlValue;

/// Options for [`DataStore::insert_many`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Silently skip rows whose primary key already exists.
    pub skip_duplicates: bool,
}

impl InsertOptions {
    pub fn skip_duplicates() -> Self {
        Self {
            skip_duplicates: true,
        }
    }
}

/// A bounded read against one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub order_by: Vec<OrderBy>,
    pub skip: u64,
    pub limit: Option<u64>,
    /// Projection; `None` returns every column.
    pub select: Option<Vec<String>>,
    /// Names of [`crate::registry::Relation`]s to embed.
    pub include: Vec<String>,
}

/// Generic query-execution capability.
///
/// Implementations must be safe to share between tasks. Errors are reported
/// as [`harvest_core::HarvestError::Storage`] and are propagated unchanged
/// by every caller in this crate.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Run a row-returning statement.
    async fn execute_query(&self, sql: &str, params: &[SqlValue]) -> HarvestResult<Vec<Record>>;

    /// Run a statement and return the affected row count.
    async fn execute_statement(&self, sql: &str, params: &[SqlValue]) -> HarvestResult<u64>;

    /// Insert many records in one call. Returns the number inserted.
    async fn insert_many(
        &self,
        table: &TableSpec,
        records: &[Record],
        options: InsertOptions,
    ) -> HarvestResult<u64>;

    /// Fetch records matching a query.
    async fn find_many(&self, table: &TableSpec, query: &FindQuery) -> HarvestResult<Vec<Record>>;

    /// Count records matching a filter.
    async fn count(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64>;

    /// Delete records matching a filter. Returns the number deleted.
    async fn delete_many(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64>;
}

/// Shared stores: lets a caller keep a handle on a store it hands to the
/// layer.
#[async_trait]
impl<S: DataStore + ?Sized> DataStore for std::sync::Arc<S> {
    async fn execute_query(&self, sql: &str, params: &[SqlValue]) -> HarvestResult<Vec<Record>> {
        (**self).execute_query(sql, params).await
    }

    async fn execute_statement(&self, sql: &str, params: &[SqlValue]) -> HarvestResult<u64> {
        (**self).execute_statement(sql, params).await
    }

    async fn insert_many(
        &self,
        table: &TableSpec,
        records: &[Record],
        options: InsertOptions,
    ) -> HarvestResult<u64> {
        (**self).insert_many(table, records, options).await
    }

    async fn find_many(&self, table: &TableSpec, query: &FindQuery) -> HarvestResult<Vec<Record>> {
        (**self).find_many(table, query).await
    }

    async fn count(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        (**self).count(table, filter).await
    }

    async fn delete_many(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        (**self).delete_many(table, filter).await
    }
}
