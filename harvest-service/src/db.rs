//! Database Connection Pool and Postgres Store
//!
//! [`PgStore`] implements the layer's `DataStore` over a `deadpool-postgres`
//! pool. Statements come from `harvest_storage::sql`; rows come back as a
//! single `jsonb` column and are converted to records without per-type
//! decoding.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use harvest_core::{Filter, HarvestResult, Record, StorageError};
use harvest_storage::sql::{self, SqlValue, Statement};
use harvest_storage::{DataStore, FindQuery, InsertOptions, TableSpec};
use serde_json::Value as JsonValue;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::constants::{
    DEFAULT_DB_HOST, DEFAULT_DB_NAME, DEFAULT_DB_POOL_SIZE, DEFAULT_DB_PORT,
    DEFAULT_DB_TIMEOUT_SECS, DEFAULT_DB_USER,
};
use crate::error::{pg_error, pool_error, ServiceError, ServiceResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait, create and recycle timeout for pooled connections
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            dbname: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: String::new(),
            max_size: DEFAULT_DB_POOL_SIZE,
            timeout: Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
        }
    }
}

impl DbConfig {
    /// Create a database configuration from environment variables.
    ///
    /// - `HARVEST_DB_HOST`, `HARVEST_DB_PORT`, `HARVEST_DB_NAME`,
    ///   `HARVEST_DB_USER`, `HARVEST_DB_PASSWORD`
    /// - `HARVEST_DB_POOL_SIZE` (default: 16)
    /// - `HARVEST_DB_TIMEOUT` in seconds (default: 30)
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HARVEST_DB_HOST").unwrap_or_else(|_| DEFAULT_DB_HOST.to_string()),
            port: std::env::var("HARVEST_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_PORT),
            dbname: std::env::var("HARVEST_DB_NAME").unwrap_or_else(|_| DEFAULT_DB_NAME.to_string()),
            user: std::env::var("HARVEST_DB_USER").unwrap_or_else(|_| DEFAULT_DB_USER.to_string()),
            password: std::env::var("HARVEST_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("HARVEST_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_POOL_SIZE),
            timeout: Duration::from_secs(
                std::env::var("HARVEST_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DB_TIMEOUT_SECS),
            ),
        }
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.max_size == 0 {
            return Err(ServiceError::config("HARVEST_DB_POOL_SIZE", "pool size must be greater than 0"));
        }
        if self.timeout.is_zero() {
            return Err(ServiceError::config("HARVEST_DB_TIMEOUT", "timeout must be positive"));
        }
        Ok(())
    }

    /// Create a connection pool from this configuration.
    ///
    /// No connection is opened until the first checkout.
    pub fn create_pool(&self) -> ServiceResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut timeouts = Timeouts::new();
        timeouts.wait = Some(self.timeout);
        timeouts.create = Some(self.timeout);
        timeouts.recycle = Some(self.timeout);
        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts = timeouts;
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ServiceError::Pool(e.to_string()))
    }
}

// ============================================================================
// PARAMETER BINDING
// ============================================================================

/// Borrow a statement parameter as a `tokio_postgres` argument.
///
/// `None` binds as a typed `NULL`.
pub fn as_to_sql(value: &SqlValue) -> &(dyn ToSql + Sync) {
    match value {
        SqlValue::Text(v) => v,
        SqlValue::BigInt(v) => v,
        SqlValue::Double(v) => v,
        SqlValue::Bool(v) => v,
        SqlValue::Timestamp(v) => v,
        SqlValue::Json(v) => v,
        SqlValue::Uuid(v) => v,
    }
}

fn bind(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(as_to_sql).collect()
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

/// `DataStore` backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ServiceResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> HarvestResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Run one write in its own transaction.
    ///
    /// If this future is dropped before `COMMIT` is sent, the open
    /// transaction rolls back, so an abandoned write applies only when the
    /// commit itself was already in flight.
    async fn execute_in_transaction(&self, statement: &Statement) -> HarvestResult<u64> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(pg_error)?;
        let affected = tx
            .execute(&statement.text, &bind(&statement.params))
            .await
            .map_err(pg_error)?;
        tx.commit().await.map_err(pg_error)?;
        Ok(affected)
    }
}

/// Convert a one-column `jsonb` row into a record.
fn decode_row(source: &str, row: &Row) -> HarvestResult<Record> {
    let value: JsonValue = row.try_get(0).map_err(pg_error)?;
    match value {
        JsonValue::Object(record) => Ok(record),
        other => Err(StorageError::DecodeFailed {
            category: source.to_string(),
            reason: format!("expected a JSON object row, got {}", other),
        }
        .into()),
    }
}

#[async_trait]
impl DataStore for PgStore {
    /// Rows are returned through a CTE so that `RETURNING` clauses work
    /// as well as plain `SELECT`s.
    async fn execute_query(&self, sql: &str, params: &[SqlValue]) -> HarvestResult<Vec<Record>> {
        let conn = self.get_conn().await?;
        let wrapped = format!("WITH q AS ({}) SELECT to_jsonb(q) AS row FROM q", sql);
        let rows = conn
            .query(&wrapped, &bind(params))
            .await
            .map_err(pg_error)?;
        rows.iter().map(|row| decode_row("raw query", row)).collect()
    }

    async fn execute_statement(&self, sql: &str, params: &[SqlValue]) -> HarvestResult<u64> {
        let conn = self.get_conn().await?;
        conn.execute(sql, &bind(params)).await.map_err(pg_error)
    }

    async fn insert_many(
        &self,
        table: &TableSpec,
        records: &[Record],
        options: InsertOptions,
    ) -> HarvestResult<u64> {
        let statement = sql::render_insert(table, records, options)?;
        self.execute_in_transaction(&statement).await
    }

    async fn find_many(&self, table: &TableSpec, query: &FindQuery) -> HarvestResult<Vec<Record>> {
        let statement = sql::render_find(table, query)?;
        let conn = self.get_conn().await?;
        let rows = conn
            .query(&statement.text, &bind(&statement.params))
            .await
            .map_err(pg_error)?;
        rows.iter().map(|row| decode_row(&table.category, row)).collect()
    }

    async fn count(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        let statement = sql::render_count(table, filter)?;
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(&statement.text, &bind(&statement.params))
            .await
            .map_err(pg_error)?;
        let count: i64 = row.try_get(0).map_err(pg_error)?;
        u64::try_from(count).map_err(|_| {
            StorageError::DecodeFailed {
                category: table.category.clone(),
                reason: format!("negative row count {}", count),
            }
            .into()
        })
    }

    async fn delete_many(&self, table: &TableSpec, filter: &Filter) -> HarvestResult<u64> {
        let statement = sql::render_delete(table, filter)?;
        self.execute_in_transaction(&statement).await
    }
}
