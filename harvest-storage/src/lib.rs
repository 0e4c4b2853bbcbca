//! Harvest Storage - Database Performance Layer
//!
//! In-process building blocks that sit between the traceability service and
//! its relational store:
//!
//! - [`cache`]: expiring key/value cache with per-key hit/miss accounting
//! - [`monitor`]: statement timing, per-verb statistics, slow-query log
//! - [`batch`]: chunked inserts with fail-fast partial-failure semantics
//! - [`paginate`]: offset pagination with concurrent data/count queries
//! - [`retention`]: policy-driven deletion of old rows
//! - [`report`]: snapshot of all of the above
//!
//! [`PerfLayer`] wires one instance of each around a [`DataStore`].

pub mod batch;
pub mod cache;
pub mod context;
pub mod layer;
pub mod mock;
pub mod monitor;
pub mod paginate;
pub mod registry;
pub mod report;
pub mod retention;
pub mod sql;
pub mod store;

pub use batch::BatchWriter;
pub use cache::{CacheStats, CacheStatsSource, ExpiringCache, KeyStats, SweeperHandle};
pub use context::OpContext;
pub use layer::PerfLayer;
pub use mock::{FaultyStore, MemoryStore};
pub use monitor::{
    MonitoredStore, ObserverChain, QueryEvent, QueryMonitor, QueryObserver, QueryOutcome,
    QueryRecord, QueryTypeStats,
};
pub use paginate::Paginator;
pub use registry::{categories, default_registry, CategoryRegistry, Column, ColumnType, Relation, TableSpec};
pub use report::{PerformanceReport, PerformanceReporter, SlowQuerySummary};
pub use retention::{RetentionAge, RetentionPolicy, RetentionRule, RetentionSweeper};
pub use sql::{SqlValue, Statement};
pub use store::{DataStore, FindQuery, InsertOptions};
