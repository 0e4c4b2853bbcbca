//! Harvest Core - Query Model, Configuration and Errors
//!
//! Pure data structures shared by the performance layer and its host
//! service. This crate performs no I/O.

use chrono::{DateTime, Utc};

pub mod config;
pub mod error;
pub mod outcome;
pub mod page;
pub mod query;

pub use config::PerfConfig;
pub use error::{
    BatchChunkFailure, ConfigError, HarvestError, HarvestResult, RetentionCategoryFailure,
    StorageError, ValidationError,
};
pub use outcome::{ChunkResult, RetentionResult};
pub use page::{PageRequest, PageResult, Pagination};
pub use query::{CompareOp, Condition, Direction, Filter, FilterValue, OrderBy, QueryVerb, Record};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
