//! Error types for Harvest operations

use crate::outcome::{ChunkResult, RetentionResult};
use thiserror::Error;

/// Data-layer errors raised by a store or the category registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },

    #[error("Unknown category: {category}")]
    UnknownCategory { category: String },

    #[error("Unsupported operation on {category}: {reason}")]
    Unsupported { category: String, reason: String },

    #[error("Row decode failed for {category}: {reason}")]
    DecodeFailed { category: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Caller-supplied argument errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown field {field} on category {category}")]
    UnknownField { category: String, field: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// A chunk of a batch insert failed.
///
/// Chunks listed in `completed` were committed before the failure and are
/// NOT rolled back. Chunks after `chunk_index` were never attempted.
///
/// When `in_doubt` is set, the failing chunk's statement had already been
/// sent when the deadline or cancellation abandoned it, so the store may
/// still have committed it. `committed_rows` is then a lower bound.
#[derive(Debug, Clone, Error)]
#[error(
    "Batch insert into {category} failed at chunk {chunk_index} ({attempted} records, {} earlier chunk(s) committed): {source}",
    .completed.len()
)]
pub struct BatchChunkFailure {
    pub category: String,
    pub chunk_index: usize,
    pub attempted: usize,
    pub completed: Vec<ChunkResult>,
    pub in_doubt: bool,
    pub source: Box<HarvestError>,
}

impl BatchChunkFailure {
    /// Total rows inserted by the chunks that committed before the failure.
    pub fn committed_rows(&self) -> u64 {
        self.completed.iter().map(|c| c.inserted).sum()
    }
}

/// One category of a retention sweep failed.
///
/// `completed` holds the counts of categories that were deleted before the
/// failing one. `in_doubt` means the failing category's delete was abandoned
/// in flight and may still have been applied.
#[derive(Debug, Clone, Error)]
#[error(
    "Retention sweep failed on {category} after {} completed category delete(s): {source}",
    .completed.len()
)]
pub struct RetentionCategoryFailure {
    pub category: String,
    pub completed: RetentionResult,
    pub in_doubt: bool,
    pub source: Box<HarvestError>,
}

/// Master error type for all Harvest errors.
#[derive(Debug, Clone, Error)]
pub enum HarvestError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Batch(#[from] BatchChunkFailure),

    #[error("{0}")]
    Retention(#[from] RetentionCategoryFailure),

    #[error("Operation {operation} was cancelled")]
    Cancelled { operation: String },

    #[error("Operation {operation} exceeded its deadline")]
    DeadlineExceeded { operation: String },
}

impl HarvestError {
    /// True for errors caused by the caller's context rather than the store.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }

    /// Shorthand for a [`ValidationError::InvalidValue`].
    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        })
    }
}

/// Result type alias for Harvest operations.
pub type HarvestResult<T> = Result<T, HarvestError>;

// =============================================================================
// TESTS
// =============================================================================
