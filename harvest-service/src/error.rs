//! Error Types for the Harvest Service
//!
//! `ServiceError` covers startup and wiring failures. Data-path failures
//! stay `HarvestError` so they reach callers of the layer unchanged; the
//! helpers at the bottom translate driver errors into that taxonomy.

use harvest_core::{HarvestError, StorageError};
use thiserror::Error;
use tokio_postgres::error::SqlState;

// ============================================================================
// SERVICE ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Harvest(#[from] HarvestError),

    #[error("Failed to create connection pool: {0}")]
    Pool(String),

    #[error("Telemetry initialization failed: {0}")]
    Telemetry(String),

    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Invalid service configuration: {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// ============================================================================
// DRIVER ERROR TRANSLATION
// ============================================================================

/// Map a `tokio_postgres` error into the storage taxonomy.
///
/// Integrity violations keep the constraint name so callers can tell a
/// duplicate from a broken statement.
pub(crate) fn pg_error(err: tokio_postgres::Error) -> HarvestError {
    if let Some(db) = err.as_db_error() {
        let code = db.code();
        let integrity = code == &SqlState::UNIQUE_VIOLATION
            || code == &SqlState::FOREIGN_KEY_VIOLATION
            || code == &SqlState::NOT_NULL_VIOLATION
            || code == &SqlState::CHECK_VIOLATION;
        if integrity {
            return StorageError::ConstraintViolation {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
                reason: db.message().to_string(),
            }
            .into();
        }
        return StorageError::QueryFailed {
            reason: format!("{} ({})", db.message(), code.code()),
        }
        .into();
    }

    if err.is_closed() {
        StorageError::ConnectionFailed {
            reason: err.to_string(),
        }
        .into()
    } else {
        StorageError::QueryFailed {
            reason: err.to_string(),
        }
        .into()
    }
}

/// Map a pool checkout failure into the storage taxonomy.
pub(crate) fn pool_error(err: deadpool_postgres::PoolError) -> HarvestError {
    tracing::error!(error = %err, "Connection pool error");
    StorageError::ConnectionFailed {
        reason: err.to_string(),
    }
    .into()
}
