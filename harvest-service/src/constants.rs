//! Constants for the Harvest Service
//!
//! Defaults for everything the service reads from the environment. Layer
//! tunables (cache, monitor, pagination) default in `PerfConfig`.

// ============================================================================
// DATABASE
// ============================================================================

pub const DEFAULT_DB_HOST: &str = "localhost";

pub const DEFAULT_DB_PORT: u16 = 5432;

pub const DEFAULT_DB_NAME: &str = "harvest";

pub const DEFAULT_DB_USER: &str = "postgres";

/// Maximum pooled connections
pub const DEFAULT_DB_POOL_SIZE: usize = 16;

/// Pool wait/create/recycle timeout in seconds
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// RETENTION JOB
// ============================================================================

/// Default interval between retention sweeps (24 hours)
pub const DEFAULT_RETENTION_CHECK_INTERVAL_SECS: u64 = 86_400;

/// Default upper bound for a single sweep (10 minutes)
pub const DEFAULT_RETENTION_RUN_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// TELEMETRY
// ============================================================================

pub const DEFAULT_SERVICE_NAME: &str = "harvest-service";

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "harvest_service=debug,harvest_storage=info,info";

/// Default interval between performance report log lines (5 minutes)
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 300;
