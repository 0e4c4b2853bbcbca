//! Service Configuration
//!
//! Aggregates the configuration of every component the binary wires up.
//! Each part reads its own `HARVEST_` variables; `validate` checks them all
//! before anything is started.

use harvest_core::PerfConfig;

use crate::db::DbConfig;
use crate::error::ServiceResult;
use crate::jobs::RetentionJobConfig;
use crate::telemetry::TelemetryConfig;

/// Complete configuration of the service process.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub db: DbConfig,
    pub perf: PerfConfig,
    pub telemetry: TelemetryConfig,
    pub retention: RetentionJobConfig,
}

impl ServiceConfig {
    /// Read every section from the environment.
    ///
    /// Nothing is validated here so that tracing can be initialized before
    /// a configuration error is reported.
    pub fn from_env() -> Self {
        let telemetry = TelemetryConfig::from_env();
        let mut retention = RetentionJobConfig::from_env();
        retention.export_metrics = retention.export_metrics && telemetry.metrics_enabled;

        Self {
            db: DbConfig::from_env(),
            perf: PerfConfig::from_env(),
            telemetry,
            retention,
        }
    }

    pub fn validate(&self) -> ServiceResult<()> {
        self.perf.validate()?;
        self.db.validate()?;
        self.retention.validate()?;
        Ok(())
    }
}
