//! Tracing Subscriber Initialization
//!
//! Installs a global subscriber with an `EnvFilter` and either JSON or
//! human-readable output.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::constants::{DEFAULT_LOG_FILTER, DEFAULT_REPORT_INTERVAL_SECS, DEFAULT_SERVICE_NAME};
use crate::error::{ServiceError, ServiceResult};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(ServiceError::config(
                "HARVEST_LOG_FORMAT",
                format!("unknown log format '{}'", other),
            )),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Environment (production, staging, development)
    pub environment: String,
    pub log_format: LogFormat,
    /// Filter directives used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Register Prometheus collectors and chain the metrics observer
    pub metrics_enabled: bool,
    /// How often the binary logs a performance report
    pub report_interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            environment: "development".to_string(),
            log_format: LogFormat::Json,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            metrics_enabled: true,
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
        }
    }
}

impl TelemetryConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// - `HARVEST_SERVICE_NAME`
    /// - `HARVEST_ENVIRONMENT` (default: development)
    /// - `HARVEST_LOG_FORMAT`: `json` or `pretty` (default: json; unknown
    ///   values fall back to json)
    /// - `HARVEST_LOG_FILTER`
    /// - `HARVEST_METRICS_ENABLED` (default: true)
    /// - `HARVEST_REPORT_INTERVAL_SECS` (default: 300)
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            service_name: std::env::var("HARVEST_SERVICE_NAME").unwrap_or(d.service_name),
            environment: std::env::var("HARVEST_ENVIRONMENT").unwrap_or(d.environment),
            log_format: std::env::var("HARVEST_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.log_format),
            log_filter: std::env::var("HARVEST_LOG_FILTER").unwrap_or(d.log_filter),
            metrics_enabled: std::env::var("HARVEST_METRICS_ENABLED")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(d.metrics_enabled),
            report_interval: Duration::from_secs(
                std::env::var("HARVEST_REPORT_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_REPORT_INTERVAL_SECS),
            ),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Call once at startup, before anything logs. `RUST_LOG` overrides
/// `log_filter` when set.
pub fn init_tracing(config: &TelemetryConfig) -> ServiceResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
    };
    installed.map_err(|e| ServiceError::Telemetry(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        log_format = ?config.log_format,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "harvest-service");
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.metrics_enabled);
        assert!(config.log_filter.contains("harvest_storage=info"));
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        let config = TelemetryConfig {
            log_format: LogFormat::Pretty,
            ..Default::default()
        };
        // Whichever call installs first, a second install must error.
        let _ = init_tracing(&config);
        assert!(matches!(init_tracing(&config), Err(ServiceError::Telemetry(_))));
    }
}
