//! Configuration types

use crate::error::{ConfigError, HarvestError, HarvestResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Default cache sweep interval in seconds.
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default hard ceiling on live cache entries.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// Default slow-query threshold in milliseconds. Queries at exactly this
/// duration are not slow.
pub const DEFAULT_SLOW_QUERY_THRESHOLD_MS: u64 = 100;

/// Default number of slow queries retained in the ring buffer.
pub const DEFAULT_SLOW_QUERY_CAPACITY: usize = 100;

/// Default number of statement characters kept per slow query.
pub const DEFAULT_SLOW_QUERY_TEXT_LIMIT: usize = 200;

/// Default number of records per batch-insert chunk.
pub const DEFAULT_BATCH_CHUNK_SIZE: usize = 100;

/// Default page size.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Largest page size a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// Page numbers above this trigger a deep-offset warning.
pub const DEFAULT_LARGE_PAGE_THRESHOLD: u32 = 100;

/// Slow queries included in a performance report.
pub const DEFAULT_REPORT_RECENT_SLOW_QUERIES: usize = 10;

/// Default retention window in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Tunables of the performance layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfConfig {
    // Cache
    pub cache_sweep_interval: Duration,
    pub cache_max_entries: usize,

    // Query monitor
    pub slow_query_threshold: Duration,
    pub slow_query_capacity: usize,
    pub slow_query_text_limit: usize,

    // Batch writer
    pub batch_chunk_size: usize,

    // Paginator
    pub page_default_limit: u32,
    pub page_max_limit: u32,
    pub large_page_threshold: u32,

    // Reporting
    pub report_recent_slow_queries: usize,

    // Retention
    pub retention_days: u32,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            cache_sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            slow_query_threshold: Duration::from_millis(DEFAULT_SLOW_QUERY_THRESHOLD_MS),
            slow_query_capacity: DEFAULT_SLOW_QUERY_CAPACITY,
            slow_query_text_limit: DEFAULT_SLOW_QUERY_TEXT_LIMIT,
            batch_chunk_size: DEFAULT_BATCH_CHUNK_SIZE,
            page_default_limit: DEFAULT_PAGE_LIMIT,
            page_max_limit: MAX_PAGE_LIMIT,
            large_page_threshold: DEFAULT_LARGE_PAGE_THRESHOLD,
            report_recent_slow_queries: DEFAULT_REPORT_RECENT_SLOW_QUERIES,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PerfConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `HARVEST_CACHE_SWEEP_INTERVAL_SECS` (default: 60)
    /// - `HARVEST_CACHE_MAX_ENTRIES` (default: 10000)
    /// - `HARVEST_SLOW_QUERY_THRESHOLD_MS` (default: 100)
    /// - `HARVEST_SLOW_QUERY_CAPACITY` (default: 100)
    /// - `HARVEST_SLOW_QUERY_TEXT_LIMIT` (default: 200)
    /// - `HARVEST_BATCH_CHUNK_SIZE` (default: 100)
    /// - `HARVEST_PAGE_DEFAULT_LIMIT` (default: 20)
    /// - `HARVEST_PAGE_MAX_LIMIT` (default: 1000)
    /// - `HARVEST_LARGE_PAGE_THRESHOLD` (default: 100)
    /// - `HARVEST_REPORT_RECENT_SLOW_QUERIES` (default: 10)
    /// - `HARVEST_RETENTION_DAYS` (default: 30)
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            cache_sweep_interval: Duration::from_secs(env_or(
                "HARVEST_CACHE_SWEEP_INTERVAL_SECS",
                d.cache_sweep_interval.as_secs(),
            )),
            cache_max_entries: env_or("HARVEST_CACHE_MAX_ENTRIES", d.cache_max_entries),
            slow_query_threshold: Duration::from_millis(env_or(
                "HARVEST_SLOW_QUERY_THRESHOLD_MS",
                DEFAULT_SLOW_QUERY_THRESHOLD_MS,
            )),
            slow_query_capacity: env_or("HARVEST_SLOW_QUERY_CAPACITY", d.slow_query_capacity),
            slow_query_text_limit: env_or("HARVEST_SLOW_QUERY_TEXT_LIMIT", d.slow_query_text_limit),
            batch_chunk_size: env_or("HARVEST_BATCH_CHUNK_SIZE", d.batch_chunk_size),
            page_default_limit: env_or("HARVEST_PAGE_DEFAULT_LIMIT", d.page_default_limit),
            page_max_limit: env_or("HARVEST_PAGE_MAX_LIMIT", d.page_max_limit),
            large_page_threshold: env_or("HARVEST_LARGE_PAGE_THRESHOLD", d.large_page_threshold),
            report_recent_slow_queries: env_or(
                "HARVEST_REPORT_RECENT_SLOW_QUERIES",
                d.report_recent_slow_queries,
            ),
            retention_days: env_or("HARVEST_RETENTION_DAYS", d.retention_days),
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.cache_sweep_interval = interval;
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.cache_max_entries = max;
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    pub fn with_slow_query_capacity(mut self, capacity: usize) -> Self {
        self.slow_query_capacity = capacity;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.batch_chunk_size = chunk_size;
        self
    }

    pub fn with_page_limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.page_default_limit = default_limit;
        self.page_max_limit = max_limit;
        self
    }

    pub fn with_large_page_threshold(mut self, threshold: u32) -> Self {
        self.large_page_threshold = threshold;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(HarvestError::Config) if invalid.
    pub fn validate(&self) -> HarvestResult<()> {
        if self.cache_sweep_interval.is_zero() {
            return Err(invalid(
                "cache_sweep_interval",
                format!("{:?}", self.cache_sweep_interval),
                "cache_sweep_interval must be positive",
            ));
        }

        if self.cache_max_entries == 0 {
            return Err(invalid(
                "cache_max_entries",
                "0".to_string(),
                "cache_max_entries must be greater than 0",
            ));
        }

        if self.slow_query_capacity == 0 {
            return Err(invalid(
                "slow_query_capacity",
                "0".to_string(),
                "slow_query_capacity must be greater than 0",
            ));
        }

        if self.slow_query_text_limit == 0 {
            return Err(invalid(
                "slow_query_text_limit",
                "0".to_string(),
                "slow_query_text_limit must be greater than 0",
            ));
        }

        if self.batch_chunk_size == 0 {
            return Err(invalid(
                "batch_chunk_size",
                "0".to_string(),
                "batch_chunk_size must be at least 1",
            ));
        }

        if self.page_default_limit == 0 || self.page_default_limit > self.page_max_limit {
            return Err(invalid(
                "page_default_limit",
                self.page_default_limit.to_string(),
                "page_default_limit must be between 1 and page_max_limit",
            ));
        }

        if self.large_page_threshold == 0 {
            return Err(invalid(
                "large_page_threshold",
                "0".to_string(),
                "large_page_threshold must be at least 1",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> HarvestError {
    HarvestError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PerfConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.slow_query_threshold, Duration::from_millis(100));
        assert_eq!(config.batch_chunk_size, 100);
        assert_eq!(config.page_default_limit, 20);
        assert_eq!(config.large_page_threshold, 100);
        assert_eq!(config.cache_sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_builder() {
        let config = PerfConfig::new()
            .with_sweep_interval(Duration::from_secs(5))
            .with_max_entries(64)
            .with_slow_query_threshold(Duration::from_millis(250))
            .with_chunk_size(10)
            .with_page_limits(50, 200)
            .with_large_page_threshold(20)
            .with_retention_days(7);

        assert!(config.validate().is_ok());
        assert_eq!(config.cache_max_entries, 64);
        assert_eq!(config.page_max_limit, 200);
        assert_eq!(config.retention_days, 7);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let config = PerfConfig::new().with_chunk_size(0);
        match config.validate() {
            Err(HarvestError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, "batch_chunk_size");
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_limit_above_max_rejected() {
        let config = PerfConfig::new().with_page_limits(500, 100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let config = PerfConfig::new().with_sweep_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_defaults() {
        // Without environment variables set, should use defaults
        let config = PerfConfig::from_env();
        assert_eq!(config.slow_query_capacity, DEFAULT_SLOW_QUERY_CAPACITY);
        assert_eq!(config.retention_days, DEFAULT_RETENTION_DAYS);
    }
}
