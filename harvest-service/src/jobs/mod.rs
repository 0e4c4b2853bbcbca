//! Background Jobs for the Harvest Service
//!
//! - `retention_cleanup`: periodically deletes rows past their retention
//!   window
//!
//! The cache sweeper is owned by the layer itself
//! (`PerfLayer::start_cache_sweeper`).
//!
//! # Usage
//!
//! ```ignore
//! use harvest_service::jobs::{retention_cleanup_task, RetentionJobConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let job = tokio::spawn(retention_cleanup_task(
//!     Arc::clone(&state.layer),
//!     RetentionJobConfig::from_env(),
//!     shutdown_rx,
//! ));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = job.await?;
//! ```

pub mod retention_cleanup;

pub use retention_cleanup::{
    retention_cleanup_task, RetentionJobConfig, RetentionJobMetrics, RetentionJobSnapshot,
};
