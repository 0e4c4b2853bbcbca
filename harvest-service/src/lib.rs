//! Harvest Service
//!
//! Process-level wiring around the performance layer in `harvest-storage`:
//! a Postgres-backed [`DataStore`](harvest_storage::DataStore), structured
//! logging, Prometheus export and the retention background job.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod state;
pub mod telemetry;

pub use config::ServiceConfig;
pub use db::{DbConfig, PgStore};
pub use error::{ServiceError, ServiceResult};
pub use state::AppState;
