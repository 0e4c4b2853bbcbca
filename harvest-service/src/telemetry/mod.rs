//! Harvest Telemetry - Observability Infrastructure
//!
//! Structured logging via `tracing-subscriber` and Prometheus metrics fed by
//! the query monitor's observer chain.

pub mod metrics;
pub mod tracer;

pub use metrics::{render_metrics, HarvestMetrics, PrometheusObserver, METRICS};
pub use tracer::{init_tracing, LogFormat, TelemetryConfig};
