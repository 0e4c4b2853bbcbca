//! Expiring in-process cache.
//!
//! The cache is advisory: callers implement read-through themselves and must
//! tolerate stale or missing values. Statistics are kept per key and feed the
//! performance report.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(ExpiringCache::new(10_000));
//! let sweeper = cache.start_sweeper(Duration::from_secs(60))?;
//!
//! cache.set("factory:42", factory_json, Duration::from_secs(300));
//! if let Some(hit) = cache.get("factory:42") {
//!     // ...
//! }
//!
//! sweeper.shutdown().await;
//! ```

pub mod stats;
pub mod store;
pub mod sweeper;

pub use stats::{CacheStats, CacheStatsSource, KeyStats};
pub use store::ExpiringCache;
pub use sweeper::SweeperHandle;
