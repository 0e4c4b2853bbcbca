//! Hit/miss accounting types.

use serde::{Deserialize, Serialize};

/// Hit/miss counters of a single key.
///
/// Counters survive expiry of the key's entry and are only dropped when the
/// sweep reclaims the entry or the key is invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStats {
    pub hits: u64,
    pub misses: u64,
}

impl KeyStats {
    /// `hits / (hits + misses)`, 0.0 when the key was never read.
    pub fn hit_ratio(&self) -> f64 {
        ratio(self.hits, self.misses)
    }
}

/// Aggregate snapshot of an [`super::ExpiringCache`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries currently stored, including expired ones not yet swept.
    pub entry_count: u64,
    /// Keys with a stats bucket.
    pub tracked_keys: u64,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to stay under the capacity ceiling.
    pub evictions: u64,
    /// Hit ratio summed across every tracked key.
    pub hit_ratio: f64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.misses)
    }
}

fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Anything that can report aggregate cache statistics.
///
/// The reporting facade holds caches through this trait so it does not need
/// to know their value type.
pub trait CacheStatsSource: Send + Sync {
    fn cache_stats(&self) -> CacheStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_stats_hit_ratio() {
        let stats = KeyStats { hits: 3, misses: 1 };
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
        assert_eq!(KeyStats::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
