//! In-process key/value cache with per-key expiry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use harvest_core::PerfConfig;
use tokio::time::Instant;
use tracing::debug;

use super::stats::{CacheStats, CacheStatsSource, KeyStats};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Advisory key/value cache with time-based expiry and hit/miss accounting.
///
/// Expired entries are never returned but stay in memory until [`sweep`]
/// runs, so their hit/miss history is kept until then. The number of stored
/// entries is capped at `max_entries`; inserting a new key into a full cache
/// evicts the entry that expires first.
///
/// Entries and statistics sit behind separate locks. When both are taken,
/// entries are locked first.
///
/// [`sweep`]: ExpiringCache::sweep
#[derive(Debug)]
pub struct ExpiringCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    stats: Mutex<HashMap<String, KeyStats>>,
    evictions: AtomicU64,
    max_entries: usize,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
            evictions: AtomicU64::new(0),
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &PerfConfig) -> Self {
        Self::new(config.cache_max_entries)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Store `value` under `key` until `ttl` has elapsed.
    ///
    /// Overwrites value and expiry of an existing entry. Hit/miss history of
    /// the key is kept.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let expires_at = Instant::now() + ttl;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let evicted = if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            evict_earliest(&mut entries)
        } else {
            None
        };
        entries.insert(key.clone(), CacheEntry { value, expires_at });

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = evicted {
            stats.remove(&old);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %old, "Evicted cache entry at capacity");
        }
        stats.entry(key).or_default();
    }

    /// Return the live value for `key`, counting a hit or a miss.
    ///
    /// Misses are only counted for keys that have been `set` before; reads
    /// of unknown keys leave the statistics untouched.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let value = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .get(key)
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.value.clone())
        };

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = stats.get_mut(key) {
            if value.is_some() {
                bucket.hits += 1;
            } else {
                bucket.misses += 1;
            }
        }
        value
    }

    /// Remove `key` and its statistics. Returns whether an entry existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let existed = entries.remove(key).is_some();
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        existed
    }

    /// Remove every entry whose expiry has passed, together with its
    /// statistics. Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &expired {
            entries.remove(key);
            stats.remove(key);
        }
        expired.len()
    }

    pub fn key_stats(&self, key: &str) -> Option<KeyStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    pub fn stats(&self) -> CacheStats {
        let entry_count = self.len() as u64;
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let (hits, misses) = stats
            .values()
            .fold((0u64, 0u64), |(h, m), s| (h + s.hits, m + s.misses));

        let mut snapshot = CacheStats {
            entry_count,
            tracked_keys: stats.len() as u64,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_ratio: 0.0,
        };
        snapshot.hit_ratio = snapshot.hit_rate();
        snapshot
    }

    /// Stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and all statistics.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn evict_earliest<V>(entries: &mut HashMap<String, CacheEntry<V>>) -> Option<String> {
    let victim = entries
        .iter()
        .min_by_key(|(_, entry)| entry.expires_at)
        .map(|(key, _)| key.clone())?;
    entries.remove(&victim);
    Some(victim)
}

impl<V: Clone + Send + Sync> CacheStatsSource for ExpiringCache<V> {
    fn cache_stats(&self) -> CacheStats {
        self.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_value_until_expiry() {
        let cache = ExpiringCache::new(16);
        cache.set("f1", "A".to_string(), TTL);

        assert_eq!(cache.get("f1").as_deref(), Some("A"));

        advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("f1").as_deref(), Some("A"));

        advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("f1"), None);

        let stats = cache.key_stats("f1").unwrap();
        assert_eq!(stats, KeyStats { hits: 2, misses: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_kept_until_sweep() {
        let cache = ExpiringCache::new(16);
        cache.set("k", 1u32, Duration::from_secs(1));
        advance(Duration::from_secs(2)).await;

        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 1);
        assert!(cache.key_stats("k").is_some());

        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
        assert!(cache.key_stats("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_keeps_history_and_extends_expiry() {
        let cache = ExpiringCache::new(16);
        cache.set("k", 1u32, Duration::from_secs(5));
        cache.get("k");
        advance(Duration::from_secs(4)).await;

        cache.set("k", 2u32, Duration::from_secs(5));
        advance(Duration::from_secs(4)).await;

        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.key_stats("k").unwrap().hits, 2);
        assert_eq!(cache.sweep(), 0);
    }

    #[test]
    fn test_unknown_key_creates_no_stats() {
        let cache: ExpiringCache<u32> = ExpiringCache::new(16);
        assert_eq!(cache.get("missing"), None);
        assert!(cache.key_stats("missing").is_none());
        assert_eq!(cache.stats().tracked_keys, 0);
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_invalidate_removes_entry_and_stats() {
        let cache = ExpiringCache::new(16);
        cache.set("k", 1u32, TTL);
        cache.get("k");

        assert!(cache.invalidate("k"));
        assert!(!cache.invalidate("k"));
        assert_eq!(cache.get("k"), None);
        assert!(cache.key_stats("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_earliest_expiry() {
        let cache = ExpiringCache::new(2);
        cache.set("short", 1u32, Duration::from_secs(10));
        cache.set("long", 2u32, Duration::from_secs(100));
        cache.set("new", 3u32, Duration::from_secs(50));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("short"), None);
        assert!(cache.key_stats("short").is_none());
        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.get("new"), Some(3));
        assert_eq!(cache.stats().evictions, 1);

        // Overwriting an existing key never evicts.
        cache.set("long", 4u32, Duration::from_secs(100));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_aggregate_stats() {
        let cache = ExpiringCache::new(16);
        cache.set("a", 1u32, TTL);
        cache.set("b", 2u32, TTL);
        cache.get("a");
        cache.get("a");
        cache.get("b");
        cache.invalidate("b");
        cache.set("b", 2u32, TTL);

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.tracked_keys, 2);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 0);
        assert!((stats.hit_ratio - 1.0).abs() < f64::EPSILON);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().tracked_keys, 0);
    }
}
