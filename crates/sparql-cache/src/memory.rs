//! In-memory TTL cache backed by an LRU map

use crate::config::CacheConfig;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::store::{CacheEntry, CacheStore};
use lru::LruCache;
use parking_lot::RwLock;
use serde_json::Value;
use sparql_core::{Clock, Result};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe in-memory store.
///
/// Expiry is checked on every read; `purge_expired` reclaims memory for
/// entries nobody reads again. When `max_entries` is reached the least
/// recently used entry is evicted.
pub struct MemoryCacheStore {
    entries: RwLock<LruCache<String, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    stats: Arc<CacheStats>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            ttl: config.ttl,
            clock,
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Number of entries physically held, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now();
        let mut entries = self.entries.write();

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now, self.ttl) => {
                let payload = entry.payload.clone();
                drop(entries);
                self.stats.record_hit();
                return Ok(Some(payload));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            self.stats.record_expirations(1);
        }
        drop(entries);

        self.stats.record_miss();
        Ok(None)
    }

    fn set(&self, key: &str, payload: &Value) -> Result<()> {
        let entry = CacheEntry::new(key, payload.clone(), self.clock.now());

        let evicted = {
            let mut entries = self.entries.write();
            entries.push(key.to_string(), entry)
        };

        // `push` hands back the replaced value for an existing key too
        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                self.stats.record_evictions(1);
            }
        }

        self.stats.record_write();
        Ok(())
    }

    fn invalidate_all(&self) -> Result<()> {
        let removed = {
            let mut entries = self.entries.write();
            let count = entries.len();
            entries.clear();
            count
        };
        self.stats.record_evictions(removed as u64);
        Ok(())
    }

    fn stats(&self) -> Result<CacheStatsSnapshot> {
        let now = self.clock.now();
        let live = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now, self.ttl))
            .count();
        Ok(self
            .stats
            .snapshot(self.backend(), live as u64, self.ttl.as_secs()))
    }

    fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write();

        let expired_keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, self.ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            entries.pop(key);
        }
        drop(entries);

        self.stats.record_expirations(expired_keys.len() as u64);
        Ok(expired_keys.len())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn backend(&self) -> &'static str {
        "memory"
    }

    fn counters(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }
}

impl std::fmt::Debug for MemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheStore")
            .field("ttl", &self.ttl)
            .field("capacity", &self.entries.read().cap())
            .field("current_entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sparql_core::ManualClock;
    use std::thread;

    fn store_with_clock(ttl_secs: u64) -> (MemoryCacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let config = CacheConfig::in_memory(Duration::from_secs(ttl_secs));
        (MemoryCacheStore::new(&config, clock.clone()), clock)
    }

    #[test]
    fn test_set_get_round_trip() {
        let (store, _) = store_with_clock(60);
        store.set("k1", &json!({"a": 1})).unwrap();
        assert_eq!(store.get("k1").unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.counters().hits(), 1);
    }

    #[test]
    fn test_miss() {
        let (store, _) = store_with_clock(60);
        assert_eq!(store.get("missing").unwrap(), None);
        assert_eq!(store.counters().misses(), 1);
    }

    #[test]
    fn test_expiry_with_simulated_clock() {
        let (store, clock) = store_with_clock(60);
        store.set("k1", &json!({"a": 1})).unwrap();

        clock.advance(Duration::from_secs(59));
        assert!(store.get("k1").unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("k1").unwrap(), None);
        assert_eq!(store.counters().expirations(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_overwrite_replaces_and_restamps() {
        let (store, clock) = store_with_clock(60);
        store.set("k1", &json!({"v": 1})).unwrap();

        clock.advance(Duration::from_secs(45));
        store.set("k1", &json!({"v": 2})).unwrap();

        clock.advance(Duration::from_secs(45));
        assert_eq!(store.get("k1").unwrap(), Some(json!({"v": 2})));
        assert_eq!(store.len(), 1);
        assert_eq!(store.counters().evictions(), 0);
    }

    #[test]
    fn test_invalidate_all() {
        let (store, _) = store_with_clock(60);
        for i in 0..5 {
            store.set(&format!("k{}", i), &json!(i)).unwrap();
        }
        store.invalidate_all().unwrap();

        assert_eq!(store.stats().unwrap().entry_count, 0);
        assert_eq!(store.counters().evictions(), 5);
    }

    #[test]
    fn test_stats_counts_only_live_entries() {
        let (store, clock) = store_with_clock(60);
        store.set("old", &json!(1)).unwrap();
        clock.advance(Duration::from_secs(30));
        store.set("new", &json!(2)).unwrap();
        clock.advance(Duration::from_secs(30));

        let stats = store.stats().unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.ttl_seconds, 60);
        assert_eq!(stats.backend, "memory");
    }

    #[test]
    fn test_purge_expired() {
        let (store, clock) = store_with_clock(10);
        for i in 0..3 {
            store.set(&format!("k{}", i), &json!(i)).unwrap();
        }
        clock.advance(Duration::from_secs(5));
        store.set("fresh", &json!("x")).unwrap();
        clock.advance(Duration::from_secs(5));

        assert_eq!(store.purge_expired().unwrap(), 3);
        assert_eq!(store.len(), 1);
        assert_eq!(store.counters().expirations(), 3);
    }

    #[test]
    fn test_capacity_eviction() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = CacheConfig::in_memory(Duration::from_secs(60)).with_max_entries(3);
        let store = MemoryCacheStore::new(&config, clock);

        for i in 0..4 {
            store.set(&format!("k{}", i), &json!(i)).unwrap();
        }

        assert_eq!(store.len(), 3);
        assert_eq!(store.counters().evictions(), 1);
        assert_eq!(store.get("k0").unwrap(), None);
    }

    #[test]
    fn test_concurrent_access() {
        let (store, _) = store_with_clock(60);
        let store = Arc::new(store);
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let key = format!("k{}", i);
                store.set(&key, &json!({ "i": i })).unwrap();
                store.set("shared", &json!({ "writer": i })).unwrap();
                assert_eq!(store.get(&key).unwrap(), Some(json!({ "i": i })));
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 11);
        let shared = store.get("shared").unwrap().unwrap();
        assert!(shared["writer"].as_i64().unwrap() < 10);
    }

    #[test]
    fn test_health_check() {
        let (store, _) = store_with_clock(60);
        assert!(store.health_check().is_ok());
    }
}
