//! Cache statistics tracking

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for cache activity
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cache hits
    hits: AtomicU64,
    /// Number of cache misses, expired entries included
    misses: AtomicU64,
    /// Number of successful writes
    writes: AtomicU64,
    /// Number of entries dropped because their TTL elapsed
    expirations: AtomicU64,
    /// Number of entries removed by capacity pressure or invalidation
    evictions: AtomicU64,
    /// Reads that failed against the backing medium
    read_failures: AtomicU64,
    /// Writes that failed against the backing medium
    write_failures: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn read_failures(&self) -> u64 {
        self.read_failures.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get total lookups (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.writes,
            &self.expirations,
            &self.evictions,
            &self.read_failures,
            &self.write_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Combine the counters with store-level figures into a report
    pub fn snapshot(&self, backend: &str, entry_count: u64, ttl_seconds: u64) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            backend: backend.to_string(),
            entry_count,
            ttl_seconds,
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            expirations: self.expirations(),
            evictions: self.evictions(),
            read_failures: self.read_failures(),
            write_failures: self.write_failures(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Point-in-time view of a cache store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub backend: String,
    /// Live (unexpired) entries
    pub entry_count: u64,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub expirations: u64,
    pub evictions: u64,
    pub read_failures: u64,
    pub write_failures: u64,
    pub hit_rate: f64,
}
