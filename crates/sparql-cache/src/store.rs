//! The cache store contract and backend selection

use crate::config::{CacheBackend, CacheConfig};
use crate::memory::MemoryCacheStore;
use crate::sqlite::SqliteCacheStore;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sparql_core::{Clock, Result};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Key → document store with a single global TTL.
///
/// Implementations must never return an entry whose age has reached the TTL,
/// whether or not it has been physically removed yet.
pub trait CacheStore: Send + Sync + Debug {
    /// Payload stored under `key`, if present and unexpired
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Upsert `payload` under `key`, stamping the creation time to now
    fn set(&self, key: &str, payload: &Value) -> Result<()>;

    /// Remove every entry
    fn invalidate_all(&self) -> Result<()>;

    /// Live entry count, TTL and activity counters
    fn stats(&self) -> Result<CacheStatsSnapshot>;

    /// Verify the backing medium is reachable without touching entries
    fn health_check(&self) -> Result<()>;

    /// Physically delete expired entries, returning how many were removed
    fn purge_expired(&self) -> Result<usize>;

    fn ttl(&self) -> Duration;

    /// Short backend name for diagnostics
    fn backend(&self) -> &'static str;

    /// Shared activity counters
    fn counters(&self) -> Arc<CacheStats>;
}

/// Entry stored in the cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at,
        }
    }

    /// Age of this entry at `now`; zero if the clock went backwards
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// An entry is visible only while `now - created_at < ttl`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) >= ttl
    }
}

/// Result of reconciling the persisted eviction policy with the configured TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlPolicyStatus {
    /// No policy existed; one was created
    Created,
    /// The persisted policy already matched
    Verified,
    /// The persisted policy used a different TTL and was recreated
    Migrated { previous_ttl_seconds: Option<u64> },
    /// The backend has no persisted policy
    NotApplicable,
}

/// Open the store selected by `config`.
///
/// Fails when the medium cannot be reached at all; the engine does not start
/// without a working cache path.
pub fn open_store(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn CacheStore>> {
    config.validate()?;
    let store: Arc<dyn CacheStore> = match config.backend()? {
        CacheBackend::Memory => Arc::new(MemoryCacheStore::new(config, clock)),
        CacheBackend::Sqlite(location) => {
            Arc::new(SqliteCacheStore::open(config, location, clock)?)
        }
    };
    Ok(store)
}
