//! TTL result cache for SPARQL queries
//!
//! This crate provides the content-addressed cache that sits in front of the
//! SPARQL endpoint.
//!
//! # Features
//!
//! - **Key derivation**: whitespace- and case-insensitive SHA-256 keys
//! - **Global TTL**: entries older than the TTL are never returned
//! - **Backends**: in-memory LRU map or persistent SQLite database
//! - **TTL policy reconciliation**: a persisted time index is recreated when the TTL changes
//! - **Statistics**: hits, misses, writes, expirations and failures
//! - **Administration**: clear, purge and health reporting
//!
//! # Example
//!
//! ```ignore
//! use sparql_cache::{derive_key, open_store, CacheConfig};
//! use sparql_core::SystemClock;
//! use std::sync::Arc;
//!
//! let store = open_store(&CacheConfig::default(), Arc::new(SystemClock))?;
//! let key = derive_key(query);
//!
//! if let Some(payload) = store.get(key.as_str())? {
//!     return Ok(payload);
//! }
//!
//! let payload = endpoint.query(query).await?;
//! store.set(key.as_str(), &payload)?;
//! ```

pub mod admin;
pub mod config;
pub mod key;
pub mod memory;
pub mod sqlite;
pub mod stats;
pub mod store;
pub mod sweeper;

pub use admin::{CacheAdmin, ServiceStatus};
pub use config::{CacheBackend, CacheConfig, SqliteLocation};
pub use key::{derive_key, normalize_query, CacheKey};
pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::{open_store, CacheEntry, CacheStore, TtlPolicyStatus};
pub use sweeper::spawn_expiry_sweeper;
