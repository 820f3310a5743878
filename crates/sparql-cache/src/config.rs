//! Cache configuration options

use crate::sqlite::META_TABLE;
use sparql_core::{Result, SparqlError};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the result cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Backing medium, e.g. `memory://` or `sqlite://sparql_cache.db`
    pub connection_string: String,
    /// Namespace for entries; the table name for the SQLite backend
    pub collection: String,
    /// Time-to-live for every entry
    pub ttl: Duration,
    /// Maximum number of entries held by the in-memory backend
    pub max_entries: usize,
    /// Number of pooled connections to the backing medium
    pub pool_size: usize,
    /// Lock wait limit while opening and reconciling the store
    pub connect_timeout: Duration,
    /// Lock wait limit for regular reads and writes
    pub selection_timeout: Duration,
    /// Retry a write once when the medium reports it is busy
    pub retry_writes: bool,
    /// Retry a read once when the medium reports it is busy
    pub retry_reads: bool,
    /// Period of the background expiry sweep; `None` relies on read-time checks only
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            connection_string: "sqlite://sparql_cache.db".to_string(),
            collection: "sparql_cache".to_string(),
            ttl: Duration::from_secs(3600),
            max_entries: 10_000,
            pool_size: 4,
            connect_timeout: Duration::from_millis(10_000),
            selection_timeout: Duration::from_millis(5_000),
            retry_writes: true,
            retry_reads: true,
            sweep_interval: None,
        }
    }
}

/// Where a SQLite cache lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    File(PathBuf),
    InMemory,
}

/// Backing medium selected by the connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Sqlite(SqliteLocation),
}

impl CacheConfig {
    /// In-memory cache with the given TTL
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            connection_string: "memory://".to_string(),
            ttl,
            ..Default::default()
        }
    }

    /// Set the connection string
    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = connection_string.into();
        self
    }

    /// Set the collection name
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Set the TTL duration
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the maximum number of in-memory entries
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the connection pool size
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the connect and selection timeouts
    pub fn with_timeouts(mut self, connect: Duration, selection: Duration) -> Self {
        self.connect_timeout = connect;
        self.selection_timeout = selection;
        self
    }

    /// Enable or disable a single retry on busy reads/writes
    pub fn with_retries(mut self, retry_reads: bool, retry_writes: bool) -> Self {
        self.retry_reads = retry_reads;
        self.retry_writes = retry_writes;
        self
    }

    /// Set the background sweep interval
    pub fn with_sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// TTL in whole seconds, as reported by stats
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Parse the connection string into a backend selection
    pub fn backend(&self) -> Result<CacheBackend> {
        let conn = self.connection_string.trim();
        match conn {
            "memory" | "memory://" => return Ok(CacheBackend::Memory),
            "sqlite::memory:" | "sqlite://:memory:" => {
                return Ok(CacheBackend::Sqlite(SqliteLocation::InMemory))
            }
            _ => {}
        }

        match conn.strip_prefix("sqlite://") {
            Some(path) if !path.is_empty() => Ok(CacheBackend::Sqlite(SqliteLocation::File(
                PathBuf::from(path),
            ))),
            _ => Err(SparqlError::Config(format!(
                "unsupported cache connection string '{}' (expected memory:// or sqlite://<path>)",
                self.connection_string
            ))),
        }
    }

    /// Validate settings that would otherwise fail deep inside a backend
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(SparqlError::Config("cache TTL must be positive".into()));
        }
        if self.pool_size == 0 {
            return Err(SparqlError::Config(
                "cache pool size must be at least 1".into(),
            ));
        }
        if !is_plain_identifier(&self.collection) {
            return Err(SparqlError::Config(format!(
                "cache collection '{}' must contain only ASCII letters, digits and '_'",
                self.collection
            )));
        }
        if is_reserved_table(&self.collection) {
            return Err(SparqlError::Config(format!(
                "cache collection '{}' is reserved for internal use",
                self.collection
            )));
        }
        self.backend().map(|_| ())
    }
}

/// SQLite table names compare case-insensitively
fn is_reserved_table(name: &str) -> bool {
    name.eq_ignore_ascii_case(META_TABLE) || name.to_ascii_lowercase().starts_with("sqlite_")
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
