//! SQLite-backed persistent TTL cache
//!
//! Entries live in a table named after the configured collection. Expiry is
//! driven by `created_at`, which carries a time index whose TTL is recorded in
//! `cache_index_meta`. Reopening the store with a different TTL drops and
//! recreates that index so a stale policy is never silently reused.

use crate::config::{CacheConfig, SqliteLocation};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::store::{CacheStore, TtlPolicyStatus};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use sparql_core::{Clock, Result, SparqlError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Suffix of the time index created on each collection
pub const TTL_INDEX_SUFFIX: &str = "cache_ttl_index";

/// Table recording the TTL each collection's time index was built for
pub const META_TABLE: &str = "cache_index_meta";

/// Persistent cache store with a small pool of SQLite connections
pub struct SqliteCacheStore {
    pool: Vec<Mutex<Connection>>,
    next: AtomicUsize,
    table: String,
    location: SqliteLocation,
    ttl: Duration,
    retry_reads: bool,
    retry_writes: bool,
    policy: TtlPolicyStatus,
    clock: Arc<dyn Clock>,
    stats: Arc<CacheStats>,
}

impl SqliteCacheStore {
    /// Open (or create) the cache and reconcile its TTL policy.
    ///
    /// Any failure here is reported as `CacheUnavailable`.
    pub fn open(
        config: &CacheConfig,
        location: SqliteLocation,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let table = config.collection.clone();

        let first = open_connection(&location, config.connect_timeout)?;
        ping(&first)?;
        create_schema(&first, &table).map_err(unavailable)?;
        let policy = reconcile_ttl_index(&first, &table, config.ttl.as_secs()).map_err(unavailable)?;
        first
            .busy_timeout(config.selection_timeout)
            .map_err(unavailable)?;

        // Every in-memory connection is its own database, so those stay single
        let pool_size = match location {
            SqliteLocation::InMemory => 1,
            SqliteLocation::File(_) => config.pool_size.max(1),
        };

        let mut pool = Vec::with_capacity(pool_size);
        pool.push(Mutex::new(first));
        for _ in 1..pool_size {
            let conn = open_connection(&location, config.selection_timeout)?;
            pool.push(Mutex::new(conn));
        }

        info!(
            "Cache store opened at {} (collection '{}', TTL {}s, {} connection(s), policy {:?})",
            describe(&location),
            table,
            config.ttl.as_secs(),
            pool_size,
            policy
        );

        Ok(Self {
            pool,
            next: AtomicUsize::new(0),
            table,
            location,
            ttl: config.ttl,
            retry_reads: config.retry_reads,
            retry_writes: config.retry_writes,
            policy,
            clock,
            stats: Arc::new(CacheStats::new()),
        })
    }

    /// How the persisted TTL policy was reconciled at open time
    pub fn ttl_policy(&self) -> TtlPolicyStatus {
        self.policy
    }

    /// Number of rows physically stored, expired ones included
    pub fn row_count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table));
        self.run(self.retry_reads, |conn| {
            conn.query_row(&sql, [], |row| row.get::<_, i64>(0))
        })
        .map(|count| count.max(0) as u64)
    }

    /// Check out a pooled connection, preferring one that is free
    fn connection(&self) -> MutexGuard<'_, Connection> {
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.pool.len() {
            let slot = &self.pool[(start + offset) % self.pool.len()];
            if let Some(guard) = slot.try_lock() {
                return guard;
            }
        }
        self.pool[start % self.pool.len()].lock()
    }

    /// Run `op` on a pooled connection, retrying once on a busy database
    fn run<T>(
        &self,
        retry: bool,
        op: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.connection();
        match op(&*conn) {
            Err(err) if retry && is_busy(&err) => {
                debug!("Cache medium busy, retrying once: {}", err);
                op(&*conn).map_err(unavailable)
            }
            result => result.map_err(unavailable),
        }
    }

    fn cutoff_millis(&self, now: DateTime<Utc>) -> i64 {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        now.timestamp_millis().saturating_sub(ttl_ms)
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now();
        let sql = format!(
            "SELECT payload, created_at FROM {} WHERE key = ?1",
            quote_ident(&self.table)
        );

        let row = self
            .run(self.retry_reads, |conn| {
                conn.query_row(&sql, params![key], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .optional()
            })
            .inspect_err(|_| self.stats.record_read_failure())?;

        let Some((payload, created_at)) = row else {
            self.stats.record_miss();
            return Ok(None);
        };

        // Rows at or past the cutoff are invisible even before the sweeper runs
        if created_at <= self.cutoff_millis(now) {
            let delete = format!(
                "DELETE FROM {} WHERE key = ?1 AND created_at = ?2",
                quote_ident(&self.table)
            );
            let removed = self
                .run(self.retry_writes, |conn| {
                    conn.execute(&delete, params![key, created_at])
                })
                .unwrap_or(0);
            self.stats.record_expirations(removed as u64);
            self.stats.record_miss();
            return Ok(None);
        }

        match serde_json::from_str(&payload) {
            Ok(value) => {
                self.stats.record_hit();
                Ok(Some(value))
            }
            Err(err) => {
                self.stats.record_read_failure();
                Err(err.into())
            }
        }
    }

    fn set(&self, key: &str, payload: &Value) -> Result<()> {
        let body = serde_json::to_string(payload).inspect_err(|_| {
            self.stats.record_write_failure();
        })?;
        let created_at = self.clock.now().timestamp_millis();
        let sql = format!(
            "INSERT INTO {} (key, payload, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, created_at = excluded.created_at",
            quote_ident(&self.table)
        );

        self.run(self.retry_writes, |conn| {
            conn.execute(&sql, params![key, body, created_at])
        })
        .inspect_err(|_| self.stats.record_write_failure())?;

        self.stats.record_write();
        Ok(())
    }

    fn invalidate_all(&self) -> Result<()> {
        let sql = format!("DELETE FROM {}", quote_ident(&self.table));
        let removed = self.run(self.retry_writes, |conn| conn.execute(&sql, []))?;
        self.stats.record_evictions(removed as u64);
        info!("Cleared {} cached result(s) from '{}'", removed, self.table);
        Ok(())
    }

    fn stats(&self) -> Result<CacheStatsSnapshot> {
        let cutoff = self.cutoff_millis(self.clock.now());
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE created_at > ?1",
            quote_ident(&self.table)
        );
        let live = self.run(self.retry_reads, |conn| {
            conn.query_row(&sql, params![cutoff], |row| row.get::<_, i64>(0))
        })?;
        Ok(self
            .stats
            .snapshot(self.backend(), live.max(0) as u64, self.ttl.as_secs()))
    }

    fn health_check(&self) -> Result<()> {
        let conn = self.connection();
        ping(&*conn)
    }

    fn purge_expired(&self) -> Result<usize> {
        let cutoff = self.cutoff_millis(self.clock.now());
        let sql = format!(
            "DELETE FROM {} WHERE created_at <= ?1",
            quote_ident(&self.table)
        );
        let removed = self.run(self.retry_writes, |conn| conn.execute(&sql, params![cutoff]))?;
        if removed > 0 {
            debug!("Purged {} expired entries from '{}'", removed, self.table);
        }
        self.stats.record_expirations(removed as u64);
        Ok(removed)
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn counters(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }
}

impl std::fmt::Debug for SqliteCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCacheStore")
            .field("location", &describe(&self.location))
            .field("table", &self.table)
            .field("ttl", &self.ttl)
            .field("pool_size", &self.pool.len())
            .field("policy", &self.policy)
            .finish()
    }
}

fn open_connection(location: &SqliteLocation, busy_timeout: Duration) -> Result<Connection> {
    let conn = match location {
        SqliteLocation::InMemory => Connection::open_in_memory(),
        SqliteLocation::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SparqlError::CacheUnavailable(format!(
                        "cannot create cache directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            Connection::open(path)
        }
    }
    .map_err(unavailable)?;

    conn.busy_timeout(busy_timeout).map_err(unavailable)?;
    if let SqliteLocation::File(_) = location {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(unavailable)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(unavailable)?;
    }
    Ok(conn)
}

fn ping(conn: &Connection) -> Result<()> {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
        .map_err(unavailable)
}

fn create_schema(conn: &Connection, table: &str) -> rusqlite::Result<()> {
    let table = quote_ident(table);
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            key        TEXT PRIMARY KEY,
            payload    TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS {META_TABLE} (
            collection           TEXT NOT NULL,
            index_name           TEXT NOT NULL,
            expire_after_seconds INTEGER NOT NULL,
            PRIMARY KEY (collection, index_name)
        );"
    ))
}

/// Make sure the time index exists and records the configured TTL
fn reconcile_ttl_index(
    conn: &Connection,
    table: &str,
    ttl_seconds: u64,
) -> rusqlite::Result<TtlPolicyStatus> {
    let index_name = format!("{}_{}", table, TTL_INDEX_SUFFIX);
    let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);

    let index_exists: bool = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
        params![index_name],
        |row| row.get::<_, i64>(0).map(|n| n > 0),
    )?;
    let recorded: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT expire_after_seconds FROM {META_TABLE} WHERE collection = ?1 AND index_name = ?2"
            ),
            params![table, index_name],
            |row| row.get(0),
        )
        .optional()?;

    let status = match (index_exists, recorded) {
        (true, Some(existing)) if existing == ttl => {
            info!("TTL index '{}' exists with correct configuration", index_name);
            return Ok(TtlPolicyStatus::Verified);
        }
        (true, previous) => {
            warn!(
                "TTL index '{}' was configured for {:?}s, recreating for {}s",
                index_name, previous, ttl_seconds
            );
            conn.execute_batch(&format!("DROP INDEX IF EXISTS {};", quote_ident(&index_name)))?;
            TtlPolicyStatus::Migrated {
                previous_ttl_seconds: previous.map(|p| p.max(0) as u64),
            }
        }
        (false, _) => TtlPolicyStatus::Created,
    };

    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} (created_at);",
        quote_ident(&index_name),
        quote_ident(table)
    ))?;
    conn.execute(
        &format!(
            "INSERT INTO {META_TABLE} (collection, index_name, expire_after_seconds) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, index_name) DO UPDATE SET expire_after_seconds = excluded.expire_after_seconds"
        ),
        params![table, index_name, ttl],
    )?;
    info!("Created TTL index '{}' with {}s expiration", index_name, ttl_seconds);

    Ok(status)
}

/// Collection names are spliced into statements, so always quote them
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

fn unavailable(err: rusqlite::Error) -> SparqlError {
    SparqlError::CacheUnavailable(err.to_string())
}

fn describe(location: &SqliteLocation) -> String {
    match location {
        SqliteLocation::InMemory => ":memory:".to_string(),
        SqliteLocation::File(path) => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sparql_core::{FailureKind, ManualClock};
    use tempfile::TempDir;

    fn file_config(dir: &TempDir, ttl_secs: u64) -> (CacheConfig, SqliteLocation) {
        let path = dir.path().join("cache.db");
        let config = CacheConfig::default()
            .with_connection_string(format!("sqlite://{}", path.display()))
            .with_ttl(Duration::from_secs(ttl_secs))
            .with_pool_size(2);
        (config, SqliteLocation::File(path))
    }

    fn open_file_store(dir: &TempDir, ttl_secs: u64, clock: Arc<ManualClock>) -> SqliteCacheStore {
        let (config, location) = file_config(dir, ttl_secs);
        SqliteCacheStore::open(&config, location, clock).unwrap()
    }

    #[test]
    fn test_set_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let store = open_file_store(&dir, 60, clock);

        let payload = json!({
            "head": { "vars": ["item"] },
            "results": { "bindings": [ { "item": { "type": "uri", "value": "http://www.wikidata.org/entity/Q42" } } ] }
        });
        store.set("k1", &payload).unwrap();
        assert_eq!(store.get("k1").unwrap(), Some(payload));
        assert_eq!(store.counters().hits(), 1);
        assert_eq!(store.counters().writes(), 1);
    }

    #[test]
    fn test_expiry_with_simulated_clock() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let store = open_file_store(&dir, 60, clock.clone());

        store.set("k1", &json!({"a": 1})).unwrap();
        assert_eq!(store.get("k1").unwrap(), Some(json!({"a": 1})));

        clock.advance(Duration::from_secs(61));
        assert_eq!(store.get("k1").unwrap(), None);
        assert_eq!(store.counters().expirations(), 1);
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_upsert_replaces_value() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let store = open_file_store(&dir, 60, clock.clone());

        store.set("k1", &json!({"v": 1})).unwrap();
        clock.advance(Duration::from_secs(50));
        store.set("k1", &json!({"v": 2})).unwrap();
        clock.advance(Duration::from_secs(50));

        assert_eq!(store.get("k1").unwrap(), Some(json!({"v": 2})));
        assert_eq!(store.row_count().unwrap(), 1);
    }

    #[test]
    fn test_invalidate_all_and_stats() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let store = open_file_store(&dir, 60, clock);

        for i in 0..4 {
            store.set(&format!("k{}", i), &json!(i)).unwrap();
        }
        assert_eq!(store.stats().unwrap().entry_count, 4);

        store.invalidate_all().unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.ttl_seconds, 60);
        assert_eq!(stats.backend, "sqlite");
    }

    #[test]
    fn test_purge_expired() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let store = open_file_store(&dir, 10, clock.clone());

        store.set("a", &json!(1)).unwrap();
        store.set("b", &json!(2)).unwrap();
        clock.advance(Duration::from_secs(6));
        store.set("c", &json!(3)).unwrap();
        clock.advance(Duration::from_secs(6));

        assert_eq!(store.stats().unwrap().entry_count, 1);
        assert_eq!(store.purge_expired().unwrap(), 2);
        assert_eq!(store.row_count().unwrap(), 1);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        {
            let store = open_file_store(&dir, 60, clock.clone());
            store.set("persisted", &json!({"ok": true})).unwrap();
        }
        let store = open_file_store(&dir, 60, clock);
        assert_eq!(store.get("persisted").unwrap(), Some(json!({"ok": true})));
    }

    #[test]
    fn test_ttl_policy_reconciliation() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());

        let first = open_file_store(&dir, 3600, clock.clone());
        assert_eq!(first.ttl_policy(), TtlPolicyStatus::Created);
        drop(first);

        let same = open_file_store(&dir, 3600, clock.clone());
        assert_eq!(same.ttl_policy(), TtlPolicyStatus::Verified);
        drop(same);

        let changed = open_file_store(&dir, 600, clock.clone());
        assert_eq!(
            changed.ttl_policy(),
            TtlPolicyStatus::Migrated {
                previous_ttl_seconds: Some(3600)
            }
        );
        drop(changed);

        let again = open_file_store(&dir, 600, clock);
        assert_eq!(again.ttl_policy(), TtlPolicyStatus::Verified);
    }

    #[test]
    fn test_reopen_with_shorter_ttl_hides_old_entries() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        {
            let store = open_file_store(&dir, 3600, clock.clone());
            store.set("k", &json!(1)).unwrap();
        }
        clock.advance(Duration::from_secs(120));

        let store = open_file_store(&dir, 60, clock);
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_in_memory_database() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = CacheConfig::default().with_connection_string("sqlite::memory:");
        let store = SqliteCacheStore::open(&config, SqliteLocation::InMemory, clock).unwrap();

        store.set("k", &json!([1, 2, 3])).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!([1, 2, 3])));
        assert!(store.health_check().is_ok());
        assert!(format!("{:?}", store).contains("pool_size: 1"));
    }

    #[test]
    fn test_unreachable_medium_fails_closed() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened as a database file
        let location = SqliteLocation::File(dir.path().to_path_buf());
        let config = CacheConfig::default();
        let err = SqliteCacheStore::open(&config, location, Arc::new(ManualClock::starting_now()))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::CacheUnavailable);
    }

    #[test]
    fn test_corrupt_payload_is_read_failure() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = CacheConfig::default().with_connection_string("sqlite::memory:");
        let store = SqliteCacheStore::open(&config, SqliteLocation::InMemory, clock.clone())
            .unwrap();

        store
            .run(false, |conn| {
                conn.execute(
                    "INSERT INTO sparql_cache (key, payload, created_at) VALUES ('bad', '{not json', ?1)",
                    params![clock.now().timestamp_millis()],
                )
            })
            .unwrap();

        let err = store.get("bad").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Serialization);
        assert_eq!(store.counters().read_failures(), 1);
    }

    #[test]
    fn test_keyword_collection_names_are_quoted() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        for name in ["order", "select", "table"] {
            let (config, location) = file_config(&dir, 60);
            let config = config.with_collection(name);
            let store = SqliteCacheStore::open(&config, location, clock.clone()).unwrap();

            store.set("k", &json!({"collection": name})).unwrap();
            assert_eq!(store.get("k").unwrap(), Some(json!({"collection": name})));
            assert_eq!(store.stats().unwrap().entry_count, 1);
            assert_eq!(store.purge_expired().unwrap(), 0);
            store.invalidate_all().unwrap();
            assert_eq!(store.row_count().unwrap(), 0);
            assert_eq!(store.ttl_policy(), TtlPolicyStatus::Created);
        }
    }

    #[test]
    fn test_reserved_collection_is_config_error() {
        let dir = TempDir::new().unwrap();
        let (config, location) = file_config(&dir, 60);
        let config = config.with_collection(META_TABLE);
        let err = SqliteCacheStore::open(&config, location, Arc::new(ManualClock::starting_now()))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Config);
    }

    /// Hold the write lock from another connection for `hold`, then commit
    fn lock_database(path: &std::path::Path, hold: Duration) -> std::thread::JoinHandle<()> {
        let blocker = Connection::open(path).unwrap();
        blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();
        std::thread::spawn(move || {
            std::thread::sleep(hold);
            blocker.execute_batch("COMMIT").unwrap();
        })
    }

    fn busy_store(dir: &TempDir, retry: bool) -> (SqliteCacheStore, std::path::PathBuf) {
        let (config, location) = file_config(dir, 60);
        let config = config
            .with_pool_size(1)
            .with_timeouts(Duration::from_secs(5), Duration::from_millis(100))
            .with_retries(retry, retry);
        let path = match &location {
            SqliteLocation::File(path) => path.clone(),
            SqliteLocation::InMemory => unreachable!(),
        };
        let store =
            SqliteCacheStore::open(&config, location, Arc::new(ManualClock::starting_now())).unwrap();
        (store, path)
    }

    #[test]
    fn test_busy_write_is_retried_once() {
        let dir = TempDir::new().unwrap();
        let (store, path) = busy_store(&dir, true);

        // first attempt gives up after 100ms, the retry outlasts the 150ms lock
        let blocker = lock_database(&path, Duration::from_millis(150));
        assert!(store.set("k", &json!({"v": 1})).is_ok());
        blocker.join().unwrap();

        assert_eq!(store.get("k").unwrap(), Some(json!({"v": 1})));
        assert_eq!(store.counters().write_failures(), 0);
    }

    #[test]
    fn test_busy_write_without_retry_fails() {
        let dir = TempDir::new().unwrap();
        let (store, path) = busy_store(&dir, false);

        let blocker = lock_database(&path, Duration::from_millis(150));
        let err = store.set("k", &json!({"v": 1})).unwrap_err();
        blocker.join().unwrap();

        assert_eq!(err.kind(), FailureKind::CacheUnavailable);
        assert_eq!(store.counters().write_failures(), 1);
        assert_eq!(store.get("k").unwrap(), None);
    }
}
