//! Cache-first query executor
//!
//! Every query walks the same state machine:
//!
//! ```text
//! Idle -> KeyDerived -> CacheChecked -> CacheHit
//!                                    -> Enhancing -> Dispatched -> Succeeded
//!                                                               -> TimedOut
//!                                                               -> NetworkFailed
//!                                                               -> EndpointRejected
//! Idle -> Rejected
//! ```
//!
//! Only `Succeeded` writes to the cache. Cache reads and writes are
//! fail-open: a broken cache degrades to uncached execution.

use crate::config::ExecutorConfig;
use crate::endpoint::SparqlEndpoint;
use crate::guard::ReadOnlyGuard;
use serde_json::Value;
use sparql_cache::{CacheAdmin, CacheKey, CacheStatsSnapshot, CacheStore, ServiceStatus};
use sparql_core::{ExecutionOutcome, ExecutionState, Result, SparqlError};
use sparql_enhancer::QueryEnhancer;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Query executor with a shared result cache in front of the endpoint
pub struct CachedSparqlExecutor {
    store: Arc<dyn CacheStore>,
    endpoint: Arc<dyn SparqlEndpoint>,
    enhancer: QueryEnhancer,
    guard: Option<ReadOnlyGuard>,
    admin: CacheAdmin,
    config: ExecutorConfig,
}

/// Tracks the current state of one execution for logging
struct Transitions<'a> {
    key: Option<&'a str>,
    state: ExecutionState,
}

impl<'a> Transitions<'a> {
    fn start() -> Self {
        Self {
            key: None,
            state: ExecutionState::Idle,
        }
    }

    fn to(&mut self, next: ExecutionState) {
        debug!(key = self.key.unwrap_or("-"), from = %self.state, to = %next, "Execution transition");
        self.state = next;
    }
}

impl CachedSparqlExecutor {
    pub fn new(
        store: Arc<dyn CacheStore>,
        endpoint: Arc<dyn SparqlEndpoint>,
        config: ExecutorConfig,
    ) -> Self {
        let guard = config
            .read_only
            .then(|| ReadOnlyGuard::new(&config.allowed_forms));
        Self {
            admin: CacheAdmin::new(Arc::clone(&store)),
            enhancer: QueryEnhancer::new().with_default_language(config.label_language.clone()),
            store,
            endpoint,
            guard,
            config,
        }
    }

    /// Execute `query`, serving it from the cache when possible.
    ///
    /// Never returns `Err`; failures are reported as
    /// [`ExecutionOutcome::Failure`] and are not cached.
    pub async fn execute(&self, query: &str) -> ExecutionOutcome {
        let started = Instant::now();
        let mut transitions = Transitions::start();

        if let Some(guard) = &self.guard {
            if let Err(err) = guard.check(query) {
                transitions.to(ExecutionState::Rejected);
                warn!(
                    kind = %err.kind(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Query rejected: {}",
                    err
                );
                return ExecutionOutcome::Failure(err);
            }
        }

        let key = CacheKey::from_query(query);
        transitions.key = Some(key.as_str());
        transitions.to(ExecutionState::KeyDerived);

        let cached = self.lookup(&key);
        transitions.to(ExecutionState::CacheChecked);
        if let Some(payload) = cached {
            transitions.to(ExecutionState::CacheHit);
            info!(
                key = %key,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Cache hit"
            );
            return ExecutionOutcome::Hit(payload);
        }

        transitions.to(ExecutionState::Enhancing);
        let dispatched = if self.config.enhance_queries {
            self.enhancer.enhance(query)
        } else {
            query.to_string()
        };

        transitions.to(ExecutionState::Dispatched);
        let result = match tokio::time::timeout(self.config.timeout, self.endpoint.query(&dispatched))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SparqlError::Timeout(self.config.timeout)),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(payload) => {
                transitions.to(ExecutionState::Succeeded);
                self.remember(&key, &payload);
                info!(key = %key, elapsed_ms, endpoint = self.endpoint.url(), "Query executed");
                ExecutionOutcome::Success(payload)
            }
            Err(err) => {
                let outcome = ExecutionOutcome::Failure(err);
                transitions.to(outcome.terminal_state());
                if let ExecutionOutcome::Failure(err) = &outcome {
                    warn!(
                        key = %key,
                        elapsed_ms,
                        kind = %err.kind(),
                        "Query failed: {}",
                        err
                    );
                }
                outcome
            }
        }
    }

    /// Cache read that treats any store failure as a miss
    fn lookup(&self, key: &CacheKey) -> Option<Value> {
        match self.store.get(key.as_str()) {
            Ok(hit) => hit,
            Err(err) => {
                warn!(key = %key, "Cache read failed, treating as miss: {}", err);
                None
            }
        }
    }

    /// Cache write that logs and skips on store failure
    fn remember(&self, key: &CacheKey, payload: &Value) {
        if let Err(err) = self.store.set(key.as_str(), payload) {
            warn!(key = %key, "Cache write failed, result not cached: {}", err);
        }
    }

    pub fn stats(&self) -> Result<CacheStatsSnapshot> {
        self.admin.stats()
    }

    pub fn clear(&self) -> Result<()> {
        self.admin.clear()
    }

    pub fn health_check(&self) -> Result<()> {
        self.admin.health_check()
    }

    pub fn purge_expired(&self) -> Result<usize> {
        self.admin.purge_expired()
    }

    pub fn status(&self) -> ServiceStatus {
        self.admin.status()
    }

    pub fn admin(&self) -> &CacheAdmin {
        &self.admin
    }

    pub fn enhancer(&self) -> &QueryEnhancer {
        &self.enhancer
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

impl std::fmt::Debug for CachedSparqlExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSparqlExecutor")
            .field("store", &self.store)
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use sparql_cache::{CacheConfig, MemoryCacheStore};
    use sparql_core::{FailureKind, ManualClock};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every dispatched query and answers with a fixed document
    #[derive(Debug, Default)]
    struct RecordingEndpoint {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SparqlEndpoint for RecordingEndpoint {
        async fn query(&self, query: &str) -> Result<Value> {
            self.seen.lock().unwrap().push(query.to_string());
            Ok(json!({"head": {"vars": ["x"]}, "results": {"bindings": []}}))
        }

        fn url(&self) -> &str {
            "stub://recording"
        }
    }

    fn executor(config: ExecutorConfig) -> (CachedSparqlExecutor, Arc<RecordingEndpoint>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryCacheStore::new(
            &CacheConfig::in_memory(Duration::from_secs(60)),
            clock,
        ));
        let endpoint = Arc::new(RecordingEndpoint::default());
        (
            CachedSparqlExecutor::new(store, endpoint.clone(), config),
            endpoint,
        )
    }

    #[tokio::test]
    async fn test_enhanced_query_is_dispatched() {
        let (executor, endpoint) = executor(ExecutorConfig::default());
        let query = "SELECT ?x WHERE { wd:Q42 wdt:P31 ?x }";

        assert!(executor.execute(query).await.is_success());

        let seen = endpoint.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("?x rdfs:label ?xLabel"));
    }

    #[tokio::test]
    async fn test_enhancement_can_be_disabled() {
        let (executor, endpoint) = executor(ExecutorConfig::default().with_enhancement(false));
        let query = "SELECT ?x WHERE { wd:Q42 wdt:P31 ?x }";

        executor.execute(query).await;
        assert_eq!(endpoint.seen.lock().unwrap()[0], query);
    }

    #[tokio::test]
    async fn test_cached_under_original_query_key() {
        let (executor, endpoint) = executor(ExecutorConfig::default());
        let query = "SELECT ?item WHERE { ?item wdt:P31 wd:Q5 }";

        assert!(!executor.execute(query).await.is_hit());
        let reformatted = "select ?item\n  where { ?item wdt:P31 wd:Q5 }";
        assert!(executor.execute(reformatted).await.is_hit());

        assert_eq!(endpoint.seen.lock().unwrap().len(), 1);
        let key = CacheKey::from_query(query);
        assert!(executor.store().get(key.as_str()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_guard_disabled_allows_any_form() {
        let (executor, endpoint) = executor(ExecutorConfig::default().with_read_only(false));
        let outcome = executor.execute("CONSTRUCT WHERE { ?s ?p ?o }").await;
        assert!(outcome.is_success());
        assert_eq!(endpoint.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_query_never_dispatched() {
        let (executor, endpoint) = executor(ExecutorConfig::default());
        let outcome = executor.execute("DELETE WHERE { ?s ?p ?o }").await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::InvalidInput));
        assert_eq!(outcome.terminal_state(), ExecutionState::Rejected);
        assert!(endpoint.seen.lock().unwrap().is_empty());
        assert_eq!(executor.stats().unwrap().misses, 0);
    }

    #[tokio::test]
    async fn test_admin_delegation() {
        let (executor, _) = executor(ExecutorConfig::default());
        executor.execute("SELECT ?a WHERE { ?a ?b ?c }").await;
        assert_eq!(executor.stats().unwrap().entry_count, 1);

        executor.clear().unwrap();
        assert_eq!(executor.stats().unwrap().entry_count, 0);
        assert!(executor.health_check().is_ok());
        assert_eq!(executor.purge_expired().unwrap(), 0);
        assert_eq!(executor.status().status, "ok");
    }
}
