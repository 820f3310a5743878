//! Runtime settings from the environment or a JSON file

use serde::{Deserialize, Serialize};
use sparql_cache::CacheConfig;
use sparql_core::{Result, SparqlError};
use sparql_executor::config::{default_user_agent, DEFAULT_ENDPOINT_URL, DEFAULT_MAX_GET_URL_LEN};
use sparql_executor::{EndpointConfig, ExecutorConfig};
use std::path::Path;
use std::time::Duration;

/// All tunables of the engine.
///
/// Field names match the environment variables in lower case, so a settings
/// file and the environment share one vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sparql_endpoint: String,
    /// Seconds
    pub sparql_timeout: u64,
    pub sparql_user_agent: String,
    pub sparql_label_language: String,
    pub sparql_enhance_queries: bool,
    pub sparql_read_only: bool,
    pub cache_connection_string: String,
    pub cache_collection: String,
    pub cache_ttl_seconds: u64,
    pub cache_max_pool_size: usize,
    pub cache_connect_timeout_ms: u64,
    pub cache_selection_timeout_ms: u64,
    pub cache_retry_writes: bool,
    pub cache_retry_reads: bool,
    pub cache_max_entries: usize,
    /// Zero disables the background sweep
    pub cache_sweep_interval_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            sparql_endpoint: DEFAULT_ENDPOINT_URL.to_string(),
            sparql_timeout: 20,
            sparql_user_agent: default_user_agent(),
            sparql_label_language: "en".to_string(),
            sparql_enhance_queries: true,
            sparql_read_only: true,
            cache_connection_string: cache.connection_string,
            cache_collection: cache.collection,
            cache_ttl_seconds: cache.ttl.as_secs(),
            cache_max_pool_size: cache.pool_size,
            cache_connect_timeout_ms: cache.connect_timeout.as_millis() as u64,
            cache_selection_timeout_ms: cache.selection_timeout.as_millis() as u64,
            cache_retry_writes: cache.retry_writes,
            cache_retry_reads: cache.retry_reads,
            cache_max_entries: cache.max_entries,
            cache_sweep_interval_seconds: 0,
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SparqlError::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            SparqlError::Config(format!("invalid settings file {}: {}", path.display(), e))
        })
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().overlay_env()
    }

    /// Override fields from the process environment
    pub fn overlay_env(self) -> Result<Self> {
        self.overlay(|name| std::env::var(name).ok())
    }

    /// Override fields with whatever `lookup` returns for their variable name.
    ///
    /// Empty values are ignored; values that do not parse are an error.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SPARQL_ENDPOINT") {
            self.sparql_endpoint = v.trim().to_string();
        }
        if let Some(v) = get("SPARQL_TIMEOUT") {
            self.sparql_timeout = parse_number("SPARQL_TIMEOUT", &v)?;
        }
        if let Some(v) = get("SPARQL_USER_AGENT") {
            self.sparql_user_agent = v;
        }
        if let Some(v) = get("SPARQL_LABEL_LANGUAGE") {
            self.sparql_label_language = v.trim().to_string();
        }
        if let Some(v) = get("SPARQL_ENHANCE_QUERIES") {
            self.sparql_enhance_queries = parse_bool("SPARQL_ENHANCE_QUERIES", &v)?;
        }
        if let Some(v) = get("SPARQL_READ_ONLY") {
            self.sparql_read_only = parse_bool("SPARQL_READ_ONLY", &v)?;
        }
        if let Some(v) = get("CACHE_CONNECTION_STRING") {
            self.cache_connection_string = v.trim().to_string();
        }
        if let Some(v) = get("CACHE_COLLECTION") {
            self.cache_collection = v.trim().to_string();
        }
        if let Some(v) = get("CACHE_TTL_SECONDS") {
            self.cache_ttl_seconds = parse_number("CACHE_TTL_SECONDS", &v)?;
        }
        if let Some(v) = get("CACHE_MAX_POOL_SIZE") {
            self.cache_max_pool_size = parse_number("CACHE_MAX_POOL_SIZE", &v)?;
        }
        if let Some(v) = get("CACHE_CONNECT_TIMEOUT_MS") {
            self.cache_connect_timeout_ms = parse_number("CACHE_CONNECT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("CACHE_SELECTION_TIMEOUT_MS") {
            self.cache_selection_timeout_ms = parse_number("CACHE_SELECTION_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("CACHE_RETRY_WRITES") {
            self.cache_retry_writes = parse_bool("CACHE_RETRY_WRITES", &v)?;
        }
        if let Some(v) = get("CACHE_RETRY_READS") {
            self.cache_retry_reads = parse_bool("CACHE_RETRY_READS", &v)?;
        }
        if let Some(v) = get("CACHE_MAX_ENTRIES") {
            self.cache_max_entries = parse_number("CACHE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = get("CACHE_SWEEP_INTERVAL_SECONDS") {
            self.cache_sweep_interval_seconds = parse_number("CACHE_SWEEP_INTERVAL_SECONDS", &v)?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sparql_endpoint.starts_with("http://") || self.sparql_endpoint.starts_with("https://")) {
            return Err(SparqlError::Config(format!(
                "SPARQL_ENDPOINT must be an http(s) URL, got '{}'",
                self.sparql_endpoint
            )));
        }
        if self.sparql_timeout == 0 {
            return Err(SparqlError::Config("SPARQL_TIMEOUT must be positive".into()));
        }
        self.cache_config().validate()
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.sparql_timeout)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.cache_sweep_interval_seconds > 0)
            .then(|| Duration::from_secs(self.cache_sweep_interval_seconds))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_connection_string(self.cache_connection_string.clone())
            .with_collection(self.cache_collection.clone())
            .with_ttl(Duration::from_secs(self.cache_ttl_seconds))
            .with_max_entries(self.cache_max_entries)
            .with_pool_size(self.cache_max_pool_size)
            .with_timeouts(
                Duration::from_millis(self.cache_connect_timeout_ms),
                Duration::from_millis(self.cache_selection_timeout_ms),
            )
            .with_retries(self.cache_retry_reads, self.cache_retry_writes)
            .with_sweep_interval(self.sweep_interval())
    }

    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig::new(self.sparql_endpoint.clone())
            .with_timeout(self.query_timeout())
            .with_user_agent(self.sparql_user_agent.clone())
            .with_max_get_url_len(DEFAULT_MAX_GET_URL_LEN)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::default()
            .with_timeout(self.query_timeout())
            .with_enhancement(self.sparql_enhance_queries)
            .with_read_only(self.sparql_read_only)
            .with_label_language(self.sparql_label_language.clone())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SparqlError::Config(format!("{} must be a non-negative integer, got '{}'", name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(SparqlError::Config(format!(
            "{} must be true or false, got '{}'",
            name, value
        ))),
    }
}
