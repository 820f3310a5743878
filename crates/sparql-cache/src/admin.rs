//! Cache administration: statistics, invalidation and health

use crate::stats::CacheStatsSnapshot;
use crate::store::CacheStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sparql_core::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Management surface over a shared cache store.
///
/// Safe to use while executions are running against the same store.
#[derive(Debug, Clone)]
pub struct CacheAdmin {
    store: Arc<dyn CacheStore>,
}

/// Health report for the cache path
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// `"ok"` or `"degraded"`
    pub status: &'static str,
    pub cache_healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_stats: Option<CacheStatsSnapshot>,
    pub checked_at: DateTime<Utc>,
}

impl CacheAdmin {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn stats(&self) -> Result<CacheStatsSnapshot> {
        self.store.stats()
    }

    /// Remove every cached result
    pub fn clear(&self) -> Result<()> {
        self.store.invalidate_all()?;
        info!("Cache cleared via administration");
        Ok(())
    }

    pub fn health_check(&self) -> Result<()> {
        self.store.health_check()
    }

    pub fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired()
    }

    /// Combined health and statistics report; never fails
    pub fn status(&self) -> ServiceStatus {
        let checked_at = Utc::now();
        match self.store.health_check() {
            Ok(()) => ServiceStatus {
                status: "ok",
                cache_healthy: true,
                detail: None,
                cache_stats: self.store.stats().ok(),
                checked_at,
            },
            Err(e) => {
                warn!("Cache health check failed: {}", e);
                ServiceStatus {
                    status: "degraded",
                    cache_healthy: false,
                    detail: Some(e.to_string()),
                    cache_stats: None,
                    checked_at,
                }
            }
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }
}
