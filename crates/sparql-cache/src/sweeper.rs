//! Background eviction of expired entries
//!
//! Reads already hide expired entries; the sweeper only reclaims space.

use crate::store::CacheStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Spawn a task that calls `purge_expired` every `interval`.
///
/// Failures are logged and the sweep continues on the next tick. Abort the
/// returned handle to stop it.
pub fn spawn_expiry_sweeper(store: Arc<dyn CacheStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.purge_expired() {
                Ok(0) => {}
                Ok(removed) => debug!("Expiry sweep removed {} entries", removed),
                Err(e) => warn!("Expiry sweep failed: {}", e),
            }
        }
    })
}
