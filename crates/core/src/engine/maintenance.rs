//! Periodic cache maintenance

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::PermissionEngine;

/// Sweep expired player cache entries every `period`
///
/// Usually called with [`EngineConfig::cleanup_interval`](crate::config::EngineConfig::cleanup_interval).
/// The task holds only a weak reference and stops once the engine is dropped.
pub fn spawn_cache_sweeper(engine: &Arc<PermissionEngine>, period: Duration) -> JoinHandle<()> {
    let engine = Arc::downgrade(engine);
    let period = period.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(engine) = engine.upgrade() else {
                break;
            };
            let removed = engine.cleanup_expired();
            if removed > 0 {
                tracing::debug!("Swept {} expired permission cache entries", removed);
            }
        }
        tracing::debug!("Permission cache sweeper stopped");
    })
}
