//! Periodic pruning of the in-memory ping index.
//!
//! Durable history is never pruned here; only the hot index used by
//! proximity search is kept to the retention horizon. Idle per-user lock
//! entries are dropped on the same cadence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::location_service::LocationService;
use super::user_locks::UserLocks;

/// Runs the prune loop until `shutdown` turns `true` or its sender drops.
pub async fn run(
    locations: LocationService,
    locks: Arc<UserLocks>,
    retention: chrono::Duration,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        retention_secs = retention.num_seconds(),
        interval_secs = every.as_secs(),
        "location retention job started"
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("location retention job stopping");
                    break;
                }
            }
            _ = interval.tick() => {
                let pruned = locations.prune_index(retention).await;
                let idle_locks = locks.prune_idle().await;
                if pruned > 0 || idle_locks > 0 {
                    tracing::debug!(pruned, idle_locks, "location index pruned");
                }
            }
        }
    }
}
