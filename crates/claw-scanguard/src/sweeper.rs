//! Background reclamation of idle reputation entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::DEFAULT_SWEEP_INTERVAL_SECONDS;
use crate::store::ReputationStore;

/// Spawn a task that sweeps `store` every `interval`.
///
/// A zero `interval` falls back to the default period. The task exits once
/// `shutdown` carries `true` or its sender is dropped. Must be called from
/// within a tokio runtime.
pub fn spawn_sweeper(
    store: Arc<ReputationStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let interval = if interval.is_zero() {
        debug!(default_secs = DEFAULT_SWEEP_INTERVAL_SECONDS, "Zero sweep interval, using default");
        Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS)
    } else {
        interval
    };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            interval_secs = interval.as_secs(),
            remember_secs = store.remember_secs(),
            "Reputation sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = store.sweep(clock.now());
                    debug!(removed, tracked = store.len(), "Sweep finished");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reputation sweeper stopped");
    })
}
