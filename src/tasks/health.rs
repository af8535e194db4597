//! Health Probe Task
//!
//! Background task that re-checks cache health and logs transitions.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::health::{HealthMonitor, HealthSnapshot};

/// Spawns a task that probes health every `interval_secs` seconds (at least
/// one) and publishes each snapshot on the returned watch channel.
///
/// Changes in remote reachability or the memory bound are logged at info
/// (recovery) or warn (degradation); steady state is logged at debug.
pub fn spawn_health_task(
    monitor: HealthMonitor,
    interval_secs: u64,
) -> (JoinHandle<()>, watch::Receiver<Option<HealthSnapshot>>) {
    let interval = Duration::from_secs(interval_secs.max(1));
    let (tx, rx) = watch::channel(None);

    let handle = tokio::spawn(async move {
        info!(
            "Starting health probe task with interval of {} seconds",
            interval.as_secs()
        );

        let mut previous: Option<HealthSnapshot> = None;
        loop {
            let snapshot = monitor.check().await;
            log_transition(previous.as_ref(), &snapshot);
            previous = Some(snapshot.clone());

            // No receivers left means nobody is watching; keep logging anyway
            let _ = tx.send(Some(snapshot));

            tokio::time::sleep(interval).await;
        }
    });

    (handle, rx)
}

fn log_transition(previous: Option<&HealthSnapshot>, current: &HealthSnapshot) {
    let remote_changed = previous.map_or(true, |p| p.remote_reachable != current.remote_reachable);
    let memory_changed =
        previous.map_or(true, |p| p.memory_within_bounds != current.memory_within_bounds);

    if !remote_changed && !memory_changed {
        debug!(overall = current.overall, "Cache health unchanged");
        return;
    }

    if current.remote_reachable && current.memory_within_bounds {
        info!(
            memory_entries = current.memory_entries,
            "Cache healthy: remote tier reachable, memory tier within bounds"
        );
    } else {
        warn!(
            remote_reachable = current.remote_reachable,
            memory_within_bounds = current.memory_within_bounds,
            overall = current.overall,
            memory_entries = current.memory_entries,
            memory_max_size = current.memory_max_size,
            "Cache degraded"
        );
    }
}
