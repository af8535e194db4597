//! Memory Sweep Task
//!
//! Background task that periodically removes expired memory-tier entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MemoryTier;

/// Spawns a background task that sweeps expired entries out of the memory
/// tier every `sweep_interval_secs` seconds (at least one).
///
/// Reads already expire entries lazily; the sweep frees memory held by keys
/// nobody reads again.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_sweep_task(memory: Arc<MemoryTier>, sweep_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(sweep_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting memory sweep task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = memory.sweep_expired();
            if removed > 0 {
                info!(removed, remaining = memory.len(), "Memory sweep: removed expired entries");
            } else {
                debug!("Memory sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionPolicy;
    use crate::clock::ManualClock;

    fn tier() -> (Arc<MemoryTier>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let memory = Arc::new(MemoryTier::new(100, EvictionPolicy::Fifo, clock.clone()));
        (memory, clock)
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let (memory, clock) = tier();
        memory.set("expire_soon", "value".to_string(), 1);
        clock.advance(Duration::from_secs(2));

        let handle = spawn_sweep_task(memory.clone(), 1);

        // Wait for the sweep to run
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // len() does not expire lazily, so only the sweep can have removed it
        assert_eq!(memory.len(), 0, "Expired entry should have been swept");
        assert_eq!(memory.expired_removed(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let (memory, _) = tier();
        memory.set("long_lived", "value".to_string(), 3600);

        let handle = spawn_sweep_task(memory.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(memory.get("long_lived").as_deref(), Some("value"));

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_can_be_aborted() {
        let (memory, _) = tier();

        let handle = spawn_sweep_task(memory, 1);
        handle.abort();

        // Wait a bit and verify task is finished
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
