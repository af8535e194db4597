//! Health Monitor
//!
//! Probes the remote tier and inspects the memory-tier bound.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::CacheBackend;
use crate::cache::MemoryTier;

/// Aggregate health of both tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Remote tier answered `PING`
    pub remote_reachable: bool,
    /// Memory tier holds no more than its configured maximum
    pub memory_within_bounds: bool,
    /// Healthy if either tier is serviceable
    pub overall: bool,
    pub memory_entries: usize,
    pub memory_max_size: usize,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    backend: CacheBackend,
    memory: Arc<MemoryTier>,
}

impl HealthMonitor {
    pub fn new(backend: CacheBackend, memory: Arc<MemoryTier>) -> Self {
        Self { backend, memory }
    }

    /// Takes a snapshot. A failed or timed-out ping reads as unreachable.
    ///
    /// `overall` is `remote_reachable || memory_within_bounds`, so a remote
    /// outage alone does not make the cache unhealthy.
    pub async fn check(&self) -> HealthSnapshot {
        let remote_reachable = self.backend.ping().await;
        let memory_within_bounds = self.memory.within_bounds();
        let memory_entries = self.memory.len();
        let memory_max_size = self.memory.max_size();

        HealthSnapshot {
            remote_reachable,
            memory_within_bounds,
            overall: remote_reachable || memory_within_bounds,
            memory_entries,
            memory_max_size,
            checked_at: Utc::now(),
        }
    }
}
