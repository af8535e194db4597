//! Cache Statistics Module
//!
//! Tracks per-tier hits and misses plus the failure counters of the
//! fail-closed layers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Stats Counters ==
/// Live process-lifetime counters, shared by every caller of the facade.
#[derive(Debug, Default)]
pub struct StatsCounters {
    remote_hits: AtomicU64,
    remote_misses: AtomicU64,
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    total_requests: AtomicU64,
    serialization_errors: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_hit(&self) {
        self.remote_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_miss(&self) {
        self.remote_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory_miss(&self) {
        self.memory_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serialization_error(&self) {
        self.serialization_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.remote_hits,
            &self.remote_misses,
            &self.memory_hits,
            &self.memory_misses,
            &self.total_requests,
            &self.serialization_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Copies the counters into a serializable snapshot. Tier-owned figures
    /// (remote errors, evictions, entry count) are filled in by the facade.
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            remote_misses: self.remote_misses.load(Ordering::Relaxed),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            memory_misses: self.memory_misses.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            serialization_errors: self.serialization_errors.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }
}

// == Cache Stats ==
/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Reads answered by the remote tier
    pub remote_hits: u64,
    /// Reads the remote tier could not answer (miss or failure)
    pub remote_misses: u64,
    /// Reads answered by the memory tier after a remote miss
    pub memory_hits: u64,
    /// Reads neither tier could answer
    pub memory_misses: u64,
    /// Total reads
    pub total_requests: u64,
    /// Remote calls that failed or timed out
    pub remote_errors: u64,
    /// Values that could not be encoded or decoded
    pub serialization_errors: u64,
    /// Memory entries evicted to stay within bounds
    pub memory_evictions: u64,
    /// Memory entries removed because their TTL elapsed
    pub expired_removed: u64,
    /// Current number of memory entries
    pub memory_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the combined hit rate across both tiers.
    ///
    /// Returns hits / total_requests, or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.remote_hits + self.memory_hits) as f64 / self.total_requests as f64
        }
    }

    /// Reads that fell through both tiers.
    pub fn misses(&self) -> u64 {
        self.memory_misses
    }
}
