//! Memory Tier Module
//!
//! Bounded, process-local key-value map with lazy and periodic expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::cache::{CacheEntry, EvictionOrder, EvictionPolicy};
use crate::clock::Clock;

// == Memory Tier ==
/// Process-local fallback tier.
///
/// All state sits behind one mutex because reads mutate it (lazy deletion of
/// expired entries, LRU reordering).
#[derive(Debug)]
pub struct MemoryTier {
    inner: Mutex<MemoryStore>,
    clock: Arc<dyn Clock>,
    max_size: usize,
}

#[derive(Debug)]
struct MemoryStore {
    entries: HashMap<String, CacheEntry>,
    order: EvictionOrder,
    evictions: u64,
    expired_removed: u64,
}

impl MemoryStore {
    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.remove(key);
            true
        } else {
            false
        }
    }

    fn sweep(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now_ms));
        let removed = before - self.entries.len();

        if removed > 0 {
            let entries = &self.entries;
            self.order.retain(|k| entries.contains_key(k));
            self.expired_removed += removed as u64;
        }
        removed
    }
}

impl MemoryTier {
    // == Constructor ==
    /// Creates a memory tier holding at most `max_size` entries.
    ///
    /// A `max_size` of zero disables the tier: every write is ignored.
    pub fn new(max_size: usize, policy: EvictionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(MemoryStore {
                entries: HashMap::new(),
                order: EvictionOrder::new(policy),
                evictions: 0,
                expired_removed: 0,
            }),
            clock,
            max_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // == Get ==
    /// Retrieves a value, removing it instead if it has expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now_ms();
        let mut store = self.lock();

        let expired = store.entries.get(key)?.is_expired_at(now);
        if expired {
            store.remove(key);
            store.expired_removed += 1;
            return None;
        }

        store.order.accessed(key);
        store.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Set ==
    /// Stores a value for `ttl_seconds`.
    ///
    /// Inserting a new key into a full tier first sweeps expired entries, then
    /// evicts in policy order until there is room. Returns false when the
    /// write was ignored (disabled tier or zero TTL).
    pub fn set(&self, key: &str, value: String, ttl_seconds: u64) -> bool {
        if self.max_size == 0 {
            return false;
        }

        let now = self.clock.now_ms();
        let mut store = self.lock();

        if ttl_seconds == 0 {
            store.remove(key);
            return false;
        }

        let is_new = !store.entries.contains_key(key);
        if is_new && store.entries.len() >= self.max_size {
            let swept = store.sweep(now);
            if swept > 0 {
                debug!(swept, "Memory tier: swept expired entries before insert");
            }

            while store.entries.len() >= self.max_size {
                let Some(oldest) = store.order.pop_oldest() else {
                    break;
                };
                store.entries.remove(&oldest);
                store.evictions += 1;
                debug!(key = %oldest, "Memory tier: evicted entry");
            }
        }

        store
            .entries
            .insert(key.to_string(), CacheEntry::new(value, ttl_seconds, now));
        store.order.inserted(key, is_new);
        true
    }

    // == Delete ==
    /// Removes an entry by key. Returns true if it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key)
    }

    // == Clear ==
    /// Removes every entry whose key contains `pattern`, or everything when
    /// no pattern is given. An empty pattern matches nothing.
    pub fn clear(&self, pattern: Option<&str>) -> usize {
        match pattern {
            None => {
                let mut store = self.lock();
                let removed = store.entries.len();
                store.entries.clear();
                store.order.clear();
                removed
            }
            Some("") => 0,
            Some(fragment) => self.clear_matching(|key| key.contains(fragment)),
        }
    }

    /// Removes every entry whose key satisfies `matches`.
    pub fn clear_matching(&self, matches: impl Fn(&str) -> bool) -> usize {
        let mut store = self.lock();
        let before = store.entries.len();
        store.entries.retain(|k, _| !matches(k));
        store.order.retain(|k| !matches(k));
        before - store.entries.len()
    }

    // == Sweep Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        self.lock().sweep(now)
    }

    /// Remaining TTL of a live entry, in seconds.
    pub fn ttl_remaining(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_ms();
        self.lock()
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.ttl_remaining(now))
    }

    // == Length ==
    /// Returns the current number of entries, expired ones included until
    /// they are swept.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn within_bounds(&self) -> bool {
        self.len() <= self.max_size
    }

    /// Entries dropped to stay within `max_size`.
    pub fn evictions(&self) -> u64 {
        self.lock().evictions
    }

    /// Entries dropped because their TTL elapsed.
    pub fn expired_removed(&self) -> u64 {
        self.lock().expired_removed
    }

    /// Zeroes the eviction and expiry counters.
    pub fn reset_counters(&self) {
        let mut store = self.lock();
        store.evictions = 0;
        store.expired_removed = 0;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn tier(max_size: usize, policy: EvictionPolicy) -> (MemoryTier, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (MemoryTier::new(max_size, policy, clock.clone()), clock)
    }

    #[test]
    fn test_tier_set_and_get() {
        let (tier, _) = tier(100, EvictionPolicy::Fifo);

        assert!(tier.set("key1", "value1".to_string(), 60));
        assert_eq!(tier.get("key1").as_deref(), Some("value1"));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_tier_get_nonexistent() {
        let (tier, _) = tier(100, EvictionPolicy::Fifo);
        assert_eq!(tier.get("nonexistent"), None);
    }

    #[test]
    fn test_tier_overwrite() {
        let (tier, _) = tier(100, EvictionPolicy::Fifo);

        tier.set("key1", "value1".to_string(), 60);
        tier.set("key1", "value2".to_string(), 60);

        assert_eq!(tier.get("key1").as_deref(), Some("value2"));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_tier_lazy_expiry() {
        let (tier, clock) = tier(100, EvictionPolicy::Fifo);

        tier.set("key1", "value1".to_string(), 1);
        assert!(tier.get("key1").is_some());

        clock.advance(Duration::from_millis(1000));

        assert_eq!(tier.get("key1"), None);
        assert!(tier.is_empty(), "Expired entry should be removed on read");
        assert_eq!(tier.expired_removed(), 1);
    }

    #[test]
    fn test_tier_fifo_eviction_ignores_reads() {
        let (tier, _) = tier(3, EvictionPolicy::Fifo);

        tier.set("key1", "value1".to_string(), 60);
        tier.set("key2", "value2".to_string(), 60);
        tier.set("key3", "value3".to_string(), 60);

        // Reading key1 does not protect it under FIFO
        tier.get("key1");
        tier.set("key4", "value4".to_string(), 60);

        assert_eq!(tier.len(), 3);
        assert_eq!(tier.get("key1"), None);
        assert!(tier.get("key2").is_some());
        assert!(tier.get("key4").is_some());
        assert_eq!(tier.evictions(), 1);
    }

    #[test]
    fn test_tier_lru_eviction_honors_reads() {
        let (tier, _) = tier(3, EvictionPolicy::Lru);

        tier.set("key1", "value1".to_string(), 60);
        tier.set("key2", "value2".to_string(), 60);
        tier.set("key3", "value3".to_string(), 60);

        tier.get("key1");
        tier.set("key4", "value4".to_string(), 60);

        assert!(tier.get("key1").is_some());
        assert_eq!(tier.get("key2"), None);
    }

    #[test]
    fn test_tier_full_insert_sweeps_expired_first() {
        let (tier, clock) = tier(2, EvictionPolicy::Fifo);

        tier.set("old", "v".to_string(), 60);
        tier.set("short", "v".to_string(), 1);
        clock.advance(Duration::from_secs(2));

        tier.set("new", "v".to_string(), 60);

        assert!(tier.get("old").is_some(), "Sweep should make room before evicting");
        assert!(tier.get("new").is_some());
        assert_eq!(tier.evictions(), 0);
    }

    #[test]
    fn test_tier_clear_substring() {
        let (tier, _) = tier(100, EvictionPolicy::Fifo);

        tier.set("bug_detail_1", "v".to_string(), 60);
        tier.set("bug_detail_2", "v".to_string(), 60);
        tier.set("user_1", "v".to_string(), 60);

        assert_eq!(tier.clear(Some("detail")), 2);
        assert_eq!(tier.clear(Some("")), 0);
        assert!(tier.get("user_1").is_some());
        assert_eq!(tier.clear(None), 1);
        assert!(tier.is_empty());
    }

    #[test]
    fn test_tier_clear_matching_keeps_order_in_sync() {
        let (tier, _) = tier(2, EvictionPolicy::Fifo);

        tier.set("user_1_avatar", "v".to_string(), 60);
        tier.set("user_2", "v".to_string(), 60);

        assert_eq!(tier.clear_matching(|key| key.ends_with("_avatar")), 1);
        assert!(tier.get("user_2").is_some());

        // The freed slot is reusable without evicting the survivor
        tier.set("user_3", "v".to_string(), 60);
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.evictions(), 0);
    }

    #[test]
    fn test_tier_delete() {
        let (tier, _) = tier(100, EvictionPolicy::Fifo);

        tier.set("key1", "value1".to_string(), 60);
        assert!(tier.delete("key1"));
        assert!(!tier.delete("key1"));
        assert!(tier.is_empty());
    }

    #[test]
    fn test_tier_sweep_expired() {
        let (tier, clock) = tier(100, EvictionPolicy::Fifo);

        tier.set("key1", "value1".to_string(), 1);
        tier.set("key2", "value2".to_string(), 10);
        clock.advance(Duration::from_millis(1100));

        assert_eq!(tier.sweep_expired(), 1);
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.ttl_remaining("key2"), Some(8));
    }

    #[test]
    fn test_tier_zero_capacity_is_disabled() {
        let (tier, _) = tier(0, EvictionPolicy::Fifo);

        assert!(!tier.set("key1", "value1".to_string(), 60));
        assert!(tier.is_empty());
        assert!(tier.within_bounds());
    }

    #[test]
    fn test_tier_zero_ttl_drops_existing() {
        let (tier, _) = tier(10, EvictionPolicy::Fifo);

        tier.set("key1", "value1".to_string(), 60);
        assert!(!tier.set("key1", "value2".to_string(), 0));
        assert_eq!(tier.get("key1"), None);
    }
}
