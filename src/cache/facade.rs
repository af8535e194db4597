//! Cache Facade Module
//!
//! The public cache API: read remote-then-memory, write through both tiers,
//! resolve TTLs by key pattern, keep the counters.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::{CacheBackend, RedisStore, RemoteStore};
use crate::cache::{CacheStats, MemoryTier, StatsCounters, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::health::{HealthMonitor, HealthSnapshot};
use crate::invalidation::InvalidationRouter;
use crate::pattern::KeyPattern;
use crate::policy::{InvalidationRules, TtlPolicy};
use crate::warmer::{EntityLoader, Warmer};

// == Cleared ==
/// Outcome of [`CacheFacade::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleared {
    /// Both tiers were flushed entirely
    Everything,
    /// Number of matching entries removed, summed over both tiers
    Keys(usize),
}

// == Cache Facade ==
/// Two-tier cache handle. Build one per process and share it by `Arc`.
#[derive(Debug)]
pub struct CacheFacade {
    backend: CacheBackend,
    memory: Arc<MemoryTier>,
    policy: TtlPolicy,
    memory_cap_ttl: u64,
    stats: StatsCounters,
    router: InvalidationRouter,
    warmer: Warmer,
    health: HealthMonitor,
}

/// Assembles a [`CacheFacade`] around a remote store.
pub struct CacheFacadeBuilder {
    store: Arc<dyn RemoteStore>,
    config: Config,
    clock: Arc<dyn Clock>,
}

impl CacheFacadeBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.config.ttl_policy = policy;
        self
    }

    pub fn invalidation_rules(mut self, rules: InvalidationRules) -> Self {
        self.config.invalidation = rules;
        self
    }

    pub fn memory_max_size(mut self, max_size: usize) -> Self {
        self.config.memory_max_size = max_size;
        self
    }

    pub fn build(self) -> CacheFacade {
        let config = self.config;
        let memory = Arc::new(MemoryTier::new(
            config.memory_max_size,
            config.eviction_policy,
            self.clock,
        ));
        let backend = CacheBackend::new(self.store, config.remote_timeout());
        let health = HealthMonitor::new(backend.clone(), memory.clone());

        CacheFacade {
            backend,
            memory,
            policy: config.ttl_policy,
            memory_cap_ttl: config.memory_cap_ttl,
            stats: StatsCounters::new(),
            router: InvalidationRouter::new(config.invalidation),
            warmer: Warmer::new(config.warm_batch_limit),
            health,
        }
    }
}

impl CacheFacade {
    // == Constructors ==
    /// Starts a builder with default configuration and the system clock.
    pub fn builder(store: Arc<dyn RemoteStore>) -> CacheFacadeBuilder {
        CacheFacadeBuilder {
            store,
            config: Config::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Builds a facade backed by the Redis server named in `config`.
    ///
    /// Only a malformed URL fails here; an unreachable server just makes the
    /// cache run degraded.
    pub fn connect(config: Config) -> Result<Self> {
        let store = RedisStore::open(&config.redis_url)?;
        Ok(Self::builder(Arc::new(store)).config(config).build())
    }

    // == Get ==
    /// Reads a value, trying the remote tier first and the memory tier on a
    /// remote miss or failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.stats.record_request();

        let mut undecodable = false;
        if let Some(raw) = self.backend.get(key).await {
            match self.decode(key, &raw) {
                Some(value) => {
                    self.stats.record_remote_hit();
                    return Some(value);
                }
                None => undecodable = true,
            }
        }

        self.stats.record_remote_miss();
        self.read_memory(key, undecodable)
    }

    /// Memory half of a read. A read counts at most one serialization error
    /// however many tiers held an undecodable copy.
    fn read_memory<T: DeserializeOwned>(&self, key: &str, mut undecodable: bool) -> Option<T> {
        let value = self.memory.get(key).and_then(|raw| {
            let value = self.decode(key, &raw);
            undecodable |= value.is_none();
            value
        });
        if undecodable {
            self.stats.record_serialization_error();
        }

        match value {
            Some(value) => {
                self.stats.record_memory_hit();
                Some(value)
            }
            None => {
                self.stats.record_memory_miss();
                None
            }
        }
    }

    // == Set ==
    /// Writes a value through both tiers.
    ///
    /// Without an explicit `ttl` the policy decides. The memory copy lives at
    /// most `memory_cap_ttl` seconds. Returns true if either tier took it.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<u64>) -> bool {
        let ttl = ttl.unwrap_or_else(|| self.policy.resolve(key));
        if ttl == 0 {
            debug!(key, "Skipping cache write with zero TTL");
            return false;
        }
        let Some(raw) = self.encode(key, value) else {
            return false;
        };

        let remote = self.backend.set(key, &raw, ttl).await;
        let memory = self.memory.set(key, raw, self.memory_ttl(ttl));
        debug!(key, ttl, remote, memory, "Cache write");
        remote || memory
    }

    // == Get Multiple ==
    /// Reads many keys. The result holds exactly the input keys.
    ///
    /// One `MGET` answers what it can; keys it misses are looked up in the
    /// memory tier. If the batch itself fails, every key degrades to its own
    /// remote-then-memory [`get`](Self::get).
    pub async fn get_multiple<T, K>(&self, keys: &[K]) -> HashMap<String, Option<T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        let mut results = HashMap::with_capacity(keys.len());

        let Some(remote) = self.backend.mget(&keys).await else {
            for key in keys {
                if !results.contains_key(&key) {
                    let value = self.get(&key).await;
                    results.insert(key, value);
                }
            }
            return results;
        };

        for (key, raw) in remote {
            self.stats.record_request();
            let mut undecodable = false;
            if let Some(raw) = raw {
                if let Some(value) = self.decode(&key, &raw) {
                    self.stats.record_remote_hit();
                    results.insert(key, Some(value));
                    continue;
                }
                undecodable = true;
            }
            self.stats.record_remote_miss();
            let value = self.read_memory(&key, undecodable);
            results.insert(key, value);
        }
        results
    }

    // == Set Multiple ==
    /// Writes many entries: one pipelined remote batch, then each entry into
    /// memory. TTLs resolve per key unless `ttl` is given.
    ///
    /// Returns the number of entries accepted for writing.
    pub async fn set_multiple<I, K, V>(&self, entries: I, ttl: Option<u64>) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        let mut batch = Vec::new();
        for (key, value) in entries {
            let key = key.into();
            let ttl = ttl.unwrap_or_else(|| self.policy.resolve(&key));
            if ttl == 0 {
                debug!(key = %key, "Skipping cache write with zero TTL");
                continue;
            }
            if let Some(raw) = self.encode(&key, &value) {
                batch.push((key, raw, ttl));
            }
        }

        let accepted = batch.len();
        let remote = self.backend.mset(&batch).await;
        let mut memory = 0;
        for (key, raw, ttl) in batch {
            if self.memory.set(&key, raw, self.memory_ttl(ttl)) {
                memory += 1;
            }
        }

        debug!(accepted, remote, memory, "Cache batch write");
        accepted
    }

    // == Delete ==
    /// Removes a key from both tiers. True if either held it.
    pub async fn delete(&self, key: &str) -> bool {
        let remote = self.backend.delete(key).await > 0;
        let memory = self.memory.delete(key);
        remote || memory
    }

    // == Clear ==
    /// `None` flushes both tiers. Otherwise every key matching the pattern is
    /// removed: by glob in the remote tier, by [`KeyPattern::matches`] in memory.
    pub async fn clear(&self, pattern: Option<&str>) -> Cleared {
        match pattern {
            None => {
                let remote = self.backend.flush().await;
                let memory = self.memory.clear(None);
                info!(remote_flushed = remote, memory_removed = memory, "Cache flushed");
                Cleared::Everything
            }
            Some(pattern) => Cleared::Keys(self.clear_pattern(&KeyPattern::new(pattern)).await),
        }
    }

    /// Removes every key matching `pattern` from both tiers and returns the
    /// summed count.
    pub async fn clear_pattern(&self, pattern: &KeyPattern) -> usize {
        if pattern.is_empty() {
            let err = CacheError::InvalidPattern(pattern.to_string());
            warn!(error = %err, "Clear with empty pattern matches nothing");
            return 0;
        }

        let remote = self.backend.scan_delete(pattern.glob()).await;
        let memory = self.memory.clear_matching(|key| pattern.matches(key));
        debug!(pattern = %pattern, remote, memory, "Cleared cache pattern");
        remote + memory
    }

    // == Invalidation ==
    /// Purges every pattern registered for a domain event.
    pub async fn invalidate_by_event(&self, event: &str) -> usize {
        self.router.invalidate(self, event).await
    }

    // == Warming ==
    /// Pre-populates both tiers from the given loaders.
    pub async fn warm(&self, loaders: &[Arc<dyn EntityLoader>]) -> bool {
        self.warmer.warm(self, loaders).await
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.snapshot();
        stats.remote_errors = self.backend.errors();
        stats.memory_evictions = self.memory.evictions();
        stats.expired_removed = self.memory.expired_removed();
        stats.memory_entries = self.memory.len();
        stats
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
        self.backend.reset_errors();
        self.memory.reset_counters();
    }

    // == Health ==
    pub async fn health_check(&self) -> HealthSnapshot {
        self.health.check().await
    }

    /// Monitor handle for the periodic health task.
    pub fn health_monitor(&self) -> HealthMonitor {
        self.health.clone()
    }

    // == Accessors ==
    /// TTL a key would receive without an explicit one.
    pub fn resolve_ttl(&self, key: &str) -> u64 {
        self.policy.resolve(key)
    }

    /// Shared memory tier, for the sweep task.
    pub fn memory(&self) -> &Arc<MemoryTier> {
        &self.memory
    }

    fn memory_ttl(&self, ttl: u64) -> u64 {
        ttl.min(self.memory_cap_ttl)
    }

    fn encode<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Option<String> {
        if let Err(err) = validate_key(key) {
            warn!(key, error = %err, "Refusing to cache entry");
            return None;
        }

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                let err = CacheError::from(err);
                error!(key, error = %err, "Cache value could not be encoded");
                self.stats.record_serialization_error();
                return None;
            }
        };

        if raw.len() > MAX_VALUE_SIZE {
            let err = CacheError::ValueTooLarge(raw.len());
            warn!(key, error = %err, "Refusing to cache entry");
            return None;
        }
        Some(raw)
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, raw: &str) -> Option<T> {
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(err) => {
                let err = CacheError::from(err);
                error!(key, error = %err, "Cache value could not be decoded");
                None
            }
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}
