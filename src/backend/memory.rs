//! In-process stand-in for the shared store.
//!
//! Honors TTLs against an injected clock and matches globs the way Redis
//! `KEYS` does for `*`, `?` and `[...]`. It can be switched offline or told to
//! reject pipelines, which is how the degraded paths are exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::RemoteStore;
use crate::cache::CacheEntry;
use crate::clock::Clock;
use crate::error::{CacheError, Result};
use crate::pattern::compile_glob;

#[derive(Debug)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
    reject_batches: AtomicBool,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            offline: AtomicBool::new(false),
            reject_batches: AtomicBool::new(false),
        }
    }

    /// While offline every call fails with `RemoteUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// While set, pipelined writes fail but single commands succeed.
    pub fn set_batch_failure(&self, reject: bool) {
        self.reject_batches.store(reject, Ordering::SeqCst);
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        let mut keys: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<()> {
        if self.is_offline() {
            Err(CacheError::RemoteUnavailable("in-memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn read(&self, entries: &mut HashMap<String, CacheEntry>, key: &str, now: u64) -> Option<String> {
        match entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_online()?;
        let now = self.clock.now_ms();
        Ok(self.read(&mut self.lock(), key, now))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        self.check_online()?;
        let entry = CacheEntry::new(value.to_string(), ttl_seconds, self.clock.now_ms());
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check_online()?;
        let now = self.clock.now_ms();
        let mut entries = self.lock();
        Ok(keys
            .iter()
            .map(|key| self.read(&mut entries, key, now))
            .collect())
    }

    async fn mset(&self, batch: &[(String, String, u64)]) -> Result<()> {
        self.check_online()?;
        if self.reject_batches.load(Ordering::SeqCst) {
            return Err(CacheError::RemoteUnavailable("pipeline rejected".to_string()));
        }

        let now = self.clock.now_ms();
        let mut entries = self.lock();
        for (key, value, ttl) in batch {
            entries.insert(key.clone(), CacheEntry::new(value.clone(), *ttl, now));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<usize> {
        self.check_online()?;
        let now = self.clock.now_ms();
        let removed = self.lock().remove(key);
        Ok(usize::from(removed.is_some_and(|entry| !entry.is_expired_at(now))))
    }

    async fn scan_delete(&self, glob: &str) -> Result<usize> {
        self.check_online()?;
        let matcher = compile_glob(glob)?;
        let now = self.clock.now_ms();

        let mut entries = self.lock();
        let before = entries.len();
        let mut expired = 0;
        entries.retain(|key, entry| {
            let hit = matcher.is_match(key.as_str());
            if hit && entry.is_expired_at(now) {
                expired += 1;
            }
            !hit
        });
        Ok(before - entries.len() - expired)
    }

    async fn flush(&self) -> Result<()> {
        self.check_online()?;
        self.lock().clear();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_online()
    }
}
