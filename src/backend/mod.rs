//! Remote Tier Module
//!
//! `RemoteStore` is the fallible transport driver; `CacheBackend` wraps it and
//! fails closed, so nothing past this point ever sees a transport error.

mod memory;
mod redis_store;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{CacheError, Result};

pub use self::memory::InMemoryStore;
pub use self::redis_store::RedisStore;

// == Remote Store ==
/// Driver for a shared key-value store speaking Redis semantics.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short driver name, for logs.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    /// Values positionally aligned with `keys`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Pipelined `(key, value, ttl_seconds)` writes.
    async fn mset(&self, entries: &[(String, String, u64)]) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<usize>;

    /// Deletes every key matching a Redis glob.
    async fn scan_delete(&self, glob: &str) -> Result<usize>;

    async fn flush(&self) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    /// Discards any cached connection so the next call starts afresh. Called
    /// after a call was abandoned on timeout.
    async fn reset(&self) {}
}

// == Cache Backend ==
/// Fail-closed adapter over a [`RemoteStore`].
///
/// Every call is bounded by `timeout`; errors and timeouts become misses or
/// no-ops, are logged, and are counted.
#[derive(Clone)]
pub struct CacheBackend {
    store: Arc<dyn RemoteStore>,
    timeout: Duration,
    errors: Arc<AtomicU64>,
}

impl CacheBackend {
    pub fn new(store: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            errors: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.store.name()
    }

    /// Remote calls that failed or timed out since the last reset.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn reset_errors(&self) {
        self.errors.store(0, Ordering::Relaxed);
    }

    async fn call<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Option<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                self.record_failure(op, &err);
                None
            }
            Err(_) => {
                self.record_failure(op, &CacheError::Timeout(self.timeout));
                // Reset is bounded by the same timeout
                if tokio::time::timeout(self.timeout, self.store.reset()).await.is_err() {
                    warn!(backend = self.name(), op, "Remote tier: connection reset timed out");
                }
                None
            }
        }
    }

    fn record_failure(&self, op: &'static str, err: &CacheError) {
        match err {
            CacheError::InvalidPattern(pattern) => {
                warn!(backend = self.name(), op, pattern = %pattern, "Remote tier: invalid pattern, no keys matched");
            }
            _ => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(backend = self.name(), op, error = %err, "Remote tier unavailable");
            }
        }
    }

    // == Get ==
    /// Reads a key; any failure is a miss.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.call("get", self.store.get(key)).await.flatten()
    }

    // == Set ==
    /// Writes a key; returns false when the write was ignored.
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool {
        if ttl_seconds == 0 {
            return false;
        }
        self.call("set", self.store.set(key, value, ttl_seconds))
            .await
            .is_some()
    }

    // == Multi Get ==
    /// Reads many keys in one round-trip, zipping the positional reply back
    /// onto the input keys.
    ///
    /// Returns None when the batch as a whole failed (transport error, timeout
    /// or a reply of the wrong length); the caller then degrades key by key.
    pub async fn mget(&self, keys: &[String]) -> Option<HashMap<String, Option<String>>> {
        if keys.is_empty() {
            return Some(HashMap::new());
        }

        let values = self.call("mget", self.store.mget(keys)).await?;
        if values.len() != keys.len() {
            self.errors.fetch_add(1, Ordering::Relaxed);
            warn!(
                backend = self.name(),
                expected = keys.len(),
                received = values.len(),
                "Remote tier: malformed MGET reply"
            );
            return None;
        }

        Some(keys.iter().cloned().zip(values).collect())
    }

    // == Multi Set ==
    /// Pipelined write. Returns the number of keys written.
    ///
    /// When the pipeline fails but the store still answers `PING`, each entry
    /// is retried on its own so one bad entry does not sink the batch.
    pub async fn mset(&self, entries: &[(String, String, u64)]) -> usize {
        if entries.is_empty() {
            return 0;
        }

        if self.call("mset", self.store.mset(entries)).await.is_some() {
            return entries.len();
        }

        if !self.ping().await {
            return 0;
        }

        debug!(
            backend = self.name(),
            entries = entries.len(),
            "Remote tier: pipeline failed, retrying per key"
        );
        let mut written = 0;
        for (key, value, ttl) in entries {
            if self.set(key, value, *ttl).await {
                written += 1;
            }
        }
        written
    }

    // == Delete ==
    pub async fn delete(&self, key: &str) -> usize {
        self.call("delete", self.store.delete(key)).await.unwrap_or(0)
    }

    // == Scan Delete ==
    /// Deletes every key matching `glob`. An empty or malformed glob matches
    /// nothing.
    pub async fn scan_delete(&self, glob: &str) -> usize {
        if glob.is_empty() {
            self.record_failure("scan_delete", &CacheError::InvalidPattern(String::new()));
            return 0;
        }
        self.call("scan_delete", self.store.scan_delete(glob))
            .await
            .unwrap_or(0)
    }

    // == Flush ==
    pub async fn flush(&self) -> bool {
        self.call("flush", self.store.flush()).await.is_some()
    }

    // == Ping ==
    pub async fn ping(&self) -> bool {
        self.call("ping", self.store.ping()).await.is_some()
    }
}

impl fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBackend")
            .field("store", &self.store.name())
            .field("timeout", &self.timeout)
            .field("errors", &self.errors())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn backend() -> (CacheBackend, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new(Arc::new(ManualClock::new())));
        (
            CacheBackend::new(store.clone(), Duration::from_millis(200)),
            store,
        )
    }

    /// Store that never answers.
    #[derive(Default)]
    struct HangingStore {
        resets: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl RemoteStore for HangingStore {
        fn name(&self) -> &'static str {
            "hanging"
        }
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            std::future::pending().await
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: u64) -> Result<()> {
            std::future::pending().await
        }
        async fn mget(&self, _keys: &[String]) -> Result<Vec<Option<String>>> {
            Ok(vec![Some("only-one".to_string())])
        }
        async fn mset(&self, _entries: &[(String, String, u64)]) -> Result<()> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> Result<usize> {
            std::future::pending().await
        }
        async fn scan_delete(&self, _glob: &str) -> Result<usize> {
            std::future::pending().await
        }
        async fn flush(&self) -> Result<()> {
            std::future::pending().await
        }
        async fn ping(&self) -> Result<()> {
            std::future::pending().await
        }
        async fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let (backend, _) = backend();

        assert!(backend.set("user_1", "\"a\"", 60).await);
        assert_eq!(backend.get("user_1").await.as_deref(), Some("\"a\""));
        assert_eq!(backend.errors(), 0);
    }

    #[tokio::test]
    async fn test_offline_store_fails_closed() {
        let (backend, store) = backend();
        store.set_offline(true);

        assert_eq!(backend.get("user_1").await, None);
        assert!(!backend.set("user_1", "v", 60).await);
        assert_eq!(backend.delete("user_1").await, 0);
        assert!(!backend.ping().await);
        assert_eq!(backend.errors(), 4);
    }

    #[tokio::test]
    async fn test_timeout_is_a_miss() {
        let backend = CacheBackend::new(Arc::new(HangingStore::default()), Duration::from_millis(20));

        assert_eq!(backend.get("user_1").await, None);
        assert!(!backend.ping().await);
        assert_eq!(backend.mset(&[("k".into(), "v".into(), 60)]).await, 0);
        assert_eq!(backend.errors(), 4);
    }

    #[tokio::test]
    async fn test_timeout_resets_store_connection() {
        let store = Arc::new(HangingStore::default());
        let backend = CacheBackend::new(store.clone(), Duration::from_millis(20));

        assert!(!backend.ping().await);
        assert_eq!(backend.get("user_1").await, None);
        assert_eq!(store.resets.load(Ordering::SeqCst), 2);

        // Errors that are answered in time keep the connection
        let keys = vec!["a".to_string(), "b".to_string()];
        backend.mget(&keys).await;
        assert_eq!(store.resets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_mget_reply_fails_batch() {
        let backend = CacheBackend::new(Arc::new(HangingStore::default()), Duration::from_millis(20));
        let keys = vec!["a".to_string(), "b".to_string()];

        assert_eq!(backend.mget(&keys).await, None);
        assert_eq!(backend.errors(), 1);
    }

    #[tokio::test]
    async fn test_mget_maps_values_to_their_keys() {
        let (backend, _) = backend();
        backend.set("b", "2", 60).await;
        backend.set("a", "1", 60).await;

        let keys = vec!["a".to_string(), "missing".to_string(), "b".to_string()];
        let values = backend.mget(&keys).await.unwrap();

        assert_eq!(values.len(), 3);
        assert_eq!(values["a"].as_deref(), Some("1"));
        assert_eq!(values["b"].as_deref(), Some("2"));
        assert_eq!(values["missing"], None);
    }

    #[tokio::test]
    async fn test_mset_falls_back_per_key_when_pipeline_fails() {
        let (backend, store) = backend();
        store.set_batch_failure(true);

        let written = backend
            .mset(&[("a".into(), "1".into(), 60), ("b".into(), "2".into(), 60)])
            .await;

        assert_eq!(written, 2);
        assert_eq!(backend.get("b").await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_scan_delete_invalid_pattern_matches_nothing() {
        let (backend, _) = backend();
        backend.set("user_1", "v", 60).await;

        assert_eq!(backend.scan_delete("user_[").await, 0);
        assert_eq!(backend.scan_delete("").await, 0);
        assert!(backend.get("user_1").await.is_some());
        assert_eq!(backend.errors(), 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_ignored() {
        let (backend, store) = backend();

        assert!(!backend.set("user_1", "v", 0).await);
        assert_eq!(store.len(), 0);
    }
}
