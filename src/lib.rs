//! bugcache - Two-tier cache for the bug tracker
//!
//! Read-through/write-through caching over a shared Redis tier with a
//! process-local memory fallback, pattern-based TTLs, event-driven
//! invalidation, warming and health reporting.

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod invalidation;
pub mod pattern;
pub mod policy;
pub mod tasks;
pub mod warmer;

pub use backend::{CacheBackend, InMemoryStore, RedisStore, RemoteStore};
pub use cache::{CacheFacade, CacheStats, Cleared, EvictionPolicy, MemoryTier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{CacheError, Result};
pub use health::{HealthMonitor, HealthSnapshot};
pub use invalidation::InvalidationRouter;
pub use pattern::KeyPattern;
pub use policy::{InvalidationRules, TtlPolicy, TtlRule};
pub use tasks::{spawn_health_task, spawn_sweep_task};
pub use warmer::{EntityLoader, WarmRow, Warmer};
