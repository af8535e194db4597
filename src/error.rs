//! Error types for the cache core
//!
//! Provides unified error handling using thiserror. None of these escape the
//! public cache API: the fail-closed layers turn them into misses and no-ops.

use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache core.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Remote store refused the connection or is switched offline
    #[error("Remote tier unavailable: {0}")]
    RemoteUnavailable(String),

    /// Protocol or transport error reported by the Redis client
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Remote call exceeded the configured timeout
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// Value could not be encoded or decoded
    #[error("Serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed glob or empty pattern
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Invalidation event with no registered rule
    #[error("Unknown invalidation event: {0}")]
    UnknownEvent(String),

    /// Empty or oversized key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Encoded value exceeds the size limit
    #[error("Value too large: {0} bytes")]
    ValueTooLarge(usize),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache core.
pub type Result<T> = std::result::Result<T, CacheError>;
