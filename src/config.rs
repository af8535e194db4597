//! Configuration Module
//!
//! Loads cache configuration from environment variables, plus an optional
//! JSON policy file holding the TTL and invalidation tables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::EvictionPolicy;
use crate::error::{CacheError, Result};
use crate::policy::{InvalidationRules, TtlPolicy, TtlRule};

/// Cache configuration parameters.
///
/// All scalar values can be configured via environment variables with sensible
/// defaults. Everything is fixed once the facade is built.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL
    pub redis_url: String,
    /// Connect + command timeout for the remote tier, in milliseconds
    pub remote_timeout_ms: u64,
    /// Maximum number of entries in the memory tier
    pub memory_max_size: usize,
    /// Upper bound on memory-tier TTLs, in seconds
    pub memory_cap_ttl: u64,
    /// Memory-tier eviction order
    pub eviction_policy: EvictionPolicy,
    /// Memory sweep interval in seconds
    pub sweep_interval: u64,
    /// Health probe interval in seconds
    pub health_interval: u64,
    /// Maximum rows a single warm loader may write
    pub warm_batch_limit: usize,
    /// Optional JSON file overriding the policy tables
    pub policy_file: Option<PathBuf>,
    /// TTL table
    pub ttl_policy: TtlPolicy,
    /// Invalidation table
    pub invalidation: InvalidationRules,
}

/// Shape of `CACHE_POLICY_FILE`. Absent sections keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PolicyFile {
    default_ttl: Option<u64>,
    ttl_rules: Option<Vec<TtlRule>>,
    invalidation: Option<InvalidationRules>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_URL` - Remote tier URL (default: redis://127.0.0.1:6379)
    /// - `REDIS_TIMEOUT_MS` - Remote timeout (default: 1500)
    /// - `MEMORY_MAX_SIZE` - Memory tier capacity (default: 1000)
    /// - `MEMORY_CAP_TTL` - Memory tier TTL cap in seconds (default: 300)
    /// - `DEFAULT_TTL` - TTL for unmatched keys in seconds (default: 300)
    /// - `EVICTION_POLICY` - `fifo` or `lru` (default: fifo)
    /// - `SWEEP_INTERVAL` - Memory sweep frequency in seconds (default: 60)
    /// - `HEALTH_INTERVAL` - Health probe frequency in seconds (default: 30)
    /// - `WARM_BATCH_LIMIT` - Rows per warm loader (default: 500)
    /// - `CACHE_POLICY_FILE` - JSON policy file, read by [`Config::load`]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let default_ttl = parse_env("DEFAULT_TTL").unwrap_or(defaults.ttl_policy.default_ttl());

        Self {
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            remote_timeout_ms: parse_env("REDIS_TIMEOUT_MS").unwrap_or(defaults.remote_timeout_ms),
            memory_max_size: parse_env("MEMORY_MAX_SIZE").unwrap_or(defaults.memory_max_size),
            memory_cap_ttl: parse_env("MEMORY_CAP_TTL").unwrap_or(defaults.memory_cap_ttl),
            eviction_policy: parse_env("EVICTION_POLICY").unwrap_or(defaults.eviction_policy),
            sweep_interval: parse_env("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            health_interval: parse_env("HEALTH_INTERVAL").unwrap_or(defaults.health_interval),
            warm_batch_limit: parse_env("WARM_BATCH_LIMIT").unwrap_or(defaults.warm_batch_limit),
            policy_file: env::var("CACHE_POLICY_FILE").ok().map(PathBuf::from),
            ttl_policy: defaults.ttl_policy.with_default_ttl(default_ttl),
            invalidation: defaults.invalidation,
        }
    }

    /// Loads the environment and, if configured, the policy file.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_env();
        if let Some(path) = config.policy_file.clone() {
            config.apply_policy_file(&path)?;
        }
        Ok(config)
    }

    /// Replaces the policy tables with the ones declared in a JSON file.
    pub fn apply_policy_file(&mut self, path: &Path) -> Result<()> {
        let raw = fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        self.apply_policy_json(&raw)
            .map_err(|e| CacheError::Config(format!("{}: {}", path.display(), e)))
    }

    fn apply_policy_json(&mut self, raw: &str) -> Result<()> {
        let file: PolicyFile = serde_json::from_str(raw)?;

        let default_ttl = file.default_ttl.unwrap_or(self.ttl_policy.default_ttl());
        let rules = file
            .ttl_rules
            .unwrap_or_else(|| self.ttl_policy.rules().to_vec());
        if let Some(rule) = rules.iter().find(|rule| rule.pattern.is_empty()) {
            return Err(CacheError::Config(format!(
                "TTL rule '{}' has an empty pattern",
                rule.name
            )));
        }
        self.ttl_policy = TtlPolicy::new(rules, default_ttl);

        if let Some(invalidation) = file.invalidation {
            self.invalidation = invalidation;
        }
        Ok(())
    }

    /// Remote timeout as a Duration.
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            remote_timeout_ms: 1500,
            memory_max_size: 1000,
            memory_cap_ttl: 300,
            eviction_policy: EvictionPolicy::Fifo,
            sweep_interval: 60,
            health_interval: 30,
            warm_batch_limit: 500,
            policy_file: None,
            ttl_policy: TtlPolicy::default(),
            invalidation: InvalidationRules::bug_tracker_defaults(),
        }
    }
}
