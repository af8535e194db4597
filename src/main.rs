//! bugcache maintenance process
//!
//! Hosts the cache for a long-lived worker: connects the remote tier, keeps
//! the memory tier swept, and reports health until shut down.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bugcache::{spawn_health_task, spawn_sweep_task, CacheFacade, Config};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from the environment and the optional policy file
/// 3. Build the cache facade over Redis
/// 4. Run an initial health check
/// 5. Start the memory sweep and health probe tasks
/// 6. Wait for SIGINT/SIGTERM, then log final stats
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bugcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting bugcache");

    let config = Config::load().context("failed to load cache configuration")?;
    info!(
        "Configuration loaded: redis={}, memory_max_size={}, memory_cap_ttl={}s, eviction={}, ttl_rules={}, events={}",
        config.redis_url,
        config.memory_max_size,
        config.memory_cap_ttl,
        config.eviction_policy,
        config.ttl_policy.rules().len(),
        config.invalidation.len()
    );

    let sweep_interval = config.sweep_interval;
    let health_interval = config.health_interval;
    let cache = Arc::new(
        CacheFacade::connect(config).context("failed to create the Redis client")?,
    );

    let health = cache.health_check().await;
    if health.remote_reachable {
        info!("Remote tier reachable");
    } else {
        warn!("Remote tier unreachable, running on the memory tier only");
    }

    let sweep_handle = spawn_sweep_task(cache.memory().clone(), sweep_interval);
    let (health_handle, _health_rx) = spawn_health_task(cache.health_monitor(), health_interval);
    info!("Background tasks started");

    shutdown_signal(vec![sweep_handle, health_handle]).await;

    let stats = cache.stats();
    info!(
        total_requests = stats.total_requests,
        hit_rate = stats.hit_rate(),
        remote_errors = stats.remote_errors,
        "bugcache shutdown complete"
    );
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the background
/// tasks.
async fn shutdown_signal(handles: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for handle in handles {
        handle.abort();
    }
    warn!("Background tasks aborted");
}
