//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the cache is live.
//!
//! # Tasks
//! - Memory sweep: removes expired memory-tier entries at configured intervals
//! - Health probe: re-checks both tiers and logs transitions

mod health;
mod sweep;

pub use health::spawn_health_task;
pub use sweep::spawn_sweep_task;
