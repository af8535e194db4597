//! Cache Module
//!
//! The memory tier, its bookkeeping, and the facade that orchestrates it
//! together with the remote tier.

mod entry;
mod facade;
mod memory;
mod order;
mod stats;


// Re-export public types
pub use entry::CacheEntry;
pub use facade::{CacheFacade, CacheFacadeBuilder, Cleared};
pub use memory::MemoryTier;
pub use order::{EvictionOrder, EvictionPolicy};
pub use stats::{CacheStats, StatsCounters};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed serialized value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
