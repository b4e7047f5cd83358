//! Cache Module
//!
//! Two-tier caching: a locked in-memory map in front of a persistent store,
//! with TTL expiration enforced on read and by a periodic sweep.

mod engine;
mod entry;
mod memory;
mod stats;


// Re-export public types
pub use engine::{
    CacheEngine, EngineSettings, FallbackPolicy, Population, SweepReport, DEFAULT_STORE_TIMEOUT,
};
pub use entry::CacheEntry;
pub use memory::MemoryTier;
pub use stats::CacheStats;
