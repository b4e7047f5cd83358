//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, promotions and
//! persistent-tier failures.

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of lookups answered from either tier
    pub hits: u64,
    /// Number of lookups that found no live entry
    pub misses: u64,
    /// Number of entries copied from the persistent tier into memory
    pub promotions: u64,
    /// Number of memory entries removed because they expired
    pub expired: u64,
    /// Number of failed or timed-out persistent-tier operations
    pub store_errors: u64,
    /// Number of entries kept in memory only because the persistent tier was down
    pub degraded_writes: u64,
    /// Current number of entries in memory
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_promotion(&mut self) {
        self.promotions += 1;
    }

    pub fn record_expired(&mut self, count: usize) {
        self.expired += count as u64;
    }

    pub fn record_store_error(&mut self) {
        self.store_errors += 1;
    }

    pub fn record_degraded_write(&mut self) {
        self.degraded_writes += 1;
    }

    // == Update Entry Count ==
    /// Updates the total entries count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
