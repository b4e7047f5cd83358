//! Memory Tier Module
//!
//! The in-memory half of the cache. Every method here assumes the caller
//! already holds the engine's lock; none of them lock anything themselves.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::cache::{CacheEntry, CacheStats};

// == Memory Tier ==
/// Key-value map of cached entries plus the counters that describe it.
#[derive(Debug, Default)]
pub struct MemoryTier {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Performance statistics
    stats: CacheStats,
    /// Bumped by every explicit removal
    generation: u64,
}

impl MemoryTier {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Live Lookup ==
    /// Returns a copy of the entry for `key` if it is still live at `now`.
    ///
    /// An expired entry found along the way is removed.
    pub fn live(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        match self.entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.clone()),
            Some(_) => {}
        }

        self.entries.remove(key);
        self.stats.record_expired(1);
        None
    }

    /// Returns the stored entry without checking expiration or touching stats.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Insert ==
    /// Inserts `entry` unless a live entry already holds its key.
    ///
    /// Returns `false` when the key was taken.
    pub fn insert_if_vacant(&mut self, entry: CacheEntry, now: DateTime<Utc>) -> bool {
        if self.live(&entry.key, now).is_some() {
            return false;
        }
        self.entries.insert(entry.key.clone(), entry);
        true
    }

    // == Remove ==
    /// Removes the entry for `key`. Always counts as a removal, present or not.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.generation += 1;
        self.entries.remove(key)
    }

    /// Removes the entry for `entry.key` only if it is exactly `entry`.
    ///
    /// Used to roll back an insert without touching a newer entry for the same key.
    pub fn remove_if_same(&mut self, entry: &CacheEntry) -> bool {
        if self.entries.get(&entry.key) == Some(entry) {
            self.remove(&entry.key);
            true
        } else {
            false
        }
    }

    // == Purge Expired ==
    /// Removes all entries expired at `now`, returning how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - self.entries.len();

        self.stats.record_expired(removed);
        removed
    }

    // == Clear ==
    /// Drops every entry, returning how many were held.
    pub fn clear(&mut self) -> usize {
        self.generation += 1;
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Removal generation.
    ///
    /// A row read from the persistent tier while the lock was released may
    /// only be promoted if this is unchanged since before the read; otherwise
    /// a clear may have deleted it in between.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // == Stats ==
    pub fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    /// Returns current statistics with an up-to-date entry count.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
