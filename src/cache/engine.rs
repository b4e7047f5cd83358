//! Cache Engine Module
//!
//! Two-tier cache combining the memory tier with a persistent store.
//!
//! Memory is a cache of the persistent tier: writes go to both, reads fall
//! back to the store and promote what they find. All access to the memory
//! map goes through a single lock. Public operations acquire it; the
//! [`MemoryTier`] helpers they call never do, so no operation re-enters the
//! lock it already holds. The lock is never held across a store call.
//!
//! A row read from the store is only promoted if no removal ran in memory
//! since before the read (see [`MemoryTier::generation`]). Clears delete from
//! the store before memory, so a row they delete can never reappear in memory.
//!
//! There is no transaction spanning both tiers. A crash between the memory
//! write and the store write loses the entry, which is repopulated on a later
//! miss.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStats, MemoryTier};
use crate::error::{CacheError, Result};
use crate::store::PersistentStore;

/// Default bound on a single persistent-tier operation.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

// == Fallback Policy ==
/// What population does when the persistent tier cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Keep the entry in memory only and report it as degraded
    #[default]
    MemoryOnly,
    /// Fail and roll back, exactly like `set`
    Strict,
}

impl FromStr for FallbackPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "memory-only" | "memory_only" => Ok(FallbackPolicy::MemoryOnly),
            "strict" => Ok(FallbackPolicy::Strict),
            other => Err(CacheError::MalformedInput(format!(
                "unknown fallback policy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackPolicy::MemoryOnly => f.write_str("memory"),
            FallbackPolicy::Strict => f.write_str("strict"),
        }
    }
}

// == Engine Settings ==
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound on each persistent-tier operation
    pub store_timeout: Duration,
    /// Behavior of [`CacheEngine::populate`] during a store outage
    pub fallback: FallbackPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            fallback: FallbackPolicy::default(),
        }
    }
}

/// Where a populated entry ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Population {
    /// Written to both tiers
    Stored,
    /// Kept in memory only because the persistent tier was unavailable
    MemoryOnly,
}

/// Entries removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired entries dropped from memory
    pub memory: usize,
    /// Expired rows deleted from the persistent tier
    pub persistent: usize,
}

// == Cache Engine ==
pub struct CacheEngine {
    memory: Mutex<MemoryTier>,
    store: Arc<dyn PersistentStore>,
    settings: EngineSettings,
}

impl fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CacheEngine {
    // == Constructor ==
    /// Creates an engine with an empty memory tier over `store`.
    pub fn new(store: Arc<dyn PersistentStore>, settings: EngineSettings) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::new()),
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // == Get ==
    /// Returns the live value for `key`, consulting memory first and then the
    /// persistent tier.
    ///
    /// A live persisted row is promoted into memory. An expired one is deleted
    /// and reported as a miss. A row read while a clear was in progress is
    /// reported as a miss and not promoted.
    ///
    /// # Errors
    /// `StoreUnavailable` when memory misses and the store cannot be queried.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let generation = {
            let mut memory = self.memory.lock().await;
            if let Some(entry) = memory.live(key, Utc::now()) {
                memory.stats_mut().record_hit();
                return Ok(Some(entry.value));
            }
            memory.generation()
        };

        let row = self.guarded("fetch", self.store.fetch(key)).await?;

        let expired_at = {
            let mut memory = self.memory.lock().await;
            let now = Utc::now();

            // a concurrent set or promotion may have landed while the store was queried
            if let Some(entry) = memory.live(key, now) {
                memory.stats_mut().record_hit();
                return Ok(Some(entry.value));
            }

            match row {
                Some(row) if !row.is_expired_at(now) => {
                    if memory.generation() != generation {
                        memory.stats_mut().record_miss();
                        debug!(key = %key, "Row read across a clear, not promoting");
                        return Ok(None);
                    }
                    let value = row.value.clone();
                    memory.insert_if_vacant(row, now);
                    memory.stats_mut().record_promotion();
                    memory.stats_mut().record_hit();
                    debug!(key = %key, "Promoted entry from persistent tier");
                    return Ok(Some(value));
                }
                Some(_) => {
                    memory.stats_mut().record_miss();
                    now
                }
                None => {
                    memory.stats_mut().record_miss();
                    return Ok(None);
                }
            }
        };

        // conditional on expiration: a row rewritten by a concurrent set survives
        let evicted = self
            .guarded("delete_if_expired", self.store.delete_if_expired(key, expired_at))
            .await;
        if let Err(err) = evicted {
            warn!(key = %key, error = %err, "Failed to evict expired row");
        }
        Ok(None)
    }

    // == Set ==
    /// Inserts a new entry into both tiers.
    ///
    /// Insert-once: a live entry in either tier is never overwritten and its
    /// TTL is never refreshed. Callers wanting replacement must `clear` first.
    /// If the persistent write fails, the memory entry is rolled back.
    ///
    /// # Errors
    /// - `AlreadyExists` if the key is live in either tier
    /// - `MalformedInput` for an empty key or a zero/out-of-range TTL
    /// - `StoreUnavailable` if the persistent tier fails
    pub async fn set(&self, key: &str, value: impl Into<Bytes>, ttl: Duration) -> Result<()> {
        self.insert(key, value.into(), ttl, FallbackPolicy::Strict)
            .await
            .map(|_| ())
    }

    // == Populate ==
    /// Inserts an entry on behalf of the forwarding path.
    ///
    /// Same as [`set`](Self::set), except that under
    /// [`FallbackPolicy::MemoryOnly`] a persistent-tier outage keeps the
    /// entry in memory and returns [`Population::MemoryOnly`].
    pub async fn populate(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        ttl: Duration,
    ) -> Result<Population> {
        self.insert(key, value.into(), ttl, self.settings.fallback)
            .await
    }

    async fn insert(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        policy: FallbackPolicy,
    ) -> Result<Population> {
        if key.is_empty() {
            return Err(CacheError::MalformedInput("key cannot be empty".to_string()));
        }
        if ttl.is_zero() {
            return Err(CacheError::MalformedInput(
                "ttl must be greater than zero".to_string(),
            ));
        }

        let generation = {
            let mut memory = self.memory.lock().await;
            if memory.live(key, Utc::now()).is_some() {
                return Err(CacheError::AlreadyExists(key.to_string()));
            }
            memory.generation()
        };

        let durable = match self.guarded("fetch", self.store.fetch(key)).await {
            Ok(Some(row)) if !row.is_expired_at(Utc::now()) => {
                let mut memory = self.memory.lock().await;
                // a row read across a clear may already be gone from the store
                let unchanged = memory.generation() == generation;
                if unchanged && memory.insert_if_vacant(row, Utc::now()) {
                    memory.stats_mut().record_promotion();
                }
                return Err(CacheError::AlreadyExists(key.to_string()));
            }
            Ok(_) => true,
            Err(err) if policy == FallbackPolicy::MemoryOnly => {
                warn!(key = %key, error = %err, "Persistent tier unavailable, caching in memory only");
                false
            }
            Err(err) => return Err(err),
        };

        let entry = CacheEntry::new(key, value, ttl)?;

        {
            let mut memory = self.memory.lock().await;
            if !memory.insert_if_vacant(entry.clone(), Utc::now()) {
                return Err(CacheError::AlreadyExists(key.to_string()));
            }
            if !durable {
                memory.stats_mut().record_degraded_write();
                return Ok(Population::MemoryOnly);
            }
        }

        match self.guarded("insert", self.store.insert(&entry)).await {
            Ok(()) => {
                debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cached entry");
                Ok(Population::Stored)
            }
            Err(err) if policy == FallbackPolicy::MemoryOnly => {
                warn!(key = %key, error = %err, "Persistent write failed, keeping entry in memory only");
                self.memory.lock().await.stats_mut().record_degraded_write();
                Ok(Population::MemoryOnly)
            }
            Err(err) => {
                self.memory.lock().await.remove_if_same(&entry);
                Err(err)
            }
        }
    }

    // == Clear ==
    /// Removes the live entry for `key` from both tiers.
    ///
    /// The persistent row is deleted first; if that fails neither tier changes.
    ///
    /// # Errors
    /// - `NotFound` if no live entry exists in either tier
    /// - `StoreUnavailable` if the persistent tier fails
    pub async fn clear(&self, key: &str) -> Result<()> {
        let in_memory = self.memory.lock().await.live(key, Utc::now()).is_some();

        if !in_memory {
            match self.guarded("fetch", self.store.fetch(key)).await? {
                Some(row) if !row.is_expired_at(Utc::now()) => {}
                _ => return Err(CacheError::NotFound(key.to_string())),
            }
        }

        self.guarded("delete", self.store.delete(key)).await?;
        self.memory.lock().await.remove(key);

        debug!(key = %key, "Cleared entry");
        Ok(())
    }

    // == Clear All ==
    /// Deletes every persistent row, then empties memory.
    ///
    /// Memory is emptied even when the store fails; the error is still returned.
    /// Returns the number of memory entries dropped.
    pub async fn clear_all(&self) -> Result<usize> {
        let persisted = self.guarded("delete_all", self.store.delete_all()).await;
        let removed = self.memory.lock().await.clear();

        let persisted = persisted?;
        info!(memory = removed, persistent = persisted, "Cache cleared");
        Ok(removed)
    }

    // == Clear Expired ==
    /// Removes every expired entry from both tiers.
    ///
    /// Persistent rows are selected by expiration rather than by the keys
    /// found in memory, so rows never promoted since a restart are reclaimed
    /// too, and a row written by a concurrent `set` is never touched.
    pub async fn clear_expired(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let memory = self.memory.lock().await.purge_expired(now);
        let persistent = self
            .guarded("delete_expired", self.store.delete_expired(now))
            .await?;

        Ok(SweepReport { memory, persistent })
    }

    // == Introspection ==
    /// Returns the memory copy of `key` without checking expiration or counting a lookup.
    pub async fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.memory.lock().await.peek(key).cloned()
    }

    /// Returns current statistics.
    pub async fn stats(&self) -> CacheStats {
        self.memory.lock().await.stats()
    }

    /// Number of entries currently held in memory.
    pub async fn len(&self) -> usize {
        self.memory.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memory.lock().await.is_empty()
    }

    // == Store Guards ==
    /// Runs a persistent-tier operation under the store timeout, counting failures.
    async fn guarded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let result = self.bounded(op, fut).await;
        if result.is_err() {
            self.memory.lock().await.stats_mut().record_store_error();
        }
        result
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.settings.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::StoreUnavailable(format!(
                "{} timed out after {:?}",
                op, self.settings.store_timeout
            ))),
        }
    }
}
