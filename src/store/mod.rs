//! Persistent Tier Module
//!
//! The durable half of the cache. The engine only needs point lookup, point
//! insert, point delete and delete-all from a backend. The two expiration
//! deletes are conditional on the row's own expiration, so they never need
//! the engine's lock to stay clear of a concurrent insert.
//!
//! # Backends
//! - [`SqliteStore`] - SQLite table, used by the server
//! - [`VolatileStore`] - process-local table with an outage switch

mod sqlite;
mod volatile;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cache::CacheEntry;
use crate::error::Result;

pub use sqlite::SqliteStore;
pub use volatile::VolatileStore;

/// Durable key-value table keyed by cache key.
///
/// Implementations provide their own internal synchronization.
#[async_trait]
pub trait PersistentStore: Send + Sync + 'static {
    /// Looks up the row for `key` by exact match, expired or not.
    async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Writes `entry`, replacing any existing row for its key.
    async fn insert(&self, entry: &CacheEntry) -> Result<()>;

    /// Deletes the row for `key`, returning whether one existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Deletes every row, returning how many were removed.
    async fn delete_all(&self) -> Result<usize>;

    /// Deletes the row for `key` only if it is expired at `now`.
    ///
    /// A row rewritten with a later expiration in the meantime is kept.
    async fn delete_if_expired(&self, key: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Deletes every row expired at `now`, returning how many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}
