//! SQLite-backed persistent tier.
//!
//! rusqlite is synchronous, so every statement runs on the blocking pool
//! behind a shared connection.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::PersistentStore;
use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache (
        key        TEXT PRIMARY KEY,
        value      BLOB NOT NULL,
        ttl        INTEGER NOT NULL,
        expiration INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS cache_expiration ON cache (expiration);
";

/// Cache table stored in a SQLite database.
///
/// `ttl` is kept in milliseconds and `expiration` in Unix milliseconds.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and ensures the cache table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened SQLite cache store");
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| CacheError::StoreUnavailable("connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| CacheError::StoreUnavailable(format!("store task failed: {}", e)))?
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn row_to_entry(key: String, value: Vec<u8>, ttl: i64, expiration: i64) -> Result<CacheEntry> {
    let expiration = DateTime::<Utc>::from_timestamp_millis(expiration).ok_or_else(|| {
        CacheError::StoreUnavailable(format!("corrupt expiration for key '{}'", key))
    })?;

    Ok(CacheEntry {
        key,
        value: value.into(),
        ttl: Duration::from_millis(ttl.max(0) as u64),
        expiration,
    })
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT key, value, ttl, expiration FROM cache WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Vec<u8>>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(key, value, ttl, expiration)| row_to_entry(key, value, ttl, expiration))
                .transpose()
        })
        .await
    }

    async fn insert(&self, entry: &CacheEntry) -> Result<()> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache (key, value, ttl, expiration) VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.key,
                    entry.value.as_ref(),
                    millis(entry.ttl),
                    entry.expiration.timestamp_millis()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM cache WHERE key = ?1", params![key])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_all(&self) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM cache", [])?))
            .await
    }

    async fn delete_if_expired(&self, key: &str, now: DateTime<Utc>) -> Result<bool> {
        let key = key.to_owned();
        let now = now.timestamp_millis();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM cache WHERE key = ?1 AND expiration <= ?2",
                params![key, now],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let now = now.timestamp_millis();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM cache WHERE expiration <= ?1", params![now])?)
        })
        .await
    }
}
