//! Process-local persistent tier.
//!
//! Behaves like a durable table for the lifetime of the process. Outages can
//! be simulated with [`VolatileStore::set_available`], which makes every
//! operation fail with `StoreUnavailable`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::PersistentStore;
use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

#[derive(Debug)]
pub struct VolatileStore {
    rows: Mutex<HashMap<String, CacheEntry>>,
    available: AtomicBool,
}

impl Default for VolatileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VolatileStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggles the simulated outage.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns the stored row for `key`, bypassing the outage switch.
    pub fn row(&self, key: &str) -> Option<CacheEntry> {
        self.rows.lock().ok()?.get(key).cloned()
    }

    /// Number of stored rows, bypassing the outage switch.
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::StoreUnavailable(
                "volatile store is offline".to_string(),
            ));
        }
        self.rows
            .lock()
            .map_err(|_| CacheError::StoreUnavailable("row lock poisoned".to_string()))
    }
}

#[async_trait]
impl PersistentStore for VolatileStore {
    async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.rows()?.get(key).cloned())
    }

    async fn insert(&self, entry: &CacheEntry) -> Result<()> {
        self.rows()?.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.rows()?.remove(key).is_some())
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut rows = self.rows()?;
        let count = rows.len();
        rows.clear();
        Ok(count)
    }

    async fn delete_if_expired(&self, key: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut rows = self.rows()?;
        match rows.get(key) {
            Some(entry) if entry.is_expired_at(now) => Ok(rows.remove(key).is_some()),
            _ => Ok(false),
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut rows = self.rows()?;
        let before = rows.len();
        rows.retain(|_, entry| !entry.is_expired_at(now));
        Ok(before - rows.len())
    }
}
