//! Cache Entry Module
//!
//! Defines the unit of caching shared by the memory and persistent tiers.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{CacheError, Result};

// == Cache Entry ==
/// A cached payload with its absolute expiration.
///
/// The expiration is computed once at creation and never mutated; replacing
/// an entry means deleting it and creating a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Cache key (the request target for proxied responses)
    pub key: String,
    /// The stored payload
    pub value: Bytes,
    /// Time-to-live the entry was created with
    pub ttl: Duration,
    /// Absolute expiration instant
    pub expiration: DateTime<Utc>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry expiring `ttl` from now.
    ///
    /// # Errors
    /// `MalformedInput` when the TTL cannot be represented as a timestamp offset.
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>, ttl: Duration) -> Result<Self> {
        Self::created_at(key, value, ttl, Utc::now())
    }

    /// Creates a new entry as if it had been created at `now`.
    ///
    /// TTL and expiration are truncated to whole milliseconds, the precision
    /// the persistent tier keeps, so both tiers hold identical entries.
    pub fn created_at(
        key: impl Into<String>,
        value: impl Into<Bytes>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let out_of_range = || CacheError::MalformedInput(format!("ttl {:?} is out of range", ttl));

        let ttl = u64::try_from(ttl.as_millis())
            .map(Duration::from_millis)
            .map_err(|_| out_of_range())?;
        let expiration = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|offset| now.checked_add_signed(offset))
            .and_then(|expiration| DateTime::from_timestamp_millis(expiration.timestamp_millis()))
            .ok_or_else(out_of_range)?;

        Ok(Self {
            key: key.into(),
            value: value.into(),
            ttl,
            expiration,
        })
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: the entry is expired once `now >= expiration`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    /// Checks if the entry has expired against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        (self.expiration - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
