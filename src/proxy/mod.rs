//! Proxy Module
//!
//! The cache-checked forwarding path: derive a key from the request,
//! answer hits from the cache, forward misses to the origin and populate
//! the cache from full `200 OK` responses.

mod forward;
mod handler;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Uri};

pub use forward::{Forwarder, UpstreamResponse};
pub use handler::proxy_handler;

/// Response header carrying the cache outcome.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Cache outcome reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }

    /// Sets the cache status header on `headers`.
    pub fn apply(self, headers: &mut HeaderMap) {
        headers.insert(
            HeaderName::from_static(CACHE_STATUS_HEADER),
            HeaderValue::from_static(self.as_str()),
        );
    }
}

/// Derives the cache key for a request: its target path plus query string.
pub fn derive_key(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|target| target.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned())
}
