//! Request DTOs for the cache administration API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for POST /api/cache/add
///
/// Absent fields deserialize to their empty value so that `validate`
/// reports them instead of the JSON extractor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AddRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: String,
    /// TTL in seconds
    pub ttl: u64,
}

impl AddRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() || self.value.is_empty() || self.ttl == 0 {
            return Some("Key and value and ttl are required".to_string());
        }
        None
    }
}
