//! Error types for the caching proxy
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engine, the forwarding path and the admin API.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No live entry exists for the key
    #[error("Key not found: {0}")]
    NotFound(String),

    /// A live entry already exists for the key
    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    /// The persistent tier could not be reached, failed, or timed out
    #[error("Persistent store unavailable: {0}")]
    StoreUnavailable(String),

    /// The origin could not be reached or the response could not be read
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Missing or invalid request data
    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

impl CacheError {
    /// HTTP status code the error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::AlreadyExists(_) => StatusCode::CONFLICT,
            CacheError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            CacheError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::StoreUnavailable(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse::new(self.to_string()));

        (self.status_code(), body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching proxy.
pub type Result<T> = std::result::Result<T, CacheError>;
