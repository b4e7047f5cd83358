//! API Handlers
//!
//! HTTP handlers for the cache administration endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{error, info};

use crate::cache::CacheEngine;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{AddRequest, HealthResponse, MessageResponse, StatsResponse, ValueResponse};
use crate::proxy::Forwarder;

/// Application state shared across all handlers.
///
/// Holds the shared cache engine and the origin client.
#[derive(Clone)]
pub struct AppState {
    /// Two-tier cache
    pub cache: Arc<CacheEngine>,
    /// Client bound to the origin
    pub forwarder: Forwarder,
    /// TTL applied to proxied responses
    pub default_ttl: Duration,
}

impl AppState {
    pub fn new(cache: Arc<CacheEngine>, forwarder: Forwarder, default_ttl: Duration) -> Self {
        Self {
            cache,
            forwarder,
            default_ttl,
        }
    }

    /// Creates the state from configuration around an existing engine.
    pub fn from_config(config: &Config, cache: Arc<CacheEngine>) -> Result<Self> {
        let forwarder = Forwarder::new(config.origin.clone(), config.upstream_timeout())?;
        Ok(Self::new(cache, forwarder, config.default_ttl()))
    }
}

/// Handler for POST /clear-cache
///
/// Empties both cache tiers.
pub async fn clear_cache_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.cache.clear_all().await {
        Ok(removed) => {
            info!(removed, "Full cache reset");
            (StatusCode::OK, "Cache cleared successfully")
        }
        Err(err) => {
            error!(error = %err, "Full cache reset failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to clear cache table in the database",
            )
        }
    }
}

/// Handler for POST /api/cache/add
///
/// Inserts an entry by hand. Existing live keys are rejected.
pub async fn add_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AddRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let Json(req) = payload.map_err(|e| CacheError::MalformedInput(e.body_text()))?;

    if let Some(error_msg) = req.validate() {
        return Err(CacheError::MalformedInput(error_msg));
    }

    state
        .cache
        .set(&req.key, req.value.into_bytes(), Duration::from_secs(req.ttl))
        .await?;

    Ok(Json(MessageResponse::new("Cache created successfully", req.key)))
}

/// Handler for GET /api/cache/get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ValueResponse>> {
    validate_key(&key)?;

    match state.cache.get(&key).await? {
        Some(value) => {
            let expiration = state.cache.peek(&key).await.map(|entry| entry.expiration);
            Ok(Json(ValueResponse::new(key, &value, expiration)))
        }
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /api/cache/delete/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>> {
    validate_key(&key)?;

    state.cache.clear(&key).await?;

    Ok(Json(MessageResponse::new("Cache deleted successfully", key)))
}

/// Handler for the key routes called without a key.
pub async fn missing_key_handler() -> Result<Json<MessageResponse>> {
    Err(CacheError::MalformedInput("Invalid key".to_string()))
}

/// Handler for GET /api/cache/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats().await))
}

/// Handler for GET /api/cache/health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(CacheError::MalformedInput("Invalid key".to_string()));
    }
    Ok(())
}
