//! API Routes
//!
//! Configures the Axum router: admin endpoints first, the proxy as fallback.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{
    add_handler, clear_cache_handler, delete_handler, get_handler, health_handler,
    missing_key_handler, stats_handler, AppState,
};
use crate::proxy::proxy_handler;

/// Creates the main router.
///
/// Keys in the admin routes are a single path segment; cache keys derived
/// from request targets are addressed percent-encoded
/// (`/api/cache/get/%2Fitems%3Fpage%3D2`).
///
/// # Middleware
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/clear-cache", post(clear_cache_handler))
        .route("/api/cache/add", post(add_handler))
        .route("/api/cache/get/", get(missing_key_handler))
        .route("/api/cache/get/:key", get(get_handler))
        .route("/api/cache/delete/", delete(missing_key_handler))
        .route("/api/cache/delete/:key", delete(delete_handler))
        .route("/api/cache/stats", get(stats_handler))
        .route("/api/cache/health", get(health_handler))
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
