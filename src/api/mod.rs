//! API Module
//!
//! HTTP handlers and routing for the proxy and its cache administration API.
//!
//! # Endpoints
//! - `POST /clear-cache` - Empty both cache tiers
//! - `POST /api/cache/add` - Insert an entry
//! - `GET /api/cache/get/:key` - Read an entry
//! - `DELETE /api/cache/delete/:key` - Evict an entry
//! - `GET /api/cache/stats` - Cache statistics
//! - `GET /api/cache/health` - Health check
//! - anything else - proxied to the origin

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
