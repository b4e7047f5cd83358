//! Cache Proxy - A caching reverse proxy
//!
//! Forwards requests to a single origin and keeps response bodies in a
//! two-tier (memory + SQLite) cache with TTL expiration.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use cache::CacheEngine;
pub use config::Config;
pub use tasks::spawn_sweep_task;
