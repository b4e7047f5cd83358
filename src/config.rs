//! Configuration Module
//!
//! Handles loading and managing proxy configuration from environment variables.

use std::env;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::cache::{EngineSettings, FallbackPolicy};

/// Configuration errors that prevent startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ORIGIN must be set, e.g. ORIGIN=http://example.com")]
    MissingOrigin,

    #[error("invalid origin URL '{url}': {reason}")]
    InvalidOrigin { url: String, reason: String },
}

/// Proxy configuration parameters.
///
/// Everything except the origin has a default.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Origin every request is forwarded to
    pub origin: Url,
    /// SQLite database path, `:memory:` for a private in-memory database
    pub database_path: String,
    /// TTL in seconds applied to proxied responses
    pub default_ttl: u64,
    /// Interval in seconds between expiration sweeps
    pub sweep_interval: u64,
    /// Upper bound in milliseconds on each persistent-store operation
    pub store_timeout_ms: u64,
    /// Upper bound in seconds on each origin request
    pub upstream_timeout: u64,
    /// What proxied responses do when the persistent store is down
    pub fallback: FallbackPolicy,
}

impl Config {
    /// Creates a Config for `origin` with every other value at its default.
    pub fn new(origin: Url) -> Self {
        Self {
            server_port: 8080,
            origin,
            database_path: "cache_proxy.db".to_string(),
            default_ttl: 300,
            sweep_interval: 300,
            store_timeout_ms: 2000,
            upstream_timeout: 30,
            fallback: FallbackPolicy::MemoryOnly,
        }
    }

    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `ORIGIN` - Origin URL, required (`http://` is assumed without a scheme)
    /// - `SERVER_PORT` - HTTP server port (default: 8080)
    /// - `DATABASE_PATH` - SQLite database path (default: cache_proxy.db)
    /// - `DEFAULT_TTL` - TTL for proxied responses in seconds (default: 300)
    /// - `SWEEP_INTERVAL` - Expiration sweep frequency in seconds (default: 300)
    /// - `STORE_TIMEOUT_MS` - Persistent-store operation timeout (default: 2000)
    /// - `UPSTREAM_TIMEOUT` - Origin request timeout in seconds (default: 30)
    /// - `CACHE_FALLBACK` - `memory` or `strict` (default: memory)
    ///
    /// Unparsable or zero values fall back to the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let origin = lookup("ORIGIN")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingOrigin)?;
        let defaults = Self::new(parse_origin(&origin)?);

        let positive = |name: &str, default: u64| {
            lookup(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        Ok(Self {
            server_port: lookup("SERVER_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.server_port),
            database_path: lookup("DATABASE_PATH")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| defaults.database_path.clone()),
            default_ttl: positive("DEFAULT_TTL", defaults.default_ttl),
            sweep_interval: positive("SWEEP_INTERVAL", defaults.sweep_interval),
            store_timeout_ms: positive("STORE_TIMEOUT_MS", defaults.store_timeout_ms),
            upstream_timeout: positive("UPSTREAM_TIMEOUT", defaults.upstream_timeout),
            fallback: lookup("CACHE_FALLBACK")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fallback),
            origin: defaults.origin,
        })
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }

    /// Engine settings derived from this configuration.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            fallback: self.fallback,
        }
    }
}

/// Parses an origin address, assuming `http://` when no scheme is given.
pub fn parse_origin(raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let invalid = |reason: String| ConfigError::InvalidOrigin {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
