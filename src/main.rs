//! Cache Proxy - A caching reverse proxy
//!
//! Forwards requests to a single origin and keeps response bodies in a
//! two-tier (memory + SQLite) cache with TTL expiration.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_proxy::api::create_router;
use cache_proxy::store::{PersistentStore, SqliteStore};
use cache_proxy::{spawn_sweep_task, AppState, CacheEngine, Config};

/// Main entry point for the caching proxy.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the SQLite store and build the cache engine
/// 4. Start the background expiration sweep
/// 5. Create Axum router with the admin endpoints and proxy fallback
/// 6. Start HTTP server on configured port
/// 7. On SIGINT/SIGTERM, drain connections and stop the sweep
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting caching proxy");

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        "Configuration loaded: origin={}, port={}, database={}, default_ttl={}s, sweep_interval={}s, fallback={}",
        config.origin,
        config.server_port,
        config.database_path,
        config.default_ttl,
        config.sweep_interval,
        config.fallback
    );

    let store: Arc<dyn PersistentStore> = if config.database_path == ":memory:" {
        Arc::new(SqliteStore::open_in_memory().context("failed to open in-memory database")?)
    } else {
        Arc::new(
            SqliteStore::open(&config.database_path)
                .with_context(|| format!("failed to open database {}", config.database_path))?,
        )
    };

    let cache = Arc::new(CacheEngine::new(store, config.engine_settings()));
    info!("Cache engine initialized");

    let sweeper = spawn_sweep_task(cache.clone(), config.sweep_interval());

    let state = AppState::from_config(&config, cache).context("failed to build origin client")?;
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Proxy listening on http://{} -> {}", addr, config.origin);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.stop().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves once the process is asked to stop.
async fn shutdown_signal() {
    let received = wait_for_signal().await;
    info!(signal = received, "Shutdown requested, draining connections");
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::SignalKind;

    match signal::unix::signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            received = interrupt() => received,
            _ = terminate.recv() => "SIGTERM",
        },
        Err(err) => {
            warn!(error = %err, "SIGTERM listener unavailable, stopping on Ctrl+C only");
            interrupt().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    interrupt().await
}

/// Resolves on Ctrl+C; never resolves if the listener cannot be installed.
async fn interrupt() -> &'static str {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "Ctrl+C listener unavailable");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
