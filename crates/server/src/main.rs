//! Analytics server - streaming device metrics analytics
//!
//! Accepts observations over HTTP, detects throughput anomalies on a sliding
//! window and checkpoints state to Redis when one is available.

use analytics_lib::{
    health::{components, HealthRegistry},
    AnalyticsEngine, CacheStore, EngineMetrics, MemoryStore, NullStore, RedisStore,
};
use analytics_server::{
    api,
    config::{CacheBackend, ServerConfig},
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting analytics-server");

    let config = ServerConfig::load()?;
    let engine_config = config.engine_config()?;
    info!(
        environment = %config.environment,
        cache_backend = ?config.cache_backend,
        "Server configured"
    );

    let store = select_store(&config).await;

    let health_registry = HealthRegistry::new(config.environment.clone());
    health_registry.register(components::PIPELINE).await;
    health_registry.register(components::CHECKPOINTER).await;

    let metrics = EngineMetrics::new();
    let engine = Arc::new(
        AnalyticsEngine::start_with_health(
            engine_config,
            store,
            Arc::new(metrics.clone()),
            health_registry.clone(),
        )
        .await,
    );
    health_registry.set_ready(true).await;

    let app_state = Arc::new(api::AppState::new(
        Arc::clone(&engine),
        health_registry.clone(),
        metrics,
    ));

    let served = api::serve(config.api_port, app_state, shutdown_signal()).await;
    if let Err(e) = &served {
        error!(error = %e, "API server failed");
    }

    // Drain and checkpoint even when the listener failed
    info!("Shutting down");
    health_registry.set_ready(false).await;
    engine.stop().await;

    served
}

/// Build the configured cache, falling back to memory-only when Redis is
/// unreachable
async fn select_store(config: &ServerConfig) -> Arc<dyn CacheStore> {
    match config.cache_backend {
        CacheBackend::Redis => {
            match RedisStore::connect(&config.redis_url(), REDIS_CONNECT_TIMEOUT).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(
                        error = %e,
                        host = %config.redis_host,
                        port = config.redis_port,
                        "Redis unavailable, running without cache"
                    );
                    Arc::new(NullStore)
                }
            }
        }
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
        CacheBackend::None => Arc::new(NullStore),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received terminate signal, initiating graceful shutdown"),
    }
}
