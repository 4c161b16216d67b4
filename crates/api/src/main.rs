//! Teamup notification server binary entrypoint.
//!
//! Runs both halves of an instance: the HTTP/SSE server that holds push
//! connections, and the dispatcher workers consuming this instance's durable
//! queue.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use teamup_common::config::AppConfig;
use teamup_common::db::create_pool;
use teamup_common::redis_pool::create_redis_pool;
use teamup_notify::dispatcher::Dispatcher;
use teamup_notify::registry::ConnectionRegistry;

use teamup_api::routes::create_router;
use teamup_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("teamup_api=debug,teamup_notify=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Teamup notification server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database pool created");

    // Create Redis connection
    let redis = create_redis_pool(&config.redis_url).await?;
    tracing::info!("Redis connection established");

    // Per-instance connection registry, shared between the SSE handlers and
    // the dispatcher workers
    let registry = Arc::new(ConnectionRegistry::new());

    // Consume this instance's durable queue
    for worker in 0..config.dispatcher_workers {
        let dispatcher = Dispatcher::new(
            config.instance_id.clone(),
            worker,
            pool.clone(),
            redis.clone(),
            registry.clone(),
            config.dispatcher_block_ms,
        );
        tokio::spawn(async move {
            if let Err(e) = dispatcher.run().await {
                tracing::error!(worker, error = %e, "Dispatcher worker exited");
            }
        });
    }

    // Build application state and router
    let state = AppState::new(pool, redis, config.clone(), registry.clone());
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!(instance_id = %config.instance_id, "API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight routing messages are redelivered from the pending list on
    // the next start; open push connections are torn down here.
    let closed = registry.shutdown();
    tracing::info!(closed, "Registry drained, shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
