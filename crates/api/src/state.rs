//! Shared application state for the Axum API server.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use teamup_common::config::AppConfig;
use teamup_notify::publisher::EventPublisher;
use teamup_notify::registry::ConnectionRegistry;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: ConnectionManager,
    pub config: AppConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub publisher: EventPublisher,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        config: AppConfig,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let publisher = EventPublisher::new(redis.clone(), config.instance_peers.clone());
        Self {
            pool,
            redis,
            config,
            registry,
            publisher,
        }
    }
}
