//! shelf-sync library interface
//!
//! Mirrors a remote record collection into a local cache: paged fetching,
//! master-record enrichment, normalization and TTL caching, served over
//! HTTP + SSE by the `shelf-sync` binary.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use shelf_common::events::EventBus;
use shelf_common::time::Clock;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::SyncConfig;
use crate::services::{
    CacheStore, CatalogTransport, LocalCache, RateLimitedClient, SyncOrchestrator,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last sync failure, cleared by the next successful sync
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            event_bus: orchestrator.event_bus().clone(),
            orchestrator,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Wire the sync pipeline from resolved configuration
pub fn build_orchestrator(
    config: &SyncConfig,
    transport: Arc<dyn CatalogTransport>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
) -> SyncOrchestrator {
    let client = Arc::new(RateLimitedClient::new(
        transport,
        &config.rate_limit,
        config.retry.clone(),
    ));
    let cache = Arc::new(LocalCache::new(store, Arc::clone(&clock), config.cache_ttl));

    SyncOrchestrator::new(client, cache, clock, event_bus, config.sync_options())
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::sync_routes())
        .route("/sync/events", get(api::sync_event_stream))
        .merge(api::collection_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
