//! Sync API handlers
//!
//! POST /sync, POST /sync/cancel, GET /sync/session, GET /connection

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    models::{SyncResult, SyncSession},
    services::ConnectionInfo,
    AppState,
};

/// POST /sync request
#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub force_refresh: bool,
}

/// POST /sync/cancel response
#[derive(Debug, Serialize)]
pub struct CancelSyncResponse {
    /// Whether a running sync was signalled
    pub cancelled: bool,
}

/// POST /sync
///
/// Runs a sync to completion and returns its result. 409 Conflict while
/// another sync is running. The run continues if the client disconnects.
pub async fn start_sync(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Json<SyncResult>> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let force_refresh = request.force_refresh;

    let result = tokio::spawn(async move { orchestrator.sync(force_refresh).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Sync task failed: {}", e)))??;

    {
        let mut last_error = state.last_error.write().await;
        if result.success {
            *last_error = None;
        } else if let Some(issue) = result.errors.last() {
            *last_error = Some(issue.to_string());
        }
    }

    tracing::info!(
        session_id = %result.session.session_id,
        success = result.success,
        from_cache = result.from_cache,
        records = result.records.len(),
        "Sync request completed"
    );

    Ok(Json(result))
}

/// POST /sync/cancel
pub async fn cancel_sync(State(state): State<AppState>) -> Json<CancelSyncResponse> {
    Json(CancelSyncResponse {
        cancelled: state.orchestrator.cancel_current_sync(),
    })
}

/// GET /sync/session
///
/// Session of the most recent finished sync.
pub async fn last_session(State(state): State<AppState>) -> ApiResult<Json<SyncSession>> {
    state
        .orchestrator
        .last_session()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No sync has run yet".to_string()))
}

/// GET /connection
pub async fn test_connection(State(state): State<AppState>) -> ApiResult<Json<ConnectionInfo>> {
    Ok(Json(state.orchestrator.test_connection().await?))
}

/// Build sync routes
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync", post(start_sync))
        .route("/sync/cancel", post(cancel_sync))
        .route("/sync/session", get(last_session))
        .route("/connection", get(test_connection))
}
