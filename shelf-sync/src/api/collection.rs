//! Cached collection API handlers
//!
//! Cache status/clear, export/import and single-record edits.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};

use crate::{
    error::ApiResult,
    models::NormalizedRecord,
    services::{CacheMetadata, CacheStatus, CollectionExport, ImportSummary},
    AppState,
};

/// GET /cache/status
pub async fn cache_status(State(state): State<AppState>) -> ApiResult<Json<CacheStatus>> {
    Ok(Json(state.orchestrator.cache_status().await?))
}

/// DELETE /cache
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.orchestrator.clear_cache().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /collection/export
pub async fn export_collection(
    State(state): State<AppState>,
) -> ApiResult<Json<CollectionExport>> {
    Ok(Json(state.orchestrator.export_collection().await?))
}

/// POST /collection/import
pub async fn import_collection(
    State(state): State<AppState>,
    Json(export): Json<CollectionExport>,
) -> ApiResult<Json<ImportSummary>> {
    Ok(Json(state.orchestrator.import_collection(export).await?))
}

/// POST /records
pub async fn add_record(
    State(state): State<AppState>,
    Json(record): Json<NormalizedRecord>,
) -> ApiResult<(StatusCode, Json<CacheMetadata>)> {
    let metadata = state.orchestrator.add_record(record).await?;
    Ok((StatusCode::CREATED, Json(metadata)))
}

/// PUT /records/:id
pub async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(record): Json<NormalizedRecord>,
) -> ApiResult<Json<CacheMetadata>> {
    Ok(Json(state.orchestrator.update_record(&id, record).await?))
}

/// DELETE /records/:id
pub async fn remove_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CacheMetadata>> {
    Ok(Json(state.orchestrator.remove_record(&id).await?))
}

/// Build collection routes
pub fn collection_routes() -> Router<AppState> {
    Router::new()
        .route("/cache/status", get(cache_status))
        .route("/cache", axum::routing::delete(clear_cache))
        .route("/collection/export", get(export_collection))
        .route("/collection/import", post(import_collection))
        .route("/records", post(add_record))
        .route("/records/:id", put(update_record).delete(remove_record))
}
