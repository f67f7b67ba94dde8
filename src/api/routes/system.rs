//! Health, status and log handlers

use crate::api::error_response::ApiError;
use crate::api::AppState;
use crate::logging::LogQuery;
use axum::extract::{Query, State};
use axum::Json;
use serde_json::{json, Value};

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

/// GET /status - per-entity status snapshot
pub async fn get_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let status = state.service.registry().status().await?;
    Ok(Json(json!({ "entities": status })))
}

/// GET /logs?entity=&level=&limit=
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Json<Value> {
    let entries = state.service.events().query(&query);
    Json(json!({ "count": entries.len(), "entries": entries }))
}
