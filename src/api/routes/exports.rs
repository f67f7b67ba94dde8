//! Export lifecycle handlers

use super::{parse_entity, parse_filter, parse_selector};
use crate::api::error_response::ApiError;
use crate::api::AppState;
use crate::core::export::StartMode;
use crate::domain::EntitySelector;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Map, Value};

/// POST /exports/:target/start - fresh run for one entity or all
///
/// A single entity answers 409 when already running. For `all`, each
/// entity's outcome is reported separately.
pub async fn start_exports(
    State(state): State<AppState>,
    Path(target): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let filter = parse_filter(&body)?;
    let registry = state.service.registry();

    match parse_selector(&target)? {
        EntitySelector::One(entity) => {
            let outcome = registry.start(entity, StartMode::Fresh, filter).await?;
            Ok(Json(json!({ "entity": entity, "outcome": outcome })))
        }
        EntitySelector::All => {
            let mut results = Map::new();
            for (entity, result) in registry.start_all(StartMode::Fresh, filter).await {
                let value = match result {
                    Ok(outcome) => json!({ "outcome": outcome }),
                    Err(e) => serde_json::to_value(ApiError(e).envelope()).unwrap_or(Value::Null),
                };
                results.insert(entity.to_string(), value);
            }
            Ok(Json(json!({ "entities": results })))
        }
    }
}

/// POST /exports/:target/stop
pub async fn stop_exports(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let selector = parse_selector(&target)?;
    let stopped = state.service.registry().stop(selector).await;
    Ok(Json(json!({ "stopped": stopped })))
}

/// POST /exports/:entity/restart
pub async fn restart_export(
    State(state): State<AppState>,
    Path(target): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let entity = parse_entity(&target)?;
    let outcome = state
        .service
        .registry()
        .restart(entity, parse_filter(&body)?)
        .await?;
    Ok(Json(json!({ "entity": entity, "outcome": outcome })))
}

/// POST /exports/:entity/resume
pub async fn resume_export(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let entity = parse_entity(&target)?;
    let outcome = state.service.registry().resume(entity).await?;
    Ok(Json(json!({ "entity": entity, "outcome": outcome })))
}

/// POST /exports/clear-running
pub async fn clear_running(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.service.registry().clear_running().await;
    Json(json!({ "cleared": cleared }))
}

/// POST /exports/:target/reset
pub async fn reset_exports(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let selector = parse_selector(&target)?;
    let checkpoints = state.service.registry().reset(selector).await?;
    Ok(Json(json!({ "reset": checkpoints })))
}
