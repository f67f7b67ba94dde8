//! CRM webhook receiver

use crate::api::error_response::ApiError;
use crate::api::AppState;
use crate::domain::ExporterError;
use crate::logging::LogSource;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

/// POST /webhook - apply a CRM change notification
pub async fn receive_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        let message = format!("invalid webhook body: {e}");
        state.service.events().error(LogSource::Webhook, message.as_str());
        ExporterError::Validation(message)
    })?;

    let summary = state.service.ingest_webhook(&payload).await?;
    Ok(Json(json!({
        "status": "success",
        "upserted": summary.upserted,
        "deleted": summary.deleted,
        "missing": summary.missing,
    })))
}
