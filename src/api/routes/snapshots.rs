//! Snapshot export handlers

use super::parse_filter;
use crate::api::error_response::ApiError;
use crate::api::AppState;
use crate::domain::ExporterError;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// POST /snapshots/file - ZIP of CSV sheets as a download
pub async fn snapshot_file(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let range = parse_filter(&body)?;
    let archive = state.service.export_to_file(range).await?;

    let bytes = tokio::fs::read(&archive.path)
        .await
        .map_err(|e| ExporterError::SinkUnavailable(format!("cannot read archive: {e}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", archive.file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// POST /snapshots/sheets - cloud spreadsheet, returns its URL
pub async fn snapshot_sheets(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let range = parse_filter(&body)?;
    let link = state.service.export_to_cloud_sheet(range).await?;
    Ok(Json(json!({ "url": link.url, "spreadsheet_id": link.spreadsheet_id })).into_response())
}
