//! HTTP error responses
//!
//! Control-command failures are returned as `{"error": {"code", "message"}}`
//! with a status code derived from the error kind.

use crate::domain::{ExporterError, StorageError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// Handler error wrapping a domain error
#[derive(Debug)]
pub struct ApiError(pub ExporterError);

impl From<ExporterError> for ApiError {
    fn from(err: ExporterError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            ExporterError::AlreadyRunning(_) => StatusCode::CONFLICT,
            ExporterError::InvalidEntity(_) | ExporterError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ExporterError::SinkUnavailable(_) | ExporterError::Storage(StorageError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ExporterError::Crm(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match &self.0 {
            ExporterError::AlreadyRunning(_) => "already_running",
            ExporterError::InvalidEntity(_) => "invalid_entity",
            ExporterError::Validation(_) => "validation_error",
            ExporterError::SinkUnavailable(_) => "sink_unavailable",
            ExporterError::Storage(_) => "storage_error",
            ExporterError::Crm(_) => "crm_error",
            ExporterError::Configuration(_) => "configuration_error",
            _ => "internal_error",
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorBody {
                code: self.error_code(),
                message: self.0.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Control command failed");
        }
        (status, Json(self.envelope())).into_response()
    }
}
