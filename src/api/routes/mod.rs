//! Route handlers

mod exports;
mod snapshots;
mod system;
mod webhook;

pub use exports::{clear_running, reset_exports, restart_export, resume_export, start_exports, stop_exports};
pub use snapshots::{snapshot_file, snapshot_sheets};
pub use system::{get_logs, get_status, health_check};
pub use webhook::receive_webhook;

use crate::api::error_response::ApiError;
use crate::domain::{DateFilter, EntityKind, EntitySelector, ExporterError};

/// Parse a `{entity|all}` path segment
fn parse_selector(raw: &str) -> Result<EntitySelector, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(ExporterError::InvalidEntity(raw.to_string())))
}

/// Parse an `{entity}` path segment; `all` is rejected
fn parse_entity(raw: &str) -> Result<EntityKind, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(ExporterError::InvalidEntity(raw.to_string())))
}

/// Parse an optional `{date_from, date_to}` body
///
/// An empty body means no filter; anything else must be a valid filter.
fn parse_filter(body: &[u8]) -> Result<DateFilter, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(DateFilter::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(ExporterError::Validation(format!("invalid date filter: {e}"))))
}
