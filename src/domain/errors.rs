//! Domain error types
//!
//! This module defines the error hierarchy for the exporter.
//! All errors are domain-specific and don't expose third-party types.

use crate::domain::entity::EntityKind;
use thiserror::Error;

/// Main exporter error type
///
/// This is the primary error type used throughout the application.
/// It wraps the fetcher and storage error types and carries the control-command conflicts.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// CRM API errors raised by the page fetcher
    #[error("CRM error: {0}")]
    Crm(#[from] CrmError),

    /// Record store or checkpoint store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A run is already active for the entity
    #[error("Export for {0} is already running")]
    AlreadyRunning(EntityKind),

    /// Record store or export sink is down
    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    /// Unknown entity name in a control command
    #[error("Unknown entity: {0}")]
    InvalidEntity(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// State management errors
    #[error("State management error: {0}")]
    State(String),

    /// Export process errors
    #[error("Export error: {0}")]
    Export(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// CRM API errors
///
/// Errors that occur while fetching a page from the CRM.
/// These errors don't expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum CrmError {
    /// Failed to connect to the CRM
    #[error("Failed to connect to CRM: {0}")]
    ConnectionFailed(String),

    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Token rejected (401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Client error (4xx other than auth and rate limiting)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Response body could not be understood
    #[error("Invalid response from CRM: {0}")]
    InvalidResponse(String),
}

impl CrmError {
    /// Whether the failure is a `TransientError` (retried) or a `FatalError` (run terminates)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CrmError::ConnectionFailed(_)
                | CrmError::Timeout(_)
                | CrmError::RateLimited(_)
                | CrmError::ServerError { .. }
        )
    }
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be reached
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A query or write was rejected
    #[error("Query failed: {0}")]
    Query(String),

    /// Stored data could not be encoded or decoded
    #[error("Stored data is corrupt: {0}")]
    Serialization(String),

    /// Lookup found nothing
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Classifies errors as retryable (transient) or not
pub trait IsRetryable {
    /// Returns true if the operation that produced this error should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for CrmError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl IsRetryable for ExporterError {
    fn is_retryable(&self) -> bool {
        match self {
            ExporterError::Crm(e) => e.is_transient(),
            // Sink outages only fail the current page
            ExporterError::SinkUnavailable(_) | ExporterError::Storage(_) => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for ExporterError {
    fn from(err: std::io::Error) -> Self {
        ExporterError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ExporterError {
    fn from(err: serde_json::Error) -> Self {
        ExporterError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ExporterError {
    fn from(err: toml::de::Error) -> Self {
        ExporterError::Configuration(format!("TOML parsing error: {err}"))
    }
}
