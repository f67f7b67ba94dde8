//! Logging and observability
//!
//! Two streams are kept apart:
//! - [`structured`]: `tracing` diagnostics (console plus an optional rolling JSON file)
//! - [`events`]: the operator event log behind the status and logs endpoints
//!
//! # Example
//!
//! ```no_run
//! use crm_exporter::logging::init_logging;
//! use crm_exporter::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod events;
pub mod structured;

// Re-export commonly used items
pub use events::{LogAggregator, LogEntry, LogLevel, LogQuery, LogSource};
pub use structured::{init_logging, LoggingGuard};

/// Log a stored page
///
/// # Example
///
/// ```no_run
/// use crm_exporter::log_page_stored;
/// use crm_exporter::domain::EntityKind;
///
/// log_page_stored!(EntityKind::Contacts, 4, 2);
/// ```
#[macro_export]
macro_rules! log_page_stored {
    ($entity:expr, $page:expr, $count:expr) => {
        tracing::debug!(
            entity = %$entity,
            page = $page,
            records = $count,
            "Page stored"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use crm_exporter::log_error_with_context;
/// use crm_exporter::domain::ExporterError;
///
/// let error = ExporterError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use crm_exporter::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying operation"
        );
    };
}
