//! CLI command implementations
//!
//! Exit codes shared by every command: 0 success, 1 partial failure,
//! 2 configuration error, 3 conflict with a running export, 4 connection
//! error, 5 fatal error, 130 interrupted.

pub mod export;
pub mod init;
pub mod logs;
pub mod reset;
pub mod serve;
pub mod snapshot;
pub mod status;
pub mod validate;

use crate::config::{load_config, ExporterConfig};
use crate::core::export::ExportService;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::watch;

/// Load the configuration or print why it failed
pub(crate) fn load_or_report(config_path: &str) -> Result<ExporterConfig, i32> {
    load_config(config_path).map_err(|e| {
        println!("❌ Failed to load configuration file");
        println!("   Error: {e}");
        2 // Configuration error exit code
    })
}

/// Build the service or print why the stores could not be opened
pub(crate) async fn open_service(config: ExporterConfig) -> Result<Arc<ExportService>, i32> {
    match ExportService::new(config).await {
        Ok(service) => Ok(Arc::new(service)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize export service");
            println!("❌ Failed to initialize export service");
            println!("   Error: {e}");
            Err(4) // Connection error exit code
        }
    }
}

/// Render an optional date for tables
pub(crate) fn date_or_dash(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "-".to_string(), |d| d.to_string())
}

/// Resolve once the shutdown flag turns true
///
/// Never resolves if the sender is dropped without signalling.
pub(crate) async fn shutdown_requested(signal: &mut watch::Receiver<bool>) {
    loop {
        if *signal.borrow() {
            return;
        }
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
