//! Validate config command implementation

use crate::adapters::postgresql::client::redact_connection_string;
use crate::config::{load_config, ExporterConfig};
use crate::config::schema::StorageBackend;
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    ///
    /// Loading already validates; a failure here is reported with the reason.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Data Directory: {}", config.application.data_dir);
        println!("  CRM: {}", config.crm.base_url);
        println!("  Page Size: {}", config.crm.page_size);
        println!(
            "  Rate Limit: {} req/s",
            config.crm.max_requests_per_second
        );
        println!("  Max Retries: {}", config.export.max_retries);
        println!("  Dry Run: {}", config.export.dry_run);

        println!("  Storage: {}", storage_summary(&config));
        if let Some(pg_config) = &config.postgresql {
            println!("  Max Connections: {}", pg_config.max_connections);
        }

        println!(
            "  API: http://{}:{}/api",
            config.server.host, config.server.port
        );
        if config.schedule.enabled {
            println!(
                "  Schedule: every {}s ({})",
                config.schedule.interval_seconds, config.schedule.mode
            );
        } else {
            println!("  Schedule: disabled");
        }
        println!(
            "  Cloud Sheets: {}",
            if config.sheets.enabled { "enabled" } else { "disabled" }
        );
        println!("  Export Directory: {}", config.files.export_dir);
        println!();

        Ok(0)
    }
}

/// Storage backend and target, with credentials redacted
fn storage_summary(config: &ExporterConfig) -> String {
    match (config.storage.backend, &config.postgresql) {
        (StorageBackend::PostgreSQL, Some(pg_config)) => format!(
            "postgresql ({})",
            redact_connection_string(pg_config.connection_string.expose_secret())
        ),
        (StorageBackend::PostgreSQL, None) => "postgresql".to_string(),
        (StorageBackend::File, _) => format!("file ({})", config.application.data_dir),
    }
}
