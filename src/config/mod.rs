//! Configuration management.
//!
//! The exporter reads one TOML file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `CRM_EXPORTER_<SECTION>_<KEY>` overrides
//! - Default values for optional settings
//! - Validation of every section on load
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//! data_dir = "./data"
//!
//! [crm]
//! base_url = "https://example.amocrm.ru/api/v4"
//! access_token = "${CRM_ACCESS_TOKEN}"
//! page_size = 50
//!
//! [export]
//! max_retries = 3
//!
//! [server]
//! port = 8000
//! ```
//!
//! # Validation
//!
//! ```rust,no_run
//! use crm_exporter::config::load_config;
//!
//! match load_config("crm-exporter.toml") {
//!     Ok(config) => println!("Loaded config for {}", config.crm.base_url),
//!     Err(e) => eprintln!("Configuration error: {}", e),
//! }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, CrmConfig, ExportConfig, ExporterConfig, FilesConfig, LoggingConfig,
    PostgreSQLConfig, RetryConfig, ScheduleConfig, ServerConfig, SheetsConfig, StorageBackend,
    StorageConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
