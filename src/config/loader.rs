//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{ExporterConfig, StorageBackend};
use super::secret::secret_string;
use crate::domain::errors::ExporterError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "CRM_EXPORTER";

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ExporterConfig
/// 4. Applies environment variable overrides (CRM_EXPORTER_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, a referenced
/// environment variable is missing, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use crm_exporter::config::loader::load_config;
///
/// let config = load_config("crm-exporter.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ExporterConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ExporterError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ExporterError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration from TOML text, applying substitution, overrides and validation
pub fn parse_config(contents: &str) -> Result<ExporterConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: ExporterConfig = toml::from_str(&contents)
        .map_err(|e| ExporterError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ExporterError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched. All missing variables are reported together.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ExporterError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    String::new()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(ExporterError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_override(section: &str, key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}_{section}_{key}")).ok()
}

fn parse_override<T: std::str::FromStr>(section: &str, key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        ExporterError::Configuration(format!(
            "Invalid value '{value}' for {ENV_PREFIX}_{section}_{key}"
        ))
    })
}

/// Applies environment variable overrides using the CRM_EXPORTER_* prefix
///
/// Environment variables follow the pattern: CRM_EXPORTER_<SECTION>_<KEY>
/// For example: CRM_EXPORTER_CRM_BASE_URL, CRM_EXPORTER_EXPORT_MAX_RETRIES
fn apply_env_overrides(config: &mut ExporterConfig) -> Result<()> {
    // Application overrides
    if let Some(val) = env_override("APPLICATION", "LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_override("APPLICATION", "DATA_DIR") {
        config.application.data_dir = val;
    }

    // CRM overrides
    if let Some(val) = env_override("CRM", "BASE_URL") {
        config.crm.base_url = val;
    }
    if let Some(val) = env_override("CRM", "ACCESS_TOKEN") {
        config.crm.access_token = Some(secret_string(val));
    }
    if let Some(val) = env_override("CRM", "PAGE_SIZE") {
        config.crm.page_size = parse_override("CRM", "PAGE_SIZE", &val)?;
    }
    if let Some(val) = env_override("CRM", "MAX_REQUESTS_PER_SECOND") {
        config.crm.max_requests_per_second =
            parse_override("CRM", "MAX_REQUESTS_PER_SECOND", &val)?;
    }
    if let Some(val) = env_override("CRM", "TLS_VERIFY") {
        config.crm.tls_verify = val.parse().unwrap_or(true);
    }

    // Export overrides
    if let Some(val) = env_override("EXPORT", "MAX_RETRIES") {
        config.export.max_retries = parse_override("EXPORT", "MAX_RETRIES", &val)?;
    }
    if let Some(val) = env_override("EXPORT", "RETRY_DELAY_MS") {
        config.export.retry.initial_delay_ms = parse_override("EXPORT", "RETRY_DELAY_MS", &val)?;
    }
    if let Some(val) = env_override("EXPORT", "DRY_RUN") {
        config.export.dry_run = val.parse().unwrap_or(false);
    }

    // Storage overrides
    if let Some(val) = env_override("STORAGE", "BACKEND") {
        config.storage.backend = match val.to_lowercase().as_str() {
            "file" => StorageBackend::File,
            "postgresql" => StorageBackend::PostgreSQL,
            other => {
                return Err(ExporterError::Configuration(format!(
                    "Invalid storage backend '{other}'. Must be one of: file, postgresql"
                )))
            }
        };
    }

    // PostgreSQL overrides (only if PostgreSQL is configured)
    if let Some(ref mut pg_config) = config.postgresql {
        if let Some(val) = env_override("POSTGRESQL", "CONNECTION_STRING") {
            pg_config.connection_string = secret_string(val);
        }
        if let Some(val) = env_override("POSTGRESQL", "MAX_CONNECTIONS") {
            pg_config.max_connections = parse_override("POSTGRESQL", "MAX_CONNECTIONS", &val)?;
        }
    }

    // Server overrides
    if let Some(val) = env_override("SERVER", "HOST") {
        config.server.host = val;
    }
    if let Some(val) = env_override("SERVER", "PORT") {
        config.server.port = parse_override("SERVER", "PORT", &val)?;
    }

    // Sheets overrides
    if let Some(val) = env_override("SHEETS", "ACCESS_TOKEN") {
        config.sheets.access_token = Some(secret_string(val));
    }

    Ok(())
}
