//! Integration tests for configuration loading and validation
//!
//! Tests that touch environment variables hold `ENV_MUTEX`; every test
//! loads through it because overrides apply to any load.

use crm_exporter::config::schema::StorageBackend;
use crm_exporter::config::load_config;
use crm_exporter::core::export::StartMode;
use secrecy::ExposeSecret;
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn cleanup_env_vars() {
    std::env::remove_var("CRM_EXPORTER_APPLICATION_LOG_LEVEL");
    std::env::remove_var("CRM_EXPORTER_CRM_PAGE_SIZE");
    std::env::remove_var("CRM_EXPORTER_EXPORT_DRY_RUN");
    std::env::remove_var("CRM_EXPORTER_STORAGE_BACKEND");
    std::env::remove_var("TEST_CRM_TOKEN");
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(contents.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_complete_config() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config(
        r#"
[application]
log_level = "debug"
data_dir = "/var/lib/crm-exporter"

[crm]
base_url = "https://acme.amocrm.ru/api/v4"
access_token = "token-123"
page_size = 250
timeout_seconds = 10
max_requests_per_second = 7
with_relations = false

[export]
max_retries = 5
shutdown_timeout_secs = 10
dry_run = true

[export.retry]
initial_delay_ms = 100
max_delay_ms = 1000
backoff_multiplier = 3.0
jitter = false

[storage]
backend = "postgresql"

[postgresql]
connection_string = "postgresql://exporter:pw@db:5432/crm"
max_connections = 4

[logging]
local_enabled = false
event_capacity = 200
event_retention_days = 3

[server]
host = "0.0.0.0"
port = 9000
cors_origins = ["https://dash.example.com"]

[schedule]
enabled = true
interval_seconds = 900
mode = "fresh"

[sheets]
enabled = true
access_token = "sheets-token"
rows_per_batch = 100

[files]
export_dir = "/srv/exports"
"#,
    );

    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.crm.page_size, 250);
    assert_eq!(config.crm.max_requests_per_second, 7);
    assert!(!config.crm.with_relations);
    assert_eq!(config.crm.access_token.unwrap().expose_secret(), "token-123");
    assert_eq!(config.export.max_retries, 5);
    assert_eq!(config.export.retry.initial_delay_ms, 100);
    assert!(!config.export.retry.jitter);
    assert!(config.export.dry_run);
    assert_eq!(config.storage.backend, StorageBackend::PostgreSQL);
    assert_eq!(config.postgresql.unwrap().max_connections, 4);
    assert_eq!(config.logging.event_capacity, 200);
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.cors_origins, vec!["https://dash.example.com"]);
    assert!(config.schedule.enabled);
    assert_eq!(config.schedule.mode, StartMode::Fresh);
    assert!(config.sheets.enabled);
    assert_eq!(config.sheets.rows_per_batch, 100);
    assert_eq!(config.files.export_dir, "/srv/exports");
}

#[test]
fn test_load_minimal_config_with_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config(
        r#"
[crm]
base_url = "https://acme.amocrm.ru/api/v4"
"#,
    );

    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "info");
    assert_eq!(config.application.data_dir, "./data");
    assert!(config.crm.access_token.is_none());
    assert_eq!(config.crm.page_size, 50);
    assert_eq!(config.export.max_retries, 3);
    assert_eq!(config.export.shutdown_timeout_secs, 30);
    assert!(!config.export.dry_run);
    assert_eq!(config.storage.backend, StorageBackend::File);
    assert!(config.postgresql.is_none());
    assert_eq!(config.server.host, "127.0.0.1");
    assert!(!config.schedule.enabled);
    assert_eq!(config.schedule.mode, StartMode::Resume);
    assert!(!config.sheets.enabled);
    assert_eq!(config.files.export_dir, "./exports");
}

#[test]
fn test_env_var_substitution() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("TEST_CRM_TOKEN", "secret_token");

    let temp_file = write_config(
        r#"
[crm]
base_url = "https://acme.amocrm.ru/api/v4"
access_token = "${TEST_CRM_TOKEN}"
"#,
    );

    let config = load_config(temp_file.path()).expect("Failed to load config");
    assert_eq!(
        config.crm.access_token.unwrap().expose_secret(),
        "secret_token"
    );

    std::env::remove_var("TEST_CRM_TOKEN");
}

#[test]
fn test_env_var_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("CRM_EXPORTER_APPLICATION_LOG_LEVEL", "trace");
    std::env::set_var("CRM_EXPORTER_CRM_PAGE_SIZE", "200");
    std::env::set_var("CRM_EXPORTER_EXPORT_DRY_RUN", "true");

    let temp_file = write_config(
        r#"
[application]
log_level = "info"

[crm]
base_url = "https://acme.amocrm.ru/api/v4"
page_size = 50
"#,
    );

    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "trace");
    assert_eq!(config.crm.page_size, 200);
    assert!(config.export.dry_run);

    cleanup_env_vars();
}

#[test]
fn test_postgresql_backend_requires_section() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("CRM_EXPORTER_STORAGE_BACKEND", "postgresql");

    let temp_file = write_config(
        r#"
[crm]
base_url = "https://acme.amocrm.ru/api/v4"
"#,
    );

    let result = load_config(temp_file.path());
    cleanup_env_vars();

    let message = result.unwrap_err().to_string();
    assert!(message.contains("postgresql"));
}

#[test]
fn test_invalid_config_validation() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config(
        r#"
[application]
log_level = "invalid_level"

[crm]
base_url = "https://acme.amocrm.ru/api/v4"
"#,
    );
    assert!(load_config(temp_file.path()).is_err());

    let temp_file = write_config(
        r#"
[crm]
base_url = "ftp://acme.amocrm.ru"
"#,
    );
    let message = load_config(temp_file.path()).unwrap_err().to_string();
    assert!(message.contains("crm.base_url"));

    let temp_file = write_config(
        r#"
[crm]
base_url = "https://acme.amocrm.ru/api/v4"

[sheets]
enabled = true
"#,
    );
    let message = load_config(temp_file.path()).unwrap_err().to_string();
    assert!(message.contains("sheets.access_token"));
}
