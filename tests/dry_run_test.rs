//! Integration tests for dry-run mode
//!
//! These tests verify that dry runs fetch and checkpoint every page while
//! no record reaches the store.

mod common;

use common::{page_of, ScriptedFetcher, Step};
use crm_exporter::adapters::crm::PageFetcher;
use crm_exporter::adapters::database::create_stores;
use crm_exporter::config::ExporterConfig;
use crm_exporter::core::export::{ExportService, RunOutcome, StartMode};
use crm_exporter::domain::{DateFilter, EntityKind};
use std::sync::Arc;
use tempfile::TempDir;

fn config(data_dir: &TempDir, dry_run: bool) -> ExporterConfig {
    let toml = format!(
        r#"
[application]
data_dir = '{}'

[crm]
base_url = "https://example.amocrm.ru/api/v4"
access_token = "token"

[export]
dry_run = {dry_run}

[logging]
local_enabled = false
event_journal = false
"#,
        data_dir.path().display()
    );
    toml::from_str(&toml).unwrap()
}

#[test]
fn test_export_config_dry_run_default() {
    let data_dir = TempDir::new().unwrap();
    let toml = format!(
        "[application]\ndata_dir = '{}'\n[crm]\nbase_url = \"https://x.example/api/v4\"\n",
        data_dir.path().display()
    );
    let config: ExporterConfig = toml::from_str(&toml).unwrap();
    assert!(!config.export.dry_run);
}

#[tokio::test]
async fn test_dry_run_store_reports_backend() {
    let data_dir = TempDir::new().unwrap();

    let (records, _) = create_stores(&config(&data_dir, true)).await.unwrap();
    assert!(records.backend_name().contains("dry-run"));

    let (records, _) = create_stores(&config(&data_dir, false)).await.unwrap();
    assert!(!records.backend_name().contains("dry-run"));
}

#[tokio::test]
async fn test_dry_run_checkpoints_without_storing() {
    let data_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher
        .push(EntityKind::Deals, Step::Page(page_of(1, 4, true)))
        .push(EntityKind::Deals, Step::Page(page_of(5, 4, false)));

    let service = ExportService::with_fetcher(
        config(&data_dir, true),
        fetcher.clone() as Arc<dyn PageFetcher>,
    )
    .await
    .unwrap();
    let registry = service.registry();

    registry
        .start(EntityKind::Deals, StartMode::Fresh, DateFilter::default())
        .await
        .unwrap();
    let summary = registry.wait(EntityKind::Deals).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.records_stored, 8);
    assert_eq!(fetcher.calls(EntityKind::Deals), vec![1, 2]);

    let checkpoint = registry
        .context()
        .checkpoints
        .load(EntityKind::Deals)
        .await
        .unwrap();
    assert_eq!(checkpoint.last_page, 2);
    assert!(checkpoint.completed);

    let stored = registry
        .context()
        .dispatcher
        .count(EntityKind::Deals)
        .await
        .unwrap();
    assert_eq!(stored, 0);
}
