//! Integration tests for graceful shutdown and crash recovery
//!
//! These tests verify that:
//! - shutdown pauses every worker and persists the pause
//! - a run killed without pausing is recovered as paused on the next start
//! - recovered exports resume after the last stored page
//! - the event journal survives a restart

mod common;

use common::{eventually, page_of, ScriptedFetcher, Step};
use crm_exporter::adapters::crm::PageFetcher;
use crm_exporter::config::ExporterConfig;
use crm_exporter::core::export::{ExportService, RunOutcome, StartMode, StartOutcome};
use crm_exporter::core::state::RunPhase;
use crm_exporter::domain::{DateFilter, EntityKind};
use crm_exporter::logging::{LogLevel, LogQuery};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DEALS: EntityKind = EntityKind::Deals;

fn config(data_dir: &TempDir) -> ExporterConfig {
    let toml = format!(
        r#"
[application]
data_dir = '{}'

[crm]
base_url = "https://example.amocrm.ru/api/v4"
access_token = "token"

[logging]
local_enabled = false
"#,
        data_dir.path().display()
    );
    toml::from_str(&toml).unwrap()
}

async fn service(data_dir: &TempDir, fetcher: Arc<ScriptedFetcher>) -> ExportService {
    ExportService::with_fetcher(config(data_dir), fetcher as Arc<dyn PageFetcher>)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_shutdown_pauses_and_persists() {
    let data_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::endless(Duration::from_millis(5)));
    let first = service(&data_dir, fetcher.clone()).await;

    first
        .registry()
        .start_all(StartMode::Fresh, DateFilter::default())
        .await;
    eventually(|| fetcher.calls(DEALS).len() >= 2).await;

    assert!(first.registry().shutdown(Duration::from_secs(10)).await);
    for entity in EntityKind::ALL {
        assert!(!first.registry().is_running(entity));
    }

    // A new process sees paused checkpoints and nothing to recover
    let second = service(&data_dir, Arc::new(ScriptedFetcher::new())).await;
    assert!(second.recover().await.unwrap().is_empty());

    let status = second.registry().status().await.unwrap();
    let deals = &status[&DEALS];
    assert_eq!(deals.phase, RunPhase::Paused);
    assert!(deals.last_page >= 2);
    assert_eq!(deals.records_exported, u64::from(deals.last_page));
}

#[tokio::test]
async fn test_interrupted_run_recovers_as_paused() {
    let data_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::endless(Duration::from_millis(5)));
    let first = service(&data_dir, fetcher.clone()).await;

    first
        .registry()
        .start(DEALS, StartMode::Fresh, DateFilter::default())
        .await
        .unwrap();
    eventually(|| fetcher.calls(DEALS).len() >= 3).await;

    // Abort the worker without letting it persist a pause
    first.registry().clear_running().await;
    drop(first);
    // An aborted worker's in-flight checkpoint write still lands
    tokio::time::sleep(Duration::from_millis(100)).await;

    let resumed = Arc::new(ScriptedFetcher::new());
    let second = service(&data_dir, resumed.clone()).await;

    // Before recovery the status surface already reports the run as paused
    let status = second.registry().status().await.unwrap();
    assert!(!status[&DEALS].running);
    assert_eq!(status[&DEALS].phase, RunPhase::Paused);

    let recovered = second.recover().await.unwrap();
    assert_eq!(recovered, vec![DEALS]);

    let last_page = second
        .registry()
        .context()
        .checkpoints
        .load(DEALS)
        .await
        .unwrap()
        .last_page;
    assert!(last_page >= 3);

    resumed.push(DEALS, Step::Page(page_of(9000, 2, false)));
    let outcome = second.registry().resume(DEALS).await.unwrap();
    match outcome {
        StartOutcome::Started { from_page, .. } => assert_eq!(from_page, last_page + 1),
        other => panic!("unexpected outcome {other:?}"),
    }

    let summary = second.registry().wait(DEALS).await.unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(resumed.calls(DEALS), vec![last_page + 1]);

    // Both processes wrote to the same journal
    let events = second.events().query(&LogQuery {
        entity: Some(DEALS.into()),
        level: None,
        limit: None,
    });
    assert!(events
        .iter()
        .any(|e| e.message.starts_with("Export started (fresh)")));
    assert!(events
        .iter()
        .any(|e| e.level == LogLevel::Warning && e.message.contains("interrupted")));
    assert!(events
        .iter()
        .any(|e| e.level == LogLevel::Success && e.message.contains("export completed")));
}

#[tokio::test]
async fn test_records_survive_restart() {
    let data_dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher
        .push(EntityKind::Companies, Step::Page(page_of(1, 3, true)))
        .push(EntityKind::Companies, Step::Page(page_of(4, 2, false)));

    let first = service(&data_dir, fetcher).await;
    first
        .registry()
        .start(EntityKind::Companies, StartMode::Fresh, DateFilter::default())
        .await
        .unwrap();
    first.registry().wait(EntityKind::Companies).await.unwrap();
    drop(first);

    let second = service(&data_dir, Arc::new(ScriptedFetcher::new())).await;
    let stored = second
        .registry()
        .context()
        .dispatcher
        .count(EntityKind::Companies)
        .await
        .unwrap();
    assert_eq!(stored, 5);

    let checkpoint = second
        .registry()
        .context()
        .checkpoints
        .load(EntityKind::Companies)
        .await
        .unwrap();
    assert!(checkpoint.completed);
    assert_eq!(checkpoint.last_page, 2);
}
