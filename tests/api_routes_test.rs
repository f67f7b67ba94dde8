//! Integration tests for the `/api` control routes

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{eventually, page_of, record, ScriptedFetcher, Step};
use crm_exporter::adapters::crm::PageFetcher;
use crm_exporter::api::create_router;
use crm_exporter::config::ExporterConfig;
use crm_exporter::core::export::ExportService;
use crm_exporter::core::state::{CheckpointBuilder, RunPhase};
use crm_exporter::domain::{DateFilter, EntityKind, Record};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    service: Arc<ExportService>,
    router: Router,
}

async fn app(fetcher: Arc<ScriptedFetcher>) -> TestApp {
    let dir = TempDir::new().unwrap();
    let toml = format!(
        r#"
[application]
data_dir = '{data}'

[crm]
base_url = "https://example.amocrm.ru/api/v4"
access_token = "token"

[logging]
local_enabled = false

[files]
export_dir = '{exports}'
"#,
        data = dir.path().join("data").display(),
        exports = dir.path().join("exports").display(),
    );
    let config: ExporterConfig = toml::from_str(&toml).unwrap();
    let server = config.server.clone();

    let service = Arc::new(
        ExportService::with_fetcher(config, fetcher as Arc<dyn PageFetcher>)
            .await
            .unwrap(),
    );
    let router = create_router(service.clone(), &server);

    TestApp {
        _dir: dir,
        service,
        router,
    }
}

async fn call(router: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn post_json(router: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn call_json(router: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let (status, body) = call(router, method, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let app = app(Arc::new(ScriptedFetcher::new())).await;

    let (status, body) = call_json(&app.router, "GET", "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_status_lists_every_entity() {
    let app = app(Arc::new(ScriptedFetcher::new())).await;

    let (status, body) = call_json(&app.router, "GET", "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    for entity in EntityKind::ALL {
        let entry = &body["entities"][entity.to_string()];
        assert_eq!(entry["running"], false);
        assert_eq!(entry["last_page"], 0);
    }
}

#[tokio::test]
async fn test_start_twice_conflicts() {
    let fetcher = Arc::new(ScriptedFetcher::endless(Duration::from_millis(20)));
    let app = app(fetcher.clone()).await;

    let (status, body) = call_json(&app.router, "POST", "/api/exports/deals/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entity"], "deals");

    let (status, body) = call_json(&app.router, "POST", "/api/exports/deals/start").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "already_running");

    // Reset is refused while a run is live
    let (status, _) = call_json(&app.router, "POST", "/api/exports/all/reset").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call_json(&app.router, "POST", "/api/exports/deals/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"][0], "deals");

    app.service.registry().wait(EntityKind::Deals).await;
    assert!(!app.service.registry().is_running(EntityKind::Deals));
}

#[tokio::test]
async fn test_unknown_entity_is_rejected() {
    let app = app(Arc::new(ScriptedFetcher::new())).await;

    let (status, body) = call_json(&app.router, "POST", "/api/exports/invoices/start").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_entity");

    // `all` is not a single entity
    let (status, _) = call_json(&app.router, "POST", "/api/exports/all/resume").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logs_filter_by_entity() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push(EntityKind::Contacts, Step::Page(page_of(1, 2, false)));
    let app = app(fetcher).await;

    call_json(&app.router, "POST", "/api/exports/contacts/start").await;
    app.service.registry().wait(EntityKind::Contacts).await;

    let (status, body) = call_json(&app.router, "GET", "/api/logs?entity=contacts&level=success").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert!(body["entries"][0]["message"]
        .as_str()
        .unwrap()
        .starts_with("Page 1: 2 records stored"));

    let (_, body) = call_json(&app.router, "GET", "/api/logs?entity=deals").await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_clear_running_releases_workers() {
    let fetcher = Arc::new(ScriptedFetcher::endless(Duration::from_millis(20)));
    let app = app(fetcher.clone()).await;

    call_json(&app.router, "POST", "/api/exports/all/start").await;
    eventually(|| !fetcher.calls(EntityKind::Events).is_empty()).await;

    let (status, body) = call_json(&app.router, "POST", "/api/exports/clear-running").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"].as_array().unwrap().len(), EntityKind::ALL.len());

    for entity in EntityKind::ALL {
        assert!(!app.service.registry().is_running(entity));
    }
}

#[tokio::test]
async fn test_sheets_snapshot_unavailable_when_disabled() {
    let app = app(Arc::new(ScriptedFetcher::new())).await;

    let (status, body) = call_json(&app.router, "POST", "/api/snapshots/sheets").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "sink_unavailable");
}

#[tokio::test]
async fn test_file_snapshot_returns_zip() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push(EntityKind::Deals, Step::Page(page_of(1, 3, false)));
    let app = app(fetcher).await;

    call_json(&app.router, "POST", "/api/exports/deals/start").await;
    app.service.registry().wait(EntityKind::Deals).await;

    let (status, body) = call(&app.router, "POST", "/api/snapshots/file").await;
    assert_eq!(status, StatusCode::OK);
    // ZIP local file header
    assert_eq!(&body[..4], b"PK\x03\x04");
}

#[tokio::test]
async fn test_malformed_filter_body_is_rejected() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let app = app(fetcher.clone()).await;

    let (status, body) = post_json(
        &app.router,
        "/api/exports/deals/start",
        r#"{"date_from":"2024-13-45"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(!app.service.registry().is_running(EntityKind::Deals));

    // A rejected restart leaves the checkpoint alone
    app.service
        .registry()
        .context()
        .checkpoints
        .save(
            &CheckpointBuilder::new(EntityKind::Contacts)
                .last_page(5)
                .status(RunPhase::Paused)
                .build(),
        )
        .await
        .unwrap();
    let (status, _) = post_json(&app.router, "/api/exports/contacts/restart", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let contacts = app
        .service
        .registry()
        .context()
        .checkpoints
        .load(EntityKind::Contacts)
        .await
        .unwrap();
    assert_eq!(contacts.last_page, 5);
    assert!(fetcher.calls(EntityKind::Contacts).is_empty());
}

#[tokio::test]
async fn test_filter_body_reaches_the_run() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let app = app(fetcher.clone()).await;

    let (status, _) = post_json(
        &app.router,
        "/api/exports/deals/start",
        r#"{"date_from":"2024-01-01","date_to":"2024-01-31"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    app.service.registry().wait(EntityKind::Deals).await;

    let expected = DateFilter::new(
        NaiveDate::from_ymd_opt(2024, 1, 1),
        NaiveDate::from_ymd_opt(2024, 1, 31),
    );
    assert_eq!(fetcher.filters(EntityKind::Deals), vec![expected]);

    let (_, body) = call_json(&app.router, "GET", "/api/status").await;
    assert_eq!(body["entities"]["deals"]["date_from"], "2024-01-01");
    assert_eq!(body["entities"]["deals"]["date_to"], "2024-01-31");
}

#[tokio::test]
async fn test_webhook_applies_adds_updates_and_deletes() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push(EntityKind::Contacts, Step::Page(page_of(1, 3, false)));
    let app = app(fetcher.clone()).await;

    call_json(&app.router, "POST", "/api/exports/contacts/start").await;
    app.service.registry().wait(EntityKind::Contacts).await;

    let renamed = Record::from_value(json!({"id": 2, "name": "Renamed"})).unwrap();
    fetcher
        .put_record(EntityKind::Contacts, renamed.clone())
        .put_record(EntityKind::Deals, record(40));

    let (status, body) = post_json(
        &app.router,
        "/api/webhook",
        r#"{
            "leads": {"add": [{"id": 40}]},
            "contacts": {"update": [{"id": 2}, {"id": 77}], "delete": [{"id": 3}]}
        }"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["upserted"], 2);
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["missing"], 1);

    let dispatcher = &app.service.registry().context().dispatcher;
    let contacts = dispatcher
        .snapshot(EntityKind::Contacts, DateFilter::default())
        .await
        .unwrap();
    let ids: Vec<&str> = contacts.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(contacts[1], renamed);
    assert_eq!(dispatcher.count(EntityKind::Deals).await.unwrap(), 1);

    // Delivery does not move the export position
    let (_, status_body) = call_json(&app.router, "GET", "/api/status").await;
    assert_eq!(status_body["entities"]["contacts"]["last_page"], 1);

    let (_, logs) = call_json(&app.router, "GET", "/api/logs?entity=contacts&level=info").await;
    let messages: Vec<&str> = logs["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["message"].as_str())
        .collect();
    assert!(messages.contains(&"Updated contacts with ID 2"));
    assert!(messages.contains(&"Deleted contacts with ID 3"));

    let (_, logs) = call_json(&app.router, "GET", "/api/logs?entity=webhook").await;
    assert_eq!(logs["entries"][0]["message"], "Received webhook: 3 changes");
}

#[tokio::test]
async fn test_webhook_rejects_empty_and_malformed_bodies() {
    let app = app(Arc::new(ScriptedFetcher::new())).await;

    for body in ["{}", "not json", r#"{"leads": [1]}"#] {
        let (status, response) = post_json(&app.router, "/api/webhook", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["error"]["code"], "validation_error");
    }

    let (_, logs) = call_json(&app.router, "GET", "/api/logs?entity=webhook&level=error").await;
    assert_eq!(logs["count"], 3);
}
