//! HTTP control surface
//!
//! Routes under `/api` drive the run registry and expose the status and log
//! snapshots a dashboard polls.

use crate::config::ServerConfig;
use crate::core::export::ExportService;
use crate::domain::{ExporterError, Result};
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod routes;
pub mod state;

pub use error_response::ApiError;
pub use state::AppState;

/// Build the router with every control route
pub fn create_router(service: Arc<ExportService>, config: &ServerConfig) -> Router {
    let state = AppState::new(service);

    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/status", get(routes::get_status))
        .route("/logs", get(routes::get_logs))
        .route("/exports/clear-running", post(routes::clear_running))
        .route("/exports/:target/start", post(routes::start_exports))
        .route("/exports/:target/stop", post(routes::stop_exports))
        .route("/exports/:target/reset", post(routes::reset_exports))
        .route("/exports/:target/restart", post(routes::restart_export))
        .route("/exports/:target/resume", post(routes::resume_export))
        .route("/snapshots/file", post(routes::snapshot_file))
        .route("/snapshots/sheets", post(routes::snapshot_sheets))
        .route("/webhook", post(routes::receive_webhook))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins))
}

/// CORS for the dashboard; empty or `*` allows any origin
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Serve the API until `shutdown` turns true
pub async fn start_api_server(
    service: Arc<ExportService>,
    config: &ServerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let bind_address = format!("{}:{}", config.host, config.port);
    let app = create_router(service, config);

    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|e| ExporterError::Io(format!("cannot bind {bind_address}: {e}")))?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    // Sender gone without a signal; serve until killed
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
        .map_err(|e| ExporterError::Other(format!("API server failed: {e}")))?;

    tracing::info!("API server stopped");
    Ok(())
}
