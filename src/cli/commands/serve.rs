//! Serve command implementation
//!
//! Runs the HTTP control API and, when enabled, the scheduler until a
//! shutdown signal arrives. Live workers are then paused within
//! `export.shutdown_timeout_secs`.

use crate::api::start_api_server;
use crate::cli::commands::{load_or_report, open_service};
use crate::core::export::Scheduler;
use clap::Args;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the bind host
    #[arg(long)]
    pub host: Option<String>,

    /// Override the bind port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Do not start the scheduler even if it is enabled in the config
    #[arg(long)]
    pub no_schedule: bool,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let mut config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }

        let server_config = config.server.clone();
        let schedule_config = config.schedule.clone();
        let shutdown_timeout = Duration::from_secs(config.export.shutdown_timeout_secs);

        let service = match open_service(config).await {
            Ok(s) => s,
            Err(code) => return Ok(code),
        };

        let recovered = service.recover().await?;
        if !recovered.is_empty() {
            println!("⚠️  Marked {} interrupted export(s) as paused", recovered.len());
        }

        let scheduler = if schedule_config.enabled && !self.no_schedule {
            let scheduler = Scheduler::from_config(service.registry().clone(), &schedule_config);
            Some(scheduler.spawn(shutdown_signal.clone()))
        } else {
            None
        };

        println!(
            "🌐 Control API on http://{}:{}/api",
            server_config.host, server_config.port
        );

        let served = start_api_server(service.clone(), &server_config, shutdown_signal).await;

        if let Some(handle) = scheduler {
            if served.is_err() {
                handle.abort();
            }
            let _ = handle.await;
        }

        let paused_in_time = service.registry().shutdown(shutdown_timeout).await;

        if let Err(e) = served {
            tracing::error!(error = %e, "API server failed");
            println!("❌ API server failed: {e}");
            return Ok(5); // Fatal error exit code
        }

        if !paused_in_time {
            println!("⚠️  Some workers did not pause before the shutdown timeout");
            return Ok(1);
        }

        println!("✅ Shut down cleanly");
        Ok(0)
    }
}
