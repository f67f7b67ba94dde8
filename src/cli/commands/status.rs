//! Status command implementation
//!
//! Reads the persisted checkpoints directly. A running server is not
//! contacted, so "running" here means the last writer had a live worker.

use crate::adapters::database::create_stores;
use crate::cli::commands::{date_or_dash, load_or_report};
use crate::core::state::{CheckpointStore, ExportCheckpoint};
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print checkpoints as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking export status");

        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let (_, checkpoint_storage) = match create_stores(&config).await {
            Ok(stores) => stores,
            Err(e) => {
                println!("❌ Failed to open checkpoint storage");
                println!("   Error: {e}");
                return Ok(4); // Connection error exit code
            }
        };

        let store = CheckpointStore::new_with_storage(checkpoint_storage);
        let checkpoints = match store.load_all().await {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load checkpoints");
                println!("   Error: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&checkpoints)?);
            return Ok(0);
        }

        println!("📊 Export Status");
        println!();
        println!(
            "{:<12} {:<10} {:>6} {:>10} {:<11} {:<11} {:<20}",
            "Entity", "Status", "Page", "Records", "From", "To", "Last Update"
        );
        println!("{}", "-".repeat(86));

        for checkpoint in checkpoints.values() {
            println!("{}", format_row(checkpoint));
            if let Some(error) = &checkpoint.error {
                println!("             ❌ {error}");
            }
        }

        println!();
        if checkpoints.values().all(|c| c.last_page == 0) {
            println!("No export history found.");
            println!("Run 'crm-exporter export' to start exporting data.");
        }

        Ok(0)
    }
}

fn format_row(checkpoint: &ExportCheckpoint) -> String {
    let status = if checkpoint.completed {
        "completed".to_string()
    } else {
        checkpoint.status.to_string()
    };
    let last_update = checkpoint
        .last_update
        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());

    format!(
        "{:<12} {:<10} {:>6} {:>10} {:<11} {:<11} {:<20}",
        checkpoint.entity,
        status,
        checkpoint.last_page,
        checkpoint.records_exported,
        date_or_dash(checkpoint.filter.date_from),
        date_or_dash(checkpoint.filter.date_to),
        last_update
    )
}
