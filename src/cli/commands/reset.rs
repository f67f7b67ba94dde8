//! Reset command implementation
//!
//! Sets checkpoints back to page 0 so the next export starts from page 1.
//! Stored records are left alone; the next run upserts over them.

use crate::adapters::database::create_stores;
use crate::cli::commands::load_or_report;
use crate::core::state::{CheckpointStore, RunPhase};
use crate::domain::{DateFilter, EntitySelector};
use clap::Args;
use std::io::{self, Write};

/// Arguments for the reset command
#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Entity to reset (deals, contacts, companies, events or all)
    #[arg(default_value = "all")]
    pub entity: EntitySelector,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Reset even if a checkpoint is marked running
    #[arg(long)]
    pub force: bool,
}

impl ResetArgs {
    /// Execute the reset command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(entity = %self.entity, "Resetting checkpoints");

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
        let entities = self.entity.entities();

        if !self.force {
            for entity in &entities {
                let checkpoint = store.load(*entity).await?;
                if checkpoint.status == RunPhase::Running {
                    println!("❌ Export for {entity} is marked running");
                    println!("   Stop it first, or pass --force if its process is gone");
                    return Ok(3);
                }
            }
        }

        if !self.yes {
            print!("Reset {} checkpoint(s) to page 0? [y/N]: ", self.entity);
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Reset cancelled.");
                return Ok(0);
            }
        }

        for entity in entities {
            if let Err(e) = store.reset(entity, DateFilter::default()).await {
                tracing::error!(entity = %entity, error = %e, "Failed to reset checkpoint");
                println!("❌ {entity}: {e}");
                return Ok(5); // Fatal error exit code
            }
            println!("✅ {entity}: checkpoint reset to page 0");
        }

        Ok(0)
    }
}
