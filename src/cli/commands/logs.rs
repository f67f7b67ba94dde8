//! Logs command implementation
//!
//! Prints the operator event journal kept under `data_dir`.

use crate::cli::commands::load_or_report;
use crate::core::export::service::open_events;
use crate::logging::{LogEntry, LogLevel, LogQuery, LogSource};
use clap::Args;

/// Arguments for the logs command
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Only entries about this entity, `sheets` or `system`
    #[arg(long)]
    pub entity: Option<LogSource>,

    /// Only entries of this level (info, warning, error, success)
    #[arg(long)]
    pub level: Option<LogLevel>,

    /// Show at most the newest N entries
    #[arg(short = 'n', long, default_value_t = 50)]
    pub limit: usize,

    /// Print entries as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl LogsArgs {
    /// Execute the logs command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        if !config.logging.event_journal {
            println!("ℹ️  Event journal is disabled (logging.event_journal = false)");
            return Ok(0);
        }

        let events = match open_events(&config) {
            Ok(events) => events,
            Err(e) => {
                println!("❌ Failed to open event journal");
                println!("   Error: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        let entries = events.query(&LogQuery {
            entity: self.entity,
            level: self.level,
            limit: Some(self.limit),
        });

        if entries.is_empty() {
            println!("No log entries found.");
            return Ok(0);
        }

        for entry in &entries {
            if self.json {
                println!("{}", serde_json::to_string(entry)?);
            } else {
                println!("{}", format_entry(entry));
            }
        }

        Ok(0)
    }
}

fn format_entry(entry: &LogEntry) -> String {
    let marker = match entry.level {
        LogLevel::Info => "ℹ️ ",
        LogLevel::Warning => "⚠️ ",
        LogLevel::Error => "❌",
        LogLevel::Success => "✅",
    };
    format!(
        "{} {} {:<9} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        marker,
        entry.entity,
        entry.message
    )
}
