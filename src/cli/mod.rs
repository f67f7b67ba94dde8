//! CLI interface and argument parsing

pub mod commands;

use clap::{Parser, Subcommand};

/// CRM Exporter - resumable CRM to storage export service
#[derive(Parser, Debug)]
#[command(name = "crm-exporter")]
#[command(version, about, long_about = None)]
#[command(author = "CRM Exporter Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "crm-exporter.toml",
        env = "CRM_EXPORTER_CONFIG"
    )]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CRM_EXPORTER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP control API and the scheduler
    Serve(commands::serve::ServeArgs),

    /// Export entities in the foreground, Ctrl-C pauses
    Export(commands::export::ExportArgs),

    /// Show checkpoints for every entity
    Status(commands::status::StatusArgs),

    /// Show recent operator events
    Logs(commands::logs::LogsArgs),

    /// Reset checkpoints to page 0
    Reset(commands::reset::ResetArgs),

    /// Write stored records to a ZIP of CSV files
    ExportFile(commands::snapshot::ExportFileArgs),

    /// Write stored records to a cloud spreadsheet
    ExportSheets(commands::snapshot::ExportSheetsArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

impl Commands {
    /// Whether the command runs long enough to want file logging
    pub fn is_long_running(&self) -> bool {
        matches!(self, Commands::Serve(_) | Commands::Export(_))
    }
}
