//! Snapshot command implementations
//!
//! `export-file` and `export-sheets` materialize what the record store
//! holds; they never contact the CRM.

use crate::cli::commands::{load_or_report, open_service};
use crate::domain::{DateFilter, ExporterError};
use chrono::NaiveDate;
use clap::Args;

/// Record modification range shared by both snapshot commands
#[derive(Args, Debug, Clone, Copy)]
pub struct RangeArgs {
    /// Only records modified on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub date_from: Option<NaiveDate>,

    /// Only records modified on or before this date (YYYY-MM-DD)
    #[arg(long)]
    pub date_to: Option<NaiveDate>,
}

impl From<RangeArgs> for DateFilter {
    fn from(range: RangeArgs) -> Self {
        DateFilter {
            date_from: range.date_from,
            date_to: range.date_to,
        }
    }
}

/// Arguments for the export-file command
#[derive(Args, Debug)]
pub struct ExportFileArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Directory for the archive, overriding `files.export_dir`
    #[arg(short, long)]
    pub output_dir: Option<String>,
}

impl ExportFileArgs {
    /// Execute the export-file command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let mut config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };
        if let Some(dir) = &self.output_dir {
            config.files.export_dir = dir.clone();
        }

        let service = match open_service(config).await {
            Ok(s) => s,
            Err(code) => return Ok(code),
        };

        println!("📦 Writing export archive...");
        match service.export_to_file(self.range.into()).await {
            Ok(archive) => {
                println!("✅ Archive written: {}", archive.path.display());
                println!("   SHA-256: {}", archive.sha256);
                println!("   Size: {} bytes", archive.size_bytes);
                for (entity, rows) in &archive.rows {
                    println!("   {entity}: {rows} rows");
                }
                Ok(0)
            }
            Err(e) => Ok(report_failure("Export file failed", &e)),
        }
    }
}

/// Arguments for the export-sheets command
#[derive(Args, Debug)]
pub struct ExportSheetsArgs {
    #[command(flatten)]
    pub range: RangeArgs,
}

impl ExportSheetsArgs {
    /// Execute the export-sheets command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let service = match open_service(config).await {
            Ok(s) => s,
            Err(code) => return Ok(code),
        };

        println!("📤 Uploading to cloud spreadsheet...");
        match service.export_to_cloud_sheet(self.range.into()).await {
            Ok(link) => {
                println!("✅ Spreadsheet ready: {}", link.url);
                Ok(0)
            }
            Err(e) => Ok(report_failure("Cloud spreadsheet export failed", &e)),
        }
    }
}

fn report_failure(what: &str, error: &ExporterError) -> i32 {
    tracing::error!(error = %error, "{what}");
    println!("❌ {what}");
    println!("   Error: {error}");
    match error {
        ExporterError::Validation(_) | ExporterError::Configuration(_) => 2,
        ExporterError::SinkUnavailable(_) | ExporterError::Storage(_) => 4,
        _ => 5,
    }
}
