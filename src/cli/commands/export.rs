//! Export command implementation
//!
//! Runs exports in the foreground through the same registry the API uses.
//! A shutdown signal turns into a stop request so every worker pauses at a
//! page boundary and can be resumed later.

use crate::cli::commands::{load_or_report, open_service, shutdown_requested};
use crate::core::export::{RunOutcome, RunRegistry, RunSummary, StartMode, StartOutcome};
use crate::domain::{DateFilter, EntityKind, EntitySelector, ExporterError};
use chrono::NaiveDate;
use clap::Args;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Entity to export (deals, contacts, companies, events or all)
    #[arg(default_value = "all")]
    pub entity: EntitySelector,

    /// Discard checkpoints and start from page 1
    #[arg(long, conflicts_with = "resume")]
    pub fresh: bool,

    /// Only continue existing checkpoints; never start over
    #[arg(long)]
    pub resume: bool,

    /// Only fetch records modified on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub date_from: Option<NaiveDate>,

    /// Only fetch records modified on or before this date (YYYY-MM-DD)
    #[arg(long)]
    pub date_to: Option<NaiveDate>,

    /// Fetch and checkpoint without writing records
    #[arg(long)]
    pub dry_run: bool,
}

impl ExportArgs {
    fn filter(&self) -> DateFilter {
        DateFilter {
            date_from: self.date_from,
            date_to: self.date_to,
        }
    }

    /// Execute the export command
    pub async fn execute(
        &self,
        config_path: &str,
        mut shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(entity = %self.entity, "Starting export command");

        let mut config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.export.dry_run = true;
            println!("🔍 DRY RUN MODE - No records will be written");
            println!();
        }

        let filter = self.filter();
        if let Err(e) = filter.validate() {
            println!("❌ Invalid date range: {e}");
            return Ok(2); // Configuration error exit code
        }
        if self.resume && filter != DateFilter::default() {
            println!("❌ Date filters apply to fresh exports only; drop --resume");
            return Ok(2);
        }

        let shutdown_timeout = Duration::from_secs(config.export.shutdown_timeout_secs);
        let service = match open_service(config).await {
            Ok(s) => s,
            Err(code) => return Ok(code),
        };
        service.recover().await?;
        let registry = service.registry();

        println!("🚀 Exporting {}", self.entity);
        println!();

        let mut started = Vec::new();
        for entity in self.entity.entities() {
            match self.start_one(registry, entity, filter).await {
                Ok(Some(from_page)) => {
                    println!("   {entity}: started from page {from_page}");
                    started.push(entity);
                }
                Ok(None) => println!("   {entity}: nothing to resume"),
                Err(ExporterError::AlreadyRunning(_)) => {
                    println!("❌ {entity}: export is already running");
                    return Ok(3);
                }
                Err(e) => {
                    tracing::error!(entity = %entity, error = %e, "Failed to start export");
                    println!("❌ {entity}: failed to start: {e}");
                    return Ok(5); // Fatal error exit code
                }
            }
        }

        if started.is_empty() {
            println!();
            println!("Nothing to do.");
            return Ok(0);
        }

        let waits = join_all(started.iter().map(|entity| registry.wait(*entity)));
        tokio::pin!(waits);

        let mut interrupted = false;
        let summaries = tokio::select! {
            summaries = &mut waits => summaries,
            _ = shutdown_requested(&mut shutdown_signal) => {
                interrupted = true;
                registry.stop(self.entity).await;
                println!("⏸️  Pausing after the current page...");

                match tokio::time::timeout(shutdown_timeout, &mut waits).await {
                    Ok(summaries) => summaries,
                    Err(_) => {
                        tracing::warn!(
                            timeout_secs = shutdown_timeout.as_secs(),
                            "Workers did not pause before the shutdown timeout"
                        );
                        println!("⚠️  Workers did not pause in time; checkpoints hold the last stored page");
                        return Ok(130);
                    }
                }
            }
        };

        let summaries: Vec<RunSummary> = summaries.into_iter().flatten().collect();
        print_summaries(&summaries);

        Ok(exit_code(&summaries, started.len(), interrupted))
    }

    /// Start one entity, returning the first page the worker fetches
    async fn start_one(
        &self,
        registry: &RunRegistry,
        entity: EntityKind,
        filter: DateFilter,
    ) -> crate::domain::Result<Option<u32>> {
        let mode = if self.fresh || filter != DateFilter::default() {
            StartMode::Fresh
        } else {
            StartMode::Resume
        };

        let outcome = match registry.start(entity, mode, filter).await? {
            // Without --resume a checkpoint with no progress starts over
            StartOutcome::NothingToResume if !self.resume => {
                registry.start(entity, StartMode::Fresh, filter).await?
            }
            outcome => outcome,
        };

        Ok(match outcome {
            StartOutcome::Started { from_page, .. } => Some(from_page),
            StartOutcome::NothingToResume => None,
        })
    }
}

fn print_summaries(summaries: &[RunSummary]) {
    println!();
    println!("📊 Export Summary");
    println!();
    println!(
        "{:<12} {:<10} {:>6} {:>6} {:>10} {:>8} {:>10}",
        "Entity", "Outcome", "From", "To", "Records", "Retries", "Duration"
    );
    println!("{}", "-".repeat(68));

    for summary in summaries {
        let outcome = match summary.outcome {
            RunOutcome::Completed => "✅ done",
            RunOutcome::Paused => "⏸️  paused",
            RunOutcome::Errored => "❌ error",
        };
        println!(
            "{:<12} {:<10} {:>6} {:>6} {:>10} {:>8} {:>9.1}s",
            summary.entity,
            outcome,
            summary.first_page,
            summary.last_page,
            summary.records_stored,
            summary.retries,
            summary.duration.as_secs_f64()
        );
        if let Some(error) = &summary.error {
            println!("             {error}");
        }
    }
    println!();
}

fn exit_code(summaries: &[RunSummary], started: usize, interrupted: bool) -> i32 {
    // A worker that panicked leaves no summary
    let lost = started.saturating_sub(summaries.len());
    let failed = lost + summaries.iter().filter(|s| s.outcome == RunOutcome::Errored).count();
    let paused = summaries.iter().any(|s| s.outcome == RunOutcome::Paused);

    if failed == started {
        5
    } else if failed > 0 {
        1
    } else if interrupted || paused {
        130
    } else {
        0
    }
}
