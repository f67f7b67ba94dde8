//! Export service
//!
//! Wires configuration into a running registry and exposes the snapshot
//! commands that read the record store.

use crate::adapters::crm::{CrmClient, PageFetcher};
use crate::adapters::database::create_stores;
use crate::adapters::sheets::{ExportArchive, FileExporter, SheetsClient, SpreadsheetLink};
use crate::config::ExporterConfig;
use crate::core::export::dispatcher::SinkDispatcher;
use crate::core::export::machine::ExportContext;
use crate::core::export::registry::RunRegistry;
use crate::core::export::retry::RetryPolicy;
use crate::core::export::webhook::{self, WebhookSummary};
use crate::core::state::CheckpointStore;
use crate::core::transform::{to_table, Table};
use crate::domain::{DateFilter, EntityKind, ExporterError, Result};
use crate::logging::{LogAggregator, LogSource};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Everything a control surface needs
pub struct ExportService {
    config: ExporterConfig,
    registry: RunRegistry,
}

impl ExportService {
    /// Build the service with the HTTP CRM client
    pub async fn new(config: ExporterConfig) -> Result<Self> {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(CrmClient::new(&config.crm)?);
        Self::with_fetcher(config, fetcher).await
    }

    /// Build the service around any page fetcher
    ///
    /// Creates the configured stores, ensures their schema and opens the
    /// event log.
    pub async fn with_fetcher(config: ExporterConfig, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        let (records, checkpoints) = create_stores(&config).await?;
        records.ensure_schema().await?;

        tracing::info!(
            backend = records.backend_name(),
            dry_run = config.export.dry_run,
            "Record store ready"
        );

        let ctx = ExportContext {
            fetcher,
            dispatcher: Arc::new(SinkDispatcher::new(records)),
            checkpoints: Arc::new(CheckpointStore::new_with_storage(checkpoints)),
            events: Arc::new(open_events(&config)?),
            policy: RetryPolicy::from_config(&config.export),
        };

        Self::from_context(config, ctx).await
    }

    /// Build the service from pre-wired collaborators
    pub async fn from_context(config: ExporterConfig, ctx: ExportContext) -> Result<Self> {
        Ok(Self {
            config,
            registry: RunRegistry::new(ctx),
        })
    }

    /// Take ownership of the checkpoints
    ///
    /// Checkpoints persisted as running belong to a process that is gone;
    /// they are marked paused. Only the process that will drive exports
    /// calls this.
    pub async fn recover(&self) -> Result<Vec<EntityKind>> {
        self.registry.recover().await
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn events(&self) -> &Arc<LogAggregator> {
        &self.registry.context().events
    }

    /// Apply a CRM change notification to the record store
    pub async fn ingest_webhook(&self, payload: &Value) -> Result<WebhookSummary> {
        let ctx = self.registry.context();
        match webhook::ingest(ctx, payload).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                ctx.events
                    .error(LogSource::Webhook, format!("Error processing webhook: {e}"));
                Err(e)
            }
        }
    }

    /// Snapshot every entity as a table
    async fn snapshot_tables(&self, range: DateFilter) -> Result<Vec<(EntityKind, Table)>> {
        range.validate().map_err(ExporterError::Validation)?;
        let dispatcher = &self.registry.context().dispatcher;

        let mut tables = Vec::with_capacity(EntityKind::ALL.len());
        for entity in EntityKind::ALL {
            let records = dispatcher.snapshot(entity, range).await?;
            tracing::debug!(entity = %entity, records = records.len(), "Snapshot materialized");
            tables.push((entity, to_table(&records)));
        }
        Ok(tables)
    }

    /// Materialize all entities into a ZIP of CSV sheets
    pub async fn export_to_file(&self, range: DateFilter) -> Result<ExportArchive> {
        let tables = self.snapshot_tables(range).await?;
        let exporter = FileExporter::new(&self.config.files.export_dir);

        match exporter.write(tables).await {
            Ok(archive) => {
                self.events().success(
                    LogSource::System,
                    format!("Export file written: {}", archive.file_name),
                );
                Ok(archive)
            }
            Err(e) => {
                self.events()
                    .error(LogSource::System, format!("Export file failed: {e}"));
                Err(e)
            }
        }
    }

    /// Materialize all entities into a cloud spreadsheet and return its URL
    pub async fn export_to_cloud_sheet(&self, range: DateFilter) -> Result<SpreadsheetLink> {
        if !self.config.sheets.enabled {
            return Err(ExporterError::SinkUnavailable(
                "cloud spreadsheet sink is not enabled".to_string(),
            ));
        }

        let client = SheetsClient::new(&self.config.sheets)?;
        let tables = self.snapshot_tables(range).await?;
        client.export(&tables, self.events()).await
    }
}

/// Open the operator event log, journaled under `data_dir` when enabled
pub fn open_events(config: &ExporterConfig) -> Result<LogAggregator> {
    let logging = &config.logging;
    if !logging.event_journal {
        return Ok(LogAggregator::in_memory(logging.event_capacity));
    }

    let path = Path::new(&config.application.data_dir).join("events.jsonl");
    LogAggregator::open(path, logging.event_capacity, logging.event_retention_days)
}
