//! Storage backend factory
//!
//! This module creates the record store and checkpoint storage based on configuration.

use crate::adapters::database::traits::{CheckpointStorage, RecordStore, UpsertResult};
use crate::adapters::file::FileStore;
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::schema::{ExporterConfig, StorageBackend};
use crate::domain::{EntityKind, ExporterError, Record, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Record store and checkpoint storage sharing one backend
pub type Stores = (
    Arc<dyn RecordStore + Send + Sync>,
    Arc<dyn CheckpointStorage + Send + Sync>,
);

/// Create both stores from the same underlying backend
///
/// For PostgreSQL this reuses one connection pool. When `export.dry_run` is
/// set the record store is wrapped in a [`DryRunRecordStore`].
///
/// # Errors
///
/// Returns an error if the backend cannot be created
pub async fn create_stores(config: &ExporterConfig) -> Result<Stores> {
    let (records, checkpoints): Stores = match config.storage.backend {
        StorageBackend::File => {
            tracing::info!(data_dir = %config.application.data_dir, "Creating file store");
            let store = Arc::new(FileStore::new(&config.application.data_dir));
            (
                store.clone() as Arc<dyn RecordStore + Send + Sync>,
                store as Arc<dyn CheckpointStorage + Send + Sync>,
            )
        }
        StorageBackend::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                ExporterError::Configuration(
                    "postgresql configuration is required when storage.backend = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL record store and checkpoint storage");
            let client = Arc::new(PostgreSQLClient::new(pg_config.clone()).await?);
            let adapter = Arc::new(PostgreSQLAdapter::new_with_arc(client));
            (
                adapter.clone() as Arc<dyn RecordStore + Send + Sync>,
                adapter as Arc<dyn CheckpointStorage + Send + Sync>,
            )
        }
    };

    if config.export.dry_run {
        tracing::warn!("Dry run enabled: records will be fetched but not written");
        return Ok((Arc::new(DryRunRecordStore::new(records)), checkpoints));
    }

    Ok((records, checkpoints))
}

/// Acknowledges upserts without writing them
///
/// Reads go to the wrapped store so snapshots still show what is there.
pub struct DryRunRecordStore {
    inner: Arc<dyn RecordStore + Send + Sync>,
}

impl DryRunRecordStore {
    pub fn new(inner: Arc<dyn RecordStore + Send + Sync>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RecordStore for DryRunRecordStore {
    async fn test_connection(&self) -> Result<()> {
        self.inner.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_records(&self, entity: EntityKind, records: &[Record]) -> Result<UpsertResult> {
        tracing::info!(
            entity = %entity,
            count = records.len(),
            "DRY RUN: Would upsert {} records into {}",
            records.len(),
            self.inner.backend_name()
        );
        Ok(UpsertResult::all_succeeded(records.len()))
    }

    async fn delete_records(&self, entity: EntityKind, ids: &[String]) -> Result<usize> {
        tracing::info!(
            entity = %entity,
            count = ids.len(),
            "DRY RUN: Would delete {} records from {}",
            ids.len(),
            self.inner.backend_name()
        );
        Ok(0)
    }

    async fn fetch_records(&self, entity: EntityKind) -> Result<Vec<Record>> {
        self.inner.fetch_records(entity).await
    }

    async fn count_records(&self, entity: EntityKind) -> Result<u64> {
        self.inner.count_records(entity).await
    }

    fn backend_name(&self) -> &str {
        "dry-run"
    }
}
