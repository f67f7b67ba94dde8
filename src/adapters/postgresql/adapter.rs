//! PostgreSQL adapter implementing storage traits
//!
//! This module provides the implementation of RecordStore and CheckpointStorage
//! for PostgreSQL.

use crate::adapters::database::traits::{
    CheckpointStorage, RecordStore, UpsertFailure, UpsertResult,
};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::{PostgreSQLCheckpoint, PostgreSQLRecord};
use crate::core::state::ExportCheckpoint;
use crate::domain::{EntityKind, Record, Result, StorageError};
use async_trait::async_trait;
use std::sync::Arc;

const UPSERT_RECORD: &str = r#"
    INSERT INTO crm_records (entity, id, payload, updated_at, exported_at)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (entity, id) DO UPDATE SET
        payload = EXCLUDED.payload,
        updated_at = EXCLUDED.updated_at,
        exported_at = EXCLUDED.exported_at
"#;

const UPSERT_CHECKPOINT: &str = r#"
    INSERT INTO export_checkpoints (
        entity, last_page, last_update, date_from, date_to,
        completed, status, error, records_exported, started_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (entity) DO UPDATE SET
        last_page = EXCLUDED.last_page,
        last_update = EXCLUDED.last_update,
        date_from = EXCLUDED.date_from,
        date_to = EXCLUDED.date_to,
        completed = EXCLUDED.completed,
        status = EXCLUDED.status,
        error = EXCLUDED.error,
        records_exported = EXCLUDED.records_exported,
        started_at = EXCLUDED.started_at
"#;

/// PostgreSQL implementation of the storage traits
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Create a new PostgreSQL adapter with an Arc-wrapped client
    pub fn new_with_arc(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }
}

#[async_trait]
impl RecordStore for PostgreSQLAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client.ensure_schema().await
    }

    async fn upsert_records(&self, entity: EntityKind, records: &[Record]) -> Result<UpsertResult> {
        // One connection and one prepared statement per page
        let conn = self.client.get_connection().await?;
        let statement = conn
            .prepare_cached(UPSERT_RECORD)
            .await
            .map_err(|e| StorageError::Unavailable(format!("Failed to prepare upsert: {e}")))?;

        let mut success_count = 0;
        let mut failures = Vec::new();

        for record in records {
            let row = PostgreSQLRecord::from_domain(entity, record);

            match conn
                .execute(
                    &statement,
                    &[
                        &row.entity,
                        &row.id,
                        &row.payload,
                        &row.updated_at,
                        &row.exported_at,
                    ],
                )
                .await
            {
                Ok(_) => success_count += 1,
                Err(e) => {
                    tracing::warn!(
                        entity = %entity,
                        record_id = %row.id,
                        error = %e,
                        "Failed to upsert record into PostgreSQL"
                    );
                    failures.push(UpsertFailure {
                        record_id: row.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(UpsertResult {
            success_count,
            failure_count: failures.len(),
            failures,
        })
    }

    async fn delete_records(&self, entity: EntityKind, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let deleted = self
            .client
            .execute(
                "DELETE FROM crm_records WHERE entity = $1 AND id = ANY($2)",
                &[&entity.as_str(), &ids],
            )
            .await?;
        Ok(deleted as usize)
    }

    async fn fetch_records(&self, entity: EntityKind) -> Result<Vec<Record>> {
        let rows = self
            .client
            .query(
                "SELECT entity, id, payload, updated_at, exported_at FROM crm_records \
                 WHERE entity = $1 ORDER BY id",
                &[&entity.as_str()],
            )
            .await?;

        rows.iter()
            .map(|row| {
                PostgreSQLRecord {
                    entity: row.get("entity"),
                    id: row.get("id"),
                    payload: row.get("payload"),
                    updated_at: row.get("updated_at"),
                    exported_at: row.get("exported_at"),
                }
                .to_domain()
            })
            .collect()
    }

    async fn count_records(&self, entity: EntityKind) -> Result<u64> {
        let rows = self
            .client
            .query(
                "SELECT COUNT(*) FROM crm_records WHERE entity = $1",
                &[&entity.as_str()],
            )
            .await?;

        let count: i64 = rows.first().map(|row| row.get(0)).unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    fn backend_name(&self) -> &str {
        "postgresql"
    }
}

#[async_trait]
impl CheckpointStorage for PostgreSQLAdapter {
    async fn load_checkpoint(&self, entity: EntityKind) -> Result<Option<ExportCheckpoint>> {
        tracing::debug!(entity = %entity, "Loading checkpoint from PostgreSQL");

        let rows = self
            .client
            .query(
                "SELECT * FROM export_checkpoints WHERE entity = $1",
                &[&entity.as_str()],
            )
            .await?;

        match rows.first() {
            Some(row) => Ok(Some(PostgreSQLCheckpoint::from_row(row).to_domain()?)),
            None => {
                tracing::debug!(entity = %entity, "No checkpoint found in PostgreSQL (first export)");
                Ok(None)
            }
        }
    }

    async fn save_checkpoint(&self, checkpoint: &ExportCheckpoint) -> Result<()> {
        let row = PostgreSQLCheckpoint::from_domain(checkpoint)?;

        self.client
            .execute(
                UPSERT_CHECKPOINT,
                &[
                    &row.entity,
                    &row.last_page,
                    &row.last_update,
                    &row.date_from,
                    &row.date_to,
                    &row.completed,
                    &row.status,
                    &row.error,
                    &row.records_exported,
                    &row.started_at,
                ],
            )
            .await?;

        tracing::debug!(
            entity = %checkpoint.entity,
            last_page = checkpoint.last_page,
            "Checkpoint saved to PostgreSQL"
        );
        Ok(())
    }

    async fn delete_checkpoint(&self, entity: EntityKind) -> Result<()> {
        self.client
            .execute(
                "DELETE FROM export_checkpoints WHERE entity = $1",
                &[&entity.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn list_checkpoints(&self) -> Result<Vec<ExportCheckpoint>> {
        let rows = self
            .client
            .query("SELECT * FROM export_checkpoints ORDER BY entity", &[])
            .await?;

        rows.iter()
            .map(|row| PostgreSQLCheckpoint::from_row(row).to_domain())
            .collect()
    }
}
