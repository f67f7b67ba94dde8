//! PostgreSQL row models
//!
//! Mappings between domain types and the `crm_records` and
//! `export_checkpoints` tables.

use crate::core::state::{ExportCheckpoint, RunPhase};
use crate::domain::{DateFilter, EntityKind, ExporterError, Record, Result, StorageError};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tokio_postgres::Row;

/// Row of the `crm_records` table
#[derive(Debug, Clone)]
pub struct PostgreSQLRecord {
    pub entity: String,
    pub id: String,
    pub payload: Value,
    /// Copied out of the payload so snapshots can filter in SQL
    pub updated_at: Option<i64>,
    pub exported_at: DateTime<Utc>,
}

impl PostgreSQLRecord {
    pub fn from_domain(entity: EntityKind, record: &Record) -> Self {
        Self {
            entity: entity.as_str().to_string(),
            id: record.id().to_string(),
            payload: record.clone().into_value(),
            updated_at: record.modified_at(),
            exported_at: Utc::now(),
        }
    }

    pub fn to_domain(&self) -> Result<Record> {
        Record::from_value(self.payload.clone()).map_err(|e| {
            StorageError::Serialization(format!("record {}/{}: {}", self.entity, self.id, e))
                .into()
        })
    }
}

/// Row of the `export_checkpoints` table
#[derive(Debug, Clone)]
pub struct PostgreSQLCheckpoint {
    pub entity: String,
    pub last_page: i32,
    pub last_update: Option<DateTime<Utc>>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub completed: bool,
    pub status: String,
    pub error: Option<String>,
    pub records_exported: i64,
    pub started_at: Option<DateTime<Utc>>,
}

impl PostgreSQLCheckpoint {
    pub fn from_domain(checkpoint: &ExportCheckpoint) -> Result<Self> {
        let last_page = i32::try_from(checkpoint.last_page).map_err(|_| {
            ExporterError::Validation(format!("last_page {} out of range", checkpoint.last_page))
        })?;

        Ok(Self {
            entity: checkpoint.entity.as_str().to_string(),
            last_page,
            last_update: checkpoint.last_update,
            date_from: checkpoint.filter.date_from,
            date_to: checkpoint.filter.date_to,
            completed: checkpoint.completed,
            status: checkpoint.status.to_string(),
            error: checkpoint.error.clone(),
            records_exported: checkpoint.records_exported as i64,
            started_at: checkpoint.started_at,
        })
    }

    pub fn from_row(row: &Row) -> Self {
        Self {
            entity: row.get("entity"),
            last_page: row.get("last_page"),
            last_update: row.get("last_update"),
            date_from: row.get("date_from"),
            date_to: row.get("date_to"),
            completed: row.get("completed"),
            status: row.get("status"),
            error: row.get("error"),
            records_exported: row.get("records_exported"),
            started_at: row.get("started_at"),
        }
    }

    pub fn to_domain(&self) -> Result<ExportCheckpoint> {
        let entity: EntityKind = self.entity.parse().map_err(ExporterError::InvalidEntity)?;

        let status = self.status.parse().unwrap_or_else(|_| {
            tracing::warn!(entity = %self.entity, status = %self.status, "Unknown checkpoint status");
            RunPhase::Idle
        });

        Ok(ExportCheckpoint {
            entity,
            last_page: self.last_page.max(0) as u32,
            last_update: self.last_update,
            filter: DateFilter::new(self.date_from, self.date_to),
            completed: self.completed,
            status,
            error: self.error.clone(),
            records_exported: self.records_exported.max(0) as u64,
            started_at: self.started_at,
        })
    }
}
