//! Sink dispatcher
//!
//! Upserts fetched pages into the record store and materializes snapshots for
//! the file and spreadsheet converters.

use crate::adapters::database::traits::RecordStore;
use crate::domain::{DateFilter, EntityKind, ExporterError, Record, Result};
use std::sync::Arc;

pub struct SinkDispatcher {
    store: Arc<dyn RecordStore + Send + Sync>,
}

impl SinkDispatcher {
    pub fn new(store: Arc<dyn RecordStore + Send + Sync>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore + Send + Sync> {
        &self.store
    }

    /// Upsert one page of records
    ///
    /// Succeeds only if the store acknowledged every record.
    ///
    /// # Errors
    ///
    /// Any store failure, including partial rejection, is `SinkUnavailable`.
    pub async fn dispatch(&self, entity: EntityKind, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let result = self
            .store
            .upsert_records(entity, records)
            .await
            .map_err(|e| ExporterError::SinkUnavailable(e.to_string()))?;

        if result.failure_count > 0 {
            let first = result
                .failures
                .first()
                .map(|f| format!(" (first: {} - {})", f.record_id, f.error))
                .unwrap_or_default();
            return Err(ExporterError::SinkUnavailable(format!(
                "{} of {} {} records rejected by {}{}",
                result.failure_count,
                records.len(),
                entity,
                self.store.backend_name(),
                first
            )));
        }

        Ok(result.success_count)
    }

    /// Remove records the CRM reported deleted
    pub async fn remove(&self, entity: EntityKind, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.store
            .delete_records(entity, ids)
            .await
            .map_err(|e| ExporterError::SinkUnavailable(e.to_string()))
    }

    /// Every stored record of an entity whose modification time falls in `range`
    ///
    /// Records without a timestamp are only included when the range is open.
    pub async fn snapshot(&self, entity: EntityKind, range: DateFilter) -> Result<Vec<Record>> {
        let records = self
            .store
            .fetch_records(entity)
            .await
            .map_err(|e| ExporterError::SinkUnavailable(e.to_string()))?;

        if range.is_empty() {
            return Ok(records);
        }

        Ok(records
            .into_iter()
            .filter(|record| {
                record
                    .modified_at()
                    .is_some_and(|ts| range.contains_timestamp(ts))
            })
            .collect())
    }

    pub async fn count(&self, entity: EntityKind) -> Result<u64> {
        self.store.count_records(entity).await
    }
}
