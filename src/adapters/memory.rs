//! In-process storage backend
//!
//! Holds records and checkpoints in memory. Used by tests and as the
//! record side of dry runs.

use crate::adapters::database::traits::{CheckpointStorage, RecordStore, UpsertResult};
use crate::core::state::ExportCheckpoint;
use crate::domain::{EntityKind, Record, Result, StorageError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Memory-backed [`RecordStore`] and [`CheckpointStorage`]
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<EntityKind, BTreeMap<String, Record>>>,
    checkpoints: Mutex<BTreeMap<EntityKind, ExportCheckpoint>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every record operation fail with `Unavailable` until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store offline".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn test_connection(&self) -> Result<()> {
        self.check_available()
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_records(&self, entity: EntityKind, records: &[Record]) -> Result<UpsertResult> {
        self.check_available()?;
        let mut all = self.records.lock().unwrap_or_else(|p| p.into_inner());
        let table = all.entry(entity).or_default();
        for record in records {
            table.insert(record.id().to_string(), record.clone());
        }
        Ok(UpsertResult::all_succeeded(records.len()))
    }

    async fn delete_records(&self, entity: EntityKind, ids: &[String]) -> Result<usize> {
        self.check_available()?;
        let mut all = self.records.lock().unwrap_or_else(|p| p.into_inner());
        let Some(table) = all.get_mut(&entity) else {
            return Ok(0);
        };
        Ok(ids.iter().filter(|id| table.remove(id.as_str()).is_some()).count())
    }

    async fn fetch_records(&self, entity: EntityKind) -> Result<Vec<Record>> {
        self.check_available()?;
        let all = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(all
            .get(&entity)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn count_records(&self, entity: EntityKind) -> Result<u64> {
        self.check_available()?;
        let all = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(all.get(&entity).map_or(0, |table| table.len() as u64))
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl CheckpointStorage for MemoryStore {
    async fn load_checkpoint(&self, entity: EntityKind) -> Result<Option<ExportCheckpoint>> {
        let checkpoints = self.checkpoints.lock().unwrap_or_else(|p| p.into_inner());
        Ok(checkpoints.get(&entity).cloned())
    }

    async fn save_checkpoint(&self, checkpoint: &ExportCheckpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock().unwrap_or_else(|p| p.into_inner());
        checkpoints.insert(checkpoint.entity, checkpoint.clone());
        Ok(())
    }

    async fn delete_checkpoint(&self, entity: EntityKind) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock().unwrap_or_else(|p| p.into_inner());
        checkpoints.remove(&entity);
        Ok(())
    }

    async fn list_checkpoints(&self) -> Result<Vec<ExportCheckpoint>> {
        let checkpoints = self.checkpoints.lock().unwrap_or_else(|p| p.into_inner());
        Ok(checkpoints.values().cloned().collect())
    }
}
