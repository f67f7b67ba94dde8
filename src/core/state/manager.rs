//! Checkpoint store
//!
//! The CheckpointStore loads and saves per-entity checkpoints through a
//! [`CheckpointStorage`] backend.

use crate::adapters::database::traits::CheckpointStorage;
use crate::core::state::checkpoint::{ExportCheckpoint, RunPhase};
use crate::domain::{DateFilter, EntityKind, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Durable key-value record of per-entity progress
pub struct CheckpointStore {
    storage: Arc<dyn CheckpointStorage + Send + Sync>,
}

impl CheckpointStore {
    /// Create a new CheckpointStore with a storage backend
    pub fn new_with_storage(storage: Arc<dyn CheckpointStorage + Send + Sync>) -> Self {
        Self { storage }
    }

    /// Load the checkpoint for an entity, or a fresh one at page 0
    pub async fn load(&self, entity: EntityKind) -> Result<ExportCheckpoint> {
        Ok(self
            .storage
            .load_checkpoint(entity)
            .await?
            .unwrap_or_else(|| ExportCheckpoint::new(entity)))
    }

    /// Save a checkpoint
    pub async fn save(&self, checkpoint: &ExportCheckpoint) -> Result<()> {
        self.storage.save_checkpoint(checkpoint).await
    }

    /// Persist a page commit
    ///
    /// Only called after the page's records were acknowledged by the record store.
    pub async fn checkpoint_page(&self, checkpoint: &ExportCheckpoint) -> Result<()> {
        tracing::debug!(
            entity = %checkpoint.entity,
            last_page = checkpoint.last_page,
            records_exported = checkpoint.records_exported,
            "Checkpointing page"
        );

        self.save(checkpoint).await
    }

    /// Reset an entity to page 0 with new query bounds and persist it
    pub async fn reset(&self, entity: EntityKind, filter: DateFilter) -> Result<ExportCheckpoint> {
        let mut checkpoint = self.load(entity).await?;
        checkpoint.reset(filter);
        self.save(&checkpoint).await?;

        tracing::info!(entity = %entity, "Checkpoint reset");
        Ok(checkpoint)
    }

    /// Checkpoints for every entity, fresh ones for entities never exported
    pub async fn load_all(&self) -> Result<BTreeMap<EntityKind, ExportCheckpoint>> {
        let mut all: BTreeMap<EntityKind, ExportCheckpoint> = EntityKind::ALL
            .iter()
            .map(|kind| (*kind, ExportCheckpoint::new(*kind)))
            .collect();

        for checkpoint in self.storage.list_checkpoints().await? {
            all.insert(checkpoint.entity, checkpoint);
        }
        Ok(all)
    }

    /// Rewrite checkpoints persisted as running to paused
    ///
    /// After a process restart no worker owns them. Returns the entities that
    /// were reconciled.
    pub async fn recover_interrupted(&self) -> Result<Vec<EntityKind>> {
        let mut recovered = Vec::new();
        for mut checkpoint in self.storage.list_checkpoints().await? {
            if checkpoint.status == RunPhase::Running {
                checkpoint.mark_paused();
                self.save(&checkpoint).await?;
                recovered.push(checkpoint.entity);
            }
        }
        Ok(recovered)
    }
}
