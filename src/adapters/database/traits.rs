//! Storage abstraction traits
//!
//! This module defines the traits that storage backends must implement
//! to hold checkpoints and exported records.

use crate::core::state::ExportCheckpoint;
use crate::domain::{EntityKind, Record, Result};
use async_trait::async_trait;

/// Result of an upsert of one page of records
#[derive(Debug, Clone, Default)]
pub struct UpsertResult {
    /// Records inserted or updated
    pub success_count: usize,

    /// Records the backend rejected
    pub failure_count: usize,

    /// Details of rejected records
    pub failures: Vec<UpsertFailure>,
}

impl UpsertResult {
    pub fn all_succeeded(count: usize) -> Self {
        Self {
            success_count: count,
            ..Self::default()
        }
    }
}

/// Details of a rejected record
#[derive(Debug, Clone)]
pub struct UpsertFailure {
    /// Record id that failed
    pub record_id: String,

    /// Error message
    pub error: String,
}

/// Record store trait
///
/// Writes are upserts keyed by `(entity, record id)`: storing the same record
/// twice leaves exactly one copy holding the latest values.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Test the backend connection
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn test_connection(&self) -> Result<()>;

    /// Create tables, directories or files the backend needs
    async fn ensure_schema(&self) -> Result<()>;

    /// Insert or replace records by id
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable. Per-record rejections
    /// are reported in the returned [`UpsertResult`].
    async fn upsert_records(&self, entity: EntityKind, records: &[Record]) -> Result<UpsertResult>;

    /// Remove records by id; unknown ids are skipped
    ///
    /// # Returns
    ///
    /// The number of records that were present and removed.
    async fn delete_records(&self, entity: EntityKind, ids: &[String]) -> Result<usize>;

    /// Every stored record of an entity, ordered by id
    async fn fetch_records(&self, entity: EntityKind) -> Result<Vec<Record>>;

    async fn count_records(&self, entity: EntityKind) -> Result<u64>;

    /// Short name for logs and status output
    fn backend_name(&self) -> &str;
}

/// Checkpoint storage trait
///
/// One checkpoint per entity, replaced wholesale on save.
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    /// Load the checkpoint for an entity
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(checkpoint))` if found, `Ok(None)` if never saved.
    async fn load_checkpoint(&self, entity: EntityKind) -> Result<Option<ExportCheckpoint>>;

    /// Save a checkpoint, replacing any previous one for the same entity
    async fn save_checkpoint(&self, checkpoint: &ExportCheckpoint) -> Result<()>;

    async fn delete_checkpoint(&self, entity: EntityKind) -> Result<()>;

    /// All persisted checkpoints
    async fn list_checkpoints(&self) -> Result<Vec<ExportCheckpoint>>;
}
