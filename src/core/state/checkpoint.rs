//! Checkpoint model for tracking export progress
//!
//! One checkpoint exists per [`EntityKind`]. Advancing `last_page` is the commit
//! point of a page: it is only persisted after the page's records are stored.

use crate::domain::{DateFilter, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of an entity's export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Never started, or reset
    #[default]
    Idle,
    /// A worker is paging through the entity
    Running,
    /// The fetcher reported no further pages
    Completed,
    /// Stopped by an operator or shutdown; resumable from the checkpoint
    Paused,
    /// Retries exhausted or a fatal fetch error
    Errored,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Paused => "paused",
            RunPhase::Errored => "errored",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RunPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(RunPhase::Idle),
            "running" => Ok(RunPhase::Running),
            "completed" => Ok(RunPhase::Completed),
            // a stopped run shares the paused shape
            "paused" | "stopped" => Ok(RunPhase::Paused),
            "errored" => Ok(RunPhase::Errored),
            other => Err(format!("Unknown run phase '{other}'")),
        }
    }
}

/// Durable per-entity progress record
///
/// # Examples
///
/// ```
/// use crm_exporter::core::state::{CheckpointBuilder, RunPhase};
/// use crm_exporter::domain::EntityKind;
///
/// let checkpoint = CheckpointBuilder::new(EntityKind::Contacts)
///     .last_page(3)
///     .build();
///
/// assert_eq!(checkpoint.next_page(), 4);
/// assert_eq!(checkpoint.status, RunPhase::Idle);
/// assert!(checkpoint.is_resumable());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportCheckpoint {
    pub entity: EntityKind,

    /// Last page whose records are durably stored; 0 means not started
    pub last_page: u32,

    /// When `last_page` last advanced
    pub last_update: Option<DateTime<Utc>>,

    /// Query bounds, fixed for the lifetime of a run
    #[serde(flatten)]
    pub filter: DateFilter,

    /// True once the fetcher reported no further pages
    pub completed: bool,

    /// Last persisted lifecycle phase
    #[serde(default)]
    pub status: RunPhase,

    /// Message of the failure that errored the last run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Records stored since the checkpoint was last reset
    #[serde(default)]
    pub records_exported: u64,

    /// When the current or last run began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ExportCheckpoint {
    /// A fresh checkpoint at page 0
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            last_page: 0,
            last_update: None,
            filter: DateFilter::default(),
            completed: false,
            status: RunPhase::Idle,
            error: None,
            records_exported: 0,
            started_at: None,
        }
    }

    /// Page the next fetch must request
    pub fn next_page(&self) -> u32 {
        self.last_page + 1
    }

    /// Whether a resume has anything to continue
    pub fn is_resumable(&self) -> bool {
        self.last_page > 0 && !self.completed
    }

    /// Whether the checkpoint claims a run that no live worker owns
    pub fn is_in_progress(&self) -> bool {
        self.status == RunPhase::Running
    }

    /// Discard progress and apply new query bounds
    pub fn reset(&mut self, filter: DateFilter) {
        *self = Self {
            filter,
            ..Self::new(self.entity)
        };
    }

    /// Mark the checkpoint as owned by a live run
    pub fn mark_started(&mut self) {
        self.status = RunPhase::Running;
        self.started_at = Some(Utc::now());
        self.error = None;
    }

    /// Advance past a durably stored page
    ///
    /// # Errors
    ///
    /// Returns an error if `page` is not exactly `last_page + 1`.
    pub fn advance(&mut self, page: u32, records: usize) -> Result<(), String> {
        if page != self.next_page() {
            return Err(format!(
                "checkpoint for {} expected page {}, got {}",
                self.entity,
                self.next_page(),
                page
            ));
        }
        self.last_page = page;
        self.last_update = Some(Utc::now());
        self.records_exported += records as u64;
        Ok(())
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
        self.status = RunPhase::Completed;
        self.error = None;
    }

    pub fn mark_paused(&mut self) {
        self.status = RunPhase::Paused;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = RunPhase::Errored;
        self.error = Some(error.into());
    }
}

/// Builder for creating ExportCheckpoint instances
pub struct CheckpointBuilder {
    checkpoint: ExportCheckpoint,
}

impl CheckpointBuilder {
    pub fn new(entity: EntityKind) -> Self {
        Self {
            checkpoint: ExportCheckpoint::new(entity),
        }
    }

    pub fn last_page(mut self, page: u32) -> Self {
        self.checkpoint.last_page = page;
        self
    }

    pub fn last_update(mut self, at: DateTime<Utc>) -> Self {
        self.checkpoint.last_update = Some(at);
        self
    }

    pub fn filter(mut self, filter: DateFilter) -> Self {
        self.checkpoint.filter = filter;
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.checkpoint.completed = completed;
        self
    }

    pub fn status(mut self, status: RunPhase) -> Self {
        self.checkpoint.status = status;
        self
    }

    pub fn records_exported(mut self, count: u64) -> Self {
        self.checkpoint.records_exported = count;
        self
    }

    pub fn build(self) -> ExportCheckpoint {
        self.checkpoint
    }
}
