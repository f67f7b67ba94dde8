//! Run summary and reporting
//!
//! This module defines structures for tracking and reporting the result of one run.

use crate::domain::EntityKind;
use serde::Serialize;
use std::time::Duration;

/// Terminal state a run ended in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The fetcher reported no further pages
    Completed,
    /// Cancelled between pages; resumable
    Paused,
    /// Fatal error or retries exhausted
    Errored,
}

/// Summary of one run of an entity export
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub entity: EntityKind,

    pub outcome: RunOutcome,

    /// First page this run requested
    pub first_page: u32,

    /// Checkpoint position when the run ended
    pub last_page: u32,

    /// Pages fetched and committed by this run
    pub pages_fetched: u32,

    /// Records stored by this run
    pub records_stored: u64,

    /// Transient failures retried during this run
    pub retries: u32,

    /// Duration of the run
    #[serde(with = "duration_secs")]
    pub duration: Duration,

    /// Message of the error that ended the run
    pub error: Option<String>,
}

impl RunSummary {
    /// Create a new summary for a run starting at `first_page`
    pub fn new(entity: EntityKind, first_page: u32) -> Self {
        Self {
            entity,
            outcome: RunOutcome::Paused,
            first_page,
            last_page: first_page.saturating_sub(1),
            pages_fetched: 0,
            records_stored: 0,
            retries: 0,
            duration: Duration::from_secs(0),
            error: None,
        }
    }

    /// Record a committed page
    pub fn add_page(&mut self, page: u32, records: usize) {
        self.pages_fetched += 1;
        self.records_stored += records as u64;
        self.last_page = page;
    }

    /// Set the outcome and duration
    pub fn finish(mut self, outcome: RunOutcome, duration: Duration) -> Self {
        self.outcome = outcome;
        self.duration = duration;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_successful(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            entity = %self.entity,
            outcome = ?self.outcome,
            first_page = self.first_page,
            last_page = self.last_page,
            pages = self.pages_fetched,
            records = self.records_stored,
            retries = self.retries,
            duration_secs = self.duration.as_secs(),
            "Export run finished"
        );

        if let Some(ref error) = self.error {
            tracing::warn!(entity = %self.entity, error = %error, "Export run ended with error");
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}
