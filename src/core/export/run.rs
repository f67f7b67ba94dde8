//! In-memory run state
//!
//! One [`RunState`] per entity, created by the registry for every start and
//! mutated by the run's worker while it is alive.

use crate::core::state::RunPhase;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    /// Identifies the run that owns this state
    pub run_id: Option<Uuid>,
    pub running: bool,
    /// Set by stop, observed at the next page boundary
    pub cancel_requested: bool,
    /// Consecutive transient failures of the current page
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub phase: RunPhase,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            run_id: None,
            running: false,
            cancel_requested: false,
            retry_count: 0,
            started_at: None,
            error: None,
            phase: RunPhase::Idle,
        }
    }
}

impl RunState {
    /// State of a run that is about to be spawned
    pub fn started() -> Self {
        Self {
            run_id: Some(Uuid::new_v4()),
            running: true,
            started_at: Some(Utc::now()),
            phase: RunPhase::Running,
            ..Self::default()
        }
    }

    /// Mark the run as no longer owning a worker
    pub fn finish(&mut self, phase: RunPhase, error: Option<String>) {
        self.running = false;
        self.phase = phase;
        self.error = error;
    }
}

/// Shared handle to one run's state
#[derive(Debug, Clone, Default)]
pub struct RunCell(Arc<Mutex<RunState>>);

impl RunCell {
    pub fn new(state: RunState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn snapshot(&self) -> RunState {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Apply `f` under the lock and return its result
    pub fn update<T>(&self, f: impl FnOnce(&mut RunState) -> T) -> T {
        let mut state = self.0.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }

    pub fn is_running(&self) -> bool {
        self.update(|s| s.running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_state() {
        let state = RunState::started();
        assert!(state.running);
        assert!(!state.cancel_requested);
        assert!(state.run_id.is_some());
        assert_eq!(state.phase, RunPhase::Running);
    }

    #[test]
    fn test_cell_updates_are_shared() {
        let cell = RunCell::new(RunState::started());
        let worker = cell.clone();

        worker.update(|s| s.retry_count = 2);
        assert_eq!(cell.snapshot().retry_count, 2);

        worker.update(|s| s.finish(RunPhase::Errored, Some("boom".to_string())));
        assert!(!cell.is_running());
        assert_eq!(cell.snapshot().error.as_deref(), Some("boom"));
    }
}
