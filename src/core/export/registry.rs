//! Run registry
//!
//! Owns the per-entity run table. Every control command goes through here,
//! serialized by one command lock, so two workers for the same entity can
//! never exist at once.

use crate::core::export::machine::{ExportContext, ExportMachine};
use crate::core::export::run::{RunCell, RunState};
use crate::core::export::summary::RunSummary;
use crate::core::state::{ExportCheckpoint, RunPhase};
use crate::domain::{DateFilter, EntityKind, EntitySelector, ExporterError, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How a start treats the persisted checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    /// Reset to page 0 and fetch from page 1
    Fresh,
    /// Continue after the persisted `last_page`
    Resume,
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartMode::Fresh => f.write_str("fresh"),
            StartMode::Resume => f.write_str("resume"),
        }
    }
}

impl FromStr for StartMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fresh" => Ok(StartMode::Fresh),
            "resume" => Ok(StartMode::Resume),
            other => Err(format!("Unknown start mode '{other}'. Must be fresh or resume")),
        }
    }
}

/// Result of a start or resume command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StartOutcome {
    /// A worker was spawned
    Started { run_id: Uuid, from_page: u32 },
    /// Resume found no progress to continue
    NothingToResume,
}

/// Snapshot of one entity for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct EntityStatus {
    pub running: bool,
    pub completed: bool,
    pub last_page: u32,
    pub last_update: Option<DateTime<Utc>>,
    pub phase: RunPhase,
    pub retry_count: u32,
    pub cancel_requested: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub records_exported: u64,
    #[serde(flatten)]
    pub filter: DateFilter,
}

impl EntityStatus {
    fn from_parts(checkpoint: &ExportCheckpoint, run: Option<&RunState>) -> Self {
        let running = run.is_some_and(|r| r.running);

        // A persisted "running" with no live worker was interrupted
        let persisted = match checkpoint.status {
            RunPhase::Running => RunPhase::Paused,
            other => other,
        };
        let phase = match run {
            Some(r) if r.running => RunPhase::Running,
            Some(r) if r.phase != RunPhase::Idle => r.phase,
            _ => persisted,
        };

        Self {
            running,
            completed: checkpoint.completed,
            last_page: checkpoint.last_page,
            last_update: checkpoint.last_update,
            phase,
            retry_count: run.map_or(0, |r| r.retry_count),
            cancel_requested: run.is_some_and(|r| r.cancel_requested),
            started_at: run.and_then(|r| r.started_at).or(checkpoint.started_at),
            error: run
                .and_then(|r| r.error.clone())
                .or_else(|| checkpoint.error.clone()),
            records_exported: checkpoint.records_exported,
            filter: checkpoint.filter,
        }
    }
}

struct RunSlot {
    state: RunCell,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Option<RunSummary>>>,
}

impl RunSlot {
    fn request_stop(&self) -> bool {
        let was_running = self.state.update(|s| {
            if s.running {
                s.cancel_requested = true;
            }
            s.running
        });
        if was_running {
            self.cancel.cancel();
        }
        was_running
    }
}

struct Inner {
    ctx: ExportContext,
    slots: Mutex<HashMap<EntityKind, RunSlot>>,
    // Held for the whole of every control command
    control: tokio::sync::Mutex<()>,
}

/// Sole owner of entity workers
#[derive(Clone)]
pub struct RunRegistry {
    inner: Arc<Inner>,
}

impl RunRegistry {
    pub fn new(ctx: ExportContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                slots: Mutex::new(HashMap::new()),
                control: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn context(&self) -> &ExportContext {
        &self.inner.ctx
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<EntityKind, RunSlot>> {
        self.inner.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_running(&self, entity: EntityKind) -> bool {
        self.slots()
            .get(&entity)
            .is_some_and(|slot| slot.state.is_running())
    }

    /// Current in-memory state of an entity's latest run
    pub fn run_state(&self, entity: EntityKind) -> Option<RunState> {
        self.slots().get(&entity).map(|slot| slot.state.snapshot())
    }

    fn ensure_idle(&self, entity: EntityKind) -> Result<()> {
        if self.is_running(entity) {
            return Err(ExporterError::AlreadyRunning(entity));
        }
        Ok(())
    }

    /// Start a run for one entity without waiting for it
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if the entity has a live worker.
    pub async fn start(
        &self,
        entity: EntityKind,
        mode: StartMode,
        filter: DateFilter,
    ) -> Result<StartOutcome> {
        filter.validate().map_err(ExporterError::Validation)?;
        let _guard = self.inner.control.lock().await;
        self.start_locked(entity, mode, filter).await
    }

    /// [`start`](Self::start) every entity; failures are reported per entity
    pub async fn start_all(
        &self,
        mode: StartMode,
        filter: DateFilter,
    ) -> Vec<(EntityKind, Result<StartOutcome>)> {
        let mut results = Vec::with_capacity(EntityKind::ALL.len());
        for entity in EntityKind::ALL {
            results.push((entity, self.start(entity, mode, filter).await));
        }
        results
    }

    /// Continue from the persisted checkpoint
    ///
    /// A no-op when nothing was exported yet or the checkpoint is completed.
    pub async fn resume(&self, entity: EntityKind) -> Result<StartOutcome> {
        self.start(entity, StartMode::Resume, DateFilter::default())
            .await
    }

    /// Stop any live run, reset the checkpoint and start a fresh run
    pub async fn restart(&self, entity: EntityKind, filter: DateFilter) -> Result<StartOutcome> {
        filter.validate().map_err(ExporterError::Validation)?;
        let _guard = self.inner.control.lock().await;

        let previous = {
            let mut slots = self.slots();
            slots.get_mut(&entity).and_then(|slot| {
                slot.request_stop();
                slot.handle.take()
            })
        };
        if let Some(handle) = previous {
            tracing::info!(entity = %entity, "Waiting for previous run to pause before restart");
            let _ = handle.await;
        }

        self.start_locked(entity, StartMode::Fresh, filter).await
    }

    async fn start_locked(
        &self,
        entity: EntityKind,
        mode: StartMode,
        filter: DateFilter,
    ) -> Result<StartOutcome> {
        self.ensure_idle(entity)?;
        let checkpoints = &self.inner.ctx.checkpoints;

        let mut checkpoint = match mode {
            StartMode::Fresh => checkpoints.reset(entity, filter).await?,
            StartMode::Resume => {
                let checkpoint = checkpoints.load(entity).await?;
                if !checkpoint.is_resumable() {
                    self.inner.ctx.events.info(
                        entity,
                        format!(
                            "Nothing to resume (last_page {}, completed {})",
                            checkpoint.last_page, checkpoint.completed
                        ),
                    );
                    return Ok(StartOutcome::NothingToResume);
                }
                checkpoint
            }
        };

        checkpoint.mark_started();
        checkpoints.save(&checkpoint).await?;

        Ok(self.spawn(entity, mode, checkpoint))
    }

    fn spawn(&self, entity: EntityKind, mode: StartMode, checkpoint: ExportCheckpoint) -> StartOutcome {
        let ctx = &self.inner.ctx;
        let started = RunState::started();
        let run_id = started.run_id.unwrap_or_else(Uuid::new_v4);
        let from_page = checkpoint.next_page();

        let state = RunCell::new(started);
        let cancel = CancellationToken::new();
        let machine = ExportMachine::new(entity, ctx.clone(), state.clone(), cancel.clone());

        ctx.events.info(
            entity,
            format!("Export started ({mode}) from page {from_page}"),
        );
        tracing::info!(entity = %entity, run_id = %run_id, from_page, mode = %mode, "Spawning export worker");

        let worker_state = state.clone();
        let events = ctx.events.clone();
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(machine.run(checkpoint)).catch_unwind().await {
                Ok(summary) => Some(summary),
                Err(_) => {
                    let message = "Export worker panicked".to_string();
                    worker_state.update(|s| s.finish(RunPhase::Errored, Some(message.clone())));
                    events.error(entity, message);
                    None
                }
            }
        });

        self.slots().insert(
            entity,
            RunSlot {
                state,
                cancel,
                handle: Some(handle),
            },
        );

        StartOutcome::Started { run_id, from_page }
    }

    /// Request cooperative cancellation; idempotent
    ///
    /// Returns the entities that had a live run.
    pub async fn stop(&self, selector: EntitySelector) -> Vec<EntityKind> {
        let _guard = self.inner.control.lock().await;
        let slots = self.slots();

        let mut stopped = Vec::new();
        for entity in selector.entities() {
            if slots.get(&entity).is_some_and(RunSlot::request_stop) {
                self.inner.ctx.events.info(entity, "Stop requested");
                stopped.push(entity);
            }
        }
        stopped
    }

    /// Force every run to not-running without touching checkpoints
    ///
    /// Lingering workers are aborted. Returns the entities that were cleared.
    pub async fn clear_running(&self) -> Vec<EntityKind> {
        let _guard = self.inner.control.lock().await;

        let mut cleared = Vec::new();
        let mut aborted = Vec::new();
        {
            let mut slots = self.slots();
            for (entity, slot) in slots.iter_mut() {
                slot.cancel.cancel();
                if let Some(handle) = slot.handle.take() {
                    handle.abort();
                    aborted.push(handle);
                }
                let was_running = slot.state.update(|s| {
                    let was_running = s.running;
                    if was_running {
                        s.finish(RunPhase::Paused, None);
                    }
                    was_running
                });
                if was_running {
                    cleared.push(*entity);
                }
            }
        }

        // The control lock stays held until every aborted task has unwound
        for handle in aborted {
            let _ = handle.await;
        }

        cleared.sort();
        for entity in &cleared {
            self.inner.ctx.events.warning(*entity, "Running flag cleared");
        }
        cleared
    }

    /// Reset checkpoints to page 0 and forget run state
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if any selected entity is live; nothing is reset then.
    pub async fn reset(&self, selector: EntitySelector) -> Result<Vec<ExportCheckpoint>> {
        let _guard = self.inner.control.lock().await;
        let entities = selector.entities();

        for entity in &entities {
            self.ensure_idle(*entity)?;
        }

        let mut reset = Vec::with_capacity(entities.len());
        for entity in entities {
            let checkpoint = self
                .inner
                .ctx
                .checkpoints
                .reset(entity, DateFilter::default())
                .await?;
            self.slots().remove(&entity);
            self.inner.ctx.events.info(entity, "Checkpoint reset to page 0");
            reset.push(checkpoint);
        }
        Ok(reset)
    }

    /// Per-entity status from checkpoints and live run state
    pub async fn status(&self) -> Result<BTreeMap<EntityKind, EntityStatus>> {
        let checkpoints = self.inner.ctx.checkpoints.load_all().await?;
        let runs: HashMap<EntityKind, RunState> = self
            .slots()
            .iter()
            .map(|(entity, slot)| (*entity, slot.state.snapshot()))
            .collect();

        Ok(checkpoints
            .iter()
            .map(|(entity, checkpoint)| {
                (*entity, EntityStatus::from_parts(checkpoint, runs.get(entity)))
            })
            .collect())
    }

    /// Reconcile checkpoints persisted as running by a process that is gone
    pub async fn recover(&self) -> Result<Vec<EntityKind>> {
        let _guard = self.inner.control.lock().await;
        let recovered = self.inner.ctx.checkpoints.recover_interrupted().await?;
        for entity in &recovered {
            self.inner
                .ctx
                .events
                .warning(*entity, "Previous run was interrupted; marked paused");
        }
        Ok(recovered)
    }

    /// Wait for an entity's current worker to finish
    ///
    /// Returns `None` if no worker was spawned or it panicked.
    pub async fn wait(&self, entity: EntityKind) -> Option<RunSummary> {
        let handle = self
            .slots()
            .get_mut(&entity)
            .and_then(|slot| slot.handle.take())?;
        handle.await.ok().flatten()
    }

    /// Stop every run and wait up to `timeout` for the workers to pause
    ///
    /// Returns false if the timeout elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let stopped = self.stop(EntitySelector::All).await;
        let handles: Vec<_> = {
            let mut slots = self.slots();
            slots
                .values_mut()
                .filter_map(|slot| slot.handle.take())
                .collect()
        };

        if handles.is_empty() {
            return true;
        }

        tracing::info!(stopping = stopped.len(), "Waiting for export workers to pause");
        match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
            Ok(_) => {
                tracing::info!("All export workers stopped");
                true
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Shutdown timeout elapsed with export workers still running"
                );
                false
            }
        }
    }
}
