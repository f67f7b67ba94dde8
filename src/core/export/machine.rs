//! Entity export state machine
//!
//! Drives one entity from its checkpoint to a terminal state, one page at a
//! time:
//!
//! 1. stop if cancellation was requested
//! 2. fetch page `last_page + 1`
//! 3. upsert the records
//! 4. advance and persist the checkpoint
//!
//! Transient failures retry the same page with backoff; a page is never skipped.

use crate::adapters::crm::PageFetcher;
use crate::core::export::dispatcher::SinkDispatcher;
use crate::core::export::retry::RetryPolicy;
use crate::core::export::run::RunCell;
use crate::core::export::summary::{RunOutcome, RunSummary};
use crate::core::state::{CheckpointStore, ExportCheckpoint, RunPhase};
use crate::domain::{EntityKind, ExporterError, IsRetryable, Result};
use crate::logging::LogAggregator;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Collaborators shared by every entity's machine
#[derive(Clone)]
pub struct ExportContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub dispatcher: Arc<SinkDispatcher>,
    pub checkpoints: Arc<CheckpointStore>,
    pub events: Arc<LogAggregator>,
    pub policy: RetryPolicy,
}

/// What a committed page contributed
struct CommittedPage {
    records: usize,
    has_more: bool,
}

pub struct ExportMachine {
    entity: EntityKind,
    ctx: ExportContext,
    state: RunCell,
    cancel: CancellationToken,
}

impl ExportMachine {
    pub fn new(entity: EntityKind, ctx: ExportContext, state: RunCell, cancel: CancellationToken) -> Self {
        Self {
            entity,
            ctx,
            state,
            cancel,
        }
    }

    /// Run until completion, cancellation or failure
    ///
    /// `checkpoint` must already be persisted as running.
    pub async fn run(self, mut checkpoint: ExportCheckpoint) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(self.entity, checkpoint.next_page());
        let mut error = None;

        let outcome = loop {
            if self.cancel.is_cancelled() {
                self.pause(&mut checkpoint).await;
                break RunOutcome::Paused;
            }

            let page = checkpoint.next_page();

            match self.process_page(&mut checkpoint, page).await {
                Ok(committed) => {
                    summary.add_page(page, committed.records);
                    self.state.update(|s| s.retry_count = 0);

                    if !committed.has_more {
                        self.complete(&checkpoint, page, committed.records);
                        break RunOutcome::Completed;
                    }

                    self.ctx.events.success(
                        self.entity,
                        format!("Page {page}: {} records stored", committed.records),
                    );
                }
                Err(e) if e.is_retryable() => {
                    let attempt = self.state.update(|s| {
                        s.retry_count += 1;
                        s.retry_count
                    });
                    summary.retries += 1;

                    if !self.ctx.policy.allows(attempt) {
                        let message = format!(
                            "Page {page} failed after {} retries: {e}",
                            self.ctx.policy.max_retries
                        );
                        self.fail(&mut checkpoint, &message).await;
                        error = Some(message);
                        break RunOutcome::Errored;
                    }

                    let delay = self.ctx.policy.delay_for(attempt);
                    self.ctx.events.warning(
                        self.entity,
                        format!(
                            "Page {page} failed: {e}; retry {attempt}/{} in {:.1}s",
                            self.ctx.policy.max_retries,
                            delay.as_secs_f64()
                        ),
                    );
                    crate::log_retry_attempt!(attempt, self.ctx.policy.max_retries, e);

                    // A stop wakes the backoff; the loop head then pauses
                    tokio::select! {
                        _ = self.cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    let message = format!("Page {page} failed: {e}");
                    self.fail(&mut checkpoint, &message).await;
                    error = Some(message);
                    break RunOutcome::Errored;
                }
            }
        };

        let mut summary = summary.finish(outcome, started.elapsed());
        summary.last_page = checkpoint.last_page;
        if let Some(error) = error {
            summary = summary.with_error(error);
        }
        summary.log_summary();
        summary
    }

    /// Fetch, store and commit one page
    ///
    /// The in-memory checkpoint only moves once the new position is persisted.
    async fn process_page(&self, checkpoint: &mut ExportCheckpoint, page: u32) -> Result<CommittedPage> {
        let fetched = self
            .ctx
            .fetcher
            .fetch_page(self.entity, page, &checkpoint.filter)
            .await?;

        let records = fetched.records.len();
        self.ctx.dispatcher.dispatch(self.entity, &fetched.records).await?;
        crate::log_page_stored!(self.entity, page, records);

        let mut next = checkpoint.clone();
        next.advance(page, records).map_err(ExporterError::State)?;
        if !fetched.has_more {
            next.mark_completed();
        }
        self.ctx.checkpoints.checkpoint_page(&next).await?;
        *checkpoint = next;

        Ok(CommittedPage {
            records,
            has_more: fetched.has_more,
        })
    }

    async fn pause(&self, checkpoint: &mut ExportCheckpoint) {
        checkpoint.mark_paused();
        self.persist(checkpoint).await;

        self.state.update(|s| s.finish(RunPhase::Paused, None));
        self.ctx.events.info(
            self.entity,
            format!("Export paused after page {}", checkpoint.last_page),
        );
    }

    fn complete(&self, checkpoint: &ExportCheckpoint, page: u32, records: usize) {
        self.state.update(|s| s.finish(RunPhase::Completed, None));
        self.ctx.events.success(
            self.entity,
            format!(
                "Page {page}: {records} records stored; export completed with {} records",
                checkpoint.records_exported
            ),
        );
    }

    async fn fail(&self, checkpoint: &mut ExportCheckpoint, message: &str) {
        checkpoint.mark_failed(message);
        self.persist(checkpoint).await;

        self.state
            .update(|s| s.finish(RunPhase::Errored, Some(message.to_string())));
        self.ctx.events.error(self.entity, message);
    }

    /// Best-effort save of a terminal status; progress is already committed
    async fn persist(&self, checkpoint: &ExportCheckpoint) {
        if let Err(e) = self.ctx.checkpoints.save(checkpoint).await {
            crate::log_error_with_context!(e, format!("Failed to persist {} status", self.entity).as_str());
        }
    }
}
