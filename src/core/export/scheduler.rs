//! Scheduled export tick

use crate::config::ScheduleConfig;
use crate::core::export::registry::{RunRegistry, StartMode, StartOutcome};
use crate::domain::{DateFilter, EntityKind, ExporterError, Result};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Starts every idle entity on a fixed interval
pub struct Scheduler {
    registry: RunRegistry,
    interval: Duration,
    mode: StartMode,
}

impl Scheduler {
    pub fn new(registry: RunRegistry, interval: Duration, mode: StartMode) -> Self {
        Self {
            registry,
            interval,
            mode,
        }
    }

    pub fn from_config(registry: RunRegistry, config: &ScheduleConfig) -> Self {
        Self::new(registry, Duration::from_secs(config.interval_seconds), config.mode)
    }

    /// Run one tick
    ///
    /// In resume mode an entity with nothing to resume (never exported, or
    /// completed) starts a fresh run instead. Returns how many entities were
    /// started.
    pub async fn tick(&self) -> usize {
        let mut started = 0;
        for entity in EntityKind::ALL {
            match self.start(entity).await {
                Ok(StartOutcome::Started { from_page, .. }) => {
                    tracing::info!(entity = %entity, from_page, "Scheduled export started");
                    started += 1;
                }
                Ok(StartOutcome::NothingToResume) => {
                    tracing::debug!(entity = %entity, "Scheduled tick: nothing to resume");
                }
                Err(ExporterError::AlreadyRunning(_)) => {
                    tracing::debug!(entity = %entity, "Scheduled tick skipped: already running");
                }
                Err(e) => {
                    tracing::warn!(entity = %entity, error = %e, "Scheduled start failed");
                }
            }
        }
        started
    }

    async fn start(&self, entity: EntityKind) -> Result<StartOutcome> {
        let filter = DateFilter::default();
        match self.registry.start(entity, self.mode, filter).await? {
            StartOutcome::NothingToResume if self.mode == StartMode::Resume => {
                self.registry.start(entity, StartMode::Fresh, filter).await
            }
            outcome => Ok(outcome),
        }
    }

    /// Tick every interval until `shutdown` turns true
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                mode = %self.mode,
                "Export scheduler started"
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Export scheduler stopped");
        })
    }
}
