//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use crm_exporter::adapters::crm::{Page, PageFetcher};
use crm_exporter::adapters::database::{CheckpointStorage, RecordStore};
use crm_exporter::adapters::memory::MemoryStore;
use crm_exporter::core::export::{ExportContext, RetryPolicy, RunRegistry, SinkDispatcher};
use crm_exporter::core::state::{CheckpointStore, ExportCheckpoint};
use crm_exporter::domain::{CrmError, DateFilter, EntityKind, Record};
use crm_exporter::logging::{LogAggregator, LogEntry, LogLevel, LogQuery};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// One scripted response
pub enum Step {
    Page(Page),
    Transient,
    Fatal,
}

/// A CRM stand-in that replays a script per entity
///
/// Once an entity's script runs out it either reports the end of the data
/// or, when endless, keeps returning one-record pages.
#[derive(Default)]
pub struct ScriptedFetcher {
    steps: Mutex<HashMap<EntityKind, VecDeque<Step>>>,
    calls: Mutex<Vec<(EntityKind, u32, DateFilter)>>,
    gates: Mutex<HashMap<EntityKind, Arc<Semaphore>>>,
    remote: Mutex<HashMap<(EntityKind, String), Record>>,
    endless: bool,
    delay: Duration,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never-ending data, one page per `delay`
    pub fn endless(delay: Duration) -> Self {
        Self {
            endless: true,
            delay,
            ..Self::default()
        }
    }

    pub fn push(&self, entity: EntityKind, step: Step) -> &Self {
        self.steps
            .lock()
            .unwrap()
            .entry(entity)
            .or_default()
            .push_back(step);
        self
    }

    /// Make `record` what a by-id lookup returns
    pub fn put_record(&self, entity: EntityKind, record: Record) -> &Self {
        self.remote
            .lock()
            .unwrap()
            .insert((entity, record.id().to_string()), record);
        self
    }

    /// Pages requested for `entity`, in call order
    pub fn calls(&self, entity: EntityKind) -> Vec<u32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _, _)| *e == entity)
            .map(|(_, page, _)| *page)
            .collect()
    }

    /// Filters passed with each request for `entity`
    pub fn filters(&self, entity: EntityKind) -> Vec<DateFilter> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _, _)| *e == entity)
            .map(|(_, _, filter)| *filter)
            .collect()
    }

    /// Hold every `entity` request after it is recorded until a permit is added
    pub fn gate(&self, entity: EntityKind) -> Arc<Semaphore> {
        self.gates
            .lock()
            .unwrap()
            .entry(entity)
            .or_insert_with(|| Arc::new(Semaphore::new(0)))
            .clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(
        &self,
        entity: EntityKind,
        page: u32,
        filter: &DateFilter,
    ) -> Result<Page, CrmError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().unwrap().push((entity, page, *filter));

        let gate = self.gates.lock().unwrap().get(&entity).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let step = self
            .steps
            .lock()
            .unwrap()
            .get_mut(&entity)
            .and_then(VecDeque::pop_front);

        match step {
            Some(Step::Page(page)) => Ok(page),
            Some(Step::Transient) => Err(CrmError::ServerError {
                status: 503,
                message: "upstream busy".to_string(),
            }),
            Some(Step::Fatal) => Err(CrmError::Unauthorized("token revoked".to_string())),
            None if self.endless => Ok(page_of(u64::from(page) * 1000, 1, true)),
            None => Ok(page_of(0, 0, false)),
        }
    }

    async fn fetch_record(&self, entity: EntityKind, id: &str) -> Result<Option<Record>, CrmError> {
        Ok(self
            .remote
            .lock()
            .unwrap()
            .get(&(entity, id.to_string()))
            .cloned())
    }
}

pub fn record(id: u64) -> Record {
    Record::from_value(json!({
        "id": id,
        "name": format!("Record {id}"),
        "updated_at": 1_704_067_200 + id as i64,
    }))
    .unwrap()
}

/// `count` records with ids starting at `first_id`
pub fn page_of(first_id: u64, count: usize, has_more: bool) -> Page {
    Page {
        records: (0..count as u64).map(|i| record(first_id + i)).collect(),
        has_more,
    }
}

pub struct Harness {
    pub fetcher: Arc<ScriptedFetcher>,
    pub store: Arc<MemoryStore>,
    pub registry: RunRegistry,
}

impl Harness {
    pub fn new(fetcher: ScriptedFetcher, max_retries: u32) -> Self {
        let fetcher = Arc::new(fetcher);
        let store = Arc::new(MemoryStore::new());
        let records: Arc<dyn RecordStore + Send + Sync> = store.clone();
        let checkpoints: Arc<dyn CheckpointStorage + Send + Sync> = store.clone();

        let ctx = ExportContext {
            fetcher: fetcher.clone() as Arc<dyn PageFetcher>,
            dispatcher: Arc::new(SinkDispatcher::new(records)),
            checkpoints: Arc::new(CheckpointStore::new_with_storage(checkpoints)),
            events: Arc::new(LogAggregator::in_memory(1000)),
            policy: RetryPolicy::immediate(max_retries),
        };

        Self {
            fetcher,
            store,
            registry: RunRegistry::new(ctx),
        }
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.registry.context().checkpoints
    }

    pub async fn seed(&self, checkpoint: ExportCheckpoint) {
        self.checkpoints().save(&checkpoint).await.unwrap();
    }

    pub async fn checkpoint(&self, entity: EntityKind) -> ExportCheckpoint {
        self.checkpoints().load(entity).await.unwrap()
    }

    pub async fn stored(&self, entity: EntityKind) -> u64 {
        self.registry.context().dispatcher.count(entity).await.unwrap()
    }

    /// Operator events about `entity` at `level`, oldest first
    pub fn events(&self, entity: EntityKind, level: LogLevel) -> Vec<LogEntry> {
        self.registry.context().events.query(&LogQuery {
            entity: Some(entity.into()),
            level: Some(level),
            limit: None,
        })
    }
}

/// Poll until `condition` holds, advancing paused time between checks
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
