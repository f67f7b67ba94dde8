//! Export orchestration
//!
//! - [`machine`] - the per-entity page loop
//! - [`registry`] - run table and control commands
//! - [`dispatcher`] - record store writes and snapshots
//! - [`retry`] - bounded backoff policy
//! - [`scheduler`] - periodic starts
//! - [`service`] - wiring from configuration
//! - [`webhook`] - CRM change notifications

pub mod dispatcher;
pub mod machine;
pub mod registry;
pub mod retry;
pub mod run;
pub mod scheduler;
pub mod service;
pub mod summary;
pub mod webhook;

pub use dispatcher::SinkDispatcher;
pub use machine::{ExportContext, ExportMachine};
pub use registry::{EntityStatus, RunRegistry, StartMode, StartOutcome};
pub use retry::{with_retry, RetryPolicy};
pub use run::{RunCell, RunState};
pub use scheduler::Scheduler;
pub use service::ExportService;
pub use summary::{RunOutcome, RunSummary};
pub use webhook::WebhookSummary;
