//! Core business logic for the exporter.
//!
//! # Modules
//!
//! - [`export`] - Per-entity export state machines, the run registry and sink dispatch
//! - [`state`] - Durable checkpoints
//! - [`transform`] - Tabular conversion for spreadsheet sinks
//!
//! # Export Workflow
//!
//! For every entity, a run:
//!
//! 1. **Load Checkpoint**: Read `last_page` for the entity
//! 2. **Fetch**: Request page `last_page + 1` from the CRM
//! 3. **Store**: Upsert the page's records by id
//! 4. **Checkpoint**: Persist the advanced `last_page`
//! 5. **Decide**: Continue, or stop on completion, cancellation or error
//!
//! # Example
//!
//! ```rust,no_run
//! use crm_exporter::config::load_config;
//! use crm_exporter::core::export::{ExportService, StartMode};
//! use crm_exporter::domain::{DateFilter, EntityKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("crm-exporter.toml")?;
//! let service = ExportService::new(config).await?;
//!
//! let registry = service.registry();
//! registry
//!     .start(EntityKind::Contacts, StartMode::Resume, DateFilter::default())
//!     .await?;
//!
//! if let Some(summary) = registry.wait(EntityKind::Contacts).await {
//!     println!("Stored {} records", summary.records_stored);
//! }
//! # Ok(())
//! # }
//! ```

pub mod export;
pub mod state;
pub mod transform;
