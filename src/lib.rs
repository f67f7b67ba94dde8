// CRM Exporter - Resumable CRM to storage export service
// Copyright (c) 2025 CRM Exporter Contributors
// Licensed under the MIT License

//! # CRM Exporter
//!
//! Pulls deals, contacts, companies and events out of a paginated CRM API
//! into a record store, page by page, with a persisted checkpoint per
//! entity so an export can be paused, resumed after a crash, or restarted.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`api`] - HTTP control surface under `/api`
//! - [`core`] - Run state machine, run registry, checkpoints and tabular conversion
//! - [`adapters`] - CRM client, record stores and spreadsheet sinks
//! - [`domain`] - Entities, records and errors
//! - [`config`] - TOML configuration with environment overrides
//! - [`logging`] - `tracing` setup and the operator event log
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crm_exporter::config::load_config;
//! use crm_exporter::core::export::{ExportService, StartMode};
//! use crm_exporter::domain::{DateFilter, EntityKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("crm-exporter.toml")?;
//! let service = ExportService::new(config).await?;
//! service.recover().await?;
//!
//! service
//!     .registry()
//!     .start(EntityKind::Deals, StartMode::Resume, DateFilter::default())
//!     .await?;
//!
//! if let Some(summary) = service.registry().wait(EntityKind::Deals).await {
//!     println!("Stored {} records", summary.records_stored);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`domain::Result`], whose error is
//! [`domain::ExporterError`]. CRM failures carry a transient/fatal split
//! that decides whether a page is retried.

pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
