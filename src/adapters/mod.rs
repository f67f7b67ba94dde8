//! External system integrations for the exporter.
//!
//! This module provides adapters for integrating with external systems:
//!
//! - [`crm`] - CRM page fetching over HTTP
//! - [`database`] - Storage abstraction layer (trait-based) and backend factory
//! - [`file`] - JSON file backend (default)
//! - [`postgresql`] - PostgreSQL backend
//! - [`memory`] - In-process backend for dry runs and tests
//! - [`sheets`] - Spreadsheet file and cloud spreadsheet sinks
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing with fake implementations. The export loop only sees the
//! [`crm::PageFetcher`], [`database::RecordStore`] and [`database::CheckpointStorage`] traits.
//!
//! # CRM Adapter
//!
//! ```rust,no_run
//! use crm_exporter::adapters::crm::{CrmClient, PageFetcher};
//! use crm_exporter::config::load_config;
//! use crm_exporter::domain::{DateFilter, EntityKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("crm-exporter.toml")?;
//!
//! let client = CrmClient::new(&config.crm)?;
//! let page = client.fetch_page(EntityKind::Deals, 1, &DateFilter::default()).await?;
//! println!("{} deals", page.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Storage Adapters
//!
//! ```rust,no_run
//! use crm_exporter::adapters::database::create_stores;
//! use crm_exporter::config::load_config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("crm-exporter.toml")?;
//! let (records, checkpoints) = create_stores(&config).await?;
//! records.ensure_schema().await?;
//! println!("{} checkpoints", checkpoints.list_checkpoints().await?.len());
//! # Ok(())
//! # }
//! ```

pub mod crm;
pub mod database;
pub mod file;
pub mod memory;
pub mod postgresql;
pub mod sheets;
