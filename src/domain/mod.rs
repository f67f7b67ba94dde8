//! Domain models and types for the exporter.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Entity kinds** ([`EntityKind`], [`EntitySelector`]) and query bounds ([`DateFilter`])
//! - **Records** ([`Record`]), opaque CRM objects keyed by `id`
//! - **Error types** ([`ExporterError`], [`CrmError`], [`StorageError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, ExporterError>`]:
//!
//! ```rust,no_run
//! use crm_exporter::domain::Result;
//!
//! fn example() -> Result<()> {
//!     let config = crm_exporter::config::load_config("crm-exporter.toml")?;
//!     println!("{}", config.crm.base_url);
//!     Ok(())
//! }
//! ```

pub mod entity;
pub mod errors;
pub mod record;
pub mod result;

// Re-export commonly used types for convenience
pub use entity::{DateFilter, EntityKind, EntitySelector};
pub use errors::{CrmError, ExporterError, IsRetryable, StorageError};
pub use record::Record;
pub use result::Result;
