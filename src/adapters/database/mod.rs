//! Storage abstraction layer
//!
//! Trait-based abstraction over the record store and checkpoint storage,
//! allowing the exporter to run on local files, PostgreSQL or memory.

pub mod factory;
pub mod traits;

pub use factory::{create_stores, DryRunRecordStore, Stores};
pub use traits::{CheckpointStorage, RecordStore, UpsertFailure, UpsertResult};
