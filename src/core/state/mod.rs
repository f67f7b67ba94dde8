//! Checkpoint model and persistence

pub mod checkpoint;
pub mod manager;

pub use checkpoint::{CheckpointBuilder, ExportCheckpoint, RunPhase};
pub use manager::CheckpointStore;
