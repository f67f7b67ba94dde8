//! PostgreSQL storage backend
//!
//! Records and checkpoints live in two tables created by
//! `migrations/001_initial_schema.sql`.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
pub use models::{PostgreSQLCheckpoint, PostgreSQLRecord};
