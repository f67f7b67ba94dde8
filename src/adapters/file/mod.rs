//! Local JSON file storage

pub mod store;

pub use store::FileStore;
