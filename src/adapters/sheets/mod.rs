//! Spreadsheet sinks
//!
//! Stateless read-only consumers of record store snapshots:
//! - [`file`] writes a ZIP of CSV sheets to the export directory
//! - [`cloud`] writes a Google Sheets spreadsheet and returns its URL

pub mod cloud;
pub mod file;

pub use cloud::{SheetsClient, SpreadsheetLink};
pub use file::{ExportArchive, FileExporter};
