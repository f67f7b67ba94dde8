//! Record transformation for spreadsheet sinks
//!
//! Stored records stay in their original nested form. Sinks that need rows
//! convert them with [`to_table`].

pub mod tabular;

pub use tabular::{cell_text, flatten_record, to_table, Table};
