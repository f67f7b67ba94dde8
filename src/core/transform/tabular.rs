//! Tabular conversion of records
//!
//! Turns nested CRM records into flat rows for spreadsheet sinks:
//! - `_links.self.href` becomes `link_url`
//! - each `custom_fields_values` entry becomes a `custom_{name}_{id}` column
//! - unix timestamp fields become `YYYY-MM-DD HH:MM:SS` (UTC)
//! - remaining nested values are JSON-encoded, nulls are empty

use crate::domain::Record;
use chrono::DateTime;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

const TIMESTAMP_FIELDS: [&str; 4] = ["created_at", "updated_at", "closed_at", "closest_task_at"];

/// Field types holding exactly one meaningful value
const SINGLE_VALUE_TYPES: [&str; 7] = [
    "select", "text", "numeric", "date", "datetime", "checkbox", "url",
];

/// Header row plus one row of cells per record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header followed by data rows
    pub fn into_rows(self) -> Vec<Vec<String>> {
        let mut all = Vec::with_capacity(self.rows.len() + 1);
        all.push(self.headers);
        all.extend(self.rows);
        all
    }
}

/// Convert records to a table with sorted headers
///
/// Columns are the union over all records; missing cells are empty.
pub fn to_table(records: &[Record]) -> Table {
    let flattened: Vec<BTreeMap<String, String>> = records.iter().map(flatten_record).collect();

    let headers: Vec<String> = flattened
        .iter()
        .flat_map(|row| row.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let rows = flattened
        .into_iter()
        .map(|mut row| {
            headers
                .iter()
                .map(|h| row.remove(h).unwrap_or_default())
                .collect()
        })
        .collect();

    Table { headers, rows }
}

/// Flatten one record to column name → cell text
pub fn flatten_record(record: &Record) -> BTreeMap<String, String> {
    let mut row = BTreeMap::new();

    for (key, value) in record.fields() {
        match key.as_str() {
            "_links" => {
                if let Some(href) = self_link(value) {
                    row.insert("link_url".to_string(), href);
                }
            }
            "custom_fields_values" => {
                for (column, cell) in custom_field_columns(value) {
                    row.insert(column, cell);
                }
            }
            k if TIMESTAMP_FIELDS.contains(&k) => {
                row.insert(key.clone(), format_timestamp(value));
            }
            _ => {
                row.insert(key.clone(), cell_text(value));
            }
        }
    }

    row
}

fn self_link(links: &Value) -> Option<String> {
    let parsed;
    // Some exports store `_links` as an encoded string
    let links = match links {
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s).ok()?;
            &parsed
        }
        other => other,
    };
    links
        .get("self")?
        .get("href")?
        .as_str()
        .map(str::to_string)
}

fn custom_field_columns(value: &Value) -> Vec<(String, String)> {
    let parsed;
    let fields = match value {
        Value::Array(fields) => fields,
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(fields)) => {
                parsed = fields;
                &parsed
            }
            _ => {
                tracing::debug!("custom_fields_values is not a JSON list; skipped");
                return Vec::new();
            }
        },
        _ => return Vec::new(),
    };

    fields
        .iter()
        .filter_map(Value::as_object)
        .filter_map(custom_field_column)
        .collect()
}

fn custom_field_column(field: &Map<String, Value>) -> Option<(String, String)> {
    let name = field.get("field_name").and_then(Value::as_str).filter(|s| !s.is_empty())?;
    let id = field.get("field_id").filter(|v| !v.is_null()).map(cell_text)?;
    let values = field.get("values").and_then(Value::as_array).filter(|v| !v.is_empty())?;
    let field_type = field.get("field_type").and_then(Value::as_str).unwrap_or_default();

    let entries = values.iter().filter_map(|v| v.get("value"));
    let cell = if SINGLE_VALUE_TYPES.contains(&field_type) {
        values
            .first()
            .and_then(|v| v.get("value"))
            .map(cell_text)
            .unwrap_or_default()
    } else {
        // multiselect and unknown types keep every value
        entries.map(cell_text).collect::<Vec<_>>().join(", ")
    };

    Some((format!("custom_{name}_{id}"), cell))
}

fn format_timestamp(value: &Value) -> String {
    value
        .as_i64()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| cell_text(value))
}

/// Render a JSON value as cell text
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}
