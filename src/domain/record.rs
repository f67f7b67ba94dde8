//! CRM record model
//!
//! A record is an opaque JSON object as returned by the CRM. The only field the
//! exporter relies on is its `id`, which keys the idempotent upsert.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One externally sourced CRM record
///
/// # Examples
///
/// ```
/// use crm_exporter::domain::Record;
/// use serde_json::json;
///
/// let record = Record::from_value(json!({"id": 42, "name": "ACME"})).unwrap();
/// assert_eq!(record.id(), "42");
/// assert_eq!(record.get("name"), Some(&json!("ACME")));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Record {
    id: String,
    data: Map<String, Value>,
}

impl Record {
    /// Build a record from a JSON value
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object or has no usable `id`.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(data) = value else {
            return Err("record is not a JSON object".to_string());
        };

        let id = match data.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => return Err(format!("record id has unsupported value {other}")),
            None => return Err("record has no id field".to_string()),
        };

        Ok(Self { id, data })
    }

    /// Stable unique id within the entity
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Unix seconds of the last modification, falling back to creation time
    pub fn modified_at(&self) -> Option<i64> {
        self.timestamp_field("updated_at")
            .or_else(|| self.timestamp_field("created_at"))
    }

    fn timestamp_field(&self, key: &str) -> Option<i64> {
        match self.data.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

impl TryFrom<Value> for Record {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Record::from_value(value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}
