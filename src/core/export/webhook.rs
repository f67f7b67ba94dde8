//! CRM change notifications
//!
//! A notification groups changed records by collection and action:
//!
//! ```json
//! {"leads": {"add": [{"id": 1}], "status": [{"id": 2}]}, "contacts": {"delete": [{"id": 3}]}}
//! ```
//!
//! `add` and every action other than `delete` re-read the record from the CRM
//! by id and upsert it; `delete` removes it from the record store. Custom
//! field changes are only logged. Collections without an exported entity are
//! ignored.

use crate::core::export::machine::ExportContext;
use crate::core::export::retry::with_retry;
use crate::domain::{EntityKind, ExporterError, Record, Result};
use crate::logging::LogSource;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Added,
    Updated,
    Deleted,
}

impl ChangeAction {
    fn from_key(key: &str) -> Self {
        match key {
            "add" => ChangeAction::Added,
            "delete" => ChangeAction::Deleted,
            _ => ChangeAction::Updated,
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeAction::Added => "Added",
            ChangeAction::Updated => "Updated",
            ChangeAction::Deleted => "Deleted",
        })
    }
}

/// Records of one entity touched by one action
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub entity: EntityKind,
    pub action: ChangeAction,
    pub ids: Vec<String>,
}

/// Outcome of one notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookSummary {
    pub upserted: usize,
    pub deleted: usize,
    /// Added or updated ids the CRM no longer returns
    pub missing: usize,
}

/// Collection key in a notification
fn entity_for(collection: &str) -> Option<EntityKind> {
    [EntityKind::Deals, EntityKind::Contacts, EntityKind::Companies]
        .into_iter()
        .find(|entity| entity.api_path() == collection)
}

fn item_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ExporterError::Validation(format!("{what} must be a JSON object")))
}

/// Split a notification into per-entity changes
///
/// # Errors
///
/// `Validation` when the payload is empty or not shaped as collections of
/// actions.
pub fn parse_notification(payload: &Value) -> Result<Vec<Change>> {
    let collections = as_object(payload, "webhook payload")?;
    if collections.is_empty() {
        return Err(ExporterError::Validation("empty webhook payload".to_string()));
    }

    let mut changes = Vec::new();
    for (collection, actions) in collections {
        let Some(entity) = entity_for(collection) else {
            continue;
        };

        for (key, items) in as_object(actions, collection)? {
            let ids: Vec<String> = items
                .as_array()
                .map(|items| items.iter().filter_map(item_id).collect())
                .unwrap_or_default();
            if ids.is_empty() {
                continue;
            }
            changes.push(Change {
                entity,
                action: ChangeAction::from_key(key),
                ids,
            });
        }
    }
    Ok(changes)
}

/// Custom field names per action, for the operator log
fn custom_field_changes(payload: &Value) -> Vec<(ChangeAction, String)> {
    let Some(actions) = payload.get("custom_fields").and_then(Value::as_object) else {
        return Vec::new();
    };

    actions
        .iter()
        .filter_map(|(key, items)| Some((ChangeAction::from_key(key), items.as_array()?)))
        .flat_map(|(action, items)| {
            items.iter().map(move |field| {
                let name = field.get("name").and_then(Value::as_str).unwrap_or("unnamed");
                (action, name.to_string())
            })
        })
        .collect()
}

/// Apply a notification to the record store
///
/// Lookups retry transient CRM failures with the export policy. Changes
/// applied before a failure stay applied; the CRM redelivers the whole
/// notification and every step is idempotent.
pub async fn ingest(ctx: &ExportContext, payload: &Value) -> Result<WebhookSummary> {
    let changes = parse_notification(payload)?;
    let fields = custom_field_changes(payload);

    ctx.events.info(
        LogSource::Webhook,
        format!("Received webhook: {} changes", changes.len() + fields.len()),
    );
    for (action, name) in fields {
        ctx.events.info(LogSource::Webhook, format!("{action} custom field: {name}"));
    }

    let mut summary = WebhookSummary::default();
    for change in changes {
        match change.action {
            ChangeAction::Deleted => {
                summary.deleted += ctx.dispatcher.remove(change.entity, &change.ids).await?;
                for id in &change.ids {
                    ctx.events
                        .info(change.entity, format!("Deleted {} with ID {id}", change.entity));
                }
            }
            ChangeAction::Added | ChangeAction::Updated => {
                let records = refetch(ctx, change.entity, &change.ids).await?;
                summary.missing += change.ids.len() - records.len();
                summary.upserted += ctx.dispatcher.dispatch(change.entity, &records).await?;
                for record in &records {
                    ctx.events.info(
                        change.entity,
                        format!("{} {} with ID {}", change.action, change.entity, record.id()),
                    );
                }
            }
        }
    }

    tracing::info!(
        upserted = summary.upserted,
        deleted = summary.deleted,
        missing = summary.missing,
        "Webhook applied"
    );
    Ok(summary)
}

async fn refetch(ctx: &ExportContext, entity: EntityKind, ids: &[String]) -> Result<Vec<Record>> {
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        let found = with_retry(&ctx.policy, || ctx.fetcher.fetch_record(entity, id)).await?;
        match found {
            Some(record) => records.push(record),
            None => tracing::debug!(entity = %entity, record_id = %id, "Changed record not found in CRM"),
        }
    }
    Ok(records)
}
