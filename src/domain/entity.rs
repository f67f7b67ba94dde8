//! Entity kinds and export filters
//!
//! The set of exportable record kinds is fixed; every checkpoint, run and
//! log entry is keyed by one of them.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A kind of CRM record exported independently of the others
///
/// # Examples
///
/// ```
/// use crm_exporter::domain::EntityKind;
/// use std::str::FromStr;
///
/// let kind = EntityKind::from_str("deals").unwrap();
/// assert_eq!(kind.api_path(), "leads");
/// assert_eq!(kind.to_string(), "deals");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Sales deals (`leads` in the CRM API)
    Deals,
    /// Contacts
    Contacts,
    /// Companies
    Companies,
    /// Timeline events
    Events,
}

impl EntityKind {
    /// Every entity kind, in export order
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Deals,
        EntityKind::Contacts,
        EntityKind::Companies,
        EntityKind::Events,
    ];

    /// Stable name used for checkpoint keys, logs and the control surface
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Deals => "deals",
            EntityKind::Contacts => "contacts",
            EntityKind::Companies => "companies",
            EntityKind::Events => "events",
        }
    }

    /// Collection path in the CRM API, also the key under `_embedded`
    pub fn api_path(&self) -> &'static str {
        match self {
            EntityKind::Deals => "leads",
            other => other.as_str(),
        }
    }

    /// Related entities requested alongside each page
    pub fn relations(&self) -> Option<&'static str> {
        match self {
            EntityKind::Deals => Some("contacts"),
            EntityKind::Contacts => Some("leads"),
            EntityKind::Companies => Some("contacts,leads"),
            EntityKind::Events => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deals" | "leads" => Ok(EntityKind::Deals),
            "contacts" => Ok(EntityKind::Contacts),
            "companies" => Ok(EntityKind::Companies),
            "events" => Ok(EntityKind::Events),
            other => Err(format!(
                "Unknown entity '{other}'. Must be one of: deals, contacts, companies, events"
            )),
        }
    }
}

/// Target of a control command: one entity or all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySelector {
    One(EntityKind),
    All,
}

impl EntitySelector {
    /// Expand into the entities the command applies to
    pub fn entities(&self) -> Vec<EntityKind> {
        match self {
            EntitySelector::One(kind) => vec![*kind],
            EntitySelector::All => EntityKind::ALL.to_vec(),
        }
    }
}

impl FromStr for EntitySelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(EntitySelector::All)
        } else {
            s.parse().map(EntitySelector::One)
        }
    }
}

impl fmt::Display for EntitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntitySelector::One(kind) => kind.fmt(f),
            EntitySelector::All => f.write_str("all"),
        }
    }
}

/// Optional inclusive date bounds applied to a run's query or a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
}

impl DateFilter {
    pub fn new(date_from: Option<NaiveDate>, date_to: Option<NaiveDate>) -> Self {
        Self { date_from, date_to }
    }

    pub fn is_empty(&self) -> bool {
        self.date_from.is_none() && self.date_to.is_none()
    }

    /// Rejects ranges whose start lies after their end
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(format!("date_from {from} is after date_to {to}"));
            }
        }
        Ok(())
    }

    /// Start of `date_from` in UTC, as unix seconds
    pub fn from_timestamp(&self) -> Option<i64> {
        self.date_from
            .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)).timestamp())
    }

    /// Last second of `date_to` in UTC, as unix seconds
    pub fn to_timestamp(&self) -> Option<i64> {
        self.date_to.and_then(|d| {
            NaiveTime::from_hms_opt(23, 59, 59)
                .map(|end| Utc.from_utc_datetime(&d.and_time(end)).timestamp())
        })
    }

    /// Whether a unix timestamp falls inside the bounds
    pub fn contains_timestamp(&self, ts: i64) -> bool {
        self.from_timestamp().map_or(true, |from| ts >= from)
            && self.to_timestamp().map_or(true, |to| ts <= to)
    }

    /// Whether a point in time falls inside the bounds
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.contains_timestamp(at.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_round_trip_names() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert_eq!(EntityKind::from_str("LEADS").unwrap(), EntityKind::Deals);
        assert!(EntityKind::from_str("tasks").is_err());
    }

    #[test]
    fn test_entity_serde_lowercase() {
        let json = serde_json::to_string(&EntityKind::Companies).unwrap();
        assert_eq!(json, "\"companies\"");
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(EntitySelector::from_str("all").unwrap(), EntitySelector::All);
        assert_eq!(
            EntitySelector::from_str("events").unwrap(),
            EntitySelector::One(EntityKind::Events)
        );
        assert_eq!(EntitySelector::All.entities().len(), 4);
    }

    #[test]
    fn test_date_filter_bounds_are_inclusive() {
        let filter = DateFilter::new(
            NaiveDate::from_ymd_opt(2024, 1, 1),
            NaiveDate::from_ymd_opt(2024, 1, 31),
        );
        assert_eq!(filter.from_timestamp(), Some(1_704_067_200));
        assert_eq!(filter.to_timestamp(), Some(1_706_745_599));
        assert!(filter.contains_timestamp(1_704_067_200));
        assert!(filter.contains_timestamp(1_706_745_599));
        assert!(!filter.contains_timestamp(1_706_745_600));
    }

    #[test]
    fn test_date_filter_validation() {
        let filter = DateFilter::new(
            NaiveDate::from_ymd_opt(2024, 2, 1),
            NaiveDate::from_ymd_opt(2024, 1, 1),
        );
        assert!(filter.validate().is_err());
        assert!(DateFilter::default().validate().is_ok());
        assert!(DateFilter::default().contains_timestamp(0));
    }
}
