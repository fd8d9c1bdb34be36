//! Canonical event and its authority markers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of field names the authority engine tracks. Kept as a
/// compile-time constant, avoiding type-erased values behind a generic bag,
/// rather than an open `HashMap<String, Value>`.
pub const TRACKED_FIELDS: &[&str] = &[
    "title",
    "description",
    "location",
    "start_ts",
    "end_ts",
    "timezone",
    "status",
    "visibility",
    "transparency",
    "all_day",
    "recurrence_rule",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Confirmed => "confirmed",
            EventStatus::Tentative => "tentative",
            EventStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(EventStatus::Confirmed),
            "tentative" => Some(EventStatus::Tentative),
            "cancelled" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transparency {
    Opaque,
    Transparent,
}

impl Transparency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transparency::Opaque => "opaque",
            Transparency::Transparent => "transparent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "opaque" => Some(Transparency::Opaque),
            "transparent" => Some(Transparency::Transparent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Provider,
    IcsFeed,
    System,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Provider => "provider",
            EventSource::IcsFeed => "ics_feed",
            EventSource::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provider" => Some(EventSource::Provider),
            "ics_feed" => Some(EventSource::IcsFeed),
            "system" => Some(EventSource::System),
            _ => None,
        }
    }
}

/// `provider:<account>` or `tminus`. Stored as a plain string in the
/// markers map so it serializes losslessly to JSON; parsed on demand.
pub type Authority = String;

pub fn provider_authority(account_id: &str) -> Authority {
    format!("provider:{account_id}")
}

pub const LOCAL_AUTHORITY: &str = "tminus";

/// The full in-memory representation of one canonical event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub canonical_event_id: String,
    pub origin_account_id: String,
    pub origin_event_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_ts: String,
    pub end_ts: String,
    pub timezone: Option<String>,
    pub status: EventStatus,
    pub visibility: Option<String>,
    pub transparency: Transparency,
    pub all_day: bool,
    pub recurrence_rule: Option<String>,
    pub source: EventSource,
    pub version: i64,
    pub constraint_id: Option<String>,
    /// field name -> authority string, present only for tracked fields
    /// whose current value is non-null.
    pub markers: BTreeMap<String, Authority>,
    pub created_at: String,
    pub updated_at: String,
}

impl CanonicalEvent {
    /// Read-time backward compatibility: a legacy event with an
    /// empty marker map is treated as if every non-null tracked field is
    /// owned by its current origin account.
    pub fn effective_markers(&self) -> BTreeMap<String, Authority> {
        if !self.markers.is_empty() {
            return self.markers.clone();
        }
        let mut out = BTreeMap::new();
        for field in TRACKED_FIELDS {
            if self.field_is_non_null(field) {
                out.insert(field.to_string(), provider_authority(&self.origin_account_id));
            }
        }
        out
    }

    fn field_is_non_null(&self, field: &str) -> bool {
        match field {
            "title" => self.title.is_some(),
            "description" => self.description.is_some(),
            "location" => self.location.is_some(),
            "start_ts" => true,
            "end_ts" => true,
            "timezone" => self.timezone.is_some(),
            "status" => true,
            "visibility" => self.visibility.is_some(),
            "transparency" => true,
            "all_day" => true,
            "recurrence_rule" => self.recurrence_rule.is_some(),
            _ => false,
        }
    }
}

/// Patch describing an incoming provider delta. Fields set to `Some(None)`
/// are distinguished from "not present" by the caller constructing this
/// from a JSON body (absent key vs. explicit null) — at the Rust layer we
/// model "present" as `Some(_)` and omit untouched fields entirely, so a
/// plain `Option<T>` suffices: `None` means "not present in this delta".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFieldPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_ts: Option<String>,
    pub end_ts: Option<String>,
    pub timezone: Option<String>,
    pub status: Option<EventStatus>,
    pub visibility: Option<String>,
    pub transparency: Option<Transparency>,
    pub all_day: Option<bool>,
    pub recurrence_rule: Option<String>,
}

impl EventFieldPatch {
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.title.is_some() {
            out.push("title");
        }
        if self.description.is_some() {
            out.push("description");
        }
        if self.location.is_some() {
            out.push("location");
        }
        if self.start_ts.is_some() {
            out.push("start_ts");
        }
        if self.end_ts.is_some() {
            out.push("end_ts");
        }
        if self.timezone.is_some() {
            out.push("timezone");
        }
        if self.status.is_some() {
            out.push("status");
        }
        if self.visibility.is_some() {
            out.push("visibility");
        }
        if self.transparency.is_some() {
            out.push("transparency");
        }
        if self.all_day.is_some() {
            out.push("all_day");
        }
        if self.recurrence_rule.is_some() {
            out.push("recurrence_rule");
        }
        out
    }
}

/// `created | updated | deleted | cancelled` provider delta kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    Created,
    Updated,
    Deleted,
    Cancelled,
}

/// A single field-level conflict surfaced by the authority engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub current_authority: String,
    pub incoming_authority: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(markers: BTreeMap<String, Authority>) -> CanonicalEvent {
        CanonicalEvent {
            canonical_event_id: "evt_1".into(),
            origin_account_id: "acct_a".into(),
            origin_event_id: "ev_a1".into(),
            title: Some("Standup".into()),
            description: None,
            location: None,
            start_ts: "2026-01-01T09:00:00Z".into(),
            end_ts: "2026-01-01T09:30:00Z".into(),
            timezone: None,
            status: EventStatus::Confirmed,
            visibility: None,
            transparency: Transparency::Opaque,
            all_day: false,
            recurrence_rule: None,
            source: EventSource::Provider,
            version: 1,
            constraint_id: None,
            markers,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn effective_markers_backfills_legacy_rows() {
        let event = sample_event(BTreeMap::new());
        let markers = event.effective_markers();
        assert_eq!(markers.get("title"), Some(&"provider:acct_a".to_string()));
        assert!(!markers.contains_key("description"));
    }

    #[test]
    fn effective_markers_passes_through_real_markers() {
        let mut markers = BTreeMap::new();
        markers.insert("title".to_string(), LOCAL_AUTHORITY.to_string());
        let event = sample_event(markers.clone());
        assert_eq!(event.effective_markers(), markers);
    }

    #[test]
    fn touched_fields_reports_only_present_values() {
        let patch = EventFieldPatch {
            title: Some("New Title".into()),
            ..Default::default()
        };
        assert_eq!(patch.touched_fields(), vec!["title"]);
    }
}
