//! Authority & conflict engine — the two pure functions that
//! govern field-level provenance, plus conflict detection over a patch.

use crate::model::event::{provider_authority, CanonicalEvent, EventFieldPatch, FieldConflict, TRACKED_FIELDS};
use std::collections::BTreeMap;

/// For every tracked field with a non-null value, mark `provider:<account>`.
pub fn build_markers_for_insert(account: &str, event: &CanonicalEvent) -> BTreeMap<String, String> {
    let mut markers = BTreeMap::new();
    for field in TRACKED_FIELDS {
        if field_has_value(event, field) {
            markers.insert(field.to_string(), provider_authority(account));
        }
    }
    markers
}

fn field_has_value(event: &CanonicalEvent, field: &str) -> bool {
    match field {
        "title" => event.title.is_some(),
        "description" => event.description.is_some(),
        "location" => event.location.is_some(),
        "start_ts" => true,
        "end_ts" => true,
        "timezone" => event.timezone.is_some(),
        "status" => true,
        "visibility" => event.visibility.is_some(),
        "transparency" => true,
        "all_day" => true,
        "recurrence_rule" => event.recurrence_rule.is_some(),
        _ => false,
    }
}

/// For every tracked field present and non-null in `patch`, overwrite the
/// marker to `provider:<account>`; retain all others untouched.
pub fn update_markers(
    current: &BTreeMap<String, String>,
    account: &str,
    patch: &EventFieldPatch,
) -> BTreeMap<String, String> {
    let mut next = current.clone();
    for field in patch.touched_fields() {
        next.insert(field.to_string(), provider_authority(account));
    }
    next
}

fn patch_field_string(patch: &EventFieldPatch, field: &str) -> Option<String> {
    match field {
        "title" => patch.title.clone(),
        "description" => patch.description.clone(),
        "location" => patch.location.clone(),
        "start_ts" => patch.start_ts.clone(),
        "end_ts" => patch.end_ts.clone(),
        "timezone" => patch.timezone.clone(),
        "status" => patch.status.map(|s| s.as_str().to_string()),
        "visibility" => patch.visibility.clone(),
        "transparency" => patch.transparency.map(|t| t.as_str().to_string()),
        "all_day" => patch.all_day.map(|b| b.to_string()),
        "recurrence_rule" => patch.recurrence_rule.clone(),
        _ => None,
    }
}

fn current_field_string(event: &CanonicalEvent, field: &str) -> Option<String> {
    match field {
        "title" => event.title.clone(),
        "description" => event.description.clone(),
        "location" => event.location.clone(),
        "start_ts" => Some(event.start_ts.clone()),
        "end_ts" => Some(event.end_ts.clone()),
        "timezone" => event.timezone.clone(),
        "status" => Some(event.status.as_str().to_string()),
        "visibility" => event.visibility.clone(),
        "transparency" => Some(event.transparency.as_str().to_string()),
        "all_day" => Some(event.all_day.to_string()),
        "recurrence_rule" => event.recurrence_rule.clone(),
        _ => None,
    }
}

/// Detect field conflicts between the current row and an incoming patch
/// from `account`. A conflict is a touched field whose current authority
/// is not `provider:<account>` AND whose post-write value differs from the
/// current value.
pub fn detect_conflicts(
    current: &CanonicalEvent,
    effective_markers: &BTreeMap<String, String>,
    account: &str,
    patch: &EventFieldPatch,
) -> Vec<FieldConflict> {
    let incoming_authority = provider_authority(account);
    let mut conflicts = Vec::new();

    for field in patch.touched_fields() {
        let current_authority = effective_markers
            .get(field)
            .cloned()
            .unwrap_or_else(|| incoming_authority.clone());
        if current_authority == incoming_authority {
            continue;
        }
        let old_value = current_field_string(current, field);
        let new_value = patch_field_string(patch, field);
        if old_value == new_value {
            continue;
        }
        conflicts.push(FieldConflict {
            field: field.to_string(),
            current_authority,
            incoming_authority: incoming_authority.clone(),
            old_value,
            new_value,
        });
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::{EventSource, EventStatus, Transparency};

    fn sample_event() -> CanonicalEvent {
        CanonicalEvent {
            canonical_event_id: "evt_1".into(),
            origin_account_id: "A".into(),
            origin_event_id: "ev_a1".into(),
            title: Some("Morning Standup".into()),
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
            markers: BTreeMap::new(),
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn s1_conflict_scenario() {
        let mut event = sample_event();
        let mut markers = build_markers_for_insert("A", &event);
        markers.insert("title".to_string(), "tminus".to_string());
        event.markers = markers.clone();

        let patch = EventFieldPatch {
            title: Some("Provider Override Title".into()),
            ..Default::default()
        };

        let conflicts = detect_conflicts(&event, &markers, "A", &patch);
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.field, "title");
        assert_eq!(c.current_authority, "tminus");
        assert_eq!(c.incoming_authority, "provider:A");
        assert_eq!(c.old_value.as_deref(), Some("Morning Standup"));
        assert_eq!(c.new_value.as_deref(), Some("Provider Override Title"));

        let updated = update_markers(&markers, "A", &patch);
        assert_eq!(updated.get("title"), Some(&"provider:A".to_string()));
    }

    #[test]
    fn no_conflict_when_same_authority() {
        let event = sample_event();
        let markers = build_markers_for_insert("A", &event);
        let patch = EventFieldPatch {
            title: Some("Updated by same account".into()),
            ..Default::default()
        };
        let conflicts = detect_conflicts(&event, &markers, "A", &patch);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn no_conflict_when_value_unchanged() {
        let mut event = sample_event();
        let mut markers = build_markers_for_insert("A", &event);
        markers.insert("title".to_string(), "tminus".to_string());
        event.markers = markers.clone();

        let patch = EventFieldPatch {
            title: Some("Morning Standup".into()),
            ..Default::default()
        };
        let conflicts = detect_conflicts(&event, &markers, "A", &patch);
        assert!(conflicts.is_empty());
    }
}
