//! Constraint persistence, projection, update and delete.

use crate::constraint::validate;
use crate::model::constraint::{BlockPolicy, Constraint, ConstraintKind, TripConfig};
use crate::model::event::{CanonicalEvent, EventSource, EventStatus, Transparency};
use crate::model::journal::{ChangeType, ConflictType, JournalEntry};
use crate::model::mirror::EventMirror;
use crate::{time, TminusError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

fn row_to_constraint(row: &Row) -> rusqlite::Result<Constraint> {
    let kind_str: String = row.get("kind")?;
    let config_str: String = row.get("config_json")?;
    Ok(Constraint {
        constraint_id: row.get("constraint_id")?,
        kind: ConstraintKind::parse(&kind_str).expect("stored constraint kind is always valid"),
        config_json: serde_json::from_str(&config_str).unwrap_or(serde_json::Value::Null),
        active_from: row.get("active_from")?,
        active_to: row.get("active_to")?,
        derived_event_id: row.get("derived_event_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SELECT_COLUMNS: &str =
    "constraint_id, kind, config_json, active_from, active_to, derived_event_id, created_at, updated_at";

pub fn get_constraint(conn: &Connection, constraint_id: &str) -> Result<Option<Constraint>, TminusError> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM constraints WHERE constraint_id = ?1"),
        params![constraint_id],
        row_to_constraint,
    )
    .optional()
    .map_err(TminusError::from)
}

pub fn list_constraints(conn: &Connection) -> Result<Vec<Constraint>, TminusError> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM constraints ORDER BY created_at ASC"))?;
    let rows = stmt.query_map([], row_to_constraint)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn row_to_event_mirror(row: &Row) -> rusqlite::Result<EventMirror> {
    let state: String = row.get("state")?;
    Ok(EventMirror {
        mirror_id: row.get("mirror_id")?,
        canonical_event_id: row.get("canonical_event_id")?,
        target_account_id: row.get("target_account_id")?,
        target_calendar_id: row.get("target_calendar_id")?,
        provider_event_id: row.get("provider_event_id")?,
        state: crate::model::mirror::MirrorState::parse(&state).unwrap_or(crate::model::mirror::MirrorState::Pending),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn mirrors_for_event(conn: &Connection, canonical_event_id: &str) -> Result<Vec<EventMirror>, TminusError> {
    let mut stmt = conn.prepare(
        "SELECT mirror_id, canonical_event_id, target_account_id, target_calendar_id, \
         provider_event_id, state, created_at, updated_at FROM event_mirrors WHERE canonical_event_id = ?1",
    )?;
    let rows = stmt.query_map(params![canonical_event_id], row_to_event_mirror)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn insert_constraint_row(conn: &Connection, c: &Constraint) -> Result<(), TminusError> {
    conn.execute(
        "INSERT INTO constraints (constraint_id, kind, config_json, active_from, active_to, derived_event_id, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            c.constraint_id,
            c.kind.as_str(),
            c.config_json.to_string(),
            c.active_from,
            c.active_to,
            c.derived_event_id,
            c.created_at,
            c.updated_at,
        ],
    )?;
    Ok(())
}

/// Title for a trip's derived event, per `block_policy`.
fn trip_derived_title(cfg: &TripConfig) -> String {
    match cfg.block_policy {
        BlockPolicy::Busy => "Busy".to_string(),
        BlockPolicy::Title => cfg.name.clone(),
    }
}

fn insert_derived_event(
    conn: &Connection,
    constraint_id: &str,
    title: String,
    start_ts: &str,
    end_ts: &str,
    timezone: &str,
    reason: &str,
) -> Result<CanonicalEvent, TminusError> {
    let now = time::now_iso();
    let mut markers = BTreeMap::new();
    markers.insert("title".to_string(), "tminus".to_string());
    markers.insert("start_ts".to_string(), "tminus".to_string());
    markers.insert("end_ts".to_string(), "tminus".to_string());

    let event = CanonicalEvent {
        canonical_event_id: time::new_id(),
        origin_account_id: "internal".to_string(),
        origin_event_id: format!("constraint:{constraint_id}"),
        title: Some(title),
        description: None,
        location: None,
        start_ts: start_ts.to_string(),
        end_ts: end_ts.to_string(),
        timezone: Some(timezone.to_string()),
        status: EventStatus::Confirmed,
        visibility: None,
        transparency: Transparency::Opaque,
        all_day: false,
        recurrence_rule: None,
        source: EventSource::System,
        version: 1,
        constraint_id: Some(constraint_id.to_string()),
        markers,
        created_at: now.clone(),
        updated_at: now.clone(),
    };

    conn.execute(
        "INSERT INTO canonical_events
         (canonical_event_id, origin_account_id, origin_event_id, title, description, location,
          start_ts, end_ts, timezone, status, visibility, transparency, all_day, recurrence_rule,
          source, version, constraint_id, markers_json, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
        params![
            event.canonical_event_id,
            event.origin_account_id,
            event.origin_event_id,
            event.title,
            event.description,
            event.location,
            event.start_ts,
            event.end_ts,
            event.timezone,
            event.status.as_str(),
            event.visibility,
            event.transparency.as_str(),
            event.all_day as i64,
            event.recurrence_rule,
            event.source.as_str(),
            event.version,
            event.constraint_id,
            serde_json::to_string(&event.markers).unwrap_or_default(),
            event.created_at,
            event.updated_at,
        ],
    )?;

    let entry = JournalEntry {
        journal_id: time::new_id(),
        canonical_event_id: event.canonical_event_id.clone(),
        ts: now,
        actor: "tminus".to_string(),
        change_type: ChangeType::Created,
        reason: Some(reason.to_string()),
        patch_json: Some(serde_json::json!({"constraint_id": constraint_id})),
        conflict_type: ConflictType::None,
        resolution: None,
    };
    conn.execute(
        "INSERT INTO event_journal
         (journal_id, canonical_event_id, ts, actor, change_type, reason, patch_json, conflict_type, resolution_json)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            entry.journal_id,
            entry.canonical_event_id,
            entry.ts,
            entry.actor,
            entry.change_type.as_str(),
            entry.reason,
            entry.patch_json.as_ref().map(|v| v.to_string()),
            entry.conflict_type.as_str(),
            Option::<String>::None,
        ],
    )?;

    Ok(event)
}

fn delete_derived_event(
    conn: &Connection,
    canonical_event_id: &str,
    constraint_id: &str,
    reason: &str,
) -> Result<(), TminusError> {
    conn.execute(
        "DELETE FROM canonical_events WHERE canonical_event_id = ?1",
        params![canonical_event_id],
    )?;
    let entry = JournalEntry {
        journal_id: time::new_id(),
        canonical_event_id: canonical_event_id.to_string(),
        ts: time::now_iso(),
        actor: "tminus".to_string(),
        change_type: ChangeType::Deleted,
        reason: Some(reason.to_string()),
        patch_json: Some(serde_json::json!({"constraint_id": constraint_id})),
        conflict_type: ConflictType::None,
        resolution: None,
    };
    conn.execute(
        "INSERT INTO event_journal
         (journal_id, canonical_event_id, ts, actor, change_type, reason, patch_json, conflict_type, resolution_json)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            entry.journal_id,
            entry.canonical_event_id,
            entry.ts,
            entry.actor,
            entry.change_type.as_str(),
            entry.reason,
            entry.patch_json.as_ref().map(|v| v.to_string()),
            entry.conflict_type.as_str(),
            Option::<String>::None,
        ],
    )?;
    Ok(())
}

/// Validate, persist, and (for variants that declare derived events)
/// project. Must run inside a caller-managed transaction.
pub fn add_constraint(
    conn: &Connection,
    kind: ConstraintKind,
    config_json: serde_json::Value,
    active_from: Option<String>,
    active_to: Option<String>,
) -> Result<Constraint, TminusError> {
    validate::validate_config(kind, &config_json)?;

    let now = time::now_iso();
    let constraint_id = time::new_id();
    let mut constraint = Constraint {
        constraint_id: constraint_id.clone(),
        kind,
        config_json: config_json.clone(),
        active_from,
        active_to,
        derived_event_id: None,
        created_at: now.clone(),
        updated_at: now,
    };

    if kind.projects_derived_event() {
        let cfg: TripConfig = serde_json::from_value(config_json)
            .map_err(|e| TminusError::InvalidConstraintConfig(e.to_string()))?;
        let start = constraint
            .active_from
            .clone()
            .ok_or_else(|| TminusError::InvalidConstraintConfig("active_from required for trip".to_string()))?;
        let end = constraint
            .active_to
            .clone()
            .ok_or_else(|| TminusError::InvalidConstraintConfig("active_to required for trip".to_string()))?;
        let title = trip_derived_title(&cfg);
        let event = insert_derived_event(conn, &constraint_id, title, &start, &end, &cfg.timezone, "trip_constraint")?;
        constraint.derived_event_id = Some(event.canonical_event_id);
    }

    insert_constraint_row(conn, &constraint)?;
    Ok(constraint)
}

pub struct ConstraintUpdateOutcome {
    pub constraint: Constraint,
    pub mirrors_to_cleanup: Vec<EventMirror>,
}

/// Update a constraint's config/window. For variants with derived events,
/// deletes the old derived event and projects a new one.
pub fn update_constraint(
    conn: &Connection,
    constraint_id: &str,
    config_json: serde_json::Value,
    active_from: Option<String>,
    active_to: Option<String>,
) -> Result<ConstraintUpdateOutcome, TminusError> {
    let mut existing = get_constraint(conn, constraint_id)?
        .ok_or_else(|| TminusError::NotFound(format!("constraint {constraint_id}")))?;
    validate::validate_config(existing.kind, &config_json)?;

    let mut mirrors_to_cleanup = Vec::new();

    if existing.kind.projects_derived_event() {
        if let Some(old_event_id) = existing.derived_event_id.clone() {
            mirrors_to_cleanup = mirrors_for_event(conn, &old_event_id)?;
            delete_derived_event(conn, &old_event_id, constraint_id, "constraint_deleted")?;
        }

        let cfg: TripConfig = serde_json::from_value(config_json.clone())
            .map_err(|e| TminusError::InvalidConstraintConfig(e.to_string()))?;
        let start = active_from
            .clone()
            .or_else(|| existing.active_from.clone())
            .ok_or_else(|| TminusError::InvalidConstraintConfig("active_from required for trip".to_string()))?;
        let end = active_to
            .clone()
            .or_else(|| existing.active_to.clone())
            .ok_or_else(|| TminusError::InvalidConstraintConfig("active_to required for trip".to_string()))?;
        let title = trip_derived_title(&cfg);
        let event = insert_derived_event(conn, constraint_id, title, &start, &end, &cfg.timezone, "trip_constraint")?;
        existing.derived_event_id = Some(event.canonical_event_id);
    }

    existing.config_json = config_json;
    existing.active_from = active_from.or(existing.active_from);
    existing.active_to = active_to.or(existing.active_to);
    existing.updated_at = time::now_iso();

    conn.execute(
        "UPDATE constraints SET config_json = ?1, active_from = ?2, active_to = ?3, derived_event_id = ?4, updated_at = ?5
         WHERE constraint_id = ?6",
        params![
            existing.config_json.to_string(),
            existing.active_from,
            existing.active_to,
            existing.derived_event_id,
            existing.updated_at,
            constraint_id,
        ],
    )?;

    Ok(ConstraintUpdateOutcome {
        constraint: existing,
        mirrors_to_cleanup,
    })
}

/// Delete a constraint and clean up any derived event (same cleanup as the
/// destruction half of an update).
pub fn delete_constraint(conn: &Connection, constraint_id: &str) -> Result<Vec<EventMirror>, TminusError> {
    let existing = get_constraint(conn, constraint_id)?
        .ok_or_else(|| TminusError::NotFound(format!("constraint {constraint_id}")))?;

    let mut mirrors_to_cleanup = Vec::new();
    if let Some(event_id) = existing.derived_event_id {
        mirrors_to_cleanup = mirrors_for_event(conn, &event_id)?;
        delete_derived_event(conn, &event_id, constraint_id, "constraint_deleted")?;
    }

    conn.execute("DELETE FROM constraints WHERE constraint_id = ?1", params![constraint_id])?;
    Ok(mirrors_to_cleanup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migration};
    use serde_json::json;

    fn conn() -> Connection {
        let mut conn = db::connect_memory().unwrap();
        migration::ensure_migrated(&mut conn).unwrap();
        conn
    }

    #[test]
    fn s4_trip_projection_and_policy_update() {
        let conn = conn();
        let constraint = add_constraint(
            &conn,
            ConstraintKind::Trip,
            json!({"name":"NYC","timezone":"UTC","block_policy":"BUSY"}),
            Some("2026-03-10T00:00:00Z".to_string()),
            Some("2026-03-12T23:59:59Z".to_string()),
        )
        .unwrap();

        let derived_id = constraint.derived_event_id.clone().unwrap();
        let event = crate::store::get_event(&conn, &derived_id).unwrap().unwrap();
        assert_eq!(event.origin_account_id, "internal");
        assert_eq!(event.source.as_str(), "system");
        assert_eq!(event.title.as_deref(), Some("Busy"));

        let outcome = update_constraint(
            &conn,
            &constraint.constraint_id,
            json!({"name":"NYC","timezone":"UTC","block_policy":"TITLE"}),
            None,
            None,
        )
        .unwrap();

        assert!(crate::store::get_event(&conn, &derived_id).unwrap().is_none());
        let new_event = crate::store::get_event(&conn, outcome.constraint.derived_event_id.as_ref().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(new_event.title.as_deref(), Some("NYC"));

        let deleted_patch: String = conn
            .query_row(
                "SELECT patch_json FROM event_journal WHERE canonical_event_id = ?1 AND reason = 'constraint_deleted'",
                params![derived_id],
                |r| r.get(0),
            )
            .unwrap();
        let deleted_patch: serde_json::Value = serde_json::from_str(&deleted_patch).unwrap();
        assert_eq!(deleted_patch["constraint_id"], constraint.constraint_id);
    }

    #[test]
    fn working_hours_has_no_derived_event() {
        let conn = conn();
        let constraint = add_constraint(
            &conn,
            ConstraintKind::WorkingHours,
            json!({"days":[1,2,3,4,5],"start_time":"09:00","end_time":"17:00","timezone":"UTC"}),
            None,
            None,
        )
        .unwrap();
        assert!(constraint.derived_event_id.is_none());
    }

    #[test]
    fn delete_constraint_removes_derived_event() {
        let conn = conn();
        let constraint = add_constraint(
            &conn,
            ConstraintKind::Trip,
            json!({"name":"SF","timezone":"UTC","block_policy":"BUSY"}),
            Some("2026-04-01T00:00:00Z".to_string()),
            Some("2026-04-02T00:00:00Z".to_string()),
        )
        .unwrap();
        let derived_id = constraint.derived_event_id.unwrap();
        delete_constraint(&conn, &constraint.constraint_id).unwrap();
        assert!(crate::store::get_event(&conn, &derived_id).unwrap().is_none());
        assert!(get_constraint(&conn, &constraint.constraint_id).unwrap().is_none());
    }
}
