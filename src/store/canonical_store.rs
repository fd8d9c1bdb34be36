//! Canonical event store: upsert-from-delta, delete, read,
//! list, and journal insertion. Row-mapping style follows decapod's
//! `core::obligation` (`query_row`/`query_map` over a single flat table).

use crate::model::event::{
    CanonicalEvent, DeltaKind, EventFieldPatch, EventSource, EventStatus, Transparency,
};
use crate::model::journal::{ChangeType, ConflictType, JournalEntry};
use crate::store::authority;
use crate::{time, TminusError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

/// One provider-originated change to apply to the canonical store.
#[derive(Debug, Clone)]
pub struct ProviderDelta {
    pub origin_account_id: String,
    pub origin_event_id: String,
    pub kind: DeltaKind,
    /// For `created`, every essential field the provider supplied; for
    /// `updated`/`cancelled`, only the fields that changed.
    pub fields: EventFieldPatch,
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub event: CanonicalEvent,
    pub journal_entries: Vec<JournalEntry>,
}

pub struct EventFilter {
    pub account_id: Option<String>,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            account_id: None,
            window_start: None,
            window_end: None,
            limit: 100,
            offset: 0,
        }
    }
}

fn row_to_event(row: &Row) -> rusqlite::Result<CanonicalEvent> {
    let status_str: String = row.get("status")?;
    let transparency_str: String = row.get("transparency")?;
    let source_str: String = row.get("source")?;
    let markers_json: String = row.get("markers_json")?;
    let markers: BTreeMap<String, String> = serde_json::from_str(&markers_json).unwrap_or_default();

    Ok(CanonicalEvent {
        canonical_event_id: row.get("canonical_event_id")?,
        origin_account_id: row.get("origin_account_id")?,
        origin_event_id: row.get("origin_event_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        location: row.get("location")?,
        start_ts: row.get("start_ts")?,
        end_ts: row.get("end_ts")?,
        timezone: row.get("timezone")?,
        status: EventStatus::parse(&status_str).unwrap_or(EventStatus::Confirmed),
        visibility: row.get("visibility")?,
        transparency: Transparency::parse(&transparency_str).unwrap_or(Transparency::Opaque),
        all_day: row.get::<_, i64>("all_day")? != 0,
        recurrence_rule: row.get("recurrence_rule")?,
        source: EventSource::parse(&source_str).unwrap_or(EventSource::Provider),
        version: row.get("version")?,
        constraint_id: row.get("constraint_id")?,
        markers,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SELECT_COLUMNS: &str = "canonical_event_id, origin_account_id, origin_event_id, title, \
    description, location, start_ts, end_ts, timezone, status, visibility, transparency, \
    all_day, recurrence_rule, source, version, constraint_id, markers_json, created_at, updated_at";

pub fn get_event(conn: &Connection, canonical_event_id: &str) -> Result<Option<CanonicalEvent>, TminusError> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM canonical_events WHERE canonical_event_id = ?1"),
        params![canonical_event_id],
        row_to_event,
    )
    .optional()
    .map_err(TminusError::from)
}

fn find_by_origin(
    conn: &Connection,
    account_id: &str,
    origin_event_id: &str,
) -> Result<Option<CanonicalEvent>, TminusError> {
    conn.query_row(
        &format!(
            "SELECT {SELECT_COLUMNS} FROM canonical_events \
             WHERE origin_account_id = ?1 AND origin_event_id = ?2"
        ),
        params![account_id, origin_event_id],
        row_to_event,
    )
    .optional()
    .map_err(TminusError::from)
}

pub fn list_events(conn: &Connection, filter: &EventFilter) -> Result<Vec<CanonicalEvent>, TminusError> {
    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM canonical_events WHERE status != 'cancelled'");
    let mut clauses = Vec::new();
    if filter.account_id.is_some() {
        clauses.push("origin_account_id = ?".to_string());
    }
    if filter.window_start.is_some() {
        clauses.push("end_ts >= ?".to_string());
    }
    if filter.window_end.is_some() {
        clauses.push("start_ts <= ?".to_string());
    }
    for clause in &clauses {
        sql.push_str(" AND ");
        sql.push_str(clause);
    }
    sql.push_str(" ORDER BY start_ts ASC LIMIT ? OFFSET ?");

    let mut stmt = conn.prepare(&sql)?;
    let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    if let Some(a) = &filter.account_id {
        bind.push(Box::new(a.clone()));
    }
    if let Some(w) = &filter.window_start {
        bind.push(Box::new(w.clone()));
    }
    if let Some(w) = &filter.window_end {
        bind.push(Box::new(w.clone()));
    }
    bind.push(Box::new(filter.limit));
    bind.push(Box::new(filter.offset));

    let params_ref: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|b| b.as_ref()).collect();
    let rows = stmt.query_map(params_ref.as_slice(), row_to_event)?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

fn insert_journal(conn: &Connection, entry: &JournalEntry) -> Result<(), TminusError> {
    conn.execute(
        "INSERT INTO event_journal
         (journal_id, canonical_event_id, ts, actor, change_type, reason, patch_json, conflict_type, resolution_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.journal_id,
            entry.canonical_event_id,
            entry.ts,
            entry.actor,
            entry.change_type.as_str(),
            entry.reason,
            entry.patch_json.as_ref().map(|v| v.to_string()),
            entry.conflict_type.as_str(),
            entry.resolution.as_ref().map(|r| serde_json::to_string(r).unwrap_or_default()),
        ],
    )?;
    Ok(())
}

fn apply_patch(event: &mut CanonicalEvent, patch: &EventFieldPatch) {
    if let Some(v) = &patch.title {
        event.title = Some(v.clone());
    }
    if let Some(v) = &patch.description {
        event.description = Some(v.clone());
    }
    if let Some(v) = &patch.location {
        event.location = Some(v.clone());
    }
    if let Some(v) = &patch.start_ts {
        event.start_ts = v.clone();
    }
    if let Some(v) = &patch.end_ts {
        event.end_ts = v.clone();
    }
    if let Some(v) = &patch.timezone {
        event.timezone = Some(v.clone());
    }
    if let Some(v) = patch.status {
        event.status = v;
    }
    if let Some(v) = &patch.visibility {
        event.visibility = Some(v.clone());
    }
    if let Some(v) = patch.transparency {
        event.transparency = v;
    }
    if let Some(v) = patch.all_day {
        event.all_day = v;
    }
    if let Some(v) = &patch.recurrence_rule {
        event.recurrence_rule = Some(v.clone());
    }
}

fn persist_event(conn: &Connection, event: &CanonicalEvent) -> Result<(), TminusError> {
    let markers_json = serde_json::to_string(&event.markers).unwrap_or_else(|_| "{}".to_string());
    conn.execute(
        "INSERT INTO canonical_events
         (canonical_event_id, origin_account_id, origin_event_id, title, description, location,
          start_ts, end_ts, timezone, status, visibility, transparency, all_day, recurrence_rule,
          source, version, constraint_id, markers_json, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)
         ON CONFLICT(canonical_event_id) DO UPDATE SET
            title = excluded.title, description = excluded.description, location = excluded.location,
            start_ts = excluded.start_ts, end_ts = excluded.end_ts, timezone = excluded.timezone,
            status = excluded.status, visibility = excluded.visibility, transparency = excluded.transparency,
            all_day = excluded.all_day, recurrence_rule = excluded.recurrence_rule,
            version = excluded.version, markers_json = excluded.markers_json, updated_at = excluded.updated_at",
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
            markers_json,
            event.created_at,
            event.updated_at,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref sql_err, _)
            if sql_err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            TminusError::StructuralConstraint(e.to_string())
        }
        other => TminusError::Rusqlite(other),
    })?;
    Ok(())
}

/// Apply one provider delta inside a caller-managed transaction. `actor` is
/// the journal actor string (typically `provider:<account>`).
pub fn apply_provider_delta(
    conn: &Connection,
    delta: &ProviderDelta,
    actor: &str,
) -> Result<ApplyOutcome, TminusError> {
    if let Some(start) = &delta.fields.start_ts {
        if let Some(end) = &delta.fields.end_ts {
            if start > end {
                return Err(TminusError::InvalidInterval(format!(
                    "start_ts {start} > end_ts {end}"
                )));
            }
        }
    }

    let existing = find_by_origin(conn, &delta.origin_account_id, &delta.origin_event_id)?;
    let now = time::now_iso();
    let mut journal_entries = Vec::new();

    match (&delta.kind, existing) {
        (DeltaKind::Created, None) => {
            let start_ts = delta.fields.start_ts.clone().ok_or_else(|| {
                TminusError::Validation("created delta missing start_ts".to_string())
            })?;
            let end_ts = delta.fields.end_ts.clone().ok_or_else(|| {
                TminusError::Validation("created delta missing end_ts".to_string())
            })?;
            if start_ts > end_ts {
                return Err(TminusError::InvalidInterval(format!(
                    "start_ts {start_ts} > end_ts {end_ts}"
                )));
            }

            let mut event = CanonicalEvent {
                canonical_event_id: time::new_id(),
                origin_account_id: delta.origin_account_id.clone(),
                origin_event_id: delta.origin_event_id.clone(),
                title: delta.fields.title.clone(),
                description: delta.fields.description.clone(),
                location: delta.fields.location.clone(),
                start_ts,
                end_ts,
                timezone: delta.fields.timezone.clone(),
                status: delta.fields.status.unwrap_or(EventStatus::Confirmed),
                visibility: delta.fields.visibility.clone(),
                transparency: delta.fields.transparency.unwrap_or(Transparency::Opaque),
                all_day: delta.fields.all_day.unwrap_or(false),
                recurrence_rule: delta.fields.recurrence_rule.clone(),
                source: EventSource::Provider,
                version: 1,
                constraint_id: None,
                markers: BTreeMap::new(),
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            event.markers = authority::build_markers_for_insert(&delta.origin_account_id, &event);
            persist_event(conn, &event)?;

            let entry = JournalEntry {
                journal_id: time::new_id(),
                canonical_event_id: event.canonical_event_id.clone(),
                ts: now.clone(),
                actor: actor.to_string(),
                change_type: ChangeType::Created,
                reason: Some("provider_delta".to_string()),
                patch_json: serde_json::to_value(&delta.fields).ok(),
                conflict_type: ConflictType::None,
                resolution: None,
            };
            insert_journal(conn, &entry)?;
            journal_entries.push(entry);

            Ok(ApplyOutcome { event, journal_entries })
        }
        (DeltaKind::Created, Some(existing)) => {
            // Dedup-update: degrade to the same semantics as `updated`.
            apply_update(conn, existing, delta, actor, now, &mut journal_entries)
                .map(|event| ApplyOutcome { event, journal_entries })
        }
        (DeltaKind::Updated, Some(existing)) => {
            apply_update(conn, existing, delta, actor, now, &mut journal_entries)
                .map(|event| ApplyOutcome { event, journal_entries })
        }
        (DeltaKind::Updated, None) => Err(TminusError::NotFound(format!(
            "no canonical event for origin ({}, {})",
            delta.origin_account_id, delta.origin_event_id
        ))),
        (DeltaKind::Cancelled, Some(mut existing)) => {
            existing.status = EventStatus::Cancelled;
            existing.version += 1;
            existing.updated_at = now.clone();
            persist_event(conn, &existing)?;
            let entry = JournalEntry {
                journal_id: time::new_id(),
                canonical_event_id: existing.canonical_event_id.clone(),
                ts: now.clone(),
                actor: actor.to_string(),
                change_type: ChangeType::Updated,
                reason: Some("provider_cancelled".to_string()),
                patch_json: Some(serde_json::json!({"status": "cancelled"})),
                conflict_type: ConflictType::None,
                resolution: None,
            };
            insert_journal(conn, &entry)?;
            journal_entries.push(entry);
            Ok(ApplyOutcome {
                event: existing,
                journal_entries,
            })
        }
        (DeltaKind::Cancelled, None) => Err(TminusError::NotFound(format!(
            "no canonical event for origin ({}, {})",
            delta.origin_account_id, delta.origin_event_id
        ))),
        (DeltaKind::Deleted, Some(existing)) => {
            delete_event(conn, &existing.canonical_event_id, actor, "provider_deleted")?;
            Ok(ApplyOutcome {
                event: existing,
                journal_entries: Vec::new(),
            })
        }
        (DeltaKind::Deleted, None) => Err(TminusError::NotFound(format!(
            "no canonical event for origin ({}, {})",
            delta.origin_account_id, delta.origin_event_id
        ))),
    }
}

fn apply_update(
    conn: &Connection,
    mut existing: CanonicalEvent,
    delta: &ProviderDelta,
    actor: &str,
    now: String,
    journal_entries: &mut Vec<JournalEntry>,
) -> Result<CanonicalEvent, TminusError> {
    let effective_markers = existing.effective_markers();
    let conflicts = authority::detect_conflicts(&existing, &effective_markers, &delta.origin_account_id, &delta.fields);
    let new_markers = authority::update_markers(&effective_markers, &delta.origin_account_id, &delta.fields);

    apply_patch(&mut existing, &delta.fields);
    if existing.start_ts > existing.end_ts {
        return Err(TminusError::InvalidInterval(format!(
            "start_ts {} > end_ts {}",
            existing.start_ts, existing.end_ts
        )));
    }
    existing.markers = new_markers;
    existing.version += 1;
    existing.updated_at = now.clone();
    persist_event(conn, &existing)?;

    let update_entry = JournalEntry {
        journal_id: time::new_id(),
        canonical_event_id: existing.canonical_event_id.clone(),
        ts: now.clone(),
        actor: actor.to_string(),
        change_type: ChangeType::Updated,
        reason: Some("provider_delta".to_string()),
        patch_json: serde_json::to_value(&delta.fields).ok(),
        conflict_type: if conflicts.is_empty() {
            ConflictType::None
        } else {
            ConflictType::FieldOverride
        },
        resolution: None,
    };
    insert_journal(conn, &update_entry)?;
    journal_entries.push(update_entry);

    if !conflicts.is_empty() {
        tracing::warn!(
            canonical_event_id = %existing.canonical_event_id,
            incoming_authority = %format!("provider:{}", delta.origin_account_id),
            conflict_count = conflicts.len(),
            "authority conflict on provider delta"
        );
        let conflict_entry = JournalEntry {
            journal_id: time::new_id(),
            canonical_event_id: existing.canonical_event_id.clone(),
            ts: now,
            actor: actor.to_string(),
            change_type: ChangeType::AuthorityConflict,
            reason: Some("field_override".to_string()),
            patch_json: None,
            conflict_type: ConflictType::FieldOverride,
            resolution: Some(crate::model::journal::ConflictResolution {
                strategy: "provider_wins".to_string(),
                conflicts,
            }),
        };
        insert_journal(conn, &conflict_entry)?;
        journal_entries.push(conflict_entry);
    }

    Ok(existing)
}

/// Structural deletion; there is no soft-delete lifecycle for canonical events.
pub fn delete_event(conn: &Connection, canonical_event_id: &str, actor: &str, reason: &str) -> Result<bool, TminusError> {
    let deleted = conn.execute(
        "DELETE FROM canonical_events WHERE canonical_event_id = ?1",
        params![canonical_event_id],
    )?;
    if deleted == 0 {
        return Ok(false);
    }
    let entry = JournalEntry {
        journal_id: time::new_id(),
        canonical_event_id: canonical_event_id.to_string(),
        ts: time::now_iso(),
        actor: actor.to_string(),
        change_type: ChangeType::Deleted,
        reason: Some(reason.to_string()),
        patch_json: None,
        conflict_type: ConflictType::None,
        resolution: None,
    };
    insert_journal(conn, &entry)?;
    Ok(true)
}
