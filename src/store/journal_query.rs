//! Read-side journal queries (`queryJournal`, `getEventConflicts`).

use crate::model::journal::{ChangeType, ConflictResolution, ConflictType, JournalEntry};
use crate::TminusError;
use rusqlite::{params, Connection, Row};

fn row_to_entry(row: &Row) -> rusqlite::Result<JournalEntry> {
    let change_type: String = row.get("change_type")?;
    let conflict_type: String = row.get("conflict_type")?;
    let patch_json: Option<String> = row.get("patch_json")?;
    let resolution_json: Option<String> = row.get("resolution_json")?;

    Ok(JournalEntry {
        journal_id: row.get("journal_id")?,
        canonical_event_id: row.get("canonical_event_id")?,
        ts: row.get("ts")?,
        actor: row.get("actor")?,
        change_type: match change_type.as_str() {
            "created" => ChangeType::Created,
            "updated" => ChangeType::Updated,
            "deleted" => ChangeType::Deleted,
            _ => ChangeType::AuthorityConflict,
        },
        reason: row.get("reason")?,
        patch_json: patch_json.and_then(|s| serde_json::from_str(&s).ok()),
        conflict_type: if conflict_type == "field_override" {
            ConflictType::FieldOverride
        } else {
            ConflictType::None
        },
        resolution: resolution_json.and_then(|s| serde_json::from_str::<ConflictResolution>(&s).ok()),
    })
}

const SELECT_COLUMNS: &str =
    "journal_id, canonical_event_id, ts, actor, change_type, reason, patch_json, conflict_type, resolution_json";

pub fn query_journal(conn: &Connection, canonical_event_id: &str) -> Result<Vec<JournalEntry>, TminusError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM event_journal WHERE canonical_event_id = ?1 ORDER BY ts ASC"
    ))?;
    let rows = stmt.query_map(params![canonical_event_id], row_to_entry)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn get_event_conflicts(conn: &Connection, canonical_event_id: &str) -> Result<Vec<JournalEntry>, TminusError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM event_journal \
         WHERE canonical_event_id = ?1 AND change_type = 'authority_conflict' ORDER BY ts ASC"
    ))?;
    let rows = stmt.query_map(params![canonical_event_id], row_to_entry)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
