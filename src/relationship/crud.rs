//! Relationship CRUD and interaction-ledger writes.

use crate::model::relationship::{InteractionOutcome, LedgerEntry, Relationship, RelationshipCategory};
use crate::{time, TminusError};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn row_to_relationship(row: &Row) -> rusqlite::Result<Relationship> {
    let category: String = row.get("category")?;
    Ok(Relationship {
        relationship_id: row.get("relationship_id")?,
        participant_hash: row.get("participant_hash")?,
        display_name: row.get("display_name")?,
        category: RelationshipCategory::parse(&category).unwrap_or(RelationshipCategory::Other),
        closeness_weight: row.get("closeness_weight")?,
        city: row.get("city")?,
        timezone: row.get("timezone")?,
        interaction_frequency_target: row.get("interaction_frequency_target")?,
        last_interaction_ts: row.get("last_interaction_ts")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SELECT_COLUMNS: &str = "relationship_id, participant_hash, display_name, category, closeness_weight, \
    city, timezone, interaction_frequency_target, last_interaction_ts, created_at, updated_at";

pub struct NewRelationship {
    pub participant_hash: String,
    pub display_name: Option<String>,
    pub category: RelationshipCategory,
    pub closeness_weight: Option<f64>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub interaction_frequency_target: Option<i64>,
}

pub fn create_relationship(conn: &Connection, input: NewRelationship) -> Result<Relationship, TminusError> {
    if let Some(w) = input.closeness_weight {
        if !(0.0..=1.0).contains(&w) {
            return Err(TminusError::Validation("closeness_weight must be in [0.0, 1.0]".to_string()));
        }
    }
    if let Some(target) = input.interaction_frequency_target {
        if target <= 0 {
            return Err(TminusError::Validation("interaction_frequency_target must be positive".to_string()));
        }
    }

    let now = time::now_iso();
    let relationship = Relationship {
        relationship_id: time::new_id(),
        participant_hash: input.participant_hash,
        display_name: input.display_name,
        category: input.category,
        closeness_weight: input.closeness_weight.unwrap_or(0.5),
        city: input.city,
        timezone: input.timezone,
        interaction_frequency_target: input.interaction_frequency_target,
        last_interaction_ts: None,
        created_at: now.clone(),
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO relationships
         (relationship_id, participant_hash, display_name, category, closeness_weight, city, timezone,
          interaction_frequency_target, last_interaction_ts, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        params![
            relationship.relationship_id,
            relationship.participant_hash,
            relationship.display_name,
            relationship.category.as_str(),
            relationship.closeness_weight,
            relationship.city,
            relationship.timezone,
            relationship.interaction_frequency_target,
            relationship.last_interaction_ts,
            relationship.created_at,
            relationship.updated_at,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref sql_err, _)
            if sql_err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            TminusError::Uniqueness(format!("participant_hash already exists: {e}"))
        }
        other => TminusError::Rusqlite(other),
    })?;

    Ok(relationship)
}

pub fn get_relationship(conn: &Connection, relationship_id: &str) -> Result<Option<Relationship>, TminusError> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM relationships WHERE relationship_id = ?1"),
        params![relationship_id],
        row_to_relationship,
    )
    .optional()
    .map_err(TminusError::from)
}

pub fn list_relationships(conn: &Connection) -> Result<Vec<Relationship>, TminusError> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM relationships ORDER BY created_at ASC"))?;
    let rows = stmt.query_map([], row_to_relationship)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[derive(Default)]
pub struct RelationshipPatch {
    pub display_name: Option<String>,
    pub category: Option<RelationshipCategory>,
    pub closeness_weight: Option<f64>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub interaction_frequency_target: Option<i64>,
}

pub fn update_relationship(
    conn: &Connection,
    relationship_id: &str,
    patch: RelationshipPatch,
) -> Result<Relationship, TminusError> {
    let mut existing = get_relationship(conn, relationship_id)?
        .ok_or_else(|| TminusError::NotFound(format!("relationship {relationship_id}")))?;

    if let Some(w) = patch.closeness_weight {
        if !(0.0..=1.0).contains(&w) {
            return Err(TminusError::Validation("closeness_weight must be in [0.0, 1.0]".to_string()));
        }
        existing.closeness_weight = w;
    }
    if let Some(v) = patch.display_name {
        existing.display_name = Some(v);
    }
    if let Some(v) = patch.category {
        existing.category = v;
    }
    if let Some(v) = patch.city {
        existing.city = Some(v);
    }
    if let Some(v) = patch.timezone {
        existing.timezone = Some(v);
    }
    if let Some(v) = patch.interaction_frequency_target {
        if v <= 0 {
            return Err(TminusError::Validation("interaction_frequency_target must be positive".to_string()));
        }
        existing.interaction_frequency_target = Some(v);
    }
    existing.updated_at = time::now_iso();

    conn.execute(
        "UPDATE relationships SET display_name = ?1, category = ?2, closeness_weight = ?3, city = ?4,
         timezone = ?5, interaction_frequency_target = ?6, updated_at = ?7 WHERE relationship_id = ?8",
        params![
            existing.display_name,
            existing.category.as_str(),
            existing.closeness_weight,
            existing.city,
            existing.timezone,
            existing.interaction_frequency_target,
            existing.updated_at,
            relationship_id,
        ],
    )?;

    Ok(existing)
}

/// Cascades milestones, ledger entries, and drift alerts via `ON DELETE
/// CASCADE`.
pub fn delete_relationship(conn: &Connection, relationship_id: &str) -> Result<bool, TminusError> {
    let Some(relationship) = get_relationship(conn, relationship_id)? else {
        return Ok(false);
    };
    conn.execute(
        "DELETE FROM milestones WHERE participant_hash = ?1",
        params![relationship.participant_hash],
    )?;
    conn.execute(
        "DELETE FROM interaction_ledger WHERE participant_hash = ?1",
        params![relationship.participant_hash],
    )?;
    conn.execute("DELETE FROM relationships WHERE relationship_id = ?1", params![relationship_id])?;
    Ok(true)
}

/// Set `last_interaction_ts = ts` for every relationship matching one of
/// `participant_hashes`.
pub fn update_interactions(conn: &Connection, participant_hashes: &[String], ts: &str) -> Result<u64, TminusError> {
    let mut updated = 0u64;
    for hash in participant_hashes {
        updated += conn.execute(
            "UPDATE relationships SET last_interaction_ts = ?1, updated_at = ?1 WHERE participant_hash = ?2",
            params![ts, hash],
        )? as u64;
    }
    Ok(updated)
}

/// Record a ledger outcome. Bumps `last_interaction_ts` only for ATTENDED
///.
pub fn mark_outcome(
    conn: &Connection,
    participant_hash: &str,
    outcome: InteractionOutcome,
    canonical_event_id: Option<String>,
    note: Option<String>,
    ts: Option<String>,
) -> Result<LedgerEntry, TminusError> {
    let ts = ts.unwrap_or_else(time::now_iso);
    let entry = LedgerEntry {
        ledger_id: time::new_id(),
        participant_hash: participant_hash.to_string(),
        outcome,
        weight: outcome.weight(),
        canonical_event_id,
        note,
        ts: ts.clone(),
    };

    conn.execute(
        "INSERT INTO interaction_ledger (ledger_id, participant_hash, outcome, weight, canonical_event_id, note, ts)
         VALUES (?1,?2,?3,?4,?5,?6,?7)",
        params![
            entry.ledger_id,
            entry.participant_hash,
            entry.outcome.as_str(),
            entry.weight,
            entry.canonical_event_id,
            entry.note,
            entry.ts,
        ],
    )?;

    if outcome.bumps_last_interaction() {
        conn.execute(
            "UPDATE relationships SET last_interaction_ts = ?1, updated_at = ?1 WHERE participant_hash = ?2",
            params![ts, participant_hash],
        )?;
    }

    Ok(entry)
}

fn row_to_ledger_entry(row: &Row) -> rusqlite::Result<LedgerEntry> {
    let outcome: String = row.get("outcome")?;
    Ok(LedgerEntry {
        ledger_id: row.get("ledger_id")?,
        participant_hash: row.get("participant_hash")?,
        outcome: InteractionOutcome::parse(&outcome).unwrap_or(InteractionOutcome::Attended),
        weight: row.get("weight")?,
        canonical_event_id: row.get("canonical_event_id")?,
        note: row.get("note")?,
        ts: row.get("ts")?,
    })
}

/// Returns `None` if no ledger entries exist for the hash (spec invariant
/// 6: `listOutcomes` returns null after a relationship cascade-delete).
pub fn list_outcomes(conn: &Connection, participant_hash: &str) -> Result<Option<Vec<LedgerEntry>>, TminusError> {
    let mut stmt = conn.prepare(
        "SELECT ledger_id, participant_hash, outcome, weight, canonical_event_id, note, ts
         FROM interaction_ledger WHERE participant_hash = ?1 ORDER BY ts ASC",
    )?;
    let rows = stmt.query_map(params![participant_hash], row_to_ledger_entry)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    if out.is_empty() {
        Ok(None)
    } else {
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migration};

    fn conn() -> Connection {
        let mut conn = db::connect_memory().unwrap();
        migration::ensure_migrated(&mut conn).unwrap();
        conn
    }

    #[test]
    fn duplicate_participant_hash_is_uniqueness_error() {
        let conn = conn();
        create_relationship(
            &conn,
            NewRelationship {
                participant_hash: "hash1".to_string(),
                display_name: None,
                category: RelationshipCategory::Friend,
                closeness_weight: None,
                city: None,
                timezone: None,
                interaction_frequency_target: None,
            },
        )
        .unwrap();

        let result = create_relationship(
            &conn,
            NewRelationship {
                participant_hash: "hash1".to_string(),
                display_name: None,
                category: RelationshipCategory::Friend,
                closeness_weight: None,
                city: None,
                timezone: None,
                interaction_frequency_target: None,
            },
        );
        assert!(matches!(result, Err(TminusError::Uniqueness(_))));
    }

    #[test]
    fn delete_cascades_milestones_and_ledger() {
        let conn = conn();
        let relationship = create_relationship(
            &conn,
            NewRelationship {
                participant_hash: "hash2".to_string(),
                display_name: None,
                category: RelationshipCategory::Friend,
                closeness_weight: None,
                city: None,
                timezone: None,
                interaction_frequency_target: None,
            },
        )
        .unwrap();

        mark_outcome(&conn, "hash2", InteractionOutcome::Attended, None, None, None).unwrap();
        conn.execute(
            "INSERT INTO milestones (milestone_id, participant_hash, kind, date, recurs_annually, note)
             VALUES ('m1','hash2','birthday','2026-05-01',1,NULL)",
            [],
        )
        .unwrap();

        delete_relationship(&conn, &relationship.relationship_id).unwrap();

        assert!(list_outcomes(&conn, "hash2").unwrap().is_none());
        let milestone_count: i64 = conn
            .query_row("SELECT count(*) FROM milestones WHERE participant_hash = 'hash2'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(milestone_count, 0);
    }

    #[test]
    fn attended_bumps_last_interaction_but_other_outcomes_do_not() {
        let conn = conn();
        create_relationship(
            &conn,
            NewRelationship {
                participant_hash: "hash3".to_string(),
                display_name: None,
                category: RelationshipCategory::Client,
                closeness_weight: None,
                city: None,
                timezone: None,
                interaction_frequency_target: None,
            },
        )
        .unwrap();

        mark_outcome(
            &conn,
            "hash3",
            InteractionOutcome::CanceledByThem,
            None,
            None,
            Some("2026-01-01T00:00:00Z".to_string()),
        )
        .unwrap();
        let after_cancel: Option<String> = conn
            .query_row("SELECT last_interaction_ts FROM relationships WHERE participant_hash = 'hash3'", [], |r| r.get(0))
            .unwrap();
        assert!(after_cancel.is_none());

        mark_outcome(
            &conn,
            "hash3",
            InteractionOutcome::Attended,
            None,
            None,
            Some("2026-01-02T00:00:00Z".to_string()),
        )
        .unwrap();
        let after_attend: Option<String> = conn
            .query_row("SELECT last_interaction_ts FROM relationships WHERE participant_hash = 'hash3'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(after_attend.as_deref(), Some("2026-01-02T00:00:00Z"));
    }
}
