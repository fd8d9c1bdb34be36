//! Milestone CRUD.

use crate::model::milestone::{Milestone, MilestoneKind};
use crate::{time, TminusError};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

fn row_to_milestone(row: &Row) -> rusqlite::Result<Milestone> {
    let kind: String = row.get("kind")?;
    Ok(Milestone {
        milestone_id: row.get("milestone_id")?,
        participant_hash: row.get("participant_hash")?,
        kind: MilestoneKind::parse(&kind).unwrap_or(MilestoneKind::Custom),
        date: row.get("date")?,
        recurs_annually: row.get::<_, i64>("recurs_annually")? != 0,
        note: row.get("note")?,
    })
}

pub fn create_milestone(
    conn: &Connection,
    participant_hash: &str,
    kind: MilestoneKind,
    date: &str,
    recurs_annually: bool,
    note: Option<String>,
) -> Result<Milestone, TminusError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| TminusError::Validation(format!("'{date}' is not a real calendar date (YYYY-MM-DD)")))?;

    let milestone = Milestone {
        milestone_id: time::new_id(),
        participant_hash: participant_hash.to_string(),
        kind,
        date: date.to_string(),
        recurs_annually,
        note,
    };

    conn.execute(
        "INSERT INTO milestones (milestone_id, participant_hash, kind, date, recurs_annually, note)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            milestone.milestone_id,
            milestone.participant_hash,
            milestone.kind.as_str(),
            milestone.date,
            milestone.recurs_annually as i64,
            milestone.note,
        ],
    )?;
    Ok(milestone)
}

pub fn list_milestones(conn: &Connection, participant_hash: &str) -> Result<Vec<Milestone>, TminusError> {
    let mut stmt = conn.prepare(
        "SELECT milestone_id, participant_hash, kind, date, recurs_annually, note
         FROM milestones WHERE participant_hash = ?1 ORDER BY date ASC",
    )?;
    let rows = stmt.query_map(params![participant_hash], row_to_milestone)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn delete_milestone(conn: &Connection, milestone_id: &str) -> Result<bool, TminusError> {
    let deleted = conn.execute("DELETE FROM milestones WHERE milestone_id = ?1", params![milestone_id])?;
    Ok(deleted > 0)
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
    fn rejects_invalid_calendar_date() {
        let conn = conn();
        let result = create_milestone(&conn, "hash1", MilestoneKind::Birthday, "2026-02-30", true, None);
        assert!(result.is_err());
    }

    #[test]
    fn create_list_delete_roundtrip() {
        let conn = conn();
        let milestone = create_milestone(&conn, "hash1", MilestoneKind::Birthday, "2026-05-01", true, None).unwrap();
        assert_eq!(list_milestones(&conn, "hash1").unwrap().len(), 1);
        assert!(delete_milestone(&conn, &milestone.milestone_id).unwrap());
        assert!(list_milestones(&conn, "hash1").unwrap().is_empty());
    }
}
