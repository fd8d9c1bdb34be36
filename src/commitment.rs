//! Time-commitment tracking: create/list/delete commitments,
//! record billable allocations, and compute rolling-window compliance
//! status.

use crate::model::commitment::{Allocation, CommitmentReport, CommitmentStatus, CommitmentWindow, TimeCommitment};
use crate::{time, TminusError};
use chrono::{Duration, Utc};
use rusqlite::{params, Connection, Row};

fn row_to_commitment(row: &Row) -> rusqlite::Result<TimeCommitment> {
    let window_type: String = row.get("window_type")?;
    Ok(TimeCommitment {
        commitment_id: row.get("commitment_id")?,
        client_id: row.get("client_id")?,
        client_name: row.get("client_name")?,
        target_hours: row.get("target_hours")?,
        window_type: CommitmentWindow::parse(&window_type).unwrap_or(CommitmentWindow::Weekly),
        rolling_window_weeks: row.get("rolling_window_weeks")?,
        hard_minimum: row.get::<_, i64>("hard_minimum")? != 0,
        proof_required: row.get::<_, i64>("proof_required")? != 0,
        created_at: row.get("created_at")?,
    })
}

const SELECT_COLUMNS: &str = "commitment_id, client_id, client_name, target_hours, window_type, \
     rolling_window_weeks, hard_minimum, proof_required, created_at";

pub struct NewCommitment {
    pub client_id: String,
    pub client_name: Option<String>,
    pub target_hours: f64,
    pub window_type: CommitmentWindow,
    pub rolling_window_weeks: i64,
    pub hard_minimum: bool,
    pub proof_required: bool,
}

pub fn create_commitment(conn: &Connection, new: NewCommitment) -> Result<TimeCommitment, TminusError> {
    if new.target_hours <= 0.0 {
        return Err(TminusError::Validation("target_hours must be positive".to_string()));
    }
    if new.rolling_window_weeks <= 0 {
        return Err(TminusError::Validation("rolling_window_weeks must be positive".to_string()));
    }

    let commitment = TimeCommitment {
        commitment_id: time::new_id(),
        client_id: new.client_id,
        client_name: new.client_name,
        target_hours: new.target_hours,
        window_type: new.window_type,
        rolling_window_weeks: new.rolling_window_weeks,
        hard_minimum: new.hard_minimum,
        proof_required: new.proof_required,
        created_at: time::now_iso(),
    };

    conn.execute(
        "INSERT INTO time_commitments (commitment_id, client_id, client_name, target_hours, window_type, \
         rolling_window_weeks, hard_minimum, proof_required, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            commitment.commitment_id,
            commitment.client_id,
            commitment.client_name,
            commitment.target_hours,
            commitment.window_type.as_str(),
            commitment.rolling_window_weeks,
            commitment.hard_minimum as i64,
            commitment.proof_required as i64,
            commitment.created_at,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            TminusError::Uniqueness(format!("a commitment for client '{}' already exists", commitment.client_id))
        }
        other => TminusError::Rusqlite(other),
    })?;
    Ok(commitment)
}

pub fn get_commitment(conn: &Connection, commitment_id: &str) -> Result<Option<TimeCommitment>, TminusError> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM time_commitments WHERE commitment_id = ?1"))?;
    let mut rows = stmt.query_map(params![commitment_id], row_to_commitment)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub fn list_commitments(conn: &Connection) -> Result<Vec<TimeCommitment>, TminusError> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM time_commitments ORDER BY created_at ASC"))?;
    let rows = stmt.query_map([], row_to_commitment)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn delete_commitment(conn: &Connection, commitment_id: &str) -> Result<bool, TminusError> {
    let deleted = conn.execute("DELETE FROM time_commitments WHERE commitment_id = ?1", params![commitment_id])?;
    Ok(deleted > 0)
}

pub fn create_allocation(
    conn: &Connection,
    canonical_event_id: &str,
    client_id: &str,
    allocation_type: &str,
) -> Result<Allocation, TminusError> {
    let allocation = Allocation {
        allocation_id: time::new_id(),
        canonical_event_id: canonical_event_id.to_string(),
        client_id: client_id.to_string(),
        allocation_type: allocation_type.to_string(),
    };
    conn.execute(
        "INSERT INTO allocations (allocation_id, canonical_event_id, client_id, allocation_type) VALUES (?1,?2,?3,?4)",
        params![
            allocation.allocation_id,
            allocation.canonical_event_id,
            allocation.client_id,
            allocation.allocation_type,
        ],
    )?;
    Ok(allocation)
}

/// Sum of confirmed event durations allocated to `client_id` whose events
/// start within the rolling window ending at `as_of`.
fn actual_hours(conn: &Connection, client_id: &str, as_of: &chrono::DateTime<Utc>, rolling_window_weeks: i64) -> Result<f64, TminusError> {
    let window_start = *as_of - Duration::weeks(rolling_window_weeks);
    let window_start = window_start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let as_of_str = as_of.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let mut stmt = conn.prepare(
        "SELECT ce.start_ts, ce.end_ts FROM allocations a
         JOIN canonical_events ce ON ce.canonical_event_id = a.canonical_event_id
         WHERE a.client_id = ?1 AND ce.status = 'confirmed' AND ce.start_ts >= ?2 AND ce.start_ts <= ?3",
    )?;
    let rows = stmt.query_map(params![client_id, window_start, as_of_str], |row| {
        let start: String = row.get(0)?;
        let end: String = row.get(1)?;
        Ok((start, end))
    })?;

    let mut total_seconds = 0i64;
    for row in rows {
        let (start, end) = row?;
        let start = time::parse_ts(&start).map_err(TminusError::Validation)?;
        let end = time::parse_ts(&end).map_err(TminusError::Validation)?;
        total_seconds += (end - start).num_seconds().max(0);
    }
    Ok(total_seconds as f64 / 3600.0)
}

/// Computes and persists a `commitment_reports` snapshot for `commitment_id`
/// as of `as_of`.
pub fn get_commitment_status(conn: &Connection, commitment_id: &str, as_of: chrono::DateTime<Utc>) -> Result<CommitmentReport, TminusError> {
    let commitment = get_commitment(conn, commitment_id)?
        .ok_or_else(|| TminusError::NotFound(format!("commitment '{commitment_id}' not found")))?;

    let hours = actual_hours(conn, &commitment.client_id, &as_of, commitment.rolling_window_weeks)?;
    let status = CommitmentStatus::classify(hours, commitment.target_hours);

    let report = CommitmentReport {
        report_id: time::new_id(),
        commitment_id: commitment.commitment_id.clone(),
        as_of: as_of.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        actual_hours: hours,
        status,
        computed_at: time::now_iso(),
    };

    conn.execute(
        "INSERT INTO commitment_reports (report_id, commitment_id, as_of, actual_hours, status, computed_at) \
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            report.report_id,
            report.commitment_id,
            report.as_of,
            report.actual_hours,
            report.status.as_str(),
            report.computed_at,
        ],
    )?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::canonical_store::apply_provider_delta;
    use crate::store::ProviderDelta;
    use crate::{db, migration};
    use crate::model::event::{DeltaKind, EventFieldPatch};

    fn conn() -> Connection {
        let mut conn = db::connect_memory().unwrap();
        migration::ensure_migrated(&mut conn).unwrap();
        conn
    }

    fn seed_event(conn: &Connection, account: &str, origin_id: &str, start: &str, end: &str) -> String {
        let delta = ProviderDelta {
            origin_account_id: account.to_string(),
            origin_event_id: origin_id.to_string(),
            kind: DeltaKind::Created,
            fields: EventFieldPatch {
                title: Some("Client work".to_string()),
                start_ts: Some(start.to_string()),
                end_ts: Some(end.to_string()),
                ..Default::default()
            },
        };
        let outcome = apply_provider_delta(conn, &delta, "provider:acc-1").unwrap();
        outcome.event.canonical_event_id
    }

    #[test]
    fn rejects_non_positive_target() {
        let conn = conn();
        let result = create_commitment(
            &conn,
            NewCommitment {
                client_id: "acme".to_string(),
                client_name: None,
                target_hours: 0.0,
                window_type: CommitmentWindow::Weekly,
                rolling_window_weeks: 4,
                hard_minimum: false,
                proof_required: false,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn status_reflects_allocated_hours() {
        let conn = conn();
        let commitment = create_commitment(
            &conn,
            NewCommitment {
                client_id: "acme".to_string(),
                client_name: Some("Acme Corp".to_string()),
                target_hours: 10.0,
                window_type: CommitmentWindow::Weekly,
                rolling_window_weeks: 1,
                hard_minimum: true,
                proof_required: false,
            },
        )
        .unwrap();

        let now = Utc::now();
        let event_id = seed_event(
            &conn,
            "acc-1",
            "ev-1",
            &(now - Duration::hours(6)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            &now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        );
        create_allocation(&conn, &event_id, "acme", "BILLABLE").unwrap();

        let report = get_commitment_status(&conn, &commitment.commitment_id, now).unwrap();
        assert!((report.actual_hours - 6.0).abs() < 0.01);
        assert_eq!(report.status, CommitmentStatus::Under);
    }
}
