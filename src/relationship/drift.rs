//! Drift detection and the drift-alert snapshot table.

use crate::model::relationship::{DriftAlert, DriftReportRow, RelationshipCategory};
use crate::{time, TminusError};
use rusqlite::{params, Connection};

fn days_between(ts: &str, now: &chrono::DateTime<chrono::Utc>) -> Result<f64, TminusError> {
    let parsed = crate::time::parse_ts(ts).map_err(TminusError::Validation)?;
    Ok((*now - parsed).num_seconds() as f64 / 86_400.0)
}

/// `days_overdue = days_since_last_interaction - target`; `urgency = max(0,
/// days_overdue) * closeness_weight`. Only relationships with a frequency
/// target and `days_overdue > 0` are returned, sorted by urgency desc.
pub fn drift_report(conn: &Connection, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<DriftReportRow>, TminusError> {
    let mut stmt = conn.prepare(
        "SELECT relationship_id, participant_hash, category, closeness_weight, interaction_frequency_target, \
         last_interaction_ts, created_at FROM relationships WHERE interaction_frequency_target IS NOT NULL",
    )?;
    let rows = stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let hash: String = row.get(1)?;
        let category: String = row.get(2)?;
        let weight: f64 = row.get(3)?;
        let target: i64 = row.get(4)?;
        let last_interaction: Option<String> = row.get(5)?;
        let created_at: String = row.get(6)?;
        Ok((id, hash, category, weight, target, last_interaction, created_at))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (relationship_id, participant_hash, category_str, weight, target, last_interaction, created_at) = row?;
        let reference_ts = last_interaction.unwrap_or(created_at);
        let days_since = days_between(&reference_ts, &now)?;
        let days_overdue = days_since - target as f64;
        if days_overdue <= 0.0 {
            continue;
        }
        let urgency = days_overdue.max(0.0) * weight;
        let drift_ratio = days_since / target as f64;
        out.push(DriftReportRow {
            relationship_id,
            participant_hash,
            category: RelationshipCategory::parse(&category_str).unwrap_or(RelationshipCategory::Other),
            days_since_last_interaction: days_since,
            days_overdue,
            drift_ratio,
            urgency,
        });
    }

    out.sort_by(|a, b| b.urgency.partial_cmp(&a.urgency).unwrap_or(std::cmp::Ordering::Equal));
    Ok(out)
}

/// Replace-all: truncate and insert inside a single transaction so readers
/// never observe a partial snapshot.
pub fn store_drift_alerts(conn: &mut Connection, rows: &[DriftReportRow]) -> Result<(), TminusError> {
    let now = time::now_iso();
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM drift_alerts", [])?;
    for row in rows {
        tx.execute(
            "INSERT INTO drift_alerts (alert_id, relationship_id, urgency, drift_ratio, days_overdue, category, computed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                time::new_id(),
                row.relationship_id,
                row.urgency,
                row.drift_ratio,
                row.days_overdue as i64,
                row.category.as_str(),
                now,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn get_drift_alerts(conn: &Connection) -> Result<Vec<DriftAlert>, TminusError> {
    let mut stmt = conn.prepare(
        "SELECT alert_id, relationship_id, urgency, drift_ratio, days_overdue, category, computed_at
         FROM drift_alerts ORDER BY urgency DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(DriftAlert {
            alert_id: row.get(0)?,
            relationship_id: row.get(1)?,
            urgency: row.get(2)?,
            drift_ratio: row.get(3)?,
            days_overdue: row.get(4)?,
            category: row.get(5)?,
            computed_at: row.get(6)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::crud::{create_relationship, NewRelationship};
    use crate::{db, migration};
    use chrono::Duration;

    fn conn() -> Connection {
        let mut conn = db::connect_memory().unwrap();
        migration::ensure_migrated(&mut conn).unwrap();
        conn
    }

    #[test]
    fn s5_drift_scenario_bob_first() {
        let mut conn = conn();
        let now = chrono::Utc::now();

        create_relationship(
            &conn,
            NewRelationship {
                participant_hash: "alice".to_string(),
                display_name: Some("Alice".to_string()),
                category: RelationshipCategory::Friend,
                closeness_weight: Some(1.0),
                city: None,
                timezone: None,
                interaction_frequency_target: Some(7),
            },
        )
        .unwrap();
        let ten_days_ago = (now - Duration::days(10)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        conn.execute(
            "UPDATE relationships SET last_interaction_ts = ?1 WHERE participant_hash = 'alice'",
            params![ten_days_ago],
        )
        .unwrap();

        create_relationship(
            &conn,
            NewRelationship {
                participant_hash: "bob".to_string(),
                display_name: Some("Bob".to_string()),
                category: RelationshipCategory::Colleague,
                closeness_weight: Some(0.3),
                city: None,
                timezone: None,
                interaction_frequency_target: Some(14),
            },
        )
        .unwrap();
        let created_long_ago = (now - Duration::days(400)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        conn.execute(
            "UPDATE relationships SET created_at = ?1 WHERE participant_hash = 'bob'",
            params![created_long_ago],
        )
        .unwrap();

        let report = drift_report(&conn, now).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].participant_hash, "bob");
        assert_eq!(report[1].participant_hash, "alice");

        store_drift_alerts(&mut conn, &report).unwrap();
        let alerts = get_drift_alerts(&conn).unwrap();
        assert_eq!(alerts.len(), 2);

        // replace-all: storing an empty snapshot clears prior alerts
        store_drift_alerts(&mut conn, &[]).unwrap();
        assert!(get_drift_alerts(&conn).unwrap().is_empty());
    }
}
