//! Decay-weighted reputation scoring.
//!
//! The spec pins only the endpoints ("all ATTENDED >= 0.95", "all
//! NO_SHOW_THEM <= 0.05") and says "recent entries weigh more" without
//! naming a curve. This implementation uses an exponential decay with a
//! 30-day half-life: `decay(age_days) = 0.5 ^ (age_days / 30)`. Documented
//! here, and in DESIGN.md, as the chosen resolution of that open question.

use crate::model::relationship::InteractionOutcome;
use crate::TminusError;
use chrono::Utc;
use rusqlite::{params, Connection};

const HALF_LIFE_DAYS: f64 = 30.0;

fn decay_weight(age_days: f64) -> f64 {
    0.5f64.powf(age_days.max(0.0) / HALF_LIFE_DAYS)
}

struct LedgerRow {
    outcome: InteractionOutcome,
    weight: f64,
    ts: String,
}

fn load_ledger(conn: &Connection, participant_hash: &str) -> Result<Vec<LedgerRow>, TminusError> {
    let mut stmt = conn.prepare("SELECT outcome, weight, ts FROM interaction_ledger WHERE participant_hash = ?1")?;
    let rows = stmt.query_map(params![participant_hash], |row| {
        let outcome: String = row.get(0)?;
        let weight: f64 = row.get(1)?;
        let ts: String = row.get(2)?;
        Ok((outcome, weight, ts))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (outcome, weight, ts) = row?;
        out.push(LedgerRow {
            outcome: InteractionOutcome::parse(&outcome).unwrap_or(InteractionOutcome::Attended),
            weight,
            ts,
        });
    }
    Ok(out)
}

/// Clamped affine mapping of the time-decayed weighted average of outcome
/// weights into `[0,1]`. Neutral default 0.5 for an empty ledger.
pub fn reliability_score(conn: &Connection, participant_hash: &str) -> Result<f64, TminusError> {
    let entries = load_ledger(conn, participant_hash)?;
    if entries.is_empty() {
        return Ok(0.5);
    }

    let now = Utc::now();
    let mut weighted_sum = 0.0;
    let mut decay_sum = 0.0;
    for entry in &entries {
        let age_days = crate::time::parse_ts(&entry.ts)
            .map(|ts| (now - ts).num_seconds() as f64 / 86_400.0)
            .unwrap_or(0.0);
        let decay = decay_weight(age_days);
        weighted_sum += entry.weight * decay;
        decay_sum += decay;
    }
    if decay_sum == 0.0 {
        return Ok(0.5);
    }
    let weighted_avg = weighted_sum / decay_sum;
    Ok((0.5 + 0.5 * weighted_avg).clamp(0.0, 1.0))
}

/// Asymmetry between "them"-negative and "me"-negative events. 1.0 when
/// negative outcomes are perfectly balanced between both sides, trending
/// toward 0.0 as they skew to one side. Neutral default 0.5 when there are
/// no negative events to compare.
pub fn reciprocity_score(conn: &Connection, participant_hash: &str) -> Result<f64, TminusError> {
    let entries = load_ledger(conn, participant_hash)?;
    let them_negative = entries.iter().filter(|e| e.outcome.is_them_negative()).count() as f64;
    let me_negative = entries.iter().filter(|e| e.outcome.is_me_negative()).count() as f64;

    let total = them_negative + me_negative;
    if total == 0.0 {
        return Ok(0.5);
    }
    let ratio = me_negative / total;
    Ok(1.0 - (0.5 - ratio).abs() * 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::crud::{create_relationship, mark_outcome, NewRelationship};
    use crate::model::relationship::RelationshipCategory;
    use crate::{db, migration};

    fn conn() -> Connection {
        let mut conn = db::connect_memory().unwrap();
        migration::ensure_migrated(&mut conn).unwrap();
        conn
    }

    #[test]
    fn empty_ledger_is_neutral() {
        let conn = conn();
        assert_eq!(reliability_score(&conn, "nobody").unwrap(), 0.5);
        assert_eq!(reciprocity_score(&conn, "nobody").unwrap(), 0.5);
    }

    #[test]
    fn all_attended_is_high_reliability() {
        let conn = conn();
        create_relationship(
            &conn,
            NewRelationship {
                participant_hash: "good".to_string(),
                display_name: None,
                category: RelationshipCategory::Friend,
                closeness_weight: None,
                city: None,
                timezone: None,
                interaction_frequency_target: None,
            },
        )
        .unwrap();
        for _ in 0..5 {
            mark_outcome(&conn, "good", InteractionOutcome::Attended, None, None, None).unwrap();
        }
        assert!(reliability_score(&conn, "good").unwrap() >= 0.95);
    }

    #[test]
    fn all_no_show_them_is_low_reliability() {
        let conn = conn();
        create_relationship(
            &conn,
            NewRelationship {
                participant_hash: "flaky".to_string(),
                display_name: None,
                category: RelationshipCategory::Client,
                closeness_weight: None,
                city: None,
                timezone: None,
                interaction_frequency_target: None,
            },
        )
        .unwrap();
        for _ in 0..5 {
            mark_outcome(&conn, "flaky", InteractionOutcome::NoShowThem, None, None, None).unwrap();
        }
        assert!(reliability_score(&conn, "flaky").unwrap() <= 0.05);
    }
}
