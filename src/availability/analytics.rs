//! Derived analytics views: deep-work blocks, context-switch
//! costs, cognitive load, risk scores, probabilistic availability. Thin
//! wrappers over the availability pipeline and the raw event stream.

use crate::availability::pipeline::compute_availability;
use crate::relationship::reputation::reliability_score;
use crate::store::canonical_store::{list_events, EventFilter};
use crate::TminusError;
use rusqlite::Connection;
use serde::Serialize;

const DEFAULT_MIN_BLOCK_MINUTES: i64 = 120;
/// A day with 3+ short meetings is treated as fragmented.
const FRAGMENTED_MEETING_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct DeepWorkBlock {
    pub start: String,
    pub end: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeepWorkSuggestion {
    pub message: String,
    pub estimated_gain_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeepWorkReport {
    pub blocks: Vec<DeepWorkBlock>,
    pub total_deep_hours: f64,
    pub suggestions: Vec<DeepWorkSuggestion>,
}

fn minutes_between(start: &str, end: &str) -> i64 {
    let (Ok(s), Ok(e)) = (crate::time::parse_ts(start), crate::time::parse_ts(end)) else {
        return 0;
    };
    (e - s).num_minutes()
}

/// Enumerate free intervals inside working hours, surfacing gaps at least
/// `min_block_minutes` long (default 120).
pub fn deep_work_report(
    conn: &Connection,
    window_start: &str,
    window_end: &str,
    min_block_minutes: Option<i64>,
) -> Result<DeepWorkReport, TminusError> {
    let threshold = min_block_minutes.unwrap_or(DEFAULT_MIN_BLOCK_MINUTES);
    let availability = compute_availability(conn, window_start, window_end, None)?;

    let mut blocks = Vec::new();
    let mut total_minutes = 0i64;
    for free in &availability.free_intervals {
        let duration = minutes_between(&free.start, &free.end);
        if duration >= threshold {
            blocks.push(DeepWorkBlock {
                start: free.start.clone(),
                end: free.end.clone(),
                duration_minutes: duration,
            });
            total_minutes += duration;
        }
    }

    let meeting_count = availability
        .busy_intervals
        .iter()
        .filter(|i| i.tag == "raw_event" || i.tag == "merged")
        .count();

    let mut suggestions = Vec::new();
    if meeting_count >= FRAGMENTED_MEETING_THRESHOLD && blocks.len() > 1 {
        let gain: i64 = blocks.iter().map(|b| b.duration_minutes / 4).sum();
        suggestions.push(DeepWorkSuggestion {
            message: "Consolidate short meetings to free a longer deep-work block".to_string(),
            estimated_gain_minutes: gain.max(15),
        });
    }

    Ok(DeepWorkReport {
        blocks,
        total_deep_hours: total_minutes as f64 / 60.0,
        suggestions,
    })
}

/// Coarse category map for context-switch costs. Treated as configuration
/// rather than an exhaustive built-in enumeration: callers needing custom
/// keywords should extend this table.
pub fn classify_category(title: &str) -> &'static str {
    let lower = title.to_lowercase();
    let rules: &[(&str, &str)] = &[
        ("standup", "engineering"),
        ("sprint", "engineering"),
        ("code review", "engineering"),
        ("design review", "engineering"),
        ("deploy", "engineering"),
        ("sales", "sales"),
        ("demo", "sales"),
        ("pipeline", "sales"),
        ("client call", "sales"),
        ("1:1", "management"),
        ("one-on-one", "management"),
        ("performance", "management"),
        ("planning", "management"),
        ("board", "governance"),
        ("investor", "governance"),
        ("legal", "governance"),
        ("lunch", "personal"),
        ("gym", "personal"),
        ("dentist", "personal"),
    ];
    for (keyword, category) in rules {
        if lower.contains(keyword) {
            return category;
        }
    }
    "other"
}

/// Fixed transition-cost matrix. Symmetric; same-category
/// transitions cost 0.1 by default.
fn transition_cost(a: &str, b: &str) -> f64 {
    if a == b {
        return 0.1;
    }
    let pair = {
        let mut v = [a, b];
        v.sort();
        v
    };
    match pair {
        ["engineering", "sales"] => 0.8,
        ["engineering", "governance"] => 0.7,
        ["governance", "sales"] => 0.6,
        ["management", "sales"] => 0.5,
        ["engineering", "management"] => 0.4,
        ["governance", "management"] => 0.5,
        ["engineering", "personal"] => 0.6,
        ["personal", "sales"] => 0.6,
        ["governance", "personal"] => 0.6,
        ["management", "personal"] => 0.5,
        _ => 0.5,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub from_category: String,
    pub to_category: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayContextSwitchCost {
    pub date: String,
    pub transitions: Vec<Transition>,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextSwitchReport {
    pub days: Vec<DayContextSwitchCost>,
    pub suggestions: Vec<String>,
}

pub fn context_switch_report(
    conn: &Connection,
    window_start: &str,
    window_end: &str,
) -> Result<ContextSwitchReport, TminusError> {
    let filter = EventFilter {
        window_start: Some(window_start.to_string()),
        window_end: Some(window_end.to_string()),
        limit: 10_000,
        ..Default::default()
    };
    let events = list_events(conn, &filter)?;

    use std::collections::BTreeMap;
    let mut by_day: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for event in &events {
        let date = event.start_ts.get(0..10).unwrap_or(&event.start_ts).to_string();
        let category = classify_category(event.title.as_deref().unwrap_or(""));
        by_day.entry(date).or_default().push((event.start_ts.clone(), category.to_string()));
    }

    let mut days = Vec::new();
    let mut total_transitions = 0usize;
    for (date, mut entries) in by_day {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut transitions = Vec::new();
        let mut total_cost = 0.0;
        for pair in entries.windows(2) {
            let from = &pair[0].1;
            let to = &pair[1].1;
            let cost = transition_cost(from, to);
            total_cost += cost;
            transitions.push(Transition {
                from_category: from.clone(),
                to_category: to.clone(),
                cost,
            });
        }
        total_transitions += transitions.len();
        days.push(DayContextSwitchCost {
            date,
            transitions,
            total_cost,
        });
    }

    let mut suggestions = Vec::new();
    for day in &days {
        if day.transitions.len() >= FRAGMENTED_MEETING_THRESHOLD {
            suggestions.push(format!(
                "{}: cluster same-category meetings to cut {} transitions",
                day.date,
                day.transitions.len()
            ));
        }
    }

    Ok(ContextSwitchReport { days, suggestions })
}

/// Day/week aggregate scalar from event density and category mix.
pub fn cognitive_load(conn: &Connection, window_start: &str, window_end: &str) -> Result<f64, TminusError> {
    let filter = EventFilter {
        window_start: Some(window_start.to_string()),
        window_end: Some(window_end.to_string()),
        limit: 10_000,
        ..Default::default()
    };
    let events = list_events(conn, &filter)?;
    if events.is_empty() {
        return Ok(0.0);
    }

    let mut categories = std::collections::BTreeSet::new();
    let mut total_minutes = 0i64;
    for event in &events {
        categories.insert(classify_category(event.title.as_deref().unwrap_or("")));
        total_minutes += minutes_between(&event.start_ts, &event.end_ts).max(0);
    }

    let density = events.len() as f64;
    let mix_factor = 1.0 + (categories.len().saturating_sub(1) as f64) * 0.25;
    let hours = total_minutes as f64 / 60.0;
    Ok((density * 0.5 + hours * 0.3) * mix_factor)
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipRiskScore {
    pub relationship_id: String,
    pub participant_hash: String,
    pub risk: f64,
}

/// Expected-attendance risk per relationship over the next N weeks, derived
/// from `reliability_score` (lower reliability = higher risk) scaled by how
/// many interactions the relationship's own cadence expects to fall inside
/// that horizon — a relationship with no frequency target is assumed to
/// come up once in the window.
pub fn risk_scores(conn: &Connection, weeks: i64) -> Result<Vec<RelationshipRiskScore>, TminusError> {
    let horizon_days = (weeks.max(0) * 7) as f64;
    let mut stmt = conn.prepare(
        "SELECT relationship_id, participant_hash, interaction_frequency_target FROM relationships",
    )?;
    let rows = stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let hash: String = row.get(1)?;
        let target: Option<i64> = row.get(2)?;
        Ok((id, hash, target))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (relationship_id, participant_hash, target) = row?;
        let reliability = reliability_score(conn, &participant_hash)?;
        let expected_occurrences = match target {
            Some(target_days) if target_days > 0 => (horizon_days / target_days as f64).max(0.0),
            _ => if horizon_days > 0.0 { 1.0 } else { 0.0 },
        };
        let risk = ((1.0 - reliability) * expected_occurrences).min(1.0);
        out.push(RelationshipRiskScore {
            relationship_id,
            participant_hash,
            risk,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbabilisticSlot {
    pub start: String,
    pub end: String,
    pub probability_free: f64,
}

/// Combine hard busy with soft constraints (reputation-weighted tentative
/// blocks) into a probability-of-free per slot.
pub fn probabilistic_availability(
    conn: &Connection,
    window_start: &str,
    window_end: &str,
) -> Result<Vec<ProbabilisticSlot>, TminusError> {
    let availability = compute_availability(conn, window_start, window_end, None)?;
    let mut slots: Vec<ProbabilisticSlot> = availability
        .free_intervals
        .iter()
        .map(|i| ProbabilisticSlot {
            start: i.start.clone(),
            end: i.end.clone(),
            probability_free: 1.0,
        })
        .collect();

    let filter = EventFilter {
        window_start: Some(window_start.to_string()),
        window_end: Some(window_end.to_string()),
        limit: 10_000,
        ..Default::default()
    };
    let events = list_events(conn, &filter)?;
    for event in events.iter().filter(|e| e.status.as_str() == "tentative") {
        slots.push(ProbabilisticSlot {
            start: event.start_ts.clone(),
            end: event.end_ts.clone(),
            probability_free: 0.5,
        });
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::relationship::RelationshipCategory;
    use crate::relationship::crud::{create_relationship, NewRelationship};
    use crate::{db, migration};

    fn conn() -> Connection {
        let mut conn = db::connect_memory().unwrap();
        migration::ensure_migrated(&mut conn).unwrap();
        conn
    }

    #[test]
    fn risk_scores_scale_with_horizon() {
        let conn = conn();
        create_relationship(
            &conn,
            NewRelationship {
                participant_hash: "hash-risk".to_string(),
                display_name: None,
                category: RelationshipCategory::Client,
                closeness_weight: None,
                city: None,
                timezone: None,
                interaction_frequency_target: Some(7),
            },
        )
        .unwrap();

        let one_week = risk_scores(&conn, 1).unwrap();
        let many_weeks = risk_scores(&conn, 52).unwrap();
        assert_eq!(one_week.len(), 1);
        assert_eq!(many_weeks.len(), 1);
        assert!(
            many_weeks[0].risk > one_week[0].risk,
            "a longer horizon must expose more expected occurrences, not an identical score"
        );
    }
}
