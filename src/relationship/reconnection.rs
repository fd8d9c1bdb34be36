//! Geo-aware reconnection suggestions.

use crate::relationship::drift::drift_report;
use crate::relationship::reputation::reliability_score;
use crate::TminusError;
use rusqlite::Connection;
use serde::Serialize;

/// City alias table applied bidirectionally; an unknown city falls back to
/// exact case-insensitive match. Treated as configuration, not an
/// exhaustive gazetteer.
const CITY_ALIASES: &[(&str, &str)] = &[
    ("nyc", "new york"),
    ("manhattan", "new york"),
    ("brooklyn", "new york"),
    ("bombay", "mumbai"),
    ("sf", "san francisco"),
    ("the bay", "san francisco"),
    ("la", "los angeles"),
];

fn canonical_city(city: &str) -> String {
    let lower = city.trim().to_lowercase();
    for (alias, canonical) in CITY_ALIASES {
        if lower == *alias {
            return canonical.to_string();
        }
    }
    lower
}

fn cities_match(a: &str, b: &str) -> bool {
    canonical_city(a) == canonical_city(b)
}

#[derive(Debug, Clone, Serialize)]
pub struct TimezoneMeetingWindow {
    pub user_timezone: Option<String>,
    pub contact_timezone: Option<String>,
    /// UTC working-hour overlap, `HH:MM-HH:MM`, when both timezones are
    /// known; otherwise `None`.
    pub overlap_utc: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconnectionSuggestion {
    pub relationship_id: String,
    pub participant_hash: String,
    pub display_name: Option<String>,
    pub city: Option<String>,
    pub urgency: f64,
    pub reliability_score: f64,
    pub suggested_duration_minutes: u32,
    pub suggested_time_window: Option<(String, String)>,
    pub timezone_meeting_window: TimezoneMeetingWindow,
}

/// Best-effort working-hours overlap: assumes a generic 09:00-17:00 local
/// working day converted to UTC via a fixed offset lookup; a strict
/// implementation would use `chrono_tz` per the timezone, as the
/// availability pipeline does, but this view only needs an advisory window.
fn overlap_hint(user_tz: &Option<String>, contact_tz: &Option<String>) -> Option<String> {
    let (user_tz, contact_tz) = (user_tz.as_ref()?, contact_tz.as_ref()?);
    use chrono_tz::Tz;
    use std::str::FromStr;
    let user = Tz::from_str(user_tz).ok()?;
    let contact = Tz::from_str(contact_tz).ok()?;

    let today = chrono::Utc::now().date_naive();
    let user_start = user
        .from_local_datetime(&today.and_hms_opt(9, 0, 0)?)
        .single()?
        .with_timezone(&chrono::Utc);
    let user_end = user
        .from_local_datetime(&today.and_hms_opt(17, 0, 0)?)
        .single()?
        .with_timezone(&chrono::Utc);
    let contact_start = contact
        .from_local_datetime(&today.and_hms_opt(9, 0, 0)?)
        .single()?
        .with_timezone(&chrono::Utc);
    let contact_end = contact
        .from_local_datetime(&today.and_hms_opt(17, 0, 0)?)
        .single()?
        .with_timezone(&chrono::Utc);

    let overlap_start = user_start.max(contact_start);
    let overlap_end = user_end.min(contact_end);
    if overlap_start >= overlap_end {
        return None;
    }
    Some(format!(
        "{}-{}",
        overlap_start.format("%H:%M"),
        overlap_end.format("%H:%M")
    ))
}

use chrono::TimeZone;

/// Overdue relationships in `city` (per the drift report), each enriched
/// with a suggested meeting duration and timezone overlap hint.
/// `trip_window` carries a trip constraint's `[active_from, active_to]`
/// when the suggestion is sourced from an upcoming trip.
pub fn reconnection_suggestions(
    conn: &Connection,
    city: &str,
    user_timezone: Option<&str>,
    trip_window: Option<(String, String)>,
) -> Result<Vec<ReconnectionSuggestion>, TminusError> {
    let overdue = drift_report(conn, chrono::Utc::now())?;

    let mut stmt = conn.prepare("SELECT relationship_id, participant_hash, display_name, city, timezone FROM relationships")?;
    let rows = stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let hash: String = row.get(1)?;
        let display_name: Option<String> = row.get(2)?;
        let rel_city: Option<String> = row.get(3)?;
        let tz: Option<String> = row.get(4)?;
        Ok((id, hash, display_name, rel_city, tz))
    })?;

    let mut by_id = std::collections::HashMap::new();
    for row in rows {
        let (id, hash, display_name, rel_city, tz) = row?;
        by_id.insert(id, (hash, display_name, rel_city, tz));
    }

    let mut out = Vec::new();
    for row in overdue {
        let Some((hash, display_name, rel_city, tz)) = by_id.get(&row.relationship_id) else {
            continue;
        };
        let Some(rel_city) = rel_city else { continue };
        if !cities_match(rel_city, city) {
            continue;
        }

        let reliability = reliability_score(conn, hash)?;
        out.push(ReconnectionSuggestion {
            relationship_id: row.relationship_id.clone(),
            participant_hash: hash.clone(),
            display_name: display_name.clone(),
            city: Some(rel_city.clone()),
            urgency: row.urgency,
            reliability_score: reliability,
            suggested_duration_minutes: row.category.suggested_duration_minutes(),
            suggested_time_window: trip_window.clone(),
            timezone_meeting_window: TimezoneMeetingWindow {
                user_timezone: user_timezone.map(str::to_string),
                contact_timezone: tz.clone(),
                overlap_utc: overlap_hint(&user_timezone.map(str::to_string), tz),
            },
        });
    }

    out.sort_by(|a, b| b.urgency.partial_cmp(&a.urgency).unwrap_or(std::cmp::Ordering::Equal));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_table_matches_bidirectionally() {
        assert!(cities_match("NYC", "New York"));
        assert!(cities_match("New York", "Manhattan"));
        assert!(cities_match("Bombay", "mumbai"));
    }

    #[test]
    fn unknown_city_falls_back_to_exact_match() {
        assert!(cities_match("Austin", "austin"));
        assert!(!cities_match("Austin", "Dallas"));
    }
}
