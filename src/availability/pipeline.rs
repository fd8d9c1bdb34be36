//! The eight-stage busy/free computation. All stages are pure
//! over their inputs; ordering affects interval *labeling*, not the final
//! set arithmetic, since stage 7 merges everything regardless of tag.

use crate::availability::interval::{complement, merge, Interval};
use crate::model::constraint::{BufferConfig, NoMeetingsAfterConfig, WorkingHoursConfig};
use crate::TminusError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::{params, Connection};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AvailabilityResult {
    pub busy_intervals: Vec<Interval>,
    pub free_intervals: Vec<Interval>,
}

fn parse_utc(s: &str) -> Result<DateTime<Utc>, TminusError> {
    crate::time::parse_ts(s).map_err(TminusError::Validation)
}

fn resolve_tz(name: &str) -> Tz {
    Tz::from_str(name).unwrap_or(Tz::UTC)
}

/// Stage 1: raw events overlapping the window, optionally filtered by
/// account, excluding cancelled events.
fn raw_event_intervals(
    conn: &Connection,
    window_start: &str,
    window_end: &str,
    account_ids: Option<&[String]>,
) -> Result<Vec<Interval>, TminusError> {
    let mut sql = "SELECT origin_account_id, start_ts, end_ts FROM canonical_events \
                   WHERE status != 'cancelled' AND start_ts < ?1 AND end_ts > ?2"
        .to_string();
    if let Some(accounts) = account_ids {
        if !accounts.is_empty() {
            let placeholders: Vec<String> = (0..accounts.len()).map(|i| format!("?{}", i + 3)).collect();
            sql.push_str(&format!(" AND origin_account_id IN ({})", placeholders.join(",")));
        }
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut bind: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(window_end.to_string()), Box::new(window_start.to_string())];
    if let Some(accounts) = account_ids {
        for a in accounts {
            bind.push(Box::new(a.clone()));
        }
    }
    let params_ref: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|b| b.as_ref()).collect();

    let rows = stmt.query_map(params_ref.as_slice(), |row| {
        let account: String = row.get(0)?;
        let start: String = row.get(1)?;
        let end: String = row.get(2)?;
        Ok((account, start, end))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (account, start, end) = row?;
        out.push(Interval::new(start, end, "raw_event", vec![account]));
    }
    Ok(out)
}

fn iter_days(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut cursor = window_start.date_naive();
    let last = window_end.date_naive();
    while cursor <= last {
        days.push(cursor);
        cursor += Duration::days(1);
    }
    days
}

/// Stage 2: working-hours complement. For each working-hours constraint,
/// for each day in the window, the day's non-working portion (before
/// `start_time`, after `end_time`, and all of any day not in `days`) is
/// busy. Local clock times are interpreted in the constraint's IANA
/// timezone and converted to UTC; see the DST note in the availability
/// module's crate-level docs for the approximation this takes at DST
/// transitions.
fn working_hours_busy(
    conn: &Connection,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<Interval>, TminusError> {
    let mut out = Vec::new();
    let mut stmt = conn.prepare("SELECT config_json FROM constraints WHERE kind = 'working_hours'")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    for row in rows {
        let config_json = row?;
        let cfg: WorkingHoursConfig = match serde_json::from_str(&config_json) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let tz = resolve_tz(&cfg.timezone);
        let (sh, sm) = crate::constraint::validate::parse_hhmm("start_time", &cfg.start_time).unwrap_or((0, 0));
        let (eh, em) = crate::constraint::validate::parse_hhmm("end_time", &cfg.end_time).unwrap_or((23, 59));

        for day in iter_days(window_start, window_end) {
            let weekday = day.weekday().num_days_from_sunday() as u8;
            let day_start_utc = tz
                .from_local_datetime(&day.and_hms_opt(0, 0, 0).unwrap())
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap()));
            let next_day_start_utc = day_start_utc + Duration::days(1);

            if !cfg.days.contains(&weekday) {
                out.push(Interval::new(
                    day_start_utc.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    next_day_start_utc.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    "working_hours",
                    Vec::new(),
                ));
                continue;
            }

            let local_work_start = tz
                .from_local_datetime(&day.and_time(NaiveTime::from_hms_opt(sh, sm, 0).unwrap()))
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(day_start_utc);
            let local_work_end = tz
                .from_local_datetime(&day.and_time(NaiveTime::from_hms_opt(eh, em, 0).unwrap()))
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(next_day_start_utc);

            if local_work_start > day_start_utc {
                out.push(Interval::new(
                    day_start_utc.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    local_work_start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    "working_hours",
                    Vec::new(),
                ));
            }
            if next_day_start_utc > local_work_end {
                out.push(Interval::new(
                    local_work_end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    next_day_start_utc.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    "working_hours",
                    Vec::new(),
                ));
            }
        }
    }
    Ok(out)
}

/// Stage 3: trips. Clamped to the requested window.
fn trip_busy(conn: &Connection, window_start: &str, window_end: &str) -> Result<Vec<Interval>, TminusError> {
    let mut out = Vec::new();
    let mut stmt = conn.prepare(
        "SELECT active_from, active_to FROM constraints WHERE kind = 'trip' AND active_from IS NOT NULL AND active_to IS NOT NULL",
    )?;
    let rows = stmt.query_map([], |row| {
        let from: String = row.get(0)?;
        let to: String = row.get(1)?;
        Ok((from, to))
    })?;

    for row in rows {
        let (from, to) = row?;
        if to < window_start.to_string() || from > window_end.to_string() {
            continue;
        }
        let start = if from < window_start.to_string() { window_start.to_string() } else { from };
        let end = if to > window_end.to_string() { window_end.to_string() } else { to };
        out.push(Interval::new(start, end, "trip", Vec::new()));
    }
    Ok(out)
}

/// Stage 4: no-meetings-after, a recurring daily cutoff.
fn no_meetings_after_busy(
    conn: &Connection,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<Interval>, TminusError> {
    let mut out = Vec::new();
    let mut stmt = conn.prepare("SELECT config_json FROM constraints WHERE kind = 'no_meetings_after'")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    for row in rows {
        let config_json = row?;
        let cfg: NoMeetingsAfterConfig = match serde_json::from_str(&config_json) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let tz = resolve_tz(&cfg.timezone);
        let (ch, cm) = crate::constraint::validate::parse_hhmm("cutoff_time", &cfg.cutoff_time).unwrap_or((23, 59));

        for day in iter_days(window_start, window_end) {
            let cutoff_utc = tz
                .from_local_datetime(&day.and_time(NaiveTime::from_hms_opt(ch, cm, 0).unwrap()))
                .single()
                .map(|dt| dt.with_timezone(&Utc));
            let Some(cutoff_utc) = cutoff_utc else { continue };
            let next_midnight = tz
                .from_local_datetime(&(day + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap())
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(cutoff_utc + Duration::hours(24));
            let end = next_midnight.min(window_end);
            if cutoff_utc < end {
                out.push(Interval::new(
                    cutoff_utc.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    "no_meetings_after",
                    Vec::new(),
                ));
            }
        }
    }
    Ok(out)
}

/// Stage 5: buffers around raw events.
fn buffer_busy(conn: &Connection, raw_events: &[Interval]) -> Result<Vec<Interval>, TminusError> {
    let mut out = Vec::new();
    let mut stmt = conn.prepare("SELECT config_json FROM constraints WHERE kind = 'buffer'")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let configs: Vec<BufferConfig> = rows
        .filter_map(|r| r.ok())
        .filter_map(|s| serde_json::from_str(&s).ok())
        .collect();

    for cfg in &configs {
        for event in raw_events {
            let is_internal = event.account_ids.iter().any(|a| a == "internal");
            let applies = match cfg.applies_to {
                crate::model::constraint::BufferAppliesTo::All => true,
                crate::model::constraint::BufferAppliesTo::External => !is_internal,
            };
            if !applies {
                continue;
            }
            let Ok(start) = parse_utc(&event.start) else { continue };
            let Ok(end) = parse_utc(&event.end) else { continue };
            let delta = Duration::minutes(cfg.minutes as i64);

            if cfg.kind.is_before_event() {
                let buf_start = start - delta;
                out.push(Interval::new(
                    buf_start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    event.start.clone(),
                    "buffer",
                    event.account_ids.clone(),
                ));
            } else {
                let buf_end = end + delta;
                out.push(Interval::new(
                    event.end.clone(),
                    buf_end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    "buffer",
                    event.account_ids.clone(),
                ));
            }
        }
    }
    Ok(out)
}

/// Stage 6: milestones, expanded into all-day busy intervals. A milestone
/// with `recurs_annually` is expanded once per year it overlaps the window.
fn milestone_busy(
    conn: &Connection,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<Interval>, TminusError> {
    let mut out = Vec::new();
    let mut stmt = conn.prepare("SELECT date, recurs_annually FROM milestones")?;
    let rows = stmt.query_map([], |row| {
        let date: String = row.get(0)?;
        let recurs: i64 = row.get(1)?;
        Ok((date, recurs != 0))
    })?;

    for row in rows {
        let (date_str, recurs) = row?;
        let Ok(base_date) = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d") else { continue };

        let candidate_years: Vec<i32> = if recurs {
            (window_start.year()..=window_end.year()).collect()
        } else {
            vec![base_date.year()]
        };

        for year in candidate_years {
            let Some(occurrence) = base_date.with_year(year) else { continue };
            let day_start = Utc.from_utc_datetime(&occurrence.and_hms_opt(0, 0, 0).unwrap());
            let day_end = day_start + Duration::days(1);
            if day_end > window_start && day_start < window_end {
                out.push(Interval::new(
                    day_start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    day_end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    "milestones",
                    Vec::new(),
                ));
            }
        }
    }
    Ok(out)
}

/// Run the full pipeline over `[window_start, window_end]`.
pub fn compute_availability(
    conn: &Connection,
    window_start: &str,
    window_end: &str,
    account_ids: Option<&[String]>,
) -> Result<AvailabilityResult, TminusError> {
    let start_dt = parse_utc(window_start)?;
    let end_dt = parse_utc(window_end)?;
    if start_dt > end_dt {
        return Err(TminusError::InvalidInterval(format!(
            "availability window start {window_start} > end {window_end}"
        )));
    }

    let raw_events = raw_event_intervals(conn, window_start, window_end, account_ids)?;

    let mut busy = Vec::new();
    busy.extend(working_hours_busy(conn, start_dt, end_dt)?);
    busy.extend(trip_busy(conn, window_start, window_end)?);
    busy.extend(no_meetings_after_busy(conn, start_dt, end_dt)?);
    busy.extend(buffer_busy(conn, &raw_events)?);
    busy.extend(milestone_busy(conn, start_dt, end_dt)?);
    busy.extend(raw_events);

    let busy_merged = merge(busy);
    let free = complement(window_start, window_end, &busy_merged);

    Ok(AvailabilityResult {
        busy_intervals: busy_merged,
        free_intervals: free,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::engine;
    use crate::model::constraint::ConstraintKind;
    use crate::{db, migration};
    use serde_json::json;

    fn conn() -> Connection {
        let mut conn = db::connect_memory().unwrap();
        migration::ensure_migrated(&mut conn).unwrap();
        conn
    }

    #[test]
    fn s3_working_hours_complement_wednesday() {
        let conn = conn();
        engine::add_constraint(
            &conn,
            ConstraintKind::WorkingHours,
            json!({"days":[1,2,3,4,5],"start_time":"09:00","end_time":"17:00","timezone":"UTC"}),
            None,
            None,
        )
        .unwrap();

        let result = compute_availability(
            &conn,
            "2026-02-18T00:00:00Z",
            "2026-02-18T23:59:59Z",
            None,
        )
        .unwrap();

        assert_eq!(result.free_intervals.len(), 1);
        assert_eq!(result.free_intervals[0].start, "2026-02-18T09:00:00Z");
        assert_eq!(result.free_intervals[0].end, "2026-02-18T17:00:00Z");
    }

    #[test]
    fn s2_buffer_scenario() {
        let conn = conn();
        conn.execute(
            "INSERT INTO canonical_events
             (canonical_event_id, origin_account_id, origin_event_id, start_ts, end_ts, created_at, updated_at)
             VALUES ('e1','acct','ev1','2026-01-01T10:00:00Z','2026-01-01T11:00:00Z','2026-01-01T00:00:00Z','2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        engine::add_constraint(
            &conn,
            ConstraintKind::Buffer,
            json!({"type":"travel","minutes":15,"applies_to":"all"}),
            None,
            None,
        )
        .unwrap();

        let result = compute_availability(&conn, "2026-01-01T09:00:00Z", "2026-01-01T12:00:00Z", None).unwrap();
        assert_eq!(result.busy_intervals.len(), 1);
        assert_eq!(result.busy_intervals[0].start, "2026-01-01T09:45:00Z");
        assert_eq!(result.busy_intervals[0].end, "2026-01-01T11:00:00Z");
        assert_eq!(result.free_intervals.len(), 2);
        assert_eq!(result.free_intervals[0].end, "2026-01-01T09:45:00Z");
        assert_eq!(result.free_intervals[1].start, "2026-01-01T11:00:00Z");
    }
}
