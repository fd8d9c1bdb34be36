//! Interval algebra: `merge` (union) and `complement` (difference against a
//! bounding window), implemented as pure functions over plain value types
//!. Timestamps are compared lexicographically as RFC3339 UTC
//! strings, which sort correctly because the format is fixed-width.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: String,
    pub end: String,
    pub account_ids: Vec<String>,
    /// Which pipeline stage produced this interval (`working_hours`,
    /// `trip`, `no_meetings_after`, `buffer`, `milestones`, or the raw
    /// event's origin account for stage 1).
    pub tag: String,
}

impl Interval {
    pub fn new(start: impl Into<String>, end: impl Into<String>, tag: impl Into<String>, account_ids: Vec<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            account_ids,
            tag: tag.into(),
        }
    }
}

/// Union intervals by start; walk and coalesce overlapping or *touching*
/// intervals (`[a,b]` and `[b,c]` merge into `[a,c]`). The coalesced
/// interval's `account_ids` is the set-union of its inputs'.
pub fn merge(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

    let mut out: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match out.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end.clone();
                }
                let mut accounts: BTreeSet<String> = last.account_ids.iter().cloned().collect();
                accounts.extend(interval.account_ids.iter().cloned());
                last.account_ids = accounts.into_iter().collect();
                last.tag = "merged".to_string();
            }
            _ => out.push(interval),
        }
    }
    out
}

/// `free_intervals = [start, end] \ busy_intervals_merged`. Assumes `busy` is already merged and sorted.
pub fn complement(start: &str, end: &str, busy: &[Interval]) -> Vec<Interval> {
    let mut free = Vec::new();
    let mut cursor = start.to_string();

    for interval in busy {
        if interval.start > cursor {
            free.push(Interval::new(cursor.clone(), interval.start.clone(), "free", Vec::new()));
        }
        if interval.end > cursor {
            cursor = interval.end.clone();
        }
    }
    if cursor < end {
        free.push(Interval::new(cursor, end.to_string(), "free", Vec::new()));
    }
    free
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_coalesces_touching_intervals() {
        let intervals = vec![
            Interval::new("2026-01-01T09:00:00Z", "2026-01-01T10:00:00Z", "a", vec!["acct1".into()]),
            Interval::new("2026-01-01T10:00:00Z", "2026-01-01T11:00:00Z", "b", vec!["acct2".into()]),
        ];
        let merged = merge(intervals);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start, "2026-01-01T09:00:00Z");
        assert_eq!(merged[0].end, "2026-01-01T11:00:00Z");
        assert_eq!(merged[0].account_ids.len(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let intervals = vec![
            Interval::new("2026-01-01T09:00:00Z", "2026-01-01T10:00:00Z", "a", vec![]),
            Interval::new("2026-01-01T09:30:00Z", "2026-01-01T11:00:00Z", "b", vec![]),
        ];
        let once = merge(intervals);
        let twice = merge(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn complement_law_s2_buffer_scenario() {
        let busy = merge(vec![Interval::new(
            "2026-01-01T09:45:00Z",
            "2026-01-01T11:00:00Z",
            "buffer",
            vec![],
        )]);
        let free = complement("2026-01-01T09:00:00Z", "2026-01-01T12:00:00Z", &busy);
        assert_eq!(free.len(), 2);
        assert_eq!(free[0].start, "2026-01-01T09:00:00Z");
        assert_eq!(free[0].end, "2026-01-01T09:45:00Z");
        assert_eq!(free[1].start, "2026-01-01T11:00:00Z");
        assert_eq!(free[1].end, "2026-01-01T12:00:00Z");
    }

    #[test]
    fn complement_covers_entire_window_when_no_busy() {
        let free = complement("2026-01-01T00:00:00Z", "2026-01-01T23:59:59Z", &[]);
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].start, "2026-01-01T00:00:00Z");
        assert_eq!(free[0].end, "2026-01-01T23:59:59Z");
    }
}
