//! Shared timestamp/id helpers.
//!
//! Every timestamp the actor writes or returns is an ISO-8601 UTC string
//!, unlike decapod's epoch-seconds-plus-`Z` convention — the
//! data model here is explicit about durations and calendar dates, so we
//! use full RFC 3339 via `chrono` rather than a coarser format.

use chrono::{DateTime, Utc};
use ulid::Ulid;

/// Current instant as an ISO-8601 UTC string, e.g. `2026-07-28T12:00:00Z`.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// A new unique, sortable identifier.
pub fn new_id() -> String {
    Ulid::new().to_string()
}

/// Parse an ISO-8601 / RFC3339 UTC timestamp, rejecting anything else.
pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_iso_parses_back() {
        let ts = now_iso();
        assert!(parse_ts(&ts).is_ok());
    }

    #[test]
    fn new_id_is_unique_and_ulid_shaped() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert!(Ulid::from_string(&a).is_ok());
    }

    #[test]
    fn parse_ts_rejects_garbage() {
        assert!(parse_ts("not-a-timestamp").is_err());
    }
}
