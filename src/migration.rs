//! Append-only schema migrations for one actor's SQLite store.
//!
//! Grounded on decapod's `core::migration` (a `Vec<Migration>` applied in
//! version order) but simplified: one `_schema_meta` row tracks the applied
//! version and is advanced inside the same transaction as the DDL, rather
//! than a side-channel JSON ledger. `ensure_migrated` is idempotent and is
//! called at the top of every actor operation, mirroring decapod's
//! `check_and_migrate` being safe to call on every startup.

use crate::error::TminusError;
use rusqlite::{Connection, OptionalExtension};

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations in order. Append new ones; never edit or remove a past
/// entry once it has shipped.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "initial actor schema: events, mirrors, journal, constraints, relationships, commitments",
            sql: SCHEMA_V1,
        },
        Migration {
            version: 2,
            description: "index journal and ledger lookups by their owning entity",
            sql: SCHEMA_V2_INDEXES,
        },
    ]
}

/// Apply any unapplied migrations inside a single transaction. Safe to call
/// on every actor operation.
pub fn ensure_migrated(conn: &mut Connection) -> Result<(), TminusError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT value FROM _schema_meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let pending: Vec<Migration> = all_migrations()
        .into_iter()
        .filter(|m| m.version > current)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let mut new_version = current;
    for m in &pending {
        tx.execute_batch(m.sql)?;
        new_version = m.version;
    }
    tx.execute(
        "INSERT INTO _schema_meta (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![new_version.to_string()],
    )?;
    tx.commit()?;
    Ok(())
}

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS constraints (
    constraint_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('trip','working_hours','buffer','no_meetings_after','override','milestone')),
    config_json TEXT NOT NULL,
    active_from TEXT,
    active_to TEXT,
    derived_event_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS canonical_events (
    canonical_event_id TEXT PRIMARY KEY,
    origin_account_id TEXT NOT NULL,
    origin_event_id TEXT NOT NULL,
    title TEXT,
    description TEXT,
    location TEXT,
    start_ts TEXT NOT NULL,
    end_ts TEXT NOT NULL,
    timezone TEXT,
    status TEXT NOT NULL DEFAULT 'confirmed' CHECK (status IN ('confirmed','tentative','cancelled')),
    visibility TEXT,
    transparency TEXT NOT NULL DEFAULT 'opaque' CHECK (transparency IN ('opaque','transparent')),
    all_day INTEGER NOT NULL DEFAULT 0,
    recurrence_rule TEXT,
    source TEXT NOT NULL DEFAULT 'provider' CHECK (source IN ('provider','ics_feed','system')),
    version INTEGER NOT NULL DEFAULT 1,
    constraint_id TEXT REFERENCES constraints(constraint_id) ON DELETE SET NULL,
    markers_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (origin_account_id, origin_event_id),
    CHECK (start_ts <= end_ts)
);

CREATE TABLE IF NOT EXISTS event_mirrors (
    mirror_id TEXT PRIMARY KEY,
    canonical_event_id TEXT NOT NULL REFERENCES canonical_events(canonical_event_id) ON DELETE CASCADE,
    target_account_id TEXT NOT NULL,
    target_calendar_id TEXT NOT NULL,
    provider_event_id TEXT,
    state TEXT NOT NULL DEFAULT 'PENDING' CHECK (state IN ('PENDING','SYNCED','DELETING','DELETED','FAILED')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS event_journal (
    journal_id TEXT PRIMARY KEY,
    canonical_event_id TEXT NOT NULL,
    ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    change_type TEXT NOT NULL CHECK (change_type IN ('created','updated','deleted','authority_conflict')),
    reason TEXT,
    patch_json TEXT,
    conflict_type TEXT NOT NULL DEFAULT 'none' CHECK (conflict_type IN ('none','field_override')),
    resolution_json TEXT
);

CREATE TABLE IF NOT EXISTS calendars (
    calendar_id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    provider_calendar_id TEXT,
    display_name TEXT,
    is_primary INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS relationships (
    relationship_id TEXT PRIMARY KEY,
    participant_hash TEXT NOT NULL UNIQUE,
    display_name TEXT,
    category TEXT NOT NULL CHECK (category IN ('FAMILY','INVESTOR','FRIEND','CLIENT','BOARD','COLLEAGUE','OTHER')),
    closeness_weight REAL NOT NULL DEFAULT 0.5,
    city TEXT,
    timezone TEXT,
    interaction_frequency_target INTEGER,
    last_interaction_ts TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS interaction_ledger (
    ledger_id TEXT PRIMARY KEY,
    participant_hash TEXT NOT NULL,
    outcome TEXT NOT NULL CHECK (outcome IN (
        'ATTENDED','CANCELED_BY_THEM','CANCELED_BY_ME','NO_SHOW_THEM','NO_SHOW_ME',
        'MOVED_LAST_MINUTE_THEM','MOVED_LAST_MINUTE_ME'
    )),
    weight REAL NOT NULL,
    canonical_event_id TEXT,
    note TEXT,
    ts TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS milestones (
    milestone_id TEXT PRIMARY KEY,
    participant_hash TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('birthday','anniversary','graduation','funding','relocation','custom')),
    date TEXT NOT NULL,
    recurs_annually INTEGER NOT NULL DEFAULT 0,
    note TEXT
);

CREATE TABLE IF NOT EXISTS drift_alerts (
    alert_id TEXT PRIMARY KEY,
    relationship_id TEXT NOT NULL REFERENCES relationships(relationship_id) ON DELETE CASCADE,
    urgency REAL NOT NULL,
    drift_ratio REAL NOT NULL,
    days_overdue INTEGER NOT NULL,
    category TEXT NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS time_commitments (
    commitment_id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL UNIQUE,
    client_name TEXT,
    target_hours REAL NOT NULL,
    window_type TEXT NOT NULL CHECK (window_type IN ('WEEKLY','MONTHLY')),
    rolling_window_weeks INTEGER NOT NULL DEFAULT 4,
    hard_minimum INTEGER NOT NULL DEFAULT 0,
    proof_required INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS commitment_reports (
    report_id TEXT PRIMARY KEY,
    commitment_id TEXT NOT NULL REFERENCES time_commitments(commitment_id) ON DELETE CASCADE,
    as_of TEXT NOT NULL,
    actual_hours REAL NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('over','compliant','under')),
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS allocations (
    allocation_id TEXT PRIMARY KEY,
    canonical_event_id TEXT NOT NULL,
    client_id TEXT NOT NULL,
    allocation_type TEXT NOT NULL DEFAULT 'BILLABLE'
);

CREATE TABLE IF NOT EXISTS policies (
    policy_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    config_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS policy_edges (
    edge_id TEXT PRIMARY KEY,
    policy_id TEXT NOT NULL REFERENCES policies(policy_id) ON DELETE CASCADE,
    constraint_id TEXT
);
"#;

const SCHEMA_V2_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_journal_event ON event_journal(canonical_event_id);
CREATE INDEX IF NOT EXISTS idx_mirrors_event ON event_mirrors(canonical_event_id);
CREATE INDEX IF NOT EXISTS idx_ledger_participant ON interaction_ledger(participant_hash);
CREATE INDEX IF NOT EXISTS idx_milestones_participant ON milestones(participant_hash);
CREATE INDEX IF NOT EXISTS idx_allocations_client ON allocations(client_id);
CREATE INDEX IF NOT EXISTS idx_events_window ON canonical_events(start_ts, end_ts);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn ensure_migrated_is_idempotent() {
        let mut conn = db::connect_memory().unwrap();
        ensure_migrated(&mut conn).unwrap();
        ensure_migrated(&mut conn).unwrap();

        let version: String = conn
            .query_row(
                "SELECT value FROM _schema_meta WHERE key = 'schema_version'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(version, "2");
    }

    #[test]
    fn ensure_migrated_creates_all_tables() {
        let mut conn = db::connect_memory().unwrap();
        ensure_migrated(&mut conn).unwrap();

        for table in [
            "canonical_events",
            "event_mirrors",
            "event_journal",
            "constraints",
            "relationships",
            "interaction_ledger",
            "milestones",
            "drift_alerts",
            "time_commitments",
            "commitment_reports",
            "allocations",
            "calendars",
            "policies",
            "policy_edges",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    rusqlite::params![table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn invalid_interval_is_rejected_by_check_constraint() {
        let mut conn = db::connect_memory().unwrap();
        ensure_migrated(&mut conn).unwrap();
        let result = conn.execute(
            "INSERT INTO canonical_events
             (canonical_event_id, origin_account_id, origin_event_id, start_ts, end_ts, created_at, updated_at)
             VALUES ('e1', 'acct', 'ev1', '2026-01-02T00:00:00Z', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }
}
