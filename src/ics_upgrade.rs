//! ICS→OAuth account upgrade: merges events that were tracked
//! via a read-only ICS feed into a newly connected OAuth account.

use crate::model::event::{CanonicalEvent, DeltaKind, EventFieldPatch, EventSource, EventStatus, Transparency};
use crate::model::journal::{ChangeType, ConflictType, JournalEntry};
use crate::store::canonical_store::{apply_provider_delta, delete_event, get_event, ProviderDelta};
use crate::{time, TminusError};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// An ICS-sourced event matched to a new OAuth event by the caller (e.g. by
/// `ical_uid`), carrying whichever fields the OAuth side enriched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedEvent {
    pub ics_canonical_event_id: String,
    pub origin_event_id: String,
    pub matched_by: String,
    pub enriched_fields: EventFieldPatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub origin_event_id: String,
    pub fields: EventFieldPatch,
}

/// An ICS event with no OAuth counterpart; carried forward unchanged under
/// the new account, still sourced from the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanedEvent {
    pub ics_canonical_event_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcsUpgradeRequest {
    pub ics_account_id: String,
    pub oauth_account_id: String,
    pub merged_events: Vec<MergedEvent>,
    pub new_events: Vec<NewEvent>,
    pub orphaned_events: Vec<OrphanedEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcsUpgradeOutcome {
    pub deleted_ics_events: i64,
    pub merged: i64,
    pub created: i64,
    pub orphaned: i64,
}

fn insert_journal(conn: &Connection, entry: &JournalEntry) -> Result<(), TminusError> {
    conn.execute(
        "INSERT INTO event_journal
         (journal_id, canonical_event_id, ts, actor, change_type, reason, patch_json, conflict_type, resolution_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            entry.journal_id,
            entry.canonical_event_id,
            entry.ts,
            entry.actor,
            entry.change_type.as_str(),
            entry.reason,
            entry.patch_json.as_ref().map(|v| v.to_string()),
            entry.conflict_type.as_str(),
            None::<String>,
        ],
    )?;
    Ok(())
}

/// 4 ordered steps. Transactional at the actor level: the caller must run
/// this inside a single SQL transaction (all statements here use the plain
/// `Connection` so the caller controls the boundary, matching the pattern
/// already used across this crate's other multi-statement operations).
pub fn execute_upgrade(conn: &mut Connection, request: &IcsUpgradeRequest) -> Result<IcsUpgradeOutcome, TminusError> {
    let tx = conn.transaction()?;

    // Snapshot orphans before step 1 deletes their rows, so step 4 can
    // re-insert them under the new account.
    let mut orphan_snapshots = Vec::with_capacity(request.orphaned_events.len());
    for orphan in &request.orphaned_events {
        if let Some(snapshot) = get_event(&tx, &orphan.ics_canonical_event_id)? {
            orphan_snapshots.push(snapshot);
        }
    }

    // Step 1: delete all canonical events of the ICS account.
    let mut deleted_ics_events = 0i64;
    {
        let mut stmt = tx.prepare("SELECT canonical_event_id FROM canonical_events WHERE origin_account_id = ?1")?;
        let ids: Vec<String> = stmt
            .query_map(rusqlite::params![request.ics_account_id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        for id in ids {
            if delete_event(&tx, &id, "tminus", "ics_upgrade")? {
                deleted_ics_events += 1;
            }
        }
    }

    // Step 2: insert merged_events under the OAuth account with
    // authority markers from enriched_fields.
    let mut merged = 0i64;
    for merge in &request.merged_events {
        let delta = ProviderDelta {
            origin_account_id: request.oauth_account_id.clone(),
            origin_event_id: merge.origin_event_id.clone(),
            kind: DeltaKind::Created,
            fields: merge.enriched_fields.clone(),
        };
        let outcome = apply_provider_delta(&tx, &delta, &format!("provider:{}", request.oauth_account_id))?;

        let mut patch = serde_json::to_value(&merge.enriched_fields).unwrap_or(serde_json::json!({}));
        if let serde_json::Value::Object(ref mut map) = patch {
            map.insert("matched_by".to_string(), serde_json::Value::String(merge.matched_by.clone()));
        }
        let entry = JournalEntry {
            journal_id: time::new_id(),
            canonical_event_id: outcome.event.canonical_event_id.clone(),
            ts: time::now_iso(),
            actor: "tminus".to_string(),
            change_type: ChangeType::Created,
            reason: Some("ics_upgrade_merged".to_string()),
            patch_json: Some(patch),
            conflict_type: ConflictType::None,
            resolution: None,
        };
        insert_journal(&tx, &entry)?;
        merged += 1;
    }

    // Step 3: insert new_events under the OAuth account.
    let mut created = 0i64;
    for new_event in &request.new_events {
        let delta = ProviderDelta {
            origin_account_id: request.oauth_account_id.clone(),
            origin_event_id: new_event.origin_event_id.clone(),
            kind: DeltaKind::Created,
            fields: new_event.fields.clone(),
        };
        let outcome = apply_provider_delta(&tx, &delta, &format!("provider:{}", request.oauth_account_id))?;
        let entry = JournalEntry {
            journal_id: time::new_id(),
            canonical_event_id: outcome.event.canonical_event_id.clone(),
            ts: time::now_iso(),
            actor: "tminus".to_string(),
            change_type: ChangeType::Created,
            reason: Some("ics_upgrade_new".to_string()),
            patch_json: None,
            conflict_type: ConflictType::None,
            resolution: None,
        };
        insert_journal(&tx, &entry)?;
        created += 1;
    }

    // Step 4: re-insert orphaned ICS events under the OAuth account,
    // preserving source = ics_feed, from the snapshots captured before
    // step 1 deleted their rows.
    let mut orphaned = 0i64;
    for snapshot in &orphan_snapshots {
        reinsert_orphan(&tx, &request.oauth_account_id, snapshot)?;
        orphaned += 1;
    }

    tx.commit()?;
    Ok(IcsUpgradeOutcome {
        deleted_ics_events,
        merged,
        created,
        orphaned,
    })
}

/// Re-inserts one orphaned ICS event under the OAuth account with
/// `source = ics_feed` preserved. Called once per orphan with the event's
/// pre-deletion snapshot, since step 1 removes the original row before
/// this step runs.
pub fn reinsert_orphan(conn: &Connection, oauth_account_id: &str, snapshot: &CanonicalEvent) -> Result<CanonicalEvent, TminusError> {
    let mut event = snapshot.clone();
    event.canonical_event_id = time::new_id();
    event.origin_account_id = oauth_account_id.to_string();
    event.source = EventSource::IcsFeed;
    event.version = 1;
    let now = time::now_iso();
    event.created_at = now.clone();
    event.updated_at = now.clone();

    conn.execute(
        "INSERT INTO canonical_events
         (canonical_event_id, origin_account_id, origin_event_id, title, description, location,
          start_ts, end_ts, timezone, status, visibility, transparency, all_day, recurrence_rule,
          source, version, constraint_id, markers_json, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
        rusqlite::params![
            event.canonical_event_id,
            event.origin_account_id,
            event.origin_event_id,
            event.title,
            event.description,
            event.location,
            event.start_ts,
            event.end_ts,
            event.timezone,
            event.status.as_str(),
            event.visibility,
            event.transparency.as_str(),
            event.all_day as i64,
            event.recurrence_rule,
            event.source.as_str(),
            event.version,
            event.constraint_id,
            serde_json::to_string(&event.markers).unwrap_or_else(|_| "{}".to_string()),
            event.created_at,
            event.updated_at,
        ],
    )?;

    let entry = JournalEntry {
        journal_id: time::new_id(),
        canonical_event_id: event.canonical_event_id.clone(),
        ts: time::now_iso(),
        actor: "tminus".to_string(),
        change_type: ChangeType::Created,
        reason: Some("ics_upgrade_orphan".to_string()),
        patch_json: None,
        conflict_type: ConflictType::None,
        resolution: None,
    };
    insert_journal(conn, &entry)?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migration};
    use crate::model::event::EventStatus as Status;

    fn conn() -> Connection {
        let mut conn = db::connect_memory().unwrap();
        migration::ensure_migrated(&mut conn).unwrap();
        conn
    }

    fn seed_ics_event(conn: &Connection, account: &str, origin_id: &str) -> CanonicalEvent {
        let delta = ProviderDelta {
            origin_account_id: account.to_string(),
            origin_event_id: origin_id.to_string(),
            kind: DeltaKind::Created,
            fields: EventFieldPatch {
                title: Some("Team Sync".to_string()),
                start_ts: Some("2026-03-01T10:00:00Z".to_string()),
                end_ts: Some("2026-03-01T10:30:00Z".to_string()),
                ..Default::default()
            },
        };
        apply_provider_delta(conn, &delta, &format!("provider:{account}")).unwrap().event
    }

    #[test]
    fn upgrade_deletes_ics_events_and_creates_merged_and_new() {
        let mut conn = conn();
        let ics_event = seed_ics_event(&conn, "ics-acct", "uid-1");

        let request = IcsUpgradeRequest {
            ics_account_id: "ics-acct".to_string(),
            oauth_account_id: "oauth-acct".to_string(),
            merged_events: vec![MergedEvent {
                ics_canonical_event_id: ics_event.canonical_event_id.clone(),
                origin_event_id: "oauth-ev-1".to_string(),
                matched_by: "ical_uid".to_string(),
                enriched_fields: EventFieldPatch {
                    title: Some("Team Sync".to_string()),
                    start_ts: Some("2026-03-01T10:00:00Z".to_string()),
                    end_ts: Some("2026-03-01T10:30:00Z".to_string()),
                    ..Default::default()
                },
            }],
            new_events: vec![NewEvent {
                origin_event_id: "oauth-ev-2".to_string(),
                fields: EventFieldPatch {
                    title: Some("New Meeting".to_string()),
                    start_ts: Some("2026-03-02T10:00:00Z".to_string()),
                    end_ts: Some("2026-03-02T11:00:00Z".to_string()),
                    ..Default::default()
                },
            }],
            orphaned_events: vec![],
        };

        let outcome = execute_upgrade(&mut conn, &request).unwrap();
        assert_eq!(outcome.deleted_ics_events, 1);
        assert_eq!(outcome.merged, 1);
        assert_eq!(outcome.created, 1);

        assert!(get_event(&conn, &ics_event.canonical_event_id).unwrap().is_none());

        let reason: String = conn
            .query_row(
                "SELECT reason FROM event_journal WHERE change_type = 'created' AND reason = 'ics_upgrade_merged'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(reason, "ics_upgrade_merged");
    }

    #[test]
    fn upgrade_reinserts_orphan_under_oauth_account() {
        let mut conn = conn();
        let orphan_event = seed_ics_event(&conn, "ics-acct", "uid-orphan");

        let request = IcsUpgradeRequest {
            ics_account_id: "ics-acct".to_string(),
            oauth_account_id: "oauth-acct".to_string(),
            merged_events: vec![],
            new_events: vec![],
            orphaned_events: vec![OrphanedEvent {
                ics_canonical_event_id: orphan_event.canonical_event_id.clone(),
            }],
        };

        let outcome = execute_upgrade(&mut conn, &request).unwrap();
        assert_eq!(outcome.deleted_ics_events, 1);
        assert_eq!(outcome.orphaned, 1);

        assert!(get_event(&conn, &orphan_event.canonical_event_id).unwrap().is_none());

        let reinserted: (String, String) = conn
            .query_row(
                "SELECT source, origin_account_id FROM canonical_events WHERE origin_event_id = ?1",
                rusqlite::params![orphan_event.origin_event_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(reinserted.0, "ics_feed");
        assert_eq!(reinserted.1, "oauth-acct");
    }

    #[test]
    fn orphan_preserves_ics_feed_source_under_oauth_account() {
        let conn = conn();
        let ics_event = seed_ics_event(&conn, "ics-acct", "uid-orphan");
        let mut snapshot = ics_event.clone();
        snapshot.status = Status::Confirmed;
        let reinserted = reinsert_orphan(&conn, "oauth-acct", &snapshot).unwrap();
        assert_eq!(reinserted.source, EventSource::IcsFeed);
        assert_eq!(reinserted.origin_account_id, "oauth-acct");
    }
}
