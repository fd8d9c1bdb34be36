//! Per-user actor registry.
//!
//! Mirrors decapod's `DbBroker::get_db_lock` (`core::broker`): a global map
//! from key to `Arc<Mutex<()>>` means two operations against the same
//! user's database serialize, while operations against different users run
//! concurrently. Unlike `DbBroker`, there is no JSONL broker-event log here
//! — the per-user `event_journal` table already records every mutation
//!, so a second audit trail would just duplicate it.

use crate::config::TminusConfig;
use crate::db;
use crate::error::TminusError;
use crate::migration;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

type LockMap = Mutex<HashMap<String, Arc<Mutex<()>>>>;

fn locks() -> &'static LockMap {
    static LOCKS: OnceLock<LockMap> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn get_user_lock(user_id: &str) -> Arc<Mutex<()>> {
    let mut map = locks().lock().expect("actor lock map poisoned");
    map.entry(user_id.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Serializes access to each user's actor database.
#[derive(Clone)]
pub struct ActorRegistry {
    config: TminusConfig,
}

impl ActorRegistry {
    pub fn new(config: TminusConfig) -> Self {
        Self { config }
    }

    /// Run `f` against `user_id`'s actor connection, holding that user's
    /// lock for the duration. Migrations are applied before `f` runs, so
    /// every caller always sees the current schema.
    pub fn with_user_conn<F, R>(&self, user_id: &str, f: F) -> Result<R, TminusError>
    where
        F: FnOnce(&mut Connection) -> Result<R, TminusError>,
    {
        let _span = tracing::info_span!("actor_op", user_id).entered();
        let lock = get_user_lock(user_id);
        let _guard = lock.lock().expect("actor lock poisoned");

        let db_path = self.config.actor_db_path(user_id);
        let mut conn = db::connect(&db_path)?;
        migration::ensure_migrated(&mut conn)?;
        f(&mut conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> (ActorRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TminusConfig::default();
        config.actors_dir = dir.path().join("actors");
        (ActorRegistry::new(config), dir)
    }

    #[test]
    fn with_user_conn_applies_migrations_and_persists_across_calls() {
        let (registry, _dir) = test_registry();

        registry
            .with_user_conn("user_1", |conn| {
                conn.execute(
                    "INSERT INTO relationships
                     (relationship_id, participant_hash, category, created_at, updated_at)
                     VALUES ('r1', 'hash1', 'FRIEND', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let count: i64 = registry
            .with_user_conn("user_1", |conn| {
                Ok(conn.query_row("SELECT count(*) FROM relationships", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn different_users_get_independent_databases() {
        let (registry, _dir) = test_registry();

        registry
            .with_user_conn("user_a", |conn| {
                conn.execute(
                    "INSERT INTO relationships
                     (relationship_id, participant_hash, category, created_at, updated_at)
                     VALUES ('r1', 'hash1', 'FRIEND', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let count: i64 = registry
            .with_user_conn("user_b", |conn| {
                Ok(conn.query_row("SELECT count(*) FROM relationships", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn same_user_lock_is_reused() {
        let lock_a = get_user_lock("same_user");
        let lock_b = get_user_lock("same_user");
        assert!(Arc::ptr_eq(&lock_a, &lock_b));
    }
}
