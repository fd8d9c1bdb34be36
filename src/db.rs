//! SQLite connection primitives.
//!
//! Mirrors decapod's `core::db::db_connect`: WAL mode, foreign keys on, a
//! busy timeout so lock contention retries instead of failing immediately.
//! Callers should not open connections directly for actor state — go
//! through [`crate::actor::ActorRegistry`], which serializes access per
//! user the way decapod's `DbBroker` serializes access per database file.

use crate::error::TminusError;
use rusqlite::Connection;
use std::path::Path;

pub fn connect(db_path: &Path) -> Result<Connection, TminusError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

pub fn connect_memory() -> Result<Connection, TminusError> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_enables_foreign_keys() {
        let conn = connect_memory().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn connect_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("actor.sqlite3");
        let conn = connect(&db_path).unwrap();
        drop(conn);
        assert!(db_path.exists());
    }
}
