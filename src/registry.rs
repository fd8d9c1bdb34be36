//! The registry: the one global SQLite store shared across all user
//! actors — `users`, `accounts`, `api_keys`,
//! `deletion_requests`, `deletion_certificates`. Everything else in this
//! crate is scoped to a single user's actor database; the registry is the
//! deliberate exception, so it gets its own connection and its own
//! migration set rather than living in [`crate::migration`].

use crate::error::TminusError;
use crate::model::registry::{
    Account, AccountStatus, ApiKey, DeletionCertificate, DeletionRequest, DeletionRequestStatus, User,
};
use crate::time;
use rusqlite::{params, Connection, OptionalExtension, Row};

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    org_id TEXT,
    email TEXT NOT NULL,
    display_name TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS accounts (
    account_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    provider TEXT NOT NULL,
    provider_subject TEXT,
    email TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active','revoked','expired')),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_keys (
    key_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    label TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deletion_requests (
    request_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','processing','completed','failed')),
    requested_at TEXT NOT NULL,
    scheduled_at TEXT,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS deletion_certificates (
    certificate_id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    deleted_at TEXT NOT NULL,
    deletion_summary_json TEXT NOT NULL,
    proof_hash TEXT NOT NULL,
    signature TEXT NOT NULL,
    UNIQUE (entity_type, entity_id, proof_hash)
);

CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);
CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id);
CREATE INDEX IF NOT EXISTS idx_deletion_requests_user ON deletion_requests(user_id);
"#;

/// Mirrors [`crate::migration::ensure_migrated`]'s idempotent single-version
/// bump, sized down to the registry's one-migration schema.
pub fn ensure_migrated(conn: &mut Connection) -> Result<(), TminusError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;
    let current: i64 = conn
        .query_row("SELECT value FROM _schema_meta WHERE key = 'schema_version'", [], |row| {
            row.get::<_, String>(0)
        })
        .optional()?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if current >= 1 {
        return Ok(());
    }
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_V1)?;
    tx.execute(
        "INSERT INTO _schema_meta (key, value) VALUES ('schema_version', '1')
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [],
    )?;
    tx.commit()?;
    Ok(())
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get("user_id")?,
        org_id: row.get("org_id")?,
        email: row.get("email")?,
        display_name: row.get("display_name")?,
        created_at: row.get("created_at")?,
    })
}

pub fn create_user(conn: &Connection, user_id: &str, org_id: Option<&str>, email: &str, display_name: Option<&str>) -> Result<User, TminusError> {
    let user = User {
        user_id: user_id.to_string(),
        org_id: org_id.map(str::to_string),
        email: email.to_string(),
        display_name: display_name.map(str::to_string),
        created_at: time::now_iso(),
    };
    conn.execute(
        "INSERT INTO users (user_id, org_id, email, display_name, created_at) VALUES (?1,?2,?3,?4,?5)",
        params![user.user_id, user.org_id, user.email, user.display_name, user.created_at],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            TminusError::Uniqueness(format!("user '{user_id}' already exists"))
        }
        other => TminusError::Rusqlite(other),
    })?;
    Ok(user)
}

pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<User>, TminusError> {
    conn.query_row(
        "SELECT user_id, org_id, email, display_name, created_at FROM users WHERE user_id = ?1",
        params![user_id],
        row_to_user,
    )
    .optional()
    .map_err(TminusError::from)
}

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    let status: String = row.get("status")?;
    Ok(Account {
        account_id: row.get("account_id")?,
        user_id: row.get("user_id")?,
        provider: row.get("provider")?,
        provider_subject: row.get("provider_subject")?,
        email: row.get("email")?,
        status: AccountStatus::parse(&status).unwrap_or(AccountStatus::Active),
        created_at: row.get("created_at")?,
    })
}

pub fn create_account(conn: &Connection, user_id: &str, provider: &str, provider_subject: Option<&str>, email: Option<&str>) -> Result<Account, TminusError> {
    let account = Account {
        account_id: time::new_id(),
        user_id: user_id.to_string(),
        provider: provider.to_string(),
        provider_subject: provider_subject.map(str::to_string),
        email: email.map(str::to_string),
        status: AccountStatus::Active,
        created_at: time::now_iso(),
    };
    conn.execute(
        "INSERT INTO accounts (account_id, user_id, provider, provider_subject, email, status, created_at) \
         VALUES (?1,?2,?3,?4,?5,?6,?7)",
        params![
            account.account_id,
            account.user_id,
            account.provider,
            account.provider_subject,
            account.email,
            account.status.as_str(),
            account.created_at,
        ],
    )?;
    Ok(account)
}

/// Accounts belonging to a user, ordered by creation. Called before
/// deletion step 5 destroys them, so the deletion workflow can still
/// enqueue per-account cleanup in step 7.
pub fn list_accounts_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Account>, TminusError> {
    let mut stmt = conn.prepare(
        "SELECT account_id, user_id, provider, provider_subject, email, status, created_at \
         FROM accounts WHERE user_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![user_id], row_to_account)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn create_api_key(conn: &Connection, user_id: &str, label: Option<&str>) -> Result<ApiKey, TminusError> {
    let key = ApiKey {
        key_id: time::new_id(),
        user_id: user_id.to_string(),
        label: label.map(str::to_string),
        created_at: time::now_iso(),
    };
    conn.execute(
        "INSERT INTO api_keys (key_id, user_id, label, created_at) VALUES (?1,?2,?3,?4)",
        params![key.key_id, key.user_id, key.label, key.created_at],
    )?;
    Ok(key)
}

fn row_to_deletion_request(row: &Row) -> rusqlite::Result<DeletionRequest> {
    let status: String = row.get("status")?;
    Ok(DeletionRequest {
        request_id: row.get("request_id")?,
        user_id: row.get("user_id")?,
        status: DeletionRequestStatus::parse(&status).unwrap_or(DeletionRequestStatus::Pending),
        requested_at: row.get("requested_at")?,
        scheduled_at: row.get("scheduled_at")?,
        completed_at: row.get("completed_at")?,
    })
}

pub fn create_deletion_request(conn: &Connection, user_id: &str) -> Result<DeletionRequest, TminusError> {
    let request = DeletionRequest {
        request_id: time::new_id(),
        user_id: user_id.to_string(),
        status: DeletionRequestStatus::Pending,
        requested_at: time::now_iso(),
        scheduled_at: None,
        completed_at: None,
    };
    conn.execute(
        "INSERT INTO deletion_requests (request_id, user_id, status, requested_at) VALUES (?1,?2,?3,?4)",
        params![request.request_id, request.user_id, request.status.as_str(), request.requested_at],
    )?;
    Ok(request)
}

pub fn get_deletion_request(conn: &Connection, request_id: &str) -> Result<Option<DeletionRequest>, TminusError> {
    conn.query_row(
        "SELECT request_id, user_id, status, requested_at, scheduled_at, completed_at \
         FROM deletion_requests WHERE request_id = ?1",
        params![request_id],
        row_to_deletion_request,
    )
    .optional()
    .map_err(TminusError::from)
}

/// Moves a request from `processing` to `completed` (deletion step 9).
/// A no-op (but still `Ok`) if the request is already completed, so a
/// retried workflow run stays idempotent.
pub fn complete_deletion_request(conn: &Connection, request_id: &str) -> Result<(), TminusError> {
    let now = time::now_iso();
    conn.execute(
        "UPDATE deletion_requests SET status = 'completed', completed_at = ?1 \
         WHERE request_id = ?2 AND status != 'completed'",
        params![now, request_id],
    )?;
    Ok(())
}

pub fn mark_deletion_request_processing(conn: &Connection, request_id: &str) -> Result<(), TminusError> {
    conn.execute(
        "UPDATE deletion_requests SET status = 'processing' WHERE request_id = ?1 AND status = 'pending'",
        params![request_id],
    )?;
    Ok(())
}

/// Upsert-ignore: a retried deletion run may regenerate a certificate with
/// a new `certificate_id`; duplicates are acceptable, but a byte-identical
/// re-insert (same hash) is a true no-op.
pub fn insert_deletion_certificate(conn: &Connection, cert: &DeletionCertificate) -> Result<(), TminusError> {
    let summary_json = serde_json::to_string(&cert.deletion_summary).map_err(|e| TminusError::Registry(e.to_string()))?;
    conn.execute(
        "INSERT INTO deletion_certificates \
         (certificate_id, entity_type, entity_id, deleted_at, deletion_summary_json, proof_hash, signature) \
         VALUES (?1,?2,?3,?4,?5,?6,?7) \
         ON CONFLICT (entity_type, entity_id, proof_hash) DO NOTHING",
        params![
            cert.certificate_id,
            cert.entity_type,
            cert.entity_id,
            cert.deleted_at,
            summary_json,
            cert.proof_hash,
            cert.signature,
        ],
    )?;
    Ok(())
}

pub fn get_deletion_certificate(conn: &Connection, certificate_id: &str) -> Result<Option<DeletionCertificate>, TminusError> {
    use crate::model::registry::DeletionSummary;
    conn.query_row(
        "SELECT certificate_id, entity_type, entity_id, deleted_at, deletion_summary_json, proof_hash, signature \
         FROM deletion_certificates WHERE certificate_id = ?1",
        params![certificate_id],
        |row| {
            let summary_json: String = row.get("deletion_summary_json")?;
            Ok(DeletionCertificate {
                certificate_id: row.get("certificate_id")?,
                entity_type: row.get("entity_type")?,
                entity_id: row.get("entity_id")?,
                deleted_at: row.get("deleted_at")?,
                deletion_summary: serde_json::from_str::<DeletionSummary>(&summary_json).unwrap_or_default(),
                proof_hash: row.get("proof_hash")?,
                signature: row.get("signature")?,
            })
        },
    )
    .optional()
    .map_err(TminusError::from)
}

/// Registry rows: deletes `accounts`, then `api_keys`, then `users`, in
/// that FK order (deletion workflow step 5). Returns the count of rows
/// removed across all three tables.
pub fn delete_user_registry_rows(conn: &Connection, user_id: &str) -> Result<i64, TminusError> {
    let accounts = conn.execute("DELETE FROM accounts WHERE user_id = ?1", params![user_id])?;
    let api_keys = conn.execute("DELETE FROM api_keys WHERE user_id = ?1", params![user_id])?;
    let users = conn.execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;
    Ok((accounts + api_keys + users) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn conn() -> Connection {
        let mut conn = db::connect_memory().unwrap();
        ensure_migrated(&mut conn).unwrap();
        conn
    }

    #[test]
    fn ensure_migrated_is_idempotent() {
        let mut conn = conn();
        ensure_migrated(&mut conn).unwrap();
        let version: String = conn.query_row("SELECT value FROM _schema_meta WHERE key = 'schema_version'", [], |r| r.get(0)).unwrap();
        assert_eq!(version, "1");
    }

    #[test]
    fn create_user_rejects_duplicate_id() {
        let conn = conn();
        create_user(&conn, "u1", None, "a@example.com", None).unwrap();
        let result = create_user(&conn, "u1", None, "b@example.com", None);
        assert!(matches!(result, Err(TminusError::Uniqueness(_))));
    }

    #[test]
    fn list_accounts_for_user_orders_by_creation() {
        let conn = conn();
        create_user(&conn, "u1", None, "a@example.com", None).unwrap();
        create_account(&conn, "u1", "google", Some("sub-1"), None).unwrap();
        create_account(&conn, "u1", "outlook", Some("sub-2"), None).unwrap();
        let accounts = list_accounts_for_user(&conn, "u1").unwrap();
        assert_eq!(accounts.len(), 2);
    }

    #[test]
    fn delete_user_registry_rows_removes_accounts_and_keys() {
        let conn = conn();
        create_user(&conn, "u1", None, "a@example.com", None).unwrap();
        create_account(&conn, "u1", "google", Some("sub-1"), None).unwrap();
        create_api_key(&conn, "u1", Some("primary")).unwrap();

        let deleted = delete_user_registry_rows(&conn, "u1").unwrap();
        assert_eq!(deleted, 3);
        assert!(get_user(&conn, "u1").unwrap().is_none());
        assert!(list_accounts_for_user(&conn, "u1").unwrap().is_empty());

        // idempotent: re-running on an already-deleted user deletes nothing more
        let deleted_again = delete_user_registry_rows(&conn, "u1").unwrap();
        assert_eq!(deleted_again, 0);
    }

    #[test]
    fn complete_deletion_request_is_idempotent() {
        let conn = conn();
        let request = create_deletion_request(&conn, "u1").unwrap();
        mark_deletion_request_processing(&conn, &request.request_id).unwrap();
        complete_deletion_request(&conn, &request.request_id).unwrap();
        complete_deletion_request(&conn, &request.request_id).unwrap();
        let reloaded = get_deletion_request(&conn, &request.request_id).unwrap().unwrap();
        assert_eq!(reloaded.status, DeletionRequestStatus::Completed);
    }
}
