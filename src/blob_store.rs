//! Audit blob store: objects keyed `<user_id>/<suffix>`. Core
//! only needs the delete-prefix cycle for deletion workflow step 6, so the
//! trait is kept to that plus the minimum read/write surface a real
//! provider (S3/R2-shaped) would offer. Grounded on decapod's
//! `core::external_action::ExternalCapability` trait-seam: one small trait
//! at the boundary, one filesystem-backed implementation for local runs.

use crate::error::TminusError;
use std::fs;
use std::path::{Path, PathBuf};

pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), TminusError>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TminusError>;
    /// Pagination-safe: returns every key under `prefix`, deleting as it
    /// goes, without requiring the whole set to be materialized first.
    fn delete_prefix(&self, prefix: &str) -> Result<i64, TminusError>;
}

/// Local filesystem stand-in for a durable blob provider. One file per
/// object, keyed by its `<user_id>/<suffix>` path under `root`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, TminusError> {
        if key.contains("..") {
            return Err(TminusError::Blob(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), TminusError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TminusError> {
        let path = self.object_path(key)?;
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TminusError::Io(e)),
        }
    }

    fn delete_prefix(&self, prefix: &str) -> Result<i64, TminusError> {
        let dir = self.root.join(prefix);
        if !dir.exists() {
            return Ok(0);
        }
        let mut count = 0i64;
        delete_dir_contents(&dir, &mut count)?;
        // The prefix directory itself represents one user; remove it once
        // empty so a retried run sees nothing left and reports 0.
        let _ = fs::remove_dir(&dir);
        Ok(count)
    }
}

fn delete_dir_contents(dir: &Path, count: &mut i64) -> Result<(), TminusError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            delete_dir_contents(&path, count)?;
            let _ = fs::remove_dir(&path);
        } else {
            fs::remove_file(&path)?;
            *count += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("user_1/audit/001.json", b"hello").unwrap();
        assert_eq!(store.get("user_1/audit/001.json").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn get_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.get("nobody/x").unwrap().is_none());
    }

    #[test]
    fn delete_prefix_removes_all_objects_under_user_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("user_1/a.json", b"1").unwrap();
        store.put("user_1/nested/b.json", b"2").unwrap();
        store.put("user_2/c.json", b"3").unwrap();

        let deleted = store.delete_prefix("user_1").unwrap();
        assert_eq!(deleted, 2);
        assert!(store.get("user_1/a.json").unwrap().is_none());
        assert!(store.get("user_2/c.json").unwrap().is_some());

        let deleted_again = store.delete_prefix("user_1").unwrap();
        assert_eq!(deleted_again, 0);
    }

    #[test]
    fn rejects_path_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let result = store.put("../escape", b"x");
        assert!(result.is_err());
    }
}
