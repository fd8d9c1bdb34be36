//! Crate configuration.
//!
//! Loaded the way decapod's `core::proof` loads `proofs.toml`: a TOML file
//! read with `serde` if present, falling back to documented defaults when
//! it is absent. `MASTER_KEY` (used to sign deletion certificates, spec
//! §4.9) is never read from this file — it comes from the environment only.

use crate::error::TminusError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

const MASTER_KEY_ENV: &str = "TMINUS_MASTER_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TminusConfig {
    /// Root directory holding one SQLite file per user actor.
    #[serde(default = "default_actors_dir")]
    pub actors_dir: PathBuf,
    /// Path to the shared registry (users/accounts/api_keys/...) database.
    #[serde(default = "default_registry_db")]
    pub registry_db: PathBuf,
    /// Root directory simulating the audit blob store during local runs.
    #[serde(default = "default_blob_dir")]
    pub blob_dir: PathBuf,
    /// HTTP bind address for the dispatch surface.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for TminusConfig {
    fn default() -> Self {
        Self {
            actors_dir: default_actors_dir(),
            registry_db: default_registry_db(),
            blob_dir: default_blob_dir(),
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_actors_dir() -> PathBuf {
    PathBuf::from("./data/actors")
}

fn default_registry_db() -> PathBuf {
    PathBuf::from("./data/registry.sqlite3")
}

fn default_blob_dir() -> PathBuf {
    PathBuf::from("./data/blobs")
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl TminusConfig {
    /// Load from `<root>/tminus.toml` if present, otherwise defaults.
    pub fn load(root: &Path) -> Result<Self, TminusError> {
        let config_path = root.join("tminus.toml");
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&config_path)?;
        toml::from_str(&content).map_err(|e| TminusError::Validation(e.to_string()))
    }

    /// Path to the SQLite file backing one user's actor store.
    pub fn actor_db_path(&self, user_id: &str) -> PathBuf {
        self.actors_dir.join(format!("{}.sqlite3", user_id))
    }

    /// HMAC signing key for deletion certificates. Read fresh on every
    /// call rather than cached, so tests can swap it via `std::env::set_var`.
    pub fn master_key() -> Result<Vec<u8>, TminusError> {
        env::var(MASTER_KEY_ENV)
            .map(|s| s.into_bytes())
            .map_err(|_| {
                TminusError::Validation(format!("{} environment variable not set", MASTER_KEY_ENV))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_paths() {
        let cfg = TminusConfig::default();
        assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
        assert!(cfg.actor_db_path("user_1").ends_with("user_1.sqlite3"));
    }

    #[test]
    fn load_falls_back_to_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TminusConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.listen_addr, default_listen_addr());
    }

    #[test]
    fn master_key_reads_env_var() {
        unsafe {
            env::set_var(MASTER_KEY_ENV, "test-key-material");
        }
        let key = TminusConfig::master_key().unwrap();
        assert_eq!(key, b"test-key-material".to_vec());
        unsafe {
            env::remove_var(MASTER_KEY_ENV);
        }
    }
}
