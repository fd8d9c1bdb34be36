//! Append-only journal rows.

use crate::model::event::FieldConflict;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
    AuthorityConflict,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Updated => "updated",
            ChangeType::Deleted => "deleted",
            ChangeType::AuthorityConflict => "authority_conflict",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    None,
    FieldOverride,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::None => "none",
            ConflictType::FieldOverride => "field_override",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub strategy: String,
    pub conflicts: Vec<FieldConflict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub journal_id: String,
    pub canonical_event_id: String,
    pub ts: String,
    pub actor: String,
    pub change_type: ChangeType,
    pub reason: Option<String>,
    pub patch_json: Option<serde_json::Value>,
    pub conflict_type: ConflictType,
    pub resolution: Option<ConflictResolution>,
}
