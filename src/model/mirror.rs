//! Event mirror rows: outgoing structural references.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MirrorState {
    Pending,
    Synced,
    Deleting,
    Deleted,
    Failed,
}

impl MirrorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorState::Pending => "PENDING",
            MirrorState::Synced => "SYNCED",
            MirrorState::Deleting => "DELETING",
            MirrorState::Deleted => "DELETED",
            MirrorState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(MirrorState::Pending),
            "SYNCED" => Some(MirrorState::Synced),
            "DELETING" => Some(MirrorState::Deleting),
            "DELETED" => Some(MirrorState::Deleted),
            "FAILED" => Some(MirrorState::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMirror {
    pub mirror_id: String,
    pub canonical_event_id: String,
    pub target_account_id: String,
    pub target_calendar_id: String,
    pub provider_event_id: Option<String>,
    pub state: MirrorState,
    pub created_at: String,
    pub updated_at: String,
}
