//! Registry (global) row types: `users`, `accounts`,
//! `api_keys`, `deletion_requests`, `deletion_certificates`. These live
//! outside any single user's actor database — see [`crate::registry`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub org_id: Option<String>,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Revoked,
    Expired,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Revoked => "revoked",
            AccountStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "revoked" => Some(AccountStatus::Revoked),
            "expired" => Some(AccountStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub user_id: String,
    pub provider: String,
    pub provider_subject: Option<String>,
    pub email: Option<String>,
    pub status: AccountStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key_id: String,
    pub user_id: String,
    pub label: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionRequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DeletionRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeletionRequestStatus::Pending => "pending",
            DeletionRequestStatus::Processing => "processing",
            DeletionRequestStatus::Completed => "completed",
            DeletionRequestStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeletionRequestStatus::Pending),
            "processing" => Some(DeletionRequestStatus::Processing),
            "completed" => Some(DeletionRequestStatus::Completed),
            "failed" => Some(DeletionRequestStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub request_id: String,
    pub user_id: String,
    pub status: DeletionRequestStatus,
    pub requested_at: String,
    pub scheduled_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Per-step counts reported by the deletion workflow. No
/// PII — counts only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub events_deleted: i64,
    pub mirrors_deleted: i64,
    pub journal_entries_deleted: i64,
    pub relationship_records_deleted: i64,
    pub d1_rows_deleted: i64,
    pub r2_objects_deleted: i64,
    pub provider_deletions_enqueued: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionCertificate {
    pub certificate_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub deleted_at: String,
    pub deletion_summary: DeletionSummary,
    /// Lowercase hex, 64 chars.
    pub proof_hash: String,
    /// Lowercase hex, 64 chars.
    pub signature: String,
}

/// `{step, deleted, ok}` reported by each of the 9 deletion steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: u8,
    pub deleted: i64,
    pub ok: bool,
}
