//! Time commitments, their status reports, and client allocations
//!.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommitmentWindow {
    Weekly,
    Monthly,
}

impl CommitmentWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentWindow::Weekly => "WEEKLY",
            CommitmentWindow::Monthly => "MONTHLY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WEEKLY" => Some(CommitmentWindow::Weekly),
            "MONTHLY" => Some(CommitmentWindow::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeCommitment {
    pub commitment_id: String,
    pub client_id: String,
    pub client_name: Option<String>,
    pub target_hours: f64,
    pub window_type: CommitmentWindow,
    pub rolling_window_weeks: i64,
    pub hard_minimum: bool,
    pub proof_required: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentStatus {
    Over,
    Compliant,
    Under,
}

impl CommitmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentStatus::Over => "over",
            CommitmentStatus::Compliant => "compliant",
            CommitmentStatus::Under => "under",
        }
    }

    /// Over at >120% of target, compliant at >=100%, else under.
    pub fn classify(actual_hours: f64, target_hours: f64) -> Self {
        if actual_hours > target_hours * 1.2 {
            CommitmentStatus::Over
        } else if actual_hours >= target_hours {
            CommitmentStatus::Compliant
        } else {
            CommitmentStatus::Under
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentReport {
    pub report_id: String,
    pub commitment_id: String,
    pub as_of: String,
    pub actual_hours: f64,
    pub status: CommitmentStatus,
    pub computed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: String,
    pub canonical_event_id: String,
    pub client_id: String,
    pub allocation_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundaries() {
        assert_eq!(CommitmentStatus::classify(10.0, 10.0), CommitmentStatus::Compliant);
        assert_eq!(CommitmentStatus::classify(12.0, 10.0), CommitmentStatus::Compliant);
        assert_eq!(CommitmentStatus::classify(12.1, 10.0), CommitmentStatus::Over);
        assert_eq!(CommitmentStatus::classify(9.9, 10.0), CommitmentStatus::Under);
    }
}
