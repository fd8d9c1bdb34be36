//! Per-relationship personal dates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneKind {
    Birthday,
    Anniversary,
    Graduation,
    Funding,
    Relocation,
    Custom,
}

impl MilestoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneKind::Birthday => "birthday",
            MilestoneKind::Anniversary => "anniversary",
            MilestoneKind::Graduation => "graduation",
            MilestoneKind::Funding => "funding",
            MilestoneKind::Relocation => "relocation",
            MilestoneKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "birthday" => Some(MilestoneKind::Birthday),
            "anniversary" => Some(MilestoneKind::Anniversary),
            "graduation" => Some(MilestoneKind::Graduation),
            "funding" => Some(MilestoneKind::Funding),
            "relocation" => Some(MilestoneKind::Relocation),
            "custom" => Some(MilestoneKind::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub milestone_id: String,
    pub participant_hash: String,
    pub kind: MilestoneKind,
    /// YYYY-MM-DD.
    pub date: String,
    pub recurs_annually: bool,
    pub note: Option<String>,
}
