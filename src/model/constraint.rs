//! Polymorphic constraint declarations.
//!
//! Modeled as a closed enum rather than open trait objects, echoing
//! decapod's closed `Migration`/`ObligationStatus` dispatch style (pattern
//! match over a known, small variant set) rather than dynamic dispatch.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockPolicy {
    Busy,
    Title,
}

impl BlockPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockPolicy::Busy => "BUSY",
            BlockPolicy::Title => "TITLE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUSY" => Some(BlockPolicy::Busy),
            "TITLE" => Some(BlockPolicy::Title),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripConfig {
    pub name: String,
    pub timezone: String,
    pub block_policy: BlockPolicy,
    pub destination_city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHoursConfig {
    /// Non-empty subset of 0 (Sunday) through 6 (Saturday).
    pub days: Vec<u8>,
    pub start_time: String,
    pub end_time: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferType {
    Travel,
    Prep,
    Cooldown,
}

impl BufferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferType::Travel => "travel",
            BufferType::Prep => "prep",
            BufferType::Cooldown => "cooldown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "travel" => Some(BufferType::Travel),
            "prep" => Some(BufferType::Prep),
            "cooldown" => Some(BufferType::Cooldown),
            _ => None,
        }
    }

    /// Buffers before the event (`travel`, `prep`) vs. after it (`cooldown`).
    pub fn is_before_event(&self) -> bool {
        matches!(self, BufferType::Travel | BufferType::Prep)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferAppliesTo {
    All,
    External,
}

impl BufferAppliesTo {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(BufferAppliesTo::All),
            "external" => Some(BufferAppliesTo::External),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(rename = "type")]
    pub kind: BufferType,
    pub minutes: u32,
    pub applies_to: BufferAppliesTo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoMeetingsAfterConfig {
    pub cutoff_time: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideConfig {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneConfig {
    pub milestone_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Trip,
    WorkingHours,
    Buffer,
    NoMeetingsAfter,
    Override,
    Milestone,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Trip => "trip",
            ConstraintKind::WorkingHours => "working_hours",
            ConstraintKind::Buffer => "buffer",
            ConstraintKind::NoMeetingsAfter => "no_meetings_after",
            ConstraintKind::Override => "override",
            ConstraintKind::Milestone => "milestone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trip" => Some(ConstraintKind::Trip),
            "working_hours" => Some(ConstraintKind::WorkingHours),
            "buffer" => Some(ConstraintKind::Buffer),
            "no_meetings_after" => Some(ConstraintKind::NoMeetingsAfter),
            "override" => Some(ConstraintKind::Override),
            "milestone" => Some(ConstraintKind::Milestone),
            _ => None,
        }
    }

    /// Only `trip` projects a derived canonical event.
    pub fn projects_derived_event(&self) -> bool {
        matches!(self, ConstraintKind::Trip)
    }
}

/// Row-level representation; `config_json` is parsed into a typed config by
/// the constraint engine on demand rather than eagerly, so storage stays a
/// single table regardless of variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub constraint_id: String,
    pub kind: ConstraintKind,
    pub config_json: serde_json::Value,
    pub active_from: Option<String>,
    pub active_to: Option<String>,
    pub derived_event_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
