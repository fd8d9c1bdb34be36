//! Relationship, interaction ledger, and drift alert rows.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationshipCategory {
    Family,
    Investor,
    Friend,
    Client,
    Board,
    Colleague,
    Other,
}

impl RelationshipCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipCategory::Family => "FAMILY",
            RelationshipCategory::Investor => "INVESTOR",
            RelationshipCategory::Friend => "FRIEND",
            RelationshipCategory::Client => "CLIENT",
            RelationshipCategory::Board => "BOARD",
            RelationshipCategory::Colleague => "COLLEAGUE",
            RelationshipCategory::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FAMILY" => Some(RelationshipCategory::Family),
            "INVESTOR" => Some(RelationshipCategory::Investor),
            "FRIEND" => Some(RelationshipCategory::Friend),
            "CLIENT" => Some(RelationshipCategory::Client),
            "BOARD" => Some(RelationshipCategory::Board),
            "COLLEAGUE" => Some(RelationshipCategory::Colleague),
            "OTHER" => Some(RelationshipCategory::Other),
            _ => None,
        }
    }

    /// Default reconnection-suggestion duration by category.
    /// Treated as configuration rather than a hardcoded exhaustive
    /// enumeration baked into call sites.
    pub fn suggested_duration_minutes(&self) -> u32 {
        match self {
            RelationshipCategory::Friend => 60,
            RelationshipCategory::Colleague => 45,
            RelationshipCategory::Investor => 30,
            RelationshipCategory::Family => 90,
            RelationshipCategory::Client => 45,
            RelationshipCategory::Board => 30,
            RelationshipCategory::Other => 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_id: String,
    pub participant_hash: String,
    pub display_name: Option<String>,
    pub category: RelationshipCategory,
    pub closeness_weight: f64,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub interaction_frequency_target: Option<i64>,
    pub last_interaction_ts: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionOutcome {
    Attended,
    CanceledByThem,
    CanceledByMe,
    NoShowThem,
    NoShowMe,
    MovedLastMinuteThem,
    MovedLastMinuteMe,
}

impl InteractionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionOutcome::Attended => "ATTENDED",
            InteractionOutcome::CanceledByThem => "CANCELED_BY_THEM",
            InteractionOutcome::CanceledByMe => "CANCELED_BY_ME",
            InteractionOutcome::NoShowThem => "NO_SHOW_THEM",
            InteractionOutcome::NoShowMe => "NO_SHOW_ME",
            InteractionOutcome::MovedLastMinuteThem => "MOVED_LAST_MINUTE_THEM",
            InteractionOutcome::MovedLastMinuteMe => "MOVED_LAST_MINUTE_ME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ATTENDED" => Some(InteractionOutcome::Attended),
            "CANCELED_BY_THEM" => Some(InteractionOutcome::CanceledByThem),
            "CANCELED_BY_ME" => Some(InteractionOutcome::CanceledByMe),
            "NO_SHOW_THEM" => Some(InteractionOutcome::NoShowThem),
            "NO_SHOW_ME" => Some(InteractionOutcome::NoShowMe),
            "MOVED_LAST_MINUTE_THEM" => Some(InteractionOutcome::MovedLastMinuteThem),
            "MOVED_LAST_MINUTE_ME" => Some(InteractionOutcome::MovedLastMinuteMe),
            _ => None,
        }
    }

    /// Fixed weight table.
    pub fn weight(&self) -> f64 {
        match self {
            InteractionOutcome::Attended => 1.0,
            InteractionOutcome::CanceledByThem => -0.5,
            InteractionOutcome::NoShowThem => -1.0,
            InteractionOutcome::MovedLastMinuteThem => -0.3,
            InteractionOutcome::CanceledByMe
            | InteractionOutcome::NoShowMe
            | InteractionOutcome::MovedLastMinuteMe => 0.0,
        }
    }

    /// Only ATTENDED bumps `last_interaction_ts`.
    pub fn bumps_last_interaction(&self) -> bool {
        matches!(self, InteractionOutcome::Attended)
    }

    /// "Them"-negative outcomes feed `reciprocity_score`'s asymmetry term.
    pub fn is_them_negative(&self) -> bool {
        matches!(
            self,
            InteractionOutcome::CanceledByThem
                | InteractionOutcome::NoShowThem
                | InteractionOutcome::MovedLastMinuteThem
        )
    }

    pub fn is_me_negative(&self) -> bool {
        matches!(
            self,
            InteractionOutcome::CanceledByMe
                | InteractionOutcome::NoShowMe
                | InteractionOutcome::MovedLastMinuteMe
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub ledger_id: String,
    pub participant_hash: String,
    pub outcome: InteractionOutcome,
    pub weight: f64,
    pub canonical_event_id: Option<String>,
    pub note: Option<String>,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReportRow {
    pub relationship_id: String,
    pub participant_hash: String,
    pub category: RelationshipCategory,
    pub days_since_last_interaction: f64,
    pub days_overdue: f64,
    pub drift_ratio: f64,
    pub urgency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftAlert {
    pub alert_id: String,
    pub relationship_id: String,
    pub urgency: f64,
    pub drift_ratio: f64,
    pub days_overdue: i64,
    pub category: String,
    pub computed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reputation {
    pub relationship_id: String,
    pub reliability_score: f64,
    pub reciprocity_score: f64,
}
