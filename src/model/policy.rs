//! Policy rows and their edges to constraints, cleaned up by the deletion
//! workflow alongside calendars and relationships — grounded on decapod's
//! `obligation_edges` dependency-edge shape (`core::obligation`),
//! generalized from obligation dependencies to policy-to-constraint edges.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: String,
    pub kind: String,
    pub config_json: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEdge {
    pub edge_id: String,
    pub policy_id: String,
    pub constraint_id: Option<String>,
}
