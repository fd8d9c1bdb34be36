//! Relationship and reputation graph.

pub mod crud;
pub mod drift;
pub mod milestone;
pub mod reconnection;
pub mod reputation;

pub use crud::{create_relationship, delete_relationship, get_relationship, list_relationships, mark_outcome, update_interactions};
pub use milestone::{create_milestone, delete_milestone, list_milestones};
