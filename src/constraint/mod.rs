//! The constraint engine: validation, persistence/projection,
//! update, delete.

pub mod engine;
pub mod validate;

pub use engine::{
    add_constraint, delete_constraint, get_constraint, list_constraints, update_constraint,
    ConstraintUpdateOutcome,
};
pub use validate::validate_config;
