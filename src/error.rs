//! Canonical error type for tminus-core operations.
//!
//! This module defines the single error type returned by every public
//! operation in the crate. Uses `thiserror` for `Display`/`Error` impls,
//! following the shape of a typical per-crate error enum: typed variants
//! that auto-convert from the underlying library errors via `#[from]`,
//! plus domain variants for the four error kinds the spec distinguishes
//! (validation, not-found, uniqueness, system).

use rusqlite;
use std::io;
use thiserror::Error;

/// Canonical error type for all tminus-core operations.
#[derive(Error, Debug)]
pub enum TminusError {
    /// SQLite database error (auto-converts from `rusqlite::Error`).
    #[error("sqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),

    /// I/O error (auto-converts from `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input failed validation (bad enum, out-of-range number, bad
    /// timezone, bad HH:MM, bad date, non-integer where integer required).
    #[error("validation error: {0}")]
    Validation(String),

    /// `start_ts > end_ts` on a canonical event or constraint window.
    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    /// A foreign-key or referential-integrity violation.
    #[error("structural constraint violated: {0}")]
    StructuralConstraint(String),

    /// A provider delta referenced an account the actor does not know.
    #[error("unknown origin account: {0}")]
    UnknownOrigin(String),

    /// A constraint's variant-specific config failed validation.
    #[error("invalid constraint config: {0}")]
    InvalidConstraintConfig(String),

    /// A uniqueness constraint was violated (duplicate participant_hash,
    /// duplicate (origin_account_id, origin_event_id), duplicate
    /// commitment client_id, ...).
    #[error("uniqueness violation: {0}")]
    Uniqueness(String),

    /// Requested entity does not exist. Not-found is a normal return value
    /// at the API layer (`Option`/`null`), but some internal helpers
    /// signal it as an error to short-circuit a transaction.
    #[error("not found: {0}")]
    NotFound(String),

    /// Outbound queue send failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// Blob store operation failed.
    #[error("blob store error: {0}")]
    Blob(String),

    /// Registry (global) database error or inconsistency.
    #[error("registry error: {0}")]
    Registry(String),

    /// Certificate signing/verification failure.
    #[error("signature error: {0}")]
    Signature(String),

    /// Path resolution or configuration error.
    #[error("path error: {0}")]
    Path(String),
}

impl TminusError {
    /// Which of the spec's four error kinds this falls into. Not used for
    /// control flow within the crate, but gives HTTP handlers and callers
    /// a stable classification without string-matching `Display` output.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TminusError::Validation(_)
            | TminusError::InvalidInterval(_)
            | TminusError::InvalidConstraintConfig(_) => ErrorKind::Validation,
            TminusError::NotFound(_) => ErrorKind::NotFound,
            TminusError::Uniqueness(_) => ErrorKind::Uniqueness,
            TminusError::Rusqlite(_)
            | TminusError::Io(_)
            | TminusError::StructuralConstraint(_)
            | TminusError::UnknownOrigin(_)
            | TminusError::Queue(_)
            | TminusError::Blob(_)
            | TminusError::Registry(_)
            | TminusError::Signature(_)
            | TminusError::Path(_) => ErrorKind::System,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Uniqueness,
    System,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = TminusError::Validation("bad timezone".to_string());
        assert_eq!(format!("{}", err), "validation error: bad timezone");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn not_found_is_its_own_kind() {
        let err = TminusError::NotFound("constraint xyz".to_string());
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn uniqueness_kind() {
        let err = TminusError::Uniqueness("duplicate participant_hash".to_string());
        assert_eq!(err.kind(), ErrorKind::Uniqueness);
    }

    #[test]
    fn invalid_interval_is_validation_kind() {
        let err = TminusError::InvalidInterval("start_ts > end_ts".to_string());
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
