//! tminus-core: per-user calendar graph engine.
//!
//! Canonical event store with field-level authority tracking, a
//! constraint/availability engine, a relationship/reputation graph,
//! commitment tracking, and a cascading GDPR deletion workflow — all
//! scoped per user, each user's state living in its own SQLite database
//! serialized through [`actor::ActorRegistry`]. A shared
//! registry database (users/accounts/api_keys/deletion bookkeeping) sits
//! alongside the per-user stores; see [`registry`].

pub mod actor;
pub mod availability;
pub mod blob_store;
pub mod commitment;
pub mod config;
pub mod constraint;
pub mod db;
pub mod deletion;
pub mod error;
pub mod ics_upgrade;
pub mod migration;
pub mod model;
pub mod queue;
pub mod registry;
pub mod relationship;
pub mod store;
pub mod time;

pub mod dispatch;

pub use config::TminusConfig;
pub use error::{ErrorKind, TminusError};
