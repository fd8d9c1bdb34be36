//! The canonical event store and authority/conflict engine.

pub mod authority;
pub mod canonical_store;
pub mod journal_query;

pub use canonical_store::{apply_provider_delta, delete_event, get_event, list_events, ApplyOutcome, EventFilter, ProviderDelta};
