//! The availability engine: interval algebra, the eight-stage
//! busy/free pipeline, and derived analytics views.

pub mod analytics;
pub mod interval;
pub mod pipeline;

pub use pipeline::{compute_availability, AvailabilityResult};
