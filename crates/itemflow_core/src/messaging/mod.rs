//! Queue message formats and producer-side helpers.
//!
//! # Responsibility
//! - Own the typed envelope wire codec.
//! - Provide the publisher used by item producers.

pub mod envelope;
pub mod publisher;
