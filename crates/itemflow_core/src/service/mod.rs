//! Core use-case services.
//!
//! # Responsibility
//! - `processor`: the write path from queue payloads to stored items.
//! - `query`: the read path from query arguments to paginated connections.

pub mod processor;
pub mod query;
