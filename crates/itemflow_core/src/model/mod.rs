//! News item domain model.
//!
//! # Responsibility
//! - Define the canonical item shapes shared by ingestion and queries.
//!
//! # Invariants
//! - Every stored item is identified by a deterministic `ItemId`.
//! - `Item` composes `ItemCore`; it never re-declares core fields.

pub mod item;
