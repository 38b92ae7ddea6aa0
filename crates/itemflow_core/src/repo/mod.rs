//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage port used by ingestion and queries.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes enforce `ItemCore::validate()` before persistence.
//! - Repository APIs return semantic errors (`Duplicate`, `NotFound`) in
//!   addition to DB transport errors.

pub mod item_repo;
