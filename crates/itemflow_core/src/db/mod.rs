//! SQLite storage bootstrap, connection pooling and schema migrations.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the item store.
//! - Share a bounded set of connections between ingestion workers and queries.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No pooled connection is handed out before migrations succeed.

use std::time::Duration;
use thiserror::Error;

pub mod migrations;
mod open;
mod pool;

pub use open::{open_pool, open_pool_in_memory};
pub use pool::{ConnectionPool, PooledConnection};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    #[error("no pooled connection became available within {0:?}")]
    PoolTimeout(Duration),
    #[error("invalid pool sizing: min={min} max={max}")]
    InvalidPoolSize { min: usize, max: usize },
}
