//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite databases behind a `ConnectionPool`.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before the pool hands out connections.
//!
//! # Invariants
//! - Every pooled connection has `foreign_keys=ON` and a busy timeout.
//! - File databases run in WAL mode so queries do not block ingestion writes.

use super::migrations::apply_migrations;
use super::pool::ConnectionPool;
use super::DbResult;
use crate::config::DatabaseConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};
use uuid::Uuid;

const POOL_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens the configured database file and returns a migrated pool.
///
/// # Side effects
/// - Creates the database file when missing.
/// - Emits `db_open` logging events with duration and status.
pub fn open_pool(config: &DatabaseConfig) -> DbResult<ConnectionPool> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode=file min_connections={} max_connections={}",
        config.min_connections, config.max_connections
    );

    let path = config.path.clone();
    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    let opener = move || open_file_connection(&path, busy_timeout);

    let result = bootstrap_pool(
        opener,
        config.min_connections,
        config.max_connections,
        POOL_CHECKOUT_TIMEOUT,
    );
    log_open_result("file", started_at, &result);
    result
}

/// Opens a private in-memory database and returns a migrated pool.
///
/// The pool is capped to a single connection: SQLite shared-cache memory
/// databases report table locks immediately instead of honoring the busy
/// timeout.
pub fn open_pool_in_memory() -> DbResult<ConnectionPool> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");

    let uri = format!("file:itemflow-{}?mode=memory&cache=shared", Uuid::new_v4());
    let opener = move || {
        let conn = Connection::open(&uri)?;
        configure_connection(&conn, Duration::from_secs(5))?;
        Ok(conn)
    };

    let result = bootstrap_pool(opener, 1, 1, POOL_CHECKOUT_TIMEOUT);
    log_open_result("memory", started_at, &result);
    result
}

fn bootstrap_pool<F>(
    opener: F,
    min_connections: usize,
    max_connections: usize,
    checkout_timeout: Duration,
) -> DbResult<ConnectionPool>
where
    F: Fn() -> DbResult<Connection> + Send + Sync + 'static,
{
    let mut seed = opener()?;
    apply_migrations(&mut seed)?;
    ConnectionPool::new(
        seed,
        Box::new(opener),
        min_connections.max(1),
        max_connections,
        checkout_timeout,
    )
}

fn open_file_connection(path: &Path, busy_timeout: Duration) -> DbResult<Connection> {
    let conn = Connection::open(path)?;
    configure_connection(&conn, busy_timeout)?;
    // `journal_mode` returns the resulting mode as a row.
    conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
    Ok(conn)
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

fn log_open_result(mode: &str, started_at: Instant, result: &DbResult<ConnectionPool>) {
    match result {
        Ok(pool) => info!(
            "event=db_open module=db status=ok mode={} duration_ms={} open_connections={}",
            mode,
            started_at.elapsed().as_millis(),
            pool.open_connections()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
            mode,
            started_at.elapsed().as_millis(),
            err
        ),
    }
}
