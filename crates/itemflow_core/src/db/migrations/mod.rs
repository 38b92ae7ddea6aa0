//! Schema migrations for the item store.
//!
//! # Invariants
//! - `MIGRATIONS` is ordered by strictly increasing `version`.
//! - All pending steps commit in one transaction; the reached version is
//!   mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::{debug, error, info};
use rusqlite::Connection;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "items",
    sql: include_str!("0001_items.sql"),
}];

/// Schema version this build writes and understands.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings `conn` up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the store was written by a newer build.
/// - SQLite errors from a failing step; nothing is committed in that case.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = current_user_version(conn)?;
    let latest = latest_version();

    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }
    if from_version == latest {
        debug!(
            "event=db_migrate module=db status=current version={}",
            from_version
        );
        return Ok(());
    }

    let started_at = Instant::now();
    let result = run_pending(conn, from_version);
    let duration_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(()) => info!(
            "event=db_migrate module=db status=ok from_version={} to_version={} duration_ms={}",
            from_version, latest, duration_ms
        ),
        Err(err) => error!(
            "event=db_migrate module=db status=error from_version={} duration_ms={} error={}",
            from_version, duration_ms, err
        ),
    }
    result
}

fn run_pending(conn: &mut Connection, from_version: u32) -> DbResult<()> {
    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > from_version) {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        debug!(
            "event=db_migrate_step module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;
    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, current_user_version, latest_version, MIGRATIONS};
    use rusqlite::Connection;

    #[test]
    fn registry_versions_strictly_increase() {
        assert!(MIGRATIONS
            .windows(2)
            .all(|pair| pair[0].version < pair[1].version));
        assert_eq!(MIGRATIONS[0].version, 1);
    }

    #[test]
    fn reapplying_is_a_no_op() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        assert_eq!(current_user_version(&conn).unwrap(), latest_version());

        apply_migrations(&mut conn).unwrap();
        assert_eq!(current_user_version(&conn).unwrap(), latest_version());
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'items';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }
}
