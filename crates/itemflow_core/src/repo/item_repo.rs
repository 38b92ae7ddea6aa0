//! Item repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the narrow storage port used by ingestion and queries.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - `items.uuid` is the primary key; a violation on insert is reported as
//!   `RepoError::Duplicate`, the same outcome as a positive `exists` check.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - `published_date` is stored as fixed-width RFC 3339 text, so ordering by
//!   the column is chronological.

use crate::db::{ConnectionPool, DbError};
use crate::model::item::{Item, ItemCore, ItemId, ItemValidationError};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{ffi, params, ErrorCode, Row};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const ITEM_SELECT_SQL: &str = "SELECT
    uuid,
    publication_uuid,
    published_date,
    title,
    description,
    content,
    url,
    language_code
FROM items";

const PUBLISHED_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for item persistence and query operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Validation(#[from] ItemValidationError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("item already exists: {0}")]
    Duplicate(ItemId),
    #[error("item not found: {0}")]
    NotFound(ItemId),
    #[error("invalid persisted item data: {0}")]
    InvalidData(String),
}

impl RepoError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage port for items.
///
/// Implementations must be safe to share between ingestion workers and the
/// query path.
pub trait ItemRepository: Send + Sync {
    /// Returns whether an item with this identity is stored.
    fn exists(&self, id: ItemId) -> RepoResult<bool>;
    /// Inserts a new item; `RepoError::Duplicate` when the identity is taken.
    fn create(&self, item: &Item) -> RepoResult<()>;
    /// Items of one publication (or all items when `None`) ordered by
    /// publish date, ties broken by identity.
    fn fetch_ordered(&self, publication: Option<Uuid>, sort_asc: bool) -> RepoResult<Vec<Item>>;
    fn fetch_by_id(&self, id: ItemId) -> RepoResult<Option<Item>>;
    fn delete(&self, id: ItemId) -> RepoResult<()>;
    /// Verifies the store is reachable and its schema readable.
    fn healthcheck(&self) -> RepoResult<()>;
}

impl<R: ItemRepository + ?Sized> ItemRepository for Arc<R> {
    fn exists(&self, id: ItemId) -> RepoResult<bool> {
        (**self).exists(id)
    }

    fn create(&self, item: &Item) -> RepoResult<()> {
        (**self).create(item)
    }

    fn fetch_ordered(&self, publication: Option<Uuid>, sort_asc: bool) -> RepoResult<Vec<Item>> {
        (**self).fetch_ordered(publication, sort_asc)
    }

    fn fetch_by_id(&self, id: ItemId) -> RepoResult<Option<Item>> {
        (**self).fetch_by_id(id)
    }

    fn delete(&self, id: ItemId) -> RepoResult<()> {
        (**self).delete(id)
    }

    fn healthcheck(&self) -> RepoResult<()> {
        (**self).healthcheck()
    }
}

/// SQLite-backed item repository over a shared connection pool.
#[derive(Clone)]
pub struct SqliteItemRepository {
    pool: ConnectionPool,
}

impl SqliteItemRepository {
    /// Constructs a repository from a migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl ItemRepository for SqliteItemRepository {
    fn exists(&self, id: ItemId) -> RepoResult<bool> {
        let conn = self.pool.get()?;
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE uuid = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn create(&self, item: &Item) -> RepoResult<()> {
        item.core.validate()?;

        let conn = self.pool.get()?;
        let core = &item.core;
        let result = conn.execute(
            "INSERT INTO items (
                uuid,
                publication_uuid,
                published_date,
                title,
                description,
                content,
                url,
                language_code
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                item.uuid.to_string(),
                core.publication_uuid.to_string(),
                format_published_date(core.published_date),
                core.title.as_str(),
                core.description.as_deref(),
                core.content.as_deref(),
                core.url.as_deref(),
                core.language_code.as_deref(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_identity_conflict(&err) => {
                debug!(
                    "event=item_insert module=repo status=conflict item_id={}",
                    item.uuid
                );
                Err(RepoError::Duplicate(item.uuid))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn fetch_ordered(&self, publication: Option<Uuid>, sort_asc: bool) -> RepoResult<Vec<Item>> {
        let direction = if sort_asc { "ASC" } else { "DESC" };
        let conn = self.pool.get()?;

        let mut items = Vec::new();
        match publication {
            Some(publication) => {
                let mut stmt = conn.prepare(&format!(
                    "{ITEM_SELECT_SQL}
                     WHERE publication_uuid = ?1
                     ORDER BY published_date {direction}, uuid {direction};"
                ))?;
                let mut rows = stmt.query([publication.to_string()])?;
                while let Some(row) = rows.next()? {
                    items.push(parse_item_row(row)?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{ITEM_SELECT_SQL}
                     ORDER BY published_date {direction}, uuid {direction};"
                ))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    items.push(parse_item_row(row)?);
                }
            }
        }

        Ok(items)
    }

    fn fetch_by_id(&self, id: ItemId) -> RepoResult<Option<Item>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{ITEM_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn delete(&self, id: ItemId) -> RepoResult<()> {
        let conn = self.pool.get()?;
        let changed = conn.execute("DELETE FROM items WHERE uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn healthcheck(&self) -> RepoResult<()> {
        let conn = self.pool.get()?;
        conn.query_row("SELECT COUNT(*) FROM items;", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn is_identity_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
                )
        }
        _ => false,
    }
}

fn format_published_date(value: DateTime<Utc>) -> String {
    value.format(PUBLISHED_DATE_FORMAT).to_string()
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<Item> {
    let uuid = parse_uuid_column(row, "uuid")?;
    let publication_uuid = parse_uuid_column(row, "publication_uuid")?;

    let date_text: String = row.get("published_date")?;
    let published_date = DateTime::parse_from_rfc3339(&date_text)
        .map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid timestamp `{date_text}` in items.published_date"
            ))
        })?
        .with_timezone(&Utc);

    let core = ItemCore {
        publication_uuid,
        published_date,
        title: row.get("title")?,
        description: row.get("description")?,
        content: row.get("content")?,
        url: row.get("url")?,
        language_code: row.get("language_code")?,
    };

    if core.item_id() != uuid {
        return Err(RepoError::InvalidData(format!(
            "items.uuid `{uuid}` does not match derived identity"
        )));
    }

    Ok(Item { uuid, core })
}

fn parse_uuid_column(row: &Row<'_>, column: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{text}` in items.{column}"))
    })
}

#[cfg(test)]
mod tests {
    use super::format_published_date;
    use chrono::{TimeZone, Utc};

    #[test]
    fn stored_dates_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 1, 0, 0).unwrap();
        let early_text = format_published_date(early);
        assert_eq!(early_text, "2024-01-09T23:00:00.000000000Z");
        assert!(early_text < format_published_date(late));
    }
}
