//! Read-side use cases over stored items.
//!
//! # Responsibility
//! - Fetch ordered items through the repository port.
//! - Apply cursor pagination and hand out borrowed connections.
//!
//! # Invariants
//! - The fetched rows are owned by `ItemsPage`; connections borrow them.
//! - Pagination errors never yield a partial page.

use crate::model::item::{Item, ItemId};
use crate::pagination::{page_window, Connection, PageArgs, PageError, PageWindow};
use crate::repo::item_repo::{ItemRepository, RepoError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Repository(#[from] RepoError),
    #[error(transparent)]
    Page(#[from] PageError),
}

/// Arguments of a paginated items query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemsQuery {
    /// Restricts results to one publication; all items when unset.
    pub publication_uuid: Option<Uuid>,
    pub sort_asc: bool,
    pub page: PageArgs,
}

/// Fetched rows plus the window a query selected over them.
#[derive(Debug, Clone)]
pub struct ItemsPage {
    items: Vec<Item>,
    window: PageWindow,
}

impl ItemsPage {
    pub fn connection(&self) -> Connection<'_> {
        Connection::new(&self.items, self.window)
    }

    pub fn fetched(&self) -> &[Item] {
        &self.items
    }
}

pub struct ItemQueryService<R: ItemRepository> {
    repo: R,
}

impl<R: ItemRepository> ItemQueryService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn item(&self, id: ItemId) -> Result<Option<Item>, QueryError> {
        Ok(self.repo.fetch_by_id(id)?)
    }

    pub fn items(&self, publication: Option<Uuid>, sort_asc: bool) -> Result<Vec<Item>, QueryError> {
        Ok(self.repo.fetch_ordered(publication, sort_asc)?)
    }

    /// Fetches the ordered sequence for `query` and selects its page.
    ///
    /// # Errors
    /// - `Repository` when the fetch fails.
    /// - `Page` for bad cursors or page arguments.
    pub fn items_connection(&self, query: &ItemsQuery) -> Result<ItemsPage, QueryError> {
        let items = self
            .repo
            .fetch_ordered(query.publication_uuid, query.sort_asc)?;
        let window = page_window(&items, &query.page)?;
        Ok(ItemsPage { items, window })
    }

    pub fn total_count(&self, publication: Option<Uuid>) -> Result<usize, QueryError> {
        Ok(self.repo.fetch_ordered(publication, true)?.len())
    }

    pub fn healthcheck(&self) -> Result<(), QueryError> {
        Ok(self.repo.healthcheck()?)
    }
}
