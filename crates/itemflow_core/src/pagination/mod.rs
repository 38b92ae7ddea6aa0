//! Relay-style cursor pagination over ordered item sequences.
//!
//! # Responsibility
//! - Turn `first/after/last/before` arguments into an index window over an
//!   already ordered slice.
//! - Expose the window as a borrowed `Connection` with edges and page info.
//!
//! # Invariants
//! - The engine never re-sorts; callers pass items in the requested order.
//! - `Connection` borrows the fetched slice; no item is cloned.
//! - `first` is applied before `last`; an empty (not negative) window is valid.
//! - Errors never yield a partial connection.

pub mod cursor;

use crate::model::item::{Item, ItemId};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::ops::Range;
use thiserror::Error;

pub use cursor::{decode_cursor, encode_cursor, CursorError};

/// Page arguments as received from the query layer.
///
/// `first` and `last` are signed so negative input can be reported instead
/// of silently wrapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageArgs {
    pub first: Option<i64>,
    pub after: Option<String>,
    pub last: Option<i64>,
    pub before: Option<String>,
}

impl PageArgs {
    pub fn first(count: i64) -> Self {
        Self {
            first: Some(count),
            ..Self::default()
        }
    }

    pub fn last(count: i64) -> Self {
        Self {
            last: Some(count),
            ..Self::default()
        }
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error("cursor refers to item {0}, which is not part of this result set")]
    CursorNotFound(ItemId),
    #[error("'before' and 'after' cursors yield an empty or negative range; cursors are incorrect or the order changed")]
    InvalidPageRange,
    #[error("'{name}' cannot be negative, got {value}")]
    InvalidArgument { name: &'static str, value: i64 },
}

/// Half-open index window `[start, end)` over a fetched sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageWindow {
    start: usize,
    end: usize,
}

impl PageWindow {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Computes the window `args` select over `fetched`.
///
/// # Errors
/// - `Cursor` for malformed cursors.
/// - `CursorNotFound` when a cursor names an item absent from `fetched`.
/// - `InvalidPageRange` when `before` ends the window ahead of its start.
/// - `InvalidArgument` for negative `first` / `last`.
pub fn page_window(fetched: &[Item], args: &PageArgs) -> Result<PageWindow, PageError> {
    if fetched.is_empty() {
        return Ok(PageWindow::default());
    }

    let len = fetched.len() as i64;
    // Inclusive bounds; `to == from - 1` encodes an empty window.
    let mut from: i64 = 0;
    let mut to: i64 = len - 1;

    if let Some(after) = args.after.as_deref() {
        from = position_of(fetched, after)? as i64 + 1;
    }

    if let Some(before) = args.before.as_deref() {
        to = position_of(fetched, before)? as i64 - 1;
        if from > to {
            return Err(PageError::InvalidPageRange);
        }
    }

    if let Some(first) = args.first {
        if first < 0 {
            return Err(PageError::InvalidArgument {
                name: "first",
                value: first,
            });
        }
        to = to.min(from.saturating_add(first) - 1);
    }

    if let Some(last) = args.last {
        if last < 0 {
            return Err(PageError::InvalidArgument {
                name: "last",
                value: last,
            });
        }
        from = from.max(to.saturating_sub(last) + 1);
    }

    Ok(PageWindow {
        start: from as usize,
        end: (to + 1).max(from) as usize,
    })
}

/// Slices `fetched` according to `args`.
pub fn paginate<'a>(fetched: &'a [Item], args: &PageArgs) -> Result<Connection<'a>, PageError> {
    let window = page_window(fetched, args)?;
    Ok(Connection::new(fetched, window))
}

fn position_of(fetched: &[Item], cursor: &str) -> Result<usize, PageError> {
    let id = decode_cursor(cursor)?;
    fetched
        .iter()
        .position(|item| item.uuid == id)
        .ok_or(PageError::CursorNotFound(id))
}

/// Windowed view over an ordered, fetched item sequence.
#[derive(Debug, Clone, Copy)]
pub struct Connection<'a> {
    items: &'a [Item],
    window: PageWindow,
}

impl<'a> Connection<'a> {
    /// Builds a view; the window is clamped to `items`.
    pub fn new(items: &'a [Item], window: PageWindow) -> Self {
        let end = window.end.min(items.len());
        let start = window.start.min(end);
        Self {
            items,
            window: PageWindow { start, end },
        }
    }

    pub fn window(&self) -> PageWindow {
        self.window
    }

    /// Items inside the window, in fetched order.
    pub fn nodes(&self) -> &'a [Item] {
        &self.items[self.window.range()]
    }

    pub fn edges(&self) -> Vec<Edge<'a>> {
        self.nodes()
            .iter()
            .map(|node| Edge {
                node,
                cursor: encode_cursor(node.uuid),
            })
            .collect()
    }

    pub fn page_info(&self) -> PageInfo {
        let nodes = self.nodes();
        PageInfo {
            has_next_page: self.window.end < self.items.len(),
            has_previous_page: !self.items.is_empty() && self.window.start > 0,
            start_cursor: nodes.first().map(|item| encode_cursor(item.uuid)),
            end_cursor: nodes.last().map(|item| encode_cursor(item.uuid)),
        }
    }

    /// Size of the whole fetched sequence, not of the window.
    pub fn total_count(&self) -> usize {
        self.items.len()
    }
}

impl Serialize for Connection<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Connection", 3)?;
        state.serialize_field("edges", &self.edges())?;
        state.serialize_field("page_info", &self.page_info())?;
        state.serialize_field("total_count", &self.total_count())?;
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge<'a> {
    pub node: &'a Item,
    pub cursor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}
