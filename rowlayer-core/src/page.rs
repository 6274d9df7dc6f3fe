//! Pagination result types.
//!
//! [`PaginationResult`] is returned by cursor pagination: a page of items, the cursor to
//! continue from, and offset-style metadata computed from the total row count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Navigation metadata for a page of results.
///
/// # Example
///
/// ```ignore
/// use rowlayer::page::Pagination;
///
/// let pagination = Pagination::new(2, 10, 25);
///
/// assert!(pagination.has_next);
/// assert!(pagination.has_prev);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// The page number (1-indexed).
    pub page: usize,
    /// Number of items per page.
    pub page_size: usize,
    /// Total number of rows matching the query, ignoring pagination.
    pub total: u64,
    /// Whether rows exist past this page.
    pub has_next: bool,
    /// Whether this is not the first page.
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: usize, page_size: usize, total: u64) -> Self {
        let page = page.max(1);
        let seen = (page as u64).saturating_mul(page_size as u64);

        Self {
            page,
            page_size,
            total,
            has_next: seen < total,
            has_prev: page > 1,
        }
    }

    /// Offset of the first row on this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

/// A single page of cursor-paginated results.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaginationResult<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Creation timestamp of the last item, to pass back as the next cursor.
    /// `None` when the page is empty.
    pub next_cursor: Option<DateTime<Utc>>,
    pub pagination: Pagination,
}

impl<T> PaginationResult<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<DateTime<Utc>>, pagination: Pagination) -> Self {
        Self {
            items,
            next_cursor,
            pagination,
        }
    }

    /// Maps the items of this page, keeping cursor and metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginationResult<U> {
        PaginationResult {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_has_no_next() {
        let pagination = Pagination::new(3, 10, 30);

        assert!(!pagination.has_next);
        assert!(pagination.has_prev);
        assert_eq!(pagination.offset(), 20);
    }

    #[test]
    fn offset_saturates_on_huge_pages() {
        assert_eq!(Pagination::new(usize::MAX, 10, 5).offset(), usize::MAX);
    }

    #[test]
    fn first_page_has_no_prev() {
        let pagination = Pagination::new(1, 10, 11);

        assert!(pagination.has_next);
        assert!(!pagination.has_prev);
    }

    #[test]
    fn empty_total_has_neither() {
        let pagination = Pagination::new(1, 10, 0);

        assert!(!pagination.has_next);
        assert!(!pagination.has_prev);
    }

    #[test]
    fn map_preserves_metadata() {
        let page = PaginationResult::new(vec![1, 2], None, Pagination::new(1, 2, 4));
        let mapped = page.map(|n| n * 10);

        assert_eq!(mapped.items, vec![10, 20]);
        assert!(mapped.pagination.has_next);
    }
}
