use std::ops::Range;

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 25;

/// 1-based page cursor. `page` never leaves `1..=total_pages(count)` once
/// the owner has called [`Pagination::clamp`] for the current count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    page: usize,
    page_size: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_pages(&self, count: usize) -> usize {
        count.div_ceil(self.page_size).max(1)
    }

    /// Returns true when the page had to move.
    pub fn clamp(&mut self, count: usize) -> bool {
        let clamped = self.page.clamp(1, self.total_pages(count));
        let changed = clamped != self.page;
        self.page = clamped;
        changed
    }

    pub fn reset(&mut self) {
        self.page = 1;
    }

    pub fn set_page(&mut self, page: usize, count: usize) {
        self.page = page;
        self.clamp(count);
    }

    pub fn set_page_size(&mut self, page_size: usize, count: usize) {
        self.page_size = page_size.max(1);
        self.clamp(count);
    }

    pub fn bounds(&self, count: usize) -> Range<usize> {
        let start = (self.page - 1).saturating_mul(self.page_size).min(count);
        let end = self.page.saturating_mul(self.page_size).min(count);
        start..end
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.bounds(items.len())]
    }
}
