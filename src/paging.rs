//! Page requests and page arithmetic.
//!
//! Page numbers are 1-based. A page number past the last page is clamped to
//! the last page, so [`PageInfo::last`] addresses the final page without
//! knowing how many pages exist.

use serde::{Deserialize, Serialize};

/// Number of the first page.
pub const FIRST_PAGE: usize = 1;

/// A request for one page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageInfo {
    /// Number of results per page.
    pub page_size: usize,

    /// Requested page; `None` means the first page.
    pub page_num: Option<usize>,
}

impl PageInfo {
    /// Request page `page_num` of `page_size` results.
    pub fn new(page_size: usize, page_num: usize) -> Self {
        PageInfo {
            page_size,
            page_num: Some(page_num),
        }
    }

    /// Request the first page.
    pub fn first(page_size: usize) -> Self {
        PageInfo {
            page_size,
            page_num: None,
        }
    }

    /// Request the last page, whatever its number turns out to be.
    pub fn last(page_size: usize) -> Self {
        PageInfo {
            page_size,
            page_num: Some(usize::MAX),
        }
    }

    /// The requested page number, defaulting to the first page.
    pub fn requested_page(&self) -> usize {
        self.page_num.unwrap_or(FIRST_PAGE).max(FIRST_PAGE)
    }

    /// The page actually served when `total_count` results exist.
    pub fn resolve(&self, total_count: usize) -> usize {
        let total_pages = total_pages(total_count, self.page_size);
        self.requested_page().min(total_pages.max(FIRST_PAGE))
    }

    /// Half-open `[start, end)` result range of `page_num` when
    /// `total_count` results exist.
    pub fn bounds(&self, page_num: usize, total_count: usize) -> (usize, usize) {
        let start = page_num
            .saturating_sub(FIRST_PAGE)
            .saturating_mul(self.page_size)
            .min(total_count);
        let end = start.saturating_add(self.page_size).min(total_count);
        (start, end)
    }
}

/// `ceil(total_count / page_size)`; zero when `page_size` is zero.
pub fn total_pages(total_count: usize, page_size: usize) -> usize {
    if page_size == 0 {
        0
    } else {
        total_count.div_ceil(page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 2), 0);
        assert_eq!(total_pages(4, 2), 2);
        assert_eq!(total_pages(5, 2), 3);
        assert_eq!(total_pages(5, 0), 0);
    }

    #[test]
    fn test_resolve_clamps_to_last_page() {
        assert_eq!(PageInfo::first(2).resolve(5), 1);
        assert_eq!(PageInfo::last(2).resolve(5), 3);
        assert_eq!(PageInfo::new(2, 0).resolve(5), 1);
        assert_eq!(PageInfo::last(2).resolve(0), 1);
    }

    #[test]
    fn test_bounds() {
        let info = PageInfo::first(2);
        assert_eq!(info.bounds(1, 5), (0, 2));
        assert_eq!(info.bounds(3, 5), (4, 5));
        assert_eq!(info.bounds(4, 5), (5, 5));
    }
}
