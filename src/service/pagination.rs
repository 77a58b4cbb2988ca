//! Pages over the concatenated results of several catalogs.
//!
//! Participating catalogs are ordered by id, and their result sequences are
//! concatenated in that order into one virtual sequence. A page is a slice
//! of that sequence. Serving it takes every catalog's `size_of` to build a
//! table of cumulative offsets, then a bounded query against each catalog
//! whose range overlaps the page. Nothing is cached between pages: every
//! page re-derives the totals, so pages reflect concurrent changes.

use serde::{Deserialize, Serialize};

use crate::catalog::TransactionReceipt;
use crate::paging::{FIRST_PAGE, PageInfo, total_pages};
use crate::query::QueryExpression;
use crate::service::outcome::{CatalogFailure, Outcome};
use crate::transaction::TransactionId;

/// What to page through: a query and the catalogs it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPager {
    /// The query.
    pub query: QueryExpression,

    /// Targeted catalogs; `None` targets every catalog.
    pub catalog_ids: Option<Vec<String>>,
}

impl QueryPager {
    /// Page through `query` across every catalog.
    pub fn new(query: QueryExpression) -> Self {
        QueryPager {
            query,
            catalog_ids: None,
        }
    }

    /// Restrict the pager to `catalog_ids`.
    pub fn with_catalog_ids<I, S>(mut self, catalog_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.catalog_ids = Some(catalog_ids.into_iter().map(Into::into).collect());
        self
    }
}

/// One served page.
#[derive(Debug, Clone)]
pub struct Page {
    pager: QueryPager,
    page_num: usize,
    page_size: usize,
    total_pages: usize,
    total_count: usize,
    participants: Vec<String>,
    receipts: Vec<TransactionReceipt>,
    failures: Vec<CatalogFailure>,
}

impl Page {
    pub(crate) fn new(
        pager: QueryPager,
        plan: &PagePlan,
        page_size: usize,
        participants: Vec<String>,
        receipts: Vec<TransactionReceipt>,
        failures: Vec<CatalogFailure>,
    ) -> Self {
        Page {
            pager,
            page_num: plan.page_num,
            page_size,
            total_pages: plan.total_pages,
            total_count: plan.total_count,
            participants,
            receipts,
            failures,
        }
    }

    /// What this page was drawn from.
    pub fn pager(&self) -> &QueryPager {
        &self.pager
    }

    /// 1-based page number.
    pub fn page_num(&self) -> usize {
        self.page_num
    }

    /// Requested page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// `ceil(total_count / page_size)`.
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Matches across every participating catalog when the page was served.
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// Whether this is the first page.
    pub fn is_first(&self) -> bool {
        self.page_num == FIRST_PAGE
    }

    /// Whether this is the last page.
    pub fn is_last(&self) -> bool {
        self.page_num >= self.total_pages
    }

    /// Catalogs that took part, in concatenation order.
    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    /// The page's results.
    pub fn receipts(&self) -> &[TransactionReceipt] {
        &self.receipts
    }

    /// Service transaction ids of the page's results.
    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        self.receipts
            .iter()
            .map(|r| r.transaction_id.clone())
            .collect()
    }

    /// Number of results on the page.
    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    /// Check if the page holds no results.
    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    /// Catalogs that failed while serving this page.
    pub fn failures(&self) -> &[CatalogFailure] {
        &self.failures
    }

    /// How serving this page went.
    pub fn outcome(&self) -> Outcome {
        let failed = self.failures.len();
        Outcome::from_counts(self.participants.len().saturating_sub(failed), failed)
    }

    /// The [`PageInfo`] that requests the page after this one.
    pub fn next_page_info(&self) -> PageInfo {
        PageInfo::new(self.page_size, self.page_num.saturating_add(1))
    }
}

/// A bounded query against one catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRange {
    /// Position of the catalog among the participants.
    pub catalog: usize,

    /// First local result, inclusive.
    pub start: usize,

    /// Last local result, exclusive.
    pub end: usize,
}

/// Where one page falls in the virtual sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlan {
    /// Page served after clamping.
    pub page_num: usize,

    /// Sum of every catalog's size.
    pub total_count: usize,

    /// Number of pages.
    pub total_pages: usize,

    /// Bounded queries that make up the page, in catalog order.
    pub ranges: Vec<SubRange>,
}

/// Map `page_info` onto per-catalog ranges given each catalog's size.
///
/// `page_info.page_size` must be positive.
pub fn plan_page(page_info: &PageInfo, sizes: &[usize]) -> PagePlan {
    let total_count: usize = sizes.iter().sum();
    let page_num = page_info.resolve(total_count);
    let (start, end) = page_info.bounds(page_num, total_count);

    let mut ranges = Vec::new();
    let mut offset = 0;
    for (catalog, &size) in sizes.iter().enumerate() {
        let (lo, hi) = (offset, offset + size);
        offset = hi;

        let from = start.max(lo);
        let to = end.min(hi);
        if from < to {
            ranges.push(SubRange {
                catalog,
                start: from - lo,
                end: to - lo,
            });
        }
    }

    PagePlan {
        page_num,
        total_count,
        total_pages: total_pages(total_count, page_info.page_size),
        ranges,
    }
}
