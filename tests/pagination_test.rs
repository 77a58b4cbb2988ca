use std::collections::HashSet;
use std::sync::Arc;

use metacat::catalog::Catalog;
use metacat::error::Result;
use metacat::index::MemoryIndex;
use metacat::metadata::Metadata;
use metacat::paging::PageInfo;
use metacat::query::QueryExpression;
use metacat::service::{CATALOG_IDS_KEY, CatalogService, QueryPager, ServiceConfig};

fn record(kind: &str, title: &str, catalog_id: &str) -> Metadata {
    Metadata::new()
        .with_value("kind", kind)
        .with_value("title", title)
        .with_value(CATALOG_IDS_KEY, catalog_id)
}

/// cat1 holds three images, cat2 holds one.
fn two_catalogs() -> Result<CatalogService> {
    let service = CatalogService::new(ServiceConfig::default().with_fan_out_threads(2))?;
    service.add_catalog(Catalog::new("cat1", Arc::new(MemoryIndex::new().with_sequential_ids())))?;
    service.add_catalog(Catalog::new("cat2", Arc::new(MemoryIndex::new().with_sequential_ids())))?;

    for title in ["a", "b", "c"] {
        service.ingest(&record("image", title, "cat1"))?;
    }
    service.ingest(&record("image", "d", "cat2"))?;
    service.ingest(&record("text", "e", "cat2"))?;
    Ok(service)
}

fn images() -> QueryPager {
    QueryPager::new(QueryExpression::term("kind", "image"))
}

#[test]
fn test_pages_span_catalogs() -> Result<()> {
    let service = two_catalogs()?;

    let first = service.get_first_page(&images(), 2)?;
    assert_eq!(first.page_num(), 1);
    assert_eq!(first.total_count(), 4);
    assert_eq!(first.total_pages(), 2);
    assert!(first.is_first());
    assert!(!first.is_last());
    let owners: Vec<&str> = first.receipts().iter().map(|r| r.receipts[0].catalog_id.as_str()).collect();
    assert_eq!(owners, vec!["cat1", "cat1"]);

    let second = service.get_next_page(&first)?;
    assert_eq!(second.page_num(), 2);
    assert!(second.is_last());
    let owners: Vec<&str> = second.receipts().iter().map(|r| r.receipts[0].catalog_id.as_str()).collect();
    assert_eq!(owners, vec!["cat1", "cat2"]);

    let titles: Vec<String> = service
        .get_metadata_for_page(&second)?
        .flatten()
        .0
        .into_iter()
        .filter_map(|r| r.metadata.first_value("title").map(str::to_string))
        .collect();
    assert_eq!(titles, vec!["c", "d"]);
    Ok(())
}

#[test]
fn test_draining_pages_sees_every_match_once() -> Result<()> {
    let service = two_catalogs()?;

    for page_size in 1..=5 {
        let pages = service.get_all_pages(&images(), page_size)?;
        let ids: Vec<_> = pages.iter().flat_map(|p| p.transaction_ids()).collect();
        let unique: HashSet<_> = ids.iter().cloned().collect();

        assert_eq!(ids.len(), 4, "page size {page_size}");
        assert_eq!(unique.len(), 4, "page size {page_size}");
        assert!(pages.last().is_some_and(|p| p.is_last()));
    }
    Ok(())
}

#[test]
fn test_last_page_and_clamping() -> Result<()> {
    let service = two_catalogs()?;

    let last = service.get_last_page(&images(), 3)?;
    assert_eq!(last.page_num(), 2);
    assert_eq!(last.len(), 1);

    let past_end = service.get_page(&PageInfo::new(3, 9), &images())?;
    assert_eq!(past_end.page_num(), 2);
    assert_eq!(past_end.transaction_ids(), last.transaction_ids());

    let again = service.get_next_page(&last)?;
    assert_eq!(again.page_num(), 2);
    Ok(())
}

#[test]
fn test_pager_restricted_to_catalogs() -> Result<()> {
    let service = two_catalogs()?;

    let pager = images().with_catalog_ids(["cat2"]);
    let page = service.get_first_page(&pager, 10)?;
    assert_eq!(page.total_count(), 1);
    assert_eq!(page.participants(), ["cat2"]);
    Ok(())
}

#[test]
fn test_empty_result_has_one_empty_page() -> Result<()> {
    let service = two_catalogs()?;

    let pager = QueryPager::new(QueryExpression::term("kind", "audio"));
    let pages = service.get_all_pages(&pager, 2)?;
    assert_eq!(pages.len(), 1);
    assert!(pages[0].is_empty());
    assert_eq!(pages[0].total_count(), 0);
    Ok(())
}
