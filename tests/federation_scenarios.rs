use std::sync::Arc;
use std::time::Duration;

use metacat::catalog::Catalog;
use metacat::error::{MetacatError, Result};
use metacat::index::MemoryIndex;
use metacat::metadata::Metadata;
use metacat::query::{QueryExpression, QueryParser};
use metacat::service::{
    CATALOG_SERVICE_TRANSACTION_ID_KEY, CatalogService, ENABLE_UPDATE_KEY, Outcome, QueryPager,
    ServiceConfig,
};
use metacat::testing::{Operation, RecordingIndex};

fn record(title: &str) -> Metadata {
    Metadata::new().with_value("kind", "doc").with_value("title", title)
}

fn service_with(config: ServiceConfig, backends: &[(&str, Arc<RecordingIndex>)]) -> Result<CatalogService> {
    let service = CatalogService::new(config.with_fan_out_threads(4))?;
    for (id, backend) in backends {
        service.add_catalog(Catalog::new(*id, backend.clone()))?;
    }
    Ok(service)
}

#[test]
fn test_one_failing_catalog_does_not_sink_the_others() -> Result<()> {
    let healthy = Arc::new(RecordingIndex::sequential());
    let broken = Arc::new(RecordingIndex::sequential());
    let service = service_with(
        ServiceConfig::default(),
        &[("healthy", healthy.clone()), ("broken", broken.clone())],
    )?;

    broken.fail(Operation::Ingest);
    let ingested = service.ingest(&record("mars"))?;
    assert_eq!(ingested.outcome(), Outcome::Partial);
    assert_eq!(ingested.present().count(), 1);
    assert!(ingested.failure_of("broken").is_some());

    broken.fail(Operation::Query);
    let queried = service.query(&QueryExpression::term("title", "mars"), None)?;
    assert_eq!(queried.outcome(), Outcome::Partial);
    assert_eq!(queried.value_of("healthy").map(Vec::len), Some(1));

    broken.fail(Operation::SizeOf);
    let page = service.get_first_page(&QueryPager::new(QueryExpression::All), 10)?;
    assert_eq!(page.len(), 1);
    assert_eq!(page.failures().len(), 1);
    assert_eq!(page.failures()[0].catalog_id, "broken");

    let metrics = service.metrics();
    assert_eq!(metrics.catalog_failures, 3);
    assert_eq!(metrics.pages_served, 1);
    Ok(())
}

#[test]
fn test_strict_mode_fails_the_whole_operation() -> Result<()> {
    let healthy = Arc::new(RecordingIndex::sequential());
    let broken = Arc::new(RecordingIndex::sequential());
    let service = service_with(
        ServiceConfig::default().with_one_catalog_fails_all_fail(true),
        &[("healthy", healthy.clone()), ("broken", broken.clone())],
    )?;

    broken.fail(Operation::Ingest);
    let err = service.ingest(&record("venus")).unwrap_err();
    match err {
        MetacatError::Federated { catalog_ids, .. } => assert_eq!(catalog_ids, vec!["broken"]),
        other => panic!("unexpected error {other:?}"),
    }

    // The healthy catalog still stored its copy.
    assert_eq!(healthy.inner().len(), 1);

    broken.recover(Operation::Ingest);
    broken.fail(Operation::SizeOf);
    let paged = service.get_first_page(&QueryPager::new(QueryExpression::All), 5);
    assert!(matches!(paged, Err(MetacatError::Federated { .. })));
    Ok(())
}

#[test]
fn test_slow_catalog_times_out() -> Result<()> {
    let fast = Arc::new(RecordingIndex::sequential());
    let slow = Arc::new(RecordingIndex::sequential());
    let service = service_with(
        ServiceConfig::default().with_sub_call_timeout(Duration::from_millis(100)),
        &[("fast", fast.clone()), ("slow", slow.clone())],
    )?;
    service.ingest(&record("pluto"))?;

    slow.stall(Operation::Query, Duration::from_millis(500));
    let result = service.query(&QueryExpression::All, None)?;
    assert_eq!(result.value_of("fast").map(Vec::len), Some(1));
    assert!(result.failure_of("slow").is_some_and(|f| f.is_timeout()));
    assert_eq!(service.metrics().timeouts, 1);
    Ok(())
}

#[test]
fn test_service_ids_are_stable_across_queries() -> Result<()> {
    let backend = Arc::new(RecordingIndex::sequential());
    let service = service_with(ServiceConfig::default(), &[("solo", backend)])?;

    let ingested = service.ingest(&record("ceres"))?;
    let receipt = ingested.present().next().cloned().expect("one receipt");

    let query = QueryParser::new().parse("title:ceres")?;
    for _ in 0..3 {
        let (found, _) = service.query(&query, None)?.flatten();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].transaction_id, receipt.transaction_id);
    }

    let local = service.get_catalog_transaction_id(&receipt.transaction_id)?;
    assert_eq!(local.catalog_id, "solo");
    assert_eq!(
        service.get_catalog_service_transaction_id_for(&local.transaction_id, "solo")?,
        receipt.transaction_id
    );

    // Minting anew leaves the old id resolvable.
    let fresh = service.get_catalog_service_transaction_id(&receipt.receipts[0], true);
    assert_ne!(fresh, receipt.transaction_id);
    assert_eq!(service.get_catalog_transaction_id(&fresh)?, local);
    assert_eq!(service.get_catalog_transaction_id(&receipt.transaction_id)?, local);
    Ok(())
}

#[test]
fn test_ingest_with_update_directive_rewrites_record() -> Result<()> {
    let backend = Arc::new(RecordingIndex::sequential());
    let service = service_with(ServiceConfig::default(), &[("solo", backend.clone())])?;

    let first = service.ingest(&record("io"))?;
    let id = first.present().next().map(|r| r.transaction_id.clone()).expect("one receipt");

    let update = record("europa")
        .with_value(CATALOG_SERVICE_TRANSACTION_ID_KEY, id.as_str())
        .with_value(ENABLE_UPDATE_KEY, "true");
    let updated = service.ingest(&update)?;
    assert_eq!(updated.present().next().map(|r| &r.transaction_id), Some(&id));
    assert_eq!(backend.calls(Operation::Update), 1);
    assert_eq!(backend.inner().len(), 1);

    let (records, _) = service.get_metadata(std::slice::from_ref(&id))?.flatten();
    assert_eq!(records[0].metadata.first_value("title"), Some("europa"));
    assert!(!records[0].metadata.contains_key(ENABLE_UPDATE_KEY));

    // Without the flag the id is ignored and a new record is stored.
    let ignored = record("ganymede").with_value(CATALOG_SERVICE_TRANSACTION_ID_KEY, id.as_str());
    service.ingest(&ignored)?;
    assert_eq!(backend.inner().len(), 2);
    Ok(())
}

#[test]
fn test_delete_and_reduce_through_service_ids() -> Result<()> {
    let service = CatalogService::new(ServiceConfig::default())?;
    service.add_catalog(Catalog::new("solo", Arc::new(MemoryIndex::new())))?;

    let ingested = service.ingest(&record("titan").with_value("tag", "moon").with_value("tag", "icy"))?;
    let id = ingested.present().next().map(|r| r.transaction_id.clone()).expect("one receipt");

    assert!(service.reduce(&id, &Metadata::new().with_value("tag", "icy"))?);
    let (records, _) = service.get_metadata(std::slice::from_ref(&id))?.flatten();
    assert_eq!(records[0].metadata.values("tag").unwrap(), ["moon"]);

    assert!(service.delete(&id)?);
    assert!(!service.delete(&id)?);
    let (records, _) = service.get_metadata(std::slice::from_ref(&id))?.flatten();
    assert!(records.is_empty());
    Ok(())
}

#[test]
fn test_metadata_survives_removed_catalog() -> Result<()> {
    let service = CatalogService::new(ServiceConfig::default())?;
    service.add_catalog(Catalog::new("a", Arc::new(MemoryIndex::new())))?;
    service.add_catalog(Catalog::new("b", Arc::new(MemoryIndex::new())))?;

    let ingested = service.ingest(&record("phobos"))?;
    let ids: Vec<_> = ingested.present().map(|r| r.transaction_id.clone()).collect();
    assert_eq!(ids.len(), 2);

    service.remove_catalog("a")?;
    let result = service.get_metadata(&ids)?;
    assert_eq!(result.outcome(), Outcome::Partial);
    assert!(matches!(
        result.failure_of("a").map(|f| f.error.as_ref()),
        Some(MetacatError::UnknownCatalog(_))
    ));
    let records = result.value_of("b").expect("b answered");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata.first_value("title"), Some("phobos"));
    Ok(())
}
