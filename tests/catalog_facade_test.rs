use std::sync::Arc;

use metacat::catalog::Catalog;
use metacat::dictionary::KeyMapDictionary;
use metacat::error::{MetacatError, Result};
use metacat::index::MemoryIndex;
use metacat::metadata::Metadata;
use metacat::paging::PageInfo;
use metacat::query::QueryParser;

fn products() -> Catalog {
    let names = KeyMapDictionary::new("names").with_mapping("Title", "title");
    let kinds = KeyMapDictionary::new("kinds")
        .with_mapping("ProductType", "product_type")
        .with_required("Title");
    Catalog::new("products", Arc::new(MemoryIndex::new().with_sequential_ids()))
        .with_dictionary(Arc::new(names))
        .with_dictionary(Arc::new(kinds))
}

#[test]
fn test_translate_store_and_read_back() -> Result<()> {
    let catalog = products();
    let metadata = Metadata::new()
        .with_value("Title", "Olympus Mons")
        .with_value("ProductType", "image")
        .with_value("Ignored", "dropped");

    let receipt = catalog.ingest(&metadata)?.expect("stored");
    assert_eq!(receipt.catalog_id, "products");
    assert!(catalog.has_transaction_id(&receipt.transaction_id)?);

    let stored = catalog.get_metadata(&receipt.transaction_id)?;
    assert_eq!(stored.first_value("Title"), Some("Olympus Mons"));
    assert_eq!(stored.first_value("ProductType"), Some("image"));
    assert!(!stored.contains_key("Ignored"));
    Ok(())
}

#[test]
fn test_queries_use_term_names() -> Result<()> {
    let catalog = products();
    for (title, kind) in [("a", "image"), ("b", "table"), ("c", "image")] {
        catalog.ingest(&Metadata::new().with_value("Title", title).with_value("ProductType", kind))?;
    }

    let query = QueryParser::new().parse("product_type:image")?;
    assert!(catalog.is_interested(&query));
    assert_eq!(catalog.size_of(&query)?, 2);
    assert_eq!(catalog.query(&query)?.len(), 2);
    assert_eq!(catalog.query_range(&query, 1, 5)?.len(), 1);

    let unknown = QueryParser::new().parse("color:red")?;
    assert!(!catalog.is_interested(&unknown));

    let listed = catalog.transaction_ids(&PageInfo::new(2, 2))?;
    assert_eq!(listed.len(), 1);
    Ok(())
}

#[test]
fn test_key_names_are_not_query_fields() -> Result<()> {
    let catalog = products();
    catalog.ingest(&Metadata::new().with_value("Title", "a").with_value("ProductType", "image"))?;

    let by_key = QueryParser::new().parse("ProductType:image")?;
    assert!(!catalog.is_interested(&by_key));
    assert_eq!(catalog.size_of(&by_key)?, 0);

    let by_term = QueryParser::new().parse("product_type:image")?;
    assert!(catalog.is_interested(&by_term));
    assert_eq!(catalog.size_of(&by_term)?, 1);
    Ok(())
}

#[test]
fn test_irrelevant_record_is_not_stored() -> Result<()> {
    let catalog = products();
    assert!(catalog.ingest(&Metadata::new().with_value("Other", "x"))?.is_none());
    assert_eq!(catalog.size_of(&QueryParser::new().parse("*")?)?, 0);
    Ok(())
}

#[test]
fn test_missing_required_key_is_dictionary_error() {
    let catalog = products();
    let result = catalog.ingest(&Metadata::new().with_value("ProductType", "image"));
    assert!(matches!(result, Err(MetacatError::Dictionary(_))));
}

#[test]
fn test_gates_and_hot_swap() -> Result<()> {
    let catalog = products();
    catalog.set_restrict_ingest_permissions(true);
    assert!(!catalog.is_ingestable());
    assert!(catalog.ingest(&Metadata::new().with_value("Title", "x"))?.is_none());

    catalog.set_restrict_ingest_permissions(false);
    catalog.replace_index(Arc::new(MemoryIndex::new().with_ingest(false)));
    assert!(!catalog.is_ingestable());
    assert!(catalog.is_queriable());
    Ok(())
}
