//! Command implementations for the metacat CLI.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};
use serde_json::Value;

use crate::catalog::Catalog;
use crate::cli::args::*;
use crate::cli::output::*;
use crate::error::{MetacatError, Result};
use crate::index::MemoryIndex;
use crate::metadata::Metadata;
use crate::query::QueryParser;
use crate::service::{CatalogService, QueryPager, ServiceConfig};

/// Catalog created when no configuration file is given.
pub const DEFAULT_CATALOG_ID: &str = "default";

/// Execute a CLI command.
pub fn execute_command(args: MetacatArgs) -> Result<()> {
    match &args.command {
        Command::Catalogs => list_catalogs(&args),
        Command::Ingest(ingest_args) => ingest_records(ingest_args.clone(), &args),
        Command::ParseQuery(parse_args) => parse_query(parse_args, &args),
    }
}

/// Build the service from `--config`, or a single in-memory catalog.
pub fn load_service(args: &MetacatArgs) -> Result<CatalogService> {
    match &args.config {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            CatalogService::new(ServiceConfig::from_json_file(path)?)
        }
        None => {
            let service = CatalogService::new(ServiceConfig::default())?;
            service.add_catalog(Catalog::new(DEFAULT_CATALOG_ID, Arc::new(MemoryIndex::new())))?;
            Ok(service)
        }
    }
}

/// List the configured catalogs.
fn list_catalogs(args: &MetacatArgs) -> Result<()> {
    let service = load_service(args)?;
    let catalogs: Vec<CatalogSummary> = service
        .catalogs()
        .iter()
        .map(|catalog| {
            let info = catalog.info();
            CatalogSummary {
                id: info.id,
                capabilities: info.capabilities,
                queriable: info.queriable,
                ingestable: info.ingestable,
                dictionaries: info.dictionary_count,
            }
        })
        .collect();

    output_result("Catalogs", &catalogs, args)
}

/// Ingest a JSON Lines file, then page through a query if one was given.
fn ingest_records(ingest_args: IngestArgs, args: &MetacatArgs) -> Result<()> {
    let service = load_service(args)?;
    let started = Instant::now();
    let mut summary = IngestSummary {
        records_read: 0,
        receipts: 0,
        skipped: 0,
        failures: Vec::new(),
        duration_ms: 0,
    };

    for (line_num, metadata) in read_records(&ingest_args.records_file)? {
        summary.records_read += 1;
        let metadata = with_catalog_ids(metadata, &ingest_args.catalogs);

        let result = service.ingest(&metadata)?;
        let stored = result.present().count();
        summary.receipts += stored;
        if stored == 0 {
            summary.skipped += 1;
        }
        for failure in result.failures() {
            warn!("line {line_num}: {failure}");
            summary.failures.push(format!("line {line_num}: {failure}"));
        }
    }
    summary.duration_ms = started.elapsed().as_millis() as u64;
    output_result("Records ingested", &summary, args)?;

    let Some(query) = &ingest_args.query else {
        return Ok(());
    };
    let mut pager = QueryPager::new(QueryParser::new().parse(query)?);
    if !ingest_args.catalogs.is_empty() {
        pager = pager.with_catalog_ids(ingest_args.catalogs.iter().cloned());
    }

    for page in service.get_all_pages(&pager, ingest_args.page_size)? {
        let (records, _) = service.get_metadata_for_page(&page)?.flatten();
        let report = PageReport {
            page_num: page.page_num(),
            total_pages: page.total_pages(),
            total_count: page.total_count(),
            records,
            failures: page.failures().iter().map(ToString::to_string).collect(),
        };
        output_result(&format!("Page {}", page.page_num()), &report, args)?;
    }
    Ok(())
}

/// Parse a query and print its syntax tree.
fn parse_query(parse_args: &ParseQueryArgs, args: &MetacatArgs) -> Result<()> {
    let expression = QueryParser::new().parse(&parse_args.query)?;
    output_result(&format!("Parsed: {expression}"), &expression, args)
}

/// Read one metadata record per non-empty line.
pub fn read_records(path: &Path) -> Result<Vec<(usize, Metadata)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)?;
        records.push((index + 1, metadata_from_json(&value)?));
    }
    Ok(records)
}

/// Convert a JSON object of strings, numbers, booleans or arrays of them.
pub fn metadata_from_json(value: &Value) -> Result<Metadata> {
    let Value::Object(object) = value else {
        return Err(MetacatError::invalid_argument("record must be a JSON object"));
    };

    let mut metadata = Metadata::new();
    for (key, value) in object {
        match value {
            Value::Array(items) => {
                for item in items {
                    metadata.add_value(key.as_str(), scalar(key, item)?);
                }
            }
            other => metadata.add_value(key.as_str(), scalar(key, other)?),
        }
    }
    Ok(metadata)
}

fn scalar(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(MetacatError::invalid_argument(format!(
            "value of '{key}' must be a string, number, boolean or array of them"
        ))),
    }
}

fn with_catalog_ids(mut metadata: Metadata, catalog_ids: &[String]) -> Metadata {
    if !catalog_ids.is_empty() {
        metadata.replace_values(crate::service::CATALOG_IDS_KEY, catalog_ids.iter().cloned());
    }
    metadata
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_metadata_from_json() {
        let metadata = metadata_from_json(&json!({
            "title": "Mars",
            "tag": ["red", "planet"],
            "moons": 2,
        }))
        .unwrap();

        assert_eq!(metadata.values("tag").unwrap(), ["red", "planet"]);
        assert_eq!(metadata.first_value("moons"), Some("2"));
        assert!(metadata_from_json(&json!(["not", "an", "object"])).is_err());
        assert!(metadata_from_json(&json!({"nested": {"a": 1}})).is_err());
    }

    #[test]
    fn test_read_records_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{\"title\": \"a\"}}").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{\"title\": \"b\"}}").unwrap();

        let records = read_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].0, 3);
        assert_eq!(records[1].1.first_value("title"), Some("b"));
    }

    #[test]
    fn test_default_service_has_one_catalog() {
        let args = MetacatArgs {
            verbose: 0,
            quiet: true,
            config: None,
            output_format: OutputFormat::Json,
            pretty: false,
            command: Command::Catalogs,
        };
        let service = load_service(&args).unwrap();
        assert_eq!(service.get_current_catalog_ids(), vec![DEFAULT_CATALOG_ID]);
    }
}
