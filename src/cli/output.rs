//! Output formatting for CLI commands.

use serde::Serialize;

use crate::cli::args::{MetacatArgs, OutputFormat};
use crate::error::Result;
use crate::index::Capabilities;
use crate::service::RecordMetadata;

/// One row of the `catalogs` listing.
#[derive(Debug, Serialize)]
pub struct CatalogSummary {
    pub id: String,
    pub capabilities: Capabilities,
    pub queriable: bool,
    pub ingestable: bool,
    pub dictionaries: usize,
}

/// Result of ingesting a records file.
#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub records_read: usize,
    pub receipts: usize,
    pub skipped: usize,
    pub failures: Vec<String>,
    pub duration_ms: u64,
}

/// One page of query results.
#[derive(Debug, Serialize)]
pub struct PageReport {
    pub page_num: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub records: Vec<RecordMetadata>,
    pub failures: Vec<String>,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &MetacatArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &MetacatArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    match &value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                println!("{key}: {}", format_value(val));
            }
        }
        serde_json::Value::Array(rows) => {
            for row in rows {
                println!("{}", format_value(row));
            }
        }
        other => println!("{}", format_value(other)),
    }
    Ok(())
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &MetacatArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Format a JSON value for human output.
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        serde_json::Value::Object(obj) => {
            let fields = obj
                .iter()
                .map(|(k, v)| format!("{k}={}", format_value(v)))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{{{fields}}}")
        }
        serde_json::Value::Null => "null".to_string(),
    }
}
