//! Command line argument parsing for the metacat CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

/// metacat - a federated metadata catalog
#[derive(Parser, Debug, Clone)]
#[command(name = "metacat")]
#[command(about = "Federated metadata catalog over pluggable index backends")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct MetacatArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Service configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE", env = "METACAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl MetacatArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }

    /// Log filter for the effective verbosity; `RUST_LOG` may refine it.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbosity() {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the configured catalogs
    Catalogs,

    /// Ingest JSON Lines records, then optionally page through a query
    Ingest(IngestArgs),

    /// Parse a query and print its syntax tree
    #[command(name = "parse-query")]
    ParseQuery(ParseQueryArgs),
}

/// Arguments for ingesting records
#[derive(Parser, Debug, Clone)]
pub struct IngestArgs {
    /// Records file, one JSON object per line
    #[arg(value_name = "RECORDS_FILE")]
    pub records_file: PathBuf,

    /// Query to page through after ingesting
    #[arg(long)]
    pub query: Option<String>,

    /// Results per page
    #[arg(long, default_value = "10")]
    pub page_size: usize,

    /// Catalogs to ingest into and query (comma-separated, default: all)
    #[arg(long, value_delimiter = ',')]
    pub catalogs: Vec<String>,
}

/// Arguments for parsing a query
#[derive(Parser, Debug, Clone)]
pub struct ParseQueryArgs {
    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_args() {
        let args = MetacatArgs::try_parse_from([
            "metacat",
            "-vv",
            "--format",
            "json",
            "ingest",
            "records.jsonl",
            "--query",
            "kind:image",
            "--page-size",
            "5",
            "--catalogs",
            "a,b",
        ])
        .unwrap();

        assert_eq!(args.verbosity(), 2);
        assert_eq!(args.output_format, OutputFormat::Json);
        match args.command {
            Command::Ingest(ingest) => {
                assert_eq!(ingest.page_size, 5);
                assert_eq!(ingest.query.as_deref(), Some("kind:image"));
                assert_eq!(ingest.catalogs, vec!["a", "b"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        let args = MetacatArgs::try_parse_from(["metacat", "-v", "-q", "catalogs"]).unwrap();
        assert_eq!(args.verbosity(), 0);
        assert_eq!(args.log_level(), LevelFilter::Error);
    }

    #[test]
    fn test_log_level_follows_verbosity() {
        let level = |flags: &[&str]| {
            let mut argv = vec!["metacat"];
            argv.extend_from_slice(flags);
            argv.push("catalogs");
            MetacatArgs::try_parse_from(argv).unwrap().log_level()
        };

        assert_eq!(level(&[]), LevelFilter::Warn);
        assert_eq!(level(&["-v"]), LevelFilter::Warn);
        assert_eq!(level(&["-vv"]), LevelFilter::Info);
        assert_eq!(level(&["-vvvv"]), LevelFilter::Debug);
    }
}
