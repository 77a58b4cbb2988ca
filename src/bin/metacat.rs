//! metacat operator binary.

use std::io::Write;
use std::process;

use clap::Parser;

use metacat::cli::{MetacatArgs, execute_command};

fn main() {
    let args = MetacatArgs::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .format(|buf, record| {
            writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args())
        })
        .init();

    if let Err(e) = execute_command(args) {
        eprintln!("metacat: {e}");
        if let Some(catalog_id) = e.catalog_id() {
            eprintln!("  in catalog '{catalog_id}'");
        }
        process::exit(1);
    }
}
