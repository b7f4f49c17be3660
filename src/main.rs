//! screw-qc - Screw quality-control CLI
//!
//! Runs the QC checks on a plan file and reports the results as a
//! terminal table, JSON or an HTML document table.

use anyhow::Result;
use clap::Parser;
use screw_qc::cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("screw_qc={}", cli.log_level)));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run(cli)
}
