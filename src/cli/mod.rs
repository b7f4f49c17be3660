//! CLI command definitions and handlers

mod check;
mod init;
mod thresholds;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// screw-qc - Quality control for CMF implant screw plans
#[derive(Parser, Debug)]
#[command(name = "screw-qc")]
#[command(
    version,
    about = "Quality control for craniomaxillofacial implant plans: screw spacing, osteotomy crossings, barrels, pastilles and anatomical clearance",
    after_help = "\
Examples:
  screw-qc check plan.json                       Check every screw, print a table
  screw-qc check plan.json -f html -o qc.html    Write the QC document table
  screw-qc check plan.json --fail-on warning     Exit code 1 on warnings (CI mode)
  screw-qc thresholds                            Show the effective threshold table
  screw-qc init                                  Write a starter screwqc.toml"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of parallel workers (1-64, default 2)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the QC checks on a plan file
    #[command(after_help = "\
Checks: min-max-distance, osteotomy-intersection, barrel-type, pastille-deformed, anatomical-obstacle

Configuration is read from screwqc.toml (or .screwqcrc.json) next to the plan file.")]
    Check {
        /// Plan file (JSON)
        plan: PathBuf,

        /// Output format: text, json, html
        #[arg(long, short = 'f', value_parser = ["text", "json", "html"])]
        format: Option<String>,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Run only these checks
        #[arg(long = "check")]
        checks: Vec<String>,

        /// Skip specific checks
        #[arg(long)]
        skip_check: Vec<String>,

        /// Exit with code 1 if any result is at or above this status
        #[arg(long, value_parser = ["minor", "warning", "failure"])]
        fail_on: Option<String>,

        /// Reuse and update the result cache in .screwqc/ next to the plan
        #[arg(long)]
        cache: bool,
    },

    /// Print the effective threshold table
    Thresholds {
        /// Directory holding screwqc.toml (default: current directory)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Initialize a screwqc.toml config file with example settings
    Init {
        /// Target directory (default: current directory)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Check {
            plan,
            format,
            output,
            checks,
            skip_check,
            fail_on,
            cache,
        } => check::run(check::CheckArgs {
            plan,
            format,
            output,
            checks,
            skip_checks: skip_check,
            fail_on,
            cache,
            workers: cli.workers,
        }),

        Commands::Thresholds { dir } => thresholds::run(&dir),

        Commands::Init { dir } => init::run(&dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workers() {
        assert_eq!(parse_workers("4"), Ok(4));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("65").is_err());
        assert!(parse_workers("many").is_err());
    }

    #[test]
    fn test_parse_check_command() {
        let cli = Cli::try_parse_from([
            "screw-qc",
            "check",
            "plan.json",
            "--check",
            "barrel-type",
            "--check",
            "pastille-deformed",
            "--fail-on",
            "warning",
            "--workers",
            "3",
        ])
        .expect("parse args");
        assert_eq!(cli.workers, Some(3));
        match cli.command {
            Commands::Check {
                plan,
                checks,
                fail_on,
                ..
            } => {
                assert_eq!(plan, PathBuf::from("plan.json"));
                assert_eq!(checks, vec!["barrel-type", "pastille-deformed"]);
                assert_eq!(fail_on.as_deref(), Some("warning"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["screw-qc", "check", "plan.json", "-f", "sarif"]).is_err());
    }
}
