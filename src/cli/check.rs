//! Check command - run QC over a plan file

use crate::checks::{CheckerManagerBuilder, IncrementalCache, DEFAULT_WORKERS};
use crate::config::{load_project_config, normalize_check_name, ProjectConfig};
use crate::hardware::PlanSnapshot;
use crate::models::{CheckKind, QcSummary, Status};
use crate::reporters::{self, OutputFormat};
use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Directory next to the plan holding the persistent cache
const CACHE_DIR: &str = ".screwqc";

/// Arguments of the check command after CLI parsing
#[derive(Debug, Clone, Default)]
pub struct CheckArgs {
    pub plan: PathBuf,
    pub format: Option<String>,
    pub output: Option<PathBuf>,
    pub checks: Vec<String>,
    pub skip_checks: Vec<String>,
    pub fail_on: Option<String>,
    pub cache: bool,
    pub workers: Option<usize>,
}

/// Run the check command
pub fn run(args: CheckArgs) -> Result<()> {
    let plan_path = args
        .plan
        .canonicalize()
        .with_context(|| format!("Plan file does not exist: {}", args.plan.display()))?;
    let plan_dir = plan_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let config = load_project_config(&plan_dir);
    for name in config.unknown_checks() {
        warn!("Ignoring unknown check '{}' in project config", name);
    }

    let kinds = select_checks(&config, &args.checks, &args.skip_checks)?;
    let thresholds = config
        .threshold_table()
        .context("Invalid threshold overrides in project config")?;
    let settings = config
        .check_settings()
        .context("Invalid check settings in project config")?;

    let plan = PlanSnapshot::from_json_file(&plan_path)?;
    for issue in plan.validate() {
        warn!("Plan issue: {}", issue);
    }

    let workers = args
        .workers
        .or(config.defaults.workers)
        .unwrap_or(DEFAULT_WORKERS);
    let mut builder = CheckerManagerBuilder::new()
        .workers(workers)
        .settings(settings)
        .thresholds(thresholds)
        .checks(kinds);
    if args.cache || config.defaults.cache == Some(true) {
        builder = builder.cache(IncrementalCache::new(&plan_dir.join(CACHE_DIR)));
    }
    let mut manager = builder.build();

    let report = manager.run(Arc::new(plan))?;
    if let Err(e) = manager.save_cache() {
        warn!("Failed to save QC cache: {}", e);
    }

    let format: OutputFormat = args
        .format
        .as_deref()
        .or(config.defaults.format.as_deref())
        .unwrap_or("text")
        .parse()?;
    let output = reporters::report_with_format(&report, format)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
            eprintln!(
                "{} Report written to {}",
                style("✓").green(),
                style(path.display()).cyan()
            );
        }
        None => println!("{}", output),
    }

    let fail_on = args.fail_on.or_else(|| config.defaults.fail_on.clone());
    if let Some(threshold) = fail_on {
        let status: Status = threshold.parse()?;
        if should_fail(status, &report.summary) {
            eprintln!("Failing due to --fail-on={} threshold", threshold);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Checks to run: explicit `--check` list, else the config's enabled checks, minus skips
fn select_checks(
    config: &ProjectConfig,
    only: &[String],
    skip: &[String],
) -> Result<Vec<CheckKind>> {
    let mut kinds: Vec<CheckKind> = if only.is_empty() {
        config.enabled_checks()
    } else {
        only.iter()
            .map(|name| parse_check(name))
            .collect::<Result<Vec<_>>>()?
    };
    let skipped: Vec<CheckKind> = skip
        .iter()
        .map(|name| parse_check(name))
        .collect::<Result<Vec<_>>>()?;
    kinds.retain(|k| !skipped.contains(k));
    kinds.sort();
    kinds.dedup();
    Ok(kinds)
}

/// Check name from the command line, accepted in any form the config accepts
fn parse_check(name: &str) -> Result<CheckKind> {
    normalize_check_name(name).parse::<CheckKind>()
}

/// Whether any result is at or above `threshold`
///
/// A pair that could not be evaluated counts as a failure at every threshold.
fn should_fail(threshold: Status, summary: &QcSummary) -> bool {
    summary.errors > 0 || summary.at_or_above(threshold) > 0
}
