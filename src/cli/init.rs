//! Init command - write a starter screwqc.toml

use crate::config::CONFIG_FILE_NAME;
use anyhow::{Context, Result};
use console::style;
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# screw-qc configuration
# Read from the directory holding the plan file.

# Disable individual checks
# [checks.barrel-type]
# enabled = false

[settings]
# Trajectory extension past the screw tip when testing osteotomy cuts (mm)
osteotomy_extension = 1.0
# Clearance to critical anatomy below which a screw is a warning / minor issue (mm)
obstacle_warning = 0.5
obstacle_minor = 1.0

# Override brand thresholds
# [[thresholds]]
# brand = "synthes"
# implant_type = "lefort"
# min_distance = 3.5
# plate_width_min = 1.0
# plate_width_max = 3.2

# Extra screw types
# [screw_diameters]
# "matrix-midface-1.5" = 1.5

[defaults]
# Output format (text, json, html)
format = "text"
# Parallel workers
workers = 2
# Exit with code 1 at or above this status (minor, warning, failure)
# fail_on = "failure"
# skip_checks = []
"#;

/// Run the init command
pub fn run(dir: &Path) -> Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", dir.display()))?;

    if !dir.is_dir() {
        anyhow::bail!("Path is not a directory: {}", dir.display());
    }

    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        println!(
            "{} Config already exists at {}",
            style("✓").green(),
            style(config_path.display()).cyan()
        );
        return Ok(());
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| "Failed to create config file")?;
    println!(
        "{} Created {}",
        style("✓").green(),
        style(config_path.display()).cyan()
    );
    Ok(())
}
