//! Thresholds command - show the effective distance limits

use crate::config::load_project_config;
use crate::thresholds::ThresholdTable;
use anyhow::{Context, Result};
use console::style;
use std::path::Path;

/// Run the thresholds command
pub fn run(dir: &Path) -> Result<()> {
    let config = load_project_config(dir);
    let table = config
        .threshold_table()
        .context("Invalid threshold overrides in project config")?;
    print!("{}", render(&table));
    Ok(())
}

fn render(table: &ThresholdTable) -> String {
    let mut out = format!(
        "\n{}\n{:<12} {:<12} {:>10} {:>10} {:>10}\n",
        style("Distance thresholds (mm)").bold(),
        "Brand",
        "Implant",
        "Min dist",
        "Width min",
        "Width max"
    );
    for (brand, implant, entry) in table.rows() {
        out.push_str(&format!(
            "{:<12} {:<12} {:>10.2} {:>10.2} {:>10.2}\n",
            brand.to_string(),
            implant.to_string(),
            entry.min_distance,
            entry.plate_width_min,
            entry.plate_width_max
        ));
    }

    out.push_str(&format!("\n{}\n", style("Screw diameters (mm)").bold()));
    for (name, diameter) in table.screw_diameters() {
        out.push_str(&format!("{:<24} {:>6.2}\n", name, diameter));
    }
    out
}
