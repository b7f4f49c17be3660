//! Text (terminal) reporter with colors and formatting

use crate::models::{QcReport, QcResult, Status};
use anyhow::Result;

/// Status colors (ANSI escape codes)
fn status_color(status: Status) -> &'static str {
    match status {
        Status::Pass => "\x1b[32m",                         // Green
        Status::Inapplicable | Status::Minor => "\x1b[33m", // Yellow
        Status::Warning => "\x1b[38;5;208m",                // Orange
        Status::Failure => "\x1b[31m",                      // Red
    }
}

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const SCREW_COLUMN: usize = 8;

/// Render report as formatted terminal output
pub fn render(report: &QcReport) -> Result<String> {
    let mut out = String::new();

    out.push_str(&format!("\n{BOLD}Screw QC{RESET}\n"));
    out.push_str(&format!(
        "{DIM}──────────────────────────────────────{RESET}\n"
    ));

    let widths: Vec<usize> = report
        .checks
        .iter()
        .map(|kind| {
            report
                .rows
                .iter()
                .filter_map(|row| row.results.get(kind))
                .map(|r| r.content.cell_value().chars().count())
                .chain(std::iter::once(kind.title().chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    // Header row
    out.push_str(&format!("{BOLD}{:<SCREW_COLUMN$}", "Screw"));
    for (kind, width) in report.checks.iter().zip(&widths) {
        out.push_str(&format!("  {:<width$}", kind.title(), width = *width));
    }
    out.push_str(&format!("{RESET}\n"));

    for row in &report.rows {
        out.push_str(&format!("{:<SCREW_COLUMN$}", row.screw.to_string()));
        for (kind, width) in report.checks.iter().zip(&widths) {
            match row.results.get(kind) {
                Some(result) => out.push_str(&format!("  {}", format_cell(result, *width))),
                // Pair failed or is not evaluated
                None => out.push_str(&format!("  {DIM}{:<width$}{RESET}", "-", width = *width)),
            }
        }
        out.push('\n');
    }

    let notes: Vec<String> = report
        .rows
        .iter()
        .flat_map(|row| row.results.values())
        .filter(|r| !r.bubble_message().is_empty())
        .map(|r| {
            format!(
                "  {}{:>3}{RESET} {}: {}",
                status_color(r.status()),
                r.screw.to_string(),
                r.kind().title(),
                r.bubble_message().replace('\n', "; ")
            )
        })
        .collect();
    if !notes.is_empty() {
        out.push_str(&format!("\n{BOLD}NOTES{RESET}\n"));
        for note in notes {
            out.push_str(&note);
            out.push('\n');
        }
    }

    if !report.failures.is_empty() {
        out.push_str(&format!("\n{BOLD}ERRORS{RESET} ({} pairs)\n", report.failures.len()));
        for failure in &report.failures {
            out.push_str(&format!(
                "  {}{:>3}{RESET} {}: {}\n",
                status_color(Status::Failure),
                failure.screw.to_string(),
                failure.check,
                failure.error
            ));
        }
    }

    let s = &report.summary;
    out.push_str(&format!(
        "\n{BOLD}SUMMARY{RESET} ({} results)\n  {}{} pass{RESET}  {}{} n/a{RESET}  {}{} minor{RESET}  {}{} warning{RESET}  {}{} failure{RESET}",
        s.total,
        status_color(Status::Pass),
        s.pass,
        status_color(Status::Inapplicable),
        s.inapplicable,
        status_color(Status::Minor),
        s.minor,
        status_color(Status::Warning),
        s.warning,
        status_color(Status::Failure),
        s.failure,
    ));
    if s.errors > 0 {
        out.push_str(&format!("  {DIM}{} errors{RESET}", s.errors));
    }
    out.push('\n');

    Ok(out)
}

fn format_cell(result: &QcResult, width: usize) -> String {
    format!(
        "{}{:<width$}{RESET}",
        status_color(result.status()),
        result.content.cell_value(),
        width = width
    )
}
