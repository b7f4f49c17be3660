//! HTML reporter for plan review documents
//!
//! Generates a standalone HTML page with one row per screw and one colored
//! cell per check. Cells come straight from
//! [`QcResult::doc_table_cell_message`] so the document table matches what
//! the planning UI shows; tooltip text is collected in a trailing notes
//! column.

use crate::models::{escape_html, QcReport, QcResult, ScrewRow};
use anyhow::Result;
use chrono::Local;

/// Render report as standalone HTML
pub fn render(report: &QcReport) -> Result<String> {
    let mut html = String::new();

    html.push_str(&render_head());
    html.push_str("<body>\n<div class=\"container\">\n");
    html.push_str(&render_header());
    html.push_str("<div class=\"content\">\n");
    html.push_str(&render_summary(report));
    html.push_str(&render_table(report));
    html.push_str(&render_failures(report));
    html.push_str("</div>\n");
    html.push_str("</div>\n</body>\n</html>");

    Ok(html)
}

fn render_head() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Screw QC Report</title>
    <style>
{CSS}
    </style>
</head>
"#
    )
}

fn render_header() -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!(
        r#"<div class="header">
    <h1>Screw QC Report</h1>
    <p class="timestamp">Generated {}</p>
</div>
"#,
        timestamp
    )
}

fn render_summary(report: &QcReport) -> String {
    let s = &report.summary;
    format!(
        r#"<div class="summary">
    <span class="col_green">{} pass</span>
    <span class="col_yellow">{} n/a</span>
    <span class="col_yellow">{} minor</span>
    <span class="col_orange">{} warning</span>
    <span class="col_red">{} failure</span>
    <span>{} errors</span>
</div>
"#,
        s.pass, s.inapplicable, s.minor, s.warning, s.failure, s.errors
    )
}

fn render_table(report: &QcReport) -> String {
    let mut html = String::from("<table class=\"qc\">\n<thead><tr><th>Case</th><th>Screw</th>");
    for kind in &report.checks {
        html.push_str(&format!("<th>{}</th>", escape_html(kind.title())));
    }
    html.push_str("<th>Notes</th></tr></thead>\n<tbody>\n");

    for row in &report.rows {
        html.push_str(&render_row(report, row));
    }

    html.push_str("</tbody>\n</table>\n");
    html
}

fn render_row(report: &QcReport, row: &ScrewRow) -> String {
    let mut html = format!(
        "<tr><td>{}</td><td>{}</td>",
        escape_html(row.screw.case.as_str()),
        row.screw.index
    );
    for kind in &report.checks {
        match row.results.get(kind) {
            Some(result) => html.push_str(&result.doc_table_cell_message()),
            None => html.push_str("<td class=\"col_none\">-</td>"),
        }
    }
    html.push_str(&format!("<td class=\"notes\">{}</td></tr>\n", render_notes(row)));
    html
}

fn render_notes(row: &ScrewRow) -> String {
    row.results
        .values()
        .map(QcResult::bubble_message)
        .filter(|m| !m.is_empty())
        .map(|m| escape_html(&m).replace('\n', "<br>"))
        .collect::<Vec<_>>()
        .join("<br>")
}

fn render_failures(report: &QcReport) -> String {
    if report.failures.is_empty() {
        return String::new();
    }
    let mut html = String::from("<h2>Checks that could not run</h2>\n<ul class=\"failures\">\n");
    for failure in &report.failures {
        html.push_str(&format!(
            "<li>Screw {} ({}): {}</li>\n",
            failure.screw,
            escape_html(failure.check.title()),
            escape_html(&failure.error)
        ));
    }
    html.push_str("</ul>\n");
    html
}

// Embedded CSS
const CSS: &str = r#"
body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    color: #1e293b;
    background: #f8fafc;
    padding: 2rem;
}

.container {
    max-width: 1200px;
    margin: 0 auto;
    background: white;
    border-radius: 12px;
    box-shadow: 0 4px 6px -1px rgba(0,0,0,0.1);
    overflow: hidden;
}

.header { background: #334155; color: white; padding: 2rem; }
.header .timestamp { opacity: 0.8; font-size: 0.9rem; }
.content { padding: 2rem; }
.summary span { margin-right: 1rem; padding: 0.2rem 0.5rem; border-radius: 4px; }

table.qc { border-collapse: collapse; width: 100%; }
table.qc th, table.qc td { border: 1px solid #e2e8f0; padding: 0.4rem 0.6rem; text-align: left; }
table.qc th { background: #f1f5f9; }
td.notes { font-size: 0.85rem; color: #475569; }

.col_green { background: #bbf7d0; }
.col_yellow { background: #fef08a; }
.col_orange { background: #fed7aa; }
.col_red { background: #fecaca; }
.col_none { color: #94a3b8; }
"#;
