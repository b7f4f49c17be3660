//! JSON reporter
//!
//! Outputs the full QcReport as pretty-printed JSON, including the inputs
//! each result was derived from.

use crate::models::QcReport;
use anyhow::Result;

/// Render report as JSON
pub fn render(report: &QcReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_report;

    #[test]
    fn test_json_render_valid() {
        let report = test_report();
        let json_str = render(&report).expect("render JSON");
        let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("parse JSON");
        assert_eq!(parsed["summary"]["errors"], 1);
        assert_eq!(parsed["rows"].as_array().expect("rows array").len(), 2);
        assert_eq!(
            parsed["rows"][1]["results"]["pastille-deformed"]["content"]["kind"],
            "pastille-deformed"
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let report = test_report();
        let json_str = render(&report).expect("render JSON");
        let back: QcReport = serde_json::from_str(&json_str).expect("parse report");
        assert_eq!(back.rows, report.rows);
        assert_eq!(back.summary, report.summary);
    }
}
