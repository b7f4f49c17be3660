//! QC result models
//!
//! A [`QcResult`] wraps a check-specific [`Content`] payload. Everything a
//! result shows (status, bubble text, report cell) is derived from the
//! content alone, so a result rebuilt from its serialized content renders
//! exactly like the original.

use crate::hardware::{CaseId, ConnectionId, DotId, ScrewId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Placeholder shown when a check was skipped for one screw
pub const NO_QC_CHECK: &str = "No QC Check";
/// Placeholder shown when a check does not apply to the plan
pub const NOT_APPLICABLE: &str = "N/A";
/// Placeholder shown when a measurement could not be taken
pub const NOT_A_NUMBER: &str = "NaN";

pub const DEFAULT_OBSTACLE_WARNING: f64 = 0.5;
pub const DEFAULT_OBSTACLE_MINOR: f64 = 1.0;

/// The available checks
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum CheckKind {
    MinMaxDistance,
    OsteotomyIntersection,
    BarrelType,
    PastilleDeformed,
    AnatomicalObstacle,
}

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        CheckKind::MinMaxDistance,
        CheckKind::OsteotomyIntersection,
        CheckKind::BarrelType,
        CheckKind::PastilleDeformed,
        CheckKind::AnatomicalObstacle,
    ];

    /// Kebab-case name used in config and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::MinMaxDistance => "min-max-distance",
            CheckKind::OsteotomyIntersection => "osteotomy-intersection",
            CheckKind::BarrelType => "barrel-type",
            CheckKind::PastilleDeformed => "pastille-deformed",
            CheckKind::AnatomicalObstacle => "anatomical-obstacle",
        }
    }

    /// Column header in reports
    pub fn title(&self) -> &'static str {
        match self {
            CheckKind::MinMaxDistance => "Screw Distance",
            CheckKind::OsteotomyIntersection => "Osteotomy Intersection",
            CheckKind::BarrelType => "Barrel Type",
            CheckKind::PastilleDeformed => "Pastille Deformed",
            CheckKind::AnatomicalObstacle => "Anatomical Obstacle (mm)",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CheckKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        CheckKind::ALL
            .into_iter()
            .find(|k| k.name() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = CheckKind::ALL.iter().map(|k| k.name()).collect();
                anyhow::anyhow!("Unknown check '{}'. Valid checks: {}", s, valid.join(", "))
            })
    }
}

/// Outcome class of a result.
///
/// Ordered from best to worst; `Inapplicable` sits right after `Pass` so it
/// never hides a real problem when results are aggregated, and is never
/// reported as a pass.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pass,
    Inapplicable,
    Minor,
    Warning,
    Failure,
}

impl Status {
    /// Report colour; inapplicable results use yellow next to a placeholder value
    pub fn color(&self) -> &'static str {
        match self {
            Status::Pass => "green",
            Status::Inapplicable | Status::Minor => "yellow",
            Status::Warning => "orange",
            Status::Failure => "red",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Status::Pass)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pass => write!(f, "pass"),
            Status::Inapplicable => write!(f, "n/a"),
            Status::Minor => write!(f, "minor"),
            Status::Warning => write!(f, "warning"),
            Status::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" | "green" => Ok(Status::Pass),
            "minor" | "yellow" => Ok(Status::Minor),
            "warning" | "orange" => Ok(Status::Warning),
            "failure" | "red" => Ok(Status::Failure),
            "n/a" | "inapplicable" => Ok(Status::Inapplicable),
            _ => Err(anyhow::anyhow!(
                "Unknown status '{}'. Valid: pass, minor, warning, failure",
                s
            )),
        }
    }
}

/// Plan input a result was derived from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "input", content = "id", rename_all = "kebab-case")]
pub enum InputKey {
    Screw(ScrewId),
    /// The set of screws belonging to a case
    CaseScrews(CaseId),
    Case(CaseId),
    Dot(DotId),
    Connection(ConnectionId),
    Bone(ScrewId),
    Barrel(ScrewId),
    Osteotomy,
    CriticalStructures,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MinMaxDistanceContent {
    #[serde(default)]
    pub too_close: Vec<ScrewId>,
    #[serde(default)]
    pub too_far: Vec<ScrewId>,
    /// Screw has no attachment point, so the check was skipped
    #[serde(default)]
    pub is_floating_screw: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OsteotomyIntersectionContent {
    pub has_osteotomy_plane: bool,
    #[serde(default)]
    pub is_floating_screw: bool,
    #[serde(default)]
    pub is_intersected: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BarrelTypeContent {
    #[serde(default)]
    pub barrel_type: Option<String>,
    #[serde(default)]
    pub has_registered_barrel: bool,
    #[serde(default)]
    pub is_guide_creation_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastilleDeformedContent {
    #[serde(default = "default_true")]
    pub has_pastille: bool,
    #[serde(default)]
    pub is_deformed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnatomicalObstacleContent {
    /// `None` when the plan has no critical structures
    #[serde(default)]
    pub distance_to_anatomical_obstacles: Option<f64>,
    #[serde(default = "default_obstacle_warning")]
    pub warning_threshold: f64,
    #[serde(default = "default_obstacle_minor")]
    pub minor_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_obstacle_warning() -> f64 {
    DEFAULT_OBSTACLE_WARNING
}

fn default_obstacle_minor() -> f64 {
    DEFAULT_OBSTACLE_MINOR
}

/// Serializable payload of one result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Content {
    MinMaxDistance(MinMaxDistanceContent),
    OsteotomyIntersection(OsteotomyIntersectionContent),
    BarrelType(BarrelTypeContent),
    PastilleDeformed(PastilleDeformedContent),
    AnatomicalObstacle(AnatomicalObstacleContent),
}

impl Content {
    pub fn kind(&self) -> CheckKind {
        match self {
            Content::MinMaxDistance(_) => CheckKind::MinMaxDistance,
            Content::OsteotomyIntersection(_) => CheckKind::OsteotomyIntersection,
            Content::BarrelType(_) => CheckKind::BarrelType,
            Content::PastilleDeformed(_) => CheckKind::PastilleDeformed,
            Content::AnatomicalObstacle(_) => CheckKind::AnatomicalObstacle,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Content::MinMaxDistance(c) => {
                if c.is_floating_screw {
                    Status::Inapplicable
                } else if !c.too_close.is_empty() {
                    Status::Failure
                } else if !c.too_far.is_empty() {
                    Status::Warning
                } else {
                    Status::Pass
                }
            }
            Content::OsteotomyIntersection(c) => {
                if !c.has_osteotomy_plane || c.is_floating_screw {
                    Status::Inapplicable
                } else if c.is_intersected {
                    Status::Failure
                } else {
                    Status::Pass
                }
            }
            Content::BarrelType(c) => match (&c.barrel_type, c.is_guide_creation_error) {
                (None, _) => Status::Inapplicable,
                (Some(_), true) => Status::Warning,
                (Some(_), false) => Status::Pass,
            },
            Content::PastilleDeformed(c) => {
                if !c.has_pastille {
                    Status::Inapplicable
                } else if c.is_deformed {
                    Status::Failure
                } else {
                    Status::Pass
                }
            }
            Content::AnatomicalObstacle(c) => match c.distance_to_anatomical_obstacles {
                None => Status::Inapplicable,
                Some(d) if d <= 0.0 => Status::Failure,
                Some(d) if d < c.warning_threshold => Status::Warning,
                Some(d) if d < c.minor_threshold => Status::Minor,
                Some(_) => Status::Pass,
            },
        }
    }

    /// Tooltip text; empty when there is nothing to point out
    pub fn bubble_message(&self) -> String {
        match self {
            Content::MinMaxDistance(c) => {
                if c.is_floating_screw {
                    return "Floating screw, distance check skipped".to_string();
                }
                let mut parts = Vec::new();
                if !c.too_close.is_empty() {
                    parts.push(format!("Too close to screw(s): {}", join_ids(&c.too_close)));
                }
                if !c.too_far.is_empty() {
                    parts.push(format!("Too far from screw(s): {}", join_ids(&c.too_far)));
                }
                parts.join("\n")
            }
            Content::OsteotomyIntersection(c) => {
                if !c.has_osteotomy_plane {
                    String::new()
                } else if c.is_floating_screw {
                    "Floating screw, osteotomy check skipped".to_string()
                } else if c.is_intersected {
                    "Screw trajectory crosses an osteotomy".to_string()
                } else {
                    String::new()
                }
            }
            Content::BarrelType(c) => match (&c.barrel_type, c.is_guide_creation_error) {
                (Some(barrel), true) => {
                    format!("Guide creation failed for {} barrel", barrel)
                }
                _ => String::new(),
            },
            Content::PastilleDeformed(c) => {
                if c.has_pastille && c.is_deformed {
                    "Pastille deformed: 1/0".to_string()
                } else {
                    String::new()
                }
            }
            Content::AnatomicalObstacle(c) => match (self.status(), c.distance_to_anatomical_obstacles) {
                (Status::Failure, _) => "Screw intersects an anatomical obstacle".to_string(),
                (Status::Warning | Status::Minor, Some(d)) => {
                    format!("Distance to anatomical obstacle: {:.2} mm", d)
                }
                _ => String::new(),
            },
        }
    }

    /// Value shown inside the report cell
    pub fn cell_value(&self) -> String {
        match self {
            Content::MinMaxDistance(c) => {
                if c.is_floating_screw {
                    return NO_QC_CHECK.to_string();
                }
                let mut parts = Vec::new();
                if !c.too_close.is_empty() {
                    parts.push(format!("Close: {}", join_ids(&c.too_close)));
                }
                if !c.too_far.is_empty() {
                    parts.push(format!("Far: {}", join_ids(&c.too_far)));
                }
                if parts.is_empty() {
                    "OK".to_string()
                } else {
                    parts.join(" | ")
                }
            }
            Content::OsteotomyIntersection(c) => {
                if !c.has_osteotomy_plane {
                    NOT_APPLICABLE.to_string()
                } else if c.is_floating_screw {
                    NO_QC_CHECK.to_string()
                } else if c.is_intersected {
                    "Yes".to_string()
                } else {
                    "No".to_string()
                }
            }
            Content::BarrelType(c) => c
                .barrel_type
                .clone()
                .unwrap_or_else(|| NOT_APPLICABLE.to_string()),
            Content::PastilleDeformed(c) => {
                if !c.has_pastille {
                    NO_QC_CHECK.to_string()
                } else if c.is_deformed {
                    "1/0".to_string()
                } else {
                    "OK".to_string()
                }
            }
            Content::AnatomicalObstacle(c) => match c.distance_to_anatomical_obstacles {
                Some(d) => format!("{:.2}", d),
                None => NOT_A_NUMBER.to_string(),
            },
        }
    }
}

fn join_ids(ids: &[ScrewId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Result of one check on one screw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcResult {
    pub screw: ScrewId,
    pub content: Content,
    /// Inputs the result was derived from; a change to any of them makes it stale
    #[serde(default)]
    pub inputs: BTreeSet<InputKey>,
}

impl QcResult {
    pub fn new(screw: ScrewId, content: Content) -> Self {
        Self {
            screw,
            content,
            inputs: BTreeSet::new(),
        }
    }

    /// Rebuild a result from a cached payload
    pub fn from_content(screw: ScrewId, content: Content) -> Self {
        Self::new(screw, content)
    }

    pub fn with_inputs(mut self, inputs: BTreeSet<InputKey>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn kind(&self) -> CheckKind {
        self.content.kind()
    }

    pub fn status(&self) -> Status {
        self.content.status()
    }

    pub fn bubble_message(&self) -> String {
        self.content.bubble_message()
    }

    /// `<td class="col_<colour>"><value></td>`
    pub fn doc_table_cell_message(&self) -> String {
        format!(
            "<td class=\"col_{}\">{}</td>",
            self.status().color(),
            escape_html(&self.content.cell_value())
        )
    }

    pub fn serializable_content(&self) -> Content {
        self.content.clone()
    }
}

/// A (screw, check) pair that could not be evaluated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub screw: ScrewId,
    pub check: CheckKind,
    pub error: String,
}

/// Counts of results by status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QcSummary {
    pub pass: usize,
    pub inapplicable: usize,
    pub minor: usize,
    pub warning: usize,
    pub failure: usize,
    pub errors: usize,
    pub total: usize,
}

impl QcSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a QcResult>, errors: usize) -> Self {
        let mut summary = Self::default();
        for r in results {
            match r.status() {
                Status::Pass => summary.pass += 1,
                Status::Inapplicable => summary.inapplicable += 1,
                Status::Minor => summary.minor += 1,
                Status::Warning => summary.warning += 1,
                Status::Failure => summary.failure += 1,
            }
            summary.total += 1;
        }
        summary.errors = errors;
        summary
    }

    /// Number of results at or above the given status
    pub fn at_or_above(&self, status: Status) -> usize {
        [
            (Status::Inapplicable, self.inapplicable),
            (Status::Minor, self.minor),
            (Status::Warning, self.warning),
            (Status::Failure, self.failure),
        ]
        .iter()
        .filter(|(s, _)| *s >= status)
        .map(|(_, n)| n)
        .sum()
    }
}

/// All results of one screw, keyed by check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrewRow {
    pub screw: ScrewId,
    pub results: BTreeMap<CheckKind, QcResult>,
}

impl ScrewRow {
    pub fn worst_status(&self) -> Status {
        self.results
            .values()
            .map(|r| r.status())
            .max()
            .unwrap_or_default()
    }
}

/// Full QC outcome of a plan, consumed by the reporters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcReport {
    pub checks: Vec<CheckKind>,
    pub rows: Vec<ScrewRow>,
    pub failures: Vec<ItemFailure>,
    pub summary: QcSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(result: &QcResult) -> QcResult {
        let json = serde_json::to_string(&result.serializable_content()).expect("serialize content");
        let content: Content = serde_json::from_str(&json).expect("deserialize content");
        QcResult::from_content(result.screw.clone(), content)
    }

    fn all_contents() -> Vec<Content> {
        vec![
            Content::MinMaxDistance(MinMaxDistanceContent {
                too_close: vec![ScrewId::new("c1", 3), ScrewId::new("c1", 2)],
                too_far: vec![ScrewId::new("c1", 7)],
                is_floating_screw: false,
            }),
            Content::MinMaxDistance(MinMaxDistanceContent {
                is_floating_screw: true,
                ..Default::default()
            }),
            Content::OsteotomyIntersection(OsteotomyIntersectionContent {
                has_osteotomy_plane: true,
                is_floating_screw: false,
                is_intersected: true,
            }),
            Content::OsteotomyIntersection(OsteotomyIntersectionContent::default()),
            Content::BarrelType(BarrelTypeContent {
                barrel_type: Some("Long".into()),
                has_registered_barrel: true,
                is_guide_creation_error: true,
            }),
            Content::PastilleDeformed(PastilleDeformedContent {
                has_pastille: true,
                is_deformed: true,
            }),
            Content::AnatomicalObstacle(AnatomicalObstacleContent {
                distance_to_anatomical_obstacles: Some(0.7321),
                warning_threshold: DEFAULT_OBSTACLE_WARNING,
                minor_threshold: DEFAULT_OBSTACLE_MINOR,
            }),
            Content::AnatomicalObstacle(AnatomicalObstacleContent {
                distance_to_anatomical_obstacles: None,
                warning_threshold: DEFAULT_OBSTACLE_WARNING,
                minor_threshold: DEFAULT_OBSTACLE_MINOR,
            }),
        ]
    }

    #[test]
    fn test_roundtrip_preserves_renderings() {
        for content in all_contents() {
            let original = QcResult::new(ScrewId::new("c1", 1), content);
            let restored = roundtrip(&original);
            assert_eq!(restored.bubble_message(), original.bubble_message());
            assert_eq!(
                restored.doc_table_cell_message(),
                original.doc_table_cell_message()
            );
        }
    }

    #[test]
    fn test_offending_ids_rendered_verbatim() {
        let result = QcResult::new(ScrewId::new("c1", 1), all_contents().remove(0));
        assert_eq!(
            result.bubble_message(),
            "Too close to screw(s): 3, 2\nToo far from screw(s): 7"
        );
        assert_eq!(
            result.doc_table_cell_message(),
            "<td class=\"col_red\">Close: 3, 2 | Far: 7</td>"
        );
    }

    #[test]
    fn test_inapplicable_is_not_pass() {
        for content in [
            Content::OsteotomyIntersection(OsteotomyIntersectionContent::default()),
            Content::MinMaxDistance(MinMaxDistanceContent {
                is_floating_screw: true,
                ..Default::default()
            }),
        ] {
            assert_eq!(content.status(), Status::Inapplicable);
            assert!(!content.status().is_pass());
        }
    }

    #[test]
    fn test_content_tagged_by_kind() {
        let content = Content::PastilleDeformed(PastilleDeformedContent {
            has_pastille: true,
            is_deformed: false,
        });
        let value = serde_json::to_value(&content).expect("serialize");
        assert_eq!(value["kind"], "pastille-deformed");
        assert_eq!(value["is_deformed"], false);
    }

    #[test]
    fn test_check_kind_parsing() {
        assert_eq!(
            "min_max_distance".parse::<CheckKind>().expect("parse"),
            CheckKind::MinMaxDistance
        );
        assert_eq!(
            "Barrel-Type".parse::<CheckKind>().expect("parse"),
            CheckKind::BarrelType
        );
        assert!("volume".parse::<CheckKind>().is_err());
    }

    #[test]
    fn test_cell_value_escaped() {
        let result = QcResult::new(
            ScrewId::new("c1", 1),
            Content::BarrelType(BarrelTypeContent {
                barrel_type: Some("<Short>".into()),
                ..Default::default()
            }),
        );
        assert_eq!(
            result.doc_table_cell_message(),
            "<td class=\"col_green\">&lt;Short&gt;</td>"
        );
    }

    #[test]
    fn test_summary_counts() {
        let results: Vec<QcResult> = all_contents()
            .into_iter()
            .map(|c| QcResult::new(ScrewId::new("c1", 1), c))
            .collect();
        let summary = QcSummary::from_results(&results, 1);
        assert_eq!(summary.total, results.len());
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.failure, 3);
        assert_eq!(summary.at_or_above(Status::Failure), 3);
    }
}
