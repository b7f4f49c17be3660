//! Distance from a screw to critical anatomy
//!
//! The screw body is treated as a capsule around its head-to-tip axis with
//! the radius of its screw type. The reported value is the gap between that
//! capsule and the nearest critical structure, clamped at zero.

use crate::checks::base::{CheckContext, Checker};
use crate::error::QcResultOf;
use crate::geometry::{segment_mesh_distance, Segment};
use crate::hardware::ScrewId;
use crate::models::{
    AnatomicalObstacleContent, CheckKind, Content, InputKey, QcResult, DEFAULT_OBSTACLE_MINOR,
    DEFAULT_OBSTACLE_WARNING,
};
use std::collections::BTreeSet;
use tracing::debug;

/// Severity bands for obstacle distance (mm)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleThresholds {
    /// Below this the screw is a warning
    pub warning: f64,
    /// Below this the screw is a minor issue
    pub minor: f64,
}

impl Default for ObstacleThresholds {
    fn default() -> Self {
        Self {
            warning: DEFAULT_OBSTACLE_WARNING,
            minor: DEFAULT_OBSTACLE_MINOR,
        }
    }
}

pub struct AnatomicalObstacleChecker {
    thresholds: ObstacleThresholds,
}

impl AnatomicalObstacleChecker {
    pub fn new() -> Self {
        Self::with_thresholds(ObstacleThresholds::default())
    }

    pub fn with_thresholds(thresholds: ObstacleThresholds) -> Self {
        Self { thresholds }
    }
}

impl Default for AnatomicalObstacleChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl Checker for AnatomicalObstacleChecker {
    fn kind(&self) -> CheckKind {
        CheckKind::AnatomicalObstacle
    }

    fn description(&self) -> &'static str {
        "Clearance between the screw and nerves, roots and other critical structures"
    }

    fn inputs(&self, screw: &ScrewId, _ctx: &CheckContext) -> BTreeSet<InputKey> {
        BTreeSet::from([InputKey::Screw(screw.clone()), InputKey::CriticalStructures])
    }

    fn check(&self, screw: &ScrewId, ctx: &CheckContext) -> QcResultOf<QcResult> {
        let target = ctx.screw(screw)?;
        let axis = Segment::new(target.head, target.tip);
        let radius = ctx.thresholds.screw_diameter(&target.screw_type) / 2.0;

        let mut nearest: Option<f64> = None;
        for structure in ctx.plan.critical_structures() {
            ctx.ensure_active()?;
            if let Some(d) = segment_mesh_distance(&axis, &structure.mesh, &ctx.cancel)? {
                debug!("Screw {} is {:.3} mm from '{}' axis", screw, d, structure.name);
                nearest = Some(nearest.map_or(d, |n| n.min(d)));
            }
        }

        Ok(QcResult::new(
            screw.clone(),
            Content::AnatomicalObstacle(AnatomicalObstacleContent {
                distance_to_anatomical_obstacles: nearest.map(|d| (d - radius).max(0.0)),
                warning_threshold: self.thresholds.warning,
                minor_threshold: self.thresholds.minor,
            }),
        ))
    }
}
