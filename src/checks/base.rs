//! Base checker trait and evaluation context
//!
//! This module defines the core abstractions for screw QC:
//! - `Checker` trait that every check implements
//! - `CheckContext`, the immutable inputs a check reads
//! - `CheckerRegistry`, the fixed table of available checks

use crate::error::{QcError, QcResultOf};
use crate::graph::ConnectivityGraph;
use crate::hardware::{ImplantCase, PlanSnapshot, Screw, ScrewId};
use crate::models::{
    CheckKind, InputKey, QcResult, DEFAULT_OBSTACLE_MINOR, DEFAULT_OBSTACLE_WARNING,
};
use crate::thresholds::ThresholdTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::anatomical_obstacle::{AnatomicalObstacleChecker, ObstacleThresholds};
use super::barrel_type::BarrelTypeChecker;
use super::min_max_distance::MinMaxDistanceChecker;
use super::osteotomy_intersection::OsteotomyIntersectionChecker;
use super::pastille_deformed::PastilleDeformedChecker;

/// Default extension of a screw trajectory past its tip (mm)
pub const DEFAULT_OSTEOTOMY_EXTENSION: f64 = 1.0;

/// Tunable values of the built-in checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    /// How far the trajectory is extended before testing against cuts (mm)
    pub osteotomy_extension: f64,
    /// Obstacle distance below which a screw is a warning (mm)
    pub obstacle_warning: f64,
    /// Obstacle distance below which a screw is a minor issue (mm)
    pub obstacle_minor: f64,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            osteotomy_extension: DEFAULT_OSTEOTOMY_EXTENSION,
            obstacle_warning: DEFAULT_OBSTACLE_WARNING,
            obstacle_minor: DEFAULT_OBSTACLE_MINOR,
        }
    }
}

impl CheckSettings {
    /// Reject values that would make a severity band unreachable
    pub fn validate(&self) -> anyhow::Result<()> {
        let values = [
            ("osteotomy_extension", self.osteotomy_extension),
            ("obstacle_warning", self.obstacle_warning),
            ("obstacle_minor", self.obstacle_minor),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("{} must be a non-negative distance, got {}", name, value);
            }
        }
        if self.obstacle_warning > self.obstacle_minor {
            anyhow::bail!(
                "obstacle_warning ({}) is above obstacle_minor ({})",
                self.obstacle_warning,
                self.obstacle_minor
            );
        }
        Ok(())
    }
}

/// One consistent view of the plan shared by every check of a run
#[derive(Clone)]
pub struct CheckContext {
    pub plan: Arc<PlanSnapshot>,
    pub graph: Arc<ConnectivityGraph>,
    pub thresholds: Arc<ThresholdTable>,
    pub cancel: CancellationToken,
}

impl CheckContext {
    /// Build the connectivity graph for `plan` and wrap everything up
    pub fn new(plan: Arc<PlanSnapshot>, thresholds: Arc<ThresholdTable>) -> Self {
        let graph = Arc::new(ConnectivityGraph::build(&plan, &thresholds));
        Self {
            plan,
            graph,
            thresholds,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn screw(&self, id: &ScrewId) -> QcResultOf<&Screw> {
        self.plan
            .screw(id)
            .ok_or_else(|| QcError::UnknownScrew(id.clone()))
    }

    pub fn case_of(&self, id: &ScrewId) -> QcResultOf<&ImplantCase> {
        self.plan
            .case_of(id)
            .ok_or_else(|| QcError::UnknownCase(id.case.to_string()))
    }

    pub fn ensure_active(&self) -> QcResultOf<()> {
        if self.cancel.is_cancelled() {
            return Err(QcError::Cancelled);
        }
        Ok(())
    }
}

/// Trait for all screw checks
///
/// A checker evaluates one screw against a [`CheckContext`] and reports the
/// plan inputs its result depends on, so cached results can be invalidated
/// precisely when those inputs change.
///
/// # Example Implementation
///
/// ```ignore
/// pub struct MyChecker;
///
/// impl Checker for MyChecker {
///     fn kind(&self) -> CheckKind { CheckKind::BarrelType }
///     fn description(&self) -> &'static str { "Reports something" }
///     fn inputs(&self, screw: &ScrewId, _ctx: &CheckContext) -> BTreeSet<InputKey> {
///         BTreeSet::from([InputKey::Screw(screw.clone())])
///     }
///     fn check(&self, screw: &ScrewId, ctx: &CheckContext) -> QcResultOf<QcResult> {
///         // Read ctx.plan / ctx.graph and build a Content payload
///         todo!()
///     }
/// }
/// ```
pub trait Checker: Send + Sync {
    fn kind(&self) -> CheckKind;

    /// Human-readable description of what this check verifies
    fn description(&self) -> &'static str;

    /// Plan inputs the result for `screw` is derived from
    fn inputs(&self, screw: &ScrewId, ctx: &CheckContext) -> BTreeSet<InputKey>;

    /// Evaluate the check for one screw
    ///
    /// Errors are local to this (screw, check) pair; the manager records
    /// them and carries on with the remaining pairs.
    fn check(&self, screw: &ScrewId, ctx: &CheckContext) -> QcResultOf<QcResult>;
}

/// Immutable table of the available checks, keyed by kind
#[derive(Clone)]
pub struct CheckerRegistry {
    checkers: BTreeMap<CheckKind, Arc<dyn Checker>>,
}

impl CheckerRegistry {
    pub fn empty() -> Self {
        Self {
            checkers: BTreeMap::new(),
        }
    }

    /// All built-in checks, parameterised by `settings`
    pub fn from_settings(settings: &CheckSettings) -> Self {
        let checkers: Vec<Arc<dyn Checker>> = vec![
            Arc::new(MinMaxDistanceChecker::new()),
            Arc::new(OsteotomyIntersectionChecker::with_extension(
                settings.osteotomy_extension,
            )),
            Arc::new(BarrelTypeChecker::new()),
            Arc::new(PastilleDeformedChecker::new()),
            Arc::new(AnatomicalObstacleChecker::with_thresholds(ObstacleThresholds {
                warning: settings.obstacle_warning,
                minor: settings.obstacle_minor,
            })),
        ];
        checkers
            .into_iter()
            .fold(Self::empty(), |registry, checker| registry.with(checker))
    }

    /// Add or replace the checker for its kind
    pub fn with(mut self, checker: Arc<dyn Checker>) -> Self {
        self.checkers.insert(checker.kind(), checker);
        self
    }

    /// Keep only the given kinds
    pub fn select(&self, kinds: &[CheckKind]) -> Self {
        Self {
            checkers: self
                .checkers
                .iter()
                .filter(|(k, _)| kinds.contains(k))
                .map(|(k, c)| (*k, Arc::clone(c)))
                .collect(),
        }
    }

    pub fn get(&self, kind: CheckKind) -> Option<&Arc<dyn Checker>> {
        self.checkers.get(&kind)
    }

    pub fn kinds(&self) -> Vec<CheckKind> {
        self.checkers.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Checker>> {
        self.checkers.values()
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::from_settings(&CheckSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_every_check() {
        let registry = CheckerRegistry::default();
        assert_eq!(registry.kinds(), CheckKind::ALL.to_vec());
        for checker in registry.iter() {
            assert!(!checker.description().is_empty());
        }
    }

    #[test]
    fn test_select_subset() {
        let registry = CheckerRegistry::default()
            .select(&[CheckKind::BarrelType, CheckKind::PastilleDeformed]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(CheckKind::MinMaxDistance).is_none());
    }

    #[test]
    fn test_settings_defaults_from_partial_toml() {
        let settings: CheckSettings = toml::from_str("obstacle_warning = 0.3").expect("parse");
        assert_eq!(settings.obstacle_warning, 0.3);
        assert_eq!(settings.obstacle_minor, DEFAULT_OBSTACLE_MINOR);
        assert_eq!(settings.osteotomy_extension, DEFAULT_OSTEOTOMY_EXTENSION);
    }

    #[test]
    fn test_cancelled_context() {
        let ctx = CheckContext::new(
            Arc::new(PlanSnapshot::default()),
            Arc::new(ThresholdTable::builtin()),
        );
        assert!(ctx.ensure_active().is_ok());
        ctx.cancel.cancel();
        assert_eq!(ctx.ensure_active(), Err(QcError::Cancelled));
    }
}
