//! Osteotomy intersection check
//!
//! The planned screw is moved back onto the original anatomy with the
//! registration of the fragment it sits on, its trajectory is extended past
//! the tip, and the result is tested against every cut of that original
//! structure. Screws on grafts, on unclassified anatomy or on fragments with
//! no registration are reported as floating and skipped.

use crate::checks::base::{CheckContext, Checker, DEFAULT_OSTEOTOMY_EXTENSION};
use crate::error::{QcError, QcResultOf};
use crate::geometry::{segment_mesh_intersect, segment_plane_intersect, Segment, EPSILON};
use crate::hardware::{BoneId, CutGeometry, OsteotomyPlan, ScrewId};
use crate::models::{CheckKind, Content, InputKey, OsteotomyIntersectionContent, QcResult};
use std::collections::BTreeSet;
use tracing::debug;

pub struct OsteotomyIntersectionChecker {
    /// Trajectory extension past the tip (mm)
    extension: f64,
}

impl OsteotomyIntersectionChecker {
    pub fn new() -> Self {
        Self::with_extension(DEFAULT_OSTEOTOMY_EXTENSION)
    }

    pub fn with_extension(extension: f64) -> Self {
        Self {
            extension: extension.max(0.0),
        }
    }

    fn intersects(
        &self,
        segment: &Segment,
        plan: &OsteotomyPlan,
        original: &BoneId,
        ctx: &CheckContext,
    ) -> QcResultOf<bool> {
        for cut in plan.cuts_on(original) {
            ctx.ensure_active()?;
            let hit = match &cut.geometry {
                CutGeometry::Plane { origin, normal } => {
                    if normal.norm() < EPSILON {
                        return Err(QcError::InvalidGeometry(format!(
                            "osteotomy '{}' has a zero-length plane normal",
                            cut.id
                        )));
                    }
                    segment_plane_intersect(segment, origin, normal)
                }
                CutGeometry::Surface { mesh } => segment_mesh_intersect(segment, mesh, &ctx.cancel)?,
            };
            if hit {
                debug!("Trajectory crosses osteotomy '{}'", cut.id);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Default for OsteotomyIntersectionChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl Checker for OsteotomyIntersectionChecker {
    fn kind(&self) -> CheckKind {
        CheckKind::OsteotomyIntersection
    }

    fn description(&self) -> &'static str {
        "Screw trajectory crossing an osteotomy of the original anatomy"
    }

    fn inputs(&self, screw: &ScrewId, _ctx: &CheckContext) -> BTreeSet<InputKey> {
        BTreeSet::from([
            InputKey::Screw(screw.clone()),
            InputKey::Bone(screw.clone()),
            InputKey::Osteotomy,
        ])
    }

    fn check(&self, screw: &ScrewId, ctx: &CheckContext) -> QcResultOf<QcResult> {
        let target = ctx.screw(screw)?;
        let make = |content: OsteotomyIntersectionContent| {
            QcResult::new(screw.clone(), Content::OsteotomyIntersection(content))
        };
        let floating = || {
            make(OsteotomyIntersectionContent {
                has_osteotomy_plane: true,
                is_floating_screw: true,
                is_intersected: false,
            })
        };

        let Some(plan) = ctx.plan.osteotomy().filter(|o| o.has_cuts()) else {
            return Ok(make(OsteotomyIntersectionContent::default()));
        };
        let Some(bone) = ctx.plan.anatomy().bone_of(screw) else {
            return Ok(floating());
        };
        if plan.is_graft(bone) {
            return Ok(floating());
        }
        let Some(registration) = plan.registration_for(bone) else {
            return Ok(floating());
        };

        let segment = Segment::new(target.head, target.tip)
            .transformed(&registration.transform.to_isometry())
            .extended(self.extension);
        let is_intersected = self.intersects(&segment, plan, &registration.original, ctx)?;

        Ok(make(OsteotomyIntersectionContent {
            has_osteotomy_plane: true,
            is_floating_screw: false,
            is_intersected,
        }))
    }
}
