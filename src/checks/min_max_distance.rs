//! Inter-screw spacing check
//!
//! Too close: any other attached screw of the same case nearer than the
//! brand minimum, when both sit on the same bone or are joined directly by
//! a plate. A link between different bones exempts the pair, and so does
//! having no direct hardware at all between different bones.
//!
//! Too far: every direct plate neighbor further away than the plate's
//! bending limit for that plate's effective width. Links are never checked
//! for maximum spacing.
//!
//! Distances are Euclidean between head points. Offending screws are listed
//! in evaluation order and handed to the renderer as-is.

use crate::checks::base::{CheckContext, Checker};
use crate::error::{QcError, QcResultOf};
use crate::hardware::ScrewId;
use crate::models::{CheckKind, Content, InputKey, MinMaxDistanceContent, QcResult};
use std::collections::BTreeSet;
use tracing::debug;

/// Checks minimum and maximum head-to-head spacing
#[derive(Debug, Default)]
pub struct MinMaxDistanceChecker;

impl MinMaxDistanceChecker {
    pub fn new() -> Self {
        Self
    }
}

impl Checker for MinMaxDistanceChecker {
    fn kind(&self) -> CheckKind {
        CheckKind::MinMaxDistance
    }

    fn description(&self) -> &'static str {
        "Screws too close to each other, or too far apart along a plate"
    }

    fn inputs(&self, screw: &ScrewId, ctx: &CheckContext) -> BTreeSet<InputKey> {
        let case = screw.case.clone();
        let mut keys = BTreeSet::from([
            InputKey::Screw(screw.clone()),
            InputKey::Bone(screw.clone()),
            InputKey::Case(case.clone()),
            InputKey::CaseScrews(case.clone()),
        ]);
        for other in ctx.graph.case_screws(&case) {
            keys.insert(InputKey::Screw(other.clone()));
            keys.insert(InputKey::Bone(other.clone()));
        }
        for dot in ctx.plan.pastilles_of(screw) {
            keys.insert(InputKey::Dot(dot.id.clone()));
            for connection in ctx.graph.connections_at(&dot.id) {
                keys.insert(InputKey::Connection(connection));
            }
        }
        for bad in ctx.graph.malformed_for(screw) {
            keys.insert(InputKey::Connection(bad.connection.clone()));
        }
        keys
    }

    fn check(&self, screw: &ScrewId, ctx: &CheckContext) -> QcResultOf<QcResult> {
        let target = ctx.screw(screw)?;

        if let Some(bad) = ctx.graph.malformed_for(screw).first() {
            return Err(QcError::MalformedConnection {
                connection: bad.connection.clone(),
                reason: bad.reason.clone(),
            });
        }

        if ctx.graph.is_floating(screw) {
            debug!("Screw {} of case '{}' is floating", screw, screw.case);
            return Ok(QcResult::new(
                screw.clone(),
                Content::MinMaxDistance(MinMaxDistanceContent {
                    is_floating_screw: true,
                    ..Default::default()
                }),
            ));
        }

        let case = ctx.case_of(screw)?;
        let min_distance = ctx
            .thresholds
            .acceptable_min_distance(case.brand, case.implant_type);
        let anatomy = ctx.plan.anatomy();

        let mut too_close = Vec::new();
        for other_id in ctx.graph.case_screws(&screw.case) {
            if other_id == screw {
                continue;
            }
            let other = ctx.screw(other_id)?;
            let distance = (other.head - target.head).norm();
            if distance >= min_distance {
                continue;
            }
            if anatomy.same_bone(screw, other_id) || ctx.graph.is_plate_connected(screw, other_id)
            {
                too_close.push(other_id.clone());
            }
        }

        let mut too_far = Vec::new();
        for neighbor in ctx.graph.plate_neighbors(screw) {
            let other = ctx.screw(&neighbor.screw)?;
            let distance = (other.head - target.head).norm();
            let max_distance = ctx.thresholds.acceptable_max_distance(
                case.brand,
                case.implant_type,
                case.plate_thickness,
                neighbor.width,
            );
            if distance > max_distance {
                too_far.push(neighbor.screw.clone());
            }
        }

        Ok(QcResult::new(
            screw.clone(),
            Content::MinMaxDistance(MinMaxDistanceContent {
                too_close,
                too_far,
                is_floating_screw: false,
            }),
        ))
    }
}
