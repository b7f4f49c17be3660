//! Pastille deformation check

use crate::checks::base::{CheckContext, Checker};
use crate::error::QcResultOf;
use crate::hardware::ScrewId;
use crate::models::{CheckKind, Content, InputKey, PastilleDeformedContent, QcResult};
use std::collections::BTreeSet;

/// Flags screws whose pastille had to be deformed to fit the bone
#[derive(Debug, Default)]
pub struct PastilleDeformedChecker;

impl PastilleDeformedChecker {
    pub fn new() -> Self {
        Self
    }
}

impl Checker for PastilleDeformedChecker {
    fn kind(&self) -> CheckKind {
        CheckKind::PastilleDeformed
    }

    fn description(&self) -> &'static str {
        "Deformed pastille under the screw head"
    }

    fn inputs(&self, screw: &ScrewId, ctx: &CheckContext) -> BTreeSet<InputKey> {
        let mut keys = BTreeSet::from([InputKey::Screw(screw.clone())]);
        keys.extend(
            ctx.plan
                .pastilles_of(screw)
                .map(|dot| InputKey::Dot(dot.id.clone())),
        );
        keys
    }

    fn check(&self, screw: &ScrewId, ctx: &CheckContext) -> QcResultOf<QcResult> {
        ctx.screw(screw)?;
        let mut pastilles = ctx.plan.pastilles_of(screw).peekable();
        let has_pastille = pastilles.peek().is_some();
        let is_deformed = pastilles.any(|dot| dot.is_deformed());
        Ok(QcResult::new(
            screw.clone(),
            Content::PastilleDeformed(PastilleDeformedContent {
                has_pastille,
                is_deformed,
            }),
        ))
    }
}
