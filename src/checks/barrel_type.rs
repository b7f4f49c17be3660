//! Guide barrel type check

use crate::checks::base::{CheckContext, Checker};
use crate::error::QcResultOf;
use crate::hardware::ScrewId;
use crate::models::{BarrelTypeContent, CheckKind, Content, InputKey, QcResult};
use std::collections::BTreeSet;

/// Reports the barrel type of a screw, flagging failed guide creation
#[derive(Debug, Default)]
pub struct BarrelTypeChecker;

impl BarrelTypeChecker {
    pub fn new() -> Self {
        Self
    }
}

impl Checker for BarrelTypeChecker {
    fn kind(&self) -> CheckKind {
        CheckKind::BarrelType
    }

    fn description(&self) -> &'static str {
        "Guide barrel type and guide creation status"
    }

    fn inputs(&self, screw: &ScrewId, _ctx: &CheckContext) -> BTreeSet<InputKey> {
        BTreeSet::from([InputKey::Screw(screw.clone()), InputKey::Barrel(screw.clone())])
    }

    fn check(&self, screw: &ScrewId, ctx: &CheckContext) -> QcResultOf<QcResult> {
        let target = ctx.screw(screw)?;
        let registered = ctx.plan.barrel(screw);
        Ok(QcResult::new(
            screw.clone(),
            Content::BarrelType(BarrelTypeContent {
                barrel_type: target.barrel_type.clone(),
                has_registered_barrel: registered.is_some(),
                is_guide_creation_error: registered.is_some_and(|b| b.is_guide_creation_error),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{screw, sid, PlanBuilder};
    use crate::hardware::{PlanSnapshot, RegisteredBarrel};
    use crate::models::Status;
    use crate::thresholds::ThresholdTable;
    use std::sync::Arc;

    fn run(plan: &PlanSnapshot) -> QcResult {
        let ctx = CheckContext::new(Arc::new(plan.clone()), Arc::new(ThresholdTable::builtin()));
        BarrelTypeChecker::new().check(&sid(1), &ctx).expect("check succeeds")
    }

    #[test]
    fn test_long_barrel_turns_orange_on_guide_error() {
        let plan = PlanBuilder::new().screw(1, [0.0, 0.0, 0.0]).build();
        let plan = plan.with_screw(screw(1, [0.0, 0.0, 0.0]).with_barrel_type("Long"));
        assert_eq!(run(&plan).doc_table_cell_message(), "<td class=\"col_green\">Long</td>");

        let plan = plan.with_barrels(vec![RegisteredBarrel {
            screw: sid(1),
            is_guide_creation_error: true,
        }]);
        let result = run(&plan);
        assert_eq!(result.doc_table_cell_message(), "<td class=\"col_orange\">Long</td>");
        assert_eq!(result.status(), Status::Warning);
        assert!(!result.bubble_message().is_empty());
    }

    #[test]
    fn test_healthy_registered_barrel_passes() {
        let plan = PlanBuilder::new()
            .build()
            .with_screw(screw(1, [0.0, 0.0, 0.0]).with_barrel_type("Short"))
            .with_barrels(vec![RegisteredBarrel {
                screw: sid(1),
                is_guide_creation_error: false,
            }]);
        let result = run(&plan);
        assert_eq!(result.status(), Status::Pass);
        assert_eq!(result.bubble_message(), "");
    }

    #[test]
    fn test_missing_barrel_type_is_inapplicable() {
        let plan = PlanBuilder::new().screw(1, [0.0, 0.0, 0.0]).build();
        assert_eq!(run(&plan).doc_table_cell_message(), "<td class=\"col_yellow\">N/A</td>");
    }
}
