use super::*;
use crate::fixtures::{dot, screw, sid, PlanBuilder, CASE};
use crate::geometry::TriangleMesh;
use crate::hardware::{Connection, ConnectionKind, CriticalStructure};
use crate::models::{BarrelTypeContent, Content, Status};
use nalgebra::Point3;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

// Mock checker for testing, reports a fixed barrel type
struct MockChecker {
    fail_on: Option<u32>,
    panic_on: Option<u32>,
    calls: Arc<AtomicUsize>,
}

impl MockChecker {
    fn new() -> Self {
        Self {
            fail_on: None,
            panic_on: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Checker for MockChecker {
    fn kind(&self) -> CheckKind {
        CheckKind::BarrelType
    }

    fn description(&self) -> &'static str {
        "Mock checker for testing"
    }

    fn inputs(&self, screw: &ScrewId, _ctx: &CheckContext) -> BTreeSet<InputKey> {
        BTreeSet::from([InputKey::Screw(screw.clone())])
    }

    fn check(&self, screw: &ScrewId, _ctx: &CheckContext) -> Result<QcResult, QcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on == Some(screw.index) {
            panic!("mock checker exploded");
        }
        if self.fail_on == Some(screw.index) {
            return Err(QcError::InvalidGeometry("bad mesh".into()));
        }
        Ok(QcResult::new(
            screw.clone(),
            Content::BarrelType(BarrelTypeContent {
                barrel_type: Some("Mock".into()),
                ..Default::default()
            }),
        ))
    }
}

fn three_screw_plan() -> PlanSnapshot {
    PlanBuilder::new()
        .screw(1, [0.0, 0.0, 0.0])
        .screw(2, [5.0, 0.0, 0.0])
        .screw(3, [10.0, 0.0, 0.0])
        .plate("p12", 1, 2)
        .plate("p23", 2, 3)
        .build()
}

fn serialized(report: &QcReport) -> String {
    serde_json::to_string(report).expect("serialize report")
}

#[test]
fn test_manager_creation() {
    let manager = CheckerManager::new(0);
    assert_eq!(manager.workers(), DEFAULT_WORKERS);
    assert_eq!(manager.check_kinds(), CheckKind::ALL.to_vec());
}

#[test]
fn test_builder() {
    let manager = CheckerManagerBuilder::new()
        .workers(4)
        .checks(vec![CheckKind::MinMaxDistance, CheckKind::PastilleDeformed])
        .build();
    assert_eq!(manager.workers(), 4);
    assert_eq!(
        manager.check_kinds(),
        vec![CheckKind::MinMaxDistance, CheckKind::PastilleDeformed]
    );
}

#[test]
fn test_run_covers_every_pair() {
    let mut manager = CheckerManager::new(2);
    let report = manager.run(Arc::new(three_screw_plan())).expect("run");
    assert_eq!(report.rows.len(), 3);
    assert_eq!(report.summary.total, 3 * CheckKind::ALL.len());
    assert!(report.failures.is_empty());
    for row in &report.rows {
        assert_eq!(row.results.len(), CheckKind::ALL.len());
    }
}

#[test]
fn test_failures_do_not_abort_siblings() {
    let mock = MockChecker {
        fail_on: Some(1),
        panic_on: Some(2),
        calls: Arc::new(AtomicUsize::new(0)),
    };
    let mut manager = CheckerManagerBuilder::new()
        .checker(Arc::new(mock))
        .build();
    let report = manager.run(Arc::new(three_screw_plan())).expect("run");

    assert_eq!(report.failures.len(), 2);
    let failed = manager
        .failure(&sid(2), CheckKind::BarrelType)
        .expect("panic recorded");
    assert!(failed.error.contains("mock checker exploded"));
    assert!(manager.failure(&sid(1), CheckKind::BarrelType).is_some());
    assert!(manager.result(&sid(3), CheckKind::BarrelType).is_some());
    // Other checks on the failing screws still ran
    assert!(manager.result(&sid(1), CheckKind::MinMaxDistance).is_some());
    assert!(manager.result(&sid(2), CheckKind::PastilleDeformed).is_some());
    assert_eq!(report.summary.errors, 2);
}

#[test]
fn test_malformed_connection_recorded_per_item() {
    let plan = PlanBuilder::new()
        .screw(1, [0.0, 0.0, 0.0])
        .screw(2, [5.0, 0.0, 0.0])
        .connect(Connection::new("bad", CASE, &dot(1), "ghost", ConnectionKind::Plate))
        .build();
    let mut manager = CheckerManager::new(2);
    let report = manager.run(Arc::new(plan)).expect("run");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].screw, sid(1));
    assert_eq!(report.failures[0].check, CheckKind::MinMaxDistance);
    assert!(manager.result(&sid(2), CheckKind::MinMaxDistance).is_some());
}

#[test]
fn test_rerun_is_byte_identical() {
    let plan = Arc::new(three_screw_plan());
    let mut manager = CheckerManager::new(2);
    let first = serialized(&manager.run(Arc::clone(&plan)).expect("run"));
    let second = serialized(&manager.run(Arc::clone(&plan)).expect("run"));
    assert_eq!(first, second);

    let all: BTreeSet<InputKey> = plan
        .screw_ids()
        .into_iter()
        .map(InputKey::Screw)
        .collect();
    let recheck = manager.recheck(Arc::clone(&plan), &all).expect("recheck");
    assert!(!recheck.rechecked.is_empty());
    assert_eq!(serialized(&manager.report()), first);
}

#[test]
fn test_update_without_changes_is_noop() {
    let plan = Arc::new(three_screw_plan());
    let mut manager = CheckerManager::new(2);
    manager.run(Arc::clone(&plan)).expect("run");
    let report = manager.update(plan).expect("update");
    assert!(report.is_noop());
    assert_eq!(report.unchanged, 3 * CheckKind::ALL.len());
}

#[test]
fn test_deformed_pastille_rechecks_only_dependents() {
    let plan = three_screw_plan();
    let mut manager = CheckerManager::new(2);
    manager.run(Arc::new(plan.clone())).expect("run");

    let deformed = plan
        .attachment_point(&crate::hardware::DotId::new(dot(1)))
        .expect("pastille")
        .clone()
        .with_deformed(true);
    let report = manager
        .update(Arc::new(plan.with_attachment_point(deformed)))
        .expect("update");

    assert!(report
        .rechecked
        .contains(&(sid(1), CheckKind::PastilleDeformed)));
    assert!(report.rechecked.iter().all(|(s, _)| s == &sid(1)));
    assert_eq!(
        manager
            .result(&sid(1), CheckKind::PastilleDeformed)
            .expect("result")
            .status(),
        Status::Failure
    );
}

#[test]
fn test_moved_screw_rechecks_neighbors() {
    let plan = three_screw_plan();
    let mut manager = CheckerManager::new(2);
    manager.run(Arc::new(plan.clone())).expect("run");

    // Screw 2 slides next to screw 1, along the shared plate
    let report = manager
        .update(Arc::new(plan.with_screw(screw(2, [1.0, 0.0, 0.0]))))
        .expect("update");
    assert!(report.rechecked.contains(&(sid(1), CheckKind::MinMaxDistance)));
    assert!(report.rechecked.contains(&(sid(3), CheckKind::MinMaxDistance)));
    assert!(!report.rechecked.contains(&(sid(1), CheckKind::BarrelType)));

    let result = manager
        .result(&sid(1), CheckKind::MinMaxDistance)
        .expect("result");
    assert_eq!(result.status(), Status::Failure);
    assert_eq!(result.bubble_message(), "Too close to screw(s): 2");
}

#[test]
fn test_removed_and_added_screws() {
    let plan = three_screw_plan();
    let mut manager = CheckerManager::new(2);
    manager.run(Arc::new(plan.clone())).expect("run");

    let report = manager
        .update(Arc::new(plan.without_screw(&sid(3))))
        .expect("update");
    assert_eq!(report.removed, vec![sid(3)]);
    assert!(manager.result(&sid(3), CheckKind::BarrelType).is_none());
    assert_eq!(manager.report().rows.len(), 2);

    let grown = PlanBuilder::new()
        .screw(1, [0.0, 0.0, 0.0])
        .screw(2, [5.0, 0.0, 0.0])
        .screw(4, [20.0, 0.0, 0.0])
        .plate("p12", 1, 2)
        .build();
    let report = manager.update(Arc::new(grown)).expect("update");
    for kind in CheckKind::ALL {
        assert!(report.rechecked.contains(&(sid(4), kind)));
    }
}

#[test]
fn test_notifier_feeds_pending_recheck() {
    let plan = three_screw_plan();
    let mut manager = CheckerManager::new(2);
    manager.run(Arc::new(plan.clone())).expect("run");
    assert!(manager.recheck_pending().expect("drain").is_none());

    let notifier = manager.notifier();
    let moved = Arc::new(plan.with_screw(screw(3, [12.0, 0.0, 0.0])));
    std::thread::spawn(move || notifier.plan_replaced(moved))
        .join()
        .expect("notifier thread");

    let report = manager
        .recheck_pending()
        .expect("drain")
        .expect("pending change");
    assert!(report.rechecked.contains(&(sid(3), CheckKind::BarrelType)));
    assert!(manager.recheck_pending().expect("drain").is_none());
}

#[test]
fn test_explicit_change_keys() {
    let plan = three_screw_plan();
    let mut manager = CheckerManager::new(2);
    manager.run(Arc::new(plan.clone())).expect("run");

    manager.notifier().inputs_changed(
        Arc::new(plan),
        BTreeSet::from([InputKey::Barrel(sid(2))]),
    );
    let report = manager
        .recheck_pending()
        .expect("drain")
        .expect("pending change");
    assert_eq!(report.rechecked, vec![(sid(2), CheckKind::BarrelType)]);
}

#[test]
fn test_persistent_cache_skips_unchanged_pairs() {
    let dir = TempDir::new().expect("temp dir");
    let plan = three_screw_plan();

    let first = MockChecker::new();
    let first_calls = Arc::clone(&first.calls);
    let mut manager = CheckerManagerBuilder::new()
        .checks(vec![CheckKind::BarrelType])
        .checker(Arc::new(first))
        .cache(IncrementalCache::new(dir.path()))
        .build();
    let before = serialized(&manager.run(Arc::new(plan.clone())).expect("run"));
    manager.save_cache().expect("save cache");
    assert_eq!(first_calls.load(Ordering::SeqCst), 3);

    let second = MockChecker::new();
    let second_calls = Arc::clone(&second.calls);
    let mut manager = CheckerManagerBuilder::new()
        .checks(vec![CheckKind::BarrelType])
        .checker(Arc::new(second))
        .cache(IncrementalCache::new(dir.path()))
        .build();
    let after = serialized(&manager.run(Arc::new(plan.clone())).expect("run"));
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    assert_eq!(before, after);

    manager
        .run(Arc::new(plan.with_screw(screw(1, [0.0, 2.0, 0.0]))))
        .expect("run");
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shutdown_cancels_geometric_checks() {
    let mut builder = PlanBuilder::new().screw(1, [0.0, 0.0, 0.0]);
    builder.data_mut().critical_structures.push(CriticalStructure {
        name: "nerve".into(),
        mesh: TriangleMesh::new(
            vec![
                Point3::new(0.0, 0.0, -9.0),
                Point3::new(1.0, 0.0, -9.0),
                Point3::new(0.0, 1.0, -9.0),
            ],
            vec![[0, 1, 2]],
        ),
    });
    let mut manager = CheckerManager::new(2);
    manager.shutdown();
    let report = manager.run(Arc::new(builder.build())).expect("run");

    let failure = manager
        .failure(&sid(1), CheckKind::AnatomicalObstacle)
        .expect("cancelled pair recorded");
    assert_eq!(failure.error, QcError::Cancelled.to_string());
    assert!(manager.result(&sid(1), CheckKind::PastilleDeformed).is_some());
    assert_eq!(report.failures.len(), 1);
}

#[test]
fn test_changed_inputs_for_new_connection() {
    let plan = three_screw_plan();
    let edited = plan.with_connection(Connection::new("p13", CASE, &dot(1), &dot(3), ConnectionKind::Link));
    let changed = changed_inputs(&plan, &edited);
    assert!(changed.contains(&InputKey::Connection(crate::hardware::ConnectionId::new("p13"))));
    assert!(changed.contains(&InputKey::Dot(crate::hardware::DotId::new(dot(1)))));
    assert!(changed.contains(&InputKey::Dot(crate::hardware::DotId::new(dot(3)))));
    assert!(!changed.contains(&InputKey::Screw(sid(2))));
}
