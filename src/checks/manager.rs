//! Check execution and result caching
//!
//! The CheckerManager evaluates (screw, check) pairs on a small rayon pool:
//! - every pair reads the same immutable `CheckContext`
//! - an error or panic in one pair is recorded as an `ItemFailure` and
//!   never stops the others
//! - results are cached per (screw, check) together with the inputs they
//!   were derived from
//! - `recheck` re-runs only the pairs whose inputs changed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    CheckerManager                       │
//! ├─────────────────────────────────────────────────────────┤
//! │  1. Snapshot plan, build connectivity graph             │
//! │  2. Select pairs (all, or stale + new on recheck)       │
//! │  3. Evaluate pairs in parallel (rayon)                  │
//! │  4. Store results / failures in the DashMap cache       │
//! │  5. Assemble the QcReport                               │
//! └─────────────────────────────────────────────────────────┘
//! ```

use crate::checks::base::{CheckContext, CheckSettings, Checker, CheckerRegistry};
use crate::checks::incremental_cache::{config_fingerprint, input_fingerprint, IncrementalCache};
use crate::error::QcError;
use crate::hardware::{AttachmentPoint, ConnectionId, DotId, PlanSnapshot, ScrewId};
use crate::models::{CheckKind, InputKey, ItemFailure, QcReport, QcResult, QcSummary, ScrewRow};
use crate::thresholds::ThresholdTable;
use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default size of the evaluation pool
pub const DEFAULT_WORKERS: usize = 2;

type PairKey = (ScrewId, CheckKind);

#[derive(Debug, Clone)]
struct CacheEntry {
    result: QcResult,
    fingerprint: u64,
}

#[derive(Debug, Clone)]
struct FailureEntry {
    failure: ItemFailure,
    inputs: BTreeSet<InputKey>,
}

enum Outcome {
    Done(CacheEntry),
    Failed(FailureEntry),
}

/// What a recheck did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecheckReport {
    /// Pairs that were evaluated again, in (screw, check) order
    pub rechecked: Vec<(ScrewId, CheckKind)>,
    /// Screws whose results were dropped because they left the plan
    pub removed: Vec<ScrewId>,
    /// Cached pairs left untouched
    pub unchanged: usize,
    /// Rechecked pairs that failed
    pub failures: usize,
}

impl RecheckReport {
    pub fn is_noop(&self) -> bool {
        self.rechecked.is_empty() && self.removed.is_empty()
    }
}

/// A plan edit announced through a [`ChangeNotifier`]
#[derive(Debug, Clone)]
pub struct PlanChange {
    pub plan: Arc<PlanSnapshot>,
    /// Changed inputs; `None` means diff against the previous snapshot
    pub changed: Option<BTreeSet<InputKey>>,
}

/// Sending half of the change channel, cloneable across threads
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: Sender<PlanChange>,
}

impl ChangeNotifier {
    /// Announce a new snapshot and the inputs that changed
    pub fn inputs_changed(&self, plan: Arc<PlanSnapshot>, changed: BTreeSet<InputKey>) {
        self.send(PlanChange {
            plan,
            changed: Some(changed),
        });
    }

    /// Announce a new snapshot without saying what changed
    pub fn plan_replaced(&self, plan: Arc<PlanSnapshot>) {
        self.send(PlanChange {
            plan,
            changed: None,
        });
    }

    fn send(&self, change: PlanChange) {
        if self.tx.send(change).is_err() {
            debug!("Checker manager gone, dropping plan change");
        }
    }
}

/// Runs checks over screws and keeps their results current
pub struct CheckerManager {
    registry: CheckerRegistry,
    thresholds: Arc<ThresholdTable>,
    workers: usize,
    results: DashMap<PairKey, CacheEntry>,
    failures: DashMap<PairKey, FailureEntry>,
    current: Option<CheckContext>,
    cancel: CancellationToken,
    changes_tx: Sender<PlanChange>,
    changes_rx: Receiver<PlanChange>,
    persistent: Option<IncrementalCache>,
}

impl CheckerManager {
    /// Manager with every built-in check and default settings
    ///
    /// # Arguments
    /// * `workers` - Number of evaluation threads (0 = default of 2)
    pub fn new(workers: usize) -> Self {
        Self::with_registry(CheckerRegistry::default(), Arc::new(ThresholdTable::builtin()), workers)
    }

    pub fn with_registry(
        registry: CheckerRegistry,
        thresholds: Arc<ThresholdTable>,
        workers: usize,
    ) -> Self {
        let (changes_tx, changes_rx) = unbounded();
        Self {
            registry,
            thresholds,
            workers: if workers == 0 { DEFAULT_WORKERS } else { workers },
            results: DashMap::new(),
            failures: DashMap::new(),
            current: None,
            cancel: CancellationToken::new(),
            changes_tx,
            changes_rx,
            persistent: None,
        }
    }

    /// Attach a persistent cache; `settings` must be the ones the registry was built from
    pub fn with_persistent_cache(mut self, mut cache: IncrementalCache, settings: &CheckSettings) -> Self {
        cache.set_config_fingerprint(config_fingerprint(&self.thresholds, settings));
        self.persistent = Some(cache);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn check_kinds(&self) -> Vec<CheckKind> {
        self.registry.kinds()
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    /// Channel handle for announcing plan edits from other threads
    pub fn notifier(&self) -> ChangeNotifier {
        ChangeNotifier {
            tx: self.changes_tx.clone(),
        }
    }

    /// Token cancelling in-flight geometric queries
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel running and future evaluations; pairs report `Cancelled`
    pub fn shutdown(&self) {
        info!("Cancelling QC evaluation");
        self.cancel.cancel();
    }

    /// Evaluate every selected check on every screw of `plan`
    pub fn run(&mut self, plan: Arc<PlanSnapshot>) -> Result<QcReport> {
        let start = Instant::now();
        let ctx = self.context(plan);
        self.results.clear();
        self.failures.clear();

        let pairs = self.all_pairs(&ctx);
        info!(
            "Running {} checks on {} screws ({} pairs) with {} workers",
            self.registry.len(),
            ctx.plan.screws().len(),
            pairs.len(),
            self.workers
        );
        self.evaluate(&ctx, &pairs)?;
        self.current = Some(ctx);

        let report = self.report();
        info!(
            "QC finished in {:?}: {} results, {} failed pairs",
            start.elapsed(),
            report.summary.total,
            report.failures.len()
        );
        Ok(report)
    }

    /// Re-run the pairs whose inputs intersect `changed`, using the new snapshot
    ///
    /// Results of screws that left the plan are dropped; screws that joined
    /// it get every selected check.
    pub fn recheck(
        &mut self,
        plan: Arc<PlanSnapshot>,
        changed: &BTreeSet<InputKey>,
    ) -> Result<RecheckReport> {
        let ctx = self.context(plan);
        let live: BTreeSet<ScrewId> = ctx.plan.screw_ids().into_iter().collect();

        let mut removed: BTreeSet<ScrewId> = BTreeSet::new();
        self.results.retain(|(screw, _), _| {
            let keep = live.contains(screw);
            if !keep {
                removed.insert(screw.clone());
            }
            keep
        });
        self.failures.retain(|(screw, _), _| {
            let keep = live.contains(screw);
            if !keep {
                removed.insert(screw.clone());
            }
            keep
        });
        if let Some(cache) = self.persistent.as_mut() {
            cache.prune(|s| live.contains(s));
        }

        let mut pending: BTreeSet<PairKey> = BTreeSet::new();
        for entry in self.results.iter() {
            if !entry.result.inputs.is_disjoint(changed) {
                pending.insert(entry.key().clone());
            }
        }
        for entry in self.failures.iter() {
            if !entry.inputs.is_disjoint(changed) {
                pending.insert(entry.key().clone());
            }
        }
        for pair in self.all_pairs(&ctx) {
            if !self.results.contains_key(&pair) && !self.failures.contains_key(&pair) {
                pending.insert(pair);
            }
        }

        let pairs: Vec<PairKey> = pending.into_iter().collect();
        debug!(
            "Recheck: {} changed inputs, {} pairs stale or new, {} screws removed",
            changed.len(),
            pairs.len(),
            removed.len()
        );
        self.evaluate(&ctx, &pairs)?;
        self.current = Some(ctx);

        let failures = pairs
            .iter()
            .filter(|p| self.failures.contains_key(*p))
            .count();
        let total = self.results.len() + self.failures.len();
        Ok(RecheckReport {
            unchanged: total.saturating_sub(pairs.len()),
            rechecked: pairs,
            removed: removed.into_iter().collect(),
            failures,
        })
    }

    /// Replace the plan and recheck whatever differs from the previous snapshot
    pub fn update(&mut self, plan: Arc<PlanSnapshot>) -> Result<RecheckReport> {
        let changed = match &self.current {
            Some(ctx) => changed_inputs(&ctx.plan, &plan),
            None => BTreeSet::new(),
        };
        self.recheck(plan, &changed)
    }

    /// Apply every change announced since the last call
    ///
    /// Returns `None` when nothing was pending.
    pub fn recheck_pending(&mut self) -> Result<Option<RecheckReport>> {
        let mut latest: Option<Arc<PlanSnapshot>> = None;
        let mut changed: BTreeSet<InputKey> = BTreeSet::new();
        let mut diff_needed = false;

        for change in self.changes_rx.try_iter() {
            match change.changed {
                Some(keys) => changed.extend(keys),
                None => diff_needed = true,
            }
            latest = Some(change.plan);
        }

        let Some(plan) = latest else {
            return Ok(None);
        };
        if diff_needed {
            if let Some(ctx) = &self.current {
                changed.extend(changed_inputs(&ctx.plan, &plan));
            }
        }
        self.recheck(plan, &changed).map(Some)
    }

    pub fn result(&self, screw: &ScrewId, kind: CheckKind) -> Option<QcResult> {
        self.results
            .get(&(screw.clone(), kind))
            .map(|e| e.result.clone())
    }

    pub fn failure(&self, screw: &ScrewId, kind: CheckKind) -> Option<ItemFailure> {
        self.failures
            .get(&(screw.clone(), kind))
            .map(|e| e.failure.clone())
    }

    /// Current results and failures, ordered by screw
    pub fn report(&self) -> QcReport {
        let mut rows: BTreeMap<ScrewId, BTreeMap<CheckKind, QcResult>> = BTreeMap::new();
        if let Some(ctx) = &self.current {
            for id in ctx.plan.screw_ids() {
                rows.entry(id).or_default();
            }
        }
        for entry in self.results.iter() {
            let (screw, kind) = entry.key();
            rows.entry(screw.clone())
                .or_default()
                .insert(*kind, entry.result.clone());
        }

        let mut failures: Vec<ItemFailure> =
            self.failures.iter().map(|e| e.failure.clone()).collect();
        failures.sort_by(|a, b| (&a.screw, a.check).cmp(&(&b.screw, b.check)));

        let rows: Vec<ScrewRow> = rows
            .into_iter()
            .map(|(screw, results)| ScrewRow { screw, results })
            .collect();
        let summary = QcSummary::from_results(
            rows.iter().flat_map(|r| r.results.values()),
            failures.len(),
        );

        QcReport {
            checks: self.registry.kinds(),
            rows,
            failures,
            summary,
        }
    }

    /// Write the persistent cache, if any
    pub fn save_cache(&mut self) -> Result<()> {
        match self.persistent.as_mut() {
            Some(cache) => cache.save_cache(),
            None => Ok(()),
        }
    }

    fn context(&self, plan: Arc<PlanSnapshot>) -> CheckContext {
        CheckContext::new(plan, Arc::clone(&self.thresholds)).with_cancel(self.cancel.clone())
    }

    fn all_pairs(&self, ctx: &CheckContext) -> Vec<PairKey> {
        let kinds = self.registry.kinds();
        ctx.plan
            .screw_ids()
            .into_iter()
            .flat_map(|screw| kinds.iter().map(move |k| (screw.clone(), *k)))
            .collect()
    }

    fn evaluate(&mut self, ctx: &CheckContext, pairs: &[PairKey]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()?;

        let registry = &self.registry;
        let persistent = self.persistent.as_ref();
        let results = &self.results;
        let failures = &self.failures;

        let fresh: Vec<(PairKey, u64, QcResult)> = pool.install(|| {
            pairs
                .par_iter()
                .filter_map(|(screw, kind)| {
                    let checker = registry.get(*kind)?;
                    let key = (screw.clone(), *kind);
                    match evaluate_pair(checker.as_ref(), screw, ctx, persistent) {
                        (Outcome::Done(entry), computed) => {
                            failures.remove(&key);
                            let fresh = computed
                                .then(|| (key.clone(), entry.fingerprint, entry.result.clone()));
                            results.insert(key, entry);
                            fresh
                        }
                        (Outcome::Failed(entry), _) => {
                            results.remove(&key);
                            failures.insert(key, entry);
                            None
                        }
                    }
                })
                .collect()
        });

        if let Some(cache) = self.persistent.as_mut() {
            for ((screw, kind), fingerprint, result) in fresh {
                cache.store(&screw, kind, fingerprint, result.serializable_content());
            }
        }
        Ok(())
    }
}

impl Default for CheckerManager {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

/// Evaluate one pair; the flag is false when the result came from the persistent cache
fn evaluate_pair(
    checker: &dyn Checker,
    screw: &ScrewId,
    ctx: &CheckContext,
    persistent: Option<&IncrementalCache>,
) -> (Outcome, bool) {
    let kind = checker.kind();
    let inputs = checker.inputs(screw, ctx);
    let fingerprint = input_fingerprint(&ctx.plan, &inputs);

    if let Some(content) = persistent.and_then(|c| c.lookup(screw, kind, fingerprint)) {
        if content.kind() == kind {
            let result = QcResult::from_content(screw.clone(), content).with_inputs(inputs);
            return (Outcome::Done(CacheEntry { result, fingerprint }), false);
        }
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| checker.check(screw, ctx)));
    let error = match outcome {
        Ok(Ok(result)) => {
            let result = result.with_inputs(inputs);
            return (Outcome::Done(CacheEntry { result, fingerprint }), true);
        }
        Ok(Err(e)) => {
            warn!("Check {} failed for screw {} of case '{}': {}", kind, screw, screw.case, e);
            e
        }
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            error!("Check {} panicked on screw {}: {}", kind, screw, panic_msg);
            QcError::Panicked(panic_msg)
        }
    };

    (
        Outcome::Failed(FailureEntry {
            failure: ItemFailure {
                screw: screw.clone(),
                check: kind,
                error: error.to_string(),
            },
            inputs,
        }),
        true,
    )
}

/// Inputs that differ between two snapshots
pub fn changed_inputs(old: &PlanSnapshot, new: &PlanSnapshot) -> BTreeSet<InputKey> {
    let mut changed = BTreeSet::new();

    for case in old.cases().iter().chain(new.cases()) {
        if old.case(&case.id) != new.case(&case.id) {
            changed.insert(InputKey::Case(case.id.clone()));
        }
    }

    for screw in old.screws().iter().chain(new.screws()) {
        let (before, after) = (old.screw(&screw.id), new.screw(&screw.id));
        if before != after {
            changed.insert(InputKey::Screw(screw.id.clone()));
        }
        if before.is_none() != after.is_none() {
            changed.insert(InputKey::CaseScrews(screw.id.case.clone()));
        }
        if old.anatomy().bone_of(&screw.id) != new.anatomy().bone_of(&screw.id) {
            changed.insert(InputKey::Bone(screw.id.clone()));
        }
        if old.barrel(&screw.id) != new.barrel(&screw.id) {
            changed.insert(InputKey::Barrel(screw.id.clone()));
        }
    }

    for dot in old.attachment_points().iter().chain(new.attachment_points()) {
        let (before, after) = (old.attachment_point(&dot.id), new.attachment_point(&dot.id));
        if before == after {
            continue;
        }
        changed.insert(InputKey::Dot(dot.id.clone()));
        let holder = |d: Option<&AttachmentPoint>| d.and_then(|d| d.screw().cloned());
        let (was, now) = (holder(before), holder(after));
        if was != now {
            for screw in was.into_iter().chain(now) {
                changed.insert(InputKey::CaseScrews(screw.case.clone()));
                changed.insert(InputKey::Screw(screw));
            }
        }
    }

    let mut endpoints: HashMap<&ConnectionId, Vec<&DotId>> = HashMap::new();
    for conn in old.connections().iter().chain(new.connections()) {
        endpoints.entry(&conn.id).or_default().extend([&conn.from, &conn.to]);
    }
    for (id, dots) in endpoints {
        if old.connection(id) != new.connection(id) {
            changed.insert(InputKey::Connection(id.clone()));
            changed.extend(dots.into_iter().map(|d| InputKey::Dot(d.clone())));
        }
    }

    if old.osteotomy() != new.osteotomy() {
        changed.insert(InputKey::Osteotomy);
    }
    if old.critical_structures() != new.critical_structures() {
        changed.insert(InputKey::CriticalStructures);
    }

    changed
}

/// Builder for CheckerManager with fluent API
pub struct CheckerManagerBuilder {
    workers: usize,
    settings: CheckSettings,
    thresholds: ThresholdTable,
    checks: Option<Vec<CheckKind>>,
    extra: Vec<Arc<dyn Checker>>,
    cache: Option<IncrementalCache>,
}

impl CheckerManagerBuilder {
    pub fn new() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            settings: CheckSettings::default(),
            thresholds: ThresholdTable::builtin(),
            checks: None,
            extra: Vec::new(),
            cache: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn settings(mut self, settings: CheckSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn thresholds(mut self, thresholds: ThresholdTable) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Restrict to these checks (default: all)
    pub fn checks(mut self, checks: Vec<CheckKind>) -> Self {
        self.checks = Some(checks);
        self
    }

    /// Add or replace a checker
    pub fn checker(mut self, checker: Arc<dyn Checker>) -> Self {
        self.extra.push(checker);
        self
    }

    pub fn cache(mut self, cache: IncrementalCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> CheckerManager {
        let mut registry = CheckerRegistry::from_settings(&self.settings);
        for checker in self.extra {
            registry = registry.with(checker);
        }
        if let Some(kinds) = &self.checks {
            registry = registry.select(kinds);
        }
        let manager = CheckerManager::with_registry(registry, Arc::new(self.thresholds), self.workers);
        match self.cache {
            Some(cache) => manager.with_persistent_cache(cache, &self.settings),
            None => manager,
        }
    }
}

impl Default for CheckerManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
