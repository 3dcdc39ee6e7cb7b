//! Reconciliation engine
//!
//! Each pass works through, in order and de-duplicated:
//! 1. the candidate queue fed by failed secondary writes
//! 2. records changed since the per-store checkpoints
//! 3. on every `full_scan_every`-th pass, a resumable sweep of all records
//!
//! The pass stops early once its record or time budget runs out and picks
//! up from the stored checkpoints next cycle. Sync overwrites the
//! non-authoritative copy only after re-fetching both sides, so repeated
//! runs over unchanged stores make no further writes.
//!
//! Keys queued by a failed secondary write carry the side that accepted the
//! write. While both stores are still written, sync copies from that side
//! instead of the phase's authoritative one, so the repair never rolls back
//! a write the caller was told succeeded.

use crate::config::CutoverConfig;
use crate::error::ReconciliationError;
use crate::phase::PhaseController;
use chrono::Utc;
use cutover_store::{
    fingerprint, Candidate, Checkpoint, Discrepancy, DiscrepancyKind, MigrationPhase, ReconciliationPass,
    RecordKey, RecordStore, ResolutionAction, ScanMode, StateStore, StoreError, StoreSide,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome counts of one sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub attempted: usize,
    pub corrected: usize,
    pub already_consistent: usize,
    /// Left open because the source copy is missing
    pub skipped: usize,
    pub failed: usize,
}

enum SyncOutcome {
    Resolved(ResolutionAction),
    Skipped,
}

/// Per-pass record and time allowance
struct Budget {
    remaining: usize,
    deadline: Instant,
    exhausted: bool,
}

impl Budget {
    fn take(&mut self) -> bool {
        if self.remaining == 0 || Instant::now() >= self.deadline {
            self.exhausted = true;
            return false;
        }
        self.remaining -= 1;
        true
    }
}

#[derive(Default)]
struct PassTally {
    checked: u64,
    consistent: u64,
    discrepancies: u64,
    errors: u64,
}

struct Pass {
    budget: Budget,
    seen: HashSet<RecordKey>,
    tally: PassTally,
    found: Vec<Discrepancy>,
}

/// Detects and repairs divergence between the legacy and target stores
#[derive(Debug)]
pub struct ReconciliationEngine {
    legacy: Arc<dyn RecordStore>,
    target: Arc<dyn RecordStore>,
    state: Arc<dyn StateStore>,
    phases: Arc<PhaseController>,
    config: Arc<CutoverConfig>,
    passes: AtomicU64,
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(
        legacy: Arc<dyn RecordStore>,
        target: Arc<dyn RecordStore>,
        state: Arc<dyn StateStore>,
        phases: Arc<PhaseController>,
        config: Arc<CutoverConfig>,
    ) -> Self {
        Self {
            legacy,
            target,
            state,
            phases,
            config,
            passes: AtomicU64::new(0),
        }
    }

    fn store(&self, side: StoreSide) -> &Arc<dyn RecordStore> {
        match side {
            StoreSide::Legacy => &self.legacy,
            StoreSide::Target => &self.target,
        }
    }

    /// Run one bounded pass; returns every discrepancy seen, new or already open
    pub async fn perform_reconciliation(&self) -> Result<Vec<Discrepancy>, ReconciliationError> {
        let phase = self.phases.get_phase().await?;
        if phase == MigrationPhase::LegacyOnly {
            debug!("target store not live, reconciliation skipped");
            return Ok(Vec::new());
        }

        let started_at = Utc::now();
        let pass_no = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        let every = self.config.reconciliation.full_scan_every;
        let mode = if every > 0 && pass_no % every == 0 {
            ScanMode::Full
        } else {
            ScanMode::Incremental
        };

        let mut pass = Pass {
            budget: Budget {
                remaining: self.config.reconciliation.batch_size,
                deadline: Instant::now() + self.config.batch_time_budget(),
                exhausted: false,
            },
            seen: HashSet::new(),
            tally: PassTally::default(),
            found: Vec::new(),
        };

        self.drain_candidates(&mut pass).await?;
        for side in [StoreSide::Legacy, StoreSide::Target] {
            self.scan_changes(&mut pass, side, &change_cursor(side), false)
                .await?;
        }
        if mode == ScanMode::Full {
            for side in [StoreSide::Legacy, StoreSide::Target] {
                self.scan_changes(&mut pass, side, &sweep_cursor(side), true)
                    .await?;
            }
        }

        let summary = ReconciliationPass {
            started_at,
            finished_at: Utc::now(),
            mode,
            checked: pass.tally.checked,
            consistent: pass.tally.consistent,
            discrepancies: pass.tally.discrepancies,
            errors: pass.tally.errors,
            budget_exhausted: pass.budget.exhausted,
        };
        info!(
            ?mode,
            checked = summary.checked,
            discrepancies = summary.discrepancies,
            errors = summary.errors,
            budget_exhausted = summary.budget_exhausted,
            "reconciliation pass finished"
        );
        self.state.record_pass(summary).await?;
        Ok(pass.found)
    }

    async fn drain_candidates(&self, pass: &mut Pass) -> Result<(), ReconciliationError> {
        let limit = self.config.reconciliation.batch_size;
        for candidate in self.state.candidates(limit).await? {
            let key = &candidate.key;
            if !pass.seen.insert(key.clone()) {
                continue;
            }
            if !pass.budget.take() {
                break;
            }
            if self.examine(pass, key, candidate.repair_from).await? {
                self.state.remove_candidate(key).await?;
            }
        }
        Ok(())
    }

    /// Walk one store's change stream from the named cursor
    async fn scan_changes(
        &self,
        pass: &mut Pass,
        side: StoreSide,
        cursor_name: &str,
        wrap: bool,
    ) -> Result<(), ReconciliationError> {
        if pass.budget.remaining == 0 {
            pass.budget.exhausted = true;
        }
        if pass.budget.exhausted {
            return Ok(());
        }
        let mut cursor = self.state.load_checkpoint(cursor_name).await?;
        let limit = pass.budget.remaining;
        let page = match self.store(side).changed_since(cursor, limit).await {
            Ok(page) => page,
            Err(err) => {
                warn!(store = %side, error = %err, "change enumeration failed");
                pass.tally.errors += 1;
                return Ok(());
            }
        };
        let reached_end = page.len() < limit;
        let mut stopped = false;

        for change in page {
            if pass.seen.insert(change.key.clone()) {
                if !pass.budget.take() {
                    stopped = true;
                    break;
                }
                // A key still queued keeps its repair direction
                let repair_from = self
                    .state
                    .candidate(&change.key)
                    .await?
                    .and_then(|c| c.repair_from);
                if !self.examine(pass, &change.key, repair_from).await? {
                    // Retried through the candidate queue
                    self.state
                        .enqueue_candidate(Candidate::retry(change.key.clone()))
                        .await?;
                }
            }
            cursor = change.checkpoint;
        }

        let next = if wrap && reached_end && !stopped {
            Checkpoint::ORIGIN
        } else {
            cursor
        };
        self.state.store_checkpoint(cursor_name, next).await?;
        Ok(())
    }

    /// Compare one record; `Ok(false)` when a store fetch failed
    async fn examine(
        &self,
        pass: &mut Pass,
        key: &RecordKey,
        repair_from: Option<StoreSide>,
    ) -> Result<bool, ReconciliationError> {
        let (legacy, target) = match self.fetch_both(key).await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%key, error = %err, "record fetch failed, skipping");
                pass.tally.errors += 1;
                return Ok(false);
            }
        };
        pass.tally.checked += 1;

        let Some(kind) = self.compare(key, legacy.as_ref(), target.as_ref()) else {
            pass.tally.consistent += 1;
            return Ok(true);
        };

        pass.tally.discrepancies += 1;
        let fresh = Discrepancy::new(key.clone(), kind).with_repair_from(repair_from);
        let fresh_id = fresh.id;
        let stored = self.state.insert_discrepancy(fresh).await?;
        if stored.id == fresh_id {
            debug!(%key, kind = ?stored.kind, "discrepancy detected");
            metrics::counter!(
                "cutover_reconciliation_discrepancies_total",
                "kind" => kind_label(&stored.kind)
            )
            .increment(1);
        }
        pass.found.push(stored);
        Ok(true)
    }

    async fn fetch_both(
        &self,
        key: &RecordKey,
    ) -> Result<(Option<Value>, Option<Value>), StoreError> {
        let (legacy, target) = tokio::join!(self.legacy.get(key), self.target.get(key));
        Ok((legacy?, target?))
    }

    /// Difference between two copies, if any
    #[must_use]
    pub fn compare(
        &self,
        key: &RecordKey,
        legacy: Option<&Value>,
        target: Option<&Value>,
    ) -> Option<DiscrepancyKind> {
        match (legacy, target) {
            (None, None) => None,
            (Some(_), None) => Some(DiscrepancyKind::MissingInTarget),
            (None, Some(_)) => Some(DiscrepancyKind::MissingInLegacy),
            (Some(l), Some(t)) => {
                let fields = self.compare_fields(key);
                let (l, t) = (project(l, fields), project(t, fields));
                if fingerprint(&l) == fingerprint(&t) {
                    None
                } else {
                    Some(DiscrepancyKind::FieldMismatch {
                        fields: differing_fields(&l, &t),
                    })
                }
            }
        }
    }

    fn compare_fields(&self, key: &RecordKey) -> Option<&[String]> {
        self.config
            .reconciliation
            .compare_fields
            .get(&key.entity_type)
            .map(Vec::as_slice)
    }

    /// Repair each open discrepancy from its source side
    ///
    /// The source is the phase's authoritative side, unless the discrepancy
    /// came from a failed secondary write during dual writes. A failure on
    /// one record is counted and the rest still run.
    pub async fn sync_discrepancies(
        &self,
        discrepancies: &[Discrepancy],
    ) -> Result<SyncResult, ReconciliationError> {
        let phase = self.phases.get_phase().await?;
        let authoritative = phase.authoritative_side();
        let mut result = SyncResult::default();

        for discrepancy in discrepancies.iter().filter(|d| d.is_open()) {
            result.attempted += 1;
            let source = repair_source(phase, discrepancy);
            match self.sync_one(discrepancy, source).await {
                Ok(SyncOutcome::Resolved(action)) if action.is_correction() => {
                    result.corrected += 1;
                }
                Ok(SyncOutcome::Resolved(_)) => result.already_consistent += 1,
                Ok(SyncOutcome::Skipped) => result.skipped += 1,
                Err(err) => {
                    warn!(key = %discrepancy.key, error = %err, "discrepancy sync failed");
                    result.failed += 1;
                }
            }
        }

        if result.attempted > 0 {
            info!(
                %phase,
                authoritative = %authoritative,
                corrected = result.corrected,
                already_consistent = result.already_consistent,
                skipped = result.skipped,
                failed = result.failed,
                "discrepancy sync finished"
            );
        }
        Ok(result)
    }

    async fn sync_one(
        &self,
        discrepancy: &Discrepancy,
        source: StoreSide,
    ) -> Result<SyncOutcome, ReconciliationError> {
        let key = &discrepancy.key;
        let (legacy, target) = self.fetch_both(key).await?;
        let (from, copy) = match source {
            StoreSide::Legacy => (legacy, target),
            StoreSide::Target => (target, legacy),
        };

        let action = match (&from, &copy) {
            (None, None) => ResolutionAction::AlreadyConsistent,
            (None, Some(_)) => {
                debug!(%key, source = %source, "source copy missing, left open");
                return Ok(SyncOutcome::Skipped);
            }
            (Some(src), existing) => {
                let (l, t) = match source {
                    StoreSide::Legacy => (Some(src), existing.as_ref()),
                    StoreSide::Target => (existing.as_ref(), Some(src)),
                };
                if self.compare(key, l, t).is_none() {
                    ResolutionAction::AlreadyConsistent
                } else {
                    let side = source.other();
                    self.store(side).put(key, src).await?;
                    ResolutionAction::copy_into(side)
                }
            }
        };

        self.state
            .resolve_discrepancy(discrepancy.id, action, Utc::now())
            .await?;
        debug!(%key, ?action, "discrepancy resolved");
        Ok(SyncOutcome::Resolved(action))
    }

    /// Sync up to `limit` open discrepancies from the state store
    pub async fn sync_backlog(&self, limit: usize) -> Result<SyncResult, ReconciliationError> {
        let open = self.state.open_discrepancies(limit).await?;
        self.sync_discrepancies(&open).await
    }

    /// Latest persisted pass summary
    pub async fn last_pass(&self) -> Result<Option<ReconciliationPass>, ReconciliationError> {
        Ok(self.state.latest_pass().await?)
    }
}

/// Side a discrepancy is repaired from under `phase`
fn repair_source(phase: MigrationPhase, discrepancy: &Discrepancy) -> StoreSide {
    match discrepancy.repair_from {
        Some(side) if phase.is_dual_write() => side,
        _ => phase.authoritative_side(),
    }
}

fn change_cursor(side: StoreSide) -> String {
    format!("changes:{side}")
}

fn sweep_cursor(side: StoreSide) -> String {
    format!("sweep:{side}")
}

fn kind_label(kind: &DiscrepancyKind) -> &'static str {
    match kind {
        DiscrepancyKind::MissingInLegacy => "missing_in_legacy",
        DiscrepancyKind::MissingInTarget => "missing_in_target",
        DiscrepancyKind::FieldMismatch { .. } => "field_mismatch",
    }
}

/// Restrict `value` to `fields`; whole value when none configured
fn project(value: &Value, fields: Option<&[String]>) -> Value {
    match fields {
        Some(fields) => {
            let map: Map<String, Value> = fields
                .iter()
                .map(|f| (f.clone(), value.get(f).cloned().unwrap_or(Value::Null)))
                .collect();
            Value::Object(map)
        }
        None => value.clone(),
    }
}

/// Top-level fields whose values differ
fn differing_fields(a: &Value, b: &Value) -> Vec<String> {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            let names: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            names
                .into_iter()
                .filter(|name| a.get(*name) != b.get(*name))
                .cloned()
                .collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_store::{MemoryRecordStore, MemoryStateStore, PhaseChangeInitiator};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        legacy: Arc<MemoryRecordStore>,
        target: Arc<MemoryRecordStore>,
        state: Arc<MemoryStateStore>,
        engine: ReconciliationEngine,
    }

    async fn fixture(config: CutoverConfig, phase: MigrationPhase) -> Fixture {
        let legacy = Arc::new(MemoryRecordStore::new("legacy"));
        let target = Arc::new(MemoryRecordStore::new("target"));
        let state = Arc::new(MemoryStateStore::new());
        let phases = Arc::new(PhaseController::new(
            state.clone(),
            Duration::from_secs(60),
            8,
        ));
        while phases.get_phase().await.unwrap() < phase {
            let next = phases.get_phase().await.unwrap().next().unwrap();
            phases
                .set_phase(next, "test", PhaseChangeInitiator::Operator)
                .await
                .unwrap();
        }
        let engine = ReconciliationEngine::new(
            legacy.clone(),
            target.clone(),
            state.clone(),
            phases,
            Arc::new(config),
        );
        Fixture {
            legacy,
            target,
            state,
            engine,
        }
    }

    fn key(id: &str) -> RecordKey {
        RecordKey::new("animal", "t1", id)
    }

    #[tokio::test]
    async fn skipped_in_legacy_only() {
        let f = fixture(CutoverConfig::new(), MigrationPhase::LegacyOnly).await;
        f.legacy.insert(key("a"), json!({ "x": 1 }));
        assert!(f.engine.perform_reconciliation().await.unwrap().is_empty());
        assert!(f.engine.last_pass().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn detects_one_sided_and_mismatched_records() {
        let f = fixture(CutoverConfig::new(), MigrationPhase::DualWrite).await;
        f.legacy.insert(key("only-legacy"), json!({ "x": 1 }));
        f.target.insert(key("only-target"), json!({ "x": 1 }));
        f.legacy.insert(key("both"), json!({ "x": 1, "y": 2 }));
        f.target.insert(key("both"), json!({ "x": 1, "y": 3 }));
        f.legacy.insert(key("same"), json!({ "x": 1 }));
        f.target.insert(key("same"), json!({ "x": 1 }));

        let found = f.engine.perform_reconciliation().await.unwrap();
        assert_eq!(found.len(), 3);
        let kind_of = |id: &str| {
            found
                .iter()
                .find(|d| d.key == key(id))
                .map(|d| d.kind.clone())
                .unwrap()
        };
        assert_eq!(kind_of("only-legacy"), DiscrepancyKind::MissingInTarget);
        assert_eq!(kind_of("only-target"), DiscrepancyKind::MissingInLegacy);
        assert_eq!(
            kind_of("both"),
            DiscrepancyKind::FieldMismatch {
                fields: vec!["y".to_string()]
            }
        );

        let pass = f.engine.last_pass().await.unwrap().unwrap();
        assert_eq!(pass.checked, 4);
        assert_eq!(pass.consistent, 1);
        assert!((pass.integrity_score() - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn compare_fields_ignore_other_fields() {
        let config = CutoverConfig::new().with_compare_fields("animal", ["tag"]);
        let f = fixture(config, MigrationPhase::DualWrite).await;
        f.legacy
            .insert(key("a"), json!({ "tag": "T1", "updated": "monday" }));
        f.target
            .insert(key("a"), json!({ "tag": "T1", "updated": "tuesday" }));
        assert!(f.engine.perform_reconciliation().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_copies_from_authoritative_side() {
        let f = fixture(CutoverConfig::new(), MigrationPhase::DualWriteReadNew).await;
        f.legacy.insert(key("a"), json!({ "x": 5 }));
        f.target.insert(key("a"), json!({ "x": 7 }));

        let found = f.engine.perform_reconciliation().await.unwrap();
        let result = f.engine.sync_discrepancies(&found).await.unwrap();
        assert_eq!(result.corrected, 1);
        // Target wins once reads have moved to it
        assert_eq!(f.legacy.snapshot(&key("a")), Some(json!({ "x": 7 })));
        assert_eq!(f.state.open_discrepancy_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_secondary_write_repairs_from_accepting_side() {
        let f = fixture(CutoverConfig::new(), MigrationPhase::DualWriteReadNew).await;
        f.legacy.insert(key("a"), json!({ "x": 2 }));
        f.target.insert(key("a"), json!({ "x": 1 }));
        f.state
            .enqueue_candidate(Candidate::failed_write(key("a"), StoreSide::Legacy))
            .await
            .unwrap();

        let found = f.engine.perform_reconciliation().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].repair_from, Some(StoreSide::Legacy));

        let result = f.engine.sync_discrepancies(&found).await.unwrap();
        assert_eq!(result.corrected, 1);
        assert_eq!(f.target.snapshot(&key("a")), Some(json!({ "x": 2 })));
        assert_eq!(f.legacy.snapshot(&key("a")), Some(json!({ "x": 2 })));
    }

    #[tokio::test]
    async fn repair_direction_lapses_after_dual_writes() {
        let f = fixture(CutoverConfig::new(), MigrationPhase::NewOnly).await;
        f.legacy.insert(key("a"), json!({ "x": 2 }));
        f.target.insert(key("a"), json!({ "x": 3 }));
        f.state
            .enqueue_candidate(Candidate::failed_write(key("a"), StoreSide::Legacy))
            .await
            .unwrap();

        let found = f.engine.perform_reconciliation().await.unwrap();
        f.engine.sync_discrepancies(&found).await.unwrap();
        assert_eq!(f.legacy.snapshot(&key("a")), Some(json!({ "x": 3 })));
        assert_eq!(f.target.snapshot(&key("a")), Some(json!({ "x": 3 })));
    }

    #[tokio::test]
    async fn missing_authoritative_copy_stays_open() {
        let f = fixture(CutoverConfig::new(), MigrationPhase::DualWrite).await;
        f.target.insert(key("ghost"), json!({ "x": 1 }));

        let found = f.engine.perform_reconciliation().await.unwrap();
        let result = f.engine.sync_discrepancies(&found).await.unwrap();
        assert_eq!(result.skipped, 1);
        assert_eq!(f.state.open_discrepancy_count().await.unwrap(), 1);
        assert!(f.legacy.snapshot(&key("ghost")).is_none());
    }

    #[tokio::test]
    async fn sync_rechecks_before_writing() {
        let f = fixture(CutoverConfig::new(), MigrationPhase::DualWrite).await;
        f.legacy.insert(key("a"), json!({ "x": 1 }));

        let found = f.engine.perform_reconciliation().await.unwrap();
        // Repaired by a later write before sync runs
        f.target.insert(key("a"), json!({ "x": 1 }));
        let head = f.target.head();

        let result = f.engine.sync_discrepancies(&found).await.unwrap();
        assert_eq!(result.already_consistent, 1);
        assert_eq!(result.corrected, 0);
        assert_eq!(f.target.head(), head);
    }

    #[tokio::test]
    async fn budget_exhaustion_resumes_next_pass() {
        let config = CutoverConfig::new()
            .with_batch_size(2)
            .with_full_scan_every(0);
        let f = fixture(config, MigrationPhase::DualWrite).await;
        for i in 0..5 {
            f.legacy.insert(key(&i.to_string()), json!({ "i": i }));
        }

        let mut total = 0;
        for _ in 0..3 {
            total += f.engine.perform_reconciliation().await.unwrap().len();
        }
        assert_eq!(total, 5);
        let pass = f.engine.last_pass().await.unwrap().unwrap();
        assert!(pass.checked <= 2);
    }

    #[tokio::test]
    async fn repeated_passes_are_convergent() {
        let f = fixture(CutoverConfig::new(), MigrationPhase::DualWrite).await;
        f.legacy.insert(key("a"), json!({ "x": 1 }));
        f.legacy.insert(key("b"), json!({ "x": 2 }));
        f.target.insert(key("b"), json!({ "x": 3 }));

        let first = f.engine.perform_reconciliation().await.unwrap();
        assert_eq!(f.engine.sync_discrepancies(&first).await.unwrap().corrected, 2);

        let second = f.engine.perform_reconciliation().await.unwrap();
        let result = f.engine.sync_discrepancies(&second).await.unwrap();
        assert_eq!(result.corrected, 0);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn full_sweep_catches_records_behind_checkpoint() {
        let config = CutoverConfig::new().with_full_scan_every(2);
        let f = fixture(config, MigrationPhase::DualWrite).await;
        f.legacy.insert(key("a"), json!({ "x": 1 }));
        f.target.insert(key("a"), json!({ "x": 1 }));
        assert!(f.engine.perform_reconciliation().await.unwrap().is_empty());

        // Diverge without touching the change stream past the checkpoint
        f.target.remove(&key("a"));
        let found = f.engine.perform_reconciliation().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, DiscrepancyKind::MissingInTarget);
        let pass = f.engine.last_pass().await.unwrap().unwrap();
        assert_eq!(pass.mode, ScanMode::Full);
    }

    #[test]
    fn differing_fields_lists_union_of_keys() {
        let a = json!({ "x": 1, "y": 2 });
        let b = json!({ "x": 1, "z": 3 });
        assert_eq!(differing_fields(&a, &b), vec!["y".to_string(), "z".to_string()]);
    }
}
