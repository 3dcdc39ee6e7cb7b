//! Shared persistent state store
//!
//! Holds everything that must look the same from every service instance:
//! - The single migration phase row
//! - Append-only journals: write operations, metric samples, alerts,
//!   recovery attempts, phase audit entries
//! - Reconciliation bookkeeping: candidate queue, change checkpoints,
//!   pass summaries and discrepancies

use crate::alert::{AlertRecord, RecoveryRecord};
use crate::discrepancy::{Candidate, Discrepancy, DiscrepancyId, ReconciliationPass, ResolutionAction};
use crate::error::StateStoreError;
use crate::journal::{DualWriteOperation, MetricSample, SampleId};
use crate::phase::{PhaseAuditEntry, PhaseRecord};
use crate::record::{Checkpoint, RecordKey, StoreSide};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of an optimistic sample append
#[derive(Debug, Clone, PartialEq)]
pub enum SampleAppend {
    /// Sample stored
    Appended(MetricSample),
    /// Another collector got there first; carries the current latest sample
    Conflict(MetricSample),
}

/// Contract of the shared persistent store
#[async_trait]
pub trait StateStore: Send + Sync + Debug {
    // Phase

    /// Persisted phase row, if any
    async fn load_phase(&self) -> Result<Option<PhaseRecord>, StateStoreError>;

    /// Overwrite the phase row (last writer wins)
    async fn store_phase(&self, record: PhaseRecord) -> Result<(), StateStoreError>;

    async fn append_phase_audit(&self, entry: PhaseAuditEntry) -> Result<(), StateStoreError>;

    /// Most recent audit entries, oldest first
    async fn phase_audit(&self, limit: usize) -> Result<Vec<PhaseAuditEntry>, StateStoreError>;

    // Write journal

    /// Journal an operation, stamping `recorded_at` as it becomes visible
    ///
    /// A reader that picks `until` before calling [`operations_between`]
    /// either sees the operation or finds it stamped after `until`.
    ///
    /// [`operations_between`]: StateStore::operations_between
    async fn record_operation(&self, op: DualWriteOperation) -> Result<(), StateStoreError>;

    /// Operations with `after < recorded_at <= until`; unbounded below when `after` is `None`
    async fn operations_between(
        &self,
        after: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DualWriteOperation>, StateStoreError>;

    /// Drop operations recorded before `before`; returns how many were removed
    async fn prune_operations(&self, before: DateTime<Utc>) -> Result<usize, StateStoreError>;

    // Reconciliation candidates

    /// Queue a key for reconciliation
    ///
    /// Duplicates collapse onto the first queue position. A repair direction
    /// replaces the queued one; a retry without one keeps it.
    async fn enqueue_candidate(&self, candidate: Candidate) -> Result<(), StateStoreError>;

    /// Oldest queued candidates, at most `limit`
    async fn candidates(&self, limit: usize) -> Result<Vec<Candidate>, StateStoreError>;

    /// Queued candidate for one key
    async fn candidate(&self, key: &RecordKey) -> Result<Option<Candidate>, StateStoreError>;

    async fn remove_candidate(&self, key: &RecordKey) -> Result<(), StateStoreError>;

    async fn candidate_count(&self) -> Result<usize, StateStoreError>;

    // Metric samples

    async fn latest_sample(&self) -> Result<Option<MetricSample>, StateStoreError>;

    /// Append only if the current latest sample is `expected_previous`
    async fn append_sample(
        &self,
        sample: MetricSample,
        expected_previous: Option<SampleId>,
    ) -> Result<SampleAppend, StateStoreError>;

    /// Samples whose window ended at or after `since`, oldest first
    async fn samples_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, StateStoreError>;

    /// Last `limit` samples, oldest first
    async fn recent_samples(&self, limit: usize) -> Result<Vec<MetricSample>, StateStoreError>;

    // Checkpoints and passes

    /// Named change checkpoint; origin when never stored
    async fn load_checkpoint(&self, name: &str) -> Result<Checkpoint, StateStoreError>;

    async fn store_checkpoint(&self, name: &str, checkpoint: Checkpoint)
        -> Result<(), StateStoreError>;

    async fn record_pass(&self, pass: ReconciliationPass) -> Result<(), StateStoreError>;

    async fn latest_pass(&self) -> Result<Option<ReconciliationPass>, StateStoreError>;

    // Discrepancies

    /// Store a new open discrepancy unless one is already open for the key.
    /// A repair direction on the new one is carried onto the open one.
    /// Returns whichever open discrepancy is stored for the key afterwards.
    async fn insert_discrepancy(&self, discrepancy: Discrepancy)
        -> Result<Discrepancy, StateStoreError>;

    /// Oldest open discrepancies, at most `limit`
    async fn open_discrepancies(&self, limit: usize) -> Result<Vec<Discrepancy>, StateStoreError>;

    async fn open_discrepancy_count(&self) -> Result<usize, StateStoreError>;

    async fn discrepancy(&self, id: DiscrepancyId)
        -> Result<Option<Discrepancy>, StateStoreError>;

    async fn resolve_discrepancy(
        &self,
        id: DiscrepancyId,
        action: ResolutionAction,
        at: DateTime<Utc>,
    ) -> Result<(), StateStoreError>;

    // Alerts

    async fn append_alert(&self, alert: AlertRecord) -> Result<(), StateStoreError>;

    /// Alerts raised at or after `since`, oldest first
    async fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<AlertRecord>, StateStoreError>;

    async fn append_recovery(&self, recovery: RecoveryRecord) -> Result<(), StateStoreError>;

    /// Recovery attempts made at or after `since`, oldest first
    async fn recoveries_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecoveryRecord>, StateStoreError>;
}

/// Passes kept in memory
const MAX_PASSES: usize = 256;

/// In-process state store
///
/// Shared between controllers via `Arc`, standing in for the replicated
/// store a multi-instance deployment would use. `simulate_outage` makes every
/// call fail with [`StateStoreError::Unavailable`] for failure drills.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    outage: AtomicBool,
    phase: Mutex<Option<PhaseRecord>>,
    phase_audit: Mutex<Vec<PhaseAuditEntry>>,
    operations: Mutex<VecDeque<DualWriteOperation>>,
    candidates: Mutex<IndexMap<RecordKey, Option<StoreSide>>>,
    samples: Mutex<Vec<MetricSample>>,
    checkpoints: DashMap<String, Checkpoint>,
    passes: Mutex<VecDeque<ReconciliationPass>>,
    discrepancies: DashMap<DiscrepancyId, Discrepancy>,
    open_by_key: DashMap<RecordKey, DiscrepancyId>,
    alerts: Mutex<Vec<AlertRecord>>,
    recoveries: Mutex<Vec<RecoveryRecord>>,
}

impl MemoryStateStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated unavailability
    pub fn simulate_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    /// Number of journaled operations
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operations.lock().len()
    }

    /// Every alert ever appended, oldest first
    #[must_use]
    pub fn all_alerts(&self) -> Vec<AlertRecord> {
        self.alerts.lock().clone()
    }

    fn check(&self) -> Result<(), StateStoreError> {
        if self.outage.load(Ordering::SeqCst) {
            Err(StateStoreError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

fn tail<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    items[items.len().saturating_sub(limit)..].to_vec()
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load_phase(&self) -> Result<Option<PhaseRecord>, StateStoreError> {
        self.check()?;
        Ok(self.phase.lock().clone())
    }

    async fn store_phase(&self, record: PhaseRecord) -> Result<(), StateStoreError> {
        self.check()?;
        *self.phase.lock() = Some(record);
        Ok(())
    }

    async fn append_phase_audit(&self, entry: PhaseAuditEntry) -> Result<(), StateStoreError> {
        self.check()?;
        self.phase_audit.lock().push(entry);
        Ok(())
    }

    async fn phase_audit(&self, limit: usize) -> Result<Vec<PhaseAuditEntry>, StateStoreError> {
        self.check()?;
        Ok(tail(&self.phase_audit.lock(), limit))
    }

    async fn record_operation(&self, mut op: DualWriteOperation) -> Result<(), StateStoreError> {
        self.check()?;
        let mut ops = self.operations.lock();
        op.recorded_at = Utc::now();
        ops.push_back(op);
        Ok(())
    }

    async fn operations_between(
        &self,
        after: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DualWriteOperation>, StateStoreError> {
        self.check()?;
        Ok(self
            .operations
            .lock()
            .iter()
            .filter(|op| after.map_or(true, |a| op.recorded_at > a) && op.recorded_at <= until)
            .cloned()
            .collect())
    }

    async fn prune_operations(&self, before: DateTime<Utc>) -> Result<usize, StateStoreError> {
        self.check()?;
        let mut ops = self.operations.lock();
        let len = ops.len();
        ops.retain(|op| op.recorded_at >= before);
        Ok(len - ops.len())
    }

    async fn enqueue_candidate(&self, candidate: Candidate) -> Result<(), StateStoreError> {
        self.check()?;
        let mut queue = self.candidates.lock();
        let slot = queue.entry(candidate.key).or_insert(None);
        if candidate.repair_from.is_some() {
            *slot = candidate.repair_from;
        }
        Ok(())
    }

    async fn candidates(&self, limit: usize) -> Result<Vec<Candidate>, StateStoreError> {
        self.check()?;
        Ok(self
            .candidates
            .lock()
            .iter()
            .take(limit)
            .map(|(key, repair_from)| Candidate {
                key: key.clone(),
                repair_from: *repair_from,
            })
            .collect())
    }

    async fn candidate(&self, key: &RecordKey) -> Result<Option<Candidate>, StateStoreError> {
        self.check()?;
        Ok(self
            .candidates
            .lock()
            .get(key)
            .map(|repair_from| Candidate {
                key: key.clone(),
                repair_from: *repair_from,
            }))
    }

    async fn remove_candidate(&self, key: &RecordKey) -> Result<(), StateStoreError> {
        self.check()?;
        self.candidates.lock().shift_remove(key);
        Ok(())
    }

    async fn candidate_count(&self) -> Result<usize, StateStoreError> {
        self.check()?;
        Ok(self.candidates.lock().len())
    }

    async fn latest_sample(&self) -> Result<Option<MetricSample>, StateStoreError> {
        self.check()?;
        Ok(self.samples.lock().last().cloned())
    }

    async fn append_sample(
        &self,
        sample: MetricSample,
        expected_previous: Option<SampleId>,
    ) -> Result<SampleAppend, StateStoreError> {
        self.check()?;
        let mut samples = self.samples.lock();
        let current = samples.last().map(|s| s.id);
        if current != expected_previous {
            // `current` is only None when `expected_previous` is Some, and
            // samples are never removed, so `last()` is populated here.
            if let Some(latest) = samples.last() {
                return Ok(SampleAppend::Conflict(latest.clone()));
            }
            return Err(StateStoreError::NotFound(format!(
                "expected previous sample {expected_previous:?}"
            )));
        }
        samples.push(sample.clone());
        Ok(SampleAppend::Appended(sample))
    }

    async fn samples_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, StateStoreError> {
        self.check()?;
        Ok(self
            .samples
            .lock()
            .iter()
            .filter(|s| s.window_end >= since)
            .cloned()
            .collect())
    }

    async fn recent_samples(&self, limit: usize) -> Result<Vec<MetricSample>, StateStoreError> {
        self.check()?;
        Ok(tail(&self.samples.lock(), limit))
    }

    async fn load_checkpoint(&self, name: &str) -> Result<Checkpoint, StateStoreError> {
        self.check()?;
        Ok(self
            .checkpoints
            .get(name)
            .map(|c| *c)
            .unwrap_or(Checkpoint::ORIGIN))
    }

    async fn store_checkpoint(
        &self,
        name: &str,
        checkpoint: Checkpoint,
    ) -> Result<(), StateStoreError> {
        self.check()?;
        self.checkpoints.insert(name.to_string(), checkpoint);
        Ok(())
    }

    async fn record_pass(&self, pass: ReconciliationPass) -> Result<(), StateStoreError> {
        self.check()?;
        let mut passes = self.passes.lock();
        if passes.len() == MAX_PASSES {
            passes.pop_front();
        }
        passes.push_back(pass);
        Ok(())
    }

    async fn latest_pass(&self) -> Result<Option<ReconciliationPass>, StateStoreError> {
        self.check()?;
        Ok(self.passes.lock().back().cloned())
    }

    async fn insert_discrepancy(
        &self,
        discrepancy: Discrepancy,
    ) -> Result<Discrepancy, StateStoreError> {
        self.check()?;
        match self.open_by_key.entry(discrepancy.key.clone()) {
            Entry::Occupied(existing) => {
                let id = *existing.get();
                let mut open = self
                    .discrepancies
                    .get_mut(&id)
                    .ok_or_else(|| StateStoreError::Corrupt(format!("dangling discrepancy {id}")))?;
                if discrepancy.repair_from.is_some() {
                    open.repair_from = discrepancy.repair_from;
                }
                Ok(open.clone())
            }
            Entry::Vacant(slot) => {
                slot.insert(discrepancy.id);
                self.discrepancies.insert(discrepancy.id, discrepancy.clone());
                Ok(discrepancy)
            }
        }
    }

    async fn open_discrepancies(&self, limit: usize) -> Result<Vec<Discrepancy>, StateStoreError> {
        self.check()?;
        let mut open: Vec<Discrepancy> = self
            .discrepancies
            .iter()
            .filter(|d| d.is_open())
            .map(|d| d.clone())
            .collect();
        open.sort_by_key(|d| d.id);
        open.truncate(limit);
        Ok(open)
    }

    async fn open_discrepancy_count(&self) -> Result<usize, StateStoreError> {
        self.check()?;
        Ok(self.open_by_key.len())
    }

    async fn discrepancy(
        &self,
        id: DiscrepancyId,
    ) -> Result<Option<Discrepancy>, StateStoreError> {
        self.check()?;
        Ok(self.discrepancies.get(&id).map(|d| d.clone()))
    }

    async fn resolve_discrepancy(
        &self,
        id: DiscrepancyId,
        action: ResolutionAction,
        at: DateTime<Utc>,
    ) -> Result<(), StateStoreError> {
        self.check()?;
        let key = {
            let mut entry = self
                .discrepancies
                .get_mut(&id)
                .ok_or_else(|| StateStoreError::NotFound(format!("discrepancy {id}")))?;
            if !entry.is_open() {
                return Ok(());
            }
            entry.resolve(action, at);
            entry.key.clone()
        };
        self.open_by_key.remove_if(&key, |_, open_id| *open_id == id);
        Ok(())
    }

    async fn append_alert(&self, alert: AlertRecord) -> Result<(), StateStoreError> {
        self.check()?;
        self.alerts.lock().push(alert);
        Ok(())
    }

    async fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<AlertRecord>, StateStoreError> {
        self.check()?;
        Ok(self
            .alerts
            .lock()
            .iter()
            .filter(|a| a.raised_at() >= since)
            .cloned()
            .collect())
    }

    async fn append_recovery(&self, recovery: RecoveryRecord) -> Result<(), StateStoreError> {
        self.check()?;
        self.recoveries.lock().push(recovery);
        Ok(())
    }

    async fn recoveries_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecoveryRecord>, StateStoreError> {
        self.check()?;
        Ok(self
            .recoveries
            .lock()
            .iter()
            .filter(|r| r.created_at >= since)
            .cloned()
            .collect())
    }
}
