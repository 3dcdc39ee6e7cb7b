//! Testing utilities for the cutover workspace
//!
//! Fault-injecting stores, a recording notifier, and a harness that wires a
//! full [`MigrationSystem`] over them.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::Utc;
use cutover_core::{CutoverConfig, MigrationSystem, NotificationChannel};
use cutover_store::{
    AlertNotice, ChangedRecord, Checkpoint, MemoryRecordStore, MemoryStateStore, MetricSample,
    MigrationPhase, NotificationError, PhaseChangeInitiator, RecordKey, RecordStore, StoreError,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Record store with switchable failures
#[derive(Debug)]
pub struct FlakyRecordStore {
    inner: MemoryRecordStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    failing_keys: Mutex<HashSet<RecordKey>>,
    write_delay: Mutex<Option<Duration>>,
    writes: AtomicUsize,
}

impl FlakyRecordStore {
    pub fn new(name: &str) -> Self {
        Self {
            inner: MemoryRecordStore::new(name),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            failing_keys: Mutex::new(HashSet::new()),
            write_delay: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    /// Fail every write
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Hold every write for `delay` before it succeeds or fails
    pub fn delay_writes(&self, delay: Option<Duration>) {
        *self.write_delay.lock() = delay;
    }

    /// Fail every read
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail reads and writes of one key
    pub fn fail_key(&self, key: RecordKey) {
        self.failing_keys.lock().insert(key);
    }

    pub fn heal_key(&self, key: &RecordKey) {
        self.failing_keys.lock().remove(key);
    }

    /// Successful writes through the async contract
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed directly, bypassing failures and the write counter
    pub fn seed(&self, key: RecordKey, payload: Value) {
        self.inner.insert(key, payload);
    }

    pub fn snapshot(&self, key: &RecordKey) -> Option<Value> {
        self.inner.snapshot(key)
    }

    pub fn remove(&self, key: &RecordKey) -> Option<Value> {
        self.inner.remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn key_fails(&self, key: &RecordKey) -> bool {
        self.failing_keys.lock().contains(key)
    }
}

#[async_trait]
impl RecordStore for FlakyRecordStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Value>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) || self.key_fails(key) {
            return Err(StoreError::unavailable(self.name(), "injected read failure"));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &RecordKey, payload: &Value) -> Result<(), StoreError> {
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) || self.key_fails(key) {
            return Err(StoreError::unavailable(self.name(), "injected write failure"));
        }
        self.inner.put(key, payload).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn changed_since(
        &self,
        after: Checkpoint,
        limit: usize,
    ) -> Result<Vec<ChangedRecord>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(self.name(), "injected read failure"));
        }
        self.inner.changed_since(after, limit).await
    }
}

/// Notifier that remembers what it was asked to send
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AlertNotice>>,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` attempts
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Delivered notices, oldest first
    pub fn sent(&self) -> Vec<AlertNotice> {
        self.sent.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for RecordingNotifier {
    async fn send_alert(&self, notice: &AlertNotice) -> Result<(), NotificationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NotificationError::Transport("injected failure".to_string()));
        }
        self.sent.lock().push(notice.clone());
        Ok(())
    }
}

/// Full system over in-memory, fault-injectable stores
pub struct TestHarness {
    pub legacy: Arc<FlakyRecordStore>,
    pub target: Arc<FlakyRecordStore>,
    pub state: Arc<MemoryStateStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub system: MigrationSystem,
}

impl TestHarness {
    /// Harness with retry delays removed
    pub fn new(config: CutoverConfig) -> Self {
        let retries = config.alerting.notification_retries;
        let config = config.with_notification_retries(retries, Duration::ZERO);
        let legacy = Arc::new(FlakyRecordStore::new("legacy"));
        let target = Arc::new(FlakyRecordStore::new("target"));
        let state = Arc::new(MemoryStateStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let system = MigrationSystem::new(
            config,
            legacy.clone(),
            target.clone(),
            state.clone(),
            notifier.clone(),
        );
        Self {
            legacy,
            target,
            state,
            notifier,
            system,
        }
    }

    /// Advance operator-style, one step at a time, until `phase`
    pub async fn advance_to(&self, phase: MigrationPhase) {
        loop {
            let current = self.system.phases.get_phase().await.unwrap();
            if current >= phase {
                break;
            }
            let next = current.next().unwrap();
            self.system
                .phases
                .set_phase(next, "test advance", PhaseChangeInitiator::Operator)
                .await
                .unwrap();
        }
    }

    pub async fn phase(&self) -> MigrationPhase {
        self.system.phases.get_phase().await.unwrap()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new(CutoverConfig::new())
    }
}

/// Key in the default test entity/tenant
pub fn key(id: &str) -> RecordKey {
    RecordKey::new("animal", "farm-1", id)
}

/// Sample stamped now with the given counts
pub fn sample(
    successes: u64,
    failures: u64,
    integrity: f64,
    phase: MigrationPhase,
) -> MetricSample {
    let now = Utc::now();
    MetricSample::new(now, now, successes, failures, integrity, phase)
}
