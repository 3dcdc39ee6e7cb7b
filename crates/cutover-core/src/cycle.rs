//! Periodic cycle driver
//!
//! One cycle: audit phase changes, collect metrics, reconcile, sync,
//! evaluate rollback, prune. Every step is idempotent or convergent, so an
//! external scheduler calling [`MigrationCycle::run_once`] concurrently with
//! the in-process ticker is safe. Step failures are reported, never raised.

use crate::alerting::{AlertingController, RollbackDecision};
use crate::collector::MetricsCollector;
use crate::reconcile::{ReconciliationEngine, SyncResult};
use chrono::{DateTime, Utc};
use cutover_store::MetricSample;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Failure of one cycle step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub step: String,
    pub message: String,
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Another cycle was already running on this instance
    pub skipped: bool,
    pub phase_changes_recorded: usize,
    pub sample: Option<MetricSample>,
    pub discrepancies_found: usize,
    pub sync: Option<SyncResult>,
    pub rollback: Option<RollbackDecision>,
    pub pruned_operations: usize,
    pub errors: Vec<StepError>,
}

impl CycleReport {
    fn begin() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            skipped: false,
            phase_changes_recorded: 0,
            sample: None,
            discrepancies_found: 0,
            sync: None,
            rollback: None,
            pruned_operations: 0,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, step: &str, err: impl ToString) {
        let message = err.to_string();
        warn!(step, error = %message, "cycle step failed");
        self.errors.push(StepError {
            step: step.to_string(),
            message,
        });
    }
}

/// Runs the periodic collect/reconcile/evaluate sequence
#[derive(Debug)]
pub struct MigrationCycle {
    collector: Arc<MetricsCollector>,
    reconciler: Arc<ReconciliationEngine>,
    alerting: Arc<AlertingController>,
    running: Mutex<()>,
}

impl MigrationCycle {
    #[must_use]
    pub fn new(
        collector: Arc<MetricsCollector>,
        reconciler: Arc<ReconciliationEngine>,
        alerting: Arc<AlertingController>,
    ) -> Self {
        Self {
            collector,
            reconciler,
            alerting,
            running: Mutex::new(()),
        }
    }

    /// Run one cycle, or report `skipped` if one is already running here
    pub async fn run_once(&self) -> CycleReport {
        let mut report = CycleReport::begin();
        let Ok(_guard) = self.running.try_lock() else {
            debug!("cycle already running, skipped");
            report.skipped = true;
            return report;
        };

        report.phase_changes_recorded = self.alerting.record_phase_changes().await;
        report.sample = Some(self.collector.collect_metrics().await);

        match self.reconciler.perform_reconciliation().await {
            Ok(found) => {
                report.discrepancies_found = found.len();
                match self.reconciler.sync_discrepancies(&found).await {
                    Ok(result) => report.sync = Some(result),
                    Err(err) => report.fail("sync", err),
                }
            }
            Err(err) => report.fail("reconcile", err),
        }

        match self.collector.evaluation_samples().await {
            Ok(samples) => {
                report.rollback = Some(
                    self.alerting
                        .check_automated_rollback_conditions(&samples)
                        .await,
                );
            }
            Err(err) => report.fail("evaluate", err),
        }

        // Rollbacks committed above are audited in the same cycle
        report.phase_changes_recorded += self.alerting.record_phase_changes().await;

        match self.collector.prune().await {
            Ok(pruned) => report.pruned_operations = pruned,
            Err(err) => report.fail("prune", err),
        }

        report.finished_at = Utc::now();
        info!(
            discrepancies = report.discrepancies_found,
            rolled_back = report.rollback.as_ref().is_some_and(RollbackDecision::rolled_back),
            errors = report.errors.len(),
            "migration cycle finished"
        );
        report
    }
}

/// Run `cycle` every `interval` until `shutdown` turns true
///
/// Missed ticks are skipped rather than bunched up.
pub fn spawn_ticker(
    cycle: Arc<MigrationCycle>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = interval.as_millis(), "cycle ticker started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = cycle.run_once().await;
                    debug!(skipped = report.skipped, "ticker cycle done");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("cycle ticker stopped");
    })
}
