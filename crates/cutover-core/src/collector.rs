//! Metrics collector
//!
//! Folds the write journal into one [`MetricSample`] per collection window.
//! Windows chain end to start, and a sample is only appended when its
//! predecessor is still the latest stored sample, so re-running a collection
//! concurrently never writes a duplicate window.

use crate::alerting::active_alerts;
use crate::config::CutoverConfig;
use crate::error::MigrationError;
use crate::phase::PhaseController;
use chrono::{DateTime, Utc};
use cutover_store::{
    AlertRecord, MetricSample, MetricsSnapshot, MigrationPhase, PhaseRecord, ReconciliationPass,
    SampleAppend, StateStore, StateStoreError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Operator dashboard rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    /// Most recent samples, oldest first
    pub samples: Vec<MetricSample>,
    pub current_phase: MigrationPhase,
    pub active_alerts: Vec<AlertRecord>,
    pub phase: PhaseRecord,
    /// Rolling figures over the evaluation window
    pub snapshot: MetricsSnapshot,
    pub open_discrepancies: usize,
    pub queued_candidates: usize,
    pub last_reconciliation: Option<ReconciliationPass>,
}

/// Figures remembered for degraded samples
#[derive(Debug, Clone, Copy)]
struct LastSeen {
    integrity: f64,
    phase: MigrationPhase,
}

/// Aggregates write outcomes into health samples
#[derive(Debug)]
pub struct MetricsCollector {
    state: Arc<dyn StateStore>,
    phases: Arc<PhaseController>,
    config: Arc<CutoverConfig>,
    last_seen: Mutex<Option<LastSeen>>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new(
        state: Arc<dyn StateStore>,
        phases: Arc<PhaseController>,
        config: Arc<CutoverConfig>,
    ) -> Self {
        Self {
            state,
            phases,
            config,
            last_seen: Mutex::new(None),
        }
    }

    /// Collect one sample covering everything since the last one
    ///
    /// Never fails: when the state store cannot be read, a neutral sample is
    /// returned without being persisted.
    pub async fn collect_metrics(&self) -> MetricSample {
        let now = Utc::now();
        match self.try_collect(now).await {
            Ok(sample) => sample,
            Err(err) => {
                warn!(error = %err, "metrics collection failed, returning degraded sample");
                self.degraded_sample(now)
            }
        }
    }

    async fn try_collect(&self, now: DateTime<Utc>) -> Result<MetricSample, MigrationError> {
        let latest = self.state.latest_sample().await?;
        let after = latest.as_ref().map(|s| s.window_end);
        let ops = self.state.operations_between(after, now).await?;

        let window_start = match (&latest, ops.first()) {
            (Some(prev), _) => prev.window_end,
            (None, Some(first)) => first.recorded_at,
            (None, None) => now,
        };
        let failures = ops.iter().filter(|op| !op.is_success()).count() as u64;
        let successes = ops.len() as u64 - failures;

        let integrity = self
            .state
            .latest_pass()
            .await?
            .map_or(100.0, |pass| pass.integrity_score());
        let phase = self.phases.get_phase().await?;
        *self.last_seen.lock() = Some(LastSeen { integrity, phase });

        let sample = MetricSample::new(window_start, now, successes, failures, integrity, phase);
        match self
            .state
            .append_sample(sample, latest.map(|s| s.id))
            .await?
        {
            SampleAppend::Appended(sample) => {
                debug!(
                    successes,
                    failures,
                    error_rate = sample.error_rate,
                    integrity,
                    "metric sample appended"
                );
                Ok(sample)
            }
            SampleAppend::Conflict(existing) => {
                debug!(sample = %existing.id, "window already collected elsewhere");
                Ok(existing)
            }
        }
    }

    fn degraded_sample(&self, now: DateTime<Utc>) -> MetricSample {
        let last = *self.last_seen.lock();
        let (integrity, phase) = last.map_or((100.0, MigrationPhase::default()), |l| {
            (l.integrity, l.phase)
        });
        MetricSample::new(now, now, 0, 0, integrity, phase)
    }

    /// Samples ending within `window` of now, oldest first
    pub async fn recent_samples(
        &self,
        window: chrono::Duration,
    ) -> Result<Vec<MetricSample>, StateStoreError> {
        self.state.samples_since(Utc::now() - window).await
    }

    /// Samples inside the configured evaluation window
    pub async fn evaluation_samples(&self) -> Result<Vec<MetricSample>, StateStoreError> {
        self.recent_samples(self.config.evaluation_window()).await
    }

    /// Read-only rollup for operators
    pub async fn get_dashboard_data(&self) -> Result<DashboardData, MigrationError> {
        let phase = self.phases.current().await?;
        let samples = self
            .state
            .recent_samples(self.config.metrics.dashboard_sample_limit)
            .await?;
        let snapshot = MetricsSnapshot::from_samples(&self.evaluation_samples().await?);
        let active = active_alerts(
            self.state.as_ref(),
            Utc::now() - self.config.alert_active_window(),
        )
        .await?;

        Ok(DashboardData {
            samples,
            current_phase: phase.phase,
            active_alerts: active,
            phase,
            snapshot,
            open_discrepancies: self.state.open_discrepancy_count().await?,
            queued_candidates: self.state.candidate_count().await?,
            last_reconciliation: self.state.latest_pass().await?,
        })
    }

    /// Drop journaled operations older than the retention period
    pub async fn prune(&self) -> Result<usize, StateStoreError> {
        let cutoff = Utc::now() - self.config.operation_retention();
        let pruned = self.state.prune_operations(cutoff).await?;
        if pruned > 0 {
            debug!(pruned, "pruned journaled operations");
        }
        Ok(pruned)
    }
}
