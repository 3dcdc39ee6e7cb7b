//! Alerting and recovery controller
//!
//! Evaluates sustained health against the rollback thresholds, drives
//! automated rollback to the safe fallback phase, dispatches alerts and
//! runs recovery actions. Alerts and recovery attempts are append-only.

use crate::config::{CutoverConfig, RollbackThresholds};
use crate::error::{AlertingError, PhaseError};
use crate::notify::NotificationChannel;
use crate::phase::PhaseController;
use crate::reconcile::ReconciliationEngine;
use chrono::{DateTime, Utc};
use cutover_store::{
    AlertId, AlertNotice, AlertRecord, AlertType, DeliveryOutcome, MetricSample, MetricsSnapshot,
    MigrationPhase, PhaseAuditEntry, PhaseChange, PhaseChangeInitiator, RecoveryRecord,
    StateStore, StateStoreError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{error, info, warn};

/// Reason recorded on automated rollbacks
pub const ROLLBACK_REASON: &str = "SUSTAINED_ISSUES";

/// One threshold crossed by the rolling figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum ThresholdBreach {
    ErrorRate { average: f64, limit: f64 },
    DataIntegrity { average: f64, limit: f64 },
    FailureRate { rate: f64, limit: f64 },
}

impl fmt::Display for ThresholdBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ErrorRate { average, limit } => {
                write!(f, "average error rate {average:.2}% > {limit}%")
            }
            Self::DataIntegrity { average, limit } => {
                write!(f, "average data integrity {average:.2}% < {limit}%")
            }
            Self::FailureRate { rate, limit } => {
                write!(f, "failure rate {rate:.2}% > {limit}%")
            }
        }
    }
}

/// Thresholds crossed by `snapshot`
#[must_use]
pub fn evaluate(snapshot: &MetricsSnapshot, thresholds: &RollbackThresholds) -> Vec<ThresholdBreach> {
    let mut breaches = Vec::new();
    if snapshot.avg_error_rate > thresholds.max_error_rate {
        breaches.push(ThresholdBreach::ErrorRate {
            average: snapshot.avg_error_rate,
            limit: thresholds.max_error_rate,
        });
    }
    if snapshot.avg_data_integrity < thresholds.min_data_integrity {
        breaches.push(ThresholdBreach::DataIntegrity {
            average: snapshot.avg_data_integrity,
            limit: thresholds.min_data_integrity,
        });
    }
    if snapshot.failure_rate > thresholds.max_failure_rate {
        breaches.push(ThresholdBreach::FailureRate {
            rate: snapshot.failure_rate,
            limit: thresholds.max_failure_rate,
        });
    }
    breaches
}

/// Result of a rollback evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RollbackDecision {
    /// Too few samples to act on
    InsufficientSamples { have: usize, need: usize },
    /// No threshold crossed
    Healthy { snapshot: MetricsSnapshot },
    /// Phase moved back to the safe fallback
    RolledBack {
        change: PhaseChange,
        snapshot: MetricsSnapshot,
        breaches: Vec<ThresholdBreach>,
    },
    /// Thresholds crossed but the phase change failed
    RollbackFailed {
        error: String,
        snapshot: MetricsSnapshot,
        breaches: Vec<ThresholdBreach>,
    },
    /// Thresholds crossed while already at or before the safe fallback
    AlreadyAtSafePhase {
        phase: MigrationPhase,
        snapshot: MetricsSnapshot,
        breaches: Vec<ThresholdBreach>,
    },
}

impl RollbackDecision {
    #[inline]
    #[must_use]
    pub fn rolled_back(&self) -> bool {
        matches!(self, Self::RolledBack { .. })
    }
}

/// Phase already at or before the safe fallback when a rollback was refused
fn rolled_back_elsewhere(err: &PhaseError) -> Option<MigrationPhase> {
    match err {
        PhaseError::IllegalTransition { from, .. } if *from <= MigrationPhase::SAFE_FALLBACK => {
            Some(*from)
        }
        _ => None,
    }
}

/// Parse an alert type name from an operator request
pub fn parse_alert_type(name: &str) -> Result<AlertType, AlertingError> {
    name.parse()
        .map_err(|_| AlertingError::UnknownAlertType(name.to_string()))
}

/// Alerts raised since `since` with no later resolved recovery of the same type
pub async fn active_alerts(
    state: &dyn StateStore,
    since: DateTime<Utc>,
) -> Result<Vec<AlertRecord>, StateStoreError> {
    let alerts = state.alerts_since(since).await?;
    let recoveries = state.recoveries_since(since).await?;
    Ok(alerts
        .into_iter()
        .filter(|alert| {
            !recoveries.iter().any(|r| {
                r.resolved && r.alert_type == alert.alert_type() && r.created_at >= alert.raised_at()
            })
        })
        .collect())
}

/// Raises alerts, runs recoveries and decides on automated rollback
#[derive(Debug)]
pub struct AlertingController {
    state: Arc<dyn StateStore>,
    phases: Arc<PhaseController>,
    reconciler: Arc<ReconciliationEngine>,
    notifier: Arc<dyn NotificationChannel>,
    config: Arc<CutoverConfig>,
    phase_events: Mutex<broadcast::Receiver<PhaseChange>>,
}

impl AlertingController {
    #[must_use]
    pub fn new(
        state: Arc<dyn StateStore>,
        phases: Arc<PhaseController>,
        reconciler: Arc<ReconciliationEngine>,
        notifier: Arc<dyn NotificationChannel>,
        config: Arc<CutoverConfig>,
    ) -> Self {
        let phase_events = Mutex::new(phases.subscribe());
        Self {
            state,
            phases,
            reconciler,
            notifier,
            config,
            phase_events,
        }
    }

    /// Persist and dispatch an alert; never fails
    pub async fn trigger_alert(
        &self,
        alert_type: AlertType,
        trigger_reason: impl Into<String>,
        snapshot: Option<MetricsSnapshot>,
        automated: bool,
    ) -> AlertRecord {
        let mut notice = AlertNotice::new(alert_type, trigger_reason, automated);
        if let Some(snapshot) = snapshot {
            notice = notice.with_metrics(snapshot);
        }
        let delivery = self.dispatch(&notice).await;
        let record = AlertRecord { notice, delivery };
        if let Err(err) = self.state.append_alert(record.clone()).await {
            warn!(alert = %record.notice.id, error = %err, "failed to persist alert");
        }
        record
    }

    /// Send with `1 + notification_retries` attempts
    async fn dispatch(&self, notice: &AlertNotice) -> DeliveryOutcome {
        let attempts = 1 + self.config.alerting.notification_retries;
        let delay = self.config.notification_retry_delay();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.notifier.send_alert(notice).await {
                Ok(()) => return DeliveryOutcome::Delivered { attempts: attempt },
                Err(err) => {
                    warn!(
                        alert = %notice.id,
                        alert_type = %notice.alert_type,
                        attempt,
                        error = %err,
                        "alert delivery failed"
                    );
                    last_error = err.to_string();
                    if attempt < attempts && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        DeliveryOutcome::Failed {
            attempts,
            error: last_error,
        }
    }

    /// Run the corrective action for `alert_type`; true when it resolved the condition
    pub async fn attempt_automated_recovery(&self, alert_type: AlertType) -> bool {
        self.recover(alert_type, true).await.resolved
    }

    /// Run and record the corrective action for `alert_type`
    pub async fn recover(&self, alert_type: AlertType, automated: bool) -> RecoveryRecord {
        let (action, outcome) = match alert_type {
            AlertType::HighErrorRate | AlertType::LowDataIntegrity => {
                ("reconcile_and_sync", self.reconcile_and_sync().await)
            }
            AlertType::ReconciliationBacklog
            | AlertType::AutomatedRollback
            | AlertType::HealthDegraded => ("sync_backlog", self.sync_backlog().await),
            AlertType::RollbackFailed => (
                "none",
                Ok((false, "rollback failures need an operator".to_string())),
            ),
        };
        let (resolved, detail) = outcome.unwrap_or_else(|err| (false, err.to_string()));

        let record = RecoveryRecord {
            id: AlertId::new(),
            alert_type,
            action: action.to_string(),
            automated,
            resolved,
            detail,
            created_at: Utc::now(),
        };
        info!(
            alert_type = %alert_type,
            action,
            resolved,
            detail = %record.detail,
            "recovery attempted"
        );
        if let Err(err) = self.state.append_recovery(record.clone()).await {
            warn!(error = %err, "failed to persist recovery record");
        }
        record
    }

    async fn reconcile_and_sync(&self) -> Result<(bool, String), AlertingError> {
        let found = self.reconciler.perform_reconciliation().await?;
        let result = self.reconciler.sync_discrepancies(&found).await?;
        let open = self.state.open_discrepancy_count().await?;
        Ok((
            open == 0,
            format!(
                "checked {} discrepancies, corrected {}, {open} still open",
                found.len(),
                result.corrected
            ),
        ))
    }

    async fn sync_backlog(&self) -> Result<(bool, String), AlertingError> {
        let result = self
            .reconciler
            .sync_backlog(self.config.alerting.recovery_backlog_limit)
            .await?;
        let open = self.state.open_discrepancy_count().await?;
        Ok((
            open == 0,
            format!(
                "synced {} discrepancies, corrected {}, {open} still open",
                result.attempted, result.corrected
            ),
        ))
    }

    /// Roll back to the safe fallback when recent samples show sustained issues
    pub async fn check_automated_rollback_conditions(
        &self,
        recent_samples: &[MetricSample],
    ) -> RollbackDecision {
        let need = self.config.thresholds.min_samples;
        if recent_samples.len() < need {
            return RollbackDecision::InsufficientSamples {
                have: recent_samples.len(),
                need,
            };
        }

        let snapshot = MetricsSnapshot::from_samples(recent_samples);
        let breaches = evaluate(&snapshot, &self.config.thresholds);
        if breaches.is_empty() {
            return RollbackDecision::Healthy { snapshot };
        }
        let summary = breaches
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");

        let current = match self.phases.fresh().await {
            Ok(record) => Some(record.phase),
            Err(err) => {
                warn!(error = %err, "phase unavailable during rollback evaluation");
                None
            }
        };

        if let Some(phase) = current.filter(|p| *p <= MigrationPhase::SAFE_FALLBACK) {
            if !self.has_active(AlertType::HealthDegraded).await {
                self.trigger_alert(
                    AlertType::HealthDegraded,
                    format!("{summary} while in {phase}"),
                    Some(snapshot.clone()),
                    true,
                )
                .await;
            }
            return RollbackDecision::AlreadyAtSafePhase {
                phase,
                snapshot,
                breaches,
            };
        }

        warn!(reason = %summary, "sustained degradation, rolling back");
        match self
            .phases
            .set_phase(
                MigrationPhase::SAFE_FALLBACK,
                ROLLBACK_REASON,
                PhaseChangeInitiator::AutomatedRollback,
            )
            .await
        {
            Ok(change) => {
                metrics::counter!("cutover_rollbacks_total", "initiator" => "automated")
                    .increment(1);
                self.trigger_alert(
                    AlertType::AutomatedRollback,
                    ROLLBACK_REASON,
                    Some(snapshot.clone()),
                    true,
                )
                .await;
                RollbackDecision::RolledBack {
                    change,
                    snapshot,
                    breaches,
                }
            }
            Err(err) => {
                if let Some(phase) = rolled_back_elsewhere(&err) {
                    info!(%phase, "another instance already rolled back");
                    return RollbackDecision::AlreadyAtSafePhase {
                        phase,
                        snapshot,
                        breaches,
                    };
                }
                error!(error = %err, "automated rollback failed");
                self.trigger_alert(
                    AlertType::RollbackFailed,
                    format!("{ROLLBACK_REASON}: {err}"),
                    Some(snapshot.clone()),
                    true,
                )
                .await;
                RollbackDecision::RollbackFailed {
                    error: err.to_string(),
                    snapshot,
                    breaches,
                }
            }
        }
    }

    /// Operator-requested rollback, to the safe fallback unless `target` is given
    pub async fn manual_rollback(
        &self,
        target: Option<MigrationPhase>,
        reason: impl Into<String>,
    ) -> Result<PhaseChange, AlertingError> {
        let target = target.unwrap_or(MigrationPhase::SAFE_FALLBACK);
        let reason = reason.into();
        match self
            .phases
            .set_phase(target, reason.clone(), PhaseChangeInitiator::ManualRollback)
            .await
        {
            Ok(change) => {
                metrics::counter!("cutover_rollbacks_total", "initiator" => "manual").increment(1);
                Ok(change)
            }
            Err(err @ PhaseError::IllegalTransition { .. }) => Err(err.into()),
            Err(err) => {
                error!(%target, error = %err, "manual rollback failed");
                self.trigger_alert(
                    AlertType::RollbackFailed,
                    format!("{reason}: {err}"),
                    None,
                    false,
                )
                .await;
                Err(AlertingError::RollbackFailed {
                    target,
                    source: err,
                })
            }
        }
    }

    /// Drain committed phase changes into the audit log
    pub async fn record_phase_changes(&self) -> usize {
        let changes = self.drain_phase_events();
        let mut recorded = 0;
        for change in changes {
            let entry = PhaseAuditEntry {
                change,
                recorded_at: Utc::now(),
            };
            match self.state.append_phase_audit(entry).await {
                Ok(()) => recorded += 1,
                Err(err) => warn!(error = %err, "failed to record phase audit entry"),
            }
        }
        recorded
    }

    fn drain_phase_events(&self) -> Vec<PhaseChange> {
        let mut rx = self.phase_events.lock();
        let mut changes = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(change) => changes.push(change),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "phase audit fell behind, events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        changes
    }

    /// Alerts still awaiting a resolving recovery
    pub async fn active_alerts(&self) -> Result<Vec<AlertRecord>, StateStoreError> {
        active_alerts(
            self.state.as_ref(),
            Utc::now() - self.config.alert_active_window(),
        )
        .await
    }

    async fn has_active(&self, alert_type: AlertType) -> bool {
        self.active_alerts()
            .await
            .map(|alerts| alerts.iter().any(|a| a.alert_type() == alert_type))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockNotificationChannel;
    use cutover_store::{MemoryRecordStore, MemoryStateStore, NotificationError};
    use std::time::Duration;

    struct Fixture {
        state: Arc<MemoryStateStore>,
        phases: Arc<PhaseController>,
        alerting: AlertingController,
    }

    async fn fixture(notifier: MockNotificationChannel, phase: MigrationPhase) -> Fixture {
        let config = Arc::new(
            CutoverConfig::new()
                .with_min_samples(3)
                .with_notification_retries(2, Duration::ZERO),
        );
        let state = Arc::new(MemoryStateStore::new());
        let phases = Arc::new(PhaseController::new(
            state.clone(),
            Duration::from_secs(60),
            16,
        ));
        let reconciler = Arc::new(ReconciliationEngine::new(
            Arc::new(MemoryRecordStore::new("legacy")),
            Arc::new(MemoryRecordStore::new("target")),
            state.clone(),
            phases.clone(),
            config.clone(),
        ));
        let alerting = AlertingController::new(
            state.clone(),
            phases.clone(),
            reconciler,
            Arc::new(notifier),
            config,
        );
        while phases.get_phase().await.unwrap() < phase {
            let next = phases.get_phase().await.unwrap().next().unwrap();
            phases
                .set_phase(next, "test", PhaseChangeInitiator::Operator)
                .await
                .unwrap();
        }
        Fixture {
            state,
            phases,
            alerting,
        }
    }

    fn delivering() -> MockNotificationChannel {
        let mut mock = MockNotificationChannel::new();
        mock.expect_send_alert().returning(|_| Ok(()));
        mock
    }

    fn samples(n: usize, successes: u64, failures: u64) -> Vec<MetricSample> {
        let now = Utc::now();
        (0..n)
            .map(|_| {
                MetricSample::new(now, now, successes, failures, 100.0, MigrationPhase::NewOnly)
            })
            .collect()
    }

    #[tokio::test]
    async fn too_few_samples_never_act() {
        let f = fixture(MockNotificationChannel::new(), MigrationPhase::NewOnly).await;
        let decision = f
            .alerting
            .check_automated_rollback_conditions(&samples(2, 0, 100))
            .await;
        assert_eq!(
            decision,
            RollbackDecision::InsufficientSamples { have: 2, need: 3 }
        );
        assert_eq!(f.phases.get_phase().await.unwrap(), MigrationPhase::NewOnly);
    }

    #[tokio::test]
    async fn healthy_samples_keep_phase() {
        let f = fixture(MockNotificationChannel::new(), MigrationPhase::NewOnly).await;
        let decision = f
            .alerting
            .check_automated_rollback_conditions(&samples(5, 100, 1))
            .await;
        assert!(matches!(decision, RollbackDecision::Healthy { .. }));
    }

    #[tokio::test]
    async fn breach_rolls_back_and_alerts() {
        let f = fixture(delivering(), MigrationPhase::NewOnly).await;
        let decision = f
            .alerting
            .check_automated_rollback_conditions(&samples(5, 90, 10))
            .await;
        assert!(decision.rolled_back());
        assert_eq!(
            f.phases.get_phase().await.unwrap(),
            MigrationPhase::DualWrite
        );

        let alerts = f.state.all_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type(), AlertType::AutomatedRollback);
        assert_eq!(alerts[0].notice.trigger_reason, ROLLBACK_REASON);
        assert!(alerts[0].notice.metrics_snapshot.is_some());
    }

    #[tokio::test]
    async fn breach_at_safe_phase_raises_health_degraded_once() {
        let f = fixture(delivering(), MigrationPhase::DualWrite).await;
        for _ in 0..2 {
            let decision = f
                .alerting
                .check_automated_rollback_conditions(&samples(5, 50, 50))
                .await;
            assert!(matches!(
                decision,
                RollbackDecision::AlreadyAtSafePhase { .. }
            ));
        }
        let alerts = f.state.all_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type(), AlertType::HealthDegraded);
        assert_eq!(
            f.phases.get_phase().await.unwrap(),
            MigrationPhase::DualWrite
        );
    }

    #[tokio::test]
    async fn failed_rollback_still_alerts() {
        let mut mock = MockNotificationChannel::new();
        mock.expect_send_alert()
            .withf(|notice| notice.alert_type == AlertType::RollbackFailed && notice.automated)
            .times(1)
            .returning(|_| Ok(()));
        let f = fixture(mock, MigrationPhase::NewOnly).await;
        f.state.simulate_outage(true);
        let decision = f
            .alerting
            .check_automated_rollback_conditions(&samples(5, 0, 10))
            .await;
        f.state.simulate_outage(false);

        assert!(matches!(decision, RollbackDecision::RollbackFailed { .. }));
        assert_eq!(f.phases.get_phase().await.unwrap(), MigrationPhase::NewOnly);
    }

    #[test]
    fn refused_rollback_after_concurrent_rollback_is_not_a_failure() {
        let raced = PhaseError::IllegalTransition {
            from: MigrationPhase::DualWrite,
            to: MigrationPhase::SAFE_FALLBACK,
            initiator: PhaseChangeInitiator::AutomatedRollback,
        };
        assert_eq!(rolled_back_elsewhere(&raced), Some(MigrationPhase::DualWrite));

        let refused = PhaseError::IllegalTransition {
            from: MigrationPhase::NewOnly,
            to: MigrationPhase::SAFE_FALLBACK,
            initiator: PhaseChangeInitiator::Operator,
        };
        assert_eq!(rolled_back_elsewhere(&refused), None);

        let outage = PhaseError::State(StateStoreError::Unavailable("down".into()));
        assert_eq!(rolled_back_elsewhere(&outage), None);
    }

    #[tokio::test]
    async fn notification_is_retried_then_recorded_as_failed() {
        let mut mock = MockNotificationChannel::new();
        mock.expect_send_alert()
            .times(3)
            .returning(|_| Err(NotificationError::Transport("refused".into())));
        let f = fixture(mock, MigrationPhase::LegacyOnly).await;

        let record = f
            .alerting
            .trigger_alert(AlertType::HighErrorRate, "7%", None, false)
            .await;
        assert_eq!(
            record.delivery,
            DeliveryOutcome::Failed {
                attempts: 3,
                error: "notification transport failed: refused".to_string()
            }
        );
        assert_eq!(f.state.all_alerts().len(), 1);
    }

    #[tokio::test]
    async fn second_attempt_delivers() {
        let mut mock = MockNotificationChannel::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_send_alert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(NotificationError::Rejected { status: 503, body: String::new() }));
        mock.expect_send_alert()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let f = fixture(mock, MigrationPhase::LegacyOnly).await;

        let record = f
            .alerting
            .trigger_alert(AlertType::ReconciliationBacklog, "backlog", None, true)
            .await;
        assert_eq!(record.delivery, DeliveryOutcome::Delivered { attempts: 2 });
    }

    #[tokio::test]
    async fn recovery_with_nothing_outstanding_succeeds() {
        let f = fixture(MockNotificationChannel::new(), MigrationPhase::DualWrite).await;
        assert!(
            f.alerting
                .attempt_automated_recovery(AlertType::ReconciliationBacklog)
                .await
        );
        assert!(
            !f.alerting
                .attempt_automated_recovery(AlertType::RollbackFailed)
                .await
        );
    }

    #[tokio::test]
    async fn resolved_recovery_clears_active_alert() {
        let f = fixture(delivering(), MigrationPhase::DualWrite).await;
        f.alerting
            .trigger_alert(AlertType::LowDataIntegrity, "97%", None, true)
            .await;
        assert_eq!(f.alerting.active_alerts().await.unwrap().len(), 1);

        let record = f.alerting.recover(AlertType::LowDataIntegrity, false).await;
        assert!(record.resolved);
        assert!(f.alerting.active_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_rollback_defaults_to_safe_fallback() {
        let f = fixture(MockNotificationChannel::new(), MigrationPhase::NewOnly).await;
        let change = f.alerting.manual_rollback(None, "operator call").await.unwrap();
        assert_eq!(change.to, MigrationPhase::DualWrite);
        assert_eq!(change.initiator, PhaseChangeInitiator::ManualRollback);

        let err = f
            .alerting
            .manual_rollback(Some(MigrationPhase::NewOnly), "forward")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AlertingError::Phase(PhaseError::IllegalTransition { .. })
        ));
    }

    #[tokio::test]
    async fn phase_changes_are_audited() {
        let f = fixture(MockNotificationChannel::new(), MigrationPhase::DualWriteReadNew).await;
        assert_eq!(f.alerting.record_phase_changes().await, 2);
        assert_eq!(f.alerting.record_phase_changes().await, 0);

        let audit = f.state.phase_audit(10).await.unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[1].change.to, MigrationPhase::DualWriteReadNew);
    }

    #[test]
    fn evaluate_reports_each_breach() {
        let snapshot = MetricsSnapshot {
            sample_count: 12,
            avg_error_rate: 6.0,
            avg_data_integrity: 97.0,
            failure_rate: 4.0,
            total_operations: 1000,
            failed_operations: 40,
        };
        let breaches = evaluate(&snapshot, &RollbackThresholds::default());
        assert_eq!(breaches.len(), 3);
        assert_eq!(
            breaches[2].to_string(),
            "failure rate 4.00% > 3%"
        );
    }
}
