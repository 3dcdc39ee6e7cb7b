//! Alert and recovery audit records

use crate::id::ulid_id;
use crate::journal::MetricsSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

ulid_id! {
    /// Unique alert identifier
    AlertId
}

/// Known alert kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    AutomatedRollback,
    RollbackFailed,
    HighErrorRate,
    LowDataIntegrity,
    ReconciliationBacklog,
    HealthDegraded,
}

impl AlertType {
    pub const ALL: [AlertType; 6] = [
        AlertType::AutomatedRollback,
        AlertType::RollbackFailed,
        AlertType::HighErrorRate,
        AlertType::LowDataIntegrity,
        AlertType::ReconciliationBacklog,
        AlertType::HealthDegraded,
    ];

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::AutomatedRollback => "AUTOMATED_ROLLBACK",
            AlertType::RollbackFailed => "ROLLBACK_FAILED",
            AlertType::HighErrorRate => "HIGH_ERROR_RATE",
            AlertType::LowDataIntegrity => "LOW_DATA_INTEGRITY",
            AlertType::ReconciliationBacklog => "RECONCILIATION_BACKLOG",
            AlertType::HealthDegraded => "HEALTH_DEGRADED",
        }
    }

    /// Critical alerts page someone
    #[inline]
    #[must_use]
    pub fn is_critical(&self) -> bool {
        matches!(self, AlertType::AutomatedRollback | AlertType::RollbackFailed)
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown alert type: '{s}'"))
    }
}

/// What gets sent over the notification channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotice {
    pub id: AlertId,
    pub alert_type: AlertType,
    pub trigger_reason: String,
    pub metrics_snapshot: Option<MetricsSnapshot>,
    pub automated: bool,
    pub raised_at: DateTime<Utc>,
}

impl AlertNotice {
    /// Create new notice stamped now
    #[must_use]
    pub fn new(alert_type: AlertType, trigger_reason: impl Into<String>, automated: bool) -> Self {
        Self {
            id: AlertId::new(),
            alert_type,
            trigger_reason: trigger_reason.into(),
            metrics_snapshot: None,
            automated,
            raised_at: Utc::now(),
        }
    }

    /// Attach the metrics that triggered the alert
    #[inline]
    #[must_use]
    pub fn with_metrics(mut self, snapshot: MetricsSnapshot) -> Self {
        self.metrics_snapshot = Some(snapshot);
        self
    }
}

/// Final notification delivery result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl DeliveryOutcome {
    #[inline]
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Persisted alert; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    #[serde(flatten)]
    pub notice: AlertNotice,
    pub delivery: DeliveryOutcome,
}

impl AlertRecord {
    #[inline]
    #[must_use]
    pub fn alert_type(&self) -> AlertType {
        self.notice.alert_type
    }

    #[inline]
    #[must_use]
    pub fn raised_at(&self) -> DateTime<Utc> {
        self.notice.raised_at
    }
}

/// Persisted recovery attempt; never mutated after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub id: AlertId,
    pub alert_type: AlertType,
    /// Short name of the corrective action
    pub action: String,
    pub automated: bool,
    pub resolved: bool,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}
