//! Append-only write journal and health samples

use crate::id::ulid_id;
use crate::phase::MigrationPhase;
use crate::record::{RecordKey, StoreSide};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

ulid_id! {
    /// Unique dual-write operation identifier
    OperationId
}

ulid_id! {
    /// Unique metric sample identifier
    SampleId
}

/// Result of one store write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreOutcome {
    Succeeded,
    Failed { error: String },
}

impl StoreOutcome {
    /// Create failed outcome
    #[inline]
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, StoreOutcome::Succeeded)
    }
}

/// One attempted write, recorded regardless of outcome
///
/// `None` for a side means the phase did not route the write there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualWriteOperation {
    pub id: OperationId,
    pub key: RecordKey,
    pub phase: MigrationPhase,
    pub legacy: Option<StoreOutcome>,
    pub target: Option<StoreOutcome>,
    /// When the write was attempted
    pub started_at: DateTime<Utc>,
    /// When the operation was journaled; stamped by the state store
    pub recorded_at: DateTime<Utc>,
}

impl DualWriteOperation {
    /// Create new operation record stamped now
    #[must_use]
    pub fn new(key: RecordKey, phase: MigrationPhase) -> Self {
        let now = Utc::now();
        Self {
            id: OperationId::new(),
            key,
            phase,
            legacy: None,
            target: None,
            started_at: now,
            recorded_at: now,
        }
    }

    /// Set the outcome for one side
    #[inline]
    #[must_use]
    pub fn with_outcome(mut self, side: StoreSide, outcome: StoreOutcome) -> Self {
        match side {
            StoreSide::Legacy => self.legacy = Some(outcome),
            StoreSide::Target => self.target = Some(outcome),
        }
        self
    }

    /// Outcome for one side
    #[inline]
    #[must_use]
    pub fn outcome(&self, side: StoreSide) -> Option<&StoreOutcome> {
        match side {
            StoreSide::Legacy => self.legacy.as_ref(),
            StoreSide::Target => self.target.as_ref(),
        }
    }

    /// True when every attempted store succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        [&self.legacy, &self.target]
            .into_iter()
            .flatten()
            .all(StoreOutcome::is_success)
    }
}

/// Health sample for one collection window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: SampleId,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub success_count: u64,
    pub failure_count: u64,
    /// `failures / (successes + failures) * 100`, 0 for an empty window
    pub error_rate: f64,
    /// Percentage of records found consistent by the latest reconciliation pass
    pub data_integrity_score: f64,
    pub phase: MigrationPhase,
}

impl MetricSample {
    /// Build a sample, deriving the error rate from the counts
    #[must_use]
    pub fn new(
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        success_count: u64,
        failure_count: u64,
        data_integrity_score: f64,
        phase: MigrationPhase,
    ) -> Self {
        Self {
            id: SampleId::new(),
            window_start,
            window_end,
            success_count,
            failure_count,
            error_rate: percentage(failure_count, success_count + failure_count),
            data_integrity_score,
            phase,
        }
    }

    #[inline]
    #[must_use]
    pub fn total_operations(&self) -> u64 {
        self.success_count + self.failure_count
    }
}

/// `part / whole * 100`, or 0 when `whole` is 0
#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Rolling figures over a window of samples
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub sample_count: usize,
    pub avg_error_rate: f64,
    pub avg_data_integrity: f64,
    /// Aggregate failed / total operations across the window, percent
    pub failure_rate: f64,
    pub total_operations: u64,
    pub failed_operations: u64,
}

impl MetricsSnapshot {
    /// Compute rolling averages and the aggregate failure rate
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_samples(samples: &[MetricSample]) -> Self {
        if samples.is_empty() {
            return Self {
                avg_data_integrity: 100.0,
                ..Self::default()
            };
        }

        let n = samples.len() as f64;
        let total_operations: u64 = samples.iter().map(MetricSample::total_operations).sum();
        let failed_operations: u64 = samples.iter().map(|s| s.failure_count).sum();

        Self {
            sample_count: samples.len(),
            avg_error_rate: samples.iter().map(|s| s.error_rate).sum::<f64>() / n,
            avg_data_integrity: samples.iter().map(|s| s.data_integrity_score).sum::<f64>() / n,
            failure_rate: percentage(failed_operations, total_operations),
            total_operations,
            failed_operations,
        }
    }
}
