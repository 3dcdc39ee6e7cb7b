//! Cross-store discrepancies and reconciliation pass summaries

use crate::id::ulid_id;
use crate::journal::percentage;
use crate::record::{RecordKey, StoreSide};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

ulid_id! {
    /// Unique discrepancy identifier
    DiscrepancyId
}

/// How the two copies of a record differ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Present in target only
    MissingInLegacy,
    /// Present in legacy only
    MissingInTarget,
    /// Present in both, compared fields differ
    FieldMismatch { fields: Vec<String> },
}

/// Key queued for reconciliation
///
/// `repair_from` names the store that acknowledged the latest write when the
/// other store missed it; sync copies from that side instead of the phase's
/// authoritative one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub key: RecordKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_from: Option<StoreSide>,
}

impl Candidate {
    /// Queued after the other store failed a write `side` accepted
    #[inline]
    #[must_use]
    pub fn failed_write(key: RecordKey, side: StoreSide) -> Self {
        Self {
            key,
            repair_from: Some(side),
        }
    }

    /// Queued for a retry with no preferred repair direction
    #[inline]
    #[must_use]
    pub fn retry(key: RecordKey) -> Self {
        Self {
            key,
            repair_from: None,
        }
    }
}

/// What the sync step did to close a discrepancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Legacy copy written over the target
    CopiedToTarget,
    /// Target copy written over legacy
    CopiedToLegacy,
    /// Re-fetch showed the stores already agree
    AlreadyConsistent,
}

impl ResolutionAction {
    /// Action that writes into `side`
    #[inline]
    #[must_use]
    pub fn copy_into(side: StoreSide) -> Self {
        match side {
            StoreSide::Legacy => ResolutionAction::CopiedToLegacy,
            StoreSide::Target => ResolutionAction::CopiedToTarget,
        }
    }

    /// Whether a store write was performed
    #[inline]
    #[must_use]
    pub fn is_correction(&self) -> bool {
        !matches!(self, ResolutionAction::AlreadyConsistent)
    }
}

/// A detected difference between the stores' copies of one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub id: DiscrepancyId,
    pub key: RecordKey,
    pub kind: DiscrepancyKind,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<ResolutionAction>,
    /// Copy source overriding phase authority, see [`Candidate`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_from: Option<StoreSide>,
}

impl Discrepancy {
    /// Create open discrepancy
    #[must_use]
    pub fn new(key: RecordKey, kind: DiscrepancyKind) -> Self {
        Self {
            id: DiscrepancyId::new(),
            key,
            kind,
            detected_at: Utc::now(),
            resolved_at: None,
            resolution: None,
            repair_from: None,
        }
    }

    /// Set the copy source for sync
    #[inline]
    #[must_use]
    pub fn with_repair_from(mut self, side: Option<StoreSide>) -> Self {
        self.repair_from = side;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    /// Close with the action taken
    pub fn resolve(&mut self, action: ResolutionAction, at: DateTime<Utc>) {
        self.resolved_at = Some(at);
        self.resolution = Some(action);
    }
}

/// Whether a pass walked recent changes or every record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Incremental,
    Full,
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationPass {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: ScanMode,
    /// Records fetched from both stores and compared
    pub checked: u64,
    pub consistent: u64,
    pub discrepancies: u64,
    /// Records skipped because a fetch failed
    pub errors: u64,
    /// Stopped early on the record or time budget
    pub budget_exhausted: bool,
}

impl ReconciliationPass {
    /// Percentage of checked records found consistent; 100 if none checked
    #[inline]
    #[must_use]
    pub fn integrity_score(&self) -> f64 {
        if self.checked == 0 {
            100.0
        } else {
            percentage(self.consistent, self.checked)
        }
    }
}
