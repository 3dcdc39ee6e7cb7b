//! Migration phases and the persisted phase row
//!
//! The phase set is totally ordered:
//! `LEGACY_ONLY < DUAL_WRITE < DUAL_WRITE_READ_NEW < NEW_ONLY`.
//! Forward movement is one step at a time; rollback may jump to any
//! strictly earlier phase.

use crate::record::StoreSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cutover stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationPhase {
    /// Legacy store only
    LegacyOnly,
    /// Writes go to both stores, reads from legacy
    DualWrite,
    /// Writes go to both stores, reads from target
    DualWriteReadNew,
    /// Target store only
    NewOnly,
}

impl MigrationPhase {
    /// All phases in forward order
    pub const ALL: [MigrationPhase; 4] = [
        MigrationPhase::LegacyOnly,
        MigrationPhase::DualWrite,
        MigrationPhase::DualWriteReadNew,
        MigrationPhase::NewOnly,
    ];

    /// Designated fallback for rollbacks
    pub const SAFE_FALLBACK: MigrationPhase = MigrationPhase::DualWrite;

    /// Numeric rank (0-3)
    #[inline]
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            MigrationPhase::LegacyOnly => 0,
            MigrationPhase::DualWrite => 1,
            MigrationPhase::DualWriteReadNew => 2,
            MigrationPhase::NewOnly => 3,
        }
    }

    /// The single forward step, if any
    #[inline]
    #[must_use]
    pub fn next(&self) -> Option<MigrationPhase> {
        match self {
            MigrationPhase::LegacyOnly => Some(MigrationPhase::DualWrite),
            MigrationPhase::DualWrite => Some(MigrationPhase::DualWriteReadNew),
            MigrationPhase::DualWriteReadNew => Some(MigrationPhase::NewOnly),
            MigrationPhase::NewOnly => None,
        }
    }

    /// Phases strictly earlier than this one
    #[must_use]
    pub fn earlier(&self) -> Vec<MigrationPhase> {
        Self::ALL.into_iter().filter(|p| p < self).collect()
    }

    /// Whether writes must attempt both stores
    #[inline]
    #[must_use]
    pub fn is_dual_write(&self) -> bool {
        matches!(
            self,
            MigrationPhase::DualWrite | MigrationPhase::DualWriteReadNew
        )
    }

    /// Store that receives the synchronous, fatal-on-failure write
    #[inline]
    #[must_use]
    pub fn primary_write_side(&self) -> StoreSide {
        match self {
            MigrationPhase::NewOnly => StoreSide::Target,
            _ => StoreSide::Legacy,
        }
    }

    /// Store that receives the best-effort write, if any
    #[inline]
    #[must_use]
    pub fn secondary_write_side(&self) -> Option<StoreSide> {
        self.is_dual_write().then_some(StoreSide::Target)
    }

    /// Store that serves reads
    #[inline]
    #[must_use]
    pub fn read_side(&self) -> StoreSide {
        match self {
            MigrationPhase::LegacyOnly | MigrationPhase::DualWrite => StoreSide::Legacy,
            MigrationPhase::DualWriteReadNew | MigrationPhase::NewOnly => StoreSide::Target,
        }
    }

    /// Store that wins during reconciliation
    ///
    /// Legacy stays authoritative until reads move to the target store.
    #[inline]
    #[must_use]
    pub fn authoritative_side(&self) -> StoreSide {
        if *self < MigrationPhase::DualWriteReadNew {
            StoreSide::Legacy
        } else {
            StoreSide::Target
        }
    }

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::LegacyOnly => "LEGACY_ONLY",
            MigrationPhase::DualWrite => "DUAL_WRITE",
            MigrationPhase::DualWriteReadNew => "DUAL_WRITE_READ_NEW",
            MigrationPhase::NewOnly => "NEW_ONLY",
        }
    }
}

impl Default for MigrationPhase {
    fn default() -> Self {
        MigrationPhase::LegacyOnly
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown migration phase: '{s}'"))
    }
}

/// Who asked for a phase change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseChangeInitiator {
    /// Human operator advancing the cutover
    Operator,
    /// Alerting controller reacting to sustained degradation
    AutomatedRollback,
    /// Operator-requested rollback through the recovery controller
    ManualRollback,
}

impl PhaseChangeInitiator {
    /// Whether this initiator moves phases backward
    #[inline]
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        !matches!(self, PhaseChangeInitiator::Operator)
    }
}

impl fmt::Display for PhaseChangeInitiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseChangeInitiator::Operator => "operator",
            PhaseChangeInitiator::AutomatedRollback => "automated_rollback",
            PhaseChangeInitiator::ManualRollback => "manual_rollback",
        };
        f.write_str(s)
    }
}

/// The single persisted phase row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: MigrationPhase,
    /// Incremented on every committed change; 0 for the implicit initial row
    pub version: u64,
    pub reason: String,
    pub changed_by: PhaseChangeInitiator,
    pub changed_at: DateTime<Utc>,
}

impl PhaseRecord {
    /// Implicit row used when nothing has been persisted yet
    #[must_use]
    pub fn initial() -> Self {
        Self {
            phase: MigrationPhase::LegacyOnly,
            version: 0,
            reason: "initial".to_string(),
            changed_by: PhaseChangeInitiator::Operator,
            changed_at: DateTime::<Utc>::default(),
        }
    }

    /// Successor row for a committed change
    #[must_use]
    pub fn successor(
        &self,
        phase: MigrationPhase,
        reason: impl Into<String>,
        changed_by: PhaseChangeInitiator,
    ) -> Self {
        Self {
            phase,
            version: self.version + 1,
            reason: reason.into(),
            changed_by,
            changed_at: Utc::now(),
        }
    }
}

/// Event broadcast after a phase change commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub from: MigrationPhase,
    pub to: MigrationPhase,
    pub reason: String,
    pub initiator: PhaseChangeInitiator,
    pub version: u64,
    pub at: DateTime<Utc>,
}

impl PhaseChange {
    /// Whether the change moved backward
    #[inline]
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        self.to < self.from
    }
}

/// Audit log entry written by the alerting controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAuditEntry {
    #[serde(flatten)]
    pub change: PhaseChange,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_totally_ordered() {
        assert!(MigrationPhase::LegacyOnly < MigrationPhase::DualWrite);
        assert!(MigrationPhase::DualWrite < MigrationPhase::DualWriteReadNew);
        assert!(MigrationPhase::DualWriteReadNew < MigrationPhase::NewOnly);
    }

    #[test]
    fn read_side_shifts_before_write_authority() {
        let p = MigrationPhase::DualWriteReadNew;
        assert_eq!(p.read_side(), StoreSide::Target);
        assert_eq!(p.primary_write_side(), StoreSide::Legacy);
        assert_eq!(p.secondary_write_side(), Some(StoreSide::Target));
    }

    #[test]
    fn authoritative_side_switches_at_read_new() {
        assert_eq!(MigrationPhase::DualWrite.authoritative_side(), StoreSide::Legacy);
        assert_eq!(MigrationPhase::DualWriteReadNew.authoritative_side(), StoreSide::Target);
        assert_eq!(MigrationPhase::NewOnly.authoritative_side(), StoreSide::Target);
    }

    #[test]
    fn single_store_phases_have_no_secondary() {
        assert_eq!(MigrationPhase::LegacyOnly.secondary_write_side(), None);
        assert_eq!(MigrationPhase::NewOnly.secondary_write_side(), None);
        assert_eq!(MigrationPhase::NewOnly.primary_write_side(), StoreSide::Target);
    }

    #[test]
    fn wire_names_roundtrip_through_serde_and_from_str() {
        for phase in MigrationPhase::ALL {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase.as_str()));
            assert_eq!(phase.as_str().parse::<MigrationPhase>().unwrap(), phase);
        }
        assert!("SIDEWAYS".parse::<MigrationPhase>().is_err());
    }

    #[test]
    fn earlier_lists_strict_predecessors() {
        assert!(MigrationPhase::LegacyOnly.earlier().is_empty());
        assert_eq!(
            MigrationPhase::DualWriteReadNew.earlier(),
            vec![MigrationPhase::LegacyOnly, MigrationPhase::DualWrite]
        );
    }

    #[test]
    fn successor_bumps_version() {
        let initial = PhaseRecord::initial();
        let next = initial.successor(
            MigrationPhase::DualWrite,
            "start dual write",
            PhaseChangeInitiator::Operator,
        );
        assert_eq!(next.version, 1);
        assert_eq!(next.phase, MigrationPhase::DualWrite);
    }
}
