//! Error types for cutover core
//!
//! Component errors wrap the store errors they surface; [`MigrationError`]
//! is the umbrella returned across component boundaries. Only a primary
//! write failure is ever meant to reach an application user.

use cutover_store::{
    MigrationPhase, PhaseChangeInitiator, StateStoreError, StoreError, StoreSide,
};
use std::path::PathBuf;

/// Failure classes as seen by operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Authoritative write failed; surfaced to the caller
    PrimaryWrite,
    /// Non-authoritative write failed; absorbed and queued for reconciliation
    SecondaryWrite,
    /// One record could not be reconciled; skipped
    ReconciliationRecord,
    /// Metrics could not be collected; degraded sample returned
    MetricsCollection,
    /// Automated or manual rollback failed to commit
    RollbackExecution,
    /// Request was malformed or not permitted
    InvalidRequest,
    /// Shared state or configuration problem
    Infrastructure,
}

impl FailureKind {
    /// Metric/log label
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PrimaryWrite => "primary_write",
            FailureKind::SecondaryWrite => "secondary_write",
            FailureKind::ReconciliationRecord => "reconciliation_record",
            FailureKind::MetricsCollection => "metrics_collection",
            FailureKind::RollbackExecution => "rollback_execution",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::Infrastructure => "infrastructure",
        }
    }
}

/// Umbrella error for cutover operations
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("phase error: {0}")]
    Phase(#[from] PhaseError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("reconciliation error: {0}")]
    Reconciliation(#[from] ReconciliationError),

    #[error("alerting error: {0}")]
    Alerting(#[from] AlertingError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("state store error: {0}")]
    State(#[from] StateStoreError),
}

impl MigrationError {
    /// Classify the failure
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Gateway(GatewayError::PrimaryWriteFailed { .. }) => FailureKind::PrimaryWrite,
            Self::Gateway(GatewayError::MissingRecordId { .. }) => FailureKind::InvalidRequest,
            Self::Gateway(_) | Self::State(_) | Self::Config(_) => FailureKind::Infrastructure,
            Self::Phase(PhaseError::IllegalTransition { .. }) => FailureKind::InvalidRequest,
            Self::Phase(PhaseError::State(_)) => FailureKind::Infrastructure,
            Self::Reconciliation(_) => FailureKind::ReconciliationRecord,
            Self::Alerting(AlertingError::RollbackFailed { .. }) => FailureKind::RollbackExecution,
            Self::Alerting(AlertingError::UnknownAlertType(_)) => FailureKind::InvalidRequest,
            Self::Alerting(_) => FailureKind::Infrastructure,
        }
    }

    /// Whether the error may be shown to an application end user
    #[inline]
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        self.kind() == FailureKind::PrimaryWrite
    }
}

/// Phase controller errors
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    /// Transition not permitted for this initiator
    #[error("illegal phase transition {from} -> {to} by {initiator}")]
    IllegalTransition {
        from: MigrationPhase,
        to: MigrationPhase,
        initiator: PhaseChangeInitiator,
    },

    /// Phase row could not be read or written
    #[error(transparent)]
    State(#[from] StateStoreError),
}

/// Dual-write gateway errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Authoritative store rejected or failed the write
    #[error("primary write to {side} failed: {source}")]
    PrimaryWriteFailed {
        side: StoreSide,
        #[source]
        source: StoreError,
    },

    /// Read from the phase's read store failed
    #[error("read from {side} failed: {source}")]
    ReadFailed {
        side: StoreSide,
        #[source]
        source: StoreError,
    },

    /// Payload carries no usable record id
    #[error("payload for {entity_type}/{tenant_id} has no '{field}' field")]
    MissingRecordId {
        entity_type: String,
        tenant_id: String,
        field: &'static str,
    },

    /// Current phase could not be determined
    #[error(transparent)]
    Phase(#[from] PhaseError),
}

impl GatewayError {
    /// Check if a retry may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PrimaryWriteFailed { source, .. } | Self::ReadFailed { source, .. } => {
                source.is_retryable()
            }
            Self::MissingRecordId { .. } => false,
            Self::Phase(_) => true,
        }
    }
}

/// Reconciliation errors
///
/// `State` and `Phase` abort a whole pass; `Store` is per record.
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    State(#[from] StateStoreError),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// Alerting and recovery errors
#[derive(Debug, thiserror::Error)]
pub enum AlertingError {
    /// Rollback could not be committed
    #[error("rollback to {target} failed: {source}")]
    RollbackFailed {
        target: MigrationPhase,
        #[source]
        source: PhaseError,
    },

    /// Alert type name not recognised
    #[error("unknown alert type: {0}")]
    UnknownAlertType(String),

    #[error(transparent)]
    State(#[from] StateStoreError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    /// Create invalid-field error
    #[inline]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_primary_write_is_user_facing() {
        let primary: MigrationError = GatewayError::PrimaryWriteFailed {
            side: StoreSide::Legacy,
            source: StoreError::unavailable("legacy", "down"),
        }
        .into();
        assert!(primary.is_user_facing());
        assert_eq!(primary.kind(), FailureKind::PrimaryWrite);

        let illegal: MigrationError = PhaseError::IllegalTransition {
            from: MigrationPhase::LegacyOnly,
            to: MigrationPhase::NewOnly,
            initiator: PhaseChangeInitiator::Operator,
        }
        .into();
        assert!(!illegal.is_user_facing());
        assert_eq!(illegal.kind(), FailureKind::InvalidRequest);

        let rollback: MigrationError = AlertingError::RollbackFailed {
            target: MigrationPhase::DualWrite,
            source: PhaseError::State(StateStoreError::Unavailable("down".into())),
        }
        .into();
        assert_eq!(rollback.kind(), FailureKind::RollbackExecution);
    }

    #[test]
    fn illegal_transition_display() {
        let err = PhaseError::IllegalTransition {
            from: MigrationPhase::DualWrite,
            to: MigrationPhase::NewOnly,
            initiator: PhaseChangeInitiator::Operator,
        };
        assert_eq!(
            err.to_string(),
            "illegal phase transition DUAL_WRITE -> NEW_ONLY by operator"
        );
    }

    #[test]
    fn gateway_retryable_follows_store_error() {
        let err = GatewayError::PrimaryWriteFailed {
            side: StoreSide::Target,
            source: StoreError::rejected("target", "a/b/c", "constraint"),
        };
        assert!(!err.is_retryable());
    }
}
