//! Phase transition rules
//!
//! Operators advance exactly one step. Rollback initiators may jump to any
//! strictly earlier phase. Nothing moves a phase to itself.

use crate::error::PhaseError;
use cutover_store::{MigrationPhase, PhaseChangeInitiator};

/// Validates a phase transition for `initiator`.
pub fn validate_transition(
    from: MigrationPhase,
    to: MigrationPhase,
    initiator: PhaseChangeInitiator,
) -> Result<(), PhaseError> {
    if allowed_transitions(from, initiator).contains(&to) {
        Ok(())
    } else {
        Err(PhaseError::IllegalTransition {
            from,
            to,
            initiator,
        })
    }
}

/// Phases `initiator` may move to from `from`
#[must_use]
pub fn allowed_transitions(
    from: MigrationPhase,
    initiator: PhaseChangeInitiator,
) -> Vec<MigrationPhase> {
    if initiator.is_rollback() {
        from.earlier()
    } else {
        from.next().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn phase() -> impl Strategy<Value = MigrationPhase> {
        prop_oneof![
            Just(MigrationPhase::LegacyOnly),
            Just(MigrationPhase::DualWrite),
            Just(MigrationPhase::DualWriteReadNew),
            Just(MigrationPhase::NewOnly),
        ]
    }

    fn initiator() -> impl Strategy<Value = PhaseChangeInitiator> {
        prop_oneof![
            Just(PhaseChangeInitiator::Operator),
            Just(PhaseChangeInitiator::AutomatedRollback),
            Just(PhaseChangeInitiator::ManualRollback),
        ]
    }

    #[test]
    fn operator_path_is_linear() {
        use MigrationPhase::*;
        let op = PhaseChangeInitiator::Operator;
        assert!(validate_transition(LegacyOnly, DualWrite, op).is_ok());
        assert!(validate_transition(DualWrite, DualWriteReadNew, op).is_ok());
        assert!(validate_transition(DualWriteReadNew, NewOnly, op).is_ok());
        assert!(validate_transition(LegacyOnly, DualWriteReadNew, op).is_err());
        assert!(validate_transition(NewOnly, DualWrite, op).is_err());
        assert!(allowed_transitions(NewOnly, op).is_empty());
    }

    #[test]
    fn rollback_reaches_safe_fallback_from_later_phases() {
        for from in [MigrationPhase::DualWriteReadNew, MigrationPhase::NewOnly] {
            assert!(validate_transition(
                from,
                MigrationPhase::SAFE_FALLBACK,
                PhaseChangeInitiator::AutomatedRollback
            )
            .is_ok());
        }
        assert!(validate_transition(
            MigrationPhase::LegacyOnly,
            MigrationPhase::DualWrite,
            PhaseChangeInitiator::ManualRollback
        )
        .is_err());
    }

    proptest! {
        #[test]
        fn operator_moves_exactly_one_step(from in phase(), to in phase()) {
            let ok = validate_transition(from, to, PhaseChangeInitiator::Operator).is_ok();
            prop_assert_eq!(ok, to.rank() == from.rank() + 1);
        }

        #[test]
        fn rollbacks_only_move_backward(
            from in phase(),
            to in phase(),
            who in initiator().prop_filter("rollback", PhaseChangeInitiator::is_rollback),
        ) {
            let ok = validate_transition(from, to, who).is_ok();
            prop_assert_eq!(ok, to < from);
        }

        #[test]
        fn no_self_transitions(p in phase(), who in initiator()) {
            prop_assert!(validate_transition(p, p, who).is_err());
        }
    }
}
