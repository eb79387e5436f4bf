use super::errors::{BlockOperationError, ExitInvalid};
use super::signature_sets::exit_signature_set;
use crate::arith::SafeArith;
use crate::beacon_state::BeaconState;
use crate::crypto::{SignatureVerifier, VerifySignatures};
use crate::operations::SignedVoluntaryExit;
use crate::slot_epoch::Epoch;
use crate::spec::{EthSpec, Spec};

type Result<T> = std::result::Result<T, BlockOperationError<ExitInvalid>>;

fn error(reason: ExitInvalid) -> BlockOperationError<ExitInvalid> {
    BlockOperationError::invalid(reason)
}

/// Indicates if an `Exit` is valid to be included in a block in the current epoch of the given
/// state.
///
/// Returns `Ok(())` if the `Exit` is valid, otherwise indicates the reason for invalidity.
pub fn verify_exit<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &BeaconState<E>,
    current_epoch: Option<Epoch>,
    signed_exit: &SignedVoluntaryExit,
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
) -> Result<()> {
    let current_epoch = current_epoch.unwrap_or_else(|| state.current_epoch());
    let exit = &signed_exit.message;

    let validator = state
        .validators
        .get(exit.validator_index as usize)
        .ok_or_else(|| error(ExitInvalid::ValidatorUnknown(exit.validator_index)))?;

    // Verify the validator is active.
    verify!(validator.is_active_at(current_epoch), ExitInvalid::NotActive(exit.validator_index));

    // Verify that the validator has not yet exited.
    verify!(
        validator.exit_epoch == spec.far_future_epoch,
        ExitInvalid::AlreadyExited(exit.validator_index)
    );

    // Exits must specify an epoch when they become valid; they are not valid before then.
    verify!(
        current_epoch >= exit.epoch,
        ExitInvalid::FutureEpoch { state: current_epoch, exit: exit.epoch }
    );

    // Verify the validator has been active long enough.
    let earliest_exit_epoch = validator.activation_epoch.safe_add(spec.shard_committee_period)?;
    verify!(
        current_epoch >= earliest_exit_epoch,
        ExitInvalid::TooYoungToExit { current_epoch, earliest_exit_epoch }
    );

    if verify_signatures.is_true() {
        verify!(
            exit_signature_set(state, signed_exit, spec)?.verify(verifier),
            ExitInvalid::BadSignature
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SignatureBytes;
    use crate::operations::VoluntaryExit;
    use crate::test_utils::{genesis_state, AcceptAll, RejectAll};
    use crate::MinimalEthSpec;
    use assert_matches::assert_matches;

    type E = MinimalEthSpec;

    fn exit(validator_index: u64, epoch: u64) -> SignedVoluntaryExit {
        SignedVoluntaryExit {
            message: VoluntaryExit { epoch: Epoch::new(epoch), validator_index },
            signature: SignatureBytes::empty(),
        }
    }

    #[test]
    fn exit_rules() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(8, &spec);
        let old_enough = Epoch::new(spec.shard_committee_period);
        let check = |state: &BeaconState<E>, e: &SignedVoluntaryExit, epoch: Epoch| {
            verify_exit(state, Some(epoch), e, VerifySignatures::True, &AcceptAll, &spec)
        };

        assert!(check(&state, &exit(1, 0), old_enough).is_ok());
        assert_matches!(
            check(&state, &exit(9, 0), old_enough),
            Err(BlockOperationError::Invalid(ExitInvalid::ValidatorUnknown(9)))
        );
        assert_matches!(
            check(&state, &exit(1, old_enough.as_u64() + 1), old_enough),
            Err(BlockOperationError::Invalid(ExitInvalid::FutureEpoch { .. }))
        );
        assert_matches!(
            check(&state, &exit(1, 0), Epoch::new(1)),
            Err(BlockOperationError::Invalid(ExitInvalid::TooYoungToExit { .. }))
        );

        state.validators[1].exit_epoch = Epoch::new(500);
        assert_matches!(
            check(&state, &exit(1, 0), old_enough),
            Err(BlockOperationError::Invalid(ExitInvalid::AlreadyExited(1)))
        );

        state.validators[2].activation_epoch = spec.far_future_epoch;
        assert_matches!(
            check(&state, &exit(2, 0), old_enough),
            Err(BlockOperationError::Invalid(ExitInvalid::NotActive(2)))
        );
    }

    #[test]
    fn bad_signature_rejected() {
        let spec = Spec::minimal();
        let state = genesis_state::<E>(8, &spec);
        let old_enough = Some(Epoch::new(spec.shard_committee_period));
        assert_matches!(
            verify_exit(&state, old_enough, &exit(1, 0), VerifySignatures::True, &RejectAll, &spec),
            Err(BlockOperationError::Invalid(ExitInvalid::BadSignature))
        );
        assert!(verify_exit(&state, old_enough, &exit(1, 0), VerifySignatures::False, &RejectAll, &spec).is_ok());
    }
}
