use super::errors::{BlockOperationError, ProposerSlashingInvalid as Invalid};
use super::signature_sets::proposer_slashing_signature_set;
use crate::beacon_state::BeaconState;
use crate::crypto::{SignatureVerifier, VerifySignatures};
use crate::operations::ProposerSlashing;
use crate::spec::{EthSpec, Spec};

type Result<T> = std::result::Result<T, BlockOperationError<Invalid>>;

fn error(reason: Invalid) -> BlockOperationError<Invalid> {
    BlockOperationError::invalid(reason)
}

/// Indicates if a `ProposerSlashing` is valid to be included in a block in the current epoch of
/// the given state.
///
/// Returns `Ok(())` if the `ProposerSlashing` is valid, otherwise indicates the reason for
/// invalidity.
pub fn verify_proposer_slashing<E: EthSpec, V: SignatureVerifier + ?Sized>(
    proposer_slashing: &ProposerSlashing,
    state: &BeaconState<E>,
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
) -> Result<()> {
    let header_1 = &proposer_slashing.signed_header_1.message;
    let header_2 = &proposer_slashing.signed_header_2.message;

    // Verify slots match
    verify!(header_1.slot == header_2.slot, Invalid::ProposalSlotMismatch(header_1.slot, header_2.slot));

    // Verify header proposer indices match
    verify!(
        header_1.proposer_index == header_2.proposer_index,
        Invalid::ProposerIndexMismatch(header_1.proposer_index, header_2.proposer_index)
    );

    // But the headers are different
    verify!(header_1 != header_2, Invalid::ProposalsIdentical);

    // Check proposer is slashable
    let proposer = state
        .validators
        .get(header_1.proposer_index as usize)
        .ok_or_else(|| error(Invalid::ProposerUnknown(header_1.proposer_index)))?;

    verify!(
        proposer.is_slashable_at(state.current_epoch()),
        Invalid::ProposerNotSlashable(header_1.proposer_index)
    );

    if verify_signatures.is_true() {
        let (signature_set_1, signature_set_2) =
            proposer_slashing_signature_set(state, proposer_slashing, spec)?;
        verify!(signature_set_1.verify(verifier), Invalid::BadProposal1Signature);
        verify!(signature_set_2.verify(verifier), Invalid::BadProposal2Signature);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon_block::{BeaconBlockHeader, SignedBeaconBlockHeader};
    use crate::crypto::SignatureBytes;
    use crate::slot_epoch::Slot;
    use crate::test_utils::{genesis_state, AcceptAll, RejectAll};
    use crate::{Hash256, MinimalEthSpec};
    use assert_matches::assert_matches;

    type E = MinimalEthSpec;

    fn signed(slot: u64, proposer_index: u64, body: u8) -> SignedBeaconBlockHeader {
        SignedBeaconBlockHeader {
            message: BeaconBlockHeader {
                slot: Slot::new(slot),
                proposer_index,
                body_root: Hash256::repeat_byte(body),
                ..Default::default()
            },
            signature: SignatureBytes::empty(),
        }
    }

    fn slashing(h1: SignedBeaconBlockHeader, h2: SignedBeaconBlockHeader) -> ProposerSlashing {
        ProposerSlashing { signed_header_1: h1, signed_header_2: h2 }
    }

    #[test]
    fn conflicting_headers_are_slashable() {
        let spec = Spec::minimal();
        let state = genesis_state::<E>(8, &spec);
        let s = slashing(signed(0, 3, 1), signed(0, 3, 2));
        assert!(verify_proposer_slashing(&s, &state, VerifySignatures::True, &AcceptAll, &spec).is_ok());
        assert_matches!(
            verify_proposer_slashing(&s, &state, VerifySignatures::True, &RejectAll, &spec),
            Err(BlockOperationError::Invalid(Invalid::BadProposal1Signature))
        );
    }

    #[test]
    fn structural_checks() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(8, &spec);
        let check = |state: &BeaconState<E>, s: &ProposerSlashing| {
            verify_proposer_slashing(s, state, VerifySignatures::False, &AcceptAll, &spec)
        };

        assert_matches!(
            check(&state, &slashing(signed(0, 3, 1), signed(1, 3, 2))),
            Err(BlockOperationError::Invalid(Invalid::ProposalSlotMismatch(_, _)))
        );
        assert_matches!(
            check(&state, &slashing(signed(0, 3, 1), signed(0, 4, 2))),
            Err(BlockOperationError::Invalid(Invalid::ProposerIndexMismatch(3, 4)))
        );
        assert_matches!(
            check(&state, &slashing(signed(0, 3, 1), signed(0, 3, 1))),
            Err(BlockOperationError::Invalid(Invalid::ProposalsIdentical))
        );
        assert_matches!(
            check(&state, &slashing(signed(0, 30, 1), signed(0, 30, 2))),
            Err(BlockOperationError::Invalid(Invalid::ProposerUnknown(30)))
        );

        state.validators[3].slashed = true;
        assert_matches!(
            check(&state, &slashing(signed(0, 3, 1), signed(0, 3, 2))),
            Err(BlockOperationError::Invalid(Invalid::ProposerNotSlashable(3)))
        );
    }
}
