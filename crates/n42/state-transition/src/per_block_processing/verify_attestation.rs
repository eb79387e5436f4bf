use super::errors::{AttestationInvalid as Invalid, BlockOperationError};
use super::is_valid_indexed_attestation::is_valid_indexed_attestation;
use crate::arith::SafeArith;
use crate::attestation::{Attestation, IndexedAttestation};
use crate::attestation_data::AttestationData;
use crate::beacon_state::BeaconState;
use crate::common::get_indexed_attestation;
use crate::crypto::{SignatureVerifier, VerifySignatures};
use crate::spec::{EthSpec, Spec};

type Result<T> = std::result::Result<T, BlockOperationError<Invalid>>;

fn error(reason: Invalid) -> BlockOperationError<Invalid> {
    BlockOperationError::invalid(reason)
}

/// Returns `Ok(())` if the given `attestation` is valid to be included in a block that is applied
/// to `state`. Otherwise, returns a descriptive `Err`.
///
/// Returns the indexed form of the attestation on success.
pub fn verify_attestation_for_block_inclusion<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &BeaconState<E>,
    attestation: &Attestation<E>,
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
) -> Result<IndexedAttestation<E>> {
    let data = &attestation.data;

    verify!(
        data.slot.safe_add(spec.min_attestation_inclusion_delay)? <= state.slot,
        Invalid::IncludedTooEarly {
            state: state.slot,
            delay: spec.min_attestation_inclusion_delay,
            attestation: data.slot,
        }
    );
    verify!(
        state.slot <= data.slot.safe_add(E::slots_per_epoch())?,
        Invalid::IncludedTooLate { state: state.slot, attestation: data.slot }
    );

    verify_attestation_for_state(state, attestation, verify_signatures, verifier, spec)
}

/// Returns `Ok(())` if `attestation` is a valid attestation to the chain that precedes the given
/// `state`.
///
/// Returns a descriptive `Err` if the attestation is malformed or does not accurately reflect the
/// prior blocks in `state`.
pub fn verify_attestation_for_state<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &BeaconState<E>,
    attestation: &Attestation<E>,
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
) -> Result<IndexedAttestation<E>> {
    let data = &attestation.data;

    // The FFG vote is checked before the committee lookup, so a stale target reports a
    // meaningful reason rather than a cache miss.
    verify_casper_ffg_vote::<E>(state, data)?;

    verify!(
        data.index < state.get_committee_count_at_slot(data.slot)?,
        Invalid::BadCommitteeIndex
    );

    let committee = state.get_beacon_committee(data.slot, data.index)?;
    verify!(
        attestation.aggregation_bits.len() == committee.committee.len(),
        Invalid::BadAggregationBitfieldLength {
            committee_len: committee.committee.len(),
            bitfield_len: attestation.aggregation_bits.len(),
        }
    );

    let indexed_attestation = get_indexed_attestation(committee.committee, attestation)?;
    is_valid_indexed_attestation(state, &indexed_attestation, verify_signatures, verifier, spec)?;

    Ok(indexed_attestation)
}

/// Check target epoch and source checkpoint.
fn verify_casper_ffg_vote<E: EthSpec>(state: &BeaconState<E>, data: &AttestationData) -> Result<()> {
    let slot_epoch = data.slot.epoch(E::slots_per_epoch());
    verify!(
        data.target.epoch == slot_epoch,
        Invalid::TargetEpochSlotMismatch { target_epoch: data.target.epoch, slot_epoch }
    );

    if data.target.epoch == state.current_epoch() {
        verify!(
            data.source == state.current_justified_checkpoint,
            Invalid::WrongJustifiedCheckpoint {
                state: Box::new(state.current_justified_checkpoint),
                attestation: Box::new(data.source),
                is_current: true,
            }
        );
        Ok(())
    } else if data.target.epoch == state.previous_epoch() {
        verify!(
            data.source == state.previous_justified_checkpoint,
            Invalid::WrongJustifiedCheckpoint {
                state: Box::new(state.previous_justified_checkpoint),
                attestation: Box::new(data.source),
                is_current: false,
            }
        );
        Ok(())
    } else {
        Err(error(Invalid::BadTargetEpoch))
    }
}
