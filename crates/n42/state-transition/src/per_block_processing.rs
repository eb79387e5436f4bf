use crate::arith::SafeArith;
use crate::beacon_block::{BeaconBlock, SignedBeaconBlock};
use crate::beacon_state::BeaconState;
use crate::cancel::CancelToken;
use crate::crypto::{SignatureVerifier, VerifySignatures};
use crate::eth1_data::Eth1Data;
use crate::execution_payload::ExecutionPayloadHeader;
use crate::spec::{EthSpec, Spec};
use crate::slot_epoch::Slot;
use crate::{Hash256, Unsigned};
use tracing::debug;

#[macro_use]
mod macros;
pub mod errors;
pub mod is_valid_indexed_attestation;
pub mod process_operations;
pub mod signature_sets;
pub mod verify_attestation;
pub mod verify_attester_slashing;
pub mod verify_deposit;
pub mod verify_exit;
pub mod verify_proposer_slashing;

pub use errors::{BlockOperationError, BlockProcessingError, HeaderInvalid, IntoWithIndex};
pub use is_valid_indexed_attestation::is_valid_indexed_attestation;
pub use process_operations::process_operations;
pub use verify_attestation::{verify_attestation_for_block_inclusion, verify_attestation_for_state};
pub use verify_attester_slashing::{get_slashable_indices, verify_attester_slashing};
pub use verify_deposit::{verify_deposit_merkle_proof, verify_merkle_proof};
pub use verify_exit::verify_exit;
pub use verify_proposer_slashing::verify_proposer_slashing;

/// Updates the state for a new block, whilst validating that the block is valid.
///
/// The state must already be at `signed_block.slot()`. On error the state may be partially
/// modified; callers that need atomicity apply the block to a copy.
pub fn per_block_processing<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &mut BeaconState<E>,
    signed_block: &SignedBeaconBlock<E>,
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<(), BlockProcessingError> {
    let block = &signed_block.message;

    cancel.check()?;
    state.build_caches(spec, cancel)?;

    let proposer_index = process_block_header(state, block)?;

    if verify_signatures.is_true() {
        verify_block_signature(state, signed_block, verifier, spec)?;
    }

    // The execution payload commits to the mix the proposer saw before revealing.
    let pre_reveal_randao_mix = *state.get_randao_mix(state.current_epoch())?;

    process_randao(state, block, verify_signatures, verifier, spec)?;
    process_eth1_data(state, &block.body.eth1_data)?;
    process_operations::process_operations(
        state,
        &block.body,
        verify_signatures,
        verifier,
        spec,
        cancel,
    )?;

    if state.fork_name(spec).bellatrix_enabled() &&
        is_execution_enabled(state, &block.body.execution_payload)
    {
        process_execution_payload(state, &block.body.execution_payload, pre_reveal_randao_mix, spec)?;
    }

    debug!(
        target: "state_transition::block",
        slot = %block.slot,
        proposer_index,
        attestations = block.body.attestations.len(),
        deposits = block.body.deposits.len(),
        exits = block.body.voluntary_exits.len(),
        "Processed block"
    );

    Ok(())
}

/// Processes the block header, returning the proposer index.
pub fn process_block_header<E: EthSpec>(
    state: &mut BeaconState<E>,
    block: &BeaconBlock<E>,
) -> Result<u64, BlockOperationError<HeaderInvalid>> {
    // Verify that the slots match
    verify!(block.slot == state.slot, HeaderInvalid::StateSlotMismatch);

    // Verify that the block is newer than the latest block header
    verify!(
        block.slot > state.latest_block_header.slot,
        HeaderInvalid::OlderThanLatestBlockHeader {
            block_slot: block.slot,
            latest_block_header_slot: state.latest_block_header.slot,
        }
    );

    // Verify that proposer index is the correct index
    let proposer_index = block.proposer_index;
    let state_proposer_index = state.get_beacon_proposer_index(block.slot)? as u64;
    verify!(
        proposer_index == state_proposer_index,
        HeaderInvalid::ProposerIndexMismatch {
            block_proposer_index: proposer_index,
            state_proposer_index,
        }
    );

    let expected_previous_block_root = state.latest_block_header.canonical_root();
    verify!(
        block.parent_root == expected_previous_block_root,
        HeaderInvalid::ParentBlockRootMismatch {
            state: expected_previous_block_root,
            block: block.parent_root,
        }
    );

    state.latest_block_header = block.temporary_block_header();

    // Verify proposer is not slashed
    verify!(
        !state.get_validator(proposer_index as usize)?.slashed,
        HeaderInvalid::ProposerSlashed(proposer_index)
    );

    Ok(proposer_index)
}

/// Verifies the signature of a block.
pub fn verify_block_signature<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &BeaconState<E>,
    signed_block: &SignedBeaconBlock<E>,
    verifier: &V,
    spec: &Spec,
) -> Result<(), BlockOperationError<HeaderInvalid>> {
    verify!(
        signature_sets::block_proposal_signature_set(state, signed_block, None, spec)?
            .verify(verifier),
        HeaderInvalid::ProposalSignatureInvalid
    );

    Ok(())
}

/// Verifies the `randao_reveal` against the block's proposer pubkey and mixes it into
/// `state.randao_mixes`.
pub fn process_randao<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &mut BeaconState<E>,
    block: &BeaconBlock<E>,
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
) -> Result<(), BlockProcessingError> {
    if verify_signatures.is_true() {
        // Verify RANDAO reveal signature.
        block_verify!(
            signature_sets::randao_signature_set(state, block, None, spec)?.verify(verifier),
            BlockProcessingError::RandaoSignatureInvalid
        );
    }

    // Update the current epoch RANDAO mix.
    state.update_randao_mix(state.current_epoch(), block.body.randao_reveal.as_serialized())?;

    Ok(())
}

/// Update the `state.eth1_data_votes` based upon the `eth1_data` provided.
pub fn process_eth1_data<E: EthSpec>(
    state: &mut BeaconState<E>,
    eth1_data: &Eth1Data,
) -> Result<(), BlockProcessingError> {
    if let Some(new_eth1_data) = get_new_eth1_data(state, eth1_data)? {
        debug!(
            target: "state_transition::block",
            deposit_count = new_eth1_data.deposit_count,
            block_hash = %new_eth1_data.block_hash,
            "Adopted eth1 data"
        );
        state.eth1_data = new_eth1_data;
    }

    state.eth1_data_votes.push(eth1_data.clone())?;

    Ok(())
}

/// Returns `Ok(Some(eth1_data))` if adding the given `eth1_data` to `state.eth1_data_votes` would
/// result in a change to `state.eth1_data`.
pub fn get_new_eth1_data<E: EthSpec>(
    state: &BeaconState<E>,
    eth1_data: &Eth1Data,
) -> Result<Option<Eth1Data>, BlockProcessingError> {
    let num_votes = state.eth1_data_votes.iter().filter(|vote| *vote == eth1_data).count();

    // The +1 is to account for the `eth1_data` supplied to the function.
    if num_votes.safe_add(1)?.safe_mul(2)? > E::SlotsPerEth1VotingPeriod::to_usize() {
        Ok(Some(eth1_data.clone()))
    } else {
        Ok(None)
    }
}

/// The merge has happened once the state records a non-default payload header.
pub fn is_merge_transition_complete<E: EthSpec>(state: &BeaconState<E>) -> bool {
    !state.latest_execution_payload_header.is_default()
}

/// Execution payloads are processed once the merge is complete, or by the first block that
/// carries a non-default one.
pub fn is_execution_enabled<E: EthSpec>(state: &BeaconState<E>, payload: &ExecutionPayloadHeader) -> bool {
    is_merge_transition_complete(state) || !payload.is_default()
}

/// The wall-clock time at which `slot` starts.
pub fn compute_timestamp_at_slot<E: EthSpec>(
    state: &BeaconState<E>,
    slot: Slot,
    spec: &Spec,
) -> Result<u64, BlockProcessingError> {
    let slots_since_genesis = slot.as_u64().safe_sub(spec.genesis_slot.as_u64())?;
    Ok(slots_since_genesis.safe_mul(spec.seconds_per_slot)?.safe_add(state.genesis_time)?)
}

/// Check the payload header links onto the recorded execution chain and commits to this slot,
/// then record it.
pub fn process_execution_payload<E: EthSpec>(
    state: &mut BeaconState<E>,
    payload: &ExecutionPayloadHeader,
    expected_randao_mix: Hash256,
    spec: &Spec,
) -> Result<(), BlockProcessingError> {
    if is_merge_transition_complete(state) {
        let expected = state.latest_execution_payload_header.block_hash;
        block_verify!(
            payload.parent_hash == expected,
            BlockProcessingError::ExecutionHashChainIncontiguous {
                expected,
                found: payload.parent_hash,
            }
        );
    }

    block_verify!(
        payload.prev_randao == expected_randao_mix,
        BlockProcessingError::ExecutionRandaoMismatch {
            expected: expected_randao_mix,
            found: payload.prev_randao,
        }
    );

    let timestamp = compute_timestamp_at_slot(state, state.slot, spec)?;
    block_verify!(
        payload.timestamp == timestamp,
        BlockProcessingError::ExecutionInvalidTimestamp {
            expected: timestamp,
            found: payload.timestamp,
        }
    );

    state.latest_execution_payload_header = payload.clone();

    Ok(())
}
