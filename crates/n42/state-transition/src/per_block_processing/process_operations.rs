use super::errors::{BlockProcessingError, IntoWithIndex};
use super::verify_attestation::verify_attestation_for_block_inclusion;
use super::verify_attester_slashing::verify_attester_slashing;
use super::verify_deposit::{
    get_existing_validator_index, is_valid_deposit_signature, verify_deposit_merkle_proof,
};
use super::verify_exit::verify_exit;
use super::verify_proposer_slashing::verify_proposer_slashing;
use crate::arith::SafeArith;
use crate::attestation::Attestation;
use crate::beacon_block::BeaconBlockBody;
use crate::beacon_state::BeaconState;
use crate::cancel::CancelToken;
use crate::common::{increase_balance, initiate_validator_exit, slash_validator};
use crate::crypto::{SignatureVerifier, VerifySignatures};
use crate::operations::{AttesterSlashing, Deposit, ProposerSlashing, SignedVoluntaryExit};
use crate::pending_attestation::PendingAttestation;
use crate::spec::{EthSpec, Spec};
use crate::validator::Validator;
use std::cmp;
use tracing::{debug, trace};

/// Apply every operation in `block_body`, in the fixed order proposer slashings, attester
/// slashings, attestations, deposits, voluntary exits.
pub fn process_operations<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &mut BeaconState<E>,
    block_body: &BeaconBlockBody<E>,
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<(), BlockProcessingError> {
    process_proposer_slashings(state, &block_body.proposer_slashings, verify_signatures, verifier, spec)?;
    process_attester_slashings(state, &block_body.attester_slashings, verify_signatures, verifier, spec)?;
    process_attestations(state, &block_body.attestations, verify_signatures, verifier, spec, cancel)?;
    process_deposits(state, &block_body.deposits, verifier, spec)?;
    process_exits(state, &block_body.voluntary_exits, verify_signatures, verifier, spec)?;
    Ok(())
}

/// Validates each `ProposerSlashing` and updates the state, short-circuiting on an invalid object.
///
/// Returns `Ok(())` if the validation and state updates completed successfully, otherwise returns
/// an `Err` describing the invalid object or cause of failure.
pub fn process_proposer_slashings<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &mut BeaconState<E>,
    proposer_slashings: &[ProposerSlashing],
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
) -> Result<(), BlockProcessingError> {
    for (i, proposer_slashing) in proposer_slashings.iter().enumerate() {
        verify_proposer_slashing(proposer_slashing, state, verify_signatures, verifier, spec)
            .map_err(|e| e.into_with_index(i))?;

        slash_validator(state, proposer_slashing.proposer_index() as usize, None, spec)?;
    }

    Ok(())
}

/// Validates each `AttesterSlashing` and updates the state, short-circuiting on an invalid object.
///
/// Returns `Ok(())` if the validation and state updates completed successfully, otherwise returns
/// an `Err` describing the invalid object or cause of failure.
pub fn process_attester_slashings<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &mut BeaconState<E>,
    attester_slashings: &[AttesterSlashing<E>],
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
) -> Result<(), BlockProcessingError> {
    for (i, attester_slashing) in attester_slashings.iter().enumerate() {
        let slashable_indices =
            verify_attester_slashing(state, attester_slashing, verify_signatures, verifier, spec)
                .map_err(|e| e.into_with_index(i))?;

        for index in slashable_indices {
            slash_validator(state, index as usize, None, spec)?;
        }
    }

    Ok(())
}

/// Validates each `Attestation` and updates the state, short-circuiting on an invalid object.
///
/// Returns `Ok(())` if the validation and state updates completed successfully, otherwise returns
/// an `Err` describing the invalid object or cause of failure.
pub fn process_attestations<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &mut BeaconState<E>,
    attestations: &[Attestation<E>],
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<(), BlockProcessingError> {
    let proposer_index = state.get_beacon_proposer_index(state.slot)? as u64;

    for (i, attestation) in attestations.iter().enumerate() {
        cancel.checkpoint(i)?;

        verify_attestation_for_block_inclusion(state, attestation, verify_signatures, verifier, spec)
            .map_err(|e| e.into_with_index(i))?;

        let pending_attestation = PendingAttestation {
            aggregation_bits: attestation.aggregation_bits.clone(),
            data: attestation.data.clone(),
            inclusion_delay: state.slot.safe_sub(attestation.data.slot)?.as_u64(),
            proposer_index,
        };

        if attestation.data.target.epoch == state.current_epoch() {
            state.current_epoch_attestations.push(pending_attestation)?;
        } else {
            state.previous_epoch_attestations.push(pending_attestation)?;
        }
    }

    trace!(
        target: "state_transition::block",
        slot = %state.slot,
        count = attestations.len(),
        "Processed attestations"
    );

    Ok(())
}

/// Validates each `Deposit` and updates the state, short-circuiting on an invalid object.
///
/// Returns `Ok(())` if the validation and state updates completed successfully, otherwise returns
/// an `Err` describing the invalid object or cause of failure.
pub fn process_deposits<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &mut BeaconState<E>,
    deposits: &[Deposit],
    verifier: &V,
    spec: &Spec,
) -> Result<(), BlockProcessingError> {
    let expected_deposit_len = cmp::min(
        E::max_deposits(),
        state.eth1_data.deposit_count.saturating_sub(state.eth1_deposit_index),
    );
    block_verify!(
        deposits.len() as u64 == expected_deposit_len,
        BlockProcessingError::DepositCountInvalid {
            expected: expected_deposit_len as usize,
            found: deposits.len(),
        }
    );

    for (i, deposit) in deposits.iter().enumerate() {
        verify_deposit_merkle_proof(state, deposit, state.eth1_deposit_index, spec)
            .map_err(|e| e.into_with_index(i))?;

        process_deposit(state, deposit, verifier, spec).map_err(|e| e.into_with_index(i))?;
    }

    Ok(())
}

/// Process a single deposit whose Merkle proof has already been checked.
///
/// New validators must carry a valid proof-of-possession; a deposit without one is consumed but
/// creates nothing.
pub fn process_deposit<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &mut BeaconState<E>,
    deposit: &Deposit,
    verifier: &V,
    spec: &Spec,
) -> Result<(), super::errors::DepositValidationError> {
    state.eth1_deposit_index.safe_add_assign(1)?;

    let amount = deposit.data.amount;

    if let Some(index) = get_existing_validator_index(state, &deposit.data.pubkey)? {
        // Update the existing validator balance.
        increase_balance(state, index as usize, amount)?;
        return Ok(());
    }

    // The signature should be checked for new validators. Return early for a bad
    // signature.
    if !is_valid_deposit_signature(&deposit.data, verifier, spec) {
        debug!(
            target: "state_transition::block",
            pubkey = %deposit.data.pubkey,
            "Skipped deposit with invalid proof of possession"
        );
        return Ok(());
    }

    let validator = Validator::from_deposit(
        deposit.data.pubkey,
        deposit.data.withdrawal_credentials,
        amount,
        spec,
    );
    state.validators.push(validator)?;
    state.balances.push(amount)?;
    state.update_pubkey_cache()?;

    debug!(
        target: "state_transition::block",
        index = state.validators.len() - 1,
        amount,
        "Added validator from deposit"
    );

    Ok(())
}

/// Validates each `Exit` and updates the state, short-circuiting on an invalid object.
///
/// Returns `Ok(())` if the validation and state updates completed successfully, otherwise returns
/// an `Err` describing the invalid object or cause of failure.
pub fn process_exits<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &mut BeaconState<E>,
    voluntary_exits: &[SignedVoluntaryExit],
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
) -> Result<(), BlockProcessingError> {
    // Verify and apply each exit in series. We iterate in series because higher-index exits may
    // become invalid due to the application of lower-index ones.
    for (i, exit) in voluntary_exits.iter().enumerate() {
        verify_exit(state, None, exit, verify_signatures, verifier, spec)
            .map_err(|e| e.into_with_index(i))?;

        initiate_validator_exit(state, exit.message.validator_index as usize, spec)?;
    }
    Ok(())
}
