//! Signature sets for block and operation verification.
//!
//! Each function gathers the public key, message root, signature and domain that a single check
//! needs. Nothing is verified until [`SignatureSet::verify`] is called with a backend.

use crate::attestation::IndexedAttestation;
use crate::beacon_block::{BeaconBlock, SignedBeaconBlock, SignedBeaconBlockHeader};
use crate::beacon_state::{BeaconState, Error as BeaconStateError};
use crate::crypto::{PublicKeyBytes, SignatureBytes, SignatureVerifier};
use crate::operations::{DepositData, ProposerSlashing, SignedVoluntaryExit};
use crate::spec::{Domain, EthSpec, Spec};
use crate::Hash256;
use tree_hash::TreeHash;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// Attempted to find the public key of a validator that does not exist. You cannot distinguish
    /// between an error and an invalid block in this case.
    ValidatorUnknown(u64),
    /// The `BeaconBlock` has a `proposer_index` that does not match the index we computed locally.
    /// The block is invalid.
    IncorrectBlockProposer { block: u64, local_shuffling: u64 },
    /// The attesting keys could not be combined into one key.
    PublicKeyAggregationFailed,
    /// There was an error attempting to read from a `BeaconState`. Block
    /// validity was not determined.
    BeaconStateError(BeaconStateError),
}

impl From<BeaconStateError> for Error {
    fn from(e: BeaconStateError) -> Self {
        Self::BeaconStateError(e)
    }
}

/// Everything needed to check one signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureSet<'a> {
    pub pubkey: PublicKeyBytes,
    pub message_root: Hash256,
    pub signature: &'a SignatureBytes,
    pub domain: Hash256,
}

impl<'a> SignatureSet<'a> {
    pub const fn single_pubkey(
        signature: &'a SignatureBytes,
        pubkey: PublicKeyBytes,
        message_root: Hash256,
        domain: Hash256,
    ) -> Self {
        Self { pubkey, message_root, signature, domain }
    }

    pub fn verify<V: SignatureVerifier + ?Sized>(&self, verifier: &V) -> bool {
        verifier.verify(&self.pubkey, self.message_root, self.signature, self.domain)
    }
}

fn get_pubkey<E: EthSpec>(state: &BeaconState<E>, validator_index: u64) -> Result<PublicKeyBytes> {
    state
        .validators
        .get(validator_index as usize)
        .map(|v| v.pubkey)
        .ok_or(Error::ValidatorUnknown(validator_index))
}

/// A signature set that is valid if a block was signed by the expected block producer.
pub fn block_proposal_signature_set<'a, E: EthSpec>(
    state: &BeaconState<E>,
    signed_block: &'a SignedBeaconBlock<E>,
    verified_proposer_index: Option<u64>,
    spec: &Spec,
) -> Result<SignatureSet<'a>> {
    let block = &signed_block.message;

    let proposer_index = match verified_proposer_index {
        Some(proposer_index) => proposer_index,
        None => state.get_beacon_proposer_index(block.slot)? as u64,
    };
    if proposer_index != block.proposer_index {
        return Err(Error::IncorrectBlockProposer {
            block: block.proposer_index,
            local_shuffling: proposer_index,
        });
    }

    let domain = state.get_domain(block.epoch(), Domain::BeaconProposer, spec);

    Ok(SignatureSet::single_pubkey(
        &signed_block.signature,
        get_pubkey(state, proposer_index)?,
        block.tree_hash_root(),
        domain,
    ))
}

/// A signature set that is valid if the block proposers randao reveal signature is correct.
pub fn randao_signature_set<'a, E: EthSpec>(
    state: &BeaconState<E>,
    block: &'a BeaconBlock<E>,
    verified_proposer_index: Option<u64>,
    spec: &Spec,
) -> Result<SignatureSet<'a>> {
    let proposer_index = match verified_proposer_index {
        Some(proposer_index) => proposer_index,
        None => state.get_beacon_proposer_index(block.slot)? as u64,
    };

    let epoch = block.epoch();
    let domain = state.get_domain(epoch, Domain::Randao, spec);

    Ok(SignatureSet::single_pubkey(
        &block.body.randao_reveal,
        get_pubkey(state, proposer_index)?,
        epoch.tree_hash_root(),
        domain,
    ))
}

/// Returns two signature sets, one for each `BlockHeader` included in the `ProposerSlashing`.
pub fn proposer_slashing_signature_set<'a, E: EthSpec>(
    state: &BeaconState<E>,
    proposer_slashing: &'a ProposerSlashing,
    spec: &Spec,
) -> Result<(SignatureSet<'a>, SignatureSet<'a>)> {
    let proposer_index = proposer_slashing.proposer_index();
    let pubkey = get_pubkey(state, proposer_index)?;

    Ok((
        block_header_signature_set(state, &proposer_slashing.signed_header_1, pubkey, spec),
        block_header_signature_set(state, &proposer_slashing.signed_header_2, pubkey, spec),
    ))
}

/// Returns a signature set that is valid if the given `pubkey` signed the `header`.
fn block_header_signature_set<'a, E: EthSpec>(
    state: &BeaconState<E>,
    signed_header: &'a SignedBeaconBlockHeader,
    pubkey: PublicKeyBytes,
    spec: &Spec,
) -> SignatureSet<'a> {
    let domain = state.get_domain(
        signed_header.message.slot.epoch(E::slots_per_epoch()),
        Domain::BeaconProposer,
        spec,
    );

    SignatureSet::single_pubkey(
        &signed_header.signature,
        pubkey,
        signed_header.message.tree_hash_root(),
        domain,
    )
}

/// Returns the signature set for the given `indexed_attestation`, with the attesters' keys
/// aggregated by `verifier`.
pub fn indexed_attestation_signature_set<'a, E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &BeaconState<E>,
    indexed_attestation: &'a IndexedAttestation<E>,
    verifier: &V,
    spec: &Spec,
) -> Result<SignatureSet<'a>> {
    let pubkeys = indexed_attestation
        .attesting_indices
        .iter()
        .map(|&validator_index| get_pubkey(state, validator_index))
        .collect::<Result<Vec<_>>>()?;
    let aggregate = verifier.aggregate(&pubkeys).ok_or(Error::PublicKeyAggregationFailed)?;

    let domain =
        state.get_domain(indexed_attestation.data.target.epoch, Domain::BeaconAttester, spec);

    Ok(SignatureSet::single_pubkey(
        &indexed_attestation.signature,
        aggregate,
        indexed_attestation.data.tree_hash_root(),
        domain,
    ))
}

/// Returns a signature set that is valid if the `SignedVoluntaryExit` was signed by the indicated
/// validator.
pub fn exit_signature_set<'a, E: EthSpec>(
    state: &BeaconState<E>,
    signed_exit: &'a SignedVoluntaryExit,
    spec: &Spec,
) -> Result<SignatureSet<'a>> {
    let exit = &signed_exit.message;
    let domain = state.get_domain(exit.epoch, Domain::VoluntaryExit, spec);

    Ok(SignatureSet::single_pubkey(
        &signed_exit.signature,
        get_pubkey(state, exit.validator_index)?,
        exit.tree_hash_root(),
        domain,
    ))
}

/// The proof-of-possession carried by a deposit. Deposits are signed over the fork-agnostic
/// deposit domain.
pub fn deposit_pubkey_signature_message<'a>(
    deposit_data: &'a DepositData,
    spec: &Spec,
) -> SignatureSet<'a> {
    SignatureSet::single_pubkey(
        &deposit_data.signature,
        deposit_data.pubkey,
        deposit_data.as_deposit_message().tree_hash_root(),
        spec.get_deposit_domain(),
    )
}
