use super::errors::{BlockOperationError, DepositInvalid};
use super::signature_sets::deposit_pubkey_signature_message;
use crate::arith::SafeArith;
use crate::beacon_state::BeaconState;
use crate::crypto::{PublicKeyBytes, SignatureVerifier};
use crate::operations::{Deposit, DepositData};
use crate::spec::{EthSpec, Spec};
use crate::Hash256;
use ethereum_hashing::{hash, hash32_concat};
use tree_hash::TreeHash;

type Result<T> = std::result::Result<T, BlockOperationError<DepositInvalid>>;

/// Verify `Deposit.pubkey` signed `Deposit.signature`.
///
/// An invalid proof-of-possession does not invalidate the block; the caller skips the deposit.
pub fn is_valid_deposit_signature<V: SignatureVerifier + ?Sized>(
    deposit_data: &DepositData,
    verifier: &V,
    spec: &Spec,
) -> bool {
    deposit_pubkey_signature_message(deposit_data, spec).verify(verifier)
}

/// Returns a `Some(validator index)` if a pubkey already exists in the `validators`,
/// otherwise returns `None`.
pub fn get_existing_validator_index<E: EthSpec>(
    state: &BeaconState<E>,
    pub_key: &PublicKeyBytes,
) -> Result<Option<u64>> {
    let validator_index = state.get_validator_index(pub_key)?;
    Ok(validator_index.map(|idx| idx as u64))
}

/// Verify that a deposit is included in the state's eth1 deposit root.
///
/// The deposit index is provided as a parameter so we can check proofs
/// before they're due to be processed.
pub fn verify_deposit_merkle_proof<E: EthSpec>(
    state: &BeaconState<E>,
    deposit: &Deposit,
    deposit_index: u64,
    spec: &Spec,
) -> Result<()> {
    let leaf = deposit.data.tree_hash_root();

    verify!(
        verify_merkle_proof(
            leaf,
            &deposit.proof[..],
            spec.deposit_contract_tree_depth.safe_add(1)? as usize,
            deposit_index as usize,
            state.eth1_data.deposit_root,
        ),
        DepositInvalid::BadMerkleProof
    );

    Ok(())
}

/// Verify a proof that `leaf` exists at `index` in a Merkle tree rooted at `root`.
///
/// The `branch` argument is the main component of the proof: it should be a list of internal
/// node hashes such that the root can be reconstructed (in bottom-up order).
pub fn verify_merkle_proof(
    leaf: Hash256,
    branch: &[Hash256],
    depth: usize,
    index: usize,
    root: Hash256,
) -> bool {
    branch.len() == depth && merkle_root_from_branch(leaf, branch, index) == root
}

/// Fold `branch` onto `leaf`, taking the sibling from the left whenever the matching bit of
/// `index` is set.
fn merkle_root_from_branch(leaf: Hash256, branch: &[Hash256], index: usize) -> Hash256 {
    let mut merkle_root = leaf.as_slice().to_vec();

    for (i, sibling) in branch.iter().enumerate() {
        let ith_bit = index.checked_shr(i as u32).unwrap_or(0) & 0x01;
        if ith_bit == 1 {
            merkle_root = hash32_concat(sibling.as_slice(), &merkle_root)[..].to_vec();
        } else {
            let mut input = merkle_root;
            input.extend_from_slice(sibling.as_slice());
            merkle_root = hash(&input);
        }
    }

    Hash256::from_slice(&merkle_root)
}
