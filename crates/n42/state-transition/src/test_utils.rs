//! Fixtures shared by the unit tests.

use crate::beacon_state::BeaconState;
use crate::crypto::{PublicKeyBytes, SignatureBytes, SignatureVerifier};
use crate::genesis::initialize_genesis_state;
use crate::spec::{EthSpec, Spec};
use crate::Hash256;

/// A distinct, deterministic pubkey for every validator index.
pub fn pubkey(index: usize) -> PublicKeyBytes {
    let mut bytes = [0u8; 48];
    bytes[..8].copy_from_slice(&(index as u64 + 1).to_le_bytes());
    PublicKeyBytes::from_bytes(bytes)
}

/// A genesis state with `validator_count` active validators at the maximum balance and every
/// cache built.
pub fn genesis_state<E: EthSpec>(validator_count: usize, spec: &Spec) -> BeaconState<E> {
    let validators = (0..validator_count)
        .map(|i| (pubkey(i), Hash256::ZERO, spec.max_effective_balance));
    initialize_genesis_state(0, Hash256::repeat_byte(0x42), validators, spec)
        .expect("genesis state builds")
}

/// Accepts every signature.
#[derive(Debug, Clone, Copy)]
pub struct AcceptAll;

impl SignatureVerifier for AcceptAll {
    fn verify(&self, _: &PublicKeyBytes, _: Hash256, _: &SignatureBytes, _: Hash256) -> bool {
        true
    }

    fn aggregate(&self, pubkeys: &[PublicKeyBytes]) -> Option<PublicKeyBytes> {
        pubkeys.first().copied()
    }
}

/// Rejects every signature, but aggregates like [`AcceptAll`].
#[derive(Debug, Clone, Copy)]
pub struct RejectAll;

impl SignatureVerifier for RejectAll {
    fn verify(&self, _: &PublicKeyBytes, _: Hash256, _: &SignatureBytes, _: Hash256) -> bool {
        false
    }

    fn aggregate(&self, pubkeys: &[PublicKeyBytes]) -> Option<PublicKeyBytes> {
        pubkeys.first().copied()
    }
}
