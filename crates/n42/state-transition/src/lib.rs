//! Beacon chain state transition: slot processing, epoch processing and block application.
//!
//! The entry points are [`advance_slots`] and [`apply_block`]. Both run on a working copy of the
//! state and commit it only when every stage succeeds.

#![allow(missing_docs)]

pub mod arith;
pub mod attestation;
pub mod attestation_data;
pub mod beacon_block;
pub mod beacon_committee;
pub mod beacon_state;
pub mod cancel;
pub mod committee_cache;
pub mod common;
pub mod crypto;
pub mod errors;
pub mod eth1_data;
pub mod execution_payload;
pub mod exit_cache;
pub mod fork;
pub mod fork_name;
pub mod genesis;
pub mod operations;
pub mod pending_attestation;
pub mod per_block_processing;
pub mod per_epoch_processing;
pub mod per_slot_processing;
pub mod pubkey_cache;
pub mod relative_epoch;
pub mod shuffle_list;
pub mod signing_data;
pub mod slot_epoch;
pub mod spec;
pub mod state_transition;
pub mod validator;

#[cfg(test)]
mod test_utils;

pub use tree_hash::Hash256;
pub use ssz_types::{typenum, typenum::Unsigned, BitList, BitVector, FixedVector, VariableList};

pub use beacon_block::{BeaconBlock, BeaconBlockBody, BeaconBlockHeader, SignedBeaconBlock};
pub use beacon_state::{BeaconState, Checkpoint, Error as BeaconStateError};
pub use cancel::{CancelToken, Cancelled};
pub use crypto::{PublicKeyBytes, SignatureBytes, SignatureVerifier, VerifySignatures};
pub use errors::EpochProcessingError;
pub use fork::Fork;
pub use fork_name::ForkName;
pub use genesis::initialize_genesis_state;
pub use per_block_processing::{per_block_processing, BlockProcessingError};
pub use per_epoch_processing::{process_epoch, EpochProcessingSummary};
pub use per_slot_processing::{per_slot_processing, Error as SlotProcessingError};
pub use slot_epoch::{Epoch, Slot};
pub use spec::{Domain, EthSpec, MainnetEthSpec, MinimalEthSpec, Spec};
pub use state_transition::{advance_slots, apply_block, ErrorKind, StateTransitionError};
pub use validator::Validator;

#[cfg(feature = "blst")]
pub use crypto::BlstVerifier;

/// Returns `int` as little-endian bytes with a length of 4.
pub fn int_to_bytes4(int: u32) -> [u8; 4] {
    int.to_le_bytes()
}

/// Returns `int` as little-endian bytes with a length of 8.
pub fn int_to_bytes8(int: u64) -> Vec<u8> {
    int.to_le_bytes().to_vec()
}
