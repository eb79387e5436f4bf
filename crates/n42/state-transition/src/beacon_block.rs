use crate::attestation::Attestation;
use crate::crypto::SignatureBytes;
use crate::eth1_data::Eth1Data;
use crate::execution_payload::ExecutionPayloadHeader;
use crate::operations::{AttesterSlashing, Deposit, ProposerSlashing, SignedVoluntaryExit};
use crate::signing_data::SignedRoot;
use crate::slot_epoch::Slot;
use crate::spec::EthSpec;
use crate::{Hash256, VariableList};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

/// A header of a `BeaconBlock`.
#[derive(
    Debug, PartialEq, Eq, Hash, Clone, Default, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body_root: Hash256,
}

impl SignedRoot for BeaconBlockHeader {}

impl BeaconBlockHeader {
    /// Returns the `tree_hash_root` of the header.
    pub fn canonical_root(&self) -> Hash256 {
        self.tree_hash_root()
    }
}

/// A signed header of a `BeaconBlock`.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedBeaconBlockHeader {
    pub message: BeaconBlockHeader,
    pub signature: SignatureBytes,
}

/// The body of a `BeaconChain` block, containing operations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode, TreeHash)]
#[serde(bound = "E: EthSpec")]
pub struct BeaconBlockBody<E: EthSpec> {
    pub randao_reveal: SignatureBytes,
    pub eth1_data: Eth1Data,
    pub graffiti: Hash256,
    pub proposer_slashings: VariableList<ProposerSlashing, E::MaxProposerSlashings>,
    pub attester_slashings: VariableList<AttesterSlashing<E>, E::MaxAttesterSlashings>,
    pub attestations: VariableList<Attestation<E>, E::MaxAttestations>,
    pub deposits: VariableList<Deposit, E::MaxDeposits>,
    pub voluntary_exits: VariableList<SignedVoluntaryExit, E::MaxVoluntaryExits>,
    /// Only inspected once the Bellatrix stage is enabled.
    pub execution_payload: ExecutionPayloadHeader,
}

/// A block of the `BeaconChain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
#[serde(bound = "E: EthSpec")]
pub struct BeaconBlock<E: EthSpec> {
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body: BeaconBlockBody<E>,
}

impl<E: EthSpec> SignedRoot for BeaconBlock<E> {}

impl<E: EthSpec> BeaconBlock<E> {
    /// Returns an empty block to be used during genesis.
    pub fn empty() -> Self {
        Self {
            slot: Slot::new(0),
            proposer_index: 0,
            parent_root: Hash256::ZERO,
            state_root: Hash256::ZERO,
            body: BeaconBlockBody::default(),
        }
    }

    /// Returns the epoch corresponding to `self.slot`.
    pub fn epoch(&self) -> crate::Epoch {
        self.slot.epoch(E::slots_per_epoch())
    }

    /// Returns the `tree_hash_root` of the block.
    pub fn canonical_root(&self) -> Hash256 {
        self.tree_hash_root()
    }

    /// Returns a full `BeaconBlockHeader` of this block.
    ///
    /// The header's `state_root` is the block's, so it hashes to the same root as the block.
    pub fn block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: self.body.tree_hash_root(),
        }
    }

    /// Returns a "temporary" header, where the `state_root` is `Hash256::ZERO`.
    pub fn temporary_block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader { state_root: Hash256::ZERO, ..self.block_header() }
    }
}

/// A `BeaconBlock` and a signature from its proposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
#[serde(bound = "E: EthSpec")]
pub struct SignedBeaconBlock<E: EthSpec> {
    pub message: BeaconBlock<E>,
    pub signature: SignatureBytes,
}

impl<E: EthSpec> SignedBeaconBlock<E> {
    pub const fn slot(&self) -> Slot {
        self.message.slot
    }

    pub fn canonical_root(&self) -> Hash256 {
        self.message.canonical_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MinimalEthSpec;

    #[test]
    fn header_root_matches_block_root() {
        let mut block = BeaconBlock::<MinimalEthSpec>::empty();
        block.slot = Slot::new(3);
        block.state_root = Hash256::repeat_byte(1);
        assert_eq!(block.block_header().canonical_root(), block.canonical_root());
        assert_eq!(block.temporary_block_header().state_root, Hash256::ZERO);
    }
}
