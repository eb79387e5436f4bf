use crate::beacon_state::Checkpoint;
use crate::signing_data::SignedRoot;
use crate::slot_epoch::Slot;
use crate::Hash256;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

/// The data upon which an attestation is based.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash, Encode, Decode, TreeHash, Default,
)]
pub struct AttestationData {
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,

    // LMD GHOST vote
    pub beacon_block_root: Hash256,

    // FFG Vote
    pub source: Checkpoint,
    pub target: Checkpoint,
}

impl SignedRoot for AttestationData {}

impl AttestationData {
    /// Double vote: same target epoch, different data.
    pub fn is_double_vote(&self, other: &Self) -> bool {
        self != other && self.target.epoch == other.target.epoch
    }

    /// Surround vote: `self` surrounds `other`.
    pub fn is_surround_vote(&self, other: &Self) -> bool {
        self.source.epoch < other.source.epoch && other.target.epoch < self.target.epoch
    }
}
