use crate::Hash256;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

/// The consensus-relevant summary of an execution payload.
///
/// Payload execution itself happens in the execution client; the beacon state only tracks the
/// chain of block hashes and the randomness and timestamp each payload committed to. A default
/// (all-zero) header means the execution chain has not been merged in yet.
#[derive(
    Debug, PartialEq, Eq, Clone, Default, Hash, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct ExecutionPayloadHeader {
    pub parent_hash: Hash256,
    pub block_hash: Hash256,
    pub prev_randao: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub block_number: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub timestamp: u64,
}

impl ExecutionPayloadHeader {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}
