use crate::slot_epoch::Slot;
use serde::{Deserialize, Serialize};

pub type CommitteeIndex = u64;

/// A committee borrowed from a `CommitteeCache`.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct BeaconCommittee<'a> {
    pub slot: Slot,
    pub index: CommitteeIndex,
    pub committee: &'a [usize],
}

impl BeaconCommittee<'_> {
    pub fn into_owned(self) -> OwnedBeaconCommittee {
        OwnedBeaconCommittee { slot: self.slot, index: self.index, committee: self.committee.to_vec() }
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedBeaconCommittee {
    pub slot: Slot,
    pub index: CommitteeIndex,
    pub committee: Vec<usize>,
}
