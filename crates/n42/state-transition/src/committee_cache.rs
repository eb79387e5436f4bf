use crate::beacon_committee::{BeaconCommittee, CommitteeIndex};
use crate::beacon_state::Error;
use crate::cancel::CancelToken;
use crate::shuffle_list::shuffle_list;
use crate::slot_epoch::{Epoch, Slot};
use crate::spec::{EthSpec, Spec};
use crate::validator::Validator;
use crate::Hash256;
use std::num::NonZeroUsize;
use std::ops::Range;

/// Computes and stores the shuffling for an epoch. Provides various getters to allow callers to
/// read the committees for the given epoch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommitteeCache {
    initialized_epoch: Option<Epoch>,
    /// Active validator indices in registry order.
    active_validator_indices: Vec<usize>,
    shuffling: Vec<usize>,
    /// `shuffling_positions[v] == Some(i + 1)` when `shuffling[i] == v`.
    shuffling_positions: Vec<Option<NonZeroUsize>>,
    committees_per_slot: u64,
    slots_per_epoch: u64,
}

/// The committee assignment of a single validator for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttestationDuty {
    pub slot: Slot,
    pub index: CommitteeIndex,
    pub committee_position: usize,
    pub committee_len: usize,
    pub committees_at_slot: u64,
}

/// Returns the indices of validators active at `epoch`, in registry order.
pub fn get_active_validator_indices(
    validators: &[Validator],
    epoch: Epoch,
    cancel: &CancelToken,
) -> Result<Vec<usize>, Error> {
    let mut active = Vec::with_capacity(validators.len());

    for (index, validator) in validators.iter().enumerate() {
        cancel.checkpoint(index)?;
        if validator.is_active_at(epoch) {
            active.push(index);
        }
    }

    Ok(active)
}

impl CommitteeCache {
    /// Return a new, fully initialized cache.
    ///
    /// `seed` must be the attester-domain seed for `epoch`.
    pub fn initialized<E: EthSpec>(
        validators: &[Validator],
        epoch: Epoch,
        seed: Hash256,
        spec: &Spec,
        cancel: &CancelToken,
    ) -> Result<Self, Error> {
        if E::slots_per_epoch() == 0 {
            return Err(Error::ZeroSlotsPerEpoch);
        }

        let active_validator_indices = get_active_validator_indices(validators, epoch, cancel)?;

        if active_validator_indices.is_empty() {
            return Err(Error::InsufficientValidators);
        }

        let committees_per_slot =
            E::get_committee_count_per_slot(active_validator_indices.len(), spec)? as u64;

        let shuffling = shuffle_list(
            active_validator_indices.clone(),
            spec.shuffle_round_count,
            seed.as_slice(),
            false,
        )
        .ok_or(Error::UnableToShuffle)?;

        let mut shuffling_positions = vec![None; validators.len()];
        for (i, &v) in shuffling.iter().enumerate() {
            cancel.checkpoint(i)?;
            *shuffling_positions.get_mut(v).ok_or(Error::ShuffleIndexOutOfBounds(v))? =
                NonZeroUsize::new(i + 1);
        }

        Ok(Self {
            initialized_epoch: Some(epoch),
            active_validator_indices,
            shuffling,
            shuffling_positions,
            committees_per_slot,
            slots_per_epoch: E::slots_per_epoch(),
        })
    }

    /// Returns `true` if the cache has been initialized at the supplied `epoch`.
    ///
    /// An non-initialized cache does not provide any useful information.
    pub fn is_initialized_at(&self, epoch: Epoch) -> bool {
        Some(epoch) == self.initialized_epoch
    }

    pub const fn initialized_epoch(&self) -> Option<Epoch> {
        self.initialized_epoch
    }

    /// Returns the active validator indices in registry order.
    pub fn active_validator_indices(&self) -> &[usize] {
        &self.active_validator_indices
    }

    /// Returns the active validator indices in shuffled order.
    pub fn shuffling(&self) -> &[usize] {
        &self.shuffling
    }

    pub fn active_validator_count(&self) -> usize {
        self.shuffling.len()
    }

    pub const fn committees_per_slot(&self) -> u64 {
        self.committees_per_slot
    }

    /// Get the Beacon committee for the given `slot` and `index`.
    ///
    /// Return `None` if the cache is uninitialized, or the `slot` or `index` is out of range.
    pub fn get_beacon_committee(
        &self,
        slot: Slot,
        index: CommitteeIndex,
    ) -> Option<BeaconCommittee<'_>> {
        if self.initialized_epoch.is_none() ||
            !self.is_initialized_at(slot.epoch(self.slots_per_epoch)) ||
            index >= self.committees_per_slot
        {
            return None;
        }

        let committee_index = compute_committee_index_in_epoch(
            slot,
            self.slots_per_epoch as usize,
            self.committees_per_slot as usize,
            index as usize,
        );
        let committee = self.compute_committee(committee_index)?;

        Some(BeaconCommittee { slot, index, committee })
    }

    /// Get all the Beacon committees at a given `slot`.
    pub fn get_beacon_committees_at_slot(&self, slot: Slot) -> Result<Vec<BeaconCommittee<'_>>, Error> {
        if self.initialized_epoch.is_none() {
            return Err(Error::CommitteeCacheUninitialized(None));
        }

        (0..self.committees_per_slot)
            .map(|index| {
                self.get_beacon_committee(slot, index).ok_or(Error::NoCommittee { slot, index })
            })
            .collect()
    }

    /// Returns all committees for `self.initialized_epoch`, ordered by slot then index.
    pub fn get_all_beacon_committees(&self) -> Result<Vec<BeaconCommittee<'_>>, Error> {
        let initialized_epoch =
            self.initialized_epoch.ok_or(Error::CommitteeCacheUninitialized(None))?;

        let start = initialized_epoch.start_slot(self.slots_per_epoch).as_u64();
        let mut committees = Vec::with_capacity(self.epoch_committee_count());
        for slot in start..start.saturating_add(self.slots_per_epoch) {
            committees.extend(self.get_beacon_committees_at_slot(Slot::new(slot))?);
        }
        Ok(committees)
    }

    /// Returns the `AttestationDuty` for the given `validator_index`.
    ///
    /// Returns `None` if the `validator_index` is out of bounds or not active in the epoch.
    pub fn get_attestation_duties(&self, validator_index: usize) -> Option<AttestationDuty> {
        let i = self.shuffled_position(validator_index)?;

        (0..self.epoch_committee_count())
            .map(|nth_committee| (nth_committee, self.compute_committee_range(nth_committee)))
            .find(|(_, range)| range.as_ref().is_some_and(|range| range.contains(&i)))
            .and_then(|(nth_committee, range)| {
                let range = range?;
                let epoch = self.initialized_epoch?;
                let (slot, index) = self.convert_to_slot_and_index(epoch, nth_committee as u64)?;
                Some(AttestationDuty {
                    slot,
                    index,
                    committee_position: i - range.start,
                    committee_len: range.end - range.start,
                    committees_at_slot: self.committees_per_slot,
                })
            })
    }

    /// Convert an index addressing the list of all epoch committees into a slot and per-slot
    /// committee index.
    fn convert_to_slot_and_index(
        &self,
        epoch: Epoch,
        global_committee_index: u64,
    ) -> Option<(Slot, CommitteeIndex)> {
        let epoch_start_slot = epoch.start_slot(self.slots_per_epoch);
        let slot_offset = global_committee_index / self.committees_per_slot;
        let index = global_committee_index % self.committees_per_slot;
        Some((Slot::new(epoch_start_slot.as_u64().checked_add(slot_offset)?), index))
    }

    /// Returns the total number of committees in the initialized epoch.
    ///
    /// Always returns `usize::default()` for a non-initialized epoch.
    pub fn epoch_committee_count(&self) -> usize {
        epoch_committee_count(self.committees_per_slot as usize, self.slots_per_epoch as usize)
    }

    /// Returns a slice of `self.shuffling` that represents the `index`'th committee in the epoch.
    fn compute_committee(&self, index: usize) -> Option<&[usize]> {
        self.shuffling.get(self.compute_committee_range(index)?)
    }

    /// Returns a range of `self.shuffling` that represents the `index`'th committee in the epoch.
    ///
    /// To avoid a divide-by-zero, returns `None` if `self.committee_count` is zero.
    ///
    /// Will also return `None` if the index is out of bounds.
    fn compute_committee_range(&self, index: usize) -> Option<Range<usize>> {
        compute_committee_range_in_epoch(self.epoch_committee_count(), index, self.shuffling.len())
    }

    /// Returns the index of some validator in `self.shuffling`.
    ///
    /// Always returns `None` for a non-initialized epoch.
    pub fn shuffled_position(&self, validator_index: usize) -> Option<usize> {
        self.shuffling_positions
            .get(validator_index)?
            .map(|p| p.get() - 1)
    }
}

/// Computes the position of the given `committee_index` with respect to all committees in the
/// epoch.
///
/// The return result may be used to provide input to the `compute_committee_range_in_epoch`
/// function.
pub const fn compute_committee_index_in_epoch(
    slot: Slot,
    slots_per_epoch: usize,
    committees_per_slot: usize,
    committee_index: usize,
) -> usize {
    (slot.as_usize() % slots_per_epoch) * committees_per_slot + committee_index
}

/// Computes the range for slicing the shuffled indices to determine the members of a committee.
///
/// Each boundary is recomputed from scratch as `len * i / count`, so no rounding error
/// accumulates across committees.
pub fn compute_committee_range_in_epoch(
    epoch_committee_count: usize,
    index_in_epoch: usize,
    shuffling_len: usize,
) -> Option<Range<usize>> {
    if epoch_committee_count == 0 || index_in_epoch >= epoch_committee_count {
        return None;
    }

    let start = shuffling_len.checked_mul(index_in_epoch)? / epoch_committee_count;
    let end = shuffling_len.checked_mul(index_in_epoch + 1)? / epoch_committee_count;

    Some(start..end)
}

/// Returns the total number of committees in an epoch.
pub const fn epoch_committee_count(committees_per_slot: usize, slots_per_epoch: usize) -> usize {
    committees_per_slot * slots_per_epoch
}
