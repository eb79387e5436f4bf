//! Per-validator participation flags for the epoch being closed, and the balance totals derived
//! from them.

use crate::arith::SafeArith;
use crate::beacon_state::{BeaconState, Error as BeaconStateError};
use crate::cancel::CancelToken;
use crate::common::get_attesting_indices;
use crate::pending_attestation::PendingAttestation;
use crate::slot_epoch::Epoch;
use crate::spec::{EthSpec, Spec};
use bitflags::bitflags;

bitflags! {
    /// What a single validator did during the current and previous epochs.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct AttesterFlags: u16 {
        const SLASHED = 1 << 0;
        /// Earns rewards or penalties for the previous epoch.
        const ELIGIBLE = 1 << 1;
        const ACTIVE_IN_CURRENT_EPOCH = 1 << 2;
        const ACTIVE_IN_PREVIOUS_EPOCH = 1 << 3;
        const CURRENT_EPOCH_ATTESTER = 1 << 4;
        const CURRENT_EPOCH_TARGET_ATTESTER = 1 << 5;
        const CURRENT_EPOCH_HEAD_ATTESTER = 1 << 6;
        const PREVIOUS_EPOCH_ATTESTER = 1 << 7;
        const PREVIOUS_EPOCH_TARGET_ATTESTER = 1 << 8;
        const PREVIOUS_EPOCH_HEAD_ATTESTER = 1 << 9;
    }
}

/// The earliest inclusion of any previous-epoch attestation a validator took part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusionInfo {
    /// Slots between the attested slot and the slot of the including block.
    pub delay: u64,
    /// Proposer of the including block.
    pub proposer_index: usize,
}

impl Default for InclusionInfo {
    /// Defaults to `delay` at its maximum value and `proposer_index` at zero.
    fn default() -> Self {
        Self { delay: u64::MAX, proposer_index: 0 }
    }
}

impl InclusionInfo {
    /// Keep whichever record has the smaller delay. On a tie the record already held wins, so
    /// the proposer of the first-processed attestation is credited.
    pub fn update(&mut self, other: &Self) {
        if other.delay < self.delay {
            *self = *other;
        }
    }
}

/// Participation of one validator.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidatorStatus {
    pub flags: AttesterFlags,
    /// Effective balance at the start of the current epoch.
    pub current_epoch_effective_balance: u64,
    /// Only set for previous-epoch attesters.
    pub inclusion_info: Option<InclusionInfo>,
}

impl ValidatorStatus {
    /// Merge the flags and inclusion record of `other` into `self`.
    pub fn update(&mut self, other: &Self) {
        self.flags |= other.flags;

        if let Some(other_info) = other.inclusion_info {
            match self.inclusion_info.as_mut() {
                Some(info) => info.update(&other_info),
                None => self.inclusion_info = Some(other_info),
            }
        }
    }

    pub const fn is_slashed(&self) -> bool {
        self.flags.contains(AttesterFlags::SLASHED)
    }

    pub const fn is_eligible(&self) -> bool {
        self.flags.contains(AttesterFlags::ELIGIBLE)
    }

    pub const fn is_active_in_current_epoch(&self) -> bool {
        self.flags.contains(AttesterFlags::ACTIVE_IN_CURRENT_EPOCH)
    }

    pub const fn is_active_in_previous_epoch(&self) -> bool {
        self.flags.contains(AttesterFlags::ACTIVE_IN_PREVIOUS_EPOCH)
    }

    pub const fn is_current_epoch_attester(&self) -> bool {
        self.flags.contains(AttesterFlags::CURRENT_EPOCH_ATTESTER)
    }

    pub const fn is_current_epoch_target_attester(&self) -> bool {
        self.flags.contains(AttesterFlags::CURRENT_EPOCH_TARGET_ATTESTER)
    }

    pub const fn is_current_epoch_head_attester(&self) -> bool {
        self.flags.contains(AttesterFlags::CURRENT_EPOCH_HEAD_ATTESTER)
    }

    pub const fn is_previous_epoch_attester(&self) -> bool {
        self.flags.contains(AttesterFlags::PREVIOUS_EPOCH_ATTESTER)
    }

    pub const fn is_previous_epoch_target_attester(&self) -> bool {
        self.flags.contains(AttesterFlags::PREVIOUS_EPOCH_TARGET_ATTESTER)
    }

    pub const fn is_previous_epoch_head_attester(&self) -> bool {
        self.flags.contains(AttesterFlags::PREVIOUS_EPOCH_HEAD_ATTESTER)
    }

    /// Helper for the unslashed participation checks used by rewards and finality.
    pub const fn is_unslashed_and(&self, flag: AttesterFlags) -> bool {
        !self.is_slashed() && self.flags.contains(flag)
    }
}

/// Sums of effective balances, each floored at one `EFFECTIVE_BALANCE_INCREMENT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalBalances {
    pub(crate) effective_balance_increment: u64,
    pub(crate) current_epoch: u64,
    pub(crate) previous_epoch: u64,
    pub(crate) current_epoch_attesters: u64,
    pub(crate) current_epoch_target_attesters: u64,
    pub(crate) current_epoch_head_attesters: u64,
    pub(crate) previous_epoch_attesters: u64,
    pub(crate) previous_epoch_target_attesters: u64,
    pub(crate) previous_epoch_head_attesters: u64,
}

// Generate an accessor that floors a balance in `TotalBalances` at one increment.
macro_rules! balance_accessor {
    ($field_name:ident) => {
        pub fn $field_name(&self) -> u64 {
            std::cmp::max(self.effective_balance_increment, self.$field_name)
        }
    };
}

impl TotalBalances {
    pub const fn new(spec: &Spec) -> Self {
        Self {
            effective_balance_increment: spec.effective_balance_increment,
            current_epoch: 0,
            previous_epoch: 0,
            current_epoch_attesters: 0,
            current_epoch_target_attesters: 0,
            current_epoch_head_attesters: 0,
            previous_epoch_attesters: 0,
            previous_epoch_target_attesters: 0,
            previous_epoch_head_attesters: 0,
        }
    }

    balance_accessor!(current_epoch);
    balance_accessor!(previous_epoch);
    balance_accessor!(current_epoch_attesters);
    balance_accessor!(current_epoch_target_attesters);
    balance_accessor!(current_epoch_head_attesters);
    balance_accessor!(previous_epoch_attesters);
    balance_accessor!(previous_epoch_target_attesters);
    balance_accessor!(previous_epoch_head_attesters);
}

/// Participation of every validator in the registry, indexed by validator index.
#[derive(Debug, Clone)]
pub struct ValidatorStatuses {
    pub statuses: Vec<ValidatorStatus>,
    pub total_balances: TotalBalances,
}

impl ValidatorStatuses {
    /// Initializes a status for every validator, recording slashing, activity and eligibility
    /// along with the active balance totals of both epochs.
    pub fn new<E: EthSpec>(
        state: &BeaconState<E>,
        spec: &Spec,
        cancel: &CancelToken,
    ) -> Result<Self, BeaconStateError> {
        let mut statuses = Vec::with_capacity(state.validators.len());
        let mut total_balances = TotalBalances::new(spec);

        let current_epoch = state.current_epoch();
        let previous_epoch = state.previous_epoch();
        let context = state.epoch_context()?;

        for (i, validator) in state.validators.iter().enumerate() {
            cancel.checkpoint(i)?;

            // Validators deposited during this epoch are missing from the snapshot. They are not
            // active in either epoch, so their live effective balance is never summed.
            let effective_balance =
                context.get_effective_balance(i).unwrap_or(validator.effective_balance);
            let mut status = ValidatorStatus {
                current_epoch_effective_balance: effective_balance,
                ..ValidatorStatus::default()
            };

            if validator.slashed {
                status.flags |= AttesterFlags::SLASHED;
            }

            if validator.is_active_at(current_epoch) {
                status.flags |= AttesterFlags::ACTIVE_IN_CURRENT_EPOCH;
                total_balances.current_epoch.safe_add_assign(effective_balance)?;
            }

            if validator.is_active_at(previous_epoch) {
                status.flags |= AttesterFlags::ACTIVE_IN_PREVIOUS_EPOCH;
                total_balances.previous_epoch.safe_add_assign(effective_balance)?;
            }

            if state.is_eligible_validator(previous_epoch, validator)? {
                status.flags |= AttesterFlags::ELIGIBLE;
            }

            statuses.push(status);
        }

        Ok(Self { statuses, total_balances })
    }

    /// Process some attestations from the given `state` updating the `statuses` and
    /// `total_balances` fields.
    pub fn process_attestations<E: EthSpec>(
        &mut self,
        state: &BeaconState<E>,
        cancel: &CancelToken,
    ) -> Result<(), BeaconStateError> {
        let attestations =
            state.previous_epoch_attestations.iter().chain(state.current_epoch_attestations.iter());

        for (i, a) in attestations.enumerate() {
            cancel.checkpoint(i)?;

            let committee = state.get_beacon_committee(a.data.slot, a.data.index)?;
            let attesting_indices =
                get_attesting_indices::<E>(committee.committee, &a.aggregation_bits)?;

            let mut status = ValidatorStatus::default();

            // At genesis the previous and current epochs coincide; such attestations count
            // towards the current epoch only.
            if a.data.target.epoch == state.current_epoch() {
                status.flags |= AttesterFlags::CURRENT_EPOCH_ATTESTER;

                if target_matches_epoch_start_block(a, state, state.current_epoch())? {
                    status.flags |= AttesterFlags::CURRENT_EPOCH_TARGET_ATTESTER;

                    if has_common_beacon_block_root(a, state)? {
                        status.flags |= AttesterFlags::CURRENT_EPOCH_HEAD_ATTESTER;
                    }
                }
            } else if a.data.target.epoch == state.previous_epoch() {
                status.flags |= AttesterFlags::PREVIOUS_EPOCH_ATTESTER;

                status.inclusion_info = Some(InclusionInfo {
                    delay: a.inclusion_delay,
                    proposer_index: a.proposer_index as usize,
                });

                if target_matches_epoch_start_block(a, state, state.previous_epoch())? {
                    status.flags |= AttesterFlags::PREVIOUS_EPOCH_TARGET_ATTESTER;

                    if has_common_beacon_block_root(a, state)? {
                        status.flags |= AttesterFlags::PREVIOUS_EPOCH_HEAD_ATTESTER;
                    }
                }
            }

            for &index in &attesting_indices {
                self.statuses
                    .get_mut(index)
                    .ok_or(BeaconStateError::UnknownValidator(index))?
                    .update(&status);
            }
        }

        // Only unslashed validators count towards the participation totals.
        for (index, v) in self.statuses.iter().enumerate() {
            if v.is_slashed() {
                continue;
            }
            let balance = v.current_epoch_effective_balance;
            let totals = &mut self.total_balances;

            if v.is_current_epoch_attester() {
                totals.current_epoch_attesters.safe_add_assign(balance)?;
            }
            if v.is_current_epoch_target_attester() {
                totals.current_epoch_target_attesters.safe_add_assign(balance)?;
            }
            if v.is_current_epoch_head_attester() {
                totals.current_epoch_head_attesters.safe_add_assign(balance)?;
            }
            if v.is_previous_epoch_attester() {
                totals.previous_epoch_attesters.safe_add_assign(balance)?;
            }
            if v.is_previous_epoch_target_attester() {
                totals.previous_epoch_target_attesters.safe_add_assign(balance)?;
            }
            if v.is_previous_epoch_head_attester() {
                totals.previous_epoch_head_attesters.safe_add_assign(balance)?;
            }

            cancel.checkpoint(index)?;
        }

        Ok(())
    }
}

/// Returns `true` if the attestation's FFG target is equal to the hash of the `state`'s first
/// beacon block in the given `epoch`.
fn target_matches_epoch_start_block<E: EthSpec>(
    a: &PendingAttestation<E>,
    state: &BeaconState<E>,
    epoch: Epoch,
) -> Result<bool, BeaconStateError> {
    let state_boundary_root = *state.get_block_root_at_epoch(epoch)?;
    Ok(a.data.target.root == state_boundary_root)
}

/// Returns `true` if a `PendingAttestation` and `BeaconState` share the same beacon block hash
/// for the current slot of the `PendingAttestation`.
fn has_common_beacon_block_root<E: EthSpec>(
    a: &PendingAttestation<E>,
    state: &BeaconState<E>,
) -> Result<bool, BeaconStateError> {
    let state_block_root = *state.get_block_root(a.data.slot)?;
    Ok(a.data.beacon_block_root == state_block_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusion_keeps_smallest_delay_and_first_on_tie() {
        let mut info = InclusionInfo::default();
        info.update(&InclusionInfo { delay: 3, proposer_index: 7 });
        assert_eq!(info, InclusionInfo { delay: 3, proposer_index: 7 });

        info.update(&InclusionInfo { delay: 3, proposer_index: 9 });
        assert_eq!(info.proposer_index, 7);

        info.update(&InclusionInfo { delay: 1, proposer_index: 2 });
        assert_eq!(info, InclusionInfo { delay: 1, proposer_index: 2 });
    }

    #[test]
    fn status_update_merges_flags() {
        let mut status = ValidatorStatus {
            flags: AttesterFlags::ELIGIBLE,
            ..Default::default()
        };
        status.update(&ValidatorStatus {
            flags: AttesterFlags::PREVIOUS_EPOCH_ATTESTER,
            inclusion_info: Some(InclusionInfo { delay: 2, proposer_index: 1 }),
            ..Default::default()
        });

        assert!(status.is_eligible());
        assert!(status.is_previous_epoch_attester());
        assert!(!status.is_previous_epoch_target_attester());
        assert_eq!(status.inclusion_info.map(|i| i.delay), Some(2));
    }

    #[test]
    fn totals_are_floored_at_one_increment() {
        let spec = Spec::minimal();
        let totals = TotalBalances::new(&spec);
        assert_eq!(totals.current_epoch(), spec.effective_balance_increment);
        assert_eq!(totals.previous_epoch_head_attesters(), spec.effective_balance_increment);
    }
}
