use crate::arith::SafeArith;
use crate::beacon_state::{BeaconState, Checkpoint, Error as BeaconStateError};
use crate::errors::EpochProcessingError as Error;
use crate::per_epoch_processing::validator_statuses::TotalBalances;
use crate::slot_epoch::Epoch;
use crate::spec::EthSpec;
use crate::{BitVector, Hash256};

/// The finality fields of a `BeaconState`, detached so the FFG rules can be evaluated without
/// holding the whole state.
#[must_use = "this value must be applied to a state or explicitly dropped"]
#[derive(Debug, Clone, PartialEq)]
pub struct JustificationAndFinalizationState<E: EthSpec> {
    previous_epoch: Epoch,
    previous_epoch_target_root: Result<Hash256, BeaconStateError>,
    current_epoch: Epoch,
    current_epoch_target_root: Result<Hash256, BeaconStateError>,
    previous_justified_checkpoint: Checkpoint,
    current_justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    justification_bits: BitVector<E::JustificationBitsLength>,
}

impl<E: EthSpec> JustificationAndFinalizationState<E> {
    pub fn new(state: &BeaconState<E>) -> Self {
        let previous_epoch = state.previous_epoch();
        let current_epoch = state.current_epoch();
        Self {
            previous_epoch,
            // Target roots are only needed when an epoch is justified. Lookup errors are kept
            // and surface only then.
            previous_epoch_target_root: state.get_block_root_at_epoch(previous_epoch).copied(),
            current_epoch,
            current_epoch_target_root: state.get_block_root_at_epoch(current_epoch).copied(),
            previous_justified_checkpoint: state.previous_justified_checkpoint,
            current_justified_checkpoint: state.current_justified_checkpoint,
            finalized_checkpoint: state.finalized_checkpoint,
            justification_bits: state.justification_bits.clone(),
        }
    }

    pub fn apply_changes_to_state(self, state: &mut BeaconState<E>) {
        state.previous_justified_checkpoint = self.previous_justified_checkpoint;
        state.current_justified_checkpoint = self.current_justified_checkpoint;
        state.finalized_checkpoint = self.finalized_checkpoint;
        state.justification_bits = self.justification_bits;
    }

    fn get_block_root_at_epoch(&self, epoch: Epoch) -> Result<Hash256, BeaconStateError> {
        if epoch == self.previous_epoch {
            self.previous_epoch_target_root.clone()
        } else if epoch == self.current_epoch {
            self.current_epoch_target_root.clone()
        } else {
            Err(BeaconStateError::SlotOutOfBounds)
        }
    }

    pub const fn previous_justified_checkpoint(&self) -> Checkpoint {
        self.previous_justified_checkpoint
    }

    pub const fn current_justified_checkpoint(&self) -> Checkpoint {
        self.current_justified_checkpoint
    }

    pub const fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    pub const fn justification_bits(&self) -> &BitVector<E::JustificationBitsLength> {
        &self.justification_bits
    }
}

/// Update the justified and finalized checkpoints for matching target attestations.
///
/// Nothing happens for the first two epochs after genesis.
pub fn process_justification_and_finalization<E: EthSpec>(
    state: &BeaconState<E>,
    total_balances: &TotalBalances,
) -> Result<JustificationAndFinalizationState<E>, Error> {
    let justification_and_finalization_state = JustificationAndFinalizationState::new(state);

    if state.current_epoch() <= E::genesis_epoch().safe_add(1u64)? {
        return Ok(justification_and_finalization_state);
    }

    weigh_justification_and_finalization(
        justification_and_finalization_state,
        total_balances.current_epoch(),
        total_balances.previous_epoch_target_attesters(),
        total_balances.current_epoch_target_attesters(),
    )
}

/// Apply the FFG justification and finalization rules given the target balances of the
/// previous and current epochs.
pub fn weigh_justification_and_finalization<E: EthSpec>(
    mut state: JustificationAndFinalizationState<E>,
    total_active_balance: u64,
    previous_target_balance: u64,
    current_target_balance: u64,
) -> Result<JustificationAndFinalizationState<E>, Error> {
    let previous_epoch = state.previous_epoch;
    let current_epoch = state.current_epoch;

    let old_previous_justified_checkpoint = state.previous_justified_checkpoint;
    let old_current_justified_checkpoint = state.current_justified_checkpoint;

    // Process justifications
    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    state.justification_bits.shift_up(1).map_err(Error::InvalidJustificationBit)?;

    if previous_target_balance.safe_mul(3)? >= total_active_balance.safe_mul(2)? {
        state.current_justified_checkpoint =
            Checkpoint { epoch: previous_epoch, root: state.get_block_root_at_epoch(previous_epoch)? };
        state.justification_bits.set(1, true).map_err(Error::InvalidJustificationBit)?;
    }
    // If the current epoch gets justified, fill the last bit.
    if current_target_balance.safe_mul(3)? >= total_active_balance.safe_mul(2)? {
        state.current_justified_checkpoint =
            Checkpoint { epoch: current_epoch, root: state.get_block_root_at_epoch(current_epoch)? };
        state.justification_bits.set(0, true).map_err(Error::InvalidJustificationBit)?;
    }

    let bits = state.justification_bits.clone();
    let all_bits_set = |mut range: std::ops::Range<usize>| range.all(|i| bits.get(i).unwrap_or(false));

    // The 2nd/3rd/4th most recent epochs are all justified, the 2nd using the 4th as source.
    if all_bits_set(1..4) && old_previous_justified_checkpoint.epoch.safe_add(3u64)? == current_epoch {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }
    // The 2nd/3rd most recent epochs are both justified, the 2nd using the 3rd as source.
    if all_bits_set(1..3) && old_previous_justified_checkpoint.epoch.safe_add(2u64)? == current_epoch {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }
    // The 1st/2nd/3rd most recent epochs are all justified, the 1st using the 3rd as source.
    if all_bits_set(0..3) && old_current_justified_checkpoint.epoch.safe_add(2u64)? == current_epoch {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }
    // The 1st/2nd most recent epochs are both justified, the 1st using the 2nd as source.
    if all_bits_set(0..2) && old_current_justified_checkpoint.epoch.safe_add(1u64)? == current_epoch {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MinimalEthSpec;

    type E = MinimalEthSpec;

    const TOTAL: u64 = 64_000_000_000;

    fn root(epoch: u64) -> Hash256 {
        Hash256::repeat_byte(epoch as u8 + 1)
    }

    fn checkpoint(epoch: u64) -> Checkpoint {
        Checkpoint { epoch: Epoch::new(epoch), root: root(epoch) }
    }

    /// Carries the finality fields of `prev` into the next epoch, as the state would.
    fn next_epoch(prev: &JustificationAndFinalizationState<E>) -> JustificationAndFinalizationState<E> {
        let current = prev.current_epoch.as_u64() + 1;
        JustificationAndFinalizationState {
            previous_epoch: Epoch::new(current - 1),
            previous_epoch_target_root: Ok(root(current - 1)),
            current_epoch: Epoch::new(current),
            current_epoch_target_root: Ok(root(current)),
            previous_justified_checkpoint: prev.previous_justified_checkpoint,
            current_justified_checkpoint: prev.current_justified_checkpoint,
            finalized_checkpoint: prev.finalized_checkpoint,
            justification_bits: prev.justification_bits.clone(),
        }
    }

    fn genesis() -> JustificationAndFinalizationState<E> {
        JustificationAndFinalizationState {
            previous_epoch: Epoch::new(0),
            previous_epoch_target_root: Ok(root(0)),
            current_epoch: Epoch::new(1),
            current_epoch_target_root: Ok(root(1)),
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
            justification_bits: BitVector::new(),
        }
    }

    fn bits_set(state: &JustificationAndFinalizationState<E>) -> Vec<usize> {
        (0..4).filter(|&i| state.justification_bits.get(i).unwrap()).collect()
    }

    #[test]
    fn previous_epoch_only_finalizes_through_oldest_rule() {
        // Every target vote lands one epoch late, so only the previous epoch is ever justified.
        let mut state = genesis();
        for _ in 2..=4 {
            state = weigh_justification_and_finalization(next_epoch(&state), TOTAL, TOTAL, 0).unwrap();
        }

        assert_eq!(state.current_epoch, Epoch::new(4));
        assert_eq!(bits_set(&state), vec![1, 2, 3]);
        assert_eq!(state.current_justified_checkpoint(), checkpoint(3));
        assert_eq!(state.previous_justified_checkpoint(), checkpoint(2));
        assert_eq!(state.finalized_checkpoint(), checkpoint(1));

        let state = weigh_justification_and_finalization(next_epoch(&state), TOTAL, TOTAL, 0).unwrap();
        assert_eq!(state.finalized_checkpoint(), checkpoint(2));
    }

    #[test]
    fn full_participation_finalizes_previous_epoch() {
        let mut state = genesis();

        state = weigh_justification_and_finalization(next_epoch(&state), TOTAL, TOTAL, TOTAL).unwrap();
        assert_eq!(bits_set(&state), vec![0, 1]);
        assert_eq!(state.current_justified_checkpoint(), checkpoint(2));
        assert_eq!(state.finalized_checkpoint(), Checkpoint::default());

        state = weigh_justification_and_finalization(next_epoch(&state), TOTAL, TOTAL, TOTAL).unwrap();
        assert_eq!(state.current_justified_checkpoint(), checkpoint(3));
        assert_eq!(state.finalized_checkpoint(), checkpoint(2));
    }

    #[test]
    fn two_thirds_is_inclusive() {
        let state = weigh_justification_and_finalization(next_epoch(&genesis()), 3, 2, 1).unwrap();
        assert_eq!(bits_set(&state), vec![1]);
        assert_eq!(state.current_justified_checkpoint(), checkpoint(1));
    }

    #[test]
    fn missing_target_root_only_fails_when_needed() {
        let mut state = next_epoch(&genesis());
        state.current_epoch_target_root = Err(BeaconStateError::SlotOutOfBounds);

        assert!(weigh_justification_and_finalization(state.clone(), TOTAL, TOTAL, 0).is_ok());
        assert_eq!(
            weigh_justification_and_finalization(state, TOTAL, TOTAL, TOTAL),
            Err(Error::BeaconStateError(BeaconStateError::SlotOutOfBounds))
        );
    }
}
