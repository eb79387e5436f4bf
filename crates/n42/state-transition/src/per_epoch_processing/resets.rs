//! The bookkeeping run at the end of every epoch, once rewards and registry changes are applied.

use crate::arith::SafeArith;
use crate::beacon_state::{BeaconState, HistoricalBatch};
use crate::cancel::CancelToken;
use crate::errors::EpochProcessingError as Error;
use crate::spec::{EthSpec, Spec};
use crate::{Unsigned, VariableList};
use tree_hash::TreeHash;

/// Clear the eth1 votes at the end of each voting period.
pub fn process_eth1_data_reset<E: EthSpec>(state: &mut BeaconState<E>) -> Result<(), Error> {
    let next_slot = state.slot.as_u64().safe_add(1)?;
    if next_slot.safe_rem(E::SlotsPerEth1VotingPeriod::to_u64())? == 0 {
        state.eth1_data_votes = VariableList::empty();
    }
    Ok(())
}

/// Move effective balances towards actual balances, with hysteresis.
pub fn process_effective_balance_updates<E: EthSpec>(
    state: &mut BeaconState<E>,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<(), Error> {
    let hysteresis_increment = spec.effective_balance_increment.safe_div(spec.hysteresis_quotient)?;
    let downward_threshold = hysteresis_increment.safe_mul(spec.hysteresis_downward_multiplier)?;
    let upward_threshold = hysteresis_increment.safe_mul(spec.hysteresis_upward_multiplier)?;

    let BeaconState { validators, balances, .. } = state;
    for (index, validator) in validators.iter_mut().enumerate() {
        cancel.checkpoint(index)?;

        let balance = balances
            .get(index)
            .copied()
            .ok_or(crate::beacon_state::Error::BalancesOutOfBounds(index))?;

        if balance.safe_add(downward_threshold)? < validator.effective_balance ||
            validator.effective_balance.safe_add(upward_threshold)? < balance
        {
            validator.effective_balance = std::cmp::min(
                balance.safe_sub(balance.safe_rem(spec.effective_balance_increment)?)?,
                spec.max_effective_balance,
            );
        }
    }
    Ok(())
}

/// Zero the slashings accumulator slot of the next epoch.
pub fn process_slashings_reset<E: EthSpec>(state: &mut BeaconState<E>) -> Result<(), Error> {
    let next_epoch = state.next_epoch()?;
    state.set_slashings(next_epoch, 0)?;
    Ok(())
}

/// Seed the next epoch's randao mix with the current one.
pub fn process_randao_mixes_reset<E: EthSpec>(state: &mut BeaconState<E>) -> Result<(), Error> {
    let current_epoch = state.current_epoch();
    let next_epoch = state.next_epoch()?;
    let mix = *state.get_randao_mix(current_epoch)?;
    state.set_randao_mix(next_epoch, mix)?;
    Ok(())
}

/// Append a historical batch root once every `SLOTS_PER_HISTORICAL_ROOT` slots.
pub fn process_historical_roots_update<E: EthSpec>(state: &mut BeaconState<E>) -> Result<(), Error> {
    let next_epoch = state.next_epoch()?;
    if next_epoch
        .as_u64()
        .safe_rem(E::SlotsPerHistoricalRoot::to_u64().safe_div(E::slots_per_epoch())?)? ==
        0
    {
        let historical_batch = HistoricalBatch::<E> {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        };
        state.historical_roots.push(historical_batch.tree_hash_root())?;
    }
    Ok(())
}

/// Rotate the pending attestations: current becomes previous and current starts empty.
pub fn process_participation_record_updates<E: EthSpec>(
    state: &mut BeaconState<E>,
) -> Result<(), Error> {
    state.previous_epoch_attestations = std::mem::take(&mut state.current_epoch_attestations);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eth1_data::Eth1Data;
    use crate::slot_epoch::{Epoch, Slot};
    use crate::test_utils::genesis_state;
    use crate::{Hash256, MinimalEthSpec};

    type E = MinimalEthSpec;

    #[test]
    fn effective_balance_hysteresis() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(4, &spec);
        let max = spec.max_effective_balance;

        // Within the downward threshold of 0.25 ETH: unchanged.
        state.balances[0] = max - 250_000_000;
        // Just past it: drops to the next increment down.
        state.balances[1] = max - 250_000_001;
        state.validators[2].effective_balance = 20_000_000_000;
        // Needs to exceed 1.25 ETH above the effective balance to move up.
        state.balances[2] = 21_250_000_000;
        state.validators[3].effective_balance = 20_000_000_000;
        state.balances[3] = 21_250_000_001;

        process_effective_balance_updates(&mut state, &spec, &CancelToken::default()).unwrap();

        assert_eq!(state.validators[0].effective_balance, max);
        assert_eq!(state.validators[1].effective_balance, max - 1_000_000_000);
        assert_eq!(state.validators[2].effective_balance, 20_000_000_000);
        assert_eq!(state.validators[3].effective_balance, 21_000_000_000);
    }

    #[test]
    fn effective_balance_is_capped() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(1, &spec);
        state.balances[0] = 40_000_000_000;
        process_effective_balance_updates(&mut state, &spec, &CancelToken::default()).unwrap();
        assert_eq!(state.validators[0].effective_balance, spec.max_effective_balance);
    }

    #[test]
    fn eth1_votes_cleared_at_period_end() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(1, &spec);
        state.eth1_data_votes.push(Eth1Data::default()).unwrap();

        state.slot = Slot::new(E::slots_per_epoch() - 1);
        process_eth1_data_reset(&mut state).unwrap();
        assert_eq!(state.eth1_data_votes.len(), 1);

        state.slot = Slot::new(E::slots_per_eth1_voting_period() as u64 - 1);
        process_eth1_data_reset(&mut state).unwrap();
        assert!(state.eth1_data_votes.is_empty());
    }

    #[test]
    fn randao_and_slashings_roll_forward() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(1, &spec);
        state.slot = Slot::new(E::slots_per_epoch() * 3 - 1);
        state.set_randao_mix(Epoch::new(2), Hash256::repeat_byte(7)).unwrap();
        state.set_slashings(Epoch::new(3), 99).unwrap();

        process_randao_mixes_reset(&mut state).unwrap();
        process_slashings_reset(&mut state).unwrap();

        assert_eq!(*state.get_randao_mix(Epoch::new(3)).unwrap(), Hash256::repeat_byte(7));
        assert_eq!(state.slashings[3], 0);
    }

    #[test]
    fn historical_root_appended_once_per_window() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(1, &spec);
        state.block_roots[0] = Hash256::repeat_byte(1);

        state.slot = Slot::new(E::slots_per_epoch() - 1);
        process_historical_roots_update(&mut state).unwrap();
        assert!(state.historical_roots.is_empty());

        state.slot = Slot::new(E::slots_per_historical_root() as u64 - 1);
        process_historical_roots_update(&mut state).unwrap();
        let expected = HistoricalBatch::<E> {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        }
        .tree_hash_root();
        assert_eq!(state.historical_roots.to_vec(), vec![expected]);
    }
}
