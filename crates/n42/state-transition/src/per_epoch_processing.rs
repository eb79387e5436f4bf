use crate::arith::SafeArith;
use crate::beacon_state::{BeaconState, Checkpoint};
use crate::cancel::CancelToken;
use crate::errors::EpochProcessingError as Error;
use crate::slot_epoch::Epoch;
use crate::spec::{EthSpec, Spec};
use tracing::debug;

pub mod justification_and_finalization;
pub mod registry_updates;
pub mod resets;
pub mod rewards_and_penalties;
pub mod slashings;
pub mod validator_statuses;

pub use justification_and_finalization::{
    process_justification_and_finalization, weigh_justification_and_finalization,
    JustificationAndFinalizationState,
};
pub use registry_updates::process_registry_updates;
pub use resets::{
    process_effective_balance_updates, process_eth1_data_reset, process_historical_roots_update,
    process_participation_record_updates, process_randao_mixes_reset, process_slashings_reset,
};
pub use rewards_and_penalties::process_rewards_and_penalties;
pub use slashings::process_slashings;
pub use validator_statuses::{TotalBalances, ValidatorStatus, ValidatorStatuses};

/// Used to track the changes to a validator's balance.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct Delta {
    pub rewards: u64,
    pub penalties: u64,
}

impl Delta {
    /// Reward the validator with the `reward`.
    pub fn reward(&mut self, reward: u64) -> Result<(), Error> {
        self.rewards = self.rewards.safe_add(reward)?;
        Ok(())
    }

    /// Penalize the validator with the `penalty`.
    pub fn penalize(&mut self, penalty: u64) -> Result<(), Error> {
        self.penalties = self.penalties.safe_add(penalty)?;
        Ok(())
    }

    /// Combine two deltas.
    pub(crate) fn combine(&mut self, other: Self) -> Result<(), Error> {
        self.reward(other.rewards)?;
        self.penalize(other.penalties)
    }
}

/// What an epoch transition observed, for callers that report on participation.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochProcessingSummary {
    /// The epoch that was closed.
    pub epoch: Epoch,
    pub total_balances: TotalBalances,
    pub statuses: Vec<ValidatorStatus>,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}

impl EpochProcessingSummary {
    /// The sum of the effective balances of all validators in the current epoch.
    pub fn current_epoch_total_active_balance(&self) -> u64 {
        self.total_balances.current_epoch()
    }

    /// The sum of the effective balances of unslashed validators that matched the previous
    /// epoch's target.
    pub fn previous_epoch_target_attesting_balance(&self) -> u64 {
        self.total_balances.previous_epoch_target_attesters()
    }

    /// Returns `true` if `val_index` was an unslashed previous-epoch target attester.
    ///
    /// Unknown indices return `false`.
    pub fn is_previous_epoch_target_attester(&self, val_index: usize) -> bool {
        self.statuses
            .get(val_index)
            .is_some_and(|s| !s.is_slashed() && s.is_previous_epoch_target_attester())
    }

    pub fn is_active_unslashed_in_current_epoch(&self, val_index: usize) -> bool {
        self.statuses
            .get(val_index)
            .is_some_and(|s| !s.is_slashed() && s.is_active_in_current_epoch())
    }
}

/// Performs per-epoch processing on some BeaconState.
///
/// Must be called while `state.slot` is the last slot of the epoch being closed. On return every
/// epoch-indexed field and the epoch context are ready for the next epoch; the slot itself is
/// advanced by the caller.
pub fn process_epoch<E: EthSpec>(
    state: &mut BeaconState<E>,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<EpochProcessingSummary, Error> {
    // Ensure the committee caches are built.
    state.build_epoch_context(spec, cancel)?;
    state.build_exit_cache(spec)?;

    let epoch = state.current_epoch();

    // Load the struct we use to assign validators into sets based on their participation.
    let mut validator_statuses = ValidatorStatuses::new(state, spec, cancel)?;
    validator_statuses.process_attestations(state, cancel)?;

    // Justification and finalization.
    let justification_and_finalization_state =
        process_justification_and_finalization(state, &validator_statuses.total_balances)?;
    justification_and_finalization_state.apply_changes_to_state(state);

    // Rewards and Penalties.
    process_rewards_and_penalties(state, &validator_statuses, spec, cancel)?;
    cancel.check()?;

    // Registry Updates.
    process_registry_updates(state, spec)?;

    // Slashings.
    process_slashings(state, validator_statuses.total_balances.current_epoch(), spec)?;

    // Reset eth1 data votes.
    process_eth1_data_reset(state)?;

    // Update effective balances with hysteresis (lag).
    process_effective_balance_updates(state, spec, cancel)?;

    // Reset slashings
    process_slashings_reset(state)?;

    // Set randao mix
    process_randao_mixes_reset(state)?;

    // Set historical root accumulator
    process_historical_roots_update(state)?;

    // Rotate current/previous epoch attestations
    process_participation_record_updates(state)?;

    // Rotate the epoch caches to suit the epoch transition.
    let next_epoch = state.next_epoch()?;
    state.advance_epoch_context(next_epoch, spec, cancel)?;

    debug!(
        target: "state_transition::epoch",
        %epoch,
        justified_epoch = %state.current_justified_checkpoint.epoch,
        finalized_epoch = %state.finalized_checkpoint.epoch,
        previous_target_balance = validator_statuses.total_balances.previous_epoch_target_attesters(),
        total_active_balance = validator_statuses.total_balances.current_epoch(),
        "Processed epoch"
    );

    Ok(EpochProcessingSummary {
        epoch,
        total_balances: validator_statuses.total_balances,
        statuses: validator_statuses.statuses,
        current_justified_checkpoint: state.current_justified_checkpoint,
        finalized_checkpoint: state.finalized_checkpoint,
    })
}
