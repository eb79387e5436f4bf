use crate::arith::SafeArith;
use crate::beacon_state::{BeaconState, Error};
use crate::common::{decrease_balance, increase_balance, initiate_validator_exit};
use crate::spec::{EthSpec, Spec};
use crate::Unsigned;
use std::cmp;
use tracing::debug;

/// Slash the validator with index `slashed_index`.
///
/// The whistleblower defaults to the proposer of the current slot.
pub fn slash_validator<E: EthSpec>(
    state: &mut BeaconState<E>,
    slashed_index: usize,
    opt_whistleblower_index: Option<usize>,
    spec: &Spec,
) -> Result<(), Error> {
    let epoch = state.current_epoch();
    let fork_name = state.fork_name(spec);

    initiate_validator_exit(state, slashed_index, spec)?;

    let validator = state.get_validator_mut(slashed_index)?;
    validator.slashed = true;
    validator.withdrawable_epoch = cmp::max(
        validator.withdrawable_epoch,
        epoch.safe_add(E::EpochsPerSlashingsVector::to_u64())?,
    );
    let validator_effective_balance = validator.effective_balance;
    state.set_slashings(
        epoch,
        state.get_slashings(epoch)?.safe_add(validator_effective_balance)?,
    )?;
    decrease_balance(
        state,
        slashed_index,
        validator_effective_balance
            .safe_div(spec.min_slashing_penalty_quotient_for_fork(fork_name))?,
    )?;

    // Apply proposer and whistleblower rewards
    let proposer_index = state.get_beacon_proposer_index(state.slot)?;
    let whistleblower_index = opt_whistleblower_index.unwrap_or(proposer_index);
    let whistleblower_reward =
        validator_effective_balance.safe_div(spec.whistleblower_reward_quotient)?;
    let proposer_reward = whistleblower_reward.safe_div(spec.proposer_reward_quotient)?;

    increase_balance(state, proposer_index, proposer_reward)?;
    increase_balance(
        state,
        whistleblower_index,
        whistleblower_reward.safe_sub(proposer_reward)?,
    )?;

    debug!(
        target: "state_transition::block",
        slashed_index,
        whistleblower_index,
        %epoch,
        "Validator slashed"
    );

    Ok(())
}
