use crate::arith::SafeArith;
use crate::beacon_state::{BeaconState, Error};
use crate::spec::{EthSpec, Spec};
use std::cmp::max;

/// Initiate the exit of the validator of the given `index`.
pub fn initiate_validator_exit<E: EthSpec>(
    state: &mut BeaconState<E>,
    index: usize,
    spec: &Spec,
) -> Result<(), Error> {
    // Return if the validator already initiated exit
    if state.get_validator(index)?.exit_epoch != spec.far_future_epoch {
        return Ok(());
    }

    // Ensure the exit cache is built.
    state.build_exit_cache(spec)?;

    // Compute exit queue epoch
    let delayed_epoch = state.compute_activation_exit_epoch(state.current_epoch(), spec)?;
    let mut exit_queue_epoch = state
        .exit_cache
        .max_epoch()?
        .map_or(delayed_epoch, |epoch| max(epoch, delayed_epoch));
    let exit_queue_churn = state.exit_cache.get_churn_at(exit_queue_epoch)?;

    if exit_queue_churn >= state.get_validator_churn_limit(spec)? {
        exit_queue_epoch.safe_add_assign(1u64)?;
    }

    let validator = state.get_validator_mut(index)?;
    validator.exit_epoch = exit_queue_epoch;
    validator.withdrawable_epoch =
        exit_queue_epoch.safe_add(spec.min_validator_withdrawability_delay)?;

    state.exit_cache.record_validator_exit(exit_queue_epoch)?;
    Ok(())
}
