use crate::arith::SafeArith;
use crate::beacon_state::BeaconState;
use crate::common::decrease_balance;
use crate::errors::EpochProcessingError as Error;
use crate::spec::{EthSpec, Spec};
use crate::Unsigned;

/// Process slashings.
///
/// Validators halfway through their slashing withdrawal delay lose a share of their balance
/// proportional to everything slashed within the slashings window.
pub fn process_slashings<E: EthSpec>(
    state: &mut BeaconState<E>,
    total_balance: u64,
    spec: &Spec,
) -> Result<(), Error> {
    let epoch = state.current_epoch();
    let sum_slashings = state.get_total_slashings()?;
    let multiplier = spec.proportional_slashing_multiplier_for_fork(state.fork_name(spec));

    let adjusted_total_slashing_balance =
        std::cmp::min(sum_slashings.safe_mul(multiplier)?, total_balance);

    let target_withdrawable_epoch =
        epoch.safe_add(E::EpochsPerSlashingsVector::to_u64().safe_div(2)?)?;

    let indices: Vec<(usize, u64)> = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            validator.slashed && target_withdrawable_epoch == validator.withdrawable_epoch
        })
        .map(|(index, validator)| (index, validator.effective_balance))
        .collect();

    for (index, validator_effective_balance) in indices {
        let increment = spec.effective_balance_increment;
        let penalty_numerator = validator_effective_balance
            .safe_div(increment)?
            .safe_mul(adjusted_total_slashing_balance)?;
        let penalty = penalty_numerator.safe_div(total_balance)?.safe_mul(increment)?;

        decrease_balance(state, index, penalty)?;
    }

    Ok(())
}
