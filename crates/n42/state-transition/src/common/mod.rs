mod base;
pub mod epoch_context;
mod get_attesting_indices;
mod initiate_validator_exit;
pub mod proposer;
mod slash_validator;
pub mod sync_committee;

pub use base::{get_base_reward, SqrtTotalActiveBalance};
pub use get_attesting_indices::{get_attesting_indices, get_indexed_attestation};
pub use initiate_validator_exit::initiate_validator_exit;
pub use slash_validator::slash_validator;

use crate::arith::SafeArith;
use crate::beacon_state::{BeaconState, Error};
use crate::spec::EthSpec;

/// Increase the balance of a validator, erroring upon overflow, as per the spec.
pub fn increase_balance<E: EthSpec>(
    state: &mut BeaconState<E>,
    index: usize,
    delta: u64,
) -> Result<(), Error> {
    state.get_balance_mut(index)?.safe_add_assign(delta)?;
    Ok(())
}

/// Decrease the balance of a validator, saturating upon overflow, as per the spec.
pub fn decrease_balance<E: EthSpec>(
    state: &mut BeaconState<E>,
    index: usize,
    delta: u64,
) -> Result<(), Error> {
    let balance = state.get_balance_mut(index)?;
    *balance = balance.saturating_sub(delta);
    Ok(())
}
