use crate::arith::SafeArith;
use crate::beacon_state::BeaconState;
use crate::common::initiate_validator_exit;
use crate::errors::EpochProcessingError as Error;
use crate::spec::{EthSpec, Spec};
use crate::validator::Validator;
use itertools::Itertools;
use tracing::debug;

/// Performs a validator registry update, if required.
///
/// Marks newly qualified validators eligible, ejects low-balance validators and activates as
/// many of the finalized queue as the churn limit allows.
pub fn process_registry_updates<E: EthSpec>(
    state: &mut BeaconState<E>,
    spec: &Spec,
) -> Result<(), Error> {
    // Collect the indices first; eligibility and exits touch disjoint fields, so applying them
    // in index order is equivalent to the interleaved loop.
    let current_epoch = state.current_epoch();
    let is_ejectable = |validator: &Validator| {
        validator.is_active_at(current_epoch) && validator.effective_balance <= spec.ejection_balance
    };
    let indices_to_update: Vec<_> = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            validator.is_eligible_for_activation_queue(spec) || is_ejectable(validator)
        })
        .map(|(idx, _)| idx)
        .collect();

    for index in indices_to_update {
        let validator = state.get_validator_mut(index)?;
        if validator.is_eligible_for_activation_queue(spec) {
            validator.activation_eligibility_epoch = current_epoch.safe_add(1u64)?;
        }
        if is_ejectable(validator) {
            debug!(target: "state_transition::epoch", index, %current_epoch, "Ejecting validator");
            initiate_validator_exit(state, index, spec)?;
        }
    }

    // Queue validators eligible for activation and not yet dequeued for activation.
    let finalized_epoch = state.finalized_checkpoint.epoch;
    let activation_queue = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| validator.is_eligible_for_activation(finalized_epoch, spec))
        .sorted_by_key(|(index, validator)| (validator.activation_eligibility_epoch, *index))
        .map(|(index, _)| index)
        .collect_vec();

    // Dequeue validators for activation up to churn limit
    let churn_limit = state.get_validator_churn_limit(spec)? as usize;
    let delayed_activation_epoch = state.compute_activation_exit_epoch(current_epoch, spec)?;
    for index in activation_queue.into_iter().take(churn_limit) {
        state.get_validator_mut(index)?.activation_epoch = delayed_activation_epoch;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon_state::Checkpoint;
    use crate::slot_epoch::{Epoch, Slot};
    use crate::test_utils::genesis_state;
    use crate::MinimalEthSpec;

    type E = MinimalEthSpec;

    #[test]
    fn activation_queue_respects_finality_and_churn() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(64, &spec);
        state.slot = Slot::new(E::slots_per_epoch() * 4 - 1);
        state.build_caches(&spec, &Default::default()).unwrap();

        // Six pending validators, all queued long enough ago, appended in reverse eligibility
        // order so sorting is observable.
        for i in 0..6u64 {
            let mut validator = state.validators[0].clone();
            validator.pubkey = crate::crypto::PublicKeyBytes::from_bytes([200 + i as u8; 48]);
            validator.activation_eligibility_epoch = Epoch::new(2 - i / 3);
            validator.activation_epoch = spec.far_future_epoch;
            validator.exit_epoch = spec.far_future_epoch;
            validator.withdrawable_epoch = spec.far_future_epoch;
            state.validators.push(validator).unwrap();
            state.balances.push(spec.max_effective_balance).unwrap();
        }
        state.finalized_checkpoint = Checkpoint { epoch: Epoch::new(2), ..Default::default() };

        process_registry_updates(&mut state, &spec).unwrap();

        // 64 active validators give the minimum churn of 4. Eligibility epoch 1 goes first.
        let activated: Vec<usize> = (64..70)
            .filter(|&i| state.validators[i].activation_epoch != spec.far_future_epoch)
            .collect();
        assert_eq!(activated, vec![64, 67, 68, 69]);
        let expected = Epoch::new(3 + 1 + spec.max_seed_lookahead.as_u64());
        assert!(activated.iter().all(|&i| state.validators[i].activation_epoch == expected));
    }

    #[test]
    fn low_balance_validator_is_ejected() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(16, &spec);
        state.validators[5].effective_balance = spec.ejection_balance;

        process_registry_updates(&mut state, &spec).unwrap();

        assert_ne!(state.validators[5].exit_epoch, spec.far_future_epoch);
        assert_eq!(state.validators[6].exit_epoch, spec.far_future_epoch);
    }

    #[test]
    fn full_deposit_joins_activation_queue() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(16, &spec);
        let mut validator = state.validators[0].clone();
        validator.pubkey = crate::crypto::PublicKeyBytes::from_bytes([250; 48]);
        validator.activation_eligibility_epoch = spec.far_future_epoch;
        validator.activation_epoch = spec.far_future_epoch;
        state.validators.push(validator).unwrap();
        state.balances.push(spec.max_effective_balance).unwrap();

        process_registry_updates(&mut state, &spec).unwrap();

        assert_eq!(state.validators[16].activation_eligibility_epoch, Epoch::new(1));
        assert_eq!(state.validators[16].activation_epoch, spec.far_future_epoch);
    }
}
