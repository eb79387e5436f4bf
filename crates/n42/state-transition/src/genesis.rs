use crate::arith::SafeArith;
use crate::beacon_block::{BeaconBlockBody, BeaconBlockHeader};
use crate::beacon_state::{BeaconState, Error};
use crate::cancel::CancelToken;
use crate::common::increase_balance;
use crate::crypto::PublicKeyBytes;
use crate::eth1_data::Eth1Data;
use crate::spec::{EthSpec, Spec};
use crate::validator::Validator;
use crate::{FixedVector, Hash256};
use tracing::debug;
use tree_hash::TreeHash;

/// Build a genesis state from the given `(pubkey, withdrawal_credentials, amount)` triples.
///
/// Repeated pubkeys top up the first validator with that key. Every validator whose effective
/// balance reaches `MAX_EFFECTIVE_BALANCE` is active from the genesis epoch.
pub fn initialize_genesis_state<E: EthSpec>(
    genesis_time: u64,
    eth1_block_hash: Hash256,
    validators: impl IntoIterator<Item = (PublicKeyBytes, Hash256, u64)>,
    spec: &Spec,
) -> Result<BeaconState<E>, Error> {
    let eth1_data = Eth1Data { block_hash: eth1_block_hash, ..Eth1Data::default() };
    let mut state = BeaconState::<E>::new(genesis_time, eth1_data, spec);

    let genesis_fork_version = spec.fork_version_for_name(spec.fork_name_at_epoch(E::genesis_epoch()));
    state.fork.previous_version = genesis_fork_version;
    state.fork.current_version = genesis_fork_version;

    state.latest_block_header = BeaconBlockHeader {
        body_root: BeaconBlockBody::<E>::default().tree_hash_root(),
        ..BeaconBlockHeader::default()
    };
    // Seed RANDAO with Eth1 entropy
    state.randao_mixes = FixedVector::from_elem(eth1_block_hash);

    let mut deposit_count = 0u64;
    for (pubkey, withdrawal_credentials, amount) in validators {
        deposit_count.safe_add_assign(1)?;
        match state.get_validator_index(&pubkey)? {
            Some(index) => increase_balance(&mut state, index, amount)?,
            None => {
                let validator =
                    Validator::from_deposit(pubkey, withdrawal_credentials, amount, spec);
                state.validators.push(validator)?;
                state.balances.push(amount)?;
                state.update_pubkey_cache()?;
            }
        }
    }
    state.eth1_data.deposit_count = deposit_count;
    state.eth1_deposit_index = deposit_count;

    // Process activations
    for index in 0..state.validators.len() {
        let balance = state.get_balance(index)?;
        let validator = state.get_validator_mut(index)?;
        validator.effective_balance = std::cmp::min(
            balance.safe_sub(balance.safe_rem(spec.effective_balance_increment)?)?,
            spec.max_effective_balance,
        );
        if validator.effective_balance == spec.max_effective_balance {
            validator.activation_eligibility_epoch = E::genesis_epoch();
            validator.activation_epoch = E::genesis_epoch();
        }
    }

    state.genesis_validators_root = state.validators.tree_hash_root();

    state.build_caches(spec, &CancelToken::default())?;

    debug!(
        target: "state_transition::epoch",
        validators = state.validators.len(),
        genesis_validators_root = %state.genesis_validators_root,
        "Initialized genesis state"
    );

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MinimalEthSpec;

    type E = MinimalEthSpec;

    fn deposit(i: u8, amount: u64) -> (PublicKeyBytes, Hash256, u64) {
        (PublicKeyBytes::from_bytes([i; 48]), Hash256::repeat_byte(i), amount)
    }

    #[test]
    fn only_full_deposits_are_active() {
        let spec = Spec::minimal();
        let max = spec.max_effective_balance;
        let state = initialize_genesis_state::<E>(
            42,
            Hash256::repeat_byte(0xee),
            vec![deposit(1, max), deposit(2, max / 2), deposit(3, max + 7)],
            &spec,
        )
        .unwrap();

        assert_eq!(state.genesis_time, 42);
        assert_eq!(state.eth1_deposit_index, 3);
        assert!(state.validators[0].is_active_at(E::genesis_epoch()));
        assert!(!state.validators[1].is_active_at(E::genesis_epoch()));
        assert_eq!(state.validators[1].effective_balance, max / 2);
        assert_eq!(state.validators[2].effective_balance, max);
        assert_eq!(state.balances[2], max + 7);
        assert!(state.randao_mixes.iter().all(|m| *m == Hash256::repeat_byte(0xee)));
        assert_eq!(state.genesis_validators_root, state.validators.tree_hash_root());
        assert_eq!(state.get_total_active_balance().unwrap(), 2 * max);
    }

    #[test]
    fn repeated_pubkey_tops_up() {
        let spec = Spec::minimal();
        let half = spec.max_effective_balance / 2;
        let state = initialize_genesis_state::<E>(
            0,
            Hash256::ZERO,
            vec![deposit(1, half), deposit(2, spec.max_effective_balance), deposit(1, half)],
            &spec,
        )
        .unwrap();

        assert_eq!(state.validators.len(), 2);
        assert_eq!(state.balances[0], spec.max_effective_balance);
        assert!(state.validators[0].is_active_at(E::genesis_epoch()));
        assert_eq!(state.get_validator_index(&PublicKeyBytes::from_bytes([2; 48])).unwrap(), Some(1));
    }
}
