use crate::arith::{ArithError, SafeArith};
use crate::beacon_state::{BeaconState, Error as BeaconStateError};
use crate::cancel::{CancelToken, Cancelled};
use crate::errors::EpochProcessingError;
use crate::fork::Fork;
use crate::fork_name::ForkName;
use crate::per_epoch_processing::{process_epoch, EpochProcessingSummary};
use crate::spec::{EthSpec, Spec};
use crate::Hash256;
use tracing::{debug, trace};

#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    BeaconStateError(BeaconStateError),
    EpochProcessingError(EpochProcessingError),
    ArithError(ArithError),
    Cancelled,
}

impl From<BeaconStateError> for Error {
    fn from(e: BeaconStateError) -> Self {
        match e {
            BeaconStateError::Cancelled => Self::Cancelled,
            e => Self::BeaconStateError(e),
        }
    }
}

impl From<EpochProcessingError> for Error {
    fn from(e: EpochProcessingError) -> Self {
        match e {
            EpochProcessingError::Cancelled => Self::Cancelled,
            e => Self::EpochProcessingError(e),
        }
    }
}

impl From<ArithError> for Error {
    fn from(e: ArithError) -> Self {
        Self::ArithError(e)
    }
}

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Advances a state forward by one slot, performing per-epoch processing if required.
///
/// If the root of the supplied `state` is known, then it can be passed as `state_root`. If
/// `state_root` is `None`, the root of `state` will be computed using a cached tree hash.
/// Providing the `state_root` makes this function several orders of magnitude faster.
pub fn per_slot_processing<E: EthSpec>(
    state: &mut BeaconState<E>,
    state_root: Option<Hash256>,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<Option<EpochProcessingSummary>, Error> {
    cancel.check()?;

    cache_state(state, state_root)?;

    let summary = if state.slot.as_u64().safe_add(1)?.safe_rem(E::slots_per_epoch())? == 0 {
        Some(process_epoch(state, spec, cancel)?)
    } else {
        None
    };

    state.slot.safe_add_assign(1u64)?;

    // Fork versions rotate on the first slot of a fork epoch.
    if state.slot.as_u64().safe_rem(E::slots_per_epoch())? == 0 {
        upgrade_fork_if_scheduled(state, spec);
    }

    Ok(summary)
}

/// Record the pre-advance state root and the root of the latest block.
fn cache_state<E: EthSpec>(state: &mut BeaconState<E>, state_root: Option<Hash256>) -> Result<(), Error> {
    let previous_state_root = match state_root {
        Some(root) => root,
        None => state.canonical_root(),
    };

    let previous_slot = state.slot;

    // Store the previous slot's post state transition root.
    state.set_state_root(previous_slot, previous_state_root)?;

    // Cache latest block header state root
    if state.latest_block_header.state_root == Hash256::ZERO {
        state.latest_block_header.state_root = previous_state_root;
    }

    // Cache block root
    let latest_block_root = state.latest_block_header.canonical_root();
    state.set_block_root(previous_slot, latest_block_root)?;

    trace!(
        target: "state_transition::slot",
        slot = %previous_slot,
        state_root = %previous_state_root,
        block_root = %latest_block_root,
        "Cached slot roots"
    );

    Ok(())
}

fn upgrade_fork_if_scheduled<E: EthSpec>(state: &mut BeaconState<E>, spec: &Spec) {
    let epoch = state.current_epoch();
    let fork_name = spec.fork_name_at_epoch(epoch);
    if fork_name == ForkName::Base || spec.fork_epoch(fork_name) != Some(epoch) {
        return;
    }

    state.fork = Fork {
        previous_version: state.fork.current_version,
        current_version: spec.fork_version_for_name(fork_name),
        epoch,
    };

    debug!(
        target: "state_transition::slot",
        %epoch,
        fork = %fork_name,
        "Upgraded fork"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot_epoch::{Epoch, Slot};
    use crate::test_utils::genesis_state;
    use crate::MinimalEthSpec;
    use crate::relative_epoch::RelativeEpoch;

    type E = MinimalEthSpec;

    #[test]
    fn caches_roots_of_previous_slot() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(16, &spec);
        let genesis_root = state.canonical_root();

        per_slot_processing(&mut state, None, &spec, &CancelToken::default()).unwrap();

        assert_eq!(state.slot, Slot::new(1));
        assert_eq!(*state.get_state_root(Slot::new(0)).unwrap(), genesis_root);
        assert_eq!(state.latest_block_header.state_root, genesis_root);
        assert_eq!(
            *state.get_block_root(Slot::new(0)).unwrap(),
            state.latest_block_header.canonical_root()
        );
    }

    #[test]
    fn provided_root_is_trusted() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(16, &spec);
        let root = Hash256::repeat_byte(3);

        per_slot_processing(&mut state, Some(root), &spec, &CancelToken::default()).unwrap();

        assert_eq!(*state.get_state_root(Slot::new(0)).unwrap(), root);
    }

    #[test]
    fn epoch_processed_on_last_slot_only() {
        let spec = Spec::minimal();
        let cancel = CancelToken::default();
        let mut state = genesis_state::<E>(16, &spec);

        for slot in 0..E::slots_per_epoch() {
            let summary = per_slot_processing(&mut state, None, &spec, &cancel).unwrap();
            assert_eq!(summary.is_some(), slot == E::slots_per_epoch() - 1);
        }

        assert_eq!(state.current_epoch(), Epoch::new(1));
        assert!(state.epoch_context().is_ok());
        assert!(state.committee_cache(RelativeEpoch::Next).is_ok());
    }

    #[test]
    fn fork_version_rotates_at_fork_epoch() {
        let mut spec = Spec::minimal();
        spec.altair_fork_epoch = Some(Epoch::new(1));
        let cancel = CancelToken::default();
        let mut state = genesis_state::<E>(16, &spec);

        while state.slot < Slot::new(E::slots_per_epoch()) {
            per_slot_processing(&mut state, None, &spec, &cancel).unwrap();
        }

        assert_eq!(
            state.fork,
            Fork {
                previous_version: spec.genesis_fork_version,
                current_version: spec.altair_fork_version,
                epoch: Epoch::new(1),
            }
        );
        let sync_committee = state.epoch_context().unwrap().sync_committee().cloned();
        assert_eq!(sync_committee.map(|c| c.len()), Some(E::sync_committee_size()));
    }

    #[test]
    fn cancelled_token_stops_before_mutating() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(16, &spec);
        let before = state.clone();
        let cancel = CancelToken::default();
        cancel.cancel();

        assert_eq!(per_slot_processing(&mut state, None, &spec, &cancel), Err(Error::Cancelled));
        assert_eq!(state, before);
    }
}
