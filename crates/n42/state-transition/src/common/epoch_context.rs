//! Everything the transition needs to know about an epoch that is fixed once the epoch starts.
//!
//! The context is built once, then rotated at every epoch boundary: the previous committees are
//! dropped, current and next move down one place and only the new next epoch is shuffled. All
//! heavy data sits behind `Arc`, so cloning a context to hand it to a sibling branch is cheap and
//! neither copy can observe mutations of the other.

use crate::arith::SafeArith;
use crate::beacon_committee::{BeaconCommittee, CommitteeIndex};
use crate::beacon_state::{BeaconState, Error};
use crate::cancel::CancelToken;
use crate::committee_cache::{get_active_validator_indices, CommitteeCache};
use crate::common::base::SqrtTotalActiveBalance;
use crate::common::proposer::{compute_proposer_index, proposer_seed};
use crate::common::sync_committee::SyncCommittee;
use crate::relative_epoch::RelativeEpoch;
use crate::slot_epoch::{Epoch, Slot};
use crate::spec::{Domain, EthSpec, Spec};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochContext {
    epoch: Option<Epoch>,
    /// Indexed by `RelativeEpoch::index`.
    committee_caches: [Arc<CommitteeCache>; 3],
    /// The proposer of every slot of `epoch`, in slot order.
    proposers: Arc<Vec<usize>>,
    sync_committee: Option<Arc<SyncCommittee>>,
    /// Effective balance of every validator in the registry when the epoch started.
    effective_balances: Arc<Vec<u64>>,
    total_active_balance: u64,
    sqrt_total_active_balance: SqrtTotalActiveBalance,
}

fn build_committee_cache<E: EthSpec>(
    state: &BeaconState<E>,
    epoch: Epoch,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<Arc<CommitteeCache>, Error> {
    let seed = state.get_seed(epoch, Domain::BeaconAttester, spec)?;
    CommitteeCache::initialized::<E>(&state.validators, epoch, seed, spec, cancel).map(Arc::new)
}

impl EpochContext {
    /// Build a context for `epoch` from scratch.
    pub fn new<E: EthSpec>(
        state: &BeaconState<E>,
        epoch: Epoch,
        spec: &Spec,
        cancel: &CancelToken,
    ) -> Result<Self, Error> {
        let current = build_committee_cache(state, epoch, spec, cancel)?;
        let previous = if epoch > E::genesis_epoch() {
            build_committee_cache(state, epoch.safe_sub(1u64)?, spec, cancel)?
        } else {
            current.clone()
        };
        let next = build_committee_cache(state, epoch.safe_add(1u64)?, spec, cancel)?;

        Self::from_committee_caches(state, epoch, [previous, current, next], None, spec, cancel)
    }

    /// Returns the context for `new_epoch`, reusing the committees this context already holds
    /// when `new_epoch` directly follows it.
    pub fn rotate<E: EthSpec>(
        &self,
        state: &BeaconState<E>,
        new_epoch: Epoch,
        spec: &Spec,
        cancel: &CancelToken,
    ) -> Result<Self, Error> {
        match self.epoch {
            Some(epoch) if epoch.safe_add(1u64)? == new_epoch => {
                let [_, current, next] = &self.committee_caches;
                let next = if next.is_initialized_at(new_epoch) {
                    next.clone()
                } else {
                    build_committee_cache(state, new_epoch, spec, cancel)?
                };
                let new_next = build_committee_cache(state, new_epoch.safe_add(1u64)?, spec, cancel)?;

                Self::from_committee_caches(
                    state,
                    new_epoch,
                    [current.clone(), next, new_next],
                    self.sync_committee.as_ref(),
                    spec,
                    cancel,
                )
            }
            _ => Self::new(state, new_epoch, spec, cancel),
        }
    }

    fn from_committee_caches<E: EthSpec>(
        state: &BeaconState<E>,
        epoch: Epoch,
        committee_caches: [Arc<CommitteeCache>; 3],
        previous_sync_committee: Option<&Arc<SyncCommittee>>,
        spec: &Spec,
        cancel: &CancelToken,
    ) -> Result<Self, Error> {
        let effective_balances: Vec<u64> =
            state.validators.iter().map(|v| v.effective_balance).collect();

        let active_indices =
            committee_caches[RelativeEpoch::Current.index()].active_validator_indices();

        let mut total_active_balance = 0u64;
        for (i, &index) in active_indices.iter().enumerate() {
            cancel.checkpoint(i)?;
            let effective_balance =
                effective_balances.get(index).copied().ok_or(Error::UnknownValidator(index))?;
            total_active_balance.safe_add_assign(effective_balance)?;
        }
        let total_active_balance =
            std::cmp::max(total_active_balance, spec.effective_balance_increment);

        let epoch_seed = state.get_seed(epoch, Domain::BeaconProposer, spec)?;
        let proposers = (epoch.start_slot(E::slots_per_epoch()).as_u64()..=
            epoch.end_slot(E::slots_per_epoch()).as_u64())
            .map(|slot| {
                let seed = proposer_seed(epoch_seed, slot);
                compute_proposer_index(
                    active_indices,
                    &effective_balances,
                    seed.as_slice(),
                    spec,
                    cancel,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sync_committee = if spec.fork_name_at_epoch(epoch).altair_enabled() {
            let period =
                epoch.sync_committee_period(spec.epochs_per_sync_committee_period.as_u64())?;
            let period_start =
                Epoch::new(period.safe_mul(spec.epochs_per_sync_committee_period.as_u64())?);
            match previous_sync_committee {
                Some(committee) if committee.period == period => Some(committee.clone()),
                // Mid-period the members were fixed by the balances at the period start, which
                // only the state still remembers.
                _ if period_start != epoch && !state.current_sync_committee.is_empty() => {
                    Some(Arc::new(SyncCommittee::from_indices(
                        period,
                        &state.current_sync_committee,
                        &state.validators,
                    )?))
                }
                _ => {
                    let period_active;
                    let members = if period_start == epoch {
                        active_indices
                    } else {
                        period_active =
                            get_active_validator_indices(&state.validators, period_start, cancel)?;
                        period_active.as_slice()
                    };
                    let seed = state.get_seed(period_start, Domain::SyncCommittee, spec)?;
                    Some(Arc::new(SyncCommittee::compute::<E>(
                        period,
                        members,
                        &state.validators,
                        &effective_balances,
                        seed,
                        spec,
                        cancel,
                    )?))
                }
            }
        } else {
            None
        };

        trace!(
            target: "state_transition::epoch",
            %epoch,
            active_validators = active_indices.len(),
            total_active_balance,
            "Built epoch context"
        );

        Ok(Self {
            epoch: Some(epoch),
            committee_caches,
            proposers: Arc::new(proposers),
            sync_committee,
            effective_balances: Arc::new(effective_balances),
            total_active_balance,
            sqrt_total_active_balance: SqrtTotalActiveBalance::new(total_active_balance),
        })
    }

    pub const fn epoch(&self) -> Option<Epoch> {
        self.epoch
    }

    pub fn is_initialized_at(&self, epoch: Epoch) -> bool {
        self.epoch == Some(epoch)
    }

    pub fn committee_cache(&self, relative_epoch: RelativeEpoch) -> Result<&Arc<CommitteeCache>, Error> {
        let epoch = self.epoch.ok_or(Error::CommitteeCacheUninitialized(Some(relative_epoch)))?;
        let i = relative_epoch.index();
        let cache = self.committee_caches.get(i).ok_or(Error::CommitteeCachesOutOfBounds(i))?;

        if cache.is_initialized_at(relative_epoch.into_epoch(epoch)) {
            Ok(cache)
        } else {
            Err(Error::CommitteeCacheUninitialized(Some(relative_epoch)))
        }
    }

    /// Returns the committee cache for `epoch`, which must be within one epoch of the context.
    pub fn committee_cache_at_epoch(&self, epoch: Epoch) -> Result<&Arc<CommitteeCache>, Error> {
        let base = self.epoch.ok_or(Error::EpochContextUninitialized)?;
        self.committee_cache(RelativeEpoch::from_epoch(base, epoch)?)
    }

    pub fn get_beacon_committee(
        &self,
        slot: Slot,
        index: CommitteeIndex,
        slots_per_epoch: u64,
    ) -> Result<BeaconCommittee<'_>, Error> {
        self.committee_cache_at_epoch(slot.epoch(slots_per_epoch))?
            .get_beacon_committee(slot, index)
            .ok_or(Error::NoCommittee { slot, index })
    }

    pub fn get_beacon_proposer_index(&self, slot: Slot, slots_per_epoch: u64) -> Result<usize, Error> {
        let epoch = self.epoch.ok_or(Error::EpochContextUninitialized)?;
        if slot.epoch(slots_per_epoch) != epoch {
            return Err(Error::SlotOutOfBounds);
        }
        let i = slot.as_usize().safe_rem(slots_per_epoch as usize)?;
        self.proposers.get(i).copied().ok_or(Error::UnableToDetermineProducer)
    }

    pub fn proposers(&self) -> &[usize] {
        &self.proposers
    }

    pub fn sync_committee(&self) -> Option<&Arc<SyncCommittee>> {
        self.sync_committee.as_ref()
    }

    /// The effective balance captured for `validator_index` when the epoch started.
    pub fn get_effective_balance(&self, validator_index: usize) -> Result<u64, Error> {
        self.effective_balances
            .get(validator_index)
            .copied()
            .ok_or(Error::UnknownValidator(validator_index))
    }

    pub const fn total_active_balance(&self) -> u64 {
        self.total_active_balance
    }

    pub const fn sqrt_total_active_balance(&self) -> SqrtTotalActiveBalance {
        self.sqrt_total_active_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::genesis_state;
    use crate::MinimalEthSpec;
    use std::collections::HashSet;

    type E = MinimalEthSpec;

    #[test]
    fn committees_partition_active_set() {
        let spec = Spec::minimal();
        let state = genesis_state::<E>(64, &spec);
        let ctx = state.epoch_context().unwrap();

        let cache = ctx.committee_cache(RelativeEpoch::Current).unwrap();
        let mut seen = HashSet::new();
        for committee in cache.get_all_beacon_committees().unwrap() {
            for &v in committee.committee {
                assert!(seen.insert(v));
            }
        }
        assert_eq!(seen.len(), 64);
        assert_eq!(ctx.total_active_balance(), 64 * spec.max_effective_balance);
    }

    #[test]
    fn fresh_builds_are_identical() {
        let spec = Spec::minimal();
        let state = genesis_state::<E>(100, &spec);
        let cancel = CancelToken::default();
        let a = EpochContext::new(&state, Epoch::new(0), &spec, &cancel).unwrap();
        let b = EpochContext::new(&state, Epoch::new(0), &spec, &cancel).unwrap();
        assert_eq!(a.proposers(), b.proposers());
        assert_eq!(a, b);
    }

    #[test]
    fn proposers_are_active() {
        let spec = Spec::minimal();
        let state = genesis_state::<E>(100, &spec);
        let ctx = state.epoch_context().unwrap();
        assert_eq!(ctx.proposers().len(), E::slots_per_epoch() as usize);
        let active = ctx.committee_cache(RelativeEpoch::Current).unwrap().active_validator_indices();
        assert!(ctx.proposers().iter().all(|p| active.contains(p)));
        assert_eq!(
            ctx.get_beacon_proposer_index(Slot::new(3), E::slots_per_epoch()).unwrap(),
            ctx.proposers()[3]
        );
        assert_eq!(
            ctx.get_beacon_proposer_index(Slot::new(8), E::slots_per_epoch()),
            Err(Error::SlotOutOfBounds)
        );
    }

    #[test]
    fn rotation_matches_fresh_build() {
        let spec = Spec::minimal();
        let mut state = genesis_state::<E>(100, &spec);
        let cancel = CancelToken::default();
        let rotated = state.epoch_context.rotate(&state, Epoch::new(1), &spec, &cancel).unwrap();
        let fresh = EpochContext::new(&state, Epoch::new(1), &spec, &cancel).unwrap();

        assert_eq!(rotated.proposers(), fresh.proposers());
        assert_eq!(
            rotated.committee_cache(RelativeEpoch::Current).unwrap(),
            fresh.committee_cache(RelativeEpoch::Current).unwrap()
        );
        assert_eq!(
            rotated.committee_cache(RelativeEpoch::Next).unwrap(),
            fresh.committee_cache(RelativeEpoch::Next).unwrap()
        );
        // The old current cache now serves as previous without being rebuilt.
        assert!(Arc::ptr_eq(
            rotated.committee_cache(RelativeEpoch::Previous).unwrap(),
            state.epoch_context().unwrap().committee_cache(RelativeEpoch::Current).unwrap()
        ));

        state.slot = Epoch::new(1).start_slot(E::slots_per_epoch());
        state.epoch_context = rotated;
        assert!(state.epoch_context().is_ok());
    }

    #[test]
    fn shallow_clone_is_isolated() {
        let spec = Spec::minimal();
        let state = genesis_state::<E>(40, &spec);
        let original = state.epoch_context().unwrap().clone();
        let mut sibling = original.clone();
        assert!(Arc::ptr_eq(&original.proposers, &sibling.proposers));

        sibling = sibling.rotate(&state, Epoch::new(1), &spec, &CancelToken::default()).unwrap();
        assert_eq!(original.epoch(), Some(Epoch::new(0)));
        assert_eq!(sibling.epoch(), Some(Epoch::new(1)));
        assert!(original.committee_cache(RelativeEpoch::Current).unwrap().is_initialized_at(Epoch::new(0)));
    }

    #[test]
    fn sync_committee_only_from_altair() {
        let mut spec = Spec::minimal();
        let state = genesis_state::<E>(50, &spec);
        assert!(state.epoch_context().unwrap().sync_committee().is_none());

        spec.altair_fork_epoch = Some(Epoch::new(0));
        let cancel = CancelToken::default();
        let ctx = EpochContext::new(&state, Epoch::new(0), &spec, &cancel).unwrap();
        let committee = ctx.sync_committee().unwrap();
        assert_eq!(committee.len(), 32);
        assert!(committee.indices.iter().all(|&i| i < 50));

        let again = EpochContext::new(&state, Epoch::new(0), &spec, &cancel).unwrap();
        assert_eq!(again.sync_committee(), ctx.sync_committee());

        // Same period: the committee is carried over on rotation.
        let rotated = ctx.rotate(&state, Epoch::new(1), &spec, &cancel).unwrap();
        assert!(Arc::ptr_eq(rotated.sync_committee().unwrap(), committee));
    }

    #[test]
    fn mid_period_rebuild_keeps_recorded_sync_committee() {
        let mut spec = Spec::minimal();
        spec.altair_fork_epoch = Some(Epoch::new(0));
        let cancel = CancelToken::default();
        let mut state = genesis_state::<E>(50, &spec);
        let committee = state.epoch_context().unwrap().sync_committee().unwrap().clone();
        let recorded: Vec<u64> = committee.indices.iter().map(|&i| i as u64).collect();
        assert_eq!(state.current_sync_committee.to_vec(), recorded);

        // Effective balances move after the period has started.
        for validator in state.validators.iter_mut().take(25) {
            validator.effective_balance = spec.effective_balance_increment;
        }

        let rotated = state.epoch_context.rotate(&state, Epoch::new(1), &spec, &cancel).unwrap();
        state.slot = Epoch::new(1).start_slot(E::slots_per_epoch());
        let fresh = EpochContext::new(&state, Epoch::new(1), &spec, &cancel).unwrap();

        assert_eq!(rotated.sync_committee(), Some(&committee));
        assert_eq!(fresh.sync_committee(), rotated.sync_committee());
        assert_eq!(fresh, rotated);

        let mut rebuilt = state.clone();
        rebuilt.force_build_epoch_context(&spec, &cancel).unwrap();
        state.epoch_context = rotated;
        assert_eq!(rebuilt, state);
    }
}
