use crate::arith::{ArithError, SafeArith};
use crate::beacon_block::BeaconBlockHeader;
use crate::beacon_committee::{BeaconCommittee, CommitteeIndex};
use crate::cancel::{CancelToken, Cancelled};
use crate::common::epoch_context::EpochContext;
use crate::crypto::PublicKeyBytes;
use crate::eth1_data::Eth1Data;
use crate::execution_payload::ExecutionPayloadHeader;
use crate::exit_cache::ExitCache;
use crate::fork::Fork;
use crate::fork_name::ForkName;
use crate::pending_attestation::PendingAttestation;
use crate::pubkey_cache::{PubkeyCache, PubkeyCacheError};
use crate::relative_epoch::{Error as RelativeEpochError, RelativeEpoch};
use crate::slot_epoch::{Epoch, Slot};
use crate::spec::{Domain, EthSpec, Spec};
use crate::validator::Validator;
use crate::{int_to_bytes4, int_to_bytes8, BitVector, FixedVector, Hash256, Unsigned, VariableList};
use ethereum_hashing::hash;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

pub type Validators<E> = VariableList<Validator, <E as EthSpec>::ValidatorRegistryLimit>;
pub type Balances<E> = VariableList<u64, <E as EthSpec>::ValidatorRegistryLimit>;

#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    EpochOutOfBounds,
    SlotOutOfBounds,
    UnknownValidator(usize),
    UnableToDetermineProducer,
    InvalidBitfield,
    UnableToShuffle,
    ShuffleIndexOutOfBounds(usize),
    BlockRootsOutOfBounds(usize),
    StateRootsOutOfBounds(usize),
    SlashingsOutOfBounds(usize),
    BalancesOutOfBounds(usize),
    RandaoMixesOutOfBounds(usize),
    CommitteeCachesOutOfBounds(usize),
    InsufficientValidators,
    NoCommittee {
        slot: Slot,
        index: CommitteeIndex,
    },
    ZeroSlotsPerEpoch,
    CommitteeCacheUninitialized(Option<RelativeEpoch>),
    EpochContextUninitialized,
    EpochContextIncorrectEpoch {
        cache: Epoch,
        state: Epoch,
    },
    ExitCacheUninitialized,
    ExitCacheInvalidEpoch {
        max_exit_epoch: Epoch,
        request_epoch: Epoch,
    },
    PubkeyCache(PubkeyCacheError),
    PubkeyCacheInconsistent {
        index: usize,
    },
    SyncCommitteeNotKnown {
        epoch: Epoch,
    },
    RelativeEpochError(RelativeEpochError),
    SszTypesError(ssz_types::Error),
    /// An arithmetic operation occurred which would have overflowed or divided by 0.
    ArithError(ArithError),
    Cancelled,
}

impl From<ArithError> for Error {
    fn from(e: ArithError) -> Self {
        Self::ArithError(e)
    }
}

impl From<RelativeEpochError> for Error {
    fn from(e: RelativeEpochError) -> Self {
        Self::RelativeEpochError(e)
    }
}

impl From<ssz_types::Error> for Error {
    fn from(e: ssz_types::Error) -> Self {
        Self::SszTypesError(e)
    }
}

impl From<PubkeyCacheError> for Error {
    fn from(e: PubkeyCacheError) -> Self {
        Self::PubkeyCache(e)
    }
}

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Casper FFG checkpoint, used in attestations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Hash256,
}

/// Historical block and state roots, accumulated once per `SLOTS_PER_HISTORICAL_ROOT` slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
#[serde(bound = "E: EthSpec")]
pub struct HistoricalBatch<E: EthSpec> {
    pub block_roots: FixedVector<Hash256, E::SlotsPerHistoricalRoot>,
    pub state_roots: FixedVector<Hash256, E::SlotsPerHistoricalRoot>,
}

/// The state of the `BeaconChain` at some slot.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
#[serde(bound = "E: EthSpec")]
pub struct BeaconState<E>
where
    E: EthSpec,
{
    // Versioning
    #[serde(with = "serde_utils::quoted_u64")]
    pub genesis_time: u64,
    pub genesis_validators_root: Hash256,
    pub slot: Slot,
    pub fork: Fork,

    // History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: FixedVector<Hash256, E::SlotsPerHistoricalRoot>,
    pub state_roots: FixedVector<Hash256, E::SlotsPerHistoricalRoot>,
    pub historical_roots: VariableList<Hash256, E::HistoricalRootsLimit>,

    // Ethereum 1.0 chain data
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: VariableList<Eth1Data, E::SlotsPerEth1VotingPeriod>,
    #[serde(with = "serde_utils::quoted_u64")]
    pub eth1_deposit_index: u64,

    // Registry
    pub validators: Validators<E>,
    #[serde(with = "ssz_types::serde_utils::quoted_u64_var_list")]
    pub balances: Balances<E>,

    // Randomness
    pub randao_mixes: FixedVector<Hash256, E::EpochsPerHistoricalVector>,

    // Slashings
    #[serde(with = "ssz_types::serde_utils::quoted_u64_fixed_vec")]
    pub slashings: FixedVector<u64, E::EpochsPerSlashingsVector>,

    // Attestations
    pub previous_epoch_attestations: VariableList<PendingAttestation<E>, E::MaxPendingAttestations>,
    pub current_epoch_attestations: VariableList<PendingAttestation<E>, E::MaxPendingAttestations>,

    // Finality
    pub justification_bits: BitVector<E::JustificationBitsLength>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,

    // Sync
    /// Members of the sync committee for the current period, empty before Altair.
    #[serde(with = "ssz_types::serde_utils::quoted_u64_var_list")]
    pub current_sync_committee: VariableList<u64, E::SyncCommitteeSize>,

    // Execution
    pub latest_execution_payload_header: ExecutionPayloadHeader,

    // Caching (not hashed)
    #[serde(skip_serializing, skip_deserializing)]
    #[ssz(skip_serializing, skip_deserializing)]
    #[tree_hash(skip_hashing)]
    pub epoch_context: EpochContext,
    #[serde(skip_serializing, skip_deserializing)]
    #[ssz(skip_serializing, skip_deserializing)]
    #[tree_hash(skip_hashing)]
    pub exit_cache: ExitCache,
    #[serde(skip_serializing, skip_deserializing)]
    #[ssz(skip_serializing, skip_deserializing)]
    #[tree_hash(skip_hashing)]
    pub pubkey_cache: PubkeyCache,
}

impl<E: EthSpec> BeaconState<E> {
    /// Create a new, empty state at genesis. The registry is populated by the caller.
    pub fn new(genesis_time: u64, eth1_data: Eth1Data, spec: &Spec) -> Self {
        Self {
            genesis_time,
            genesis_validators_root: Hash256::ZERO,
            slot: spec.genesis_slot,
            fork: Fork {
                previous_version: spec.genesis_fork_version,
                current_version: spec.genesis_fork_version,
                epoch: E::genesis_epoch(),
            },
            latest_block_header: BeaconBlockHeader::default(),
            block_roots: FixedVector::default(),
            state_roots: FixedVector::default(),
            historical_roots: VariableList::default(),
            eth1_data,
            eth1_data_votes: VariableList::default(),
            eth1_deposit_index: 0,
            validators: VariableList::default(),
            balances: VariableList::default(),
            randao_mixes: FixedVector::default(),
            slashings: FixedVector::default(),
            previous_epoch_attestations: VariableList::default(),
            current_epoch_attestations: VariableList::default(),
            justification_bits: BitVector::new(),
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
            current_sync_committee: VariableList::default(),
            latest_execution_payload_header: ExecutionPayloadHeader::default(),
            epoch_context: EpochContext::default(),
            exit_cache: ExitCache::default(),
            pubkey_cache: PubkeyCache::default(),
        }
    }

    /// Returns the `tree_hash_root` of the state.
    pub fn canonical_root(&self) -> Hash256 {
        self.tree_hash_root()
    }

    /// The epoch corresponding to `self.slot`.
    pub fn current_epoch(&self) -> Epoch {
        self.slot.epoch(E::slots_per_epoch())
    }

    /// The epoch prior to `self.current_epoch()`.
    ///
    /// If the current epoch is the genesis epoch, the genesis_epoch is returned.
    pub fn previous_epoch(&self) -> Epoch {
        let current_epoch = self.current_epoch();
        if current_epoch > E::genesis_epoch() {
            current_epoch.saturating_sub(1u64)
        } else {
            current_epoch
        }
    }

    /// The epoch following `self.current_epoch()`.
    pub fn next_epoch(&self) -> Result<Epoch, Error> {
        Ok(self.current_epoch().safe_add(1u64)?)
    }

    /// The fork in effect at the state's current epoch.
    pub fn fork_name(&self, spec: &Spec) -> ForkName {
        spec.fork_name_at_epoch(self.current_epoch())
    }

    /// Returns the domain for `domain` at `epoch`, bound to this chain's fork and genesis.
    pub fn get_domain(&self, epoch: Epoch, domain: Domain, spec: &Spec) -> Hash256 {
        spec.get_domain(epoch, domain, &self.fork, self.genesis_validators_root)
    }

    /*
     * Registry
     */

    pub fn get_validator(&self, validator_index: usize) -> Result<&Validator, Error> {
        self.validators.get(validator_index).ok_or(Error::UnknownValidator(validator_index))
    }

    pub fn get_validator_mut(&mut self, validator_index: usize) -> Result<&mut Validator, Error> {
        self.validators.get_mut(validator_index).ok_or(Error::UnknownValidator(validator_index))
    }

    pub fn get_balance(&self, validator_index: usize) -> Result<u64, Error> {
        self.balances
            .get(validator_index)
            .copied()
            .ok_or(Error::BalancesOutOfBounds(validator_index))
    }

    pub fn get_balance_mut(&mut self, validator_index: usize) -> Result<&mut u64, Error> {
        self.balances
            .get_mut(validator_index)
            .ok_or(Error::BalancesOutOfBounds(validator_index))
    }

    pub fn get_effective_balance(&self, validator_index: usize) -> Result<u64, Error> {
        self.get_validator(validator_index).map(|v| v.effective_balance)
    }

    /// Returns `true` if the validator earns rewards or penalties for the previous epoch.
    pub fn is_eligible_validator(&self, previous_epoch: Epoch, val: &Validator) -> Result<bool, Error> {
        Ok(val.is_active_at(previous_epoch) ||
            (val.slashed && previous_epoch.safe_add(1u64)? < val.withdrawable_epoch))
    }

    /// Return the churn limit for the current epoch (number of validators who can leave per
    /// epoch).
    ///
    /// Uses the current epoch committee cache, and will error if it isn't initialized.
    pub fn get_validator_churn_limit(&self, spec: &Spec) -> Result<u64, Error> {
        let active_validator_count =
            self.committee_cache(RelativeEpoch::Current)?.active_validator_count() as u64;
        Ok(std::cmp::max(
            spec.min_per_epoch_churn_limit,
            active_validator_count.safe_div(spec.churn_limit_quotient)?,
        ))
    }

    /// Return the epoch at which an activation or exit triggered in ``epoch`` takes effect.
    pub fn compute_activation_exit_epoch(&self, epoch: Epoch, spec: &Spec) -> Result<Epoch, Error> {
        Ok(epoch.safe_add(1u64)?.safe_add(spec.max_seed_lookahead)?)
    }

    /// The number of epochs since the last finalized checkpoint, as seen from the previous
    /// epoch.
    pub fn get_finality_delay(&self) -> Result<u64, Error> {
        Ok(self.previous_epoch().safe_sub(self.finalized_checkpoint.epoch)?.as_u64())
    }

    pub fn is_in_inactivity_leak(&self, spec: &Spec) -> Result<bool, Error> {
        Ok(self.get_finality_delay()? > spec.min_epochs_to_inactivity_penalty)
    }

    /*
     * History
     */

    /// Return the block root at a recent `slot`.
    ///
    /// Spec v0.12.1
    pub fn get_block_root(&self, slot: Slot) -> Result<&Hash256, Error> {
        let i = self.get_latest_block_roots_index(slot)?;
        self.block_roots.get(i).ok_or(Error::BlockRootsOutOfBounds(i))
    }

    /// Return the block root at the start slot of a recent `epoch`.
    pub fn get_block_root_at_epoch(&self, epoch: Epoch) -> Result<&Hash256, Error> {
        self.get_block_root(epoch.start_slot(E::slots_per_epoch()))
    }

    /// Safely obtains the index for latest block roots, given some `slot`.
    fn get_latest_block_roots_index(&self, slot: Slot) -> Result<usize, Error> {
        if slot < self.slot && self.slot <= slot.safe_add(E::slots_per_historical_root() as u64)? {
            Ok(slot.as_usize().safe_rem(E::slots_per_historical_root())?)
        } else {
            Err(Error::SlotOutOfBounds)
        }
    }

    pub fn set_block_root(&mut self, slot: Slot, block_root: Hash256) -> Result<(), Error> {
        let i = slot.as_usize().safe_rem(E::slots_per_historical_root())?;
        *self.block_roots.get_mut(i).ok_or(Error::BlockRootsOutOfBounds(i))? = block_root;
        Ok(())
    }

    pub fn get_state_root(&self, slot: Slot) -> Result<&Hash256, Error> {
        let i = self.get_latest_block_roots_index(slot)?;
        self.state_roots.get(i).ok_or(Error::StateRootsOutOfBounds(i))
    }

    pub fn set_state_root(&mut self, slot: Slot, state_root: Hash256) -> Result<(), Error> {
        let i = slot.as_usize().safe_rem(E::slots_per_historical_root())?;
        *self.state_roots.get_mut(i).ok_or(Error::StateRootsOutOfBounds(i))? = state_root;
        Ok(())
    }

    /*
     * Randomness
     */

    /// Returns the lowest epoch whose randao mix is still retained.
    pub fn min_randao_epoch(&self) -> Epoch {
        self.current_epoch()
            .saturating_add(1u64)
            .saturating_sub(E::EpochsPerHistoricalVector::to_u64())
    }

    fn get_randao_mix_index(&self, epoch: Epoch) -> Result<usize, Error> {
        Ok(epoch.as_usize().safe_rem(E::epochs_per_historical_vector())?)
    }

    /// Return the randao mix at a recent ``epoch``.
    pub fn get_randao_mix(&self, epoch: Epoch) -> Result<&Hash256, Error> {
        let i = self.get_randao_mix_index(epoch)?;
        self.randao_mixes.get(i).ok_or(Error::RandaoMixesOutOfBounds(i))
    }

    pub fn set_randao_mix(&mut self, epoch: Epoch, mix: Hash256) -> Result<(), Error> {
        let i = self.get_randao_mix_index(epoch)?;
        *self.randao_mixes.get_mut(i).ok_or(Error::RandaoMixesOutOfBounds(i))? = mix;
        Ok(())
    }

    /// XOR-assigns the existing `epoch` randao mix with the hash of the `signature`.
    pub fn update_randao_mix(&mut self, epoch: Epoch, signature: &[u8]) -> Result<(), Error> {
        let i = self.get_randao_mix_index(epoch)?;
        let signature_hash = Hash256::from_slice(&hash(signature));
        let mix = self.randao_mixes.get_mut(i).ok_or(Error::RandaoMixesOutOfBounds(i))?;
        *mix ^= signature_hash;
        Ok(())
    }

    /// Generate a seed for the given `epoch`.
    pub fn get_seed(&self, epoch: Epoch, domain_type: Domain, spec: &Spec) -> Result<Hash256, Error> {
        // Bypass the safe getter for RANDAO so we can gracefully handle the scenario where
        // `epoch + EPOCHS_PER_HISTORICAL_VECTOR - MIN_SEED_LOOKAHEAD - 1` is negative in a
        // narrower integer.
        let mix = {
            let i = (epoch.as_u64() as u128)
                .safe_add(E::EpochsPerHistoricalVector::to_u64() as u128)?
                .safe_sub(spec.min_seed_lookahead.as_u64() as u128)?
                .safe_sub(1)?;
            let i_mod = i.safe_rem(self.randao_mixes.len() as u128)? as usize;
            self.randao_mixes.get(i_mod).ok_or(Error::RandaoMixesOutOfBounds(i_mod))?
        };
        let domain_bytes = int_to_bytes4(spec.get_domain_constant(domain_type));
        let epoch_bytes = int_to_bytes8(epoch.as_u64());

        const NUM_DOMAIN_BYTES: usize = 4;
        const NUM_EPOCH_BYTES: usize = 8;
        const MIX_OFFSET: usize = NUM_DOMAIN_BYTES + NUM_EPOCH_BYTES;
        const NUM_MIX_BYTES: usize = 32;

        let mut preimage = [0; NUM_DOMAIN_BYTES + NUM_EPOCH_BYTES + NUM_MIX_BYTES];
        preimage[0..NUM_DOMAIN_BYTES].copy_from_slice(&domain_bytes);
        preimage[NUM_DOMAIN_BYTES..MIX_OFFSET].copy_from_slice(&epoch_bytes);
        preimage[MIX_OFFSET..].copy_from_slice(mix.as_slice());

        Ok(Hash256::from_slice(&hash(&preimage)))
    }

    /*
     * Slashings
     */

    fn get_slashings_index(&self, epoch: Epoch, allow_next_epoch: AllowNextEpoch) -> Result<usize, Error> {
        let current_epoch = self.current_epoch();
        if current_epoch < epoch.safe_add(E::EpochsPerSlashingsVector::to_u64())? &&
            epoch <= allow_next_epoch.upper_bound_of(current_epoch)?
        {
            Ok(epoch.as_usize().safe_rem(E::epochs_per_slashings_vector())?)
        } else {
            Err(Error::EpochOutOfBounds)
        }
    }

    pub fn get_slashings(&self, epoch: Epoch) -> Result<u64, Error> {
        let i = self.get_slashings_index(epoch, AllowNextEpoch::False)?;
        self.slashings.get(i).copied().ok_or(Error::SlashingsOutOfBounds(i))
    }

    /// Set the slashings total for `epoch`. The next epoch is allowed so the accumulator can be
    /// reset at the end of epoch processing.
    pub fn set_slashings(&mut self, epoch: Epoch, value: u64) -> Result<(), Error> {
        let i = self.get_slashings_index(epoch, AllowNextEpoch::True)?;
        *self.slashings.get_mut(i).ok_or(Error::SlashingsOutOfBounds(i))? = value;
        Ok(())
    }

    /// The sum of every slashings accumulator entry.
    pub fn get_total_slashings(&self) -> Result<u64, Error> {
        let mut total = 0u64;
        for amount in self.slashings.iter() {
            total.safe_add_assign(*amount)?;
        }
        Ok(total)
    }

    /*
     * Committees and proposers
     */

    /// Build the epoch context for the current epoch, unless it is already built.
    pub fn build_epoch_context(&mut self, spec: &Spec, cancel: &CancelToken) -> Result<(), Error> {
        let current_epoch = self.current_epoch();
        if !self.epoch_context.is_initialized_at(current_epoch) {
            self.force_build_epoch_context(spec, cancel)?;
        }
        Ok(())
    }

    /// Build the epoch context for the current epoch from scratch.
    pub fn force_build_epoch_context(&mut self, spec: &Spec, cancel: &CancelToken) -> Result<(), Error> {
        self.epoch_context = EpochContext::new(self, self.current_epoch(), spec, cancel)?;
        self.record_sync_committee()
    }

    /// Rotate the epoch context so that it serves `new_epoch`.
    pub fn advance_epoch_context(
        &mut self,
        new_epoch: Epoch,
        spec: &Spec,
        cancel: &CancelToken,
    ) -> Result<(), Error> {
        self.epoch_context = self.epoch_context.rotate(self, new_epoch, spec, cancel)?;
        self.record_sync_committee()
    }

    /// Persist the context's sync committee so later rebuilds within the period agree with it.
    fn record_sync_committee(&mut self) -> Result<(), Error> {
        if let Some(committee) = self.epoch_context.sync_committee() {
            let indices = committee.indices.iter().map(|&i| i as u64).collect::<Vec<_>>();
            if self.current_sync_committee[..] != indices[..] {
                self.current_sync_committee = VariableList::new(indices)?;
            }
        }
        Ok(())
    }

    /// Builds the exit cache, unless it is already built.
    pub fn build_exit_cache(&mut self, spec: &Spec) -> Result<(), Error> {
        if self.exit_cache.check_initialized().is_err() {
            self.exit_cache = ExitCache::new(self.validators.iter(), spec)?;
        }
        Ok(())
    }

    /// Build every cache the transition depends on.
    pub fn build_caches(&mut self, spec: &Spec, cancel: &CancelToken) -> Result<(), Error> {
        self.build_epoch_context(spec, cancel)?;
        self.build_exit_cache(spec)?;
        self.update_pubkey_cache()?;
        Ok(())
    }

    /// Returns the epoch context, checking it serves the current epoch.
    pub fn epoch_context(&self) -> Result<&EpochContext, Error> {
        let current_epoch = self.current_epoch();
        match self.epoch_context.epoch() {
            Some(epoch) if epoch == current_epoch => Ok(&self.epoch_context),
            Some(cache) => Err(Error::EpochContextIncorrectEpoch { cache, state: current_epoch }),
            None => Err(Error::EpochContextUninitialized),
        }
    }

    pub fn committee_cache(
        &self,
        relative_epoch: RelativeEpoch,
    ) -> Result<&std::sync::Arc<crate::committee_cache::CommitteeCache>, Error> {
        self.epoch_context()?.committee_cache(relative_epoch)
    }

    /// Get the Beacon committee at the given `slot` and `index`.
    ///
    /// Utilises the epoch context and will fail if it is not initialized for the relevant epoch.
    pub fn get_beacon_committee(&self, slot: Slot, index: CommitteeIndex) -> Result<BeaconCommittee<'_>, Error> {
        let epoch = slot.epoch(E::slots_per_epoch());
        let relative_epoch = RelativeEpoch::from_epoch(self.current_epoch(), epoch)?;
        self.committee_cache(relative_epoch)?
            .get_beacon_committee(slot, index)
            .ok_or(Error::NoCommittee { slot, index })
    }

    /// Get all of the Beacon committees at a given slot.
    pub fn get_beacon_committees_at_slot(&self, slot: Slot) -> Result<Vec<BeaconCommittee<'_>>, Error> {
        let epoch = slot.epoch(E::slots_per_epoch());
        let relative_epoch = RelativeEpoch::from_epoch(self.current_epoch(), epoch)?;
        self.committee_cache(relative_epoch)?.get_beacon_committees_at_slot(slot)
    }

    /// Returns the number of committees at `slot`.
    pub fn get_committee_count_at_slot(&self, slot: Slot) -> Result<u64, Error> {
        let epoch = slot.epoch(E::slots_per_epoch());
        let relative_epoch = RelativeEpoch::from_epoch(self.current_epoch(), epoch)?;
        Ok(self.committee_cache(relative_epoch)?.committees_per_slot())
    }

    /// Returns the beacon proposer index for the `slot` in the current epoch.
    pub fn get_beacon_proposer_index(&self, slot: Slot) -> Result<usize, Error> {
        let epoch = slot.epoch(E::slots_per_epoch());
        if epoch != self.current_epoch() {
            return Err(Error::SlotOutOfBounds);
        }
        self.epoch_context()?.get_beacon_proposer_index(slot, E::slots_per_epoch())
    }

    /// Total effective balance of the validators active in the current epoch, floored at one
    /// increment.
    pub fn get_total_active_balance(&self) -> Result<u64, Error> {
        Ok(self.epoch_context()?.total_active_balance())
    }

    /*
     * Pubkeys
     */

    /// Bring the pubkey cache up to date with the registry.
    ///
    /// Starts from the indices this state has verified, not from the shared cache length, so a
    /// sibling's append at the same index is checked and forks the cache on conflict.
    pub fn update_pubkey_cache(&mut self) -> Result<(), Error> {
        let start = self.pubkey_cache.verified_len();
        for (i, validator) in self.validators.iter().enumerate().skip(start) {
            self.pubkey_cache.import(i, validator.pubkey)?;
        }
        Ok(())
    }

    /// Look up a validator by public key.
    ///
    /// Indices past the end of this state's registry belong to sibling states sharing the
    /// cache and are not visible here.
    pub fn get_validator_index(&self, pubkey: &PublicKeyBytes) -> Result<Option<usize>, Error> {
        if self.pubkey_cache.verified_len() < self.validators.len() {
            return Err(Error::PubkeyCacheInconsistent { index: self.pubkey_cache.verified_len() });
        }
        Ok(self.pubkey_cache.get_index(pubkey).filter(|&i| i < self.validators.len()))
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
enum AllowNextEpoch {
    True,
    False,
}

impl AllowNextEpoch {
    fn upper_bound_of(self, current_epoch: Epoch) -> Result<Epoch, ArithError> {
        match self {
            Self::True => current_epoch.safe_add(1u64),
            Self::False => Ok(current_epoch),
        }
    }
}
