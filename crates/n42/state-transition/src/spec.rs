//! Protocol constants.
//!
//! `Spec` holds the runtime-configurable constants and is injected once per chain. `EthSpec`
//! carries the list and vector lengths at the type level so the SSZ containers are bounded.

use crate::arith::{ArithError, SafeArith};
use crate::fork_name::ForkName;
use crate::signing_data::ForkData;
use crate::slot_epoch::{Epoch, Slot};
use crate::{Fork, Hash256};
use serde::{Deserialize, Serialize};
use ssz_types::typenum::{
    Unsigned, U1024, U1099511627776, U128, U16, U16777216, U2, U2048, U32, U4, U4096, U512, U64,
    U65536, U8, U8192,
};
use std::fmt::Debug;
use tree_hash::TreeHash;

/// Each of the BLS signature domains used by the transition.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Domain {
    BeaconProposer,
    BeaconAttester,
    Randao,
    Deposit,
    VoluntaryExit,
    SyncCommittee,
}

#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Spec {
    /*
     * Time
     */
    pub genesis_slot: Slot,
    pub far_future_epoch: Epoch,
    #[serde(with = "serde_utils::quoted_u64")]
    pub seconds_per_slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub min_attestation_inclusion_delay: u64,
    pub min_seed_lookahead: Epoch,
    pub max_seed_lookahead: Epoch,
    pub min_validator_withdrawability_delay: Epoch,
    #[serde(with = "serde_utils::quoted_u64")]
    pub shard_committee_period: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub min_epochs_to_inactivity_penalty: u64,
    pub epochs_per_sync_committee_period: Epoch,

    /*
     * Misc
     */
    pub max_committees_per_slot: usize,
    pub target_committee_size: usize,
    pub shuffle_round_count: u8,
    #[serde(with = "serde_utils::quoted_u64")]
    pub min_per_epoch_churn_limit: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub churn_limit_quotient: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub hysteresis_quotient: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub hysteresis_downward_multiplier: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub hysteresis_upward_multiplier: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub deposit_contract_tree_depth: u64,

    /*
     * Gwei values
     */
    #[serde(with = "serde_utils::quoted_u64")]
    pub min_deposit_amount: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub max_effective_balance: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub ejection_balance: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub effective_balance_increment: u64,

    /*
     * Reward and penalty quotients
     */
    #[serde(with = "serde_utils::quoted_u64")]
    pub base_reward_factor: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub base_rewards_per_epoch: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub whistleblower_reward_quotient: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_reward_quotient: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub inactivity_penalty_quotient: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub inactivity_penalty_quotient_altair: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub inactivity_penalty_quotient_bellatrix: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub min_slashing_penalty_quotient: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub min_slashing_penalty_quotient_altair: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub min_slashing_penalty_quotient_bellatrix: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proportional_slashing_multiplier: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proportional_slashing_multiplier_altair: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proportional_slashing_multiplier_bellatrix: u64,

    /*
     * Initial values
     */
    pub bls_withdrawal_prefix_byte: u8,
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub genesis_fork_version: [u8; 4],

    /*
     * Fork schedule. `None` means the fork never happens.
     */
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub altair_fork_version: [u8; 4],
    pub altair_fork_epoch: Option<Epoch>,
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub bellatrix_fork_version: [u8; 4],
    pub bellatrix_fork_epoch: Option<Epoch>,

    /*
     * Signature domains
     */
    pub(crate) domain_beacon_proposer: u32,
    pub(crate) domain_beacon_attester: u32,
    pub(crate) domain_randao: u32,
    pub(crate) domain_deposit: u32,
    pub(crate) domain_voluntary_exit: u32,
    pub(crate) domain_sync_committee: u32,
}

impl Spec {
    /// Returns a `Spec` compatible with the Ethereum Foundation mainnet specification.
    pub fn mainnet() -> Self {
        Self {
            genesis_slot: Slot::new(0),
            far_future_epoch: Epoch::max_value(),
            seconds_per_slot: 12,
            min_attestation_inclusion_delay: 1,
            min_seed_lookahead: Epoch::new(1),
            max_seed_lookahead: Epoch::new(4),
            min_validator_withdrawability_delay: Epoch::new(256),
            shard_committee_period: 256,
            min_epochs_to_inactivity_penalty: 4,
            epochs_per_sync_committee_period: Epoch::new(256),

            max_committees_per_slot: 64,
            target_committee_size: 128,
            shuffle_round_count: 90,
            min_per_epoch_churn_limit: 4,
            churn_limit_quotient: 65_536,
            hysteresis_quotient: 4,
            hysteresis_downward_multiplier: 1,
            hysteresis_upward_multiplier: 5,
            deposit_contract_tree_depth: 32,

            min_deposit_amount: 1_000_000_000,
            max_effective_balance: 32_000_000_000,
            ejection_balance: 16_000_000_000,
            effective_balance_increment: 1_000_000_000,

            base_reward_factor: 64,
            base_rewards_per_epoch: 4,
            whistleblower_reward_quotient: 512,
            proposer_reward_quotient: 8,
            inactivity_penalty_quotient: 1 << 26,
            inactivity_penalty_quotient_altair: 3 << 24,
            inactivity_penalty_quotient_bellatrix: 1 << 24,
            min_slashing_penalty_quotient: 128,
            min_slashing_penalty_quotient_altair: 64,
            min_slashing_penalty_quotient_bellatrix: 32,
            proportional_slashing_multiplier: 1,
            proportional_slashing_multiplier_altair: 2,
            proportional_slashing_multiplier_bellatrix: 3,

            bls_withdrawal_prefix_byte: 0x00,
            genesis_fork_version: [0, 0, 0, 0],
            altair_fork_version: [1, 0, 0, 0],
            altair_fork_epoch: Some(Epoch::new(74_240)),
            bellatrix_fork_version: [2, 0, 0, 0],
            bellatrix_fork_epoch: Some(Epoch::new(144_896)),

            domain_beacon_proposer: 0,
            domain_beacon_attester: 1,
            domain_randao: 2,
            domain_deposit: 3,
            domain_voluntary_exit: 4,
            domain_sync_committee: 7,
        }
    }

    /// Ethereum Foundation minimal spec, as defined in the consensus-specs repo. Every fork is
    /// disabled so callers opt in explicitly.
    pub fn minimal() -> Self {
        Self {
            max_committees_per_slot: 4,
            target_committee_size: 4,
            shuffle_round_count: 10,
            churn_limit_quotient: 32,
            shard_committee_period: 64,
            seconds_per_slot: 6,
            epochs_per_sync_committee_period: Epoch::new(8),
            genesis_fork_version: [0, 0, 0, 1],
            altair_fork_version: [1, 0, 0, 1],
            altair_fork_epoch: None,
            bellatrix_fork_version: [2, 0, 0, 1],
            bellatrix_fork_epoch: None,
            ..Self::mainnet()
        }
    }

    /// Returns the name of the fork which is active at `epoch`.
    pub fn fork_name_at_epoch(&self, epoch: Epoch) -> ForkName {
        match self.bellatrix_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => ForkName::Bellatrix,
            _ => match self.altair_fork_epoch {
                Some(fork_epoch) if epoch >= fork_epoch => ForkName::Altair,
                _ => ForkName::Base,
            },
        }
    }

    pub fn fork_name_at_slot<E: EthSpec>(&self, slot: Slot) -> ForkName {
        self.fork_name_at_epoch(slot.epoch(E::slots_per_epoch()))
    }

    pub const fn fork_version_for_name(&self, fork_name: ForkName) -> [u8; 4] {
        match fork_name {
            ForkName::Base => self.genesis_fork_version,
            ForkName::Altair => self.altair_fork_version,
            ForkName::Bellatrix => self.bellatrix_fork_version,
        }
    }

    pub fn fork_epoch(&self, fork_name: ForkName) -> Option<Epoch> {
        match fork_name {
            ForkName::Base => Some(Epoch::new(0)),
            ForkName::Altair => self.altair_fork_epoch,
            ForkName::Bellatrix => self.bellatrix_fork_epoch,
        }
    }

    pub const fn inactivity_penalty_quotient_for_fork(&self, fork_name: ForkName) -> u64 {
        match fork_name {
            ForkName::Base => self.inactivity_penalty_quotient,
            ForkName::Altair => self.inactivity_penalty_quotient_altair,
            ForkName::Bellatrix => self.inactivity_penalty_quotient_bellatrix,
        }
    }

    pub const fn min_slashing_penalty_quotient_for_fork(&self, fork_name: ForkName) -> u64 {
        match fork_name {
            ForkName::Base => self.min_slashing_penalty_quotient,
            ForkName::Altair => self.min_slashing_penalty_quotient_altair,
            ForkName::Bellatrix => self.min_slashing_penalty_quotient_bellatrix,
        }
    }

    pub const fn proportional_slashing_multiplier_for_fork(&self, fork_name: ForkName) -> u64 {
        match fork_name {
            ForkName::Base => self.proportional_slashing_multiplier,
            ForkName::Altair => self.proportional_slashing_multiplier_altair,
            ForkName::Bellatrix => self.proportional_slashing_multiplier_bellatrix,
        }
    }

    /// Get the domain number, unmodified by the fork.
    pub const fn get_domain_constant(&self, domain: Domain) -> u32 {
        match domain {
            Domain::BeaconProposer => self.domain_beacon_proposer,
            Domain::BeaconAttester => self.domain_beacon_attester,
            Domain::Randao => self.domain_randao,
            Domain::Deposit => self.domain_deposit,
            Domain::VoluntaryExit => self.domain_voluntary_exit,
            Domain::SyncCommittee => self.domain_sync_committee,
        }
    }

    /// Get the domain that represents the fork meta and signature domain.
    pub fn get_domain(
        &self,
        epoch: Epoch,
        domain: Domain,
        fork: &Fork,
        genesis_validators_root: Hash256,
    ) -> Hash256 {
        let fork_version = fork.get_fork_version(epoch);
        self.compute_domain(domain, fork_version, genesis_validators_root)
    }

    /// Deposits are valid across forks, so their domain always uses the genesis fork version
    /// and a zero validators root.
    pub fn get_deposit_domain(&self) -> Hash256 {
        self.compute_domain(Domain::Deposit, self.genesis_fork_version, Hash256::ZERO)
    }

    /// Compute a domain by applying the given `fork_version`.
    pub fn compute_domain(
        &self,
        domain: Domain,
        fork_version: [u8; 4],
        genesis_validators_root: Hash256,
    ) -> Hash256 {
        let domain_constant = self.get_domain_constant(domain);

        let mut domain = [0; 32];
        domain[0..4].copy_from_slice(&crate::int_to_bytes4(domain_constant));
        let fork_data_root = Self::compute_fork_data_root(fork_version, genesis_validators_root);
        domain[4..].copy_from_slice(&fork_data_root[..28]);

        Hash256::from(domain)
    }

    /// Return the 32-byte fork data root for the `current_version` and `genesis_validators_root`.
    pub fn compute_fork_data_root(
        current_version: [u8; 4],
        genesis_validators_root: Hash256,
    ) -> Hash256 {
        ForkData { current_version, genesis_validators_root }.tree_hash_root()
    }
}

impl Default for Spec {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Type-level protocol lengths.
pub trait EthSpec: 'static + Default + Sync + Send + Clone + Debug + PartialEq + Eq {
    type JustificationBitsLength: Unsigned + Clone + Sync + Send + Debug + PartialEq + Default;
    type MaxValidatorsPerCommittee: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type SlotsPerEpoch: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type SlotsPerHistoricalRoot: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type EpochsPerHistoricalVector: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type EpochsPerSlashingsVector: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type HistoricalRootsLimit: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type ValidatorRegistryLimit: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type SlotsPerEth1VotingPeriod: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type MaxPendingAttestations: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type MaxProposerSlashings: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type MaxAttesterSlashings: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type MaxAttestations: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type MaxDeposits: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type MaxVoluntaryExits: Unsigned + Clone + Sync + Send + Debug + PartialEq;
    type SyncCommitteeSize: Unsigned + Clone + Sync + Send + Debug + PartialEq;

    fn genesis_epoch() -> Epoch {
        Epoch::new(0)
    }

    /// Returns the `SLOTS_PER_EPOCH` constant for this specification.
    fn slots_per_epoch() -> u64 {
        Self::SlotsPerEpoch::to_u64()
    }

    fn slots_per_historical_root() -> usize {
        Self::SlotsPerHistoricalRoot::to_usize()
    }

    fn epochs_per_historical_vector() -> usize {
        Self::EpochsPerHistoricalVector::to_usize()
    }

    fn epochs_per_slashings_vector() -> usize {
        Self::EpochsPerSlashingsVector::to_usize()
    }

    fn slots_per_eth1_voting_period() -> usize {
        Self::SlotsPerEth1VotingPeriod::to_usize()
    }

    fn max_validators_per_committee() -> usize {
        Self::MaxValidatorsPerCommittee::to_usize()
    }

    fn max_deposits() -> u64 {
        Self::MaxDeposits::to_u64()
    }

    fn sync_committee_size() -> usize {
        Self::SyncCommitteeSize::to_usize()
    }

    /// Return the number of committees per slot.
    ///
    /// The number of committees per slot is constant in each epoch, and depends only on
    /// the `active_validator_count` during the slot's epoch.
    fn get_committee_count_per_slot(
        active_validator_count: usize,
        spec: &Spec,
    ) -> Result<usize, ArithError> {
        let slots_per_epoch = Self::SlotsPerEpoch::to_usize();

        Ok(std::cmp::max(
            1,
            std::cmp::min(
                spec.max_committees_per_slot,
                active_validator_count
                    .safe_div(slots_per_epoch)?
                    .safe_div(spec.target_committee_size)?,
            ),
        ))
    }

    /// The default `Spec` for this `EthSpec`.
    fn default_spec() -> Spec;
}

/// Ethereum Foundation specifications.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MainnetEthSpec;

impl EthSpec for MainnetEthSpec {
    type JustificationBitsLength = U4;
    type MaxValidatorsPerCommittee = U2048;
    type SlotsPerEpoch = U32;
    type SlotsPerHistoricalRoot = U8192;
    type EpochsPerHistoricalVector = U65536;
    type EpochsPerSlashingsVector = U8192;
    type HistoricalRootsLimit = U16777216;
    type ValidatorRegistryLimit = U1099511627776;
    type SlotsPerEth1VotingPeriod = U2048;
    type MaxPendingAttestations = U4096;
    type MaxProposerSlashings = U16;
    type MaxAttesterSlashings = U2;
    type MaxAttestations = U128;
    type MaxDeposits = U16;
    type MaxVoluntaryExits = U16;
    type SyncCommitteeSize = U512;

    fn default_spec() -> Spec {
        Spec::mainnet()
    }
}

/// Ethereum Foundation minimal spec, as defined in the consensus-specs repo.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MinimalEthSpec;

impl EthSpec for MinimalEthSpec {
    type JustificationBitsLength = U4;
    type MaxValidatorsPerCommittee = U2048;
    type SlotsPerEpoch = U8;
    type SlotsPerHistoricalRoot = U64;
    type EpochsPerHistoricalVector = U64;
    type EpochsPerSlashingsVector = U64;
    type HistoricalRootsLimit = U16777216;
    type ValidatorRegistryLimit = U1099511627776;
    type SlotsPerEth1VotingPeriod = U32;
    type MaxPendingAttestations = U1024;
    type MaxProposerSlashings = U16;
    type MaxAttesterSlashings = U2;
    type MaxAttestations = U128;
    type MaxDeposits = U16;
    type MaxVoluntaryExits = U16;
    type SyncCommitteeSize = U32;

    fn default_spec() -> Spec {
        Spec::minimal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committee_count_is_clamped() {
        let spec = Spec::mainnet();
        assert_eq!(MainnetEthSpec::get_committee_count_per_slot(0, &spec), Ok(1));
        assert_eq!(MainnetEthSpec::get_committee_count_per_slot(32 * 128 * 2, &spec), Ok(2));
        assert_eq!(MainnetEthSpec::get_committee_count_per_slot(usize::MAX, &spec), Ok(64));

        let spec = Spec::minimal();
        assert_eq!(MinimalEthSpec::get_committee_count_per_slot(100, &spec), Ok(3));
    }

    #[test]
    fn fork_schedule() {
        let mut spec = Spec::minimal();
        assert_eq!(spec.fork_name_at_epoch(Epoch::new(1_000_000)), ForkName::Base);

        spec.altair_fork_epoch = Some(Epoch::new(2));
        spec.bellatrix_fork_epoch = Some(Epoch::new(4));
        assert_eq!(spec.fork_name_at_epoch(Epoch::new(1)), ForkName::Base);
        assert_eq!(spec.fork_name_at_epoch(Epoch::new(2)), ForkName::Altair);
        assert_eq!(spec.fork_name_at_epoch(Epoch::new(4)), ForkName::Bellatrix);
        assert_eq!(spec.fork_name_at_slot::<MinimalEthSpec>(Slot::new(17)), ForkName::Altair);
    }

    #[test]
    fn quotients_follow_fork() {
        let spec = Spec::mainnet();
        assert_eq!(spec.inactivity_penalty_quotient_for_fork(ForkName::Base), 1 << 26);
        assert_eq!(spec.min_slashing_penalty_quotient_for_fork(ForkName::Altair), 64);
        assert_eq!(spec.proportional_slashing_multiplier_for_fork(ForkName::Bellatrix), 3);
    }

    #[test]
    fn domains_are_separated() {
        let spec = Spec::mainnet();
        let root = Hash256::repeat_byte(7);
        let proposer = spec.compute_domain(Domain::BeaconProposer, [0; 4], root);
        let attester = spec.compute_domain(Domain::BeaconAttester, [0; 4], root);
        assert_ne!(proposer, attester);
        assert_eq!(&attester[..4], &1u32.to_le_bytes());
        assert_eq!(
            &proposer[4..],
            &Spec::compute_fork_data_root([0; 4], root)[..28]
        );
    }

    #[test]
    fn serde_round_trip() {
        let spec = Spec::minimal();
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"max_effective_balance\":\"32000000000\""));
        assert!(json.contains("\"genesis_fork_version\":\"0x00000001\""));
        let decoded: Spec = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, spec);
    }
}
