use crate::crypto::PublicKeyBytes;
use crate::slot_epoch::Epoch;
use crate::spec::Spec;
use crate::Hash256;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

/// Information about a `BeaconChain` validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Validator {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub effective_balance: u64,
    pub slashed: bool,
    pub activation_eligibility_epoch: Epoch,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
    pub withdrawable_epoch: Epoch,
}

impl Validator {
    /// A freshly deposited validator: not yet eligible, not active, never exiting.
    pub fn from_deposit(
        pubkey: PublicKeyBytes,
        withdrawal_credentials: Hash256,
        amount: u64,
        spec: &Spec,
    ) -> Self {
        let effective_balance = std::cmp::min(
            amount.saturating_sub(amount % spec.effective_balance_increment),
            spec.max_effective_balance,
        );
        Self {
            pubkey,
            withdrawal_credentials,
            effective_balance,
            slashed: false,
            activation_eligibility_epoch: spec.far_future_epoch,
            activation_epoch: spec.far_future_epoch,
            exit_epoch: spec.far_future_epoch,
            withdrawable_epoch: spec.far_future_epoch,
        }
    }

    /// Returns `true` if the validator is considered active at some epoch.
    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    /// Returns `true` if the validator is slashable at some epoch.
    pub fn is_slashable_at(&self, epoch: Epoch) -> bool {
        !self.slashed && self.activation_epoch <= epoch && epoch < self.withdrawable_epoch
    }

    /// Returns `true` if the validator is considered exited at some epoch.
    pub fn is_exited_at(&self, epoch: Epoch) -> bool {
        self.exit_epoch <= epoch
    }

    /// Returns `true` if the validator is able to withdraw at some epoch.
    pub fn is_withdrawable_at(&self, epoch: Epoch) -> bool {
        epoch >= self.withdrawable_epoch
    }

    /// Returns `true` if the validator is eligible to join the activation queue.
    pub fn is_eligible_for_activation_queue(&self, spec: &Spec) -> bool {
        self.activation_eligibility_epoch == spec.far_future_epoch &&
            self.effective_balance == spec.max_effective_balance
    }

    /// Returns `true` if the validator is eligible to be activated, given the finalized epoch.
    pub fn is_eligible_for_activation(&self, finalized_epoch: Epoch, spec: &Spec) -> bool {
        self.activation_eligibility_epoch <= finalized_epoch &&
            self.activation_epoch == spec.far_future_epoch
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            pubkey: PublicKeyBytes::empty(),
            withdrawal_credentials: Hash256::ZERO,
            effective_balance: 0,
            slashed: false,
            activation_eligibility_epoch: Epoch::max_value(),
            activation_epoch: Epoch::max_value(),
            exit_epoch: Epoch::max_value(),
            withdrawable_epoch: Epoch::max_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_validator_is_inert() {
        let v = Validator::default();
        let epoch = Epoch::new(0);
        assert!(!v.is_active_at(epoch));
        assert!(!v.is_exited_at(epoch));
        assert!(!v.is_withdrawable_at(epoch));
        assert!(!v.slashed);
    }

    #[test]
    fn active_window_is_half_open() {
        let v = Validator {
            activation_epoch: Epoch::new(2),
            exit_epoch: Epoch::new(4),
            withdrawable_epoch: Epoch::new(6),
            ..Validator::default()
        };
        assert!(!v.is_active_at(Epoch::new(1)));
        assert!(v.is_active_at(Epoch::new(2)));
        assert!(v.is_active_at(Epoch::new(3)));
        assert!(!v.is_active_at(Epoch::new(4)));
        assert!(v.is_slashable_at(Epoch::new(5)));
        assert!(!v.is_slashable_at(Epoch::new(6)));
    }

    #[test]
    fn deposit_rounds_down_and_caps() {
        let spec = Spec::minimal();
        let v = Validator::from_deposit(
            PublicKeyBytes::empty(),
            Hash256::ZERO,
            spec.effective_balance_increment * 3 + 17,
            &spec,
        );
        assert_eq!(v.effective_balance, spec.effective_balance_increment * 3);
        assert!(!v.is_eligible_for_activation_queue(&spec));

        let v = Validator::from_deposit(
            PublicKeyBytes::empty(),
            Hash256::ZERO,
            spec.max_effective_balance * 2,
            &spec,
        );
        assert_eq!(v.effective_balance, spec.max_effective_balance);
        assert!(v.is_eligible_for_activation_queue(&spec));
    }
}
