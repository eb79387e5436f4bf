use crate::beacon_state::Error;
use crate::cancel::CancelToken;
use crate::common::proposer::BalanceWeightedSampler;
use crate::crypto::PublicKeyBytes;
use crate::spec::{EthSpec, Spec};
use crate::validator::Validator;
use crate::Hash256;

/// The validators selected to sign block roots for one sync committee period.
///
/// Members are sampled with replacement, so an index may appear more than once.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SyncCommittee {
    pub period: u64,
    pub indices: Vec<usize>,
    pub pubkeys: Vec<PublicKeyBytes>,
}

impl SyncCommittee {
    /// Sample `E::SyncCommitteeSize` members from `active_indices` using the sync committee
    /// `seed` of the period's first epoch.
    pub fn compute<E: EthSpec>(
        period: u64,
        active_indices: &[usize],
        validators: &[Validator],
        effective_balances: &[u64],
        seed: Hash256,
        spec: &Spec,
        cancel: &CancelToken,
    ) -> Result<Self, Error> {
        let size = E::sync_committee_size();
        let mut sampler =
            BalanceWeightedSampler::new(active_indices, effective_balances, seed.as_slice(), spec)?;

        let mut indices = Vec::with_capacity(size);
        while indices.len() < size {
            indices.push(sampler.next_accepted(cancel)?);
        }

        let pubkeys = indices
            .iter()
            .map(|&i| validators.get(i).map(|v| v.pubkey).ok_or(Error::UnknownValidator(i)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { period, indices, pubkeys })
    }

    /// Rebuild a committee from member indices recorded in the state.
    pub fn from_indices(period: u64, indices: &[u64], validators: &[Validator]) -> Result<Self, Error> {
        let indices = indices.iter().map(|&i| i as usize).collect::<Vec<_>>();
        let pubkeys = indices
            .iter()
            .map(|&i| validators.get(i).map(|v| v.pubkey).ok_or(Error::UnknownValidator(i)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { period, indices, pubkeys })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot_epoch::Epoch;
    use crate::MinimalEthSpec;

    #[test]
    fn committee_has_fixed_size_with_replacement() {
        let spec = Spec::minimal();
        let validators: Vec<Validator> = (0..10u8)
            .map(|i| Validator {
                pubkey: PublicKeyBytes::from_bytes([i; 48]),
                effective_balance: spec.max_effective_balance,
                activation_epoch: Epoch::new(0),
                ..Validator::default()
            })
            .collect();
        let balances: Vec<u64> = validators.iter().map(|v| v.effective_balance).collect();
        let active: Vec<usize> = (0..10).collect();

        let committee = SyncCommittee::compute::<MinimalEthSpec>(
            0,
            &active,
            &validators,
            &balances,
            Hash256::repeat_byte(5),
            &spec,
            &CancelToken::default(),
        )
        .unwrap();

        // 32 seats, 10 validators: duplicates are unavoidable.
        assert_eq!(committee.len(), 32);
        assert!(committee.indices.iter().all(|i| active.contains(i)));
        for (i, pubkey) in committee.indices.iter().zip(&committee.pubkeys) {
            assert_eq!(validators[*i].pubkey, *pubkey);
        }
    }
}
