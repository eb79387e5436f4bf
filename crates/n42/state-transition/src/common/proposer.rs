//! Effective-balance weighted selection of proposers and sync committee members.

use crate::arith::SafeArith;
use crate::beacon_state::Error;
use crate::cancel::CancelToken;
use crate::int_to_bytes8;
use crate::shuffle_list::compute_shuffled_index;
use crate::spec::Spec;
use crate::Hash256;
use ethereum_hashing::hash;

const MAX_RANDOM_BYTE: u64 = (1 << 8) - 1;

/// Draws candidates from a shuffled view of `candidates`, accepting each with probability
/// proportional to its effective balance.
#[derive(Debug)]
pub struct BalanceWeightedSampler<'a> {
    candidates: &'a [usize],
    effective_balances: &'a [u64],
    seed: &'a [u8],
    spec: &'a Spec,
    i: usize,
    /// The hash block `i / 32` most recently computed, to avoid hashing once per draw.
    random_bytes: Option<(usize, Vec<u8>)>,
}

impl<'a> BalanceWeightedSampler<'a> {
    pub fn new(
        candidates: &'a [usize],
        effective_balances: &'a [u64],
        seed: &'a [u8],
        spec: &'a Spec,
    ) -> Result<Self, Error> {
        if candidates.is_empty() {
            return Err(Error::InsufficientValidators);
        }
        Ok(Self { candidates, effective_balances, seed, spec, i: 0, random_bytes: None })
    }

    fn random_byte(&mut self, i: usize) -> Result<u8, Error> {
        let block = i.safe_div(32)?;
        if self.random_bytes.as_ref().map(|(cached, _)| *cached) != Some(block) {
            let mut preimage = self.seed.to_vec();
            preimage.extend_from_slice(&int_to_bytes8(block as u64));
            self.random_bytes = Some((block, hash(&preimage)));
        }
        let index = i.safe_rem(32)?;
        self.random_bytes
            .as_ref()
            .and_then(|(_, bytes)| bytes.get(index))
            .copied()
            .ok_or(Error::ShuffleIndexOutOfBounds(index))
    }

    /// Keep drawing until a candidate is accepted and return its validator index.
    pub fn next_accepted(&mut self, cancel: &CancelToken) -> Result<usize, Error> {
        let n = self.candidates.len();
        loop {
            cancel.checkpoint(self.i)?;

            let i = self.i;
            self.i.safe_add_assign(1)?;

            let shuffled_index = compute_shuffled_index(
                i.safe_rem(n)?,
                n,
                self.seed,
                self.spec.shuffle_round_count,
            )
            .ok_or(Error::UnableToShuffle)?;
            let candidate_index = *self
                .candidates
                .get(shuffled_index)
                .ok_or(Error::ShuffleIndexOutOfBounds(shuffled_index))?;
            let random_byte = self.random_byte(i)?;
            let effective_balance = self
                .effective_balances
                .get(candidate_index)
                .copied()
                .ok_or(Error::UnknownValidator(candidate_index))?;

            if effective_balance.safe_mul(MAX_RANDOM_BYTE)? >=
                self.spec.max_effective_balance.safe_mul(u64::from(random_byte))?
            {
                return Ok(candidate_index);
            }
        }
    }
}

/// Return the proposer for the slot whose proposer seed is `seed`.
pub fn compute_proposer_index(
    active_indices: &[usize],
    effective_balances: &[u64],
    seed: &[u8],
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<usize, Error> {
    BalanceWeightedSampler::new(active_indices, effective_balances, seed, spec)?
        .next_accepted(cancel)
}

/// The per-slot proposer seed: `hash(epoch_seed || slot)`.
pub fn proposer_seed(epoch_seed: Hash256, slot: u64) -> Hash256 {
    let mut preimage = epoch_seed.to_vec();
    preimage.extend_from_slice(&int_to_bytes8(slot));
    Hash256::from_slice(&hash(&preimage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::Cancelled;
    use assert_matches::assert_matches;

    #[test]
    fn proposer_is_a_candidate_and_deterministic() {
        let spec = Spec::minimal();
        let candidates: Vec<usize> = (0..50).map(|i| i * 2).collect();
        let balances = vec![spec.max_effective_balance; 100];
        let cancel = CancelToken::default();

        for slot in 0..16u64 {
            let seed = proposer_seed(Hash256::repeat_byte(3), slot);
            let a = compute_proposer_index(&candidates, &balances, seed.as_slice(), &spec, &cancel)
                .unwrap();
            let b = compute_proposer_index(&candidates, &balances, seed.as_slice(), &spec, &cancel)
                .unwrap();
            assert_eq!(a, b);
            assert!(candidates.contains(&a));
        }
    }

    #[test]
    fn max_balance_is_always_accepted() {
        let spec = Spec::minimal();
        let candidates = vec![0, 1, 2, 3];
        let balances = vec![spec.max_effective_balance; 4];
        let seed = Hash256::repeat_byte(1);
        let expected = candidates[compute_shuffled_index(0, 4, seed.as_slice(), 10).unwrap()];
        let got = compute_proposer_index(
            &candidates,
            &balances,
            seed.as_slice(),
            &spec,
            &CancelToken::default(),
        )
        .unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn low_balance_candidates_are_rejected_more_often() {
        let spec = Spec::minimal();
        let candidates = vec![0, 1];
        // Validator 0 holds a full balance, validator 1 a single increment.
        let balances = vec![spec.max_effective_balance, spec.effective_balance_increment];
        let cancel = CancelToken::default();
        let seed = Hash256::repeat_byte(7);
        let mut sampler =
            BalanceWeightedSampler::new(&candidates, &balances, seed.as_slice(), &spec).unwrap();

        let mut counts = [0usize; 2];
        for _ in 0..200 {
            counts[sampler.next_accepted(&cancel).unwrap()] += 1;
        }
        assert!(counts[0] > counts[1] * 4, "{counts:?}");
    }

    #[test]
    fn empty_candidates_and_cancellation() {
        let spec = Spec::minimal();
        let seed = Hash256::ZERO;
        assert_matches!(
            BalanceWeightedSampler::new(&[], &[], seed.as_slice(), &spec),
            Err(Error::InsufficientValidators)
        );

        let cancel = CancelToken::default();
        cancel.cancel();
        assert_eq!(cancel.check(), Err(Cancelled));
        assert_matches!(
            compute_proposer_index(&[0], &[32], seed.as_slice(), &spec, &cancel),
            Err(Error::Cancelled)
        );
    }
}
