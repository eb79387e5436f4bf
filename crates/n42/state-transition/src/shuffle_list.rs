//! Swap-or-not shuffling.
//!
//! Every round hashes `seed || round` for a pivot and `seed || round || position / 256` for the
//! swap bits. The position window is the low four little-endian bytes, which bounds lists at 2^24.

use crate::Hash256;
use ethereum_hashing::hash_fixed;
use std::mem;

const SEED_SIZE: usize = 32;
const ROUND_SIZE: usize = 1;
const POSITION_WINDOW_SIZE: usize = 4;
const PIVOT_VIEW_SIZE: usize = SEED_SIZE + ROUND_SIZE;
const TOTAL_SIZE: usize = SEED_SIZE + ROUND_SIZE + POSITION_WINDOW_SIZE;

/// Largest list the shuffle accepts.
pub const MAX_LIST_SIZE: usize = 1 << 24;

/// A helper struct to manage the buffer used during shuffling.
struct Buf([u8; TOTAL_SIZE]);

impl Buf {
    /// Create a new buffer from the given `seed`, `None` unless it is exactly 32 bytes.
    fn new(seed: &[u8]) -> Option<Self> {
        if seed.len() != SEED_SIZE {
            return None;
        }
        let mut buf = [0; TOTAL_SIZE];
        buf[0..SEED_SIZE].copy_from_slice(seed);
        Some(Self(buf))
    }

    /// Set the shuffling round.
    fn set_round(&mut self, round: u8) {
        self.0[SEED_SIZE] = round;
    }

    /// Returns the new pivot. It is "raw" because it has not modulo the list size (this must be
    /// done by the caller).
    fn raw_pivot(&self) -> u64 {
        let digest = hash_fixed(&self.0[0..PIVOT_VIEW_SIZE]);

        let mut bytes = [0; mem::size_of::<u64>()];
        bytes[..].copy_from_slice(&digest[0..mem::size_of::<u64>()]);
        u64::from_le_bytes(bytes)
    }

    /// Add the current position into the buffer.
    fn mix_in_position(&mut self, position: usize) {
        self.0[PIVOT_VIEW_SIZE..].copy_from_slice(&position.to_le_bytes()[0..POSITION_WINDOW_SIZE]);
    }

    /// Hash the entire buffer.
    fn hash(&self) -> Hash256 {
        Hash256::from(hash_fixed(&self.0))
    }
}

/// Shuffles an entire list.
///
/// `forwards == false` produces `output[i] = input[compute_shuffled_index(i)]`, the order used
/// for committees; `forwards == true` is the exact inverse, so running both directions over the
/// same seed returns the original list.
///
/// Lists of length 0 or 1 and `rounds == 0` are returned untouched. Returns `None` if the list
/// is longer than [`MAX_LIST_SIZE`] or the seed is not 32 bytes.
pub fn shuffle_list(
    mut input: Vec<usize>,
    rounds: u8,
    seed: &[u8],
    forwards: bool,
) -> Option<Vec<usize>> {
    let list_size = input.len();
    let mut buf = Buf::new(seed)?;

    if list_size > MAX_LIST_SIZE {
        return None;
    }
    if list_size <= 1 || rounds == 0 {
        return Some(input);
    }

    let mut r = if forwards { 0 } else { rounds - 1 };

    loop {
        buf.set_round(r);

        let pivot = buf.raw_pivot() as usize % list_size;

        let mirror = (pivot + 1) >> 1;

        buf.mix_in_position(pivot >> 8);
        let mut source = buf.hash();
        let mut byte_v = source[(pivot & 0xff) >> 3];

        for i in 0..mirror {
            let j = pivot - i;

            if j & 0xff == 0xff {
                buf.mix_in_position(j >> 8);
                source = buf.hash();
            }

            if j & 0x07 == 0x07 {
                byte_v = source[(j & 0xff) >> 3];
            }
            let bit_v = (byte_v >> (j & 0x07)) & 0x01;

            if bit_v == 1 {
                input.swap(i, j);
            }
        }

        let mirror = (pivot + list_size + 1) >> 1;
        let end = list_size - 1;

        buf.mix_in_position(end >> 8);
        let mut source = buf.hash();
        let mut byte_v = source[(end & 0xff) >> 3];

        for (loop_iter, i) in ((pivot + 1)..mirror).enumerate() {
            let j = end - loop_iter;

            if j & 0xff == 0xff {
                buf.mix_in_position(j >> 8);
                source = buf.hash();
            }

            if j & 0x07 == 0x07 {
                byte_v = source[(j & 0xff) >> 3];
            }
            let bit_v = (byte_v >> (j & 0x07)) & 0x01;

            if bit_v == 1 {
                input.swap(i, j);
            }
        }

        if forwards {
            r += 1;
            if r == rounds {
                break;
            }
        } else {
            if r == 0 {
                break;
            }
            r -= 1;
        }
    }

    Some(input)
}

/// Returns `p(index)` in the pseudorandom permutation `p` of `0..list_size` with `seed` as entropy.
///
/// Considerably slower per element than [`shuffle_list`], so only used when a handful of
/// positions are needed, such as proposer and sync committee sampling.
///
/// Returns `None` if `list_size == 0`, `index >= list_size`, the list is too long or the seed is
/// not 32 bytes.
pub fn compute_shuffled_index(
    index: usize,
    list_size: usize,
    seed: &[u8],
    shuffle_round_count: u8,
) -> Option<usize> {
    if list_size == 0 || index >= list_size || list_size > MAX_LIST_SIZE {
        return None;
    }
    let mut buf = Buf::new(seed)?;

    let mut index = index;
    for round in 0..shuffle_round_count {
        buf.set_round(round);
        let pivot = buf.raw_pivot() as usize % list_size;

        let flip = (pivot + (list_size - index)) % list_size;
        let position = std::cmp::max(index, flip);
        buf.mix_in_position(position >> 8);
        let source = buf.hash();
        let byte = source[(position & 0xff) >> 3];
        if (byte >> (position & 0x07)) & 0x01 == 1 {
            index = flip;
        }
    }
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ROUNDS: u8 = 90;

    fn seed(byte: u8) -> Hash256 {
        Hash256::repeat_byte(byte)
    }

    #[test]
    fn trivial_lists_are_untouched() {
        assert_eq!(shuffle_list(vec![], ROUNDS, seed(1).as_slice(), true), Some(vec![]));
        assert_eq!(shuffle_list(vec![7], ROUNDS, seed(1).as_slice(), false), Some(vec![7]));
        assert_eq!(shuffle_list(vec![3, 4, 5], 0, seed(1).as_slice(), false), Some(vec![3, 4, 5]));
    }

    #[test]
    fn rejects_bad_seed() {
        assert_eq!(shuffle_list(vec![1, 2], ROUNDS, &[0; 31], true), None);
        assert_eq!(compute_shuffled_index(0, 2, &[0; 33], ROUNDS), None);
    }

    #[test]
    fn returns_none_for_zero_length_list() {
        assert_eq!(None, compute_shuffled_index(100, 0, &[42; 32], ROUNDS));
    }

    #[test]
    fn returns_none_for_out_of_bounds_index() {
        assert_eq!(None, compute_shuffled_index(100, 100, &[42; 32], ROUNDS));
    }

    #[test]
    fn returns_none_for_too_large_list() {
        assert_eq!(None, compute_shuffled_index(100, MAX_LIST_SIZE + 1, &[42; 32], ROUNDS));
    }

    #[test]
    fn list_shuffle_agrees_with_single_index() {
        for n in [2usize, 3, 10, 257, 600] {
            let input: Vec<usize> = (0..n).collect();
            let s = seed(n as u8);
            let shuffled = shuffle_list(input.clone(), ROUNDS, s.as_slice(), false).unwrap();
            for (i, value) in shuffled.iter().enumerate() {
                let source = compute_shuffled_index(i, n, s.as_slice(), ROUNDS).unwrap();
                assert_eq!(*value, input[source], "n={n} i={i}");
            }
        }
    }

    #[test]
    fn shuffling_depends_on_seed() {
        let input: Vec<usize> = (0..64).collect();
        let a = shuffle_list(input.clone(), ROUNDS, seed(1).as_slice(), false).unwrap();
        let b = shuffle_list(input, ROUNDS, seed(2).as_slice(), false).unwrap();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn shuffle_is_a_bijection(n in 0usize..700, seed_bytes in any::<[u8; 32]>(), rounds in 0u8..20) {
            let input: Vec<usize> = (0..n).collect();
            let mut shuffled = shuffle_list(input.clone(), rounds, &seed_bytes, false).unwrap();
            shuffled.sort_unstable();
            prop_assert_eq!(shuffled, input);
        }

        #[test]
        fn unshuffle_inverts_shuffle(n in 0usize..700, seed_bytes in any::<[u8; 32]>(), rounds in 0u8..20) {
            let input: Vec<usize> = (0..n).map(|i| i * 3 + 1).collect();
            let shuffled = shuffle_list(input.clone(), rounds, &seed_bytes, true).unwrap();
            let restored = shuffle_list(shuffled.clone(), rounds, &seed_bytes, false).unwrap();
            prop_assert_eq!(&restored, &input);
            let reshuffled = shuffle_list(restored, rounds, &seed_bytes, true).unwrap();
            prop_assert_eq!(reshuffled, shuffled);
        }
    }
}
