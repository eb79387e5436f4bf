//! Map from validator public keys to registry indices, shared between sibling states.
//!
//! A cache is a chain of segments. Each segment trusts the first `prefix_len` entries of its
//! parent and owns everything after that. Appending at the end mutates the segment in place
//! under its write lock. Re-assigning an existing index to a different key never touches the
//! shared segment: the importing handle moves to a fresh segment that inherits the prefix below
//! the conflict, so other handles keep reading the old chain undisturbed.

use crate::crypto::PublicKeyBytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PubkeyCacheError {
    /// The import would leave a hole in the index space.
    Gap { index: usize, len: usize },
    /// The key is already assigned to another index.
    DuplicatePubkey { index: usize, existing: usize },
}

#[derive(Debug, Default)]
struct Entries {
    pubkeys: Vec<PublicKeyBytes>,
    indices: HashMap<PublicKeyBytes, usize>,
}

impl Entries {
    fn push(&mut self, index: usize, pubkey: PublicKeyBytes) {
        self.pubkeys.push(pubkey);
        self.indices.insert(pubkey, index);
    }
}

#[derive(Debug, Default)]
struct Segment {
    parent: Option<Arc<Segment>>,
    prefix_len: usize,
    entries: RwLock<Entries>,
}

impl Segment {
    fn len(&self) -> usize {
        self.prefix_len + self.entries.read().pubkeys.len()
    }

    fn get_index(&self, pubkey: &PublicKeyBytes) -> Option<usize> {
        if let Some(&index) = self.entries.read().indices.get(pubkey) {
            return Some(index);
        }
        self.parent.as_ref()?.get_index(pubkey).filter(|&index| index < self.prefix_len)
    }

    fn get_pubkey(&self, index: usize) -> Option<PublicKeyBytes> {
        if index < self.prefix_len {
            self.parent.as_ref()?.get_pubkey(index)
        } else {
            self.entries.read().pubkeys.get(index - self.prefix_len).copied()
        }
    }

    fn get_prefix_index(&self, pubkey: &PublicKeyBytes) -> Option<usize> {
        self.parent.as_ref()?.get_index(pubkey).filter(|&index| index < self.prefix_len)
    }
}

/// What `import` has to do once it has looked at the current segment.
enum Import {
    Appended,
    AlreadyKnown,
    Fork,
}

/// A cheaply clonable handle onto a pubkey cache.
///
/// Appends made through a sibling handle become visible through the shared segment, but only
/// the first `verified` indices have been checked against this handle's own registry.
#[derive(Debug, Clone, Default)]
pub struct PubkeyCache {
    segment: Arc<Segment>,
    verified: usize,
}

impl PubkeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys visible through this handle.
    pub fn len(&self) -> usize {
        self.segment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of leading indices imported through this handle.
    pub const fn verified_len(&self) -> usize {
        self.verified
    }

    pub fn get_index(&self, pubkey: &PublicKeyBytes) -> Option<usize> {
        self.segment.get_index(pubkey)
    }

    pub fn get_pubkey(&self, index: usize) -> Option<PublicKeyBytes> {
        self.segment.get_pubkey(index)
    }

    /// Returns `true` if both handles read from the same segment.
    pub fn shares_segment_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.segment, &other.segment)
    }

    /// Record that validator `index` has `pubkey`.
    ///
    /// Importing the key already known at `index` is a no-op. Importing a different key at a
    /// known index forks this handle off the shared chain. Either way `index` counts as
    /// verified for this handle afterwards.
    pub fn import(&mut self, index: usize, pubkey: PublicKeyBytes) -> Result<(), PubkeyCacheError> {
        let outcome = {
            let segment = &self.segment;
            let mut entries = segment.entries.write();
            let len = segment.prefix_len + entries.pubkeys.len();

            if index > len {
                return Err(PubkeyCacheError::Gap { index, len });
            }

            if index == len {
                if let Some(existing) = entries
                    .indices
                    .get(&pubkey)
                    .copied()
                    .or_else(|| segment.get_prefix_index(&pubkey))
                {
                    return Err(PubkeyCacheError::DuplicatePubkey { index, existing });
                }
                entries.push(index, pubkey);
                Import::Appended
            } else {
                let known = if index < segment.prefix_len {
                    segment.parent.as_ref().and_then(|parent| parent.get_pubkey(index))
                } else {
                    entries.pubkeys.get(index - segment.prefix_len).copied()
                };
                if known == Some(pubkey) {
                    Import::AlreadyKnown
                } else {
                    Import::Fork
                }
            }
        };

        match outcome {
            Import::Appended | Import::AlreadyKnown => self.verified = self.verified.max(index + 1),
            Import::Fork => {
                self.fork_at(index, pubkey)?;
                self.verified = index + 1;
            }
        }
        Ok(())
    }

    fn fork_at(&mut self, index: usize, pubkey: PublicKeyBytes) -> Result<(), PubkeyCacheError> {
        if let Some(existing) = self.segment.get_index(&pubkey).filter(|&i| i < index) {
            return Err(PubkeyCacheError::DuplicatePubkey { index, existing });
        }

        warn!(
            target: "state_transition::pubkey_cache",
            index,
            previous_len = self.len(),
            "Validator index re-assigned, forking pubkey cache"
        );

        let mut entries = Entries::default();
        entries.push(index, pubkey);
        self.segment = Arc::new(Segment {
            parent: Some(self.segment.clone()),
            prefix_len: index,
            entries: RwLock::new(entries),
        });
        Ok(())
    }
}

impl PartialEq for PubkeyCache {
    fn eq(&self, other: &Self) -> bool {
        self.verified == other.verified &&
            (self.shares_segment_with(other) ||
                (0..self.verified).all(|i| self.get_pubkey(i) == other.get_pubkey(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn key(byte: u8) -> PublicKeyBytes {
        PublicKeyBytes::from_bytes([byte; 48])
    }

    fn cache_with(n: u8) -> PubkeyCache {
        let mut cache = PubkeyCache::new();
        for i in 0..n {
            cache.import(i as usize, key(i)).unwrap();
        }
        cache
    }

    #[test]
    fn append_and_lookup() {
        let cache = cache_with(4);
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get_index(&key(2)), Some(2));
        assert_eq!(cache.get_pubkey(3), Some(key(3)));
        assert_eq!(cache.get_pubkey(4), None);
        assert_eq!(cache.get_index(&key(9)), None);
    }

    #[test]
    fn reimport_is_noop() {
        let mut cache = cache_with(3);
        let before = cache.clone();
        cache.import(1, key(1)).unwrap();
        assert!(cache.shares_segment_with(&before));
    }

    #[test]
    fn gap_and_duplicate_are_errors() {
        let mut cache = cache_with(3);
        assert_matches!(cache.import(5, key(5)), Err(PubkeyCacheError::Gap { index: 5, len: 3 }));
        assert_matches!(
            cache.import(3, key(0)),
            Err(PubkeyCacheError::DuplicatePubkey { index: 3, existing: 0 })
        );
    }

    #[test]
    fn appends_are_shared_between_clones() {
        let mut a = cache_with(2);
        let b = a.clone();
        a.import(2, key(2)).unwrap();
        assert_eq!(b.len(), 3);
        assert_eq!(b.get_index(&key(2)), Some(2));
        assert_eq!(a.verified_len(), 3);
        assert_eq!(b.verified_len(), 2);
    }

    #[test]
    fn sibling_append_at_same_index_forks() {
        let mut a = cache_with(2);
        let mut b = a.clone();
        a.import(2, key(0xaa)).unwrap();

        b.import(2, key(0xbb)).unwrap();

        assert!(!b.shares_segment_with(&a));
        assert_eq!(b.verified_len(), 3);
        assert_eq!(b.get_index(&key(0xbb)), Some(2));
        assert_eq!(b.get_index(&key(0xaa)), None);
        assert_eq!(a.get_index(&key(0xaa)), Some(2));
        assert_eq!(a.get_index(&key(0xbb)), None);
        assert_ne!(a, b);
    }

    #[test]
    fn conflict_forks_without_disturbing_old_handle() {
        let mut old = cache_with(4);
        let mut forked = old.clone();

        forked.import(2, key(42)).unwrap();

        assert!(!forked.shares_segment_with(&old));
        assert_eq!(forked.len(), 3);
        assert_eq!(forked.get_pubkey(1), Some(key(1)));
        assert_eq!(forked.get_pubkey(2), Some(key(42)));
        assert_eq!(forked.get_index(&key(42)), Some(2));
        assert_eq!(forked.get_index(&key(2)), None);
        assert_eq!(forked.get_index(&key(3)), None);

        assert_eq!(old.len(), 4);
        assert_eq!(old.get_pubkey(2), Some(key(2)));
        assert_eq!(old.get_index(&key(42)), None);

        // The old chain keeps growing on its own.
        old.import(4, key(4)).unwrap();
        assert_eq!(forked.len(), 3);
        forked.import(3, key(43)).unwrap();
        assert_eq!(forked.get_index(&key(43)), Some(3));
        assert_eq!(old.get_index(&key(43)), None);
    }

    #[test]
    fn fork_rejects_key_from_trusted_prefix() {
        let mut cache = cache_with(4);
        assert_matches!(
            cache.import(2, key(0)),
            Err(PubkeyCacheError::DuplicatePubkey { index: 2, existing: 0 })
        );
    }

    #[test]
    fn nested_forks_resolve_through_parents() {
        let mut cache = cache_with(6);
        cache.import(4, key(40)).unwrap();
        cache.import(5, key(50)).unwrap();
        cache.import(2, key(20)).unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.verified_len(), 3);
        assert_eq!(cache.get_pubkey(0), Some(key(0)));
        assert_eq!(cache.get_pubkey(2), Some(key(20)));
        assert_eq!(cache.get_index(&key(40)), None);
        assert_eq!(cache.get_index(&key(1)), Some(1));
    }
}
