use std::hash::{BuildHasher, Hasher};

use bytemuck::Pod;
use foldhash::fast::FixedState;
use hashbrown::HashTable;
use hashbrown::hash_table::Entry;

/// Collects distinct keys (and their values) ahead of construction.
///
/// Duplicate detection is hash-assisted: an index of positions keyed by a hash
/// of the key bytes, with byte-wise equality as the final word. Accumulation is
/// single-threaded; callers sharing one accumulator must serialize access.
#[derive(Debug)]
pub struct KeyAccumulator<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
    index: HashTable<usize>,
    hash_state: FixedState,
}

impl<K: Pod, V: Pod> Default for KeyAccumulator<K, V> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            index: HashTable::new(),
            hash_state: FixedState::with_seed(0),
        }
    }
}

impl<K: Pod, V: Pod> KeyAccumulator<K, V> {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `(key, value)` unless `key` was already added.
    ///
    /// Returns `false` and leaves the accumulator untouched on a duplicate.
    pub fn add(&mut self, key: K, value: V) -> bool {
        let hash = self.hash_key(&key);
        let position = self.keys.len();
        let (keys, state) = (&self.keys, &self.hash_state);
        let bytes = bytemuck::bytes_of(&key);
        match self.index.entry(
            hash,
            |&i| bytemuck::bytes_of(&keys[i]) == bytes,
            |&i| hash_bytes(state, bytemuck::bytes_of(&keys[i])),
        ) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(v) => {
                v.insert(position);
            }
        }
        self.keys.push(key);
        self.values.push(value);
        true
    }

    /// Returns `true` if `key` has been added.
    pub fn contains(&self, key: &K) -> bool {
        let bytes = bytemuck::bytes_of(key);
        self.index
            .find(self.hash_key(key), |&i| bytemuck::bytes_of(&self.keys[i]) == bytes)
            .is_some()
    }

    /// Number of accumulated keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Accumulated keys in insertion order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Accumulated values, parallel to [`keys`](Self::keys).
    pub fn values(&self) -> &[V] {
        &self.values
    }

    fn hash_key(&self, key: &K) -> u64 {
        hash_bytes(&self.hash_state, bytemuck::bytes_of(key))
    }
}

fn hash_bytes(state: &FixedState, bytes: &[u8]) -> u64 {
    let mut hasher = state.build_hasher();
    hasher.write(bytes);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_rejection() {
        let mut acc = KeyAccumulator::<u64, u32>::new();
        assert!(acc.is_empty());
        assert!(acc.add(1, 10));
        assert!(acc.add(2, 20));
        assert!(!acc.add(1, 99));
        assert_eq!(acc.len(), 2);
        assert_eq!(acc.keys(), &[1, 2]);
        assert_eq!(acc.values(), &[10, 20]);
        assert!(acc.contains(&2));
        assert!(!acc.contains(&3));
    }

    #[test]
    fn test_many_keys() {
        let mut acc = KeyAccumulator::<u32, ()>::new();
        for i in 0..10_000u32 {
            assert!(acc.add(i.wrapping_mul(2654435761), ()));
        }
        for i in 0..10_000u32 {
            assert!(!acc.add(i.wrapping_mul(2654435761), ()));
        }
        assert_eq!(acc.len(), 10_000);
    }

    #[test]
    fn test_byte_equality_keys() {
        let mut acc = KeyAccumulator::<[u8; 3], u8>::new();
        assert!(acc.add(*b"abc", 1));
        assert!(acc.add(*b"abd", 2));
        assert!(!acc.add(*b"abc", 3));
        assert_eq!(acc.values(), &[1, 2]);
    }
}
