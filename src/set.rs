use std::io::Result;
use std::path::Path;

use bytemuck::Pod;

use crate::{FileHeader, StaticPerfectHashMap};

/// Immutable perfect hash set loaded from a serialized table.
///
/// The set layout is the map layout without a value array (magic `SPHS`,
/// value size zero). Membership tests are a single probe followed by a
/// byte-wise comparison, so keys outside the original set never match.
#[derive(Debug, Clone)]
pub struct StaticPerfectHashSet<K> {
    inner: StaticPerfectHashMap<K, ()>,
}

impl<K: Pod> Default for StaticPerfectHashSet<K> {
    fn default() -> Self {
        Self {
            inner: StaticPerfectHashMap::default(),
        }
    }
}

impl<K: Pod> StaticPerfectHashSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a set from a serialized buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        StaticPerfectHashMap::from_bytes(data).map(|inner| Self { inner })
    }

    /// Reads and decodes the set stored at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        StaticPerfectHashMap::open(path).map(|inner| Self { inner })
    }

    /// Replaces the contents of this set; see
    /// [`StaticPerfectHashMap::load_from_memory`].
    pub fn load_from_memory(&mut self, data: &[u8]) -> Result<()> {
        self.inner.load_from_memory(data)
    }

    /// Replaces the contents of this set; see
    /// [`StaticPerfectHashMap::load_from_file`].
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.inner.load_from_file(path)
    }

    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    pub fn header(&self) -> Option<&FileHeader> {
        self.inner.header()
    }

    pub fn clear(&mut self) {
        self.inner.clear()
    }

    /// Iterates over all keys in slot order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &K> + '_ {
        self.inner.iter().map(|(key, _)| key)
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    fn build_set(keys: impl IntoIterator<Item = u64>) -> Vec<u8> {
        let mut builder = StaticPerfectHashSetBuilder::<u64>::new();
        for key in keys {
            assert!(builder.add_key(key));
        }
        builder.build().unwrap();
        builder.to_bytes().unwrap()
    }

    #[test]
    fn test_basic() {
        let bytes = build_set((0..500).map(|i| i * 3));
        let set = StaticPerfectHashSet::<u64>::from_bytes(&bytes).unwrap();
        assert_eq!(set.len(), 500);
        assert_eq!(&set.header().unwrap().magic, b"SPHS");
        for i in 0..1500 {
            assert_eq!(set.contains(&i), i % 3 == 0);
        }
        let mut keys: Vec<u64> = set.iter().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..500).map(|i| i * 3).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.sphs");
        let mut builder = StaticPerfectHashSetBuilder::<u64>::new();
        builder.build().unwrap();
        builder.save_to_file(&path).unwrap();

        let mut set = StaticPerfectHashSet::<u64>::new();
        assert!(!set.contains(&0));
        set.load_from_file(&path).unwrap();
        assert!(set.is_ready());
        assert!(set.is_empty());
        assert!(!set.contains(&0));
    }

    #[test]
    fn test_rejects_map_layout() {
        let mut builder = StaticPerfectHashMapBuilder::<u64, u64>::new();
        builder.add(1, 1);
        builder.build().unwrap();
        let bytes = builder.to_bytes().unwrap();

        let mut set = StaticPerfectHashSet::<u64>::from_bytes(&build_set([1, 2])).unwrap();
        assert!(set.contains(&1));
        set.load_from_memory(&bytes).unwrap_err();
        assert!(!set.is_ready());
        assert!(!set.contains(&1));

        let mut corrupted = build_set([5]);
        corrupted[3] = b'M';
        StaticPerfectHashSet::<u64>::from_bytes(&corrupted).unwrap_err();
    }
}
