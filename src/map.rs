use std::io::{Error, ErrorKind, Result};
use std::path::Path;

use bytemuck::Pod;

use crate::hasher::{HashPair, bucket_index, slot_index};
use crate::{FileHeader, TableKind};

/// Immutable perfect hash map loaded from a serialized table.
///
/// A `StaticPerfectHashMap` starts empty and becomes ready after a successful
/// [`load_from_memory`](Self::load_from_memory) or
/// [`load_from_file`](Self::load_from_file). Lookups hash the key once, read
/// one displacement and compare one stored key, so absent keys are always
/// rejected. The loaded data is owned and never mutated, which makes a ready
/// map safe to share between threads for concurrent reads.
///
/// # Type Parameters
/// - `K`: key type; must match the key size recorded in the file.
/// - `V`: value type; must match the value size recorded in the file.
#[derive(Debug, Clone)]
pub struct StaticPerfectHashMap<K, V> {
    header: Option<FileHeader>,
    hash_pair: HashPair,
    displacements: Vec<u16>,
    keys: Vec<K>,
    values: Vec<V>,
}

impl<K: Pod, V: Pod> Default for StaticPerfectHashMap<K, V> {
    fn default() -> Self {
        Self {
            header: None,
            hash_pair: HashPair::for_buckets(0),
            displacements: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<K: Pod, V: Pod> StaticPerfectHashMap<K, V> {
    /// Creates an empty map that answers every lookup with a miss.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a map from a serialized buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::decode(data)
    }

    /// Reads and decodes the map stored at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::decode(&std::fs::read(path)?)
    }

    /// Replaces the contents of this map with the table serialized in `data`.
    ///
    /// The buffer is validated in full (magic, version, element sizes,
    /// checksum and length) before anything is copied.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidData` when validation fails. On any error the
    /// map is left empty.
    pub fn load_from_memory(&mut self, data: &[u8]) -> Result<()> {
        match Self::decode(data) {
            Ok(map) => {
                *self = map;
                Ok(())
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Replaces the contents of this map with the table stored at `path`.
    ///
    /// # Errors
    ///
    /// Forwards IO errors from reading the file and validation errors from
    /// [`load_from_memory`](Self::load_from_memory). On any error the map is
    /// left empty.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        match std::fs::read(path) {
            Ok(data) => self.load_from_memory(&data),
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Returns the value stored for `key`.
    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.slot_of(key).map(|slot| &self.values[slot])
    }

    /// Looks up several keys, preserving their order.
    pub fn get_many<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> Vec<Option<&V>>
    where
        K: 'a,
    {
        keys.into_iter().map(|key| self.get(key)).collect()
    }

    /// Returns `true` if `key` is stored in the map.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.slot_of(key).is_some()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns `true` once a table has been loaded successfully.
    pub fn is_ready(&self) -> bool {
        self.header.is_some()
    }

    /// Header of the loaded table.
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Drops the loaded table and returns to the empty state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Iterates over all entries in slot order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, &V)> + '_ {
        self.keys.iter().zip(self.values.iter())
    }

    pub(crate) fn slot_of(&self, key: &K) -> Option<usize> {
        let n = self.keys.len() as u32;
        if n == 0 {
            return None;
        }
        let bytes = bytemuck::bytes_of(key);
        let (h1, h2) = self.hash_pair.hash(bytes);
        let displacement = self.displacements[bucket_index(h1, self.displacements.len() as u32)];
        let slot = slot_index(h1, h2, displacement, n);
        (bytemuck::bytes_of(&self.keys[slot]) == bytes).then_some(slot)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let key_size = std::mem::size_of::<K>();
        let value_size = std::mem::size_of::<V>();
        if key_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "Key type is zero-sized"));
        }

        let header = FileHeader::parse(data)?;
        header.validate(TableKind::for_value_size(value_size), key_size, value_size)?;
        if data.len() as u64 != header.total_size() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "Length mismatch: buffer has {} bytes, header describes {}",
                    data.len(),
                    header.total_size()
                ),
            ));
        }

        let num_keys = header.num_keys as usize;
        let num_buckets = header.num_buckets as usize;
        let (table, rest) = data[FileHeader::SIZE..].split_at(num_buckets * 2);
        let (key_bytes, value_bytes) = rest.split_at(num_keys * key_size);

        let displacements = table
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let keys = key_bytes
            .chunks_exact(key_size)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        let values = if value_size == 0 {
            vec![V::zeroed(); num_keys]
        } else {
            value_bytes
                .chunks_exact(value_size)
                .map(bytemuck::pod_read_unaligned)
                .collect()
        };

        Ok(Self {
            header: Some(header),
            hash_pair: HashPair::for_buckets(header.num_buckets),
            displacements,
            keys,
            values,
        })
    }
}
