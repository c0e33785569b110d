use std::fs::File;
use std::io::{BufWriter, Error, ErrorKind, Result, Write};
use std::path::Path;

use bytemuck::Pod;

use crate::construct::{ConstructionParams, construct};
use crate::{BuildStats, FileHeader, KeyAccumulator, TableKind};

/// Lifecycle of a [`StaticPerfectHashMapBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    /// Keys may still be added.
    Accumulating,
    /// Construction succeeded; the table can be exported.
    Built,
    /// Construction exhausted its retries. Terminal.
    Failed,
}

/// Slot-ordered output of a successful build.
#[derive(Debug)]
struct BuiltTable<K, V> {
    header: FileHeader,
    displacements: Vec<u16>,
    keys: Vec<K>,
    values: Vec<V>,
}

/// Builder for static perfect hash maps.
///
/// Pairs are accumulated with [`add`](Self::add), then [`build`](Self::build)
/// searches for a minimal perfect slot assignment. A built table is exported
/// with [`save_to_file`](Self::save_to_file),
/// [`save_to_memory`](Self::save_to_memory) or [`write_to`](Self::write_to) and
/// loaded back with [`StaticPerfectHashMap`](crate::StaticPerfectHashMap).
///
/// Keys and values must be [`Pod`]: fixed width, no padding and no pointers.
/// Keys compare byte-wise. A builder whose value type is zero-sized produces a
/// set layout; see [`StaticPerfectHashSetBuilder`].
///
/// `build` runs once. A failed build is terminal: further `add` calls are
/// rejected and nothing can be exported.
#[derive(Debug)]
pub struct StaticPerfectHashMapBuilder<K, V> {
    entries: KeyAccumulator<K, V>,
    params: ConstructionParams,
    writer_buffer_size: usize,
    state: BuilderState,
    stats: BuildStats,
    table: Option<BuiltTable<K, V>>,
}

/// Builder for static perfect hash sets, a map builder without values.
pub type StaticPerfectHashSetBuilder<K> = StaticPerfectHashMapBuilder<K, ()>;

impl<K: Pod, V: Pod> Default for StaticPerfectHashMapBuilder<K, V> {
    fn default() -> Self {
        Self {
            entries: KeyAccumulator::new(),
            params: ConstructionParams::default(),
            writer_buffer_size: 16 << 20, // 16 MiB
            state: BuilderState::Accumulating,
            stats: BuildStats::default(),
            table: None,
        }
    }
}

impl<K: Pod, V: Pod> StaticPerfectHashMapBuilder<K, V> {
    /// Creates an empty builder with default construction parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the average number of keys per bucket in the first attempt.
    ///
    /// Smaller buckets are cheaper to place but enlarge the displacement
    /// table. Values below one are treated as one.
    pub fn with_keys_per_bucket(mut self, keys_per_bucket: f64) -> Self {
        self.params.keys_per_bucket = keys_per_bucket;
        self
    }

    /// Sets how many further attempts follow a failed one.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.params.max_retries = max_retries;
        self
    }

    /// Caps the displacement values tried for each bucket.
    pub fn with_search_limit(mut self, search_limit: u16) -> Self {
        self.params.search_limit = search_limit;
        self
    }

    /// Adjusts the capacity of the buffered writer used by
    /// [`save_to_file`](Self::save_to_file).
    pub fn with_writer_buffer_size(mut self, size: usize) -> Self {
        self.writer_buffer_size = size;
        self
    }

    /// Adds a key-value pair.
    ///
    /// Returns `false` without changing anything if `key` is already present
    /// or if [`build`](Self::build) has already run.
    pub fn add(&mut self, key: K, value: V) -> bool {
        if self.state != BuilderState::Accumulating {
            return false;
        }
        self.entries.add(key, value)
    }

    /// Number of accumulated keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Statistics of the last [`build`](Self::build), also after a failure.
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Constructs the perfect hash over the accumulated keys.
    ///
    /// Calling it again after success returns the same statistics.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Other` when every attempt failed to place the keys,
    /// and `ErrorKind::InvalidInput` when the key type is zero-sized or there
    /// are more keys than the header can count. Both leave the builder in
    /// [`BuilderState::Failed`].
    pub fn build(&mut self) -> Result<&BuildStats> {
        match self.state {
            BuilderState::Built => return Ok(&self.stats),
            BuilderState::Failed => {
                return Err(Error::other("Construction already failed"));
            }
            BuilderState::Accumulating => {}
        }

        let key_size = std::mem::size_of::<K>();
        let value_size = std::mem::size_of::<V>();
        if key_size == 0 {
            self.state = BuilderState::Failed;
            return Err(Error::new(ErrorKind::InvalidInput, "Key type is zero-sized"));
        }
        let num_keys = match u32::try_from(self.entries.len()) {
            Ok(n) if n < u32::MAX => n,
            _ => {
                self.state = BuilderState::Failed;
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("Too many keys: {}", self.entries.len()),
                ));
            }
        };

        let keys = self.entries.keys();
        let values = self.entries.values();
        let construction = construct(keys.iter().map(bytemuck::bytes_of), &self.params);

        self.stats = BuildStats {
            num_keys: num_keys as u64,
            num_buckets: construction.num_buckets as u64,
            retry_count: construction.retry_count,
            build_time_us: construction.elapsed_us,
            hash_seed: construction.seed,
            ..Default::default()
        };

        let Some(placement) = construction.placement else {
            self.state = BuilderState::Failed;
            return Err(Error::other(format!(
                "Failed to construct perfect hash for {} keys after {} retries",
                num_keys, construction.retry_count
            )));
        };

        let header = FileHeader::new(
            TableKind::for_value_size(value_size),
            num_keys,
            placement.num_buckets,
            key_size as u32,
            value_size as u32,
        );
        let table = BuiltTable {
            header,
            displacements: placement.displacements,
            keys: placement.order.iter().map(|&i| keys[i]).collect(),
            values: placement.order.iter().map(|&i| values[i]).collect(),
        };

        let raw_size = num_keys as u64 * (key_size + value_size) as u64;
        self.stats.total_size = header.total_size();
        self.stats.space_overhead = if raw_size == 0 {
            0.0
        } else {
            self.stats.total_size as f64 / raw_size as f64
        };
        self.table = Some(table);
        self.state = BuilderState::Built;
        Ok(&self.stats)
    }

    /// Writes the serialized table to `writer`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidInput` before a successful build, otherwise
    /// forwards IO errors from `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<u64> {
        let table = self.built()?;
        writer.write_all(&table.header.serialize())?;
        for displacement in &table.displacements {
            writer.write_all(&displacement.to_le_bytes())?;
        }
        writer.write_all(bytemuck::cast_slice(&table.keys))?;
        if table.header.value_size > 0 {
            writer.write_all(bytemuck::cast_slice(&table.values))?;
        }
        writer.flush()?;
        Ok(table.header.total_size())
    }

    /// Appends the serialized table to `buffer`.
    ///
    /// Nothing is appended on error.
    pub fn save_to_memory(&self, buffer: &mut Vec<u8>) -> Result<u64> {
        let table = self.built()?;
        buffer.reserve(table.header.total_size() as usize);
        self.write_to(buffer)
    }

    /// Serializes the table into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.save_to_memory(&mut buffer)?;
        Ok(buffer)
    }

    /// Writes the serialized table to a new file at `path`.
    ///
    /// The file is not created unless the builder is in
    /// [`BuilderState::Built`].
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        self.built()?;
        let file = File::create(path)?;
        let writer = BufWriter::with_capacity(self.writer_buffer_size, file);
        self.write_to(writer)
    }

    fn built(&self) -> Result<&BuiltTable<K, V>> {
        match (&self.state, &self.table) {
            (BuilderState::Built, Some(table)) => Ok(table),
            (state, _) => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Table is not built (state: {:?})", state),
            )),
        }
    }
}

impl<K: Pod> StaticPerfectHashMapBuilder<K, ()> {
    /// Adds a key to a set builder. See [`add`](Self::add).
    pub fn add_key(&mut self, key: K) -> bool {
        self.add(key, ())
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn test_lifecycle() {
        let mut builder = StaticPerfectHashMapBuilder::<u32, u64>::new();
        assert_eq!(builder.state(), BuilderState::Accumulating);
        assert!(builder.add(1, 100));
        assert!(builder.add(2, 200));
        assert!(!builder.add(1, 300));
        assert_eq!(builder.len(), 2);

        builder.to_bytes().unwrap_err();

        let stats = builder.build().unwrap().clone();
        assert_eq!(stats.num_keys, 2);
        assert_eq!(builder.state(), BuilderState::Built);
        assert!(!builder.add(3, 300));
        assert_eq!(builder.len(), 2);
        assert_eq!(builder.build().unwrap(), &stats);

        let bytes = builder.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, stats.total_size);
        assert_eq!(&bytes[..4], b"SPHM");
    }

    #[test]
    fn test_failed_build_is_terminal() {
        let mut builder = StaticPerfectHashMapBuilder::<u64, u64>::new()
            .with_keys_per_bucket(64.0)
            .with_search_limit(0)
            .with_max_retries(2);
        for i in 0..64 {
            assert!(builder.add(i, i));
        }
        let err = builder.build().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Other);
        assert_eq!(builder.state(), BuilderState::Failed);
        assert_eq!(builder.stats().retry_count, 2);
        assert_eq!(builder.stats().num_keys, 64);

        assert!(!builder.add(100, 100));
        builder.build().unwrap_err();

        let mut buffer = vec![7u8];
        let err = builder.save_to_memory(&mut buffer).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert_eq!(buffer, vec![7u8]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.sphm");
        builder.save_to_file(&path).unwrap_err();
        assert!(!path.exists());
    }

    #[test]
    fn test_set_layout() {
        let mut builder = StaticPerfectHashSetBuilder::<u64>::new();
        for i in 0..10 {
            assert!(builder.add_key(i * 3));
        }
        assert!(!builder.add_key(0));
        let stats = builder.build().unwrap().clone();

        let mut buffer = Vec::new();
        let written = builder.save_to_memory(&mut buffer).unwrap();
        assert_eq!(written, buffer.len() as u64);
        let header = FileHeader::parse(&buffer).unwrap();
        assert_eq!(&header.magic, b"SPHS");
        assert_eq!(header.value_size, 0);
        assert_eq!(header.key_size, 8);
        assert_eq!(header.num_keys, 10);
        assert_eq!(header.num_buckets as u64, stats.num_buckets);
        assert_eq!(
            buffer.len(),
            FileHeader::SIZE + 2 * header.num_buckets as usize + 10 * 8
        );
    }

    #[test]
    fn test_stats() {
        let mut builder =
            StaticPerfectHashMapBuilder::<u64, u64>::new().with_keys_per_bucket(2.0);
        for i in 0..100 {
            builder.add(i, i);
        }
        let stats = builder.build().unwrap();
        assert_eq!(stats.num_keys, 100);
        assert!(stats.num_buckets >= 50);
        assert_eq!(stats.total_size, 28 + 2 * stats.num_buckets + 100 * 16);
        assert!(stats.space_overhead > 1.0);
        assert_eq!(
            stats.hash_seed,
            crate::hasher::attempt_seed(stats.num_buckets as u32)
        );

        let mut empty = StaticPerfectHashMapBuilder::<u64, u64>::new();
        let stats = empty.build().unwrap();
        assert_eq!(stats.num_buckets, 0);
        assert_eq!(stats.total_size, 28);
        assert_eq!(stats.space_overhead, 0.0);
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.sphm");
        let mut builder = StaticPerfectHashMapBuilder::<[u8; 4], u16>::new()
            .with_writer_buffer_size(64);
        for i in 0..500u32 {
            builder.add(i.to_be_bytes(), i as u16);
        }
        builder.build().unwrap();
        let written = builder.save_to_file(&path).unwrap();
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(written, on_disk.len() as u64);
        assert_eq!(on_disk, builder.to_bytes().unwrap());
    }
}
