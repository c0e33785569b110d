use std::io::{Error, ErrorKind, Result};

use serde::Serialize;

use crate::{FORMAT_VERSION, MAGIC_MAP, MAGIC_SET};

/// Which table variant a serialized blob holds.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Keys with associated values, magic `SPHM`.
    Map,
    /// Keys only, magic `SPHS`.
    Set,
}

impl TableKind {
    /// Magic bytes written at the start of the header.
    pub fn magic(self) -> [u8; 4] {
        match self {
            TableKind::Map => MAGIC_MAP,
            TableKind::Set => MAGIC_SET,
        }
    }

    /// Variant produced for values of `value_size` bytes: zero-sized values
    /// make a set.
    pub fn for_value_size(value_size: usize) -> Self {
        if value_size == 0 {
            TableKind::Set
        } else {
            TableKind::Map
        }
    }

    /// Resolves the variant from header magic bytes.
    pub fn from_magic(magic: [u8; 4]) -> Option<Self> {
        match magic {
            MAGIC_MAP => Some(TableKind::Map),
            MAGIC_SET => Some(TableKind::Set),
            _ => None,
        }
    }
}

/// Fixed-size header at offset zero of every serialized table.
///
/// All integers are little-endian.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// `SPHM` for maps, `SPHS` for sets.
    #[serde(serialize_with = "serialize_magic")]
    pub magic: [u8; 4],
    /// Layout version, currently [`FORMAT_VERSION`].
    pub version: u32,
    /// Number of keys, equal to the number of slots.
    pub num_keys: u32,
    /// Length of the displacement table.
    pub num_buckets: u32,
    /// Size in bytes of one key.
    pub key_size: u32,
    /// Size in bytes of one value, zero for sets.
    pub value_size: u32,
    /// `num_keys + num_buckets`, wrapping.
    pub checksum: u32,
}

fn serialize_magic<S>(magic: &[u8; 4], s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&String::from_utf8_lossy(magic))
}

impl FileHeader {
    /// Serialized size of the header in bytes.
    pub const SIZE: usize = 28;

    pub(crate) fn new(
        kind: TableKind,
        num_keys: u32,
        num_buckets: u32,
        key_size: u32,
        value_size: u32,
    ) -> Self {
        Self {
            magic: kind.magic(),
            version: FORMAT_VERSION,
            num_keys,
            num_buckets,
            key_size,
            value_size,
            checksum: num_keys.wrapping_add(num_buckets),
        }
    }

    /// Encodes the header into its on-disk representation.
    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&self.magic);
        let fields = [
            self.version,
            self.num_keys,
            self.num_buckets,
            self.key_size,
            self.value_size,
            self.checksum,
        ];
        for (chunk, field) in out[4..].chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        out
    }

    /// Decodes a header from the first [`SIZE`](Self::SIZE) bytes of `data`.
    ///
    /// Only the length is checked here; use [`validate`](Self::validate) for
    /// the semantic checks.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Buffer too short for header: {} < {}", data.len(), Self::SIZE),
            ));
        }
        let field = |i: usize| {
            let start = 4 + i * 4;
            u32::from_le_bytes([data[start], data[start + 1], data[start + 2], data[start + 3]])
        };
        Ok(Self {
            magic: [data[0], data[1], data[2], data[3]],
            version: field(0),
            num_keys: field(1),
            num_buckets: field(2),
            key_size: field(3),
            value_size: field(4),
            checksum: field(5),
        })
    }

    /// Variant named by the magic bytes, if they are recognized.
    pub fn kind(&self) -> Option<TableKind> {
        TableKind::from_magic(self.magic)
    }

    /// Checks the header against the expected variant and element sizes.
    pub fn validate(&self, kind: TableKind, key_size: usize, value_size: usize) -> Result<()> {
        if self.magic != kind.magic() {
            return Err(invalid(format!(
                "Invalid magic: {:?}, expected {:?}",
                String::from_utf8_lossy(&self.magic),
                String::from_utf8_lossy(&kind.magic())
            )));
        }
        if self.version != FORMAT_VERSION {
            return Err(invalid(format!("Unsupported version: {}", self.version)));
        }
        if self.key_size as usize != key_size {
            return Err(invalid(format!(
                "Key size mismatch: file has {}, type has {}",
                self.key_size, key_size
            )));
        }
        if self.value_size as usize != value_size {
            return Err(invalid(format!(
                "Value size mismatch: file has {}, type has {}",
                self.value_size, value_size
            )));
        }
        if self.checksum != self.num_keys.wrapping_add(self.num_buckets) {
            return Err(invalid(format!("Checksum mismatch: {}", self.checksum)));
        }
        if (self.num_keys == 0) != (self.num_buckets == 0) {
            return Err(invalid(format!(
                "Inconsistent counts: {} keys in {} buckets",
                self.num_keys, self.num_buckets
            )));
        }
        Ok(())
    }

    /// Total serialized size described by this header.
    pub fn total_size(&self) -> u64 {
        Self::SIZE as u64
            + self.num_buckets as u64 * 2
            + self.num_keys as u64 * (self.key_size as u64 + self.value_size as u64)
    }
}

fn invalid(message: String) -> Error {
    Error::new(ErrorKind::InvalidData, message)
}

/// Summary of a construction run, available after success or failure.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct BuildStats {
    /// Number of keys in the table.
    pub num_keys: u64,
    /// Number of buckets in the accepted (or last failed) attempt.
    pub num_buckets: u64,
    /// Serialized size divided by the raw size of keys and values.
    pub space_overhead: f64,
    /// Attempts made after the first one.
    pub retry_count: u32,
    /// Wall time spent in construction.
    pub build_time_us: u64,
    /// Serialized size in bytes.
    pub total_size: u64,
    /// Hash seed of the accepted (or last failed) attempt.
    pub hash_seed: u64,
}
