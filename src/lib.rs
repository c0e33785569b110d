//! Static minimal perfect hash maps and sets persisted to a compact binary layout.
//!
//! The `sphm` crate builds immutable lookup tables over a key set known in
//! advance. Every key is assigned a unique slot in `[0, N)` by a
//! bucket-and-displace construction over two seeded hash functions, so a
//! lookup is one probe plus one byte-wise key comparison. Absent keys are
//! always rejected by that comparison.
//!
//! Builders accumulate distinct keys (and values), search for the slot
//! assignment with deterministic retries, and serialize the result into a flat
//! buffer that can be written to a file or kept in memory. Runtime tables
//! validate and copy such a buffer and are then read-only.
//!
//! Keys and values must be [`bytemuck::Pod`].
//!
//! ```
//! use sphm::{StaticPerfectHashMap, StaticPerfectHashMapBuilder};
//!
//! # fn main() -> std::io::Result<()> {
//! let mut builder = StaticPerfectHashMapBuilder::<u64, u32>::new();
//! builder.add(7, 70);
//! builder.add(9, 90);
//! let stats = builder.build()?;
//! assert_eq!(stats.num_keys, 2);
//!
//! let mut buffer = Vec::new();
//! builder.save_to_memory(&mut buffer)?;
//!
//! let map = StaticPerfectHashMap::<u64, u32>::from_bytes(&buffer)?;
//! assert_eq!(map.get(&9), Some(&90));
//! assert_eq!(map.get(&8), None);
//! # Ok(())
//! # }
//! ```
//!
//! # Layout
//!
//! A 28-byte [`FileHeader`] (magic, version, key count, bucket count, key
//! size, value size, checksum; little-endian) is followed by one `u16`
//! displacement per bucket, the keys in slot order and, for maps, the values
//! in slot order.
//!
//! # Scale
//!
//! Displacements are 16 bits wide. Construction is expected to succeed within
//! the default retry budget for up to [`RELIABLE_KEY_LIMIT`] keys; beyond that
//! the success probability drops as the key count grows.

/// Magic bytes of a serialized map.
pub const MAGIC_MAP: [u8; 4] = *b"SPHM";
/// Magic bytes of a serialized set.
pub const MAGIC_SET: [u8; 4] = *b"SPHS";
/// Current layout version.
pub const FORMAT_VERSION: u32 = 1;

pub use bytemuck::Pod;

mod hasher;
pub use hasher::HashPair;

mod meta;
pub use meta::{BuildStats, FileHeader, TableKind};

mod accumulator;
pub use accumulator::KeyAccumulator;

mod construct;
pub use construct::RELIABLE_KEY_LIMIT;

mod builder;
pub use builder::{BuilderState, StaticPerfectHashMapBuilder, StaticPerfectHashSetBuilder};

mod map;
pub use map::StaticPerfectHashMap;

mod set;
pub use set::StaticPerfectHashSet;
