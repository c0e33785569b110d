use std::hash::{BuildHasher, Hasher};

use foldhash::fast::FixedState;

/// Base seed mixed into every per-attempt seed.
const SEED_BASE: u64 = 0x5350_484d_0000_0001;

/// Seed of the secondary hash is the primary seed xor this constant, rotated.
const SECONDARY_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Pair of independently seeded 64-bit hash functions over raw key bytes.
///
/// Construction and lookup must agree on the pair bit for bit, so the pair is
/// fully determined by a single `u64` seed. Both halves are `foldhash`
/// instances with distinct seeds. Serialized tables depend on the exact
/// `foldhash` output, which differs between 64-bit and 32-bit targets.
#[derive(Debug, Clone)]
pub struct HashPair {
    seed: u64,
    primary: FixedState,
    secondary: FixedState,
}

impl HashPair {
    /// Creates the pair for `seed`.
    pub fn new(seed: u64) -> Self {
        let secondary_seed = (seed ^ SECONDARY_SALT).rotate_left(29);
        Self {
            seed,
            primary: FixedState::with_seed(seed),
            secondary: FixedState::with_seed(secondary_seed),
        }
    }

    /// Creates the pair used by a table with `num_buckets` buckets.
    ///
    /// Every construction attempt uses a distinct bucket count, so the bucket
    /// count stored in the header is enough to recover the seed at load time.
    pub fn for_buckets(num_buckets: u32) -> Self {
        Self::new(attempt_seed(num_buckets))
    }

    /// Seed this pair was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Primary hash, selects the bucket.
    #[inline]
    pub fn hash1(&self, bytes: &[u8]) -> u64 {
        let mut hasher = self.primary.build_hasher();
        hasher.write(bytes);
        hasher.finish()
    }

    /// Secondary hash, scaled by the bucket displacement.
    ///
    /// Always odd. `2^64 mod n` shares only factors of two with `n`, so an
    /// odd step lets the displacement sequence reach every slot.
    #[inline]
    pub fn hash2(&self, bytes: &[u8]) -> u64 {
        let mut hasher = self.secondary.build_hasher();
        hasher.write(bytes);
        hasher.finish() | 1
    }

    /// Both hashes at once.
    #[inline]
    pub fn hash(&self, bytes: &[u8]) -> (u64, u64) {
        (self.hash1(bytes), self.hash2(bytes))
    }
}

/// Derives the seed of the attempt that used `num_buckets` buckets.
pub fn attempt_seed(num_buckets: u32) -> u64 {
    // splitmix64 finalizer
    let mut z = SEED_BASE.wrapping_add((num_buckets as u64).wrapping_mul(SECONDARY_SALT));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Bucket of a key with primary hash `h1`.
///
/// `num_buckets` must be non-zero.
#[inline]
pub fn bucket_index(h1: u64, num_buckets: u32) -> usize {
    (h1 % num_buckets as u64) as usize
}

/// Final slot of a key: `(h1 + d * h2) mod n` in wrapping 64-bit arithmetic.
///
/// `n` must be non-zero.
#[inline]
pub fn slot_index(h1: u64, h2: u64, displacement: u16, n: u32) -> usize {
    (h1.wrapping_add((displacement as u64).wrapping_mul(h2)) % n as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_pair_is_deterministic() {
        let a = HashPair::new(7);
        let b = HashPair::new(7);
        let key = 42u64.to_le_bytes();
        assert_eq!(a.hash(&key), b.hash(&key));
        assert_eq!(a.seed(), 7);

        let c = HashPair::new(8);
        assert_ne!(a.hash1(&key), c.hash1(&key));
    }

    #[test]
    fn test_hash_halves_differ() {
        let pair = HashPair::new(0);
        let same = (0u32..1000)
            .filter(|i| {
                let bytes = i.to_le_bytes();
                pair.hash1(&bytes) == pair.hash2(&bytes)
            })
            .count();
        assert_eq!(same, 0);
        assert!((0u32..1000).all(|i| pair.hash2(&i.to_le_bytes()) & 1 == 1));
    }

    #[test]
    fn test_displacements_reach_every_slot() {
        let pair = HashPair::new(11);
        for n in [1u32, 2, 64, 1024, 4096] {
            for key in 0u64..20 {
                let (h1, h2) = pair.hash(&key.to_le_bytes());
                let mut seen = vec![false; n as usize];
                for d in 0..=u16::MAX {
                    seen[slot_index(h1, h2, d, n)] = true;
                }
                assert!(seen.iter().all(|&s| s), "n = {}, key = {}", n, key);
            }
        }
    }

    #[test]
    fn test_attempt_seeds_are_distinct() {
        let seeds: std::collections::HashSet<u64> = (0u32..10_000).map(attempt_seed).collect();
        assert_eq!(seeds.len(), 10_000);
        assert_eq!(
            HashPair::for_buckets(17).seed(),
            HashPair::new(attempt_seed(17)).seed()
        );
    }

    #[test]
    #[cfg(all(target_pointer_width = "64", target_endian = "little"))]
    fn test_hash_values_are_stable() {
        assert_eq!(attempt_seed(1), 0xfb71_b0e3_9feb_cd4d);
        assert_eq!(attempt_seed(388), 0x6729_a3ad_9ca0_b0a9);

        let key = 42u64.to_le_bytes();
        assert_eq!(
            HashPair::for_buckets(1).hash(&key),
            (0x1298_2cc2_f962_0385, 0x533c_effa_c6c4_6df1)
        );
        assert_eq!(
            HashPair::for_buckets(388).hash(&key),
            (0x0c1d_1aca_41ad_35b4, 0x41d6_0115_1dd6_9e15)
        );

        let mut wide = [0u8; 16];
        wide[..8].copy_from_slice(&10001u64.to_le_bytes());
        wide[8..].copy_from_slice(&7u64.to_le_bytes());
        assert_eq!(
            HashPair::for_buckets(388).hash(&wide),
            (0x34c7_2dac_5616_3799, 0x98ad_9848_6b13_d07f)
        );
    }

    #[test]
    fn test_slot_index_in_range() {
        let pair = HashPair::new(3);
        for i in 0u64..1000 {
            let (h1, h2) = pair.hash(&i.to_le_bytes());
            for d in [0u16, 1, 255, u16::MAX] {
                assert!(slot_index(h1, h2, d, 13) < 13);
            }
            assert!(bucket_index(h1, 5) < 5);
        }
        assert_eq!(slot_index(10, 3, 0, 7), 3);
        assert_eq!(slot_index(10, 3, 2, 7), 2);
    }
}
