//! Bucket-and-displace construction of the slot assignment.
//!
//! Keys are split into buckets by their primary hash. Buckets are placed
//! largest first; for each one the displacements `0, 1, 2, ...` are tried until
//! every key of the bucket lands on a distinct free slot. An attempt that
//! exhausts the search range for any bucket is abandoned and the next attempt
//! starts over with one more bucket and therefore a new hash seed.

use std::time::Instant;

use crate::hasher::{HashPair, bucket_index, slot_index};

/// Key count above which construction is no longer expected to succeed within
/// the default retry budget.
pub const RELIABLE_KEY_LIMIT: usize = 1 << 17;

/// Parameters of a construction run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionParams {
    /// Average number of keys per bucket in the first attempt.
    pub keys_per_bucket: f64,
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Largest displacement tried per bucket.
    pub search_limit: u16,
}

impl Default for ConstructionParams {
    fn default() -> Self {
        Self {
            keys_per_bucket: 2.0,
            max_retries: 64,
            search_limit: u16::MAX,
        }
    }
}

impl ConstructionParams {
    /// Bucket count of the first attempt for `n` keys.
    pub fn initial_buckets(&self, n: usize) -> u32 {
        if n == 0 {
            return 0;
        }
        let density = if self.keys_per_bucket.is_finite() && self.keys_per_bucket >= 1.0 {
            self.keys_per_bucket
        } else {
            1.0
        };
        let buckets = (n as f64 / density).ceil();
        buckets.clamp(1.0, u32::MAX as f64) as u32
    }
}

/// Accepted slot assignment.
#[derive(Debug, Clone)]
pub struct Placement {
    pub num_buckets: u32,
    /// Displacement per bucket.
    pub displacements: Vec<u16>,
    /// `order[slot]` is the input index of the key stored at `slot`.
    pub order: Vec<usize>,
}

/// Outcome of [`construct`], successful or not.
#[derive(Debug)]
pub struct Construction {
    pub placement: Option<Placement>,
    pub retry_count: u32,
    /// Bucket count of the last attempt made.
    pub num_buckets: u32,
    /// Seed of the last attempt made.
    pub seed: u64,
    pub elapsed_us: u64,
}

/// Searches for a minimal perfect slot assignment of `keys`.
///
/// `keys` must be pairwise distinct and fewer than `u32::MAX`.
pub fn construct<'a, I>(keys: I, params: &ConstructionParams) -> Construction
where
    I: Iterator<Item = &'a [u8]> + Clone,
{
    let start = Instant::now();
    let n = keys.clone().count();

    if n == 0 {
        return Construction {
            placement: Some(Placement {
                num_buckets: 0,
                displacements: Vec::new(),
                order: Vec::new(),
            }),
            retry_count: 0,
            num_buckets: 0,
            seed: 0,
            elapsed_us: start.elapsed().as_micros() as u64,
        };
    }

    if n > RELIABLE_KEY_LIMIT {
        log::warn!(
            "{} keys exceed the reliable construction bound of {}; build may fail",
            n,
            RELIABLE_KEY_LIMIT
        );
    }

    let first_buckets = params.initial_buckets(n);
    let mut num_buckets = first_buckets;
    let mut seed = 0;
    let mut hashes = Vec::with_capacity(n);
    for attempt in 0..=params.max_retries {
        num_buckets = match first_buckets.checked_add(attempt) {
            Some(count) => count,
            None => break,
        };
        let pair = HashPair::for_buckets(num_buckets);
        seed = pair.seed();

        hashes.clear();
        hashes.extend(keys.clone().map(|key| pair.hash(key)));

        if let Some(placement) = try_place(&hashes, num_buckets, params.search_limit) {
            log::info!(
                "placed {} keys in {} buckets after {} retries",
                n,
                num_buckets,
                attempt
            );
            return Construction {
                placement: Some(placement),
                retry_count: attempt,
                num_buckets,
                seed,
                elapsed_us: start.elapsed().as_micros() as u64,
            };
        }
        log::debug!(
            "attempt {} with {} buckets (seed {:#x}) failed",
            attempt,
            num_buckets,
            seed
        );
    }

    log::warn!(
        "failed to place {} keys after {} retries",
        n,
        params.max_retries
    );
    Construction {
        placement: None,
        retry_count: num_buckets - first_buckets,
        num_buckets,
        seed,
        elapsed_us: start.elapsed().as_micros() as u64,
    }
}

/// One attempt with a fixed bucket count and hash seed.
fn try_place(
    hashes: &[(u64, u64)],
    num_buckets: u32,
    search_limit: u16,
) -> Option<Placement> {
    let n = hashes.len() as u32;

    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); num_buckets as usize];
    for (i, &(h1, _)) in hashes.iter().enumerate() {
        buckets[bucket_index(h1, num_buckets)].push(i);
    }

    let mut schedule: Vec<usize> = (0..buckets.len()).collect();
    schedule.sort_by(|&a, &b| buckets[b].len().cmp(&buckets[a].len()));

    const EMPTY: usize = usize::MAX;
    let mut order = vec![EMPTY; n as usize];
    let mut displacements = vec![0u16; num_buckets as usize];
    let mut candidate: Vec<usize> = Vec::new();

    for bucket_id in schedule {
        let bucket = &buckets[bucket_id];
        if bucket.is_empty() {
            // remaining buckets are empty as well
            break;
        }

        let mut accepted = None;
        'search: for d in 0..=search_limit {
            candidate.clear();
            for &key in bucket {
                let (h1, h2) = hashes[key];
                let slot = slot_index(h1, h2, d, n);
                if order[slot] != EMPTY || candidate.contains(&slot) {
                    continue 'search;
                }
                candidate.push(slot);
            }
            accepted = Some(d);
            break;
        }

        let d = accepted?;
        for (&key, &slot) in bucket.iter().zip(candidate.iter()) {
            order[slot] = key;
        }
        displacements[bucket_id] = d;
    }

    debug_assert!(order.iter().all(|&key| key != EMPTY));
    Some(Placement {
        num_buckets,
        displacements,
        order,
    })
}
