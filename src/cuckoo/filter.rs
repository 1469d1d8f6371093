// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::codec::WireBytes;
use crate::codec::WireSlice;
use crate::cuckoo::CuckooParams;
use crate::cuckoo::HEADER_BYTES;
use crate::cuckoo::MAX_NUM_BUCKETS;
use crate::cuckoo::fingerprint_from_hash;
use crate::cuckoo::index_pair;
use crate::cuckoo::other_bucket;
use crate::error::Error;
use crate::hash::Fnv1a;
use crate::hash::KeyHasher;

/// Builder for [`CuckooFilter`] and [`super::CountingCuckooFilter`]
/// instances.
///
/// Starts from an approximate capacity and lets each structural parameter
/// be overridden before `build`.
///
/// # Examples
///
/// ```
/// # use probkit::cuckoo::CuckooFilterBuilder;
/// let filter = CuckooFilterBuilder::with_capacity(1000)
///     .bucket_size(4)
///     .max_swaps(100)
///     .auto_expand(false)
///     .seed(42)
///     .build()
///     .unwrap();
/// assert_eq!(filter.num_buckets(), 256);
/// ```
#[derive(Debug, Clone)]
pub struct CuckooFilterBuilder {
    capacity: u64,
    bucket_size: u32,
    max_swaps: u32,
    expansion_rate: u32,
    auto_expand: bool,
    fingerprint_size: u32,
    seed: Option<u64>,
    hasher: Option<Arc<dyn KeyHasher>>,
}

impl CuckooFilterBuilder {
    /// Creates a builder for roughly `capacity` fingerprints with the
    /// default structural parameters.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity,
            bucket_size: 4,
            max_swaps: 500,
            expansion_rate: 2,
            auto_expand: true,
            fingerprint_size: 4,
            seed: None,
            hasher: None,
        }
    }

    /// Sets the number of slots per bucket (1, 2, 4, or 8).
    pub fn bucket_size(mut self, bucket_size: u32) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    /// Sets the eviction-chain budget per insert.
    pub fn max_swaps(mut self, max_swaps: u32) -> Self {
        self.max_swaps = max_swaps;
        self
    }

    /// Sets the growth multiplier used by `expand`.
    pub fn expansion_rate(mut self, expansion_rate: u32) -> Self {
        self.expansion_rate = expansion_rate;
        self
    }

    /// Chooses whether a full filter expands automatically or errors.
    pub fn auto_expand(mut self, auto_expand: bool) -> Self {
        self.auto_expand = auto_expand;
        self
    }

    /// Sets the stored fingerprint width in bytes (1 to 4).
    pub fn fingerprint_size(mut self, fingerprint_size: u32) -> Self {
        self.fingerprint_size = fingerprint_size;
        self
    }

    /// Seeds the eviction RNG for reproducible tests.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Uses a caller-provided hash family instead of FNV-1a.
    pub fn hasher(mut self, hasher: Arc<dyn KeyHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Builds the filter.
    pub fn build(self) -> Result<CuckooFilter, Error> {
        let (params, rng, hasher) = self.into_parts()?;
        let buckets = vec![0u32; params.total_slots()];
        Ok(CuckooFilter {
            params,
            elements_added: 0,
            buckets,
            hasher,
            rng,
        })
    }

    /// Builds the counting variant with the same parameters.
    pub fn build_counting(self) -> Result<super::CountingCuckooFilter, Error> {
        let (params, rng, hasher) = self.into_parts()?;
        Ok(super::CountingCuckooFilter::from_parts(params, rng, hasher))
    }

    fn into_parts(self) -> Result<(CuckooParams, StdRng, Arc<dyn KeyHasher>), Error> {
        let num_buckets = CuckooParams::buckets_for_capacity(self.capacity, self.bucket_size)?;
        let params = CuckooParams {
            bucket_size: self.bucket_size,
            max_swaps: self.max_swaps,
            expansion_rate: self.expansion_rate,
            auto_expand: self.auto_expand,
            fingerprint_size: self.fingerprint_size,
            num_buckets,
        };
        params.validate()?;
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let hasher = self.hasher.unwrap_or_else(|| Arc::new(Fnv1a));
        Ok((params, rng, hasher))
    }
}

/// A cuckoo filter: approximate set membership with deletion.
///
/// Each key is reduced to a 1-4 byte fingerprint stored in one of two
/// candidate buckets. Inserts into a full pair evict residents along a
/// bounded random chain; a failed insert leaves the filter exactly as it
/// was.
///
/// # Examples
///
/// ```
/// # use probkit::cuckoo::CuckooFilter;
/// let mut filter = CuckooFilter::new(100).unwrap();
/// filter.add("monkey").unwrap();
/// filter.add("gorilla").unwrap();
///
/// assert!(filter.check("monkey"));
/// assert!(filter.remove("monkey"));
/// assert!(!filter.check("monkey"));
/// assert!(filter.check("gorilla"));
/// ```
#[derive(Debug, Clone)]
pub struct CuckooFilter {
    params: CuckooParams,
    elements_added: u32,
    buckets: Vec<u32>,
    hasher: Arc<dyn KeyHasher>,
    rng: StdRng,
}

impl CuckooFilter {
    /// Creates a filter for roughly `capacity` fingerprints with default
    /// parameters (4-slot buckets, 500 swaps, auto-expansion on).
    pub fn new(capacity: u64) -> Result<Self, Error> {
        CuckooFilterBuilder::with_capacity(capacity).build()
    }

    /// Creates a filter sized from a target false positive rate.
    ///
    /// The fingerprint width follows the classical bound
    /// `f >= log2(1/rate) + log2(2 * bucket_size)` bits, clamped to whole
    /// bytes.
    pub fn with_error_rate(capacity: u64, error_rate: f64) -> Result<Self, Error> {
        let fingerprint_size = fingerprint_size_for_rate(error_rate)?;
        CuckooFilterBuilder::with_capacity(capacity)
            .fingerprint_size(fingerprint_size)
            .build()
    }

    /// The number of buckets (always a power of two).
    pub fn num_buckets(&self) -> u32 {
        self.params.num_buckets
    }

    /// The number of slots per bucket.
    pub fn bucket_size(&self) -> u32 {
        self.params.bucket_size
    }

    /// The eviction-chain budget per insert.
    pub fn max_swaps(&self) -> u32 {
        self.params.max_swaps
    }

    /// The growth multiplier used by `expand`.
    pub fn expansion_rate(&self) -> u32 {
        self.params.expansion_rate
    }

    /// Whether a full filter expands automatically.
    pub fn auto_expand(&self) -> bool {
        self.params.auto_expand
    }

    /// The stored fingerprint width in bytes.
    pub fn fingerprint_size(&self) -> u32 {
        self.params.fingerprint_size
    }

    /// The number of fingerprints currently stored.
    pub fn elements_added(&self) -> u32 {
        self.elements_added
    }

    /// The fraction of slots in use.
    pub fn load_factor(&self) -> f64 {
        f64::from(self.elements_added) / self.params.total_slots() as f64
    }

    /// Adds `key` to the filter.
    ///
    /// Adding a key already present in a candidate bucket is a no-op. When
    /// the eviction budget runs out the displaced fingerprints are restored,
    /// then the filter either expands and retries (`auto_expand`) or
    /// reports `CuckooFilterFull`.
    pub fn add<K: AsRef<[u8]>>(&mut self, key: K) -> Result<(), Error> {
        let fingerprint = self.fingerprint_of(key.as_ref());
        let (i1, i2) = index_pair(
            fingerprint,
            self.params.fingerprint_size,
            self.params.num_buckets,
        );
        if self.bucket_slot(i1, fingerprint).is_some() || self.bucket_slot(i2, fingerprint).is_some()
        {
            return Ok(());
        }

        if self.insert_fingerprint(fingerprint) {
            self.elements_added += 1;
            return Ok(());
        }
        if !self.params.auto_expand {
            return Err(Error::cuckoo_full("the cuckoo filter is currently full"));
        }
        self.expand()?;
        if self.insert_fingerprint(fingerprint) {
            self.elements_added += 1;
            Ok(())
        } else {
            Err(Error::cuckoo_full("the cuckoo filter is currently full"))
        }
    }

    /// Tests whether `key` is possibly in the filter.
    pub fn check<K: AsRef<[u8]>>(&self, key: K) -> bool {
        let fingerprint = self.fingerprint_of(key.as_ref());
        let (i1, i2) = index_pair(
            fingerprint,
            self.params.fingerprint_size,
            self.params.num_buckets,
        );
        self.bucket_slot(i1, fingerprint).is_some() || self.bucket_slot(i2, fingerprint).is_some()
    }

    /// Removes `key` if its fingerprint is present; returns whether a slot
    /// was cleared.
    pub fn remove<K: AsRef<[u8]>>(&mut self, key: K) -> bool {
        let fingerprint = self.fingerprint_of(key.as_ref());
        let (i1, i2) = index_pair(
            fingerprint,
            self.params.fingerprint_size,
            self.params.num_buckets,
        );
        let slot = self
            .bucket_slot(i1, fingerprint)
            .or_else(|| self.bucket_slot(i2, fingerprint));
        match slot {
            Some(idx) => {
                self.buckets[idx] = 0;
                self.elements_added -= 1;
                true
            }
            None => false,
        }
    }

    /// Grows the bucket array by the expansion rate and reinserts every
    /// stored fingerprint.
    ///
    /// Keys are not rehashed; bucket indices are recomputed from the
    /// fingerprints alone. If any reinsertion fails the filter is left
    /// untouched and `CuckooFilterFull` is surfaced.
    pub fn expand(&mut self) -> Result<(), Error> {
        let grown = u64::from(self.params.num_buckets)
            * (1 + u64::from(self.params.expansion_rate));
        let new_num_buckets = grown.next_power_of_two();
        if new_num_buckets > MAX_NUM_BUCKETS {
            return Err(Error::cuckoo_full("the cuckoo filter cannot expand further"));
        }
        let new_params = CuckooParams {
            num_buckets: new_num_buckets as u32,
            ..self.params
        };

        let mut new_buckets = vec![0u32; new_params.total_slots()];
        for &fingerprint in self.buckets.iter().filter(|&&fp| fp != 0) {
            if !raw_insert(&mut new_buckets, &new_params, &mut self.rng, fingerprint) {
                return Err(Error::cuckoo_full("the cuckoo filter failed to expand"));
            }
        }
        self.params = new_params;
        self.buckets = new_buckets;
        Ok(())
    }

    /// Serializes the filter: the seven-field u32 header, then every slot
    /// as `fingerprint_size` little-endian bytes (zero bytes mark empty
    /// slots).
    pub fn to_bytes(&self) -> Vec<u8> {
        let width = self.params.fingerprint_size as usize;
        let mut bytes = WireBytes::with_capacity(HEADER_BYTES + self.buckets.len() * width);
        self.params.write_header(&mut bytes, self.elements_added);
        for fingerprint in &self.buckets {
            bytes.write(&fingerprint.to_le_bytes()[..width]);
        }
        bytes.into_bytes()
    }

    /// Writes the serialized filter to `path`.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        std::fs::write(path.as_ref(), self.to_bytes())
            .map_err(|err| Error::io("export", err).with_context("path", path.as_ref().display()))
    }

    /// Deserializes a filter using the default hash family.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_bytes_with_hasher(bytes, Arc::new(Fnv1a))
    }

    /// Deserializes a filter with a caller-provided hash family.
    pub fn from_bytes_with_hasher(bytes: &[u8], hasher: Arc<dyn KeyHasher>) -> Result<Self, Error> {
        let mut cursor = WireSlice::new(bytes);
        let (params, num_elements) = CuckooParams::read_header(&mut cursor)?;

        let width = params.fingerprint_size as usize;
        let expected = HEADER_BYTES + params.total_slots() * width;
        if bytes.len() != expected {
            return Err(Error::size_mismatch(expected, bytes.len(), "cuckoo buckets"));
        }

        let mut buckets = Vec::with_capacity(params.total_slots());
        let mut occupied = 0u32;
        for _ in 0..params.total_slots() {
            let mut slot = [0u8; 4];
            cursor
                .read_exact(&mut slot[..width])
                .map_err(|_| Error::insufficient_data("bucket slot"))?;
            let fingerprint = u32::from_le_bytes(slot);
            if fingerprint != 0 {
                occupied += 1;
            }
            buckets.push(fingerprint);
        }
        if occupied != num_elements {
            return Err(Error::persistence(
                "declared element count disagrees with occupied slots",
            )
            .with_context("declared", num_elements)
            .with_context("occupied", occupied));
        }

        Ok(Self {
            params,
            elements_added: num_elements,
            buckets,
            hasher,
            rng: StdRng::from_entropy(),
        })
    }

    /// Loads a filter from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|err| Error::io("read", err).with_context("path", path.as_ref().display()))?;
        Self::from_bytes(&bytes)
    }

    fn fingerprint_of(&self, key: &[u8]) -> u32 {
        let hash = self.hasher.hash_many(key, 1)[0];
        fingerprint_from_hash(hash, self.params.fingerprint_size)
    }

    /// Finds the slot index holding `fingerprint` in `bucket`, if any.
    fn bucket_slot(&self, bucket: u32, fingerprint: u32) -> Option<usize> {
        let start = bucket as usize * self.params.bucket_size as usize;
        (start..start + self.params.bucket_size as usize)
            .find(|&idx| self.buckets[idx] == fingerprint)
    }

    fn insert_fingerprint(&mut self, fingerprint: u32) -> bool {
        raw_insert(&mut self.buckets, &self.params, &mut self.rng, fingerprint)
    }
}

/// Places a fingerprint into the bucket array, evicting along a bounded
/// random chain if both candidates are full.
///
/// On failure every displaced fingerprint is restored in reverse, leaving
/// the array bit-identical to how it started.
fn raw_insert(
    buckets: &mut [u32],
    params: &CuckooParams,
    rng: &mut StdRng,
    fingerprint: u32,
) -> bool {
    let bucket_size = params.bucket_size as usize;
    let empty_slot = |buckets: &[u32], bucket: u32| -> Option<usize> {
        let start = bucket as usize * bucket_size;
        (start..start + bucket_size).find(|&idx| buckets[idx] == 0)
    };

    let (i1, i2) = index_pair(fingerprint, params.fingerprint_size, params.num_buckets);
    for bucket in [i1, i2] {
        if let Some(idx) = empty_slot(buckets, bucket) {
            buckets[idx] = fingerprint;
            return true;
        }
    }

    let mut bucket = if rng.gen_bool(0.5) { i1 } else { i2 };
    let mut in_hand = fingerprint;
    let mut chain: Vec<(usize, u32)> = Vec::with_capacity(params.max_swaps as usize);
    for _ in 0..params.max_swaps {
        let slot = rng.gen_range(0..bucket_size);
        let idx = bucket as usize * bucket_size + slot;
        let displaced = buckets[idx];
        buckets[idx] = in_hand;
        chain.push((idx, displaced));
        in_hand = displaced;

        bucket = other_bucket(bucket, in_hand, params.fingerprint_size, params.num_buckets);
        if let Some(idx) = empty_slot(buckets, bucket) {
            buckets[idx] = in_hand;
            return true;
        }
    }

    // Unwind the chain so a failed insert leaves no partial mutation.
    for &(idx, displaced) in chain.iter().rev() {
        buckets[idx] = displaced;
    }
    false
}

fn fingerprint_size_for_rate(error_rate: f64) -> Result<u32, Error> {
    if !(error_rate > 0.0 && error_rate < 1.0) {
        return Err(Error::initialization(
            "error rate must be between 0.0 and 1.0 (exclusive)",
        ));
    }
    // f >= log2(1/rate) + log2(2b) bits, with b fixed at 4 slots.
    let bits = (1.0 / error_rate).log2() + 3.0;
    let bytes = (bits / 8.0).ceil() as u32;
    Ok(bytes.clamp(1, 4))
}
