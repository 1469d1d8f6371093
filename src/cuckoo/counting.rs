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
use crate::cuckoo::CuckooFilterBuilder;
use crate::cuckoo::CuckooParams;
use crate::cuckoo::HEADER_BYTES;
use crate::cuckoo::MAX_NUM_BUCKETS;
use crate::cuckoo::fingerprint_from_hash;
use crate::cuckoo::index_pair;
use crate::cuckoo::other_bucket;
use crate::error::Error;
use crate::hash::Fnv1a;
use crate::hash::KeyHasher;

/// One occupied slot: a fingerprint and how many times it was added.
///
/// `count == 0` marks an empty slot, both in memory and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct CountingSlot {
    fingerprint: u32,
    count: u32,
}

impl CountingSlot {
    fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A cuckoo filter whose slots carry `(fingerprint, count)` pairs.
///
/// Adding a key already present increments its count instead of occupying
/// another slot; removals decrement and vacate the slot at zero. Evictions
/// move the whole pair, so counts survive displacement and expansion.
///
/// # Examples
///
/// ```
/// # use probkit::cuckoo::CountingCuckooFilter;
/// let mut filter = CountingCuckooFilter::new(100).unwrap();
/// filter.add("monkey").unwrap();
/// filter.add("monkey").unwrap();
/// assert_eq!(filter.check("monkey"), 2);
///
/// filter.remove("monkey");
/// assert_eq!(filter.check("monkey"), 1);
/// assert_eq!(filter.unique_elements(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct CountingCuckooFilter {
    params: CuckooParams,
    elements_added: u32,
    unique_elements: u32,
    buckets: Vec<CountingSlot>,
    hasher: Arc<dyn KeyHasher>,
    rng: StdRng,
}

impl CountingCuckooFilter {
    /// Creates a filter for roughly `capacity` fingerprints with default
    /// parameters.
    pub fn new(capacity: u64) -> Result<Self, Error> {
        CuckooFilterBuilder::with_capacity(capacity).build_counting()
    }

    pub(super) fn from_parts(
        params: CuckooParams,
        rng: StdRng,
        hasher: Arc<dyn KeyHasher>,
    ) -> Self {
        Self {
            params,
            elements_added: 0,
            unique_elements: 0,
            buckets: vec![CountingSlot::default(); params.total_slots()],
            hasher,
            rng,
        }
    }

    /// The number of buckets (always a power of two).
    pub fn num_buckets(&self) -> u32 {
        self.params.num_buckets
    }

    /// The number of slots per bucket.
    pub fn bucket_size(&self) -> u32 {
        self.params.bucket_size
    }

    /// The stored fingerprint width in bytes.
    pub fn fingerprint_size(&self) -> u32 {
        self.params.fingerprint_size
    }

    /// Total insertions, counting duplicates.
    pub fn elements_added(&self) -> u32 {
        self.elements_added
    }

    /// The number of distinct fingerprints stored.
    pub fn unique_elements(&self) -> u32 {
        self.unique_elements
    }

    /// The fraction of slots in use.
    pub fn load_factor(&self) -> f64 {
        f64::from(self.unique_elements) / self.params.total_slots() as f64
    }

    /// Adds `key`, incrementing its count if its fingerprint is already
    /// resident.
    pub fn add<K: AsRef<[u8]>>(&mut self, key: K) -> Result<(), Error> {
        let fingerprint = self.fingerprint_of(key.as_ref());
        let (i1, i2) = index_pair(
            fingerprint,
            self.params.fingerprint_size,
            self.params.num_buckets,
        );
        if let Some(idx) = self
            .slot_of(i1, fingerprint)
            .or_else(|| self.slot_of(i2, fingerprint))
        {
            self.buckets[idx].count = self.buckets[idx].count.saturating_add(1);
            self.elements_added = self.elements_added.saturating_add(1);
            return Ok(());
        }

        let slot = CountingSlot {
            fingerprint,
            count: 1,
        };
        if self.insert_slot(slot) {
            self.elements_added = self.elements_added.saturating_add(1);
            self.unique_elements += 1;
            return Ok(());
        }
        if !self.params.auto_expand {
            return Err(Error::cuckoo_full(
                "the counting cuckoo filter is currently full",
            ));
        }
        self.expand()?;
        if self.insert_slot(slot) {
            self.elements_added = self.elements_added.saturating_add(1);
            self.unique_elements += 1;
            Ok(())
        } else {
            Err(Error::cuckoo_full(
                "the counting cuckoo filter is currently full",
            ))
        }
    }

    /// Returns how many times `key`'s fingerprint has been added.
    pub fn check<K: AsRef<[u8]>>(&self, key: K) -> u32 {
        let fingerprint = self.fingerprint_of(key.as_ref());
        let (i1, i2) = index_pair(
            fingerprint,
            self.params.fingerprint_size,
            self.params.num_buckets,
        );
        self.slot_of(i1, fingerprint)
            .or_else(|| self.slot_of(i2, fingerprint))
            .map_or(0, |idx| self.buckets[idx].count)
    }

    /// Removes one occurrence of `key`, vacating the slot when the count
    /// reaches zero; returns whether anything was removed.
    pub fn remove<K: AsRef<[u8]>>(&mut self, key: K) -> bool {
        let fingerprint = self.fingerprint_of(key.as_ref());
        let (i1, i2) = index_pair(
            fingerprint,
            self.params.fingerprint_size,
            self.params.num_buckets,
        );
        let slot = self
            .slot_of(i1, fingerprint)
            .or_else(|| self.slot_of(i2, fingerprint));
        match slot {
            Some(idx) => {
                self.buckets[idx].count -= 1;
                self.elements_added -= 1;
                if self.buckets[idx].is_empty() {
                    self.buckets[idx] = CountingSlot::default();
                    self.unique_elements -= 1;
                }
                true
            }
            None => false,
        }
    }

    /// Grows the bucket array by the expansion rate and reinserts every
    /// stored pair; counts are carried with their fingerprints.
    pub fn expand(&mut self) -> Result<(), Error> {
        let grown = u64::from(self.params.num_buckets)
            * (1 + u64::from(self.params.expansion_rate));
        let new_num_buckets = grown.next_power_of_two();
        if new_num_buckets > MAX_NUM_BUCKETS {
            return Err(Error::cuckoo_full(
                "the counting cuckoo filter cannot expand further",
            ));
        }
        let new_params = CuckooParams {
            num_buckets: new_num_buckets as u32,
            ..self.params
        };

        let mut new_buckets = vec![CountingSlot::default(); new_params.total_slots()];
        for &slot in self.buckets.iter().filter(|slot| !slot.is_empty()) {
            if !raw_insert_slot(&mut new_buckets, &new_params, &mut self.rng, slot) {
                return Err(Error::cuckoo_full(
                    "the counting cuckoo filter failed to expand",
                ));
            }
        }
        self.params = new_params;
        self.buckets = new_buckets;
        Ok(())
    }

    /// Serializes the filter: the seven-field u32 header, then every slot
    /// as `fingerprint_size` fingerprint bytes followed by a u32 count.
    pub fn to_bytes(&self) -> Vec<u8> {
        let width = self.params.fingerprint_size as usize;
        let mut bytes = WireBytes::with_capacity(HEADER_BYTES + self.buckets.len() * (width + 4));
        self.params.write_header(&mut bytes, self.elements_added);
        for slot in &self.buckets {
            bytes.write(&slot.fingerprint.to_le_bytes()[..width]);
            bytes.write_u32_le(slot.count);
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
        let expected = HEADER_BYTES + params.total_slots() * (width + 4);
        if bytes.len() != expected {
            return Err(Error::size_mismatch(
                expected,
                bytes.len(),
                "counting cuckoo buckets",
            ));
        }

        let mut buckets = Vec::with_capacity(params.total_slots());
        let mut total = 0u64;
        let mut unique = 0u32;
        for _ in 0..params.total_slots() {
            let mut raw = [0u8; 4];
            cursor
                .read_exact(&mut raw[..width])
                .map_err(|_| Error::insufficient_data("slot fingerprint"))?;
            let fingerprint = u32::from_le_bytes(raw);
            let count = cursor
                .read_u32_le()
                .map_err(|_| Error::insufficient_data("slot count"))?;
            if count > 0 {
                total += u64::from(count);
                unique += 1;
            }
            buckets.push(CountingSlot { fingerprint, count });
        }
        if total != u64::from(num_elements) {
            return Err(Error::persistence(
                "declared element count disagrees with slot counts",
            )
            .with_context("declared", num_elements)
            .with_context("stored", total));
        }

        Ok(Self {
            params,
            elements_added: num_elements,
            unique_elements: unique,
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
    fn slot_of(&self, bucket: u32, fingerprint: u32) -> Option<usize> {
        let start = bucket as usize * self.params.bucket_size as usize;
        (start..start + self.params.bucket_size as usize)
            .find(|&idx| !self.buckets[idx].is_empty() && self.buckets[idx].fingerprint == fingerprint)
    }

    fn insert_slot(&mut self, slot: CountingSlot) -> bool {
        raw_insert_slot(&mut self.buckets, &self.params, &mut self.rng, slot)
    }
}

/// Pair-wise analogue of the base filter's insert: evictions swap whole
/// `(fingerprint, count)` pairs, and a failed chain is unwound in reverse.
fn raw_insert_slot(
    buckets: &mut [CountingSlot],
    params: &CuckooParams,
    rng: &mut StdRng,
    slot: CountingSlot,
) -> bool {
    let bucket_size = params.bucket_size as usize;
    let empty_slot = |buckets: &[CountingSlot], bucket: u32| -> Option<usize> {
        let start = bucket as usize * bucket_size;
        (start..start + bucket_size).find(|&idx| buckets[idx].is_empty())
    };

    let (i1, i2) = index_pair(slot.fingerprint, params.fingerprint_size, params.num_buckets);
    for bucket in [i1, i2] {
        if let Some(idx) = empty_slot(buckets, bucket) {
            buckets[idx] = slot;
            return true;
        }
    }

    let mut bucket = if rng.gen_bool(0.5) { i1 } else { i2 };
    let mut in_hand = slot;
    let mut chain: Vec<(usize, CountingSlot)> = Vec::with_capacity(params.max_swaps as usize);
    for _ in 0..params.max_swaps {
        let pick = rng.gen_range(0..bucket_size);
        let idx = bucket as usize * bucket_size + pick;
        let displaced = buckets[idx];
        buckets[idx] = in_hand;
        chain.push((idx, displaced));
        in_hand = displaced;

        bucket = other_bucket(
            bucket,
            in_hand.fingerprint,
            params.fingerprint_size,
            params.num_buckets,
        );
        if let Some(idx) = empty_slot(buckets, bucket) {
            buckets[idx] = in_hand;
            return true;
        }
    }

    for &(idx, displaced) in chain.iter().rev() {
        buckets[idx] = displaced;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_counting_add_and_remove() {
        let mut filter = CountingCuckooFilter::new(100).unwrap();
        filter.add("monkey").unwrap();
        filter.add("monkey").unwrap();
        filter.add("monkey").unwrap();
        assert_eq!(filter.check("monkey"), 3);
        assert_eq!(filter.elements_added(), 3);
        assert_eq!(filter.unique_elements(), 1);

        assert!(filter.remove("monkey"));
        assert_eq!(filter.check("monkey"), 2);
        assert_eq!(filter.unique_elements(), 1);

        assert!(filter.remove("monkey"));
        assert!(filter.remove("monkey"));
        assert_eq!(filter.check("monkey"), 0);
        assert_eq!(filter.unique_elements(), 0);
        assert!(!filter.remove("monkey"));
    }

    #[test]
    fn test_duplicates_use_one_slot() {
        let mut filter = CountingCuckooFilter::new(100).unwrap();
        for _ in 0..50 {
            filter.add("monkey").unwrap();
        }
        assert_eq!(filter.unique_elements(), 1);
        assert_eq!(filter.elements_added(), 50);
        assert_eq!(filter.check("monkey"), 50);
    }

    #[test]
    fn test_expand_carries_counts() {
        let mut filter = CuckooFilterBuilder::with_capacity(64)
            .seed(13)
            .build_counting()
            .unwrap();
        for idx in 0..30 {
            let key = format!("key-{idx}");
            filter.add(&key).unwrap();
            filter.add(&key).unwrap();
        }
        filter.expand().unwrap();
        for idx in 0..30 {
            assert_eq!(filter.check(format!("key-{idx}")), 2);
        }
        assert_eq!(filter.elements_added(), 60);
        assert_eq!(filter.unique_elements(), 30);
    }

    #[test]
    fn test_full_filter_errors() {
        let mut filter = CuckooFilterBuilder::with_capacity(8)
            .bucket_size(2)
            .max_swaps(5)
            .auto_expand(false)
            .seed(23)
            .build_counting()
            .unwrap();
        let mut failed = false;
        for idx in 0..32 {
            if let Err(err) = filter.add(format!("key-{idx}")) {
                assert_eq!(err.kind(), ErrorKind::CuckooFilterFull);
                failed = true;
                break;
            }
        }
        assert!(failed, "filter never filled");
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut filter = CuckooFilterBuilder::with_capacity(64)
            .fingerprint_size(2)
            .seed(29)
            .build_counting()
            .unwrap();
        for idx in 0..20 {
            let key = format!("key-{idx}");
            filter.add(&key).unwrap();
            if idx % 2 == 0 {
                filter.add(&key).unwrap();
            }
        }
        let bytes = filter.to_bytes();
        assert_eq!(bytes.len(), 28 + 16 * 4 * (2 + 4));
        let restored = CountingCuckooFilter::from_bytes(&bytes).unwrap();
        assert_eq!(restored.elements_added(), filter.elements_added());
        assert_eq!(restored.unique_elements(), filter.unique_elements());
        assert_eq!(restored.check("key-0"), 2);
        assert_eq!(restored.check("key-1"), 1);
        assert_eq!(restored.to_bytes(), bytes);
    }

    #[test]
    fn test_corrupt_count_rejected() {
        let mut filter = CountingCuckooFilter::new(16).unwrap();
        filter.add("monkey").unwrap();
        let mut bytes = filter.to_bytes();
        bytes[24..28].copy_from_slice(&41u32.to_le_bytes());
        assert!(CountingCuckooFilter::from_bytes(&bytes).is_err());
    }
}
