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

use crate::array::CounterArray;
use crate::bloom::FOOTER_BYTES;
use crate::bloom::optimal_params;
use crate::codec;
use crate::codec::WireBytes;
use crate::codec::WireSlice;
use crate::error::Error;
use crate::hash::Fnv1a;
use crate::hash::KeyHasher;
use crate::hash::hash_identity;

/// A Bloom filter whose cells are 32-bit counters, so keys can be removed.
///
/// Each position holds how many times it has been incremented; `remove`
/// decrements the key's positions, and `check` reports the minimum counter,
/// an upper bound on how many times the key was added. Counters saturate at
/// `u32::MAX` on the way up and 0 on the way down.
///
/// # Examples
///
/// ```
/// # use probkit::bloom::CountingBloomFilter;
/// let mut filter = CountingBloomFilter::new(100, 0.01).unwrap();
/// filter.add("apple");
/// filter.add("apple");
/// assert_eq!(filter.check("apple"), 2);
///
/// filter.remove("apple");
/// assert_eq!(filter.check("apple"), 1);
/// ```
#[derive(Debug, Clone)]
pub struct CountingBloomFilter {
    est_elements: u64,
    false_positive_rate: f32,
    number_hashes: u32,
    number_bits: u64,
    elements_added: u64,
    counts: CounterArray,
    hasher: Arc<dyn KeyHasher>,
}

impl CountingBloomFilter {
    /// Creates a filter sized for `est_elements` keys at the target false
    /// positive rate, using the default FNV-1a hash family.
    pub fn new(est_elements: u64, false_positive_rate: f32) -> Result<Self, Error> {
        Self::with_hasher(est_elements, false_positive_rate, Arc::new(Fnv1a))
    }

    /// Creates a filter with a caller-provided hash family.
    pub fn with_hasher(
        est_elements: u64,
        false_positive_rate: f32,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        let (number_bits, number_hashes) = optimal_params(est_elements, false_positive_rate)?;
        Ok(Self {
            est_elements,
            false_positive_rate,
            number_hashes,
            number_bits,
            elements_added: 0,
            counts: CounterArray::new(number_bits),
            hasher,
        })
    }

    /// Returns the hash vector this filter derives for `key`.
    pub fn hashes<K: AsRef<[u8]>>(&self, key: K) -> Vec<u64> {
        self.hasher
            .hash_many(key.as_ref(), self.number_hashes as usize)
    }

    /// Adds `key`, returning the minimum post-increment counter across its
    /// positions.
    pub fn add<K: AsRef<[u8]>>(&mut self, key: K) -> u32 {
        self.add_alt(&self.hashes(key))
    }

    /// Adds the key represented by a precomputed hash vector.
    pub fn add_alt(&mut self, hashes: &[u64]) -> u32 {
        assert!(
            hashes.len() >= self.number_hashes as usize,
            "hash vector shorter than number_hashes"
        );
        let mut minimum = u32::MAX;
        for &hash in &hashes[..self.number_hashes as usize] {
            let value = self.counts.increment(hash % self.number_bits);
            minimum = minimum.min(value);
        }
        self.elements_added = self.elements_added.saturating_add(1);
        minimum
    }

    /// Removes one occurrence of `key`, returning the minimum post-decrement
    /// counter across its positions.
    ///
    /// Counters already at zero stay at zero.
    pub fn remove<K: AsRef<[u8]>>(&mut self, key: K) -> u32 {
        self.remove_alt(&self.hashes(key))
    }

    /// Removes the key represented by a precomputed hash vector.
    pub fn remove_alt(&mut self, hashes: &[u64]) -> u32 {
        assert!(
            hashes.len() >= self.number_hashes as usize,
            "hash vector shorter than number_hashes"
        );
        let mut minimum = u32::MAX;
        for &hash in &hashes[..self.number_hashes as usize] {
            let value = self.counts.decrement(hash % self.number_bits);
            minimum = minimum.min(value);
        }
        self.elements_added = self.elements_added.saturating_sub(1);
        minimum
    }

    /// Returns the minimum counter across the key's positions, an upper
    /// bound on how many times it was added. Zero means definitely absent.
    pub fn check<K: AsRef<[u8]>>(&self, key: K) -> u32 {
        self.check_alt(&self.hashes(key))
    }

    /// Checks the key represented by a precomputed hash vector.
    pub fn check_alt(&self, hashes: &[u64]) -> u32 {
        assert!(
            hashes.len() >= self.number_hashes as usize,
            "hash vector shorter than number_hashes"
        );
        hashes[..self.number_hashes as usize]
            .iter()
            .map(|&hash| self.counts.get(hash % self.number_bits))
            .min()
            .unwrap_or(0)
    }

    /// Resets the filter to its initial empty state.
    pub fn clear(&mut self) {
        self.counts.clear();
        self.elements_added = 0;
    }

    /// Returns a new filter with cell-wise saturating sums of the two.
    pub fn union(&self, other: &CountingBloomFilter) -> Result<CountingBloomFilter, Error> {
        self.ensure_compatible(other)?;
        let mut result = self.clone();
        result.counts = self.counts.saturating_add(&other.counts);
        result.elements_added = self
            .elements_added
            .saturating_add(other.elements_added)
            .min(self.est_elements);
        Ok(result)
    }

    /// Returns a new filter with the cell-wise minimum of the two.
    pub fn intersection(&self, other: &CountingBloomFilter) -> Result<CountingBloomFilter, Error> {
        self.ensure_compatible(other)?;
        let mut result = self.clone();
        result.counts = self.counts.min(&other.counts);
        result.elements_added = self.elements_added.min(other.elements_added);
        Ok(result)
    }

    /// Estimates the number of distinct keys added, applying the Bloom
    /// estimator to the count of nonzero cells.
    pub fn estimate_elements(&self) -> u64 {
        let set_cells = self.counts.nonzero_count();
        if set_cells >= self.number_bits {
            return self.elements_added;
        }
        let m = self.number_bits as f64;
        let k = f64::from(self.number_hashes);
        (-(m / k) * (1.0 - set_cells as f64 / m).ln()) as u64
    }

    /// Calculates the false positive rate implied by the current insert
    /// count.
    pub fn current_false_positive_rate(&self) -> f64 {
        let m = self.number_bits as f64;
        let k = f64::from(self.number_hashes);
        let n = self.elements_added as f64;
        (1.0 - (1.0 - 1.0 / m).powf(k * n)).powf(k)
    }

    /// The estimated element capacity the filter was sized for.
    pub fn est_elements(&self) -> u64 {
        self.est_elements
    }

    /// The target false positive rate.
    pub fn false_positive_rate(&self) -> f32 {
        self.false_positive_rate
    }

    /// The number of hash functions (`k`).
    pub fn number_hashes(&self) -> u32 {
        self.number_hashes
    }

    /// The number of counters (`m`).
    pub fn number_bits(&self) -> u64 {
        self.number_bits
    }

    /// The number of keys currently accounted for.
    pub fn elements_added(&self) -> u64 {
        self.elements_added
    }

    /// The length of the serialized rendition in bytes.
    pub fn export_size(&self) -> usize {
        self.counts.len() as usize * 4 + FOOTER_BYTES
    }

    fn ensure_compatible(&self, other: &CountingBloomFilter) -> Result<(), Error> {
        let compatible = self.number_bits == other.number_bits
            && self.number_hashes == other.number_hashes
            && hash_identity(self.hasher.as_ref(), self.number_hashes)
                == hash_identity(other.hasher.as_ref(), other.number_hashes);
        if !compatible {
            return Err(Error::initialization(
                "counting Bloom filters must share size, hash count, and hash family",
            ));
        }
        Ok(())
    }

    /// Serializes the filter: counter array as `m` little-endian u32 cells,
    /// then the standard 20-byte footer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = WireBytes::with_capacity(self.export_size());
        bytes.write(&self.counts.to_bytes());
        bytes.write_u64_le(self.est_elements);
        bytes.write_f32_le(self.false_positive_rate);
        bytes.write_u64_le(self.elements_added);
        bytes.into_bytes()
    }

    /// Writes the serialized filter to `path`.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        std::fs::write(path.as_ref(), self.to_bytes())
            .map_err(|err| Error::io("export", err).with_context("path", path.as_ref().display()))
    }

    /// Returns the serialized filter as uppercase hex, no separators.
    pub fn export_hex(&self) -> String {
        codec::to_hex(&self.to_bytes())
    }

    /// Deserializes a filter using the default hash family.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_bytes_with_hasher(bytes, Arc::new(Fnv1a))
    }

    /// Deserializes a filter with a caller-provided hash family.
    pub fn from_bytes_with_hasher(bytes: &[u8], hasher: Arc<dyn KeyHasher>) -> Result<Self, Error> {
        if bytes.len() < FOOTER_BYTES {
            return Err(Error::insufficient_data("counting bloom footer"));
        }
        let (array_bytes, footer) = bytes.split_at(bytes.len() - FOOTER_BYTES);
        let mut cursor = WireSlice::new(footer);
        let est_elements = cursor
            .read_u64_le()
            .map_err(|_| Error::insufficient_data("est_elements"))?;
        let false_positive_rate = cursor
            .read_f32_le()
            .map_err(|_| Error::insufficient_data("fpr"))?;
        let elements_added = cursor
            .read_u64_le()
            .map_err(|_| Error::insufficient_data("elements_added"))?;

        let (number_bits, number_hashes) = optimal_params(est_elements, false_positive_rate)?;
        let counts = CounterArray::from_bytes(array_bytes, number_bits)?;

        Ok(Self {
            est_elements,
            false_positive_rate,
            number_hashes,
            number_bits,
            elements_added,
            counts,
            hasher,
        })
    }

    /// Loads a filter from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_path_with_hasher(path, Arc::new(Fnv1a))
    }

    /// Loads a filter from a file with a caller-provided hash family.
    pub fn from_path_with_hasher(
        path: impl AsRef<Path>,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|err| Error::io("read", err).with_context("path", path.as_ref().display()))?;
        Self::from_bytes_with_hasher(&bytes, hasher)
    }

    /// Loads a filter from its hex rendition.
    pub fn from_hex(hex_string: &str) -> Result<Self, Error> {
        Self::from_bytes(&codec::from_hex(hex_string)?)
    }
}

impl PartialEq for CountingBloomFilter {
    fn eq(&self, other: &Self) -> bool {
        self.est_elements == other.est_elements
            && self.false_positive_rate.to_bits() == other.false_positive_rate.to_bits()
            && self.elements_added == other.elements_added
            && self.counts == other.counts
            && hash_identity(self.hasher.as_ref(), self.number_hashes)
                == hash_identity(other.hasher.as_ref(), other.number_hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove_cycle() {
        let mut filter = CountingBloomFilter::new(100, 0.01).unwrap();
        assert_eq!(filter.add("apple"), 1);
        assert_eq!(filter.add("apple"), 2);
        assert_eq!(filter.remove("apple"), 1);
        assert_eq!(filter.remove("apple"), 0);
        assert_eq!(filter.check("apple"), 0);
        assert_eq!(filter.elements_added(), 0);
    }

    #[test]
    fn test_remove_missing_stays_zero() {
        let mut filter = CountingBloomFilter::new(100, 0.01).unwrap();
        assert_eq!(filter.remove("ghost"), 0);
        assert_eq!(filter.check("ghost"), 0);
    }

    #[test]
    fn test_check_reports_minimum() {
        let mut filter = CountingBloomFilter::new(100, 0.01).unwrap();
        for _ in 0..5 {
            filter.add("apple");
        }
        filter.add("banana");
        assert_eq!(filter.check("apple"), 5);
        assert_eq!(filter.check("banana"), 1);
        assert_eq!(filter.check("cherry"), 0);
    }

    #[test]
    fn test_union_and_intersection() {
        let mut f1 = CountingBloomFilter::new(100, 0.01).unwrap();
        let mut f2 = CountingBloomFilter::new(100, 0.01).unwrap();
        f1.add("both");
        f1.add("left");
        f2.add("both");
        f2.add("both");

        let merged = f1.union(&f2).unwrap();
        assert_eq!(merged.check("both"), 3);
        assert_eq!(merged.check("left"), 1);

        let common = f1.intersection(&f2).unwrap();
        assert_eq!(common.check("both"), 1);
        assert_eq!(common.check("left"), 0);
    }

    #[test]
    fn test_incompatible_operands() {
        let f1 = CountingBloomFilter::new(100, 0.01).unwrap();
        let f2 = CountingBloomFilter::new(10, 0.01).unwrap();
        assert!(f1.union(&f2).is_err());
    }

    #[test]
    fn test_estimate_elements() {
        let mut filter = CountingBloomFilter::new(100, 0.01).unwrap();
        for idx in 0..60 {
            filter.add(format!("key-{idx}"));
        }
        let estimate = filter.estimate_elements();
        assert!((54..=66).contains(&estimate), "estimate {estimate}");
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut filter = CountingBloomFilter::new(50, 0.05).unwrap();
        filter.add("apple");
        filter.add("apple");
        filter.add("banana");
        let restored = CountingBloomFilter::from_bytes(&filter.to_bytes()).unwrap();
        assert_eq!(filter, restored);
        assert_eq!(restored.check("apple"), 2);
    }

    #[test]
    fn test_hex_round_trip() {
        let mut filter = CountingBloomFilter::new(20, 0.05).unwrap();
        filter.add("apple");
        let restored = CountingBloomFilter::from_hex(&filter.export_hex()).unwrap();
        assert_eq!(filter, restored);
    }

    #[test]
    fn test_length_mismatch() {
        let filter = CountingBloomFilter::new(50, 0.05).unwrap();
        let mut bytes = filter.to_bytes();
        bytes.drain(0..4);
        assert!(CountingBloomFilter::from_bytes(&bytes).is_err());
    }
}
