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

use crate::bloom::BloomFilter;
use crate::bloom::FOOTER_BYTES;
use crate::codec::WireBytes;
use crate::codec::WireSlice;
use crate::error::Error;
use crate::hash::Fnv1a;
use crate::hash::KeyHasher;

/// A Bloom filter that grows by appending sub-filters as it saturates.
///
/// Every sub-filter shares the same `(est_elements, false_positive_rate)`;
/// only the newest is written, the rest are frozen. When the active
/// sub-filter's insert count reaches the estimated capacity, a fresh one is
/// appended, so the effective false positive rate stays near the target no
/// matter how many keys arrive.
///
/// # Examples
///
/// ```
/// # use probkit::bloom::ExpandingBloomFilter;
/// let mut filter = ExpandingBloomFilter::new(10, 0.05).unwrap();
/// for idx in 0..25 {
///     filter.add(format!("key-{idx}"));
/// }
/// assert!(filter.expansions() >= 1);
/// assert!(filter.check("key-0"));
/// assert!(filter.check("key-24"));
/// ```
#[derive(Debug, Clone)]
pub struct ExpandingBloomFilter {
    blooms: Vec<BloomFilter>,
    est_elements: u64,
    false_positive_rate: f32,
    elements_added: u64,
    hasher: Arc<dyn KeyHasher>,
}

impl ExpandingBloomFilter {
    /// Creates a filter with one active sub-filter, using the default
    /// FNV-1a hash family.
    pub fn new(est_elements: u64, false_positive_rate: f32) -> Result<Self, Error> {
        Self::with_hasher(est_elements, false_positive_rate, Arc::new(Fnv1a))
    }

    /// Creates a filter with a caller-provided hash family.
    pub fn with_hasher(
        est_elements: u64,
        false_positive_rate: f32,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        let first =
            BloomFilter::with_hasher(est_elements, false_positive_rate, Arc::clone(&hasher))?;
        Ok(Self {
            blooms: vec![first],
            est_elements,
            false_positive_rate,
            elements_added: 0,
            hasher,
        })
    }

    /// The number of expansions performed so far.
    pub fn expansions(&self) -> usize {
        self.blooms.len() - 1
    }

    /// The estimated element capacity of each sub-filter.
    pub fn est_elements(&self) -> u64 {
        self.est_elements
    }

    /// The target false positive rate of each sub-filter.
    pub fn false_positive_rate(&self) -> f32 {
        self.false_positive_rate
    }

    /// The total number of `add` calls across all sub-filters.
    pub fn elements_added(&self) -> u64 {
        self.elements_added
    }

    /// Returns the hash vector the sub-filters derive for `key`.
    pub fn hashes<K: AsRef<[u8]>>(&self, key: K) -> Vec<u64> {
        self.blooms[0].hashes(key)
    }

    /// Tests whether `key` is possibly in any sub-filter.
    pub fn check<K: AsRef<[u8]>>(&self, key: K) -> bool {
        self.check_alt(&self.hashes(key))
    }

    /// Tests the key represented by a precomputed hash vector.
    pub fn check_alt(&self, hashes: &[u64]) -> bool {
        self.blooms.iter().any(|bloom| bloom.check_alt(hashes))
    }

    /// Adds `key` unless it already reads as present.
    pub fn add<K: AsRef<[u8]>>(&mut self, key: K) {
        self.add_alt(&self.hashes(key), false)
    }

    /// Adds `key` even if it already reads as present.
    pub fn add_force<K: AsRef<[u8]>>(&mut self, key: K) {
        self.add_alt(&self.hashes(key), true)
    }

    /// Adds the key represented by a precomputed hash vector; `force`
    /// bypasses the duplicate check.
    pub fn add_alt(&mut self, hashes: &[u64], force: bool) {
        self.elements_added = self.elements_added.saturating_add(1);
        if force || !self.check_alt(hashes) {
            self.grow_if_saturated();
            if let Some(active) = self.blooms.last_mut() {
                active.add_alt(hashes);
            }
        }
    }

    /// Appends a fresh active sub-filter.
    pub fn push(&mut self) {
        self.append_filter();
    }

    fn grow_if_saturated(&mut self) {
        let saturated = self
            .blooms
            .last()
            .is_some_and(|active| active.elements_added() >= self.est_elements);
        if saturated {
            self.append_filter();
        }
    }

    fn append_filter(&mut self) {
        // Parameters were already validated at construction.
        if let Ok(bloom) = BloomFilter::with_hasher(
            self.est_elements,
            self.false_positive_rate,
            Arc::clone(&self.hasher),
        ) {
            self.blooms.push(bloom);
        }
    }

    /// Serializes the filter: each sub-filter in the standard single-filter
    /// layout, concatenated oldest first, then a trailing u64 sub-filter
    /// count.
    pub fn to_bytes(&self) -> Vec<u8> {
        let per_filter = self.blooms[0].export_size();
        let mut bytes = WireBytes::with_capacity(per_filter * self.blooms.len() + 8);
        for bloom in &self.blooms {
            bytes.write(&bloom.to_bytes());
        }
        bytes.write_u64_le(self.blooms.len() as u64);
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
    ///
    /// Each sub-filter's insert counter round-trips, so a restored filter
    /// keeps expanding exactly where the exported one left off.
    pub fn from_bytes_with_hasher(bytes: &[u8], hasher: Arc<dyn KeyHasher>) -> Result<Self, Error> {
        let blooms = split_sub_filters(bytes, hasher.clone())?;
        let first = &blooms[0];
        let est_elements = first.est_elements();
        let false_positive_rate = first.false_positive_rate();
        let elements_added = blooms.iter().map(BloomFilter::elements_added).sum();
        Ok(Self {
            blooms,
            est_elements,
            false_positive_rate,
            elements_added,
            hasher,
        })
    }

    /// Loads a filter from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|err| Error::io("read", err).with_context("path", path.as_ref().display()))?;
        Self::from_bytes(&bytes)
    }

    pub(super) fn blooms(&self) -> &[BloomFilter] {
        &self.blooms
    }
}

/// Parses the concatenated sub-filter layout shared by the expanding and
/// rotating filters.
pub(super) fn split_sub_filters(
    bytes: &[u8],
    hasher: Arc<dyn KeyHasher>,
) -> Result<Vec<BloomFilter>, Error> {
    if bytes.len() < 8 {
        return Err(Error::insufficient_data("sub-filter count"));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - 8);
    let count = WireSlice::new(trailer)
        .read_u64_le()
        .map_err(|_| Error::insufficient_data("sub-filter count"))? as usize;
    if count == 0 {
        return Err(Error::persistence("sub-filter count must be at least 1"));
    }
    if body.len() % count != 0 {
        return Err(Error::persistence(
            "body length is not a multiple of the sub-filter count",
        )
        .with_context("body_len", body.len())
        .with_context("count", count));
    }

    let per_filter = body.len() / count;
    if per_filter < FOOTER_BYTES {
        return Err(Error::insufficient_data("sub-filter body"));
    }
    let mut blooms = Vec::with_capacity(count);
    for chunk in body.chunks_exact(per_filter) {
        blooms.push(BloomFilter::from_bytes_with_hasher(chunk, hasher.clone())?);
    }
    Ok(blooms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grows_on_saturation() {
        let mut filter = ExpandingBloomFilter::new(10, 0.05).unwrap();
        assert_eq!(filter.expansions(), 0);
        for idx in 0..25 {
            filter.add(format!("key-{idx}"));
        }
        assert!(filter.expansions() >= 1);
        for idx in 0..25 {
            assert!(filter.check(format!("key-{idx}")));
        }
        assert_eq!(filter.elements_added(), 25);
    }

    #[test]
    fn test_duplicate_adds_do_not_grow() {
        let mut filter = ExpandingBloomFilter::new(10, 0.05).unwrap();
        for _ in 0..50 {
            filter.add("same-key");
        }
        assert_eq!(filter.expansions(), 0);
        assert_eq!(filter.elements_added(), 50);
    }

    #[test]
    fn test_force_bypasses_duplicate_check() {
        let mut filter = ExpandingBloomFilter::new(10, 0.05).unwrap();
        for _ in 0..25 {
            filter.add_force("same-key");
        }
        assert!(filter.expansions() >= 1);
    }

    #[test]
    fn test_push() {
        let mut filter = ExpandingBloomFilter::new(10, 0.05).unwrap();
        filter.push();
        assert_eq!(filter.expansions(), 1);
    }

    #[test]
    fn test_serialize_round_trip_keeps_counters() {
        let mut filter = ExpandingBloomFilter::new(10, 0.05).unwrap();
        for idx in 0..23 {
            filter.add(format!("key-{idx}"));
        }
        let restored = ExpandingBloomFilter::from_bytes(&filter.to_bytes()).unwrap();
        assert_eq!(restored.expansions(), filter.expansions());
        // The restored total is the sum of the per-filter counters.
        let stored: u64 = filter.blooms().iter().map(BloomFilter::elements_added).sum();
        assert_eq!(restored.elements_added(), stored);
        for (a, b) in filter.blooms().iter().zip(restored.blooms()) {
            assert_eq!(a, b);
        }
        // The restored filter keeps growing where the original left off.
        let mut restored = restored;
        for idx in 100..120 {
            restored.add(format!("key-{idx}"));
        }
        assert!(restored.expansions() > filter.expansions());
    }

    #[test]
    fn test_corrupt_count_rejected() {
        let filter = ExpandingBloomFilter::new(10, 0.05).unwrap();
        let mut bytes = filter.to_bytes();
        let len = bytes.len();
        bytes[len - 8..].copy_from_slice(&3u64.to_le_bytes());
        assert!(ExpandingBloomFilter::from_bytes(&bytes).is_err());
    }
}
