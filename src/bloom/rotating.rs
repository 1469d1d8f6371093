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

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use crate::bloom::BloomFilter;
use crate::bloom::expanding::split_sub_filters;
use crate::codec::WireBytes;
use crate::error::Error;
use crate::hash::Fnv1a;
use crate::hash::KeyHasher;

/// A bounded ring of Bloom sub-filters that ages out the oldest.
///
/// Works like [`super::ExpandingBloomFilter`], but the ring never exceeds
/// `max_queue` sub-filters: once full, each rotation drops the oldest
/// sub-filter, and with it every key only that sub-filter remembered. Useful
/// for "seen recently" sets where stale entries should stop matching.
///
/// # Examples
///
/// ```
/// # use probkit::bloom::RotatingBloomFilter;
/// let mut filter = RotatingBloomFilter::new(100, 0.01, 3).unwrap();
/// filter.add("fresh");
/// assert!(filter.check("fresh"));
/// assert_eq!(filter.current_queue_size(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RotatingBloomFilter {
    blooms: VecDeque<BloomFilter>,
    est_elements: u64,
    false_positive_rate: f32,
    max_queue: usize,
    elements_added: u64,
    hasher: Arc<dyn KeyHasher>,
}

impl RotatingBloomFilter {
    /// Creates a ring holding at most `max_queue` sub-filters of
    /// `(est_elements, false_positive_rate)` each.
    pub fn new(
        est_elements: u64,
        false_positive_rate: f32,
        max_queue: usize,
    ) -> Result<Self, Error> {
        Self::with_hasher(est_elements, false_positive_rate, max_queue, Arc::new(Fnv1a))
    }

    /// Creates a ring with a caller-provided hash family.
    pub fn with_hasher(
        est_elements: u64,
        false_positive_rate: f32,
        max_queue: usize,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        if max_queue == 0 {
            return Err(Error::initialization("max_queue must be at least 1"));
        }
        let first =
            BloomFilter::with_hasher(est_elements, false_positive_rate, Arc::clone(&hasher))?;
        let mut blooms = VecDeque::with_capacity(max_queue);
        blooms.push_back(first);
        Ok(Self {
            blooms,
            est_elements,
            false_positive_rate,
            max_queue,
            elements_added: 0,
            hasher,
        })
    }

    /// The maximum number of sub-filters the ring may hold.
    pub fn max_queue_size(&self) -> usize {
        self.max_queue
    }

    /// The current number of sub-filters.
    pub fn current_queue_size(&self) -> usize {
        self.blooms.len()
    }

    /// The estimated element capacity of each sub-filter.
    pub fn est_elements(&self) -> u64 {
        self.est_elements
    }

    /// The target false positive rate of each sub-filter.
    pub fn false_positive_rate(&self) -> f32 {
        self.false_positive_rate
    }

    /// The total number of `add` calls, including those aged out.
    pub fn elements_added(&self) -> u64 {
        self.elements_added
    }

    /// Returns the hash vector the sub-filters derive for `key`.
    pub fn hashes<K: AsRef<[u8]>>(&self, key: K) -> Vec<u64> {
        self.blooms[0].hashes(key)
    }

    /// Tests whether `key` is possibly in any live sub-filter.
    pub fn check<K: AsRef<[u8]>>(&self, key: K) -> bool {
        self.check_alt(&self.hashes(key))
    }

    /// Tests the key represented by a precomputed hash vector.
    pub fn check_alt(&self, hashes: &[u64]) -> bool {
        self.blooms.iter().any(|bloom| bloom.check_alt(hashes))
    }

    /// Adds `key` unless it already reads as present, rotating first if the
    /// active sub-filter is saturated.
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
            self.rotate(false);
            if let Some(active) = self.blooms.back_mut() {
                active.add_alt(hashes);
            }
        }
    }

    /// Appends a fresh active sub-filter, popping the oldest if the ring is
    /// full.
    pub fn push(&mut self) {
        self.rotate(true);
    }

    /// Drops the oldest sub-filter without appending a new one.
    ///
    /// # Errors
    ///
    /// Popping the last remaining sub-filter would leave the structure
    /// unusable and is a `NotSupported` error.
    pub fn pop(&mut self) -> Result<(), Error> {
        if self.blooms.len() == 1 {
            return Err(Error::not_supported(
                "popping the only Bloom filter would leave an unusable ring",
            ));
        }
        self.blooms.pop_front();
        Ok(())
    }

    fn rotate(&mut self, force: bool) {
        let ready = self
            .blooms
            .back()
            .is_some_and(|active| active.elements_added() >= self.est_elements);
        if !force && !ready {
            return;
        }
        if self.blooms.len() >= self.max_queue {
            self.blooms.pop_front();
        }
        if let Ok(bloom) = BloomFilter::with_hasher(
            self.est_elements,
            self.false_positive_rate,
            Arc::clone(&self.hasher),
        ) {
            self.blooms.push_back(bloom);
        }
    }

    /// Serializes the ring: each sub-filter in the standard single-filter
    /// layout, oldest first, then a trailing u64 sub-filter count.
    pub fn to_bytes(&self) -> Vec<u8> {
        let per_filter = self.blooms[0].export_size();
        let mut bytes = WireBytes::with_capacity(per_filter * self.blooms.len() + 8);
        for bloom in &self.blooms {
            bytes.write(&bloom.to_bytes());
        }
        bytes.write_u64_le(self.blooms.len() as u64);
        bytes.into_bytes()
    }

    /// Writes the serialized ring to `path`.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        std::fs::write(path.as_ref(), self.to_bytes())
            .map_err(|err| Error::io("export", err).with_context("path", path.as_ref().display()))
    }

    /// Deserializes a ring using the default hash family.
    ///
    /// `max_queue` is structural and not stored in the format, so the caller
    /// supplies it; per-filter insert counters round-trip, keeping rotation
    /// behavior intact across restore.
    pub fn from_bytes(bytes: &[u8], max_queue: usize) -> Result<Self, Error> {
        Self::from_bytes_with_hasher(bytes, max_queue, Arc::new(Fnv1a))
    }

    /// Deserializes a ring with a caller-provided hash family.
    pub fn from_bytes_with_hasher(
        bytes: &[u8],
        max_queue: usize,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        if max_queue == 0 {
            return Err(Error::initialization("max_queue must be at least 1"));
        }
        let blooms = split_sub_filters(bytes, hasher.clone())?;
        if blooms.len() > max_queue {
            return Err(Error::initialization(
                "serialized ring holds more sub-filters than max_queue",
            )
            .with_context("sub_filters", blooms.len())
            .with_context("max_queue", max_queue));
        }
        let first = &blooms[0];
        let est_elements = first.est_elements();
        let false_positive_rate = first.false_positive_rate();
        let elements_added = blooms.iter().map(BloomFilter::elements_added).sum();
        Ok(Self {
            blooms: blooms.into(),
            est_elements,
            false_positive_rate,
            max_queue,
            elements_added,
            hasher,
        })
    }

    /// Loads a ring from a file.
    pub fn from_path(path: impl AsRef<Path>, max_queue: usize) -> Result<Self, Error> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|err| Error::io("read", err).with_context("path", path.as_ref().display()))?;
        Self::from_bytes(&bytes, max_queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_rotates_at_capacity() {
        let mut filter = RotatingBloomFilter::new(10, 0.05, 3).unwrap();
        for idx in 0..100 {
            filter.add_force(format!("key-{idx}"));
        }
        assert_eq!(filter.current_queue_size(), 3);
        assert_eq!(filter.elements_added(), 100);
        // The freshest keys are always present.
        assert!(filter.check("key-99"));
    }

    #[test]
    fn test_oldest_keys_age_out() {
        let mut filter = RotatingBloomFilter::new(10, 0.01, 2).unwrap();
        for idx in 0..50 {
            filter.add_force(format!("key-{idx}"));
        }
        // Keys from the first few batches have rotated away; a handful may
        // still false-positive, but the bulk must be gone.
        let stale = (0..10)
            .filter(|idx| filter.check(format!("key-{idx}")))
            .count();
        assert!(stale <= 3, "{stale} stale keys still reported");
    }

    #[test]
    fn test_push_and_pop() {
        let mut filter = RotatingBloomFilter::new(10, 0.05, 3).unwrap();
        filter.add("key");
        filter.push();
        assert_eq!(filter.current_queue_size(), 2);
        filter.pop().unwrap();
        assert_eq!(filter.current_queue_size(), 1);
        // The popped sub-filter held the key.
        assert!(!filter.check("key"));
    }

    #[test]
    fn test_pop_last_filter_fails() {
        let mut filter = RotatingBloomFilter::new(10, 0.05, 3).unwrap();
        let err = filter.pop().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_zero_queue_rejected() {
        assert!(RotatingBloomFilter::new(10, 0.05, 0).is_err());
    }

    #[test]
    fn test_round_trip_keeps_rotating() {
        let mut filter = RotatingBloomFilter::new(10, 0.01, 3).unwrap();
        for idx in 0..25 {
            filter.add_force(format!("key-{idx}"));
        }
        let restored = RotatingBloomFilter::from_bytes(&filter.to_bytes(), 3).unwrap();
        assert_eq!(restored.current_queue_size(), filter.current_queue_size());

        // Restored counters keep the rotation schedule: adding another
        // batch still rotates instead of stalling.
        let mut restored = restored;
        let before = restored.current_queue_size();
        for idx in 100..140 {
            restored.add_force(format!("key-{idx}"));
        }
        assert_eq!(restored.current_queue_size(), 3);
        assert!(before <= restored.current_queue_size());
        let stale = (0..10)
            .filter(|idx| restored.check(format!("key-{idx}")))
            .count();
        assert!(stale <= 3, "{stale} stale keys still reported");
    }

    #[test]
    fn test_ring_larger_than_max_queue_rejected() {
        let mut filter = RotatingBloomFilter::new(10, 0.05, 3).unwrap();
        for idx in 0..25 {
            filter.add_force(format!("key-{idx}"));
        }
        let err = RotatingBloomFilter::from_bytes(&filter.to_bytes(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Initialization);
    }
}
