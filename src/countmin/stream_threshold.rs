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

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::countmin::CountMinSketch;
use crate::error::Error;
use crate::hash::KeyHasher;

/// A Count-Min sketch that tracks every key whose estimate has reached a
/// threshold.
///
/// A key enters the `tracked` map the first time an insertion pushes its
/// estimate to `threshold` or above, and leaves it when removals drop the
/// estimate back below.
///
/// # Examples
///
/// ```
/// # use probkit::countmin::StreamThreshold;
/// let mut stream = StreamThreshold::new(3, 1000, 5).unwrap();
/// stream.add("a");
/// stream.add("a");
/// assert!(stream.tracked().is_empty());
/// stream.add("a");
/// assert_eq!(stream.tracked().get(b"a".as_slice()), Some(&3));
/// ```
#[derive(Debug, Clone)]
pub struct StreamThreshold {
    sketch: CountMinSketch,
    tracked: HashMap<Vec<u8>, i32>,
    threshold: i32,
}

impl StreamThreshold {
    /// Creates a view tracking keys at or above `threshold` over a
    /// `width x depth` sketch.
    pub fn new(threshold: i32, width: u32, depth: u32) -> Result<Self, Error> {
        Self::from_sketch(threshold, CountMinSketch::new(width, depth)?)
    }

    /// Creates a view with the sketch sized from accuracy targets.
    pub fn from_error(threshold: i32, confidence: f64, error_rate: f64) -> Result<Self, Error> {
        Self::from_sketch(threshold, CountMinSketch::from_error(confidence, error_rate)?)
    }

    fn from_sketch(threshold: i32, sketch: CountMinSketch) -> Result<Self, Error> {
        if threshold <= 0 {
            return Err(Error::initialization("threshold must be greater than 0"));
        }
        Ok(Self {
            sketch,
            tracked: HashMap::new(),
            threshold,
        })
    }

    /// The estimate a key must reach to be tracked.
    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// A copy of the keys currently at or above the threshold.
    pub fn tracked(&self) -> HashMap<Vec<u8>, i32> {
        self.tracked.clone()
    }

    /// The underlying sketch.
    pub fn sketch(&self) -> &CountMinSketch {
        &self.sketch
    }

    /// The signed total weight inserted so far.
    pub fn elements_added(&self) -> i64 {
        self.sketch.elements_added()
    }

    /// Adds one occurrence of `key`; returns the post-update estimate.
    pub fn add<K: AsRef<[u8]>>(&mut self, key: K) -> i32 {
        self.add_with_weight(key, 1)
    }

    /// Adds `weight` occurrences of `key`, tracking it if the estimate
    /// reaches the threshold.
    pub fn add_with_weight<K: AsRef<[u8]>>(&mut self, key: K, weight: i32) -> i32 {
        let key = key.as_ref();
        let estimate = self.sketch.add_with_weight(key, weight);
        if estimate >= self.threshold {
            self.tracked.insert(key.to_vec(), estimate);
        }
        estimate
    }

    /// Removes one occurrence of `key`; returns the post-update estimate.
    pub fn remove<K: AsRef<[u8]>>(&mut self, key: K) -> i32 {
        self.remove_with_weight(key, 1)
    }

    /// Removes `weight` occurrences of `key`, untracking it if the estimate
    /// falls below the threshold.
    pub fn remove_with_weight<K: AsRef<[u8]>>(&mut self, key: K, weight: i32) -> i32 {
        let key = key.as_ref();
        let estimate = self.sketch.remove_with_weight(key, weight);
        if estimate < self.threshold {
            self.tracked.remove(key);
        } else {
            self.tracked.insert(key.to_vec(), estimate);
        }
        estimate
    }

    /// Returns the estimate for `key` from the sketch.
    pub fn check<K: AsRef<[u8]>>(&self, key: K) -> i32 {
        self.sketch.check(key)
    }

    /// Joining would leave the tracked map unreconstructible.
    pub fn join(&self, _other: &StreamThreshold) -> Result<StreamThreshold, Error> {
        Err(Error::not_supported(
            "joining is not supported for stream threshold",
        ))
    }

    /// Resets the sketch and the tracked map.
    pub fn clear(&mut self) {
        self.sketch.clear();
        self.tracked.clear();
    }

    /// Serializes the underlying sketch; the tracked map is derived state
    /// and is not stored.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.sketch.to_bytes()
    }

    /// Writes the serialized sketch to `path`.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.sketch.export(path)
    }

    /// Deserializes a view over a stored sketch; the tracked map starts
    /// empty.
    pub fn from_bytes(bytes: &[u8], threshold: i32) -> Result<Self, Error> {
        Self::from_sketch(threshold, CountMinSketch::from_bytes(bytes)?)
    }

    /// Deserializes with a caller-provided hash family.
    pub fn from_bytes_with_hasher(
        bytes: &[u8],
        threshold: i32,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        Self::from_sketch(threshold, CountMinSketch::from_bytes_with_hasher(bytes, hasher)?)
    }

    /// Loads a view from a file.
    pub fn from_path(path: impl AsRef<Path>, threshold: i32) -> Result<Self, Error> {
        Self::from_sketch(threshold, CountMinSketch::from_path(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_tracking_at_threshold() {
        let mut stream = StreamThreshold::new(3, 1000, 5).unwrap();
        stream.add("a");
        stream.add("a");
        assert!(stream.tracked().is_empty());
        stream.add("a");
        assert_eq!(stream.tracked().get(b"a".as_slice()), Some(&3));
        stream.add("a");
        assert_eq!(stream.tracked().get(b"a".as_slice()), Some(&4));
    }

    #[test]
    fn test_weighted_add_jumps_over_threshold() {
        let mut stream = StreamThreshold::new(10, 1000, 5).unwrap();
        stream.add_with_weight("bulk", 25);
        assert_eq!(stream.tracked().get(b"bulk".as_slice()), Some(&25));
    }

    #[test]
    fn test_remove_untracks_below_threshold() {
        let mut stream = StreamThreshold::new(3, 1000, 5).unwrap();
        for _ in 0..4 {
            stream.add("a");
        }
        stream.remove("a");
        assert_eq!(stream.tracked().get(b"a".as_slice()), Some(&3));
        stream.remove("a");
        assert!(stream.tracked().is_empty());
        assert_eq!(stream.check("a"), 2);
    }

    #[test]
    fn test_join_not_supported() {
        let stream = StreamThreshold::new(3, 128, 4).unwrap();
        let other = StreamThreshold::new(3, 128, 4).unwrap();
        assert_eq!(
            stream.join(&other).unwrap_err().kind(),
            ErrorKind::NotSupported
        );
    }

    #[test]
    fn test_round_trip_restores_sketch() {
        let mut stream = StreamThreshold::new(3, 128, 4).unwrap();
        for _ in 0..5 {
            stream.add("a");
        }
        let restored = StreamThreshold::from_bytes(&stream.to_bytes(), 3).unwrap();
        assert_eq!(restored.check("a"), 5);
        assert!(restored.tracked().is_empty());
        assert_eq!(restored.threshold(), 3);
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(StreamThreshold::new(0, 128, 4).is_err());
    }
}
