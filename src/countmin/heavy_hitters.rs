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

/// A Count-Min sketch that tracks the top-K keys seen so far.
///
/// Alongside the sketch it keeps a bounded `key -> estimate` map of at most
/// `num_hitters` entries holding the largest estimates observed. The map is
/// approximate in the same way the sketch is: an inflated estimate can pull
/// a key in, and an early key can be evicted by later heavy keys.
///
/// # Examples
///
/// ```
/// # use probkit::countmin::HeavyHitters;
/// let mut hitters = HeavyHitters::new(2, 1000, 5).unwrap();
/// for _ in 0..10 {
///     hitters.add("a");
/// }
/// for _ in 0..20 {
///     hitters.add("b");
/// }
/// let heavy = hitters.heavy_hitters();
/// assert_eq!(heavy.get(b"a".as_slice()), Some(&10));
/// assert_eq!(heavy.get(b"b".as_slice()), Some(&20));
/// ```
#[derive(Debug, Clone)]
pub struct HeavyHitters {
    sketch: CountMinSketch,
    heavy: HashMap<Vec<u8>, i32>,
    num_hitters: usize,
}

impl HeavyHitters {
    /// Creates a view tracking at most `num_hitters` keys over a
    /// `width x depth` sketch.
    pub fn new(num_hitters: usize, width: u32, depth: u32) -> Result<Self, Error> {
        Self::from_sketch(num_hitters, CountMinSketch::new(width, depth)?)
    }

    /// Creates a view with the sketch sized from accuracy targets.
    pub fn from_error(num_hitters: usize, confidence: f64, error_rate: f64) -> Result<Self, Error> {
        Self::from_sketch(num_hitters, CountMinSketch::from_error(confidence, error_rate)?)
    }

    fn from_sketch(num_hitters: usize, sketch: CountMinSketch) -> Result<Self, Error> {
        if num_hitters == 0 {
            return Err(Error::initialization("num_hitters must be greater than 0"));
        }
        Ok(Self {
            sketch,
            heavy: HashMap::new(),
            num_hitters,
        })
    }

    /// A copy of the current heavy-hitter map.
    pub fn heavy_hitters(&self) -> HashMap<Vec<u8>, i32> {
        self.heavy.clone()
    }

    /// The maximum number of keys tracked.
    pub fn number_heavy_hitters(&self) -> usize {
        self.num_hitters
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

    /// Adds `weight` occurrences of `key` and reconciles the heavy map:
    /// tracked keys are refreshed, untracked keys enter while there is room,
    /// and once full the smallest entry is evicted only by a larger
    /// estimate.
    pub fn add_with_weight<K: AsRef<[u8]>>(&mut self, key: K, weight: i32) -> i32 {
        let key = key.as_ref();
        let estimate = self.sketch.add_with_weight(key, weight);

        if let Some(tracked) = self.heavy.get_mut(key) {
            *tracked = estimate;
        } else if self.heavy.len() < self.num_hitters {
            self.heavy.insert(key.to_vec(), estimate);
        } else if let Some((smallest_key, smallest)) = self
            .heavy
            .iter()
            .min_by_key(|(_, &value)| value)
            .map(|(k, &v)| (k.clone(), v))
        {
            if estimate > smallest {
                self.heavy.remove(&smallest_key);
                self.heavy.insert(key.to_vec(), estimate);
            }
        }
        estimate
    }

    /// Returns the estimate for `key` from the sketch.
    pub fn check<K: AsRef<[u8]>>(&self, key: K) -> i32 {
        self.sketch.check(key)
    }

    /// Removal would desynchronize the heavy map from the sketch.
    pub fn remove<K: AsRef<[u8]>>(&mut self, _key: K) -> Result<i32, Error> {
        Err(Error::not_supported(
            "removing elements is not supported by heavy hitters",
        ))
    }

    /// Joining would leave the heavy map unreconstructible.
    pub fn join(&self, _other: &HeavyHitters) -> Result<HeavyHitters, Error> {
        Err(Error::not_supported("joining is not supported for heavy hitters"))
    }

    /// Resets the sketch and the heavy map.
    pub fn clear(&mut self) {
        self.sketch.clear();
        self.heavy.clear();
    }

    /// Serializes the underlying sketch; the heavy map is derived state and
    /// is not stored.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.sketch.to_bytes()
    }

    /// Writes the serialized sketch to `path`.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.sketch.export(path)
    }

    /// Deserializes a view over a stored sketch; the heavy map starts
    /// empty.
    pub fn from_bytes(bytes: &[u8], num_hitters: usize) -> Result<Self, Error> {
        Self::from_sketch(num_hitters, CountMinSketch::from_bytes(bytes)?)
    }

    /// Deserializes with a caller-provided hash family.
    pub fn from_bytes_with_hasher(
        bytes: &[u8],
        num_hitters: usize,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        Self::from_sketch(num_hitters, CountMinSketch::from_bytes_with_hasher(bytes, hasher)?)
    }

    /// Loads a view from a file.
    pub fn from_path(path: impl AsRef<Path>, num_hitters: usize) -> Result<Self, Error> {
        Self::from_sketch(num_hitters, CountMinSketch::from_path(path)?)
    }
}
