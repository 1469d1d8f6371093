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

use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use byteorder::ReadBytesExt;
use byteorder::LE;

use crate::error::Error;
use crate::hash::Fnv1a;
use crate::hash::KeyHasher;
use crate::hash::hash_identity;

const HEADER_BYTES: usize = 16;

/// How a query aggregates a key's `depth` cells into one estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryPolicy {
    /// Minimum cell; a monotone overestimate of the true count.
    #[default]
    Min,
    /// Truncated mean of the cells; lower bias, can undercount.
    Mean,
    /// Median of the cells after subtracting each cell's estimated
    /// collision noise `(n - cell) / (width - 1)`.
    MeanMin,
}

impl QueryPolicy {
    /// The tag accepted by [`FromStr`] and reported here.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryPolicy::Min => "min",
            QueryPolicy::Mean => "mean",
            QueryPolicy::MeanMin => "mean-min",
        }
    }
}

impl FromStr for QueryPolicy {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Error> {
        match tag {
            "min" => Ok(QueryPolicy::Min),
            "mean" => Ok(QueryPolicy::Mean),
            "mean-min" => Ok(QueryPolicy::MeanMin),
            other => Err(Error::policy(format!("unrecognized query policy: {other}"))),
        }
    }
}

/// Count-Min sketch for estimating keyed frequencies.
///
/// A `depth x width` matrix of 32-bit counters; each key touches one cell
/// per row, chosen by that row's hash. Estimates are aggregated per the
/// configured [`QueryPolicy`].
///
/// # Examples
///
/// ```
/// # use probkit::countmin::CountMinSketch;
/// let mut sketch = CountMinSketch::new(1000, 5).unwrap();
/// sketch.add("hello");
/// sketch.add("hello");
/// assert_eq!(sketch.check("hello"), 2);
/// assert_eq!(sketch.check("missing"), 0);
/// ```
#[derive(Debug, Clone)]
pub struct CountMinSketch {
    width: u32,
    depth: u32,
    confidence: f64,
    error_rate: f64,
    elements_added: i64,
    policy: QueryPolicy,
    counts: Vec<i32>,
    hasher: Arc<dyn KeyHasher>,
}

impl CountMinSketch {
    /// Creates a sketch with the given matrix shape and the default `Min`
    /// policy.
    ///
    /// # Errors
    ///
    /// Returns an `Initialization` error when either dimension is 0.
    pub fn new(width: u32, depth: u32) -> Result<Self, Error> {
        Self::with_hasher(width, depth, QueryPolicy::Min, Arc::new(Fnv1a))
    }

    /// Creates a sketch with an explicit query policy.
    pub fn with_policy(width: u32, depth: u32, policy: QueryPolicy) -> Result<Self, Error> {
        Self::with_hasher(width, depth, policy, Arc::new(Fnv1a))
    }

    /// Creates a sketch sized from accuracy targets:
    /// `width = ceil(e / error_rate)`, `depth = ceil(ln(1/(1-confidence)))`.
    pub fn from_error(confidence: f64, error_rate: f64) -> Result<Self, Error> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(Error::initialization(
                "confidence must be between 0.0 and 1.0 (exclusive)",
            ));
        }
        if error_rate <= 0.0 {
            return Err(Error::initialization("error rate must be greater than 0.0"));
        }
        let width = (std::f64::consts::E / error_rate).ceil() as u32;
        let depth = ((1.0 / (1.0 - confidence)).ln().ceil() as u32).max(1);
        Self::new(width, depth)
    }

    /// Creates a sketch with a caller-provided hash family.
    pub fn with_hasher(
        width: u32,
        depth: u32,
        policy: QueryPolicy,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        if width == 0 || depth == 0 {
            return Err(Error::initialization(
                "width and depth must be greater than 0",
            ));
        }
        let cells = (width as usize)
            .checked_mul(depth as usize)
            .ok_or_else(|| Error::initialization("width * depth overflows usize"))?;
        Ok(Self {
            width,
            depth,
            confidence: 1.0 - (-f64::from(depth)).exp(),
            error_rate: std::f64::consts::E / f64::from(width),
            elements_added: 0,
            policy,
            counts: vec![0i32; cells],
            hasher,
        })
    }

    /// The number of counters per row.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The number of rows (hash functions).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// The confidence implied by the depth.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// The relative error implied by the width.
    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    /// The signed total weight inserted so far.
    pub fn elements_added(&self) -> i64 {
        self.elements_added
    }

    /// The active query policy.
    pub fn policy(&self) -> QueryPolicy {
        self.policy
    }

    /// Switches the query policy; existing counts are reinterpreted, not
    /// rebuilt.
    pub fn set_policy(&mut self, policy: QueryPolicy) {
        self.policy = policy;
    }

    /// Returns the hash vector this sketch derives for `key`.
    pub fn hashes<K: AsRef<[u8]>>(&self, key: K) -> Vec<u64> {
        self.hasher.hash_many(key.as_ref(), self.depth as usize)
    }

    /// Adds one occurrence of `key`; returns the post-update estimate.
    pub fn add<K: AsRef<[u8]>>(&mut self, key: K) -> i32 {
        self.add_with_weight(key, 1)
    }

    /// Adds `weight` occurrences of `key`; returns the post-update estimate.
    pub fn add_with_weight<K: AsRef<[u8]>>(&mut self, key: K, weight: i32) -> i32 {
        self.add_alt(&self.hashes(key), weight)
    }

    /// Adds the key represented by a precomputed hash vector.
    ///
    /// Cells clamp to the `i32` range; the insert total saturates at the
    /// `i64` range.
    pub fn add_alt(&mut self, hashes: &[u64], weight: i32) -> i32 {
        let updated = self.update_cells(hashes, i64::from(weight));
        self.elements_added = self.elements_added.saturating_add(i64::from(weight));
        self.aggregate(&updated)
    }

    /// Removes one occurrence of `key`; returns the post-update estimate.
    pub fn remove<K: AsRef<[u8]>>(&mut self, key: K) -> i32 {
        self.remove_with_weight(key, 1)
    }

    /// Removes `weight` occurrences of `key`; returns the post-update
    /// estimate.
    pub fn remove_with_weight<K: AsRef<[u8]>>(&mut self, key: K, weight: i32) -> i32 {
        self.remove_alt(&self.hashes(key), weight)
    }

    /// Removes the key represented by a precomputed hash vector.
    pub fn remove_alt(&mut self, hashes: &[u64], weight: i32) -> i32 {
        let updated = self.update_cells(hashes, -i64::from(weight));
        self.elements_added = self.elements_added.saturating_sub(i64::from(weight));
        self.aggregate(&updated)
    }

    /// Returns the estimate for `key` under the active policy.
    pub fn check<K: AsRef<[u8]>>(&self, key: K) -> i32 {
        self.check_alt(&self.hashes(key))
    }

    /// Checks the key represented by a precomputed hash vector.
    pub fn check_alt(&self, hashes: &[u64]) -> i32 {
        assert!(
            hashes.len() >= self.depth as usize,
            "hash vector shorter than depth"
        );
        let width = self.width as usize;
        let cells: Vec<i32> = hashes[..self.depth as usize]
            .iter()
            .enumerate()
            .map(|(row, &hash)| self.counts[row * width + (hash % u64::from(self.width)) as usize])
            .collect();
        self.aggregate(&cells)
    }

    /// Resets the sketch to an empty state, keeping shape and policy.
    pub fn clear(&mut self) {
        self.counts.fill(0);
        self.elements_added = 0;
    }

    /// Returns a new sketch holding the cell-wise sum of the two.
    ///
    /// The operands must share `(width, depth)` and hash family; otherwise
    /// this is an `Initialization` error. Cells saturate at the `i32`
    /// bounds. Neither operand is mutated.
    pub fn join(&self, other: &CountMinSketch) -> Result<CountMinSketch, Error> {
        let compatible = self.width == other.width
            && self.depth == other.depth
            && hash_identity(self.hasher.as_ref(), self.depth)
                == hash_identity(other.hasher.as_ref(), other.depth);
        if !compatible {
            return Err(Error::initialization(
                "count-min sketches must share width, depth, and hash family",
            )
            .with_context("self_shape", format!("{}x{}", self.depth, self.width))
            .with_context("other_shape", format!("{}x{}", other.depth, other.width)));
        }

        let mut result = self.clone();
        for (dst, src) in result.counts.iter_mut().zip(&other.counts) {
            *dst = (i64::from(*dst) + i64::from(*src))
                .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        }
        result.elements_added = self.elements_added.saturating_add(other.elements_added);
        Ok(result)
    }

    fn update_cells(&mut self, hashes: &[u64], delta: i64) -> Vec<i32> {
        assert!(
            hashes.len() >= self.depth as usize,
            "hash vector shorter than depth"
        );
        let width = self.width as usize;
        let mut updated = Vec::with_capacity(self.depth as usize);
        for (row, &hash) in hashes[..self.depth as usize].iter().enumerate() {
            let idx = row * width + (hash % u64::from(self.width)) as usize;
            let value = (i64::from(self.counts[idx]) + delta)
                .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
            self.counts[idx] = value;
            updated.push(value);
        }
        updated
    }

    fn aggregate(&self, cells: &[i32]) -> i32 {
        match self.policy {
            QueryPolicy::Min => cells.iter().copied().min().unwrap_or(0),
            QueryPolicy::Mean => {
                let sum: i64 = cells.iter().map(|&c| i64::from(c)).sum();
                sum.div_euclid(i64::from(self.depth)) as i32
            }
            QueryPolicy::MeanMin => self.mean_min(cells),
        }
    }

    fn mean_min(&self, cells: &[i32]) -> i32 {
        if cells.iter().all(|&c| c == 0) {
            return 0;
        }
        let denominator = i64::from(self.width.max(2) - 1);
        let mut adjusted: Vec<i64> = cells
            .iter()
            .map(|&cell| {
                let noise = (self.elements_added - i64::from(cell)).div_euclid(denominator);
                i64::from(cell) - noise
            })
            .collect();
        adjusted.sort_unstable();
        let mid = adjusted.len() / 2;
        let median = if adjusted.len() % 2 == 0 {
            (adjusted[mid] + adjusted[mid - 1]).div_euclid(2)
        } else {
            adjusted[mid]
        };
        median.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Serializes the sketch: `width (u32) | depth (u32) | n (i64)` then the
    /// matrix row-major as i32 cells, all little-endian.
    ///
    /// The query policy is a view over the counts, not data, and is not
    /// stored.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_BYTES + self.counts.len() * 4);
        bytes.extend_from_slice(&self.width.to_le_bytes());
        bytes.extend_from_slice(&self.depth.to_le_bytes());
        bytes.extend_from_slice(&self.elements_added.to_le_bytes());
        for count in &self.counts {
            bytes.extend_from_slice(&count.to_le_bytes());
        }
        bytes
    }

    /// Writes the serialized sketch to `path`.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        std::fs::write(path.as_ref(), self.to_bytes())
            .map_err(|err| Error::io("export", err).with_context("path", path.as_ref().display()))
    }

    /// Deserializes a sketch using the default hash family; the policy
    /// starts as `Min`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_bytes_with_hasher(bytes, Arc::new(Fnv1a))
    }

    /// Deserializes a sketch with a caller-provided hash family.
    pub fn from_bytes_with_hasher(bytes: &[u8], hasher: Arc<dyn KeyHasher>) -> Result<Self, Error> {
        fn make_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
            move |_| Error::insufficient_data(tag)
        }

        let mut cursor = Cursor::new(bytes);
        let width = cursor.read_u32::<LE>().map_err(make_error("width"))?;
        let depth = cursor.read_u32::<LE>().map_err(make_error("depth"))?;
        let elements_added = cursor.read_i64::<LE>().map_err(make_error("n_inserts"))?;

        let mut sketch = Self::with_hasher(width, depth, QueryPolicy::Min, hasher)?;
        let expected = HEADER_BYTES + sketch.counts.len() * 4;
        if bytes.len() != expected {
            return Err(Error::size_mismatch(expected, bytes.len(), "count-min matrix"));
        }
        for count in sketch.counts.iter_mut() {
            *count = cursor.read_i32::<LE>().map_err(make_error("counts"))?;
        }
        sketch.elements_added = elements_added;
        Ok(sketch)
    }

    /// Loads a sketch from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|err| Error::io("read", err).with_context("path", path.as_ref().display()))?;
        Self::from_bytes(&bytes)
    }
}
