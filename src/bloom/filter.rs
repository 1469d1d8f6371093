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

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use crate::array::BitArray;
use crate::array::BitStore;
use crate::bloom::FOOTER_BYTES;
use crate::bloom::optimal_params;
use crate::codec;
use crate::codec::WireBytes;
use crate::codec::WireSlice;
use crate::error::Error;
use crate::hash::Fnv1a;
use crate::hash::KeyHasher;
use crate::hash::hash_identity;

/// A Bloom filter for probabilistic set membership testing.
///
/// Provides fast membership queries with:
/// - No false negatives (added keys always return `true`)
/// - Tunable false positive rate
/// - Constant space usage
///
/// # Examples
///
/// ```
/// # use probkit::bloom::BloomFilter;
/// let mut filter = BloomFilter::new(100, 0.01).unwrap();
/// filter.add("apple");
///
/// assert!(filter.check("apple")); // true - was added (probably)
/// assert!(!filter.check("grape")); // false - never added
/// ```
#[derive(Debug, Clone)]
pub struct BloomFilter {
    pub(super) est_elements: u64,
    pub(super) false_positive_rate: f32,
    pub(super) number_hashes: u32,
    pub(super) number_bits: u64,
    pub(super) elements_added: u64,
    pub(super) bits: BitArray,
    pub(super) hasher: Arc<dyn KeyHasher>,
}

impl BloomFilter {
    /// Creates a filter sized for `est_elements` keys at the target false
    /// positive rate, using the default FNV-1a hash family.
    ///
    /// # Errors
    ///
    /// Returns an `Initialization` error when `est_elements` is 0 or the
    /// rate is outside `(0.0, 1.0)`.
    pub fn new(est_elements: u64, false_positive_rate: f32) -> Result<Self, Error> {
        Self::with_hasher(est_elements, false_positive_rate, Arc::new(Fnv1a))
    }

    /// Creates a filter with a caller-provided hash family.
    ///
    /// Filters built with different hashers cannot be combined, and a filter
    /// exported under a non-default hasher must be re-imported with the same
    /// one.
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
            bits: BitArray::new(number_bits),
            hasher,
        })
    }

    /// Returns the hash vector this filter derives for `key`.
    pub fn hashes<K: AsRef<[u8]>>(&self, key: K) -> Vec<u64> {
        self.hasher
            .hash_many(key.as_ref(), self.number_hashes as usize)
    }

    /// Adds `key` to the filter; returns the updated insert count.
    ///
    /// # Examples
    ///
    /// ```
    /// # use probkit::bloom::BloomFilter;
    /// let mut filter = BloomFilter::new(10, 0.05).unwrap();
    /// assert_eq!(filter.add("google.com"), 1);
    /// assert!(filter.check("google.com"));
    /// ```
    pub fn add<K: AsRef<[u8]>>(&mut self, key: K) -> u64 {
        self.add_alt(&self.hashes(key))
    }

    /// Adds the key represented by a precomputed hash vector.
    ///
    /// `hashes` must hold at least `number_hashes` entries.
    pub fn add_alt(&mut self, hashes: &[u64]) -> u64 {
        assert!(
            hashes.len() >= self.number_hashes as usize,
            "hash vector shorter than number_hashes"
        );
        for &hash in &hashes[..self.number_hashes as usize] {
            self.bits.set_bit(hash % self.number_bits);
        }
        self.elements_added = self.elements_added.saturating_add(1);
        self.elements_added
    }

    /// Tests whether `key` is possibly in the set.
    ///
    /// Returns `false` only when the key was definitely never added.
    pub fn check<K: AsRef<[u8]>>(&self, key: K) -> bool {
        self.check_alt(&self.hashes(key))
    }

    /// Tests the key represented by a precomputed hash vector.
    pub fn check_alt(&self, hashes: &[u64]) -> bool {
        assert!(
            hashes.len() >= self.number_hashes as usize,
            "hash vector shorter than number_hashes"
        );
        hashes[..self.number_hashes as usize]
            .iter()
            .all(|&hash| self.bits.get_bit(hash % self.number_bits))
    }

    /// Resets the filter to its initial empty state.
    pub fn clear(&mut self) {
        self.bits.clear();
        self.elements_added = 0;
    }

    /// Returns a new filter recognizing keys from either operand.
    ///
    /// The operands must share `(number_bits, number_hashes)` and hash
    /// family; otherwise this is an `Initialization` error. Neither operand
    /// is mutated.
    ///
    /// # Examples
    ///
    /// ```
    /// # use probkit::bloom::BloomFilter;
    /// let mut f1 = BloomFilter::new(100, 0.01).unwrap();
    /// let mut f2 = BloomFilter::new(100, 0.01).unwrap();
    /// f1.add("a");
    /// f2.add("b");
    ///
    /// let merged = f1.union(&f2).unwrap();
    /// assert!(merged.check("a"));
    /// assert!(merged.check("b"));
    /// ```
    pub fn union(&self, other: &BloomFilter) -> Result<BloomFilter, Error> {
        self.ensure_compatible(other)?;
        let mut result = self.clone();
        result.bits = self.bits.or(&other.bits);
        result.elements_added = self
            .elements_added
            .saturating_add(other.elements_added)
            .min(self.est_elements);
        Ok(result)
    }

    /// Returns a new filter recognizing only keys present in both operands
    /// (plus false positives).
    pub fn intersection(&self, other: &BloomFilter) -> Result<BloomFilter, Error> {
        self.ensure_compatible(other)?;
        let mut result = self.clone();
        result.bits = self.bits.and(&other.bits);
        result.elements_added = self.elements_added.min(other.elements_added);
        Ok(result)
    }

    /// Computes the Jaccard similarity of the two filters' bit sets.
    ///
    /// Returns a value in `[0, 1]`; two empty filters score `1.0`.
    pub fn jaccard_index(&self, other: &BloomFilter) -> Result<f64, Error> {
        self.ensure_compatible(other)?;
        let mut count_union = 0u64;
        let mut count_intersection = 0u64;
        for (a, b) in self.bits.as_bytes().iter().zip(other.bits.as_bytes()) {
            count_union += u64::from((a | b).count_ones());
            count_intersection += u64::from((a & b).count_ones());
        }
        if count_union == 0 {
            return Ok(1.0);
        }
        Ok(count_intersection as f64 / count_union as f64)
    }

    /// Estimates the number of distinct keys added from the set bit count.
    ///
    /// Uses `-(m/k) * ln(1 - X/m)`. A fully saturated array carries no
    /// information, so the recorded insert count is returned instead.
    pub fn estimate_elements(&self) -> u64 {
        let set_bits = self.bits.popcount();
        if set_bits >= self.number_bits {
            return self.elements_added;
        }
        let m = self.number_bits as f64;
        let k = f64::from(self.number_hashes);
        let log_term = (1.0 - set_bits as f64 / m).ln();
        (-(m / k) * log_term) as u64
    }

    /// Calculates the false positive rate implied by the current insert
    /// count: `(1 - (1 - 1/m)^(k*n))^k`.
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

    /// The number of bits in the filter (`m`).
    pub fn number_bits(&self) -> u64 {
        self.number_bits
    }

    /// The number of keys added so far.
    pub fn elements_added(&self) -> u64 {
        self.elements_added
    }

    /// The length of the serialized rendition in bytes.
    pub fn export_size(&self) -> usize {
        self.bits.as_bytes().len() + FOOTER_BYTES
    }

    /// Checks whether two filters can be combined: same size, hash count,
    /// and hash family.
    pub fn is_compatible(&self, other: &BloomFilter) -> bool {
        self.number_bits == other.number_bits
            && self.number_hashes == other.number_hashes
            && hash_identity(self.hasher.as_ref(), self.number_hashes)
                == hash_identity(other.hasher.as_ref(), other.number_hashes)
    }

    fn ensure_compatible(&self, other: &BloomFilter) -> Result<(), Error> {
        if !self.is_compatible(other) {
            return Err(Error::initialization(
                "Bloom filters must share size, hash count, and hash family",
            )
            .with_context("self_bits", self.number_bits)
            .with_context("other_bits", other.number_bits));
        }
        Ok(())
    }

    /// Serializes the filter: bit array, then the 20-byte footer
    /// `est_elements (u64) | fpr (f32) | elements_added (u64)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = WireBytes::with_capacity(self.export_size());
        bytes.write(self.bits.as_bytes());
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

    /// Writes the filter to `path` as a C header: a byte-array literal plus
    /// `#define` macros for the footer fields.
    pub fn export_c_header(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let bytes = self.to_bytes();
        let mut header = String::new();
        let _ = writeln!(header, "/* BloomFilter export */");
        let _ = writeln!(header, "#include <inttypes.h>");
        let _ = writeln!(header, "#define EST_ELEMENTS {}", self.est_elements);
        let _ = writeln!(header, "#define FPR {}f", self.false_positive_rate);
        let _ = writeln!(header, "#define ELEMENTS_ADDED {}", self.elements_added);
        let _ = writeln!(header, "const unsigned char bloom[] = {{");
        for chunk in bytes.chunks(12) {
            let line = chunk
                .iter()
                .map(|byte| format!("0x{byte:02x}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(header, "  {line},");
        }
        let _ = writeln!(header, "}};");
        std::fs::write(path.as_ref(), header)
            .map_err(|err| Error::io("export", err).with_context("path", path.as_ref().display()))
    }

    /// Deserializes a filter using the default hash family.
    ///
    /// # Errors
    ///
    /// Returns a `Persistence` error when the buffer is truncated or the bit
    /// array length disagrees with the footer parameters.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_bytes_with_hasher(bytes, Arc::new(Fnv1a))
    }

    /// Deserializes a filter with a caller-provided hash family.
    pub fn from_bytes_with_hasher(bytes: &[u8], hasher: Arc<dyn KeyHasher>) -> Result<Self, Error> {
        if bytes.len() < FOOTER_BYTES {
            return Err(Error::insufficient_data("bloom footer"));
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
        let bits = BitArray::from_bytes(array_bytes, number_bits)?;

        Ok(Self {
            est_elements,
            false_positive_rate,
            number_hashes,
            number_bits,
            elements_added,
            bits,
            hasher,
        })
    }

    /// Loads a filter from a file; behaves exactly like
    /// [`from_bytes`](Self::from_bytes) over the file contents.
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

    /// Loads a filter from its hex rendition with a caller-provided hash
    /// family.
    pub fn from_hex_with_hasher(
        hex_string: &str,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        Self::from_bytes_with_hasher(&codec::from_hex(hex_string)?, hasher)
    }
}

impl PartialEq for BloomFilter {
    fn eq(&self, other: &Self) -> bool {
        self.est_elements == other.est_elements
            && self.false_positive_rate.to_bits() == other.false_positive_rate.to_bits()
            && self.elements_added == other.elements_added
            && self.bits == other.bits
            && self.is_compatible(other)
    }
}
