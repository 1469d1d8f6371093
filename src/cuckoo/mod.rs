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

//! Cuckoo filter implementations for probabilistic set membership with
//! deletion.
//!
//! A cuckoo filter stores a short fingerprint of each key in one of two
//! candidate buckets. Unlike a Bloom filter it supports `remove`, and lookups
//! touch at most two buckets. Inserting into a full pair of buckets evicts a
//! resident fingerprint to its alternate bucket, cuckoo-style, up to
//! `max_swaps` displacements; a filter near capacity either expands or
//! reports [`crate::error::ErrorKind::CuckooFilterFull`].
//!
//! The two candidate buckets are reciprocal: `i2 = i1 XOR h(fp)` over a
//! power-of-two bucket count, so either bucket plus the fingerprint recovers
//! the other. That identity is what lets eviction and expansion operate on
//! stored fingerprints without ever rehashing the original keys.
//!
//! # Usage
//!
//! ```rust
//! use probkit::cuckoo::CuckooFilter;
//!
//! let mut filter = CuckooFilter::new(100).unwrap();
//! filter.add("monkey").unwrap();
//! assert!(filter.check("monkey"));
//! assert!(filter.remove("monkey"));
//! assert!(!filter.check("monkey"));
//! ```
//!
//! [`CountingCuckooFilter`] keeps a `(fingerprint, count)` pair per slot so
//! the same key can be added many times and removed one occurrence at a
//! time.

mod counting;
mod filter;

pub use self::counting::CountingCuckooFilter;
pub use self::filter::CuckooFilter;
pub use self::filter::CuckooFilterBuilder;

use crate::codec::WireBytes;
use crate::codec::WireSlice;
use crate::error::Error;
use crate::hash::fnv_1a;

pub(crate) const HEADER_BYTES: usize = 28;
pub(crate) const MAX_NUM_BUCKETS: u64 = 1 << 31;

/// The structural parameters shared by both cuckoo variants, exactly as
/// they appear in the serialized header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CuckooParams {
    pub bucket_size: u32,
    pub max_swaps: u32,
    pub expansion_rate: u32,
    pub auto_expand: bool,
    pub fingerprint_size: u32,
    pub num_buckets: u32,
}

impl CuckooParams {
    pub fn validate(&self) -> Result<(), Error> {
        if !matches!(self.bucket_size, 1 | 2 | 4 | 8) {
            return Err(Error::initialization("bucket_size must be 1, 2, 4, or 8"));
        }
        if self.max_swaps == 0 {
            return Err(Error::initialization("max_swaps must be at least 1"));
        }
        if self.expansion_rate == 0 {
            return Err(Error::initialization("expansion_rate must be at least 1"));
        }
        if !(1..=4).contains(&self.fingerprint_size) {
            return Err(Error::initialization(
                "fingerprint_size must be between 1 and 4 bytes",
            ));
        }
        if self.num_buckets == 0 || !self.num_buckets.is_power_of_two() {
            return Err(Error::initialization(
                "num_buckets must be a nonzero power of two",
            ));
        }
        Ok(())
    }

    /// Derives the bucket count from an approximate capacity.
    pub fn buckets_for_capacity(capacity: u64, bucket_size: u32) -> Result<u32, Error> {
        if capacity == 0 {
            return Err(Error::initialization("capacity must be at least 1"));
        }
        let buckets = capacity
            .div_ceil(u64::from(bucket_size))
            .next_power_of_two();
        if buckets > MAX_NUM_BUCKETS {
            return Err(Error::initialization("capacity too large")
                .with_context("num_buckets", buckets));
        }
        Ok(buckets as u32)
    }

    pub fn write_header(&self, bytes: &mut WireBytes, num_elements: u32) {
        bytes.write_u32_le(self.bucket_size);
        bytes.write_u32_le(self.max_swaps);
        bytes.write_u32_le(self.expansion_rate);
        bytes.write_u32_le(u32::from(self.auto_expand));
        bytes.write_u32_le(self.fingerprint_size);
        bytes.write_u32_le(self.num_buckets);
        bytes.write_u32_le(num_elements);
    }

    /// Parses and validates the 28-byte header, returning the declared
    /// element count alongside the parameters.
    pub fn read_header(cursor: &mut WireSlice<'_>) -> Result<(Self, u32), Error> {
        let mut field = |tag: &'static str| {
            cursor
                .read_u32_le()
                .map_err(|_| Error::insufficient_data(tag))
        };
        let params = CuckooParams {
            bucket_size: field("bucket_size")?,
            max_swaps: field("max_swaps")?,
            expansion_rate: field("expansion_rate")?,
            auto_expand: field("auto_expand")? != 0,
            fingerprint_size: field("fingerprint_size")?,
            num_buckets: field("num_buckets")?,
        };
        let num_elements = field("num_elements")?;
        params.validate()?;
        Ok((params, num_elements))
    }

    pub fn total_slots(&self) -> usize {
        self.num_buckets as usize * self.bucket_size as usize
    }
}

/// Truncates a 64-bit hash to the fingerprint width, remapping 0 to 1
/// because 0 marks an empty slot.
pub(crate) fn fingerprint_from_hash(hash: u64, fingerprint_size: u32) -> u32 {
    let mask = if fingerprint_size >= 4 {
        u64::from(u32::MAX)
    } else {
        (1u64 << (8 * fingerprint_size)) - 1
    };
    let fingerprint = (hash & mask) as u32;
    if fingerprint == 0 {
        1
    } else {
        fingerprint
    }
}

/// The partner-offset hash: FNV-1a over the fingerprint's little-endian
/// bytes. Part of the on-disk contract, since bucket placement depends on
/// it.
pub(crate) fn partner_hash(fingerprint: u32, fingerprint_size: u32) -> u64 {
    fnv_1a(&fingerprint.to_le_bytes()[..fingerprint_size as usize])
}

/// The two candidate buckets for a fingerprint.
///
/// The first index is the fingerprint reduced over the (power-of-two)
/// bucket count, which equals the key hash reduced the same way; the second
/// is its XOR partner, so the pair is recoverable from either member.
pub(crate) fn index_pair(fingerprint: u32, fingerprint_size: u32, num_buckets: u32) -> (u32, u32) {
    let mask = u64::from(num_buckets - 1);
    let i1 = u64::from(fingerprint) & mask;
    let i2 = (i1 ^ partner_hash(fingerprint, fingerprint_size)) & mask;
    (i1 as u32, i2 as u32)
}

/// Given one candidate bucket, returns the other.
pub(crate) fn other_bucket(
    bucket: u32,
    fingerprint: u32,
    fingerprint_size: u32,
    num_buckets: u32,
) -> u32 {
    let mask = u64::from(num_buckets - 1);
    ((u64::from(bucket) ^ partner_hash(fingerprint, fingerprint_size)) & mask) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_truncation() {
        assert_eq!(fingerprint_from_hash(0xDEAD_BEEF_1234_5678, 1), 0x78);
        assert_eq!(fingerprint_from_hash(0xDEAD_BEEF_1234_5678, 2), 0x5678);
        assert_eq!(fingerprint_from_hash(0xDEAD_BEEF_1234_5678, 4), 0x1234_5678);
    }

    #[test]
    fn test_zero_fingerprint_remaps_to_one() {
        assert_eq!(fingerprint_from_hash(0xFFFF_FF00, 1), 1);
        assert_eq!(fingerprint_from_hash(0, 4), 1);
    }

    #[test]
    fn test_index_pair_is_reciprocal() {
        for fingerprint in [1u32, 0x7F, 0xAB, 0xFF] {
            let (i1, i2) = index_pair(fingerprint, 1, 64);
            assert_eq!(other_bucket(i1, fingerprint, 1, 64), i2);
            assert_eq!(other_bucket(i2, fingerprint, 1, 64), i1);
        }
    }

    #[test]
    fn test_buckets_for_capacity() {
        assert_eq!(CuckooParams::buckets_for_capacity(16, 2).unwrap(), 8);
        assert_eq!(CuckooParams::buckets_for_capacity(100, 4).unwrap(), 32);
        assert_eq!(CuckooParams::buckets_for_capacity(1, 4).unwrap(), 1);
        assert!(CuckooParams::buckets_for_capacity(0, 4).is_err());
    }

    #[test]
    fn test_validate() {
        let params = CuckooParams {
            bucket_size: 4,
            max_swaps: 500,
            expansion_rate: 2,
            auto_expand: true,
            fingerprint_size: 4,
            num_buckets: 64,
        };
        assert!(params.validate().is_ok());
        assert!(CuckooParams { bucket_size: 3, ..params }.validate().is_err());
        assert!(CuckooParams { fingerprint_size: 5, ..params }.validate().is_err());
        assert!(CuckooParams { num_buckets: 48, ..params }.validate().is_err());
        assert!(CuckooParams { max_swaps: 0, ..params }.validate().is_err());
    }
}
