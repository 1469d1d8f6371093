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

//! Bloom filter implementations for probabilistic set membership testing.
//!
//! A Bloom filter is a space-efficient probabilistic data structure used to
//! test whether an element is a member of a set. False positive matches are
//! possible, but false negatives are not: a query returns either "possibly in
//! set" or "definitely not in set".
//!
//! # Properties
//!
//! - **No false negatives**: if a key was added, `check()` always returns
//!   `true`
//! - **Possible false positives**: `check()` may return `true` for keys never
//!   added
//! - **Derived sizing**: the bit count `m` and hash count `k` come from the
//!   estimated element count and target false positive rate via the classical
//!   formulas `m = ceil(-n ln p / (ln 2)^2)` and `k = ceil((m/n) ln 2)`
//!
//! # Variants
//!
//! | type | array cell | extra capability |
//! |---|---|---|
//! | [`BloomFilter`] | bit | union / intersection / jaccard |
//! | [`BloomFilterOnDisk`] | bit (mmap) | in-place file mutation |
//! | [`CountingBloomFilter`] | u32 counter | `remove` |
//! | [`ExpandingBloomFilter`] | bit | grows on saturation |
//! | [`RotatingBloomFilter`] | bit | ages out oldest sub-filter |
//!
//! # Usage
//!
//! ```rust
//! use probkit::bloom::BloomFilter;
//!
//! let mut filter = BloomFilter::new(10, 0.05).unwrap();
//! filter.add("google.com");
//!
//! assert!(filter.check("google.com"));
//! assert!(!filter.check("facebook.com"));
//! ```
//!
//! # Serialization
//!
//! The on-disk rendition is `[bit array][est_elements u64][fpr f32]
//! [elements_added u64]`, all little-endian; see the individual types for the
//! counting and multi-filter layouts. Files and byte buffers load through the
//! same code path, so a blob fetched from a KV store behaves exactly like a
//! file on disk.

mod counting;
mod expanding;
mod filter;
mod on_disk;
mod rotating;

pub use self::counting::CountingBloomFilter;
pub use self::expanding::ExpandingBloomFilter;
pub use self::filter::BloomFilter;
pub use self::on_disk::BloomFilterOnDisk;
pub use self::rotating::RotatingBloomFilter;

use crate::error::Error;

/// Footer length shared by the bit and counting formats:
/// `est_elements (u64) + fpr (f32) + elements_added (u64)`.
pub(crate) const FOOTER_BYTES: usize = 20;

/// Derives `(number_bits, number_hashes)` from the estimated element count
/// and target false positive rate.
///
/// The rate passes through `f32` first; the footer stores it at that
/// precision and the importer must land on the same `(m, k)`.
pub(crate) fn optimal_params(
    est_elements: u64,
    false_positive_rate: f32,
) -> Result<(u64, u32), Error> {
    if est_elements == 0 {
        return Err(Error::initialization(
            "estimated elements must be greater than 0",
        ));
    }
    let rate = f64::from(false_positive_rate);
    if !(rate > 0.0 && rate < 1.0) {
        return Err(Error::initialization(
            "false positive rate must be between 0.0 and 1.0 (exclusive)",
        ));
    }

    let n = est_elements as f64;
    let ln2_squared = std::f64::consts::LN_2 * std::f64::consts::LN_2;
    let number_bits = ((-n * rate.ln()) / ln2_squared).ceil() as u64;
    let number_hashes = ((number_bits as f64 / n) * std::f64::consts::LN_2).ceil() as u32;

    Ok((number_bits.max(1), number_hashes.max(1)))
}
