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

//! probkit: probabilistic set-membership and frequency-estimation sketches.
//!
//! Every structure here answers "have I seen X?" or "how often have I seen
//! X?" approximately, in a fraction of the space an exact answer would
//! take. They share one substrate: a multi-depth hashing contract
//! ([`hash::KeyHasher`]), bit-packed array primitives ([`array`]), and
//! little-endian on-disk formats that round-trip bit-exactly across
//! implementations ([`codec`]).
//!
//! # Families
//!
//! - [`bloom`]: the classical Bloom filter plus counting, on-disk
//!   (memory-mapped), expanding, and rotating variants.
//! - [`countmin`]: the Count-Min sketch with min / mean / mean-min query
//!   policies, plus heavy-hitters and stream-threshold views.
//! - [`cuckoo`]: the cuckoo filter and its counting variant, with bounded
//!   eviction and optional auto-expansion.
//!
//! # Quick start
//!
//! ```rust
//! use probkit::bloom::BloomFilter;
//! use probkit::countmin::CountMinSketch;
//!
//! let mut filter = BloomFilter::new(1000, 0.01).unwrap();
//! filter.add("google.com");
//! assert!(filter.check("google.com"));
//!
//! let mut sketch = CountMinSketch::new(1000, 5).unwrap();
//! sketch.add_with_weight("query", 25);
//! assert_eq!(sketch.check("query"), 25);
//!
//! // Everything serializes to a stable little-endian format.
//! let restored = BloomFilter::from_bytes(&filter.to_bytes()).unwrap();
//! assert_eq!(restored, filter);
//! ```
//!
//! # Keys
//!
//! Keys are byte sequences; anything `AsRef<[u8]>` works, and a `&str` key
//! hashes identically to its UTF-8 bytes. Hashing is deterministic across
//! runs and platforms, which is what makes the serialized formats portable.

pub mod array;
pub mod bloom;
pub mod codec;
pub mod countmin;
pub mod cuckoo;
pub mod error;
pub mod hash;

pub use crate::bloom::BloomFilter;
pub use crate::bloom::BloomFilterOnDisk;
pub use crate::bloom::CountingBloomFilter;
pub use crate::bloom::ExpandingBloomFilter;
pub use crate::bloom::RotatingBloomFilter;
pub use crate::countmin::CountMinSketch;
pub use crate::countmin::HeavyHitters;
pub use crate::countmin::StreamThreshold;
pub use crate::cuckoo::CountingCuckooFilter;
pub use crate::cuckoo::CuckooFilter;
pub use crate::error::Error;
pub use crate::error::ErrorKind;
