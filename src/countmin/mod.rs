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

//! Count-Min sketch implementations for frequency estimation.
//!
//! A Count-Min sketch summarizes a stream of keyed updates in a small
//! `depth x width` counter matrix. Each key maps to one cell per row; a
//! query aggregates the key's cells into an estimate whose error is bounded
//! by the matrix shape. The estimate never undercounts under the default
//! `Min` policy (collisions only inflate cells), and the `Mean` and
//! `MeanMin` policies trade that one-sided guarantee for less collision
//! bias.
//!
//! # Usage
//!
//! ```rust
//! use probkit::countmin::CountMinSketch;
//!
//! let mut sketch = CountMinSketch::new(1000, 5).unwrap();
//! assert_eq!(sketch.add("x"), 1);
//! assert_eq!(sketch.add_with_weight("x", 24), 25);
//! assert_eq!(sketch.check("x"), 25);
//! ```
//!
//! # Views
//!
//! Two stream views maintain an explicit key set next to the sketch:
//! [`HeavyHitters`] keeps the top-K keys seen so far, and
//! [`StreamThreshold`] keeps every key whose estimate has reached a fixed
//! threshold.

mod heavy_hitters;
mod sketch;
mod stream_threshold;

pub use self::heavy_hitters::HeavyHitters;
pub use self::sketch::CountMinSketch;
pub use self::sketch::QueryPolicy;
pub use self::stream_threshold::StreamThreshold;
