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

//! Bit-packed and counter array primitives.
//!
//! The byte orientation used here (bit `k` at byte `k / 8`, position
//! `k % 8`, least significant bit first) is exactly the on-disk layout, so
//! serialization is a plain copy of the backing bytes.

mod bits;
mod counters;
mod mmap;

pub use self::bits::BitArray;
pub use self::bits::BitStore;
pub use self::counters::CounterArray;
pub use self::mmap::MmapBitArray;
