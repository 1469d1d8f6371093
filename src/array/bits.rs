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

use crate::error::Error;

/// The contract a Bloom filter backend must expose.
///
/// The in-memory [`BitArray`] and the memory-mapped
/// [`super::MmapBitArray`] both satisfy it; `flush` is a no-op for the
/// former and a sync for the latter.
pub trait BitStore {
    /// Returns whether bit `index` is set.
    fn get_bit(&self, index: u64) -> bool;
    /// Sets bit `index`.
    fn set_bit(&mut self, index: u64);
    /// Returns the number of set bits.
    fn popcount(&self) -> u64;
    /// Persists pending writes, where the backend has any.
    fn flush(&mut self) -> Result<(), Error>;
}

/// A flat, byte-packed bit array.
///
/// # Examples
///
/// ```
/// use probkit::array::BitArray;
/// use probkit::array::BitStore;
///
/// let mut bits = BitArray::new(100);
/// bits.set_bit(42);
/// assert!(bits.get_bit(42));
/// assert!(!bits.get_bit(43));
/// assert_eq!(bits.popcount(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitArray {
    bytes: Vec<u8>,
    num_bits: u64,
}

impl BitArray {
    /// Creates a cleared array of `num_bits` bits.
    pub fn new(num_bits: u64) -> Self {
        let num_bytes = num_bits.div_ceil(8) as usize;
        Self {
            bytes: vec![0u8; num_bytes],
            num_bits,
        }
    }

    /// Rebuilds an array from its byte rendition.
    ///
    /// Fails when the byte count does not match `num_bits`.
    pub fn from_bytes(bytes: &[u8], num_bits: u64) -> Result<Self, Error> {
        let expected = num_bits.div_ceil(8) as usize;
        if bytes.len() != expected {
            return Err(Error::size_mismatch(expected, bytes.len(), "bit array"));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
            num_bits,
        })
    }

    /// The number of bits in the array.
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// The backing bytes, exactly as serialized.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Clears every bit.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Returns a new array holding the bitwise OR of the two.
    pub fn or(&self, other: &BitArray) -> BitArray {
        let bytes = self
            .bytes
            .iter()
            .zip(&other.bytes)
            .map(|(a, b)| a | b)
            .collect();
        BitArray {
            bytes,
            num_bits: self.num_bits,
        }
    }

    /// Returns a new array holding the bitwise AND of the two.
    pub fn and(&self, other: &BitArray) -> BitArray {
        let bytes = self
            .bytes
            .iter()
            .zip(&other.bytes)
            .map(|(a, b)| a & b)
            .collect();
        BitArray {
            bytes,
            num_bits: self.num_bits,
        }
    }
}

impl BitStore for BitArray {
    fn get_bit(&self, index: u64) -> bool {
        let byte = self.bytes[(index / 8) as usize];
        byte & (1 << (index % 8)) != 0
    }

    fn set_bit(&mut self, index: u64) {
        self.bytes[(index / 8) as usize] |= 1 << (index % 8);
    }

    fn popcount(&self) -> u64 {
        self.bytes.iter().map(|b| u64::from(b.count_ones())).sum()
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
