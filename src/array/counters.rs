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

/// A flat array of 32-bit unsigned counters with saturating arithmetic.
///
/// Backs the counting Bloom filter: one counter per bit position, saturating
/// at `u32::MAX` on the way up and 0 on the way down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterArray {
    counts: Vec<u32>,
}

impl CounterArray {
    /// Creates a zeroed array of `len` counters.
    pub fn new(len: u64) -> Self {
        Self {
            counts: vec![0u32; len as usize],
        }
    }

    /// Rebuilds an array from its little-endian byte rendition.
    pub fn from_bytes(bytes: &[u8], len: u64) -> Result<Self, Error> {
        let expected = len as usize * 4;
        if bytes.len() != expected {
            return Err(Error::size_mismatch(expected, bytes.len(), "counter array"));
        }
        let counts = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { counts })
    }

    /// The number of counters.
    pub fn len(&self) -> u64 {
        self.counts.len() as u64
    }

    /// Returns true if the array has no counters.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Returns counter `index`.
    pub fn get(&self, index: u64) -> u32 {
        self.counts[index as usize]
    }

    /// Saturating increment; returns the post-increment value.
    pub fn increment(&mut self, index: u64) -> u32 {
        let cell = &mut self.counts[index as usize];
        *cell = cell.saturating_add(1);
        *cell
    }

    /// Saturating decrement; returns the post-decrement value.
    pub fn decrement(&mut self, index: u64) -> u32 {
        let cell = &mut self.counts[index as usize];
        *cell = cell.saturating_sub(1);
        *cell
    }

    /// The number of nonzero counters.
    pub fn nonzero_count(&self) -> u64 {
        self.counts.iter().filter(|&&c| c != 0).count() as u64
    }

    /// Clears every counter.
    pub fn clear(&mut self) {
        self.counts.fill(0);
    }

    /// Returns a new array with cell-wise saturating sums.
    pub fn saturating_add(&self, other: &CounterArray) -> CounterArray {
        let counts = self
            .counts
            .iter()
            .zip(&other.counts)
            .map(|(a, b)| a.saturating_add(*b))
            .collect();
        CounterArray { counts }
    }

    /// Returns a new array with cell-wise minimums.
    pub fn min(&self, other: &CounterArray) -> CounterArray {
        let counts = self
            .counts
            .iter()
            .zip(&other.counts)
            .map(|(a, b)| (*a).min(*b))
            .collect();
        CounterArray { counts }
    }

    /// Writes the counters out as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.counts.len() * 4);
        for count in &self.counts {
            bytes.extend_from_slice(&count.to_le_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_bounds() {
        let mut counters = CounterArray::new(2);
        assert_eq!(counters.decrement(0), 0);
        assert_eq!(counters.increment(0), 1);

        let mut counters = CounterArray::from_bytes(&u32::MAX.to_le_bytes(), 1).unwrap();
        assert_eq!(counters.increment(0), u32::MAX);
        assert_eq!(counters.increment(0), u32::MAX);
    }

    #[test]
    fn test_round_trip() {
        let mut counters = CounterArray::new(5);
        counters.increment(1);
        counters.increment(1);
        counters.increment(4);
        let restored = CounterArray::from_bytes(&counters.to_bytes(), 5).unwrap();
        assert_eq!(counters, restored);
        assert_eq!(restored.nonzero_count(), 2);
    }

    #[test]
    fn test_cellwise_ops() {
        let mut a = CounterArray::new(3);
        let mut b = CounterArray::new(3);
        a.increment(0);
        a.increment(1);
        b.increment(1);
        b.increment(2);
        let sum = a.saturating_add(&b);
        assert_eq!((sum.get(0), sum.get(1), sum.get(2)), (1, 2, 1));
        let min = a.min(&b);
        assert_eq!((min.get(0), min.get(1), min.get(2)), (0, 1, 0));
    }
}
