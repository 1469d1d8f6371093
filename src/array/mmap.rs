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

use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;

use super::BitStore;
use crate::error::Error;

/// A bit array backed by a writable memory mapping of an open file.
///
/// The first `ceil(num_bits / 8)` bytes of the mapping are the bit array;
/// anything after is caller-owned trailer space (the on-disk Bloom filter
/// keeps its footer there). Writes land in the page cache and reach the file
/// on [`flush`](BitStore::flush) or drop.
#[derive(Debug)]
pub struct MmapBitArray {
    _file: File,
    map: MmapMut,
    num_bits: u64,
}

impl MmapBitArray {
    /// Maps an existing file as a bit array of `num_bits` bits.
    ///
    /// Fails when the file is shorter than the bit array needs.
    pub fn open(path: &Path, num_bits: u64) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| Error::io("open", err).with_context("path", path.display()))?;
        let map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|err| Error::io("mmap", err).with_context("path", path.display()))?;

        let data_bytes = num_bits.div_ceil(8) as usize;
        if map.len() < data_bytes {
            return Err(Error::size_mismatch(data_bytes, map.len(), "mapped file"));
        }

        Ok(Self {
            _file: file,
            map,
            num_bits,
        })
    }

    /// The number of bits in the mapped array.
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// The bit-array region of the mapping.
    pub fn data(&self) -> &[u8] {
        &self.map[..self.num_bits.div_ceil(8) as usize]
    }

    /// The trailer region after the bit array, mutable for in-place updates.
    pub fn trailer_mut(&mut self) -> &mut [u8] {
        let data_bytes = self.num_bits.div_ceil(8) as usize;
        &mut self.map[data_bytes..]
    }
}

impl BitStore for MmapBitArray {
    fn get_bit(&self, index: u64) -> bool {
        self.map[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    fn set_bit(&mut self, index: u64) {
        self.map[(index / 8) as usize] |= 1 << (index % 8);
    }

    fn popcount(&self) -> u64 {
        self.data().iter().map(|b| u64::from(b.count_ones())).sum()
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.map.flush().map_err(|err| Error::io("flush", err))
    }
}

impl Drop for MmapBitArray {
    fn drop(&mut self) {
        // Destruction must leave the file consistent even on abnormal paths.
        let _ = self.map.flush();
    }
}
