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

use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use crate::array::BitArray;
use crate::array::BitStore;
use crate::array::MmapBitArray;
use crate::bloom::BloomFilter;
use crate::bloom::FOOTER_BYTES;
use crate::bloom::optimal_params;
use crate::codec::WireBytes;
use crate::codec::WireSlice;
use crate::error::Error;
use crate::hash::Fnv1a;
use crate::hash::KeyHasher;

/// A Bloom filter whose bit array lives in a memory-mapped file.
///
/// The file layout is identical to the in-memory filter's export (bit array
/// first, 20-byte footer last), so either type can read the other's files.
/// Bit writes and the footer insert counter go straight through the mapping;
/// the mapping is flushed on [`flush`](Self::flush), [`close`](Self::close),
/// and drop.
///
/// # Examples
///
/// ```
/// # use probkit::bloom::BloomFilterOnDisk;
/// # let dir = tempfile::tempdir().unwrap();
/// # let path = dir.path().join("filter.blm");
/// let mut filter = BloomFilterOnDisk::create(&path, 100, 0.01).unwrap();
/// filter.add("apple");
/// assert!(filter.check("apple"));
/// drop(filter);
///
/// let reopened = BloomFilterOnDisk::open(&path).unwrap();
/// assert!(reopened.check("apple"));
/// assert_eq!(reopened.elements_added(), 1);
/// ```
#[derive(Debug)]
pub struct BloomFilterOnDisk {
    est_elements: u64,
    false_positive_rate: f32,
    number_hashes: u32,
    number_bits: u64,
    elements_added: u64,
    filepath: PathBuf,
    store: MmapBitArray,
    hasher: Arc<dyn KeyHasher>,
}

impl BloomFilterOnDisk {
    /// Creates a fresh zeroed filter file at `path` and maps it.
    pub fn create(
        path: impl AsRef<Path>,
        est_elements: u64,
        false_positive_rate: f32,
    ) -> Result<Self, Error> {
        Self::create_with_hasher(path, est_elements, false_positive_rate, Arc::new(Fnv1a))
    }

    /// Creates a fresh filter file with a caller-provided hash family.
    pub fn create_with_hasher(
        path: impl AsRef<Path>,
        est_elements: u64,
        false_positive_rate: f32,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        let (number_bits, _) = optimal_params(est_elements, false_positive_rate)?;

        let mut footer = WireBytes::with_capacity(FOOTER_BYTES);
        footer.write_u64_le(est_elements);
        footer.write_f32_le(false_positive_rate);
        footer.write_u64_le(0);

        let path = path.as_ref();
        let mut file = std::fs::File::create(path)
            .map_err(|err| Error::io("create", err).with_context("path", path.display()))?;
        file.write_all(&vec![0u8; number_bits.div_ceil(8) as usize])
            .and_then(|_| file.write_all(&footer.into_bytes()))
            .and_then(|_| file.flush())
            .map_err(|err| Error::io("write", err).with_context("path", path.display()))?;
        drop(file);

        Self::open_with_hasher(path, hasher)
    }

    /// Opens an existing filter file, re-deriving parameters from its footer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with_hasher(path, Arc::new(Fnv1a))
    }

    /// Opens an existing filter file with a caller-provided hash family.
    pub fn open_with_hasher(
        path: impl AsRef<Path>,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut file = std::fs::File::open(path)
            .map_err(|err| Error::io("open", err).with_context("path", path.display()))?;
        let file_len = file
            .seek(SeekFrom::End(0))
            .map_err(|err| Error::io("seek", err))?;
        if (file_len as usize) < FOOTER_BYTES {
            return Err(Error::insufficient_data("bloom footer"));
        }
        file.seek(SeekFrom::End(-(FOOTER_BYTES as i64)))
            .map_err(|err| Error::io("seek", err))?;
        let mut footer = [0u8; FOOTER_BYTES];
        file.read_exact(&mut footer)
            .map_err(|err| Error::io("read", err))?;
        drop(file);

        let mut cursor = WireSlice::new(&footer);
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
        let expected = number_bits.div_ceil(8) as usize + FOOTER_BYTES;
        if file_len as usize != expected {
            return Err(Error::size_mismatch(expected, file_len as usize, "bloom file"));
        }

        let store = MmapBitArray::open(path, number_bits)?;
        Ok(Self {
            est_elements,
            false_positive_rate,
            number_hashes,
            number_bits,
            elements_added,
            filepath: path.to_path_buf(),
            store,
            hasher,
        })
    }

    /// Loading from a byte buffer is not supported for the on-disk filter;
    /// use [`BloomFilter::from_bytes`] and export it instead.
    pub fn from_bytes(_bytes: &[u8]) -> Result<Self, Error> {
        Err(Error::not_supported(
            "loading from bytes is not supported by the on-disk Bloom filter",
        ))
    }

    /// Returns the hash vector this filter derives for `key`.
    pub fn hashes<K: AsRef<[u8]>>(&self, key: K) -> Vec<u64> {
        self.hasher
            .hash_many(key.as_ref(), self.number_hashes as usize)
    }

    /// Adds `key`, writing bits and the footer counter through the mapping;
    /// returns the updated insert count.
    pub fn add<K: AsRef<[u8]>>(&mut self, key: K) -> u64 {
        self.add_alt(&self.hashes(key))
    }

    /// Adds the key represented by a precomputed hash vector.
    pub fn add_alt(&mut self, hashes: &[u64]) -> u64 {
        assert!(
            hashes.len() >= self.number_hashes as usize,
            "hash vector shorter than number_hashes"
        );
        for &hash in &hashes[..self.number_hashes as usize] {
            self.store.set_bit(hash % self.number_bits);
        }
        self.elements_added = self.elements_added.saturating_add(1);
        let counter = self.elements_added.to_le_bytes();
        self.store.trailer_mut()[12..20].copy_from_slice(&counter);
        self.elements_added
    }

    /// Tests whether `key` is possibly in the set.
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
            .all(|&hash| self.store.get_bit(hash % self.number_bits))
    }

    /// Estimates the number of distinct keys added from the set bit count.
    pub fn estimate_elements(&self) -> u64 {
        let set_bits = self.store.popcount();
        if set_bits >= self.number_bits {
            return self.elements_added;
        }
        let m = self.number_bits as f64;
        let k = f64::from(self.number_hashes);
        (-(m / k) * (1.0 - set_bits as f64 / m).ln()) as u64
    }

    /// Calculates the false positive rate implied by the current insert
    /// count.
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

    /// Copies the filter into an in-memory [`BloomFilter`] for set algebra.
    pub fn to_memory(&self) -> Result<BloomFilter, Error> {
        let bits = BitArray::from_bytes(self.store.data(), self.number_bits)?;
        Ok(BloomFilter {
            est_elements: self.est_elements,
            false_positive_rate: self.false_positive_rate,
            number_hashes: self.number_hashes,
            number_bits: self.number_bits,
            elements_added: self.elements_added,
            bits,
            hasher: Arc::clone(&self.hasher),
        })
    }

    /// Syncs pending writes to the backing file.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.store.flush()
    }

    /// Copies the filter file to another location, flushing first.
    ///
    /// Exporting onto the backing file itself is a no-op.
    pub fn export(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.flush()?;
        if path.as_ref() == self.filepath {
            return Ok(());
        }
        std::fs::copy(&self.filepath, path.as_ref())
            .map(|_| ())
            .map_err(|err| Error::io("copy", err).with_context("path", path.as_ref().display()))
    }

    /// Flushes and unmaps the filter.
    pub fn close(mut self) -> Result<(), Error> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        (dir, path)
    }

    #[test]
    fn test_create_add_reopen() {
        let (_dir, path) = scratch("filter.blm");
        {
            let mut filter = BloomFilterOnDisk::create(&path, 100, 0.01).unwrap();
            filter.add("apple");
            filter.add("banana");
        }
        let filter = BloomFilterOnDisk::open(&path).unwrap();
        assert_eq!(filter.elements_added(), 2);
        assert!(filter.check("apple"));
        assert!(filter.check("banana"));
        assert!(!filter.check("cherry"));
    }

    #[test]
    fn test_file_matches_memory_export() {
        let (_dir, path) = scratch("filter.blm");
        let mut on_disk = BloomFilterOnDisk::create(&path, 50, 0.05).unwrap();
        let mut in_memory = BloomFilter::new(50, 0.05).unwrap();
        for key in ["a", "b", "c"] {
            on_disk.add(key);
            in_memory.add(key);
        }
        on_disk.flush().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), in_memory.to_bytes());
    }

    #[test]
    fn test_memory_filter_reads_on_disk_file() {
        let (_dir, path) = scratch("filter.blm");
        {
            let mut filter = BloomFilterOnDisk::create(&path, 100, 0.01).unwrap();
            filter.add("shared");
        }
        let filter = BloomFilter::from_path(&path).unwrap();
        assert!(filter.check("shared"));
        assert_eq!(filter.elements_added(), 1);
    }

    #[test]
    fn test_to_memory() {
        let (_dir, path) = scratch("filter.blm");
        let mut on_disk = BloomFilterOnDisk::create(&path, 100, 0.01).unwrap();
        on_disk.add("apple");
        let in_memory = on_disk.to_memory().unwrap();
        assert!(in_memory.check("apple"));
        assert_eq!(in_memory.elements_added(), 1);
    }

    #[test]
    fn test_export_copies_file() {
        let (_dir, path) = scratch("filter.blm");
        let copy_path = path.with_extension("copy");
        let mut filter = BloomFilterOnDisk::create(&path, 100, 0.01).unwrap();
        filter.add("apple");
        filter.export(&copy_path).unwrap();
        let copied = BloomFilter::from_path(&copy_path).unwrap();
        assert!(copied.check("apple"));
    }

    #[test]
    fn test_from_bytes_not_supported() {
        let err = BloomFilterOnDisk::from_bytes(&[0u8; 32]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotSupported);
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let (_dir, path) = scratch("bad.blm");
        std::fs::write(&path, [0u8; 8]).unwrap();
        assert!(BloomFilterOnDisk::open(&path).is_err());
    }
}
