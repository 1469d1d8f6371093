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

//! The multi-depth hashing substrate shared by every sketch.
//!
//! Each structure asks its hasher for `depth` 64-bit values per key through a
//! single contract, [`KeyHasher::hash_many`]. The results are deterministic
//! across runs and platforms, independent of host endianness, insensitive to
//! NUL bytes in keys, and identical for a `&str` and its UTF-8 bytes.
//!
//! Two families ship with the crate:
//!
//! - [`Fnv1a`], the default, and the one baked into the on-disk contract for
//!   formats that do not record a hash identity. Depth `i` re-runs FNV-1a
//!   over the key with the running hash seeded by the previous round's
//!   output.
//! - [`Sha256Hasher`], for callers who want digest-quality dispersion at the
//!   cost of speed.
//!
//! User hash functions plug in through two adapters: [`ChainedHasher`] lifts
//! a seeded scalar function `(key, seed) -> u64`, and [`DigestHasher`] lifts
//! a digest function `key -> bytes`. Both produce the full depth vector by
//! construction, so a structure never has to know which family it holds.
//!
//! # Examples
//!
//! ```
//! use probkit::hash::Fnv1a;
//! use probkit::hash::KeyHasher;
//!
//! let hashes = Fnv1a.hash_many(b"google.com", 3);
//! assert_eq!(hashes.len(), 3);
//! // Identical byte content gives identical hashes.
//! assert_eq!(hashes, Fnv1a.hash_many("google.com".as_bytes(), 3));
//! ```

mod fnv;
mod sha;

pub use self::fnv::fnv_1a;
pub use self::fnv::fnv_1a_seeded;
pub use self::fnv::Fnv1a;
pub use self::sha::Sha256Hasher;

use std::fmt;

/// The initial seed threaded through depth-chained hashers.
///
/// This is the FNV-1a 64-bit offset basis. It doubles as the documented
/// starting seed for [`ChainedHasher`]: anything serialized under the default
/// hash family can be re-read by an importer that seeds its first round with
/// this constant and feeds each round's output in as the next seed. Changing
/// it invalidates every previously exported filter, so once a history of
/// stored sketches exists you are stuck with it.
pub const CHAIN_SEED: u64 = 0xCBF29CE484222325;

/// Fixed key probed to decide whether two hashers agree.
const IDENTITY_PROBE: &[u8] = b"test";

/// The hash vector two structures must share to be combined.
///
/// Hashers have no comparable identity of their own, so compatibility is
/// judged by hashing a fixed probe key at the structure's depth.
pub(crate) fn hash_identity(hasher: &dyn KeyHasher, depth: u32) -> Vec<u64> {
    hasher.hash_many(IDENTITY_PROBE, depth as usize)
}

/// A deterministic producer of `depth` 64-bit hashes for a key.
///
/// `depth` is a request-time parameter, not baked into the hasher; the same
/// hasher instance serves structures of any depth.
pub trait KeyHasher: fmt::Debug {
    /// Returns `depth` hashes for `key`, in order.
    fn hash_many(&self, key: &[u8], depth: usize) -> Vec<u64>;
}

/// Lifts a seeded scalar hash function `(key, seed) -> u64` into the
/// depth-producing form by threading each output in as the next seed.
///
/// The first round is seeded with [`CHAIN_SEED`].
///
/// # Examples
///
/// ```
/// use probkit::hash::fnv_1a_seeded;
/// use probkit::hash::ChainedHasher;
/// use probkit::hash::KeyHasher;
///
/// let hasher = ChainedHasher::new(fnv_1a_seeded);
/// let hashes = hasher.hash_many(b"key", 4);
/// assert_eq!(hashes.len(), 4);
/// ```
pub struct ChainedHasher<F> {
    func: F,
}

impl<F> ChainedHasher<F>
where
    F: Fn(&[u8], u64) -> u64,
{
    /// Wraps a scalar hash function.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> KeyHasher for ChainedHasher<F>
where
    F: Fn(&[u8], u64) -> u64,
{
    fn hash_many(&self, key: &[u8], depth: usize) -> Vec<u64> {
        let mut hashes = Vec::with_capacity(depth);
        let mut seed = CHAIN_SEED;
        for _ in 0..depth {
            seed = (self.func)(key, seed);
            hashes.push(seed);
        }
        hashes
    }
}

impl<F> fmt::Debug for ChainedHasher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedHasher").finish_non_exhaustive()
    }
}

/// Lifts a digest function `key -> bytes` into the depth-producing form.
///
/// Round `i` prepends the single byte `i` to the key, digests, and takes the
/// low 64 bits of the digest in little-endian. The digest must be at least
/// 8 bytes long.
pub struct DigestHasher<F> {
    func: F,
}

impl<F> DigestHasher<F>
where
    F: Fn(&[u8]) -> Vec<u8>,
{
    /// Wraps a digest function.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> KeyHasher for DigestHasher<F>
where
    F: Fn(&[u8]) -> Vec<u8>,
{
    fn hash_many(&self, key: &[u8], depth: usize) -> Vec<u64> {
        let mut hashes = Vec::with_capacity(depth);
        let mut prefixed = Vec::with_capacity(key.len() + 1);
        for idx in 0..depth {
            prefixed.clear();
            prefixed.push(idx as u8);
            prefixed.extend_from_slice(key);
            let digest = (self.func)(&prefixed);
            let mut low = [0u8; 8];
            low.copy_from_slice(&digest[..8]);
            hashes.push(u64::from_le_bytes(low));
        }
        hashes
    }
}

impl<F> fmt::Debug for DigestHasher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestHasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chained_adapter_threads_seeds() {
        let hasher = ChainedHasher::new(fnv_1a_seeded);
        let hashes = hasher.hash_many(b"abc", 3);
        assert_eq!(hashes[0], fnv_1a_seeded(b"abc", CHAIN_SEED));
        assert_eq!(hashes[1], fnv_1a_seeded(b"abc", hashes[0]));
        assert_eq!(hashes[2], fnv_1a_seeded(b"abc", hashes[1]));
    }

    #[test]
    fn test_digest_adapter_varies_by_depth_index() {
        let hasher = DigestHasher::new(|key: &[u8]| {
            use sha2::Digest;
            sha2::Sha256::digest(key).to_vec()
        });
        let hashes = hasher.hash_many(b"abc", 4);
        // Every round digests a different prefixed key.
        let mut deduped = hashes.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), hashes.len());
        // And the whole vector is reproducible.
        assert_eq!(hashes, hasher.hash_many(b"abc", 4));
    }

    #[test]
    fn test_depth_zero_is_empty() {
        assert!(Fnv1a.hash_many(b"abc", 0).is_empty());
    }
}
