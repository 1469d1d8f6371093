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

use sha2::Digest;
use sha2::Sha256;

use super::KeyHasher;

/// The SHA-256 hash family.
///
/// Depth `i` takes the low 64 bits, little-endian, of
/// `SHA256(seed_i || key)` where `seed_i` is the big-endian 8-byte encoding
/// of `i`. Slower than [`super::Fnv1a`] but with digest-quality dispersion;
/// no cryptographic guarantee is implied by the choice of primitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl KeyHasher for Sha256Hasher {
    fn hash_many(&self, key: &[u8], depth: usize) -> Vec<u64> {
        let mut hashes = Vec::with_capacity(depth);
        for idx in 0..depth as u64 {
            let mut sha = Sha256::new();
            sha.update(idx.to_be_bytes());
            sha.update(key);
            let digest = sha.finalize();
            let mut low = [0u8; 8];
            low.copy_from_slice(&digest[..8]);
            hashes.push(u64::from_le_bytes(low));
        }
        hashes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let first = Sha256Hasher.hash_many(b"probe", 4);
        assert_eq!(first, Sha256Hasher.hash_many(b"probe", 4));
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_rounds_differ() {
        let hashes = Sha256Hasher.hash_many(b"probe", 4);
        assert_ne!(hashes[0], hashes[1]);
        assert_ne!(hashes[1], hashes[2]);
    }

    #[test]
    fn test_str_and_bytes_agree() {
        assert_eq!(
            Sha256Hasher.hash_many("probe".as_bytes(), 2),
            Sha256Hasher.hash_many(b"probe", 2)
        );
    }
}
