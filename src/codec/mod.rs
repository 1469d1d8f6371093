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

//! Binary wire primitives shared by every serialization format.
//!
//! All probkit formats are little-endian, versionless, and length-prefixed
//! (or footer-suffixed); the writer and reader here are the only place byte
//! order is spelled out.

mod decode;
mod encode;

pub use self::decode::WireSlice;
pub use self::encode::WireBytes;

use crate::error::Error;

/// Encodes bytes as uppercase hex with no separators.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Decodes a hex string (either case) into bytes.
pub fn from_hex(hex_string: &str) -> Result<Vec<u8>, Error> {
    hex::decode(hex_string)
        .map_err(|err| Error::persistence("corrupt hex").with_context("source", err))
}

#[cfg(test)]
mod tests {
    use super::from_hex;
    use super::to_hex;

    #[test]
    fn test_hex_round_trip() {
        let bytes = [0x00u8, 0x1f, 0xab, 0xff];
        let hex = to_hex(&bytes);
        assert_eq!(hex, "001FABFF");
        assert_eq!(from_hex(&hex).unwrap(), bytes);
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert!(from_hex("zz").is_err());
        assert!(from_hex("abc").is_err());
    }
}
