// MIT LICENSE
//
// Copyright (c) 2021 Dash Core Group
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Content hashes.
//!
//! Every chunk is addressed by the first 20 bytes of the SHA-256 digest of
//! its full byte block. The all-zero hash is reserved to mark absence.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::Error;

/// Width of a content hash in bytes
pub const HASH_BYTE_LEN: usize = 20;
/// Width of a content hash in its base32 text form
pub const HASH_STRING_LEN: usize = 32;

const BASE32_ALPHABET: base32::Alphabet = base32::Alphabet::RFC4648 { padding: false };

/// A 20-byte truncated SHA-256 content digest. Ordering and equality are
/// byte-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_BYTE_LEN]);

impl Hash {
    /// The distinguished null hash marking absence
    pub const NULL: Self = Self([0u8; HASH_BYTE_LEN]);

    /// Digests `data` and truncates to the hash width.
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; HASH_BYTE_LEN];
        bytes.copy_from_slice(&digest[..HASH_BYTE_LEN]);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; HASH_BYTE_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds a hash from raw bytes, which must be exactly the hash width.
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        if slice.len() != HASH_BYTE_LEN {
            return Err(Error::InvalidInput(format!(
                "hash must be {HASH_BYTE_LEN} bytes, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; HASH_BYTE_LEN];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Parses the 32-character base32 text form.
    pub fn from_base32(encoded: &str) -> Result<Self, Error> {
        let bytes = base32::decode(BASE32_ALPHABET, encoded)
            .ok_or_else(|| Error::InvalidInput(format!("not base32: {encoded:?}")))?;
        Self::from_slice(&bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; HASH_BYTE_LEN] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// The canonical text form: RFC 4648 base32, no padding, 32 characters.
    pub fn to_base32(&self) -> String {
        base32::encode(BASE32_ALPHABET, &self.0)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_base32())
    }
}
