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

//! Ordered keys.
//!
//! One key type serves every tree level: a 64-bit integer ordered
//! numerically, or a byte string ordered lexicographically with ties on the
//! common prefix broken by length. A tree only ever holds one variant;
//! operations validate the caller's variant at the boundary.
//!
//! Encoding: one flag byte (1 = by-value) followed by the little-endian u64
//! or the raw key bytes. The length comes from the enclosing entry, so the
//! decoder consumes its whole input.

use std::{
    cmp::Ordering,
    io::{Read, Write},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ed::{Decode, Encode};

use crate::error::Error;

const BY_BYTES_FLAG: u8 = 0;
const BY_VALUE_FLAG: u8 = 1;

/// A unified integer-or-bytes key with a total order per variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderedKey {
    /// Ordered numerically
    ByValue(u64),
    /// Ordered lexicographically, ties broken by length
    ByBytes(Vec<u8>),
}

impl OrderedKey {
    /// Parses a key from its encoded form.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        Self::decode(bytes).map_err(Error::EdError)
    }

    /// Encoded width: flag byte plus payload.
    pub fn num_bytes(&self) -> usize {
        match self {
            Self::ByValue(_) => 1 + std::mem::size_of::<u64>(),
            Self::ByBytes(bytes) => 1 + bytes.len(),
        }
    }

    pub fn is_by_value(&self) -> bool {
        matches!(self, Self::ByValue(_))
    }

    pub fn same_variant(&self, other: &Self) -> bool {
        self.is_by_value() == other.is_by_value()
    }

    /// The raw key bytes of a by-bytes key.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::ByBytes(bytes) => Some(bytes),
            Self::ByValue(_) => None,
        }
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::ByValue(left), Self::ByValue(right)) => left.cmp(right),
            (Self::ByBytes(left), Self::ByBytes(right)) => left.cmp(right),
            // Trees never mix variants; this pairing exists only to keep the
            // order total for generic containers.
            (Self::ByValue(_), Self::ByBytes(_)) => Ordering::Less,
            (Self::ByBytes(_), Self::ByValue(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Encode for OrderedKey {
    fn encode_into<W: Write>(&self, dest: &mut W) -> ed::Result<()> {
        match self {
            Self::ByValue(value) => {
                dest.write_u8(BY_VALUE_FLAG)?;
                dest.write_u64::<LittleEndian>(*value)?;
            }
            Self::ByBytes(bytes) => {
                dest.write_u8(BY_BYTES_FLAG)?;
                dest.write_all(bytes)?;
            }
        }
        Ok(())
    }

    fn encoding_length(&self) -> ed::Result<usize> {
        Ok(self.num_bytes())
    }
}

impl Decode for OrderedKey {
    fn decode<R: Read>(mut input: R) -> ed::Result<Self> {
        match input.read_u8()? {
            BY_VALUE_FLAG => Ok(Self::ByValue(input.read_u64::<LittleEndian>()?)),
            BY_BYTES_FLAG => {
                let mut bytes = Vec::new();
                input.read_to_end(&mut bytes)?;
                Ok(Self::ByBytes(bytes))
            }
            other => Err(ed::Error::UnexpectedByte(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_keys_order_numerically() {
        let k1 = OrderedKey::ByValue(10);
        let k2 = OrderedKey::ByValue(5);
        let k3 = OrderedKey::ByValue(15);

        assert!(k1 > k2);
        assert!(k1 < k3);
        assert!(k1 <= k3);
        assert_eq!(k2, OrderedKey::ByValue(5));
        assert!(k2 >= OrderedKey::ByValue(5));
    }

    #[test]
    fn byte_keys_order_lexicographically() {
        let k1 = OrderedKey::ByBytes(b"abc".to_vec());
        let k2 = OrderedKey::ByBytes(b"efg".to_vec());
        let k3 = OrderedKey::ByBytes(b"aaaa".to_vec());

        assert!(k1 > k3);
        assert!(k1 < k2);
        assert!(k3 <= k2);
        assert_eq!(k2, OrderedKey::ByBytes(b"efg".to_vec()));
    }

    #[test]
    fn prefix_tie_breaks_by_length() {
        let short = OrderedKey::ByBytes(b"ab".to_vec());
        let long = OrderedKey::ByBytes(b"abc".to_vec());
        assert!(short < long);
    }

    #[test]
    fn value_key_codec() {
        let key = OrderedKey::ByValue(10);
        let bytes = key.encode().unwrap();
        assert_eq!(bytes.len(), 9);
        assert_eq!(bytes[0], BY_VALUE_FLAG);
        assert_eq!(u64::from_le_bytes(bytes[1..9].try_into().unwrap()), 10);
        assert_eq!(OrderedKey::from_slice(&bytes).unwrap(), key);
    }

    #[test]
    fn byte_key_codec() {
        let key = OrderedKey::ByBytes(b"efg".to_vec());
        let bytes = key.encode().unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes[0], BY_BYTES_FLAG);
        assert_eq!(&bytes[1..], b"efg");
        let decoded = OrderedKey::from_slice(&bytes).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.num_bytes(), key.num_bytes());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(OrderedKey::from_slice(&[7, 1, 2, 3]).is_err());
    }
}
