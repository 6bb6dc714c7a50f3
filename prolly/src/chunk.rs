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

//! Typed immutable chunks.
//!
//! Wire layout, little-endian and fixed forever:
//!
//! ```text
//! offset 0: 1 byte   chunk type
//! offset 1: 4 bytes  total length, header included
//! offset 5: payload
//! ```
//!
//! A chunk's identity is the digest of the entire block, header included, so
//! the type tag is covered by the hash.

use byteorder::{ByteOrder, LittleEndian};
use strum::EnumIter;

use crate::{error::Error, hash::Hash};

/// Offset of the type tag within a chunk block
pub const CHUNK_TYPE_OFFSET: usize = 0;
/// Offset of the little-endian u32 total length
pub const CHUNK_LENGTH_OFFSET: usize = 1;
/// Bytes of header preceding the payload
pub const CHUNK_HEADER_BYTES: usize = 5;

/// The kind of node a chunk encodes. Byte values are part of the wire format
/// and must never be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, strum::Display)]
#[repr(u8)]
pub enum ChunkType {
    /// Raw byte leaf
    Blob = 1,
    /// Internal node of child entries
    Meta = 2,
    /// Key/value leaf
    Map = 3,
    /// Key-only leaf
    Set = 4,
    /// Reserved positional leaf tag
    List = 5,
    /// Commit cell
    Cell = 6,
}

impl ChunkType {
    pub fn from_u8(byte: u8) -> Result<Self, Error> {
        match byte {
            1 => Ok(Self::Blob),
            2 => Ok(Self::Meta),
            3 => Ok(Self::Map),
            4 => Ok(Self::Set),
            5 => Ok(Self::List),
            6 => Ok(Self::Cell),
            other => Err(Error::CorruptChunk(format!(
                "unknown chunk type byte {other:#04x}"
            ))),
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// An immutable typed byte block whose hash is its identity. Once built a
/// chunk is never modified; sharing happens through `Rc` in the loader cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    chunk_type: ChunkType,
    bytes: Vec<u8>,
    hash: Hash,
}

impl Chunk {
    /// Assembles a chunk around `payload` and computes its hash once.
    pub fn new(chunk_type: ChunkType, payload: &[u8]) -> Self {
        let total = CHUNK_HEADER_BYTES + payload.len();
        let mut bytes = Vec::with_capacity(total);
        bytes.push(chunk_type.as_u8());
        bytes.extend_from_slice(&(total as u32).to_le_bytes());
        bytes.extend_from_slice(payload);
        let hash = Hash::compute(&bytes);
        Self {
            chunk_type,
            bytes,
            hash,
        }
    }

    /// Re-creates a chunk from stored bytes, validating the header. The
    /// digest is recomputed; callers fetching by hash must compare it against
    /// the hash they asked for.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.len() < CHUNK_HEADER_BYTES {
            return Err(Error::CorruptChunk(format!(
                "truncated header: {} bytes",
                bytes.len()
            )));
        }
        let chunk_type = ChunkType::from_u8(bytes[CHUNK_TYPE_OFFSET])?;
        let total = LittleEndian::read_u32(&bytes[CHUNK_LENGTH_OFFSET..CHUNK_HEADER_BYTES]) as usize;
        if total != bytes.len() {
            return Err(Error::CorruptChunk(format!(
                "length field says {total} bytes, block has {}",
                bytes.len()
            )));
        }
        let hash = Hash::compute(&bytes);
        Ok(Self {
            chunk_type,
            bytes,
            hash,
        })
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }

    /// Total size of the block, header included
    pub fn num_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// The full block as stored
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[CHUNK_HEADER_BYTES..]
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let chunk = Chunk::new(ChunkType::Blob, b"hello");
        let bytes = chunk.bytes();
        assert_eq!(bytes[CHUNK_TYPE_OFFSET], ChunkType::Blob.as_u8());
        assert_eq!(
            LittleEndian::read_u32(&bytes[CHUNK_LENGTH_OFFSET..CHUNK_HEADER_BYTES]),
            10
        );
        assert_eq!(chunk.payload(), b"hello");
        assert_eq!(chunk.num_bytes(), 10);
    }

    #[test]
    fn hash_covers_whole_block() {
        let chunk = Chunk::new(ChunkType::Blob, b"payload");
        assert_eq!(*chunk.hash(), Hash::compute(chunk.bytes()));
        // same payload under a different type tag hashes differently
        let retyped = Chunk::new(ChunkType::Set, b"payload");
        assert_ne!(chunk.hash(), retyped.hash());
    }

    #[test]
    fn from_bytes_round_trips() {
        let chunk = Chunk::new(ChunkType::Map, b"\x00\x00\x00\x00");
        let parsed = Chunk::from_bytes(chunk.bytes().to_vec()).unwrap();
        assert_eq!(parsed, chunk);
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(Chunk::from_bytes(vec![]).is_err());
        assert!(Chunk::from_bytes(vec![1, 2, 3]).is_err());

        // bad type byte
        let mut bytes = Chunk::new(ChunkType::Blob, b"x").bytes().to_vec();
        bytes[CHUNK_TYPE_OFFSET] = 0xEE;
        assert!(Chunk::from_bytes(bytes).is_err());

        // length field mismatch
        let mut bytes = Chunk::new(ChunkType::Blob, b"x").bytes().to_vec();
        bytes[CHUNK_LENGTH_OFFSET] = 0xFF;
        assert!(Chunk::from_bytes(bytes).is_err());
    }

    #[test]
    fn type_tags_are_stable() {
        for (tag, expected) in [
            (1u8, ChunkType::Blob),
            (2, ChunkType::Meta),
            (3, ChunkType::Map),
            (4, ChunkType::Set),
            (5, ChunkType::List),
            (6, ChunkType::Cell),
        ] {
            assert_eq!(ChunkType::from_u8(tag).unwrap(), expected);
            assert_eq!(expected.as_u8(), tag);
        }
        assert!(ChunkType::from_u8(0).is_err());
        assert!(ChunkType::from_u8(7).is_err());
    }
}
