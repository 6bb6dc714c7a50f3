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

//! Commit cells.
//!
//! A cell is a small fixed node pointing at a value root: the value's type
//! tag, the data root hash, and one or two parent cell hashes. The first
//! parent is the null hash for a branch's initial commit; a second parent is
//! only present on merge commits. Parent references are hashes, never owning
//! pointers, so the commit graph stays acyclic by construction.
//!
//! Payload layout: `{1B value_type, 20B data_root, 20B parent1, [20B parent2]}`.

use std::{
    io::{self, Read, Write},
    rc::Rc,
};

use byteorder::{ReadBytesExt, WriteBytesExt};
use ed::{Decode, Encode};

use crate::{
    chunk::{Chunk, ChunkType},
    error::Error,
    hash::{Hash, HASH_BYTE_LEN},
};

/// The decoded contents of a cell chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellData {
    /// Chunk type tag of the value the commit points at
    pub value_type: ChunkType,
    /// Root of the committed value tree
    pub data_root: Hash,
    /// Previous commit, or the null hash for an initial commit
    pub parent1: Hash,
    /// Second parent, present only on merge commits
    pub parent2: Option<Hash>,
}

fn read_hash<R: Read>(input: &mut R) -> ed::Result<Hash> {
    let mut bytes = [0u8; HASH_BYTE_LEN];
    input.read_exact(&mut bytes)?;
    Ok(Hash::from_bytes(bytes))
}

impl Encode for CellData {
    fn encode_into<W: Write>(&self, dest: &mut W) -> ed::Result<()> {
        dest.write_u8(self.value_type.as_u8())?;
        dest.write_all(self.data_root.as_bytes())?;
        dest.write_all(self.parent1.as_bytes())?;
        if let Some(parent2) = &self.parent2 {
            dest.write_all(parent2.as_bytes())?;
        }
        Ok(())
    }

    fn encoding_length(&self) -> ed::Result<usize> {
        let parents = if self.parent2.is_some() { 2 } else { 1 };
        Ok(1 + (1 + parents) * HASH_BYTE_LEN)
    }
}

impl Decode for CellData {
    fn decode<R: Read>(mut input: R) -> ed::Result<Self> {
        let type_byte = input.read_u8()?;
        let value_type = ChunkType::from_u8(type_byte)
            .map_err(|_| ed::Error::UnexpectedByte(type_byte))?;
        if !matches!(
            value_type,
            ChunkType::Blob | ChunkType::Map | ChunkType::Set | ChunkType::List
        ) {
            return Err(ed::Error::UnexpectedByte(type_byte));
        }
        let data_root = read_hash(&mut input)?;
        let parent1 = read_hash(&mut input)?;
        let mut rest = Vec::new();
        input.read_to_end(&mut rest)?;
        let parent2 = match rest.len() {
            0 => None,
            HASH_BYTE_LEN => Some(Hash::from_bytes(rest.try_into().expect("length checked"))),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{other} bytes after the first parent hash"),
                )
                .into())
            }
        };
        Ok(Self {
            value_type,
            data_root,
            parent1,
            parent2,
        })
    }
}

/// A typed view over a cell chunk.
#[derive(Debug, Clone)]
pub struct CellNode {
    chunk: Rc<Chunk>,
    data: CellData,
}

impl CellNode {
    pub fn decode(chunk: Rc<Chunk>) -> Result<Self, Error> {
        if chunk.chunk_type() != ChunkType::Cell {
            return Err(Error::CorruptChunk(format!(
                "expected a cell chunk, got {}",
                chunk.chunk_type()
            )));
        }
        let data = CellData::decode(chunk.payload())?;
        Ok(Self { chunk, data })
    }

    /// Builds the chunk for a new commit.
    pub fn new_chunk(
        value_type: ChunkType,
        data_root: Hash,
        parent1: Hash,
        parent2: Option<Hash>,
    ) -> Result<Chunk, Error> {
        if !matches!(
            value_type,
            ChunkType::Blob | ChunkType::Map | ChunkType::Set | ChunkType::List
        ) {
            return Err(Error::InvalidInput(format!(
                "a cell cannot point at a {value_type} value"
            )));
        }
        let data = CellData {
            value_type,
            data_root,
            parent1,
            parent2,
        };
        Ok(Chunk::new(ChunkType::Cell, &data.encode()?))
    }

    pub fn chunk(&self) -> &Rc<Chunk> {
        &self.chunk
    }

    pub fn value_type(&self) -> ChunkType {
        self.data.value_type
    }

    pub fn data_root(&self) -> &Hash {
        &self.data.data_root
    }

    /// The previous commit, unless this is an initial commit.
    pub fn parent1(&self) -> Option<&Hash> {
        (!self.data.parent1.is_null()).then_some(&self.data.parent1)
    }

    /// The merged-in commit of a merge cell.
    pub fn parent2(&self) -> Option<&Hash> {
        self.data.parent2.as_ref()
    }
}
