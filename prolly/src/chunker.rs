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

//! Chunk assembly.
//!
//! A chunker turns a run of segments into one chunk of its node kind plus
//! the rolled-up `MetaEntry` the next tree level files the chunk under. Leaf
//! payloads carry a count prefix except blobs, whose payload is the raw data
//! itself; the meta chunker concatenates child entries verbatim.

use crate::{
    chunk::{Chunk, ChunkType},
    error::Error,
    node::{map, set, MetaEntry},
    orderedkey::OrderedKey,
    segment::Segment,
};

/// A freshly formed chunk and the entry that files it one level up.
#[derive(Debug, Clone)]
pub struct ChunkInfo {
    pub chunk: Chunk,
    pub meta_entry: MetaEntry,
}

/// One chunk assembler per node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeChunker {
    Blob,
    Map,
    Set,
    Meta,
}

impl NodeChunker {
    /// The chunker for a leaf chunk kind.
    pub fn for_leaf(chunk_type: ChunkType) -> Result<Self, Error> {
        match chunk_type {
            ChunkType::Blob => Ok(Self::Blob),
            ChunkType::Map => Ok(Self::Map),
            ChunkType::Set => Ok(Self::Set),
            other => Err(Error::InvalidInput(format!(
                "{other} is not a chunkable leaf kind"
            ))),
        }
    }

    pub fn chunk_type(self) -> ChunkType {
        match self {
            Self::Blob => ChunkType::Blob,
            Self::Map => ChunkType::Map,
            Self::Set => ChunkType::Set,
            Self::Meta => ChunkType::Meta,
        }
    }

    pub fn is_leaf(self) -> bool {
        !matches!(self, Self::Meta)
    }

    /// Assembles the segments into one chunk and computes its rollup. The
    /// chunk hash is computed exactly once, here.
    pub fn make(self, segments: &[Segment]) -> Result<ChunkInfo, Error> {
        let entry_count: usize = segments.iter().map(Segment::num_entries).sum();
        let byte_count: usize = segments.iter().map(Segment::num_bytes).sum();

        let mut payload = Vec::with_capacity(byte_count + 4);
        if self != Self::Blob {
            payload.extend_from_slice(&(entry_count as u32).to_le_bytes());
        }
        for segment in segments {
            segment.append_for_chunk(&mut payload);
        }

        let chunk = Chunk::new(self.chunk_type(), &payload);
        let meta_entry = self.rollup(segments, entry_count, byte_count, &chunk)?;
        Ok(ChunkInfo { chunk, meta_entry })
    }

    fn rollup(
        self,
        segments: &[Segment],
        entry_count: usize,
        byte_count: usize,
        chunk: &Chunk,
    ) -> Result<MetaEntry, Error> {
        let child_hash = *chunk.hash();
        match self {
            // Blobs are positional; the key only has to be deterministic.
            Self::Blob => Ok(MetaEntry {
                num_leaves: 1,
                num_elements: byte_count as u64,
                child_hash,
                key: OrderedKey::ByValue(byte_count as u64),
            }),
            Self::Map => {
                let key = match last_entry(segments) {
                    Some(bytes) => {
                        let (key, _) = map::decode_entry(bytes)?;
                        OrderedKey::ByBytes(key.to_vec())
                    }
                    None => OrderedKey::ByBytes(Vec::new()),
                };
                Ok(MetaEntry {
                    num_leaves: 1,
                    num_elements: entry_count as u64,
                    child_hash,
                    key,
                })
            }
            Self::Set => {
                let key = match last_entry(segments) {
                    Some(bytes) => OrderedKey::ByBytes(set::decode_entry(bytes)?.to_vec()),
                    None => OrderedKey::ByBytes(Vec::new()),
                };
                Ok(MetaEntry {
                    num_leaves: 1,
                    num_elements: entry_count as u64,
                    child_hash,
                    key,
                })
            }
            Self::Meta => {
                let mut num_leaves = 0u32;
                let mut num_elements = 0u64;
                let mut last_key = None;
                for segment in segments {
                    for idx in 0..segment.num_entries() {
                        let child = MetaEntry::from_slice(segment.entry(idx))?;
                        num_leaves += child.num_leaves;
                        num_elements += child.num_elements;
                        last_key = Some(child.key);
                    }
                }
                let key = last_key.ok_or_else(|| {
                    Error::InvalidInput("a meta chunk needs at least one child".to_string())
                })?;
                Ok(MetaEntry {
                    num_leaves,
                    num_elements,
                    child_hash,
                    key,
                })
            }
        }
    }
}

fn last_entry<'a>(segments: &[Segment<'a>]) -> Option<&'a [u8]> {
    segments
        .iter()
        .rev()
        .find(|segment| !segment.is_empty())
        .map(|segment| segment.entry(segment.num_entries() - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;

    #[test]
    fn blob_payload_has_no_count_prefix() {
        let data = b"raw blob data";
        let info = NodeChunker::Blob
            .make(&[Segment::fixed(data, 1)])
            .unwrap();

        assert_eq!(info.chunk.chunk_type(), ChunkType::Blob);
        assert_eq!(info.chunk.payload(), data);
        assert_eq!(info.meta_entry.num_leaves, 1);
        assert_eq!(info.meta_entry.num_elements, data.len() as u64);
        assert_eq!(info.meta_entry.child_hash, *info.chunk.hash());
        assert_eq!(
            info.meta_entry.key,
            OrderedKey::ByValue(data.len() as u64)
        );
    }

    #[test]
    fn empty_leaf_chunks_are_legal() {
        let map = NodeChunker::Map.make(&[]).unwrap();
        assert_eq!(map.chunk.payload(), &0u32.to_le_bytes()[..]);
        assert_eq!(map.meta_entry.num_elements, 0);
        assert_eq!(map.meta_entry.key, OrderedKey::ByBytes(Vec::new()));

        let blob = NodeChunker::Blob.make(&[]).unwrap();
        assert!(blob.chunk.payload().is_empty());
        assert_ne!(map.chunk.hash(), blob.chunk.hash());
    }

    #[test]
    fn meta_needs_children() {
        assert!(NodeChunker::Meta.make(&[]).is_err());
    }

    #[test]
    fn identical_segments_make_identical_chunks() {
        let mut bytes = Vec::new();
        map::encode_entry(&mut bytes, b"k", b"v");
        let a = NodeChunker::Map
            .make(&[Segment::var(&bytes, vec![0])])
            .unwrap();
        let b = NodeChunker::Map
            .make(&[Segment::var(&bytes, vec![0])])
            .unwrap();
        assert_eq!(a.chunk.hash(), b.chunk.hash());
        assert_eq!(*a.chunk.hash(), Hash::compute(a.chunk.bytes()));
    }

    #[test]
    fn for_leaf_rejects_internal_kinds() {
        assert!(NodeChunker::for_leaf(ChunkType::Meta).is_err());
        assert!(NodeChunker::for_leaf(ChunkType::Cell).is_err());
        assert_eq!(
            NodeChunker::for_leaf(ChunkType::Map).unwrap(),
            NodeChunker::Map
        );
    }
}
