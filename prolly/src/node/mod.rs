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

//! The node family: typed views over chunks.
//!
//! A node borrows a chunk for the duration of a navigation (shared through
//! `Rc`, never copied) and decodes its count-prefixed entry run. Leaves hold
//! user payload; meta nodes hold edges to children. Cells sit outside the
//! tree proper and are decoded separately.

pub mod blob;
pub mod cell;
pub mod map;
pub mod meta;
pub mod set;

use std::rc::Rc;

pub use self::{
    blob::BlobNode,
    cell::{CellData, CellNode},
    map::MapNode,
    meta::{MetaEntry, MetaNode},
    set::SetNode,
};
use crate::{
    chunk::{Chunk, ChunkType},
    error::Error,
    hash::Hash,
    orderedkey::OrderedKey,
    segment::Segment,
};

/// Any tree node, leaf or internal, behind one accessor set.
#[derive(Debug, Clone)]
pub enum Node {
    Blob(BlobNode),
    Map(MapNode),
    Set(SetNode),
    Meta(MetaNode),
}

impl Node {
    /// Decodes a chunk into the node kind its type tag names.
    pub fn decode(chunk: Rc<Chunk>) -> Result<Self, Error> {
        match chunk.chunk_type() {
            ChunkType::Blob => Ok(Self::Blob(BlobNode::decode(chunk)?)),
            ChunkType::Map => Ok(Self::Map(MapNode::decode(chunk)?)),
            ChunkType::Set => Ok(Self::Set(SetNode::decode(chunk)?)),
            ChunkType::Meta => Ok(Self::Meta(MetaNode::decode(chunk)?)),
            other => Err(Error::CorruptChunk(format!(
                "{other} chunk is not a tree node"
            ))),
        }
    }

    pub fn chunk(&self) -> &Rc<Chunk> {
        match self {
            Self::Blob(node) => node.chunk(),
            Self::Map(node) => node.chunk(),
            Self::Set(node) => node.chunk(),
            Self::Meta(node) => node.chunk(),
        }
    }

    pub fn hash(&self) -> &Hash {
        self.chunk().hash()
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.chunk().chunk_type()
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::Meta(_))
    }

    pub fn num_entries(&self) -> usize {
        match self {
            Self::Blob(node) => node.num_entries(),
            Self::Map(node) => node.num_entries(),
            Self::Set(node) => node.num_entries(),
            Self::Meta(node) => node.num_entries(),
        }
    }

    /// Encoded width of entry `idx`
    pub fn len(&self, idx: usize) -> usize {
        match self {
            Self::Blob(node) => node.len(idx),
            Self::Map(node) => node.len(idx),
            Self::Set(node) => node.len(idx),
            Self::Meta(node) => node.len(idx),
        }
    }

    /// Raw bytes of entry `idx`
    pub fn data(&self, idx: usize) -> &[u8] {
        match self {
            Self::Blob(node) => node.data(idx),
            Self::Map(node) => node.data(idx),
            Self::Set(node) => node.data(idx),
            Self::Meta(node) => node.data(idx),
        }
    }

    /// User entries in the subtree this node roots.
    pub fn num_elements(&self) -> u64 {
        match self {
            Self::Meta(node) => node.num_elements(),
            leaf => leaf.num_entries() as u64,
        }
    }

    /// The ordered key of entry `idx`; `None` for blobs, which navigate
    /// positionally.
    pub fn entry_key(&self, idx: usize) -> Option<OrderedKey> {
        match self {
            Self::Blob(_) => None,
            Self::Map(node) => Some(node.ordered_key(idx)),
            Self::Set(node) => Some(node.ordered_key(idx)),
            Self::Meta(node) => Some(node.entry(idx).key.clone()),
        }
    }

    /// Index of the first entry ordered at or after `key`. Not meaningful
    /// for blobs.
    pub fn get_idx_for_key(&self, key: &OrderedKey) -> Result<usize, Error> {
        match self {
            Self::Blob(_) => Err(Error::InvalidInput(
                "blobs navigate by position, not key".to_string(),
            )),
            Self::Map(node) => {
                let bytes = key.as_bytes().ok_or_else(|| by_value_mismatch("map"))?;
                Ok(node.get_idx_for_key(bytes))
            }
            Self::Set(node) => {
                let bytes = key.as_bytes().ok_or_else(|| by_value_mismatch("set"))?;
                Ok(node.get_idx_for_key(bytes))
            }
            Self::Meta(node) => Ok(node.get_child_hash_by_key(key).1),
        }
    }

    /// A zero-copy view over `count` entries starting at `start_entry`.
    pub fn get_segment(&self, start_entry: usize, count: usize) -> Segment<'_> {
        match self {
            Self::Blob(node) => node.get_segment(start_entry, count),
            Self::Map(node) => node.get_segment(start_entry, count),
            Self::Set(node) => node.get_segment(start_entry, count),
            Self::Meta(node) => node.get_segment(start_entry, count),
        }
    }

    pub fn as_meta(&self) -> Option<&MetaNode> {
        match self {
            Self::Meta(node) => Some(node),
            _ => None,
        }
    }
}

fn by_value_mismatch(kind: &str) -> Error {
    Error::InvalidInput(format!("{kind} trees are keyed by bytes, got a by-value key"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::map::encode_entry;
    use crate::chunker::NodeChunker;

    #[test]
    fn decode_dispatches_on_type() {
        let blob = Chunk::new(ChunkType::Blob, b"abc");
        assert!(matches!(Node::decode(Rc::new(blob)).unwrap(), Node::Blob(_)));

        let cell = Chunk::new(ChunkType::Cell, &[0u8; 41]);
        assert!(Node::decode(Rc::new(cell)).is_err());
    }

    #[test]
    fn key_variant_is_validated() {
        let mut bytes = Vec::new();
        encode_entry(&mut bytes, b"k", b"v");
        let info = NodeChunker::Map
            .make(&[Segment::var(&bytes, vec![0])])
            .unwrap();
        let node = Node::decode(Rc::new(info.chunk)).unwrap();

        assert_eq!(
            node.get_idx_for_key(&OrderedKey::ByBytes(b"k".to_vec()))
                .unwrap(),
            0
        );
        assert!(node.get_idx_for_key(&OrderedKey::ByValue(3)).is_err());
    }
}
