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

//! Key-only leaf nodes.
//!
//! Entry layout: `{u32 total_len, key_bytes}`, entries ordered by key bytes.

use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    chunk::{Chunk, ChunkType},
    error::Error,
    node::map::{scan_entries, segment_of},
    orderedkey::OrderedKey,
    segment::Segment,
};

/// Bytes of the length prefix in a set entry
pub const SET_ENTRY_HEADER_BYTES: usize = 4;

/// Encoded width of one item
pub fn entry_num_bytes(key: &[u8]) -> usize {
    SET_ENTRY_HEADER_BYTES + key.len()
}

/// Appends one encoded item to `dst`.
pub fn encode_entry(dst: &mut Vec<u8>, key: &[u8]) {
    let total = entry_num_bytes(key) as u32;
    dst.extend_from_slice(&total.to_le_bytes());
    dst.extend_from_slice(key);
}

/// Extracts the item bytes from one encoded entry.
pub fn decode_entry(bytes: &[u8]) -> Result<&[u8], Error> {
    if bytes.len() < SET_ENTRY_HEADER_BYTES {
        return Err(Error::CorruptChunk("truncated set entry".to_string()));
    }
    let total = LittleEndian::read_u32(&bytes[..4]) as usize;
    if total != bytes.len() {
        return Err(Error::CorruptChunk(format!(
            "set entry length {total} disagrees with {} bytes",
            bytes.len()
        )));
    }
    Ok(&bytes[SET_ENTRY_HEADER_BYTES..])
}

/// A typed view over a set leaf chunk.
#[derive(Debug, Clone)]
pub struct SetNode {
    chunk: Rc<Chunk>,
    offsets: Vec<usize>,
}

impl SetNode {
    pub fn decode(chunk: Rc<Chunk>) -> Result<Self, Error> {
        if chunk.chunk_type() != ChunkType::Set {
            return Err(Error::CorruptChunk(format!(
                "expected a set chunk, got {}",
                chunk.chunk_type()
            )));
        }
        let offsets = scan_entries(chunk.payload())?;
        Ok(Self { chunk, offsets })
    }

    pub fn chunk(&self) -> &Rc<Chunk> {
        &self.chunk
    }

    pub fn num_entries(&self) -> usize {
        self.offsets.len()
    }

    /// Encoded width of entry `idx`
    pub fn len(&self, idx: usize) -> usize {
        self.entry_end(idx) - self.offsets[idx]
    }

    /// Raw bytes of entry `idx`
    pub fn data(&self, idx: usize) -> &[u8] {
        &self.chunk.payload()[self.offsets[idx]..self.entry_end(idx)]
    }

    /// The item stored at `idx`
    pub fn item(&self, idx: usize) -> &[u8] {
        decode_entry(self.data(idx)).expect("entries validated at decode")
    }

    pub fn ordered_key(&self, idx: usize) -> OrderedKey {
        OrderedKey::ByBytes(self.item(idx).to_vec())
    }

    /// Index of the first entry whose item is `>= key`; `num_entries` when
    /// every item is smaller.
    pub fn get_idx_for_key(&self, key: &[u8]) -> usize {
        self.offsets.partition_point(|&off| {
            let entry = &self.chunk.payload()[off..];
            let total = LittleEndian::read_u32(&entry[..4]) as usize;
            &entry[SET_ENTRY_HEADER_BYTES..total] < key
        })
    }

    /// A zero-copy view over `count` entries starting at `start_entry`.
    pub fn get_segment(&self, start_entry: usize, count: usize) -> Segment<'_> {
        segment_of(&self.chunk, &self.offsets, start_entry, count)
    }

    fn entry_end(&self, idx: usize) -> usize {
        if idx == self.num_entries() - 1 {
            self.chunk.payload().len()
        } else {
            self.offsets[idx + 1]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::NodeChunker;

    fn node_of(items: &[&[u8]]) -> SetNode {
        let mut bytes = Vec::new();
        let mut offsets = Vec::new();
        for item in items {
            offsets.push(bytes.len());
            encode_entry(&mut bytes, item);
        }
        let seg = Segment::var(&bytes, offsets);
        let info = NodeChunker::Set.make(&[seg]).unwrap();
        SetNode::decode(Rc::new(info.chunk)).unwrap()
    }

    #[test]
    fn entry_codec() {
        let mut bytes = Vec::new();
        encode_entry(&mut bytes, b"item");
        assert_eq!(bytes.len(), 8);
        assert_eq!(LittleEndian::read_u32(&bytes[..4]) as usize, bytes.len());
        assert_eq!(decode_entry(&bytes).unwrap(), b"item");
    }

    #[test]
    fn items_and_lookup() {
        let node = node_of(&[b"i1".as_slice(), b"i22", b"i333"]);

        assert_eq!(node.num_entries(), 3);
        assert_eq!(node.len(0), entry_num_bytes(b"i1"));
        assert_eq!(node.item(1), b"i22");
        assert_eq!(node.ordered_key(2), OrderedKey::ByBytes(b"i333".to_vec()));

        assert_eq!(node.get_idx_for_key(b"i1"), 0);
        assert_eq!(node.get_idx_for_key(b"i2"), 1);
        assert_eq!(node.get_idx_for_key(b"i4"), 3);
    }

    #[test]
    fn rollup_counts_items() {
        let mut bytes = Vec::new();
        let mut offsets = Vec::new();
        for item in [b"a".as_slice(), b"b", b"c"] {
            offsets.push(bytes.len());
            encode_entry(&mut bytes, item);
        }
        let info = NodeChunker::Set
            .make(&[Segment::var(&bytes, offsets)])
            .unwrap();
        assert_eq!(info.meta_entry.num_leaves, 1);
        assert_eq!(info.meta_entry.num_elements, 3);
        assert_eq!(info.meta_entry.key, OrderedKey::ByBytes(b"c".to_vec()));
    }
}
