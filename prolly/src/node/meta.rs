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

//! Internal tree nodes.
//!
//! A meta node is a count-prefixed run of `MetaEntry`s, each one an edge to a
//! child chunk: subtree statistics, the child hash, and the maximum ordered
//! key of the child's subtree. Entries are ordered by key, and the last key
//! of a child subtree equals its entry's key.

use std::{
    io::{self, Read, Write},
    rc::Rc,
};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use ed::{Decode, Encode, Terminated};

use crate::{
    chunk::{Chunk, ChunkType},
    error::Error,
    hash::{Hash, HASH_BYTE_LEN},
    orderedkey::OrderedKey,
    segment::{Segment, VarSegment},
};

/// Bytes of a meta entry before its variable-width key
pub const META_ENTRY_FIXED_BYTES: usize = 4 + 4 + 8 + HASH_BYTE_LEN;

/// An edge in the tree: child hash, rolled-up subtree statistics, and the
/// maximum ordered key of the child's subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEntry {
    /// Leaf chunks below this edge
    pub num_leaves: u32,
    /// User entries below this edge
    pub num_elements: u64,
    /// The child chunk's hash
    pub child_hash: Hash,
    /// Maximum ordered key in the child's subtree
    pub key: OrderedKey,
}

impl MetaEntry {
    /// Encoded width, the leading length field included.
    pub fn num_bytes(&self) -> usize {
        META_ENTRY_FIXED_BYTES + self.key.num_bytes()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let entry = Self::decode(bytes)?;
        if entry.num_bytes() != bytes.len() {
            return Err(Error::CorruptChunk(format!(
                "meta entry length field disagrees with its {} bytes",
                bytes.len()
            )));
        }
        Ok(entry)
    }
}

impl Encode for MetaEntry {
    fn encode_into<W: Write>(&self, dest: &mut W) -> ed::Result<()> {
        dest.write_u32::<LittleEndian>(self.num_bytes() as u32)?;
        dest.write_u32::<LittleEndian>(self.num_leaves)?;
        dest.write_u64::<LittleEndian>(self.num_elements)?;
        dest.write_all(self.child_hash.as_bytes())?;
        self.key.encode_into(dest)
    }

    fn encoding_length(&self) -> ed::Result<usize> {
        Ok(self.num_bytes())
    }
}

impl Decode for MetaEntry {
    fn decode<R: Read>(mut input: R) -> ed::Result<Self> {
        let num_bytes = input.read_u32::<LittleEndian>()? as usize;
        let key_len = num_bytes
            .checked_sub(META_ENTRY_FIXED_BYTES)
            .filter(|len| *len > 0)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "meta entry too short for a key")
            })?;
        let num_leaves = input.read_u32::<LittleEndian>()?;
        let num_elements = input.read_u64::<LittleEndian>()?;
        let mut hash_bytes = [0u8; HASH_BYTE_LEN];
        input.read_exact(&mut hash_bytes)?;
        let mut key_bytes = vec![0u8; key_len];
        input.read_exact(&mut key_bytes)?;
        let key = OrderedKey::decode(key_bytes.as_slice())?;
        Ok(Self {
            num_leaves,
            num_elements,
            child_hash: Hash::from_bytes(hash_bytes),
            key,
        })
    }
}

impl Terminated for MetaEntry {}

/// A typed view over a meta chunk.
#[derive(Debug, Clone)]
pub struct MetaNode {
    chunk: Rc<Chunk>,
    offsets: Vec<usize>,
    entries: Vec<MetaEntry>,
}

impl MetaNode {
    pub fn decode(chunk: Rc<Chunk>) -> Result<Self, Error> {
        if chunk.chunk_type() != ChunkType::Meta {
            return Err(Error::CorruptChunk(format!(
                "expected a meta chunk, got {}",
                chunk.chunk_type()
            )));
        }
        let payload = chunk.payload();
        if payload.len() < 4 {
            return Err(Error::CorruptChunk("meta payload lacks a count".to_string()));
        }
        let count = LittleEndian::read_u32(&payload[..4]) as usize;
        if count == 0 {
            return Err(Error::CorruptChunk("meta node with no children".to_string()));
        }
        let mut offsets = Vec::with_capacity(count);
        let mut entries = Vec::with_capacity(count);
        let mut pos = 4usize;
        for _ in 0..count {
            if pos + 4 > payload.len() {
                return Err(Error::CorruptChunk("truncated meta entry".to_string()));
            }
            let len = LittleEndian::read_u32(&payload[pos..pos + 4]) as usize;
            if len <= META_ENTRY_FIXED_BYTES || pos + len > payload.len() {
                return Err(Error::CorruptChunk(format!(
                    "meta entry of {len} bytes does not fit its chunk"
                )));
            }
            entries.push(MetaEntry::from_slice(&payload[pos..pos + len])?);
            offsets.push(pos);
            pos += len;
        }
        if pos != payload.len() {
            return Err(Error::CorruptChunk(format!(
                "{} trailing bytes after meta entries",
                payload.len() - pos
            )));
        }
        Ok(Self {
            chunk,
            offsets,
            entries,
        })
    }

    pub fn chunk(&self) -> &Rc<Chunk> {
        &self.chunk
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Encoded width of entry `idx`
    pub fn len(&self, idx: usize) -> usize {
        self.entries[idx].num_bytes()
    }

    /// Raw bytes of entry `idx`
    pub fn data(&self, idx: usize) -> &[u8] {
        let start = self.offsets[idx];
        &self.chunk.payload()[start..start + self.len(idx)]
    }

    pub fn entry(&self, idx: usize) -> &MetaEntry {
        &self.entries[idx]
    }

    pub fn entries(&self) -> &[MetaEntry] {
        &self.entries
    }

    /// Leaf chunks in the subtree under this node
    pub fn num_leaves(&self) -> u32 {
        self.entries.iter().map(|entry| entry.num_leaves).sum()
    }

    /// User entries in the subtree under this node
    pub fn num_elements(&self) -> u64 {
        self.entries.iter().map(|entry| entry.num_elements).sum()
    }

    /// User entries under the first `idx` edges
    pub fn num_elements_until_entry(&self, idx: usize) -> u64 {
        self.entries[..idx]
            .iter()
            .map(|entry| entry.num_elements)
            .sum()
    }

    /// Finds the child holding the element at position `element_idx`.
    /// Past-the-end positions yield `(None, num_entries)`.
    pub fn get_child_hash_by_index(&self, element_idx: u64) -> (Option<Hash>, usize) {
        let mut cumulative = 0u64;
        for (idx, entry) in self.entries.iter().enumerate() {
            if element_idx < cumulative + entry.num_elements {
                return (Some(entry.child_hash), idx);
            }
            cumulative += entry.num_elements;
        }
        (None, self.num_entries())
    }

    /// The child hash of edge `entry_idx`
    pub fn get_child_hash_by_entry(&self, entry_idx: usize) -> &Hash {
        &self.entries[entry_idx].child_hash
    }

    /// Finds the first edge whose max key is `>= key`. Keys greater than
    /// every subtree yield `(None, num_entries)`.
    pub fn get_child_hash_by_key(&self, key: &OrderedKey) -> (Option<Hash>, usize) {
        let idx = self.entries.partition_point(|entry| entry.key < *key);
        match self.entries.get(idx) {
            Some(entry) => (Some(entry.child_hash), idx),
            None => (None, idx),
        }
    }

    /// A zero-copy view over `count` entries starting at `start_entry`.
    pub fn get_segment(&self, start_entry: usize, count: usize) -> Segment<'_> {
        let start = self.offsets[start_entry];
        let end = if start_entry + count == self.num_entries() {
            self.chunk.payload().len()
        } else {
            self.offsets[start_entry + count]
        };
        let offsets = self.offsets[start_entry..start_entry + count]
            .iter()
            .map(|off| off - start)
            .collect();
        Segment::Var(VarSegment::new(&self.chunk.payload()[start..end], offsets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunker::NodeChunker,
        segment::Segment,
    };

    fn entry(num_leaves: u32, num_elements: u64, hash_base32: &str, key: u64) -> MetaEntry {
        MetaEntry {
            num_leaves,
            num_elements,
            child_hash: Hash::from_base32(hash_base32).unwrap(),
            key: OrderedKey::ByValue(key),
        }
    }

    #[test]
    fn entry_codec() {
        let key_bytes = Hash::from_base32("26UPXMYH26AJI2OKTK6LACBOJ6GVMUPE")
            .unwrap()
            .as_bytes()
            .to_vec();
        let me = MetaEntry {
            num_leaves: 5,
            num_elements: 10,
            child_hash: Hash::from_base32("26UPXMYH26AJI2OKTK6LACBOJ6GVMUPE").unwrap(),
            key: OrderedKey::ByBytes(key_bytes.clone()),
        };

        let bytes = me.encode().unwrap();
        assert_eq!(
            bytes.len(),
            2 * 4 + 8 + HASH_BYTE_LEN + key_bytes.len() + 1
        );

        let decoded = MetaEntry::from_slice(&bytes).unwrap();
        assert_eq!(decoded.num_bytes(), me.num_bytes());
        assert_eq!(decoded.num_leaves, 5);
        assert_eq!(decoded.num_elements, 10);
        assert_eq!(decoded.child_hash, me.child_hash);
        assert_eq!(decoded.key, me.key);
    }

    #[test]
    fn aggregation_and_lookup() {
        let me1 = entry(1, 10, "36UPXMYH26AJI2OKTK6LACBOJ6GVMUPE", 5);
        let me2 = entry(2, 20, "46UPXMYH26AJI2OKTK6LACBOJ6GVMUPE", 10);
        let me3 = entry(3, 25, "56UPXMYH36AJI3OKTK6LACBOJ6GVMUPE", 15);

        let bytes1 = me1.encode().unwrap();
        let bytes2 = me2.encode().unwrap();
        let bytes3 = me3.encode().unwrap();

        // first segment carries two entries, the second one
        let mut seg_data1 = bytes1.clone();
        seg_data1.extend_from_slice(&bytes2);
        let seg1 = Segment::var(&seg_data1, vec![0, bytes1.len()]);
        let seg2 = Segment::var(&bytes3, vec![0]);

        let info = NodeChunker::Meta
            .make(&[seg1, seg2])
            .unwrap();
        let node = MetaNode::decode(Rc::new(info.chunk)).unwrap();

        assert_eq!(node.num_entries(), 3);
        assert_eq!(node.num_leaves(), 6);
        assert_eq!(node.num_elements(), 55);
        assert_eq!(node.num_elements_until_entry(2), 30);

        assert_eq!(node.len(0), bytes1.len());
        assert_eq!(node.data(0), bytes1.as_slice());
        assert_eq!(node.len(1), bytes2.len());
        assert_eq!(node.data(1), bytes2.as_slice());
        assert_eq!(node.len(2), bytes3.len());
        assert_eq!(node.data(2), bytes3.as_slice());

        // positional descent
        let (hash, idx) = node.get_child_hash_by_index(9);
        assert_eq!(hash, Some(me1.child_hash));
        assert_eq!(idx, 0);
        let (hash, idx) = node.get_child_hash_by_index(10);
        assert_eq!(hash, Some(me2.child_hash));
        assert_eq!(idx, 1);
        assert_eq!(*node.get_child_hash_by_entry(2), me3.child_hash);

        // keyed descent
        let (hash, idx) = node.get_child_hash_by_key(&OrderedKey::ByValue(9));
        assert_eq!(hash, Some(me2.child_hash));
        assert_eq!(idx, 1);
        let (hash, idx) = node.get_child_hash_by_key(&OrderedKey::ByValue(20));
        assert_eq!(hash, None);
        assert_eq!(idx, 3);

        // rollup of the freshly made chunk
        let rollup = info.meta_entry;
        assert_eq!(rollup.num_leaves, 6);
        assert_eq!(rollup.num_elements, 55);
        assert_eq!(rollup.child_hash, *node.chunk().hash());
        assert_eq!(rollup.key, OrderedKey::ByValue(15));
    }

    #[test]
    fn get_segment_is_byte_exact() {
        let me1 = entry(1, 10, "36UPXMYH26AJI2OKTK6LACBOJ6GVMUPE", 5);
        let me2 = entry(2, 20, "46UPXMYH26AJI2OKTK6LACBOJ6GVMUPE", 10);
        let me3 = entry(3, 25, "56UPXMYH36AJI3OKTK6LACBOJ6GVMUPE", 15);

        let bytes1 = me1.encode().unwrap();
        let bytes2 = me2.encode().unwrap();
        let bytes3 = me3.encode().unwrap();

        let mut all = bytes1.clone();
        all.extend_from_slice(&bytes2);
        all.extend_from_slice(&bytes3);
        let seg = Segment::var(&all, vec![0, bytes1.len(), bytes1.len() + bytes2.len()]);
        let info = NodeChunker::Meta.make(&[seg]).unwrap();
        let node = MetaNode::decode(Rc::new(info.chunk)).unwrap();

        let seg = node.get_segment(1, 2);
        assert_eq!(seg.num_entries(), 2);
        assert_eq!(seg.entry_num_bytes(0), bytes2.len());
        assert_eq!(seg.entry(0), bytes2.as_slice());
        assert_eq!(seg.entry_num_bytes(1), bytes3.len());
        assert_eq!(seg.entry(1), bytes3.as_slice());
    }

    #[test]
    fn decode_rejects_corruption() {
        let me = entry(1, 1, "26UPXMYH26AJI2OKTK6LACBOJ6GVMUPE", 1);
        let bytes = me.encode().unwrap();

        let mut payload = 1u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&bytes);
        // trailing garbage
        let mut bad = payload.clone();
        bad.push(0xAB);
        let chunk = Chunk::new(ChunkType::Meta, &bad);
        assert!(MetaNode::decode(Rc::new(chunk)).is_err());

        // truncated entry
        let chunk = Chunk::new(ChunkType::Meta, &payload[..payload.len() - 3]);
        assert!(MetaNode::decode(Rc::new(chunk)).is_err());

        // wrong chunk type
        let chunk = Chunk::new(ChunkType::Map, &payload);
        assert!(MetaNode::decode(Rc::new(chunk)).is_err());
    }
}
