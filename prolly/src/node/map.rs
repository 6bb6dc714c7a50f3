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

//! Key/value leaf nodes.
//!
//! Entry layout: `{u32 total_len, u32 key_len, key_bytes, value_bytes}`,
//! entries ordered by key bytes.

use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    chunk::{Chunk, ChunkType},
    error::Error,
    orderedkey::OrderedKey,
    segment::{Segment, VarSegment},
};

/// Bytes of length prefixes in a map entry
pub const MAP_ENTRY_HEADER_BYTES: usize = 8;

/// Encoded width of a key/value pair
pub fn entry_num_bytes(key: &[u8], value: &[u8]) -> usize {
    MAP_ENTRY_HEADER_BYTES + key.len() + value.len()
}

/// Appends one encoded entry to `dst`.
pub fn encode_entry(dst: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    let total = entry_num_bytes(key, value) as u32;
    dst.extend_from_slice(&total.to_le_bytes());
    dst.extend_from_slice(&(key.len() as u32).to_le_bytes());
    dst.extend_from_slice(key);
    dst.extend_from_slice(value);
}

/// Splits one encoded entry into its key and value.
pub fn decode_entry(bytes: &[u8]) -> Result<(&[u8], &[u8]), Error> {
    if bytes.len() < MAP_ENTRY_HEADER_BYTES {
        return Err(Error::CorruptChunk("truncated map entry".to_string()));
    }
    let total = LittleEndian::read_u32(&bytes[..4]) as usize;
    let key_len = LittleEndian::read_u32(&bytes[4..8]) as usize;
    if total != bytes.len() || MAP_ENTRY_HEADER_BYTES + key_len > total {
        return Err(Error::CorruptChunk(format!(
            "map entry lengths {total}/{key_len} disagree with {} bytes",
            bytes.len()
        )));
    }
    let key = &bytes[MAP_ENTRY_HEADER_BYTES..MAP_ENTRY_HEADER_BYTES + key_len];
    let value = &bytes[MAP_ENTRY_HEADER_BYTES + key_len..];
    Ok((key, value))
}

/// A typed view over a map leaf chunk.
#[derive(Debug, Clone)]
pub struct MapNode {
    chunk: Rc<Chunk>,
    offsets: Vec<usize>,
}

impl MapNode {
    pub fn decode(chunk: Rc<Chunk>) -> Result<Self, Error> {
        if chunk.chunk_type() != ChunkType::Map {
            return Err(Error::CorruptChunk(format!(
                "expected a map chunk, got {}",
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

    pub fn key(&self, idx: usize) -> &[u8] {
        let (key, _) = decode_entry(self.data(idx)).expect("entries validated at decode");
        key
    }

    pub fn value(&self, idx: usize) -> &[u8] {
        let (_, value) = decode_entry(self.data(idx)).expect("entries validated at decode");
        value
    }

    pub fn kv(&self, idx: usize) -> (&[u8], &[u8]) {
        decode_entry(self.data(idx)).expect("entries validated at decode")
    }

    pub fn ordered_key(&self, idx: usize) -> OrderedKey {
        OrderedKey::ByBytes(self.key(idx).to_vec())
    }

    /// Index of the first entry whose key is `>= key`; `num_entries` when
    /// every key is smaller.
    pub fn get_idx_for_key(&self, key: &[u8]) -> usize {
        self.offsets
            .partition_point(|&off| {
                let entry = &self.chunk.payload()[off..];
                let key_len = LittleEndian::read_u32(&entry[4..8]) as usize;
                &entry[MAP_ENTRY_HEADER_BYTES..MAP_ENTRY_HEADER_BYTES + key_len] < key
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

/// Scans a count-prefixed payload of self-sized entries into start offsets.
pub(crate) fn scan_entries(payload: &[u8]) -> Result<Vec<usize>, Error> {
    if payload.len() < 4 {
        return Err(Error::CorruptChunk("leaf payload lacks a count".to_string()));
    }
    let count = LittleEndian::read_u32(&payload[..4]) as usize;
    let mut offsets = Vec::with_capacity(count);
    let mut pos = 4usize;
    for _ in 0..count {
        if pos + 4 > payload.len() {
            return Err(Error::CorruptChunk("truncated leaf entry".to_string()));
        }
        let len = LittleEndian::read_u32(&payload[pos..pos + 4]) as usize;
        if len < 4 || pos + len > payload.len() {
            return Err(Error::CorruptChunk(format!(
                "leaf entry of {len} bytes does not fit its chunk"
            )));
        }
        offsets.push(pos);
        pos += len;
    }
    if pos != payload.len() {
        return Err(Error::CorruptChunk(format!(
            "{} trailing bytes after leaf entries",
            payload.len() - pos
        )));
    }
    Ok(offsets)
}

pub(crate) fn segment_of<'a>(
    chunk: &'a Chunk,
    offsets: &[usize],
    start_entry: usize,
    count: usize,
) -> Segment<'a> {
    let start = offsets[start_entry];
    let end = if start_entry + count == offsets.len() {
        chunk.payload().len()
    } else {
        offsets[start_entry + count]
    };
    let rebased = offsets[start_entry..start_entry + count]
        .iter()
        .map(|off| off - start)
        .collect();
    Segment::Var(VarSegment::new(&chunk.payload()[start..end], rebased))
}
