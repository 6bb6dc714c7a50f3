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

//! Raw byte leaf nodes. The payload is the data itself; every byte is one
//! entry, which lets positional navigation and chunking treat blobs like any
//! other leaf.

use std::rc::Rc;

use crate::{
    chunk::{Chunk, ChunkType},
    error::Error,
    segment::{FixedSegment, Segment},
};

/// A typed view over a blob leaf chunk.
#[derive(Debug, Clone)]
pub struct BlobNode {
    chunk: Rc<Chunk>,
}

impl BlobNode {
    pub fn decode(chunk: Rc<Chunk>) -> Result<Self, Error> {
        if chunk.chunk_type() != ChunkType::Blob {
            return Err(Error::CorruptChunk(format!(
                "expected a blob chunk, got {}",
                chunk.chunk_type()
            )));
        }
        Ok(Self { chunk })
    }

    pub fn chunk(&self) -> &Rc<Chunk> {
        &self.chunk
    }

    pub fn num_entries(&self) -> usize {
        self.chunk.payload().len()
    }

    /// Every blob entry is one byte wide.
    pub fn len(&self, _idx: usize) -> usize {
        1
    }

    pub fn data(&self, idx: usize) -> &[u8] {
        &self.chunk.payload()[idx..idx + 1]
    }

    /// The whole payload.
    pub fn bytes(&self) -> &[u8] {
        self.chunk.payload()
    }

    pub fn get_segment(&self, start_entry: usize, count: usize) -> Segment<'_> {
        Segment::Fixed(FixedSegment::new(
            &self.chunk.payload()[start_entry..start_entry + count],
            1,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_the_data() {
        let chunk = Chunk::new(ChunkType::Blob, b"raw bytes");
        let node = BlobNode::decode(Rc::new(chunk)).unwrap();

        assert_eq!(node.num_entries(), 9);
        assert_eq!(node.bytes(), b"raw bytes");
        assert_eq!(node.data(4), b" ");
        assert_eq!(node.len(0), 1);

        let seg = node.get_segment(4, 5);
        assert_eq!(seg.num_entries(), 5);
        assert_eq!(seg.bytes(), b"bytes");
    }

    #[test]
    fn rejects_other_chunk_kinds() {
        let chunk = Chunk::new(ChunkType::Set, b"\x00\x00\x00\x00");
        assert!(BlobNode::decode(Rc::new(chunk)).is_err());
    }
}
