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

//! Chunked persistent trees over a content-addressed store.
//!
//! Values are probabilistically balanced search trees whose node boundaries
//! come from a rolling hash over the entry stream, which makes every tree a
//! Merkle DAG: the same entries produce the same chunks and the same root
//! hash on any machine, under any mutation history. Leaves hold blobs, maps
//! or sets; meta nodes index children by subtree statistics and maximum
//! ordered key; cells point commits at value roots.
//!
//! The write path streams entries through per-level chunkers and splices
//! mutations into existing trees, reusing every chunk a change does not
//! touch. The read path borrows chunks through a per-operation loader cache
//! and navigates nodes by key or element position.

pub mod builder;
pub mod chunk;
pub mod chunker;
pub mod config;
pub mod cursor;
pub mod diff;
pub mod error;
pub mod hash;
pub mod loader;
pub mod node;
pub mod orderedkey;
pub mod rolling_hash;
pub mod segment;
pub mod tree;

pub use crate::{
    builder::{SpliceAt, TreeBuilder},
    chunk::{Chunk, ChunkType, CHUNK_HEADER_BYTES},
    chunker::{ChunkInfo, NodeChunker},
    config::{ChunkConfig, CHUNK_CONFIG_META_KEY},
    cursor::{leaf_chunk_type, tree_height, NodeCursor, SeekTarget},
    diff::{DiffEntry, TreeDiff},
    error::Error,
    hash::{Hash, HASH_BYTE_LEN},
    loader::ChunkLoader,
    node::{BlobNode, CellData, CellNode, MapNode, MetaEntry, MetaNode, Node, SetNode},
    orderedkey::OrderedKey,
    rolling_hash::RollingHasher,
    segment::{FixedSegment, Segment, VarSegment},
};
