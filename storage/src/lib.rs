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

//! Chunk store boundary.
//!
//! Chunks are immutable byte blocks addressed by their content hash; a store
//! maps raw hash bytes to raw chunk bytes and nothing else. Everything this
//! crate knows about chunk internals is the one-byte type tag at offset zero,
//! which it uses to break storage statistics down per chunk kind.
//!
//! Backends also expose a small out-of-band metadata namespace for mutable
//! store-level records (chunking parameters, branch tables). Metadata lives
//! in a separate keyspace and can never collide with a chunk hash.

pub mod error;
mod memory_store;
#[cfg(feature = "rocksdb_storage")]
pub mod rocksdb_storage;

use std::{collections::BTreeMap, fmt};

pub use crate::{error::Error, memory_store::MemoryStore};
#[cfg(feature = "rocksdb_storage")]
pub use crate::rocksdb_storage::RocksDbStore;

/// Per-store aggregate statistics: chunk and byte totals plus a breakdown
/// keyed by the raw chunk type tag.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    /// Number of chunks stored
    pub chunks: u64,
    /// Total bytes across all stored chunks, headers included
    pub chunk_bytes: u64,
    /// Chunk count per type tag
    pub chunks_per_type: BTreeMap<u8, u64>,
    /// Byte count per type tag
    pub bytes_per_type: BTreeMap<u8, u64>,
}

impl StoreInfo {
    pub(crate) fn record_chunk(&mut self, chunk: &[u8]) {
        let type_tag = chunk.first().copied().unwrap_or_default();
        self.chunks += 1;
        self.chunk_bytes += chunk.len() as u64;
        *self.chunks_per_type.entry(type_tag).or_default() += 1;
        *self.bytes_per_type.entry(type_tag).or_default() += chunk.len() as u64;
    }
}

impl fmt::Display for StoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "chunks: {}, bytes: {}", self.chunks, self.chunk_bytes)?;
        for (type_tag, count) in &self.chunks_per_type {
            let bytes = self.bytes_per_type.get(type_tag).copied().unwrap_or(0);
            writeln!(f, "  type {type_tag:#04x}: {count} chunks, {bytes} bytes")?;
        }
        Ok(())
    }
}

/// The narrow interface any chunk backend implements.
///
/// Stores are append-only: `put` is idempotent and a duplicate put of an
/// already-present hash succeeds without writing. Concurrent puts of the same
/// hash are legal and resolve to a single stored chunk; readers see any chunk
/// already acknowledged by `put`.
pub trait ChunkStore {
    /// Stores a chunk under its hash. Writes nothing if the hash is already
    /// present.
    fn put(&self, hash: &[u8], chunk: &[u8]) -> Result<(), Error>;

    /// Fetches the chunk bytes stored under `hash`, or `None` if absent.
    fn get(&self, hash: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    /// Checks presence without fetching.
    fn exists(&self, hash: &[u8]) -> Result<bool, Error>;

    /// Returns chunk and byte counts, broken down per chunk type tag.
    fn get_info(&self) -> Result<StoreInfo, Error>;

    /// Writes a mutable metadata record. Unlike chunks, metadata may be
    /// overwritten in place.
    fn put_meta(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;

    /// Reads a metadata record.
    fn get_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;
}
