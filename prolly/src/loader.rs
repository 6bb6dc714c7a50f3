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

//! Per-operation chunk cache.
//!
//! A loader deduplicates fetches for the duration of one logical operation:
//! the first `load` of a hash hits the store, verifies the digest, and caches
//! the parsed chunk; later loads share it. The cache owns its chunks and
//! releases them when the loader is dropped. A loader is not meant to be
//! shared across threads; give every operation its own.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use storage::ChunkStore;

use crate::{chunk::Chunk, error::Error, hash::Hash, node::Node};

/// A read-through cache over a chunk store.
pub struct ChunkLoader<'a, S: ChunkStore> {
    store: &'a S,
    cache: RefCell<HashMap<Hash, Rc<Chunk>>>,
}

impl<'a, S: ChunkStore> ChunkLoader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    /// Fetches the chunk stored under `hash`, verifying its digest on the
    /// way in.
    pub fn load(&self, hash: &Hash) -> Result<Rc<Chunk>, Error> {
        if let Some(chunk) = self.cache.borrow().get(hash) {
            return Ok(Rc::clone(chunk));
        }
        let bytes = self
            .store
            .get(hash.as_bytes())?
            .ok_or(Error::HashNotFound(*hash))?;
        let chunk = Chunk::from_bytes(bytes)?;
        if chunk.hash() != hash {
            return Err(Error::CorruptChunk(format!(
                "store returned {} for requested hash {hash}",
                chunk.hash()
            )));
        }
        let chunk = Rc::new(chunk);
        self.cache
            .borrow_mut()
            .insert(*hash, Rc::clone(&chunk));
        Ok(chunk)
    }

    /// Loads and decodes a tree node.
    pub fn load_node(&self, hash: &Hash) -> Result<Node, Error> {
        Node::decode(self.load(hash)?)
    }

    /// Seeds the cache with a chunk this operation just built, so reads of a
    /// fresh root do not round-trip through the store.
    pub fn cache_chunk(&self, chunk: &Chunk) {
        self.cache
            .borrow_mut()
            .entry(*chunk.hash())
            .or_insert_with(|| Rc::new(chunk.clone()));
    }

    /// Chunks held by this loader
    pub fn num_cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use storage::MemoryStore;

    use super::*;
    use crate::chunk::ChunkType;

    #[test]
    fn load_caches_and_verifies() {
        let store = MemoryStore::new();
        let chunk = Chunk::new(ChunkType::Blob, b"cached once");
        store.put(chunk.hash().as_bytes(), chunk.bytes()).unwrap();

        let loader = ChunkLoader::new(&store);
        let first = loader.load(chunk.hash()).unwrap();
        let second = loader.load(chunk.hash()).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(loader.num_cached(), 1);
        assert_eq!(first.payload(), b"cached once");
    }

    #[test]
    fn missing_hash_is_an_error() {
        let store = MemoryStore::new();
        let loader = ChunkLoader::new(&store);
        let absent = Hash::compute(b"never stored");
        assert!(matches!(
            loader.load(&absent),
            Err(Error::HashNotFound(hash)) if hash == absent
        ));
    }

    #[test]
    fn digest_mismatch_is_corruption() {
        let store = MemoryStore::new();
        let chunk = Chunk::new(ChunkType::Blob, b"original");
        let wrong_key = Hash::compute(b"somewhere else");
        store.put(wrong_key.as_bytes(), chunk.bytes()).unwrap();

        let loader = ChunkLoader::new(&store);
        assert!(matches!(
            loader.load(&wrong_key),
            Err(Error::CorruptChunk(_))
        ));
    }
}
