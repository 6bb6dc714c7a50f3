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

//! In-memory chunk store, the default backend for embedding and tests.

use std::{
    collections::HashMap,
    sync::{Mutex, RwLock},
};

use crate::{ChunkStore, Error, StoreInfo};

/// A heap-backed [`ChunkStore`]. Nothing survives the process; chunks are
/// shared across operations through interior locking.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chunks: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    meta: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    info: Mutex<StoreInfo>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkStore for MemoryStore {
    fn put(&self, hash: &[u8], chunk: &[u8]) -> Result<(), Error> {
        let mut chunks = self
            .chunks
            .write()
            .map_err(|_| Error::StorageError("chunk map lock poisoned".to_string()))?;
        if chunks.contains_key(hash) {
            return Ok(());
        }
        chunks.insert(hash.to_vec(), chunk.to_vec());
        self.info
            .lock()
            .map_err(|_| Error::StorageError("store info lock poisoned".to_string()))?
            .record_chunk(chunk);
        Ok(())
    }

    fn get(&self, hash: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| Error::StorageError("chunk map lock poisoned".to_string()))?;
        Ok(chunks.get(hash).cloned())
    }

    fn exists(&self, hash: &[u8]) -> Result<bool, Error> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| Error::StorageError("chunk map lock poisoned".to_string()))?;
        Ok(chunks.contains_key(hash))
    }

    fn get_info(&self) -> Result<StoreInfo, Error> {
        let info = self
            .info
            .lock()
            .map_err(|_| Error::StorageError("store info lock poisoned".to_string()))?;
        Ok(info.clone())
    }

    fn put_meta(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let mut meta = self
            .meta
            .write()
            .map_err(|_| Error::StorageError("meta map lock poisoned".to_string()))?;
        meta.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let meta = self
            .meta
            .read()
            .map_err(|_| Error::StorageError("meta map lock poisoned".to_string()))?;
        Ok(meta.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_of(type_tag: u8, payload: &[u8]) -> Vec<u8> {
        let total = 5 + payload.len() as u32;
        let mut bytes = vec![type_tag];
        bytes.extend_from_slice(&total.to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn put_get_exists() {
        let store = MemoryStore::new();
        let chunk = chunk_of(1, b"hello");

        assert!(!store.exists(b"h1").unwrap());
        store.put(b"h1", &chunk).unwrap();
        assert!(store.exists(b"h1").unwrap());
        assert_eq!(store.get(b"h1").unwrap().unwrap(), chunk);
        assert_eq!(store.get(b"h2").unwrap(), None);
    }

    #[test]
    fn duplicate_put_does_not_double_count() {
        let store = MemoryStore::new();
        let chunk = chunk_of(3, b"payload");

        store.put(b"h1", &chunk).unwrap();
        store.put(b"h1", &chunk).unwrap();

        let info = store.get_info().unwrap();
        assert_eq!(info.chunks, 1);
        assert_eq!(info.chunk_bytes, chunk.len() as u64);
        assert_eq!(info.chunks_per_type.get(&3), Some(&1));
    }

    #[test]
    fn info_breaks_down_per_type() {
        let store = MemoryStore::new();
        let blob = chunk_of(1, b"raw");
        let map = chunk_of(3, b"kv");

        store.put(b"b", &blob).unwrap();
        store.put(b"m", &map).unwrap();

        let info = store.get_info().unwrap();
        assert_eq!(info.chunks, 2);
        assert_eq!(info.bytes_per_type.get(&1), Some(&(blob.len() as u64)));
        assert_eq!(info.bytes_per_type.get(&3), Some(&(map.len() as u64)));
    }

    #[test]
    fn meta_records_overwrite() {
        let store = MemoryStore::new();
        assert_eq!(store.get_meta(b"head:main").unwrap(), None);
        store.put_meta(b"head:main", b"aaaa").unwrap();
        store.put_meta(b"head:main", b"bbbb").unwrap();
        assert_eq!(store.get_meta(b"head:main").unwrap().unwrap(), b"bbbb");
    }
}
