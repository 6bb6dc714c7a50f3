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

//! RocksDB-backed chunk store.
//!
//! Chunks live in the default column family keyed by raw hash bytes;
//! metadata records live in the `aux` column family. Storage statistics are
//! rebuilt by a full scan at open and kept current on every accepted put.

use std::{path::Path, sync::Mutex};

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use tracing::{debug, info};

use crate::{ChunkStore, Error, StoreInfo};

/// Name of the column family holding metadata records.
const AUX_CF_NAME: &str = "aux";

const WRITE_BUFFER_SIZE: usize = 256 << 20;
const MEMTABLE_MEMORY_BUDGET: usize = 1 << 30;

/// A persistent [`ChunkStore`] over a RocksDB database.
pub struct RocksDbStore {
    db: DB,
    info: Mutex<StoreInfo>,
}

/// Database options matching the level-style compaction tuning the store has
/// always been run with.
pub fn default_db_opts() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);
    opts.increase_parallelism(num_cpus::get() as i32);
    opts.optimize_level_style_compaction(MEMTABLE_MEMORY_BUDGET);
    opts.set_write_buffer_size(WRITE_BUFFER_SIZE);
    opts
}

impl RocksDbStore {
    /// Opens (creating if missing) a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let opts = default_db_opts();
        let cfs = vec![ColumnFamilyDescriptor::new(AUX_CF_NAME, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path.as_ref(), cfs)?;

        let mut initial = StoreInfo::default();
        for entry in db.iterator(IteratorMode::Start) {
            let (_, value) = entry?;
            initial.record_chunk(&value);
        }
        debug!(
            chunks = initial.chunks,
            bytes = initial.chunk_bytes,
            "store info rebuilt from full scan"
        );
        info!(path = %path.as_ref().display(), "opened rocksdb chunk store");

        Ok(Self {
            db,
            info: Mutex::new(initial),
        })
    }

    fn aux_cf(&self) -> Result<&rocksdb::ColumnFamily, Error> {
        self.db
            .cf_handle(AUX_CF_NAME)
            .ok_or_else(|| Error::StorageError("aux column family missing".to_string()))
    }
}

impl ChunkStore for RocksDbStore {
    fn put(&self, hash: &[u8], chunk: &[u8]) -> Result<(), Error> {
        if self.db.get_pinned(hash)?.is_some() {
            return Ok(());
        }
        self.db.put(hash, chunk)?;
        self.info
            .lock()
            .map_err(|_| Error::StorageError("store info lock poisoned".to_string()))?
            .record_chunk(chunk);
        Ok(())
    }

    fn get(&self, hash: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let chunk = self.db.get(hash)?;
        if chunk.is_none() {
            debug!(hash = %hex::encode(hash), "chunk not found");
        }
        Ok(chunk)
    }

    fn exists(&self, hash: &[u8]) -> Result<bool, Error> {
        Ok(self.db.get_pinned(hash)?.is_some())
    }

    fn get_info(&self) -> Result<StoreInfo, Error> {
        let info = self
            .info
            .lock()
            .map_err(|_| Error::StorageError("store info lock poisoned".to_string()))?;
        Ok(info.clone())
    }

    fn put_meta(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let cf = self.aux_cf()?;
        Ok(self.db.put_cf(cf, key, value)?)
    }

    fn get_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let cf = self.aux_cf()?;
        Ok(self.db.get_cf(cf, key)?)
    }
}

/// Helpers for tests in this crate and dependents.
pub mod test_utils {
    use std::ops::Deref;

    use tempfile::TempDir;

    use super::RocksDbStore;

    /// A [`RocksDbStore`] over a temporary directory removed on drop.
    pub struct TempRocksDbStore {
        store: RocksDbStore,
        _dir: TempDir,
    }

    impl TempRocksDbStore {
        pub fn new() -> Self {
            let dir = TempDir::new().expect("cannot create tempdir");
            let store = RocksDbStore::open(dir.path()).expect("cannot open rocksdb store");
            Self { store, _dir: dir }
        }
    }

    impl Default for TempRocksDbStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Deref for TempRocksDbStore {
        type Target = RocksDbStore;

        fn deref(&self) -> &Self::Target {
            &self.store
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::TempRocksDbStore;
    use crate::ChunkStore;

    fn chunk_of(type_tag: u8, payload: &[u8]) -> Vec<u8> {
        let total = 5 + payload.len() as u32;
        let mut bytes = vec![type_tag];
        bytes.extend_from_slice(&total.to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn round_trip() {
        let store = TempRocksDbStore::new();
        let chunk = chunk_of(2, b"meta entries");

        store.put(b"hash-one", &chunk).unwrap();
        assert!(store.exists(b"hash-one").unwrap());
        assert_eq!(store.get(b"hash-one").unwrap().unwrap(), chunk);
        assert_eq!(store.get(b"hash-two").unwrap(), None);
    }

    #[test]
    fn idempotent_put_and_info() {
        let store = TempRocksDbStore::new();
        let chunk = chunk_of(1, b"blob bytes");

        store.put(b"h", &chunk).unwrap();
        store.put(b"h", &chunk).unwrap();

        let info = store.get_info().unwrap();
        assert_eq!(info.chunks, 1);
        assert_eq!(info.chunks_per_type.get(&1), Some(&1));
    }

    #[test]
    fn meta_is_separate_from_chunks() {
        let store = TempRocksDbStore::new();
        store.put_meta(b"h", b"not a chunk").unwrap();
        assert_eq!(store.get(b"h").unwrap(), None);
        assert_eq!(store.get_meta(b"h").unwrap().unwrap(), b"not a chunk");
    }
}
