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

//! UStore: a versioned, content-addressed, multi-type data store.
//!
//! Values are chunked prolly trees (blobs, maps, sets); every committed
//! version is a cell chunk pointing at a value root and its parent commits,
//! so history forms a hash-linked commit graph. Branches are mutable names
//! over that immutable graph, kept in store metadata outside the DAG. The
//! surface is Put/Get/Branch/Diff/Merge; everything below it is the chunked
//! data layer in the `prolly` crate over any `storage::ChunkStore` backend.

pub mod error;
mod merge;


use std::collections::BTreeMap;

use prolly::{
    tree, CellNode, ChunkConfig, ChunkLoader, ChunkType, DiffEntry, Hash, TreeBuilder,
    CHUNK_CONFIG_META_KEY, HASH_BYTE_LEN,
};
use serde::{Deserialize, Serialize};
use storage::{ChunkStore, StoreInfo};
use strum::IntoEnumIterator;
use tracing::debug;

pub use crate::{
    error::Error,
    merge::{MergeConflict, Resolution},
};

/// Metadata key holding the serialized branch table
const BRANCHES_META_KEY: &[u8] = b"branches";

/// One mutation against a map value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOp {
    Put(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
}

/// One mutation against a set value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOp {
    Insert(Vec<u8>),
    Remove(Vec<u8>),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BranchTable(BTreeMap<String, [u8; HASH_BYTE_LEN]>);

/// The versioned store: a chunk backend, the chunking parameters recorded in
/// it, and the branch table.
pub struct UStore<S: ChunkStore> {
    store: S,
    config: ChunkConfig,
    branches: BranchTable,
}

impl<S: ChunkStore> UStore<S> {
    /// Opens a store with the default chunking parameters.
    pub fn open(store: S) -> Result<Self, Error> {
        Self::open_with_config(store, ChunkConfig::default())
    }

    /// Opens a store, recording `config` on first use and rejecting any
    /// later mismatch: chunking parameters decide every hash and can never
    /// change for an existing store.
    pub fn open_with_config(store: S, config: ChunkConfig) -> Result<Self, Error> {
        match store.get_meta(CHUNK_CONFIG_META_KEY)? {
            Some(bytes) => {
                let stored = ChunkConfig::decode(&bytes)?;
                if stored != config {
                    return Err(Error::ConfigMismatch {
                        stored,
                        requested: config,
                    });
                }
            }
            None => store.put_meta(CHUNK_CONFIG_META_KEY, &config.encode())?,
        }
        let branches = match store.get_meta(BRANCHES_META_KEY)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => BranchTable::default(),
        };
        debug!(branches = branches.0.len(), "opened store");
        Ok(Self {
            store,
            config,
            branches,
        })
    }

    /// The chunk backend, shared and append-only.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Branch names in order.
    pub fn branches(&self) -> Vec<String> {
        self.branches.0.keys().cloned().collect()
    }

    /// The head commit of a branch.
    pub fn head(&self, branch: &str) -> Result<Hash, Error> {
        self.branches
            .0
            .get(branch)
            .map(|bytes| Hash::from_bytes(*bytes))
            .ok_or_else(|| Error::BranchNotFound(branch.to_string()))
    }

    /// Forks `from` into a new branch pointing at the same head.
    pub fn branch(&mut self, new_branch: &str, from: &str) -> Result<(), Error> {
        if self.branches.0.contains_key(new_branch) {
            return Err(Error::BranchExists(new_branch.to_string()));
        }
        let head = self.head(from)?;
        self.branches
            .0
            .insert(new_branch.to_string(), *head.as_bytes());
        self.persist_branches()?;
        debug!(branch = new_branch, from, "forked branch");
        Ok(())
    }

    /// Commit hashes of a branch, newest first, following first parents.
    pub fn history(&self, branch: &str) -> Result<Vec<Hash>, Error> {
        let loader = ChunkLoader::new(&self.store);
        let mut versions = Vec::new();
        let mut next = Some(self.head(branch)?);
        while let Some(hash) = next {
            let cell = CellNode::decode(loader.load(&hash)?)?;
            versions.push(hash);
            next = cell.parent1().copied();
        }
        Ok(versions)
    }

    /// Applies map mutations to a branch and commits the result. A missing
    /// branch is created with its first version. Returns the version hash;
    /// everything it references is already persistent.
    pub fn put_map(&mut self, branch: &str, ops: &[MapOp]) -> Result<Hash, Error> {
        let root = {
            let loader = ChunkLoader::new(&self.store);
            let builder = TreeBuilder::new(&self.store, &loader, self.config.clone());
            let mut root = match self.value_root(&loader, branch, ChunkType::Map)? {
                Some(root) => root,
                None => builder.build_map(Vec::new())?,
            };
            for op in ops {
                root = match op {
                    MapOp::Put(key, value) => builder.map_put(&root, key, value)?,
                    MapOp::Remove(key) => builder.map_remove(&root, key)?,
                };
            }
            root
        };
        self.commit(branch, ChunkType::Map, root, None)
    }

    /// Looks a key up in a branch's map value.
    pub fn get_map(&self, branch: &str, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let loader = ChunkLoader::new(&self.store);
        let root = self.existing_value_root(&loader, branch, ChunkType::Map)?;
        Ok(tree::map_get(&loader, &root, key)?)
    }

    /// Every entry of a branch's map value, in key order.
    pub fn map_entries(&self, branch: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let loader = ChunkLoader::new(&self.store);
        let root = self.existing_value_root(&loader, branch, ChunkType::Map)?;
        Ok(tree::map_entries(&loader, &root)?)
    }

    /// Applies set mutations to a branch and commits the result.
    pub fn put_set(&mut self, branch: &str, ops: &[SetOp]) -> Result<Hash, Error> {
        let root = {
            let loader = ChunkLoader::new(&self.store);
            let builder = TreeBuilder::new(&self.store, &loader, self.config.clone());
            let mut root = match self.value_root(&loader, branch, ChunkType::Set)? {
                Some(root) => root,
                None => builder.build_set(Vec::new())?,
            };
            for op in ops {
                root = match op {
                    SetOp::Insert(item) => builder.set_insert(&root, item)?,
                    SetOp::Remove(item) => builder.set_remove(&root, item)?,
                };
            }
            root
        };
        self.commit(branch, ChunkType::Set, root, None)
    }

    pub fn set_contains(&self, branch: &str, item: &[u8]) -> Result<bool, Error> {
        let loader = ChunkLoader::new(&self.store);
        let root = self.existing_value_root(&loader, branch, ChunkType::Set)?;
        Ok(tree::set_contains(&loader, &root, item)?)
    }

    pub fn set_items(&self, branch: &str) -> Result<Vec<Vec<u8>>, Error> {
        let loader = ChunkLoader::new(&self.store);
        let root = self.existing_value_root(&loader, branch, ChunkType::Set)?;
        Ok(tree::set_items(&loader, &root)?)
    }

    /// Commits `bytes` as a branch's blob value, replacing any previous
    /// contents.
    pub fn put_blob(&mut self, branch: &str, bytes: &[u8]) -> Result<Hash, Error> {
        let root = {
            let loader = ChunkLoader::new(&self.store);
            let builder = TreeBuilder::new(&self.store, &loader, self.config.clone());
            // type-check the existing head even though its root is replaced
            self.value_root(&loader, branch, ChunkType::Blob)?;
            builder.build_blob(bytes)?
        };
        self.commit(branch, ChunkType::Blob, root, None)
    }

    /// Appends to a branch's blob value and commits.
    pub fn append_blob(&mut self, branch: &str, bytes: &[u8]) -> Result<Hash, Error> {
        let root = {
            let loader = ChunkLoader::new(&self.store);
            let builder = TreeBuilder::new(&self.store, &loader, self.config.clone());
            match self.value_root(&loader, branch, ChunkType::Blob)? {
                Some(root) => builder.blob_append(&root, bytes)?,
                None => builder.build_blob(bytes)?,
            }
        };
        self.commit(branch, ChunkType::Blob, root, None)
    }

    /// The full contents of a branch's blob value.
    pub fn get_blob(&self, branch: &str) -> Result<Vec<u8>, Error> {
        let loader = ChunkLoader::new(&self.store);
        let root = self.existing_value_root(&loader, branch, ChunkType::Blob)?;
        Ok(tree::blob_bytes(&loader, &root)?)
    }

    /// Reads a byte range out of a branch's blob value.
    pub fn read_blob_at(&self, branch: &str, pos: u64, len: usize) -> Result<Vec<u8>, Error> {
        let loader = ChunkLoader::new(&self.store);
        let root = self.existing_value_root(&loader, branch, ChunkType::Blob)?;
        Ok(tree::blob_read_at(&loader, &root, pos, len)?)
    }

    /// Differences between two branches' values, in key order. Both heads
    /// must hold the same value kind.
    pub fn diff(&self, left_branch: &str, right_branch: &str) -> Result<Vec<DiffEntry>, Error> {
        let loader = ChunkLoader::new(&self.store);
        let left = CellNode::decode(loader.load(&self.head(left_branch)?)?)?;
        let right = CellNode::decode(loader.load(&self.head(right_branch)?)?)?;
        if left.value_type() != right.value_type() {
            return Err(Error::WrongValueType {
                branch: right_branch.to_string(),
                expected: left.value_type(),
                actual: right.value_type(),
            });
        }
        let entries = prolly::TreeDiff::new(&loader, left.data_root(), right.data_root())?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Merges `src` into `dst`, erroring on the first conflicting key.
    pub fn merge(&mut self, dst: &str, src: &str) -> Result<Hash, Error> {
        self.merge_impl(dst, src, &mut |_| None)
    }

    /// Merges `src` into `dst`, asking `resolver` to settle each conflicting
    /// key.
    pub fn merge_with(
        &mut self,
        dst: &str,
        src: &str,
        mut resolver: impl FnMut(&MergeConflict) -> Resolution,
    ) -> Result<Hash, Error> {
        self.merge_impl(dst, src, &mut |conflict| Some(resolver(conflict)))
    }

    fn merge_impl(
        &mut self,
        dst: &str,
        src: &str,
        resolver: &mut dyn FnMut(&MergeConflict) -> Option<Resolution>,
    ) -> Result<Hash, Error> {
        let dst_head = self.head(dst)?;
        let src_head = self.head(src)?;
        if dst_head == src_head {
            return Ok(dst_head);
        }

        enum Plan {
            FastForward,
            AlreadyMerged,
            ThreeWay { root: Hash, kind: ChunkType },
        }

        let plan = {
            let loader = ChunkLoader::new(&self.store);
            let dst_cell = CellNode::decode(loader.load(&dst_head)?)?;
            let src_cell = CellNode::decode(loader.load(&src_head)?)?;
            if dst_cell.value_type() != src_cell.value_type() {
                return Err(Error::WrongValueType {
                    branch: src.to_string(),
                    expected: dst_cell.value_type(),
                    actual: src_cell.value_type(),
                });
            }
            let kind = dst_cell.value_type();

            let base = merge::common_ancestor(&loader, &dst_head, &src_head)?;
            if base == Some(src_head) {
                Plan::AlreadyMerged
            } else if base == Some(dst_head) {
                Plan::FastForward
            } else {
                // only keyed values have three-way semantics; blobs must
                // fast-forward or be replaced
                if !matches!(kind, ChunkType::Map | ChunkType::Set) {
                    return Err(Error::MergeUnsupported(kind));
                }
                let builder = TreeBuilder::new(&self.store, &loader, self.config.clone());
                let base_root = match base {
                    Some(cell_hash) => *CellNode::decode(loader.load(&cell_hash)?)?.data_root(),
                    None => match kind {
                        ChunkType::Map => builder.build_map(Vec::new())?,
                        ChunkType::Set => builder.build_set(Vec::new())?,
                        other => return Err(Error::MergeUnsupported(other)),
                    },
                };
                let root = merge::merge_value(
                    &builder,
                    &loader,
                    kind,
                    &base_root,
                    dst_cell.data_root(),
                    src_cell.data_root(),
                    resolver,
                )?;
                Plan::ThreeWay { root, kind }
            }
        };

        match plan {
            Plan::AlreadyMerged => Ok(dst_head),
            Plan::FastForward => {
                self.branches
                    .0
                    .insert(dst.to_string(), *src_head.as_bytes());
                self.persist_branches()?;
                debug!(branch = dst, from = src, "fast-forward merge");
                Ok(src_head)
            }
            Plan::ThreeWay { root, kind } => {
                debug!(branch = dst, from = src, "three-way merge");
                self.commit(dst, kind, root, Some(src_head))
            }
        }
    }

    /// Backend statistics.
    pub fn get_info(&self) -> Result<StoreInfo, Error> {
        Ok(self.store.get_info()?)
    }

    fn commit(
        &mut self,
        branch: &str,
        value_type: ChunkType,
        data_root: Hash,
        parent2: Option<Hash>,
    ) -> Result<Hash, Error> {
        let parent1 = self
            .branches
            .0
            .get(branch)
            .map(|bytes| Hash::from_bytes(*bytes))
            .unwrap_or(Hash::NULL);
        let cell = CellNode::new_chunk(value_type, data_root, parent1, parent2)?;
        self.store.put(cell.hash().as_bytes(), cell.bytes())?;
        self.branches
            .0
            .insert(branch.to_string(), *cell.hash().as_bytes());
        self.persist_branches()?;
        debug!(branch, version = %cell.hash(), "commit");
        Ok(*cell.hash())
    }

    /// The value root a branch's head points at, after checking the value
    /// kind. `None` for a branch that does not exist yet.
    fn value_root(
        &self,
        loader: &ChunkLoader<S>,
        branch: &str,
        expected: ChunkType,
    ) -> Result<Option<Hash>, Error> {
        let head = match self.branches.0.get(branch) {
            Some(bytes) => Hash::from_bytes(*bytes),
            None => return Ok(None),
        };
        let cell = CellNode::decode(loader.load(&head)?)?;
        if cell.value_type() != expected {
            return Err(Error::WrongValueType {
                branch: branch.to_string(),
                expected,
                actual: cell.value_type(),
            });
        }
        Ok(Some(*cell.data_root()))
    }

    fn existing_value_root(
        &self,
        loader: &ChunkLoader<S>,
        branch: &str,
        expected: ChunkType,
    ) -> Result<Hash, Error> {
        self.value_root(loader, branch, expected)?
            .ok_or_else(|| Error::BranchNotFound(branch.to_string()))
    }

    fn persist_branches(&self) -> Result<(), Error> {
        let bytes = bincode::serialize(&self.branches)?;
        self.store.put_meta(BRANCHES_META_KEY, &bytes)?;
        Ok(())
    }
}

/// Renders store statistics with chunk type names.
pub fn describe_info(info: &StoreInfo) -> String {
    let mut out = format!("chunks: {}, bytes: {}\n", info.chunks, info.chunk_bytes);
    for chunk_type in ChunkType::iter() {
        if let Some(count) = info.chunks_per_type.get(&chunk_type.as_u8()) {
            let bytes = info
                .bytes_per_type
                .get(&chunk_type.as_u8())
                .copied()
                .unwrap_or(0);
            out.push_str(&format!("  {chunk_type}: {count} chunks, {bytes} bytes\n"));
        }
    }
    out
}
