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

//! Tree diff.
//!
//! Two cursors walk both trees in lock-step, merging their ordered entry
//! streams. Before stepping entry by entry the driver tries the Merkle
//! short-circuit: whenever both cursors stand at the start of subtrees with
//! equal hashes, the whole subtrees are skipped unread. The result is a
//! key-ordered run of differences. An explicit state machine, advanced one
//! `next` at a time.

use std::cmp::Ordering;

use storage::ChunkStore;

use crate::{
    chunk::ChunkType,
    cursor::{leaf_chunk_type, NodeCursor},
    error::Error,
    hash::Hash,
    loader::ChunkLoader,
    node::Node,
};

/// One differing key. A map diff carries the value on each side it exists
/// on; a set diff carries the item itself as the presence marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub key: Vec<u8>,
    pub left: Option<Vec<u8>>,
    pub right: Option<Vec<u8>>,
}

/// A dual-cursor diff over two map or two set trees sharing one loader.
pub struct TreeDiff<'a, S: ChunkStore> {
    left: NodeCursor<'a, S>,
    right: NodeCursor<'a, S>,
    is_map: bool,
    finished: bool,
}

impl<'a, S: ChunkStore> TreeDiff<'a, S> {
    pub fn new(
        loader: &'a ChunkLoader<'a, S>,
        left_root: &Hash,
        right_root: &Hash,
    ) -> Result<Self, Error> {
        let left_kind = leaf_chunk_type(loader, left_root)?;
        let right_kind = leaf_chunk_type(loader, right_root)?;
        if left_kind != right_kind {
            return Err(Error::InvalidInput(format!(
                "cannot diff a {left_kind} tree against a {right_kind} tree"
            )));
        }
        let is_map = match left_kind {
            ChunkType::Map => true,
            ChunkType::Set => false,
            other => {
                return Err(Error::InvalidInput(format!(
                    "diff is defined on maps and sets, not {other} trees"
                )))
            }
        };
        Ok(Self {
            left: NodeCursor::seek_start(loader, left_root, 0)?,
            right: NodeCursor::seek_start(loader, right_root, 0)?,
            is_map,
            // identical roots differ nowhere
            finished: left_root == right_root,
        })
    }

    fn step(&mut self) -> Result<Option<DiffEntry>, Error> {
        loop {
            if self.left.done() && self.right.done() {
                return Ok(None);
            }
            if self.left.done() {
                let (key, value) = read_entry(&self.right);
                self.right.advance()?;
                return Ok(Some(DiffEntry {
                    key,
                    left: None,
                    right: Some(value),
                }));
            }
            if self.right.done() {
                let (key, value) = read_entry(&self.left);
                self.left.advance()?;
                return Ok(Some(DiffEntry {
                    key,
                    left: Some(value),
                    right: None,
                }));
            }
            if self.try_skip()? {
                continue;
            }

            let (left_key, left_value) = read_entry(&self.left);
            let (right_key, right_value) = read_entry(&self.right);
            match left_key.cmp(&right_key) {
                Ordering::Less => {
                    self.left.advance()?;
                    return Ok(Some(DiffEntry {
                        key: left_key,
                        left: Some(left_value),
                        right: None,
                    }));
                }
                Ordering::Greater => {
                    self.right.advance()?;
                    return Ok(Some(DiffEntry {
                        key: right_key,
                        left: None,
                        right: Some(right_value),
                    }));
                }
                Ordering::Equal => {
                    self.left.advance()?;
                    self.right.advance()?;
                    if self.is_map && left_value != right_value {
                        return Ok(Some(DiffEntry {
                            key: left_key,
                            left: Some(left_value),
                            right: Some(right_value),
                        }));
                    }
                    // same entry on both sides, nothing to report
                }
            }
        }
    }

    /// Skips one pair of identical subtrees if both cursors stand at the
    /// start of one, trying outermost levels first.
    fn try_skip(&mut self) -> Result<bool, Error> {
        for left_level in 0..self.left.subtree_levels() {
            if !self.left.at_subtree_start(left_level) {
                continue;
            }
            let left_hash = *self.left.subtree_hash(left_level);
            for right_level in 0..self.right.subtree_levels() {
                if !self.right.at_subtree_start(right_level) {
                    continue;
                }
                if *self.right.subtree_hash(right_level) == left_hash {
                    self.left.advance_subtree(left_level)?;
                    self.right.advance_subtree(right_level)?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

impl<S: ChunkStore> Iterator for TreeDiff<'_, S> {
    type Item = Result<DiffEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}

fn read_entry<S: ChunkStore>(cursor: &NodeCursor<S>) -> (Vec<u8>, Vec<u8>) {
    match cursor.node() {
        Node::Map(node) => {
            let (key, value) = node.kv(cursor.idx());
            (key.to_vec(), value.to_vec())
        }
        Node::Set(node) => {
            let item = node.item(cursor.idx());
            (item.to_vec(), item.to_vec())
        }
        _ => unreachable!("diff cursors stand on map or set leaves"),
    }
}

#[cfg(test)]
mod tests {
    use storage::MemoryStore;

    use super::*;
    use crate::{builder::TreeBuilder, config::ChunkConfig};

    fn test_config() -> ChunkConfig {
        ChunkConfig {
            window_size: 16,
            chunk_pattern: (1 << 8) - 1,
            max_chunk_size: 1 << 12,
        }
    }

    fn diff_all(store: &MemoryStore, left: &Hash, right: &Hash) -> Vec<DiffEntry> {
        let loader = ChunkLoader::new(store);
        TreeDiff::new(&loader, left, right)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn identical_roots_yield_nothing() {
        let store = MemoryStore::new();
        let loader = ChunkLoader::new(&store);
        let builder = TreeBuilder::new(&store, &loader, test_config());

        let root = builder
            .build_map(vec![(b"a".to_vec(), b"1".to_vec())])
            .unwrap();
        assert!(diff_all(&store, &root, &root).is_empty());
    }

    #[test]
    fn update_and_removal_in_key_order() {
        let store = MemoryStore::new();
        let loader = ChunkLoader::new(&store);
        let builder = TreeBuilder::new(&store, &loader, test_config());

        let main = builder
            .build_map(vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3".to_vec()),
            ])
            .unwrap();
        let dev = {
            let updated = builder.map_put(&main, b"b", b"20").unwrap();
            builder.map_remove(&updated, b"c").unwrap()
        };

        let diff = diff_all(&store, &main, &dev);
        assert_eq!(
            diff,
            vec![
                DiffEntry {
                    key: b"b".to_vec(),
                    left: Some(b"2".to_vec()),
                    right: Some(b"20".to_vec()),
                },
                DiffEntry {
                    key: b"c".to_vec(),
                    left: Some(b"3".to_vec()),
                    right: None,
                },
            ]
        );
    }

    #[test]
    fn additions_show_up_on_the_right() {
        let store = MemoryStore::new();
        let loader = ChunkLoader::new(&store);
        let builder = TreeBuilder::new(&store, &loader, test_config());

        let base = builder.build_map(Vec::new()).unwrap();
        let grown = builder.map_put(&base, b"k", b"v").unwrap();

        let diff = diff_all(&store, &base, &grown);
        assert_eq!(
            diff,
            vec![DiffEntry {
                key: b"k".to_vec(),
                left: None,
                right: Some(b"v".to_vec()),
            }]
        );
    }

    #[test]
    fn set_diff_reports_presence() {
        let store = MemoryStore::new();
        let loader = ChunkLoader::new(&store);
        let builder = TreeBuilder::new(&store, &loader, test_config());

        let left = builder
            .build_set(vec![b"a".to_vec(), b"b".to_vec()])
            .unwrap();
        let right = {
            let dropped = builder.set_remove(&left, b"a").unwrap();
            builder.set_insert(&dropped, b"c").unwrap()
        };

        let diff = diff_all(&store, &left, &right);
        assert_eq!(
            diff,
            vec![
                DiffEntry {
                    key: b"a".to_vec(),
                    left: Some(b"a".to_vec()),
                    right: None,
                },
                DiffEntry {
                    key: b"c".to_vec(),
                    left: None,
                    right: Some(b"c".to_vec()),
                },
            ]
        );
    }

    #[test]
    fn mismatched_kinds_are_rejected() {
        let store = MemoryStore::new();
        let loader = ChunkLoader::new(&store);
        let builder = TreeBuilder::new(&store, &loader, test_config());

        let map = builder.build_map(Vec::new()).unwrap();
        let set = builder.build_set(Vec::new()).unwrap();
        assert!(TreeDiff::new(&loader, &map, &set).is_err());
    }

    #[test]
    fn merkle_skip_avoids_loading_shared_subtrees() {
        let store = MemoryStore::new();
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..4000u32)
            .map(|i| {
                (
                    format!("key{i:06}").into_bytes(),
                    format!("value{i:06}").into_bytes(),
                )
            })
            .collect();

        let (left, right) = {
            let loader = ChunkLoader::new(&store);
            let builder = TreeBuilder::new(&store, &loader, test_config());
            let left = builder.build_map(entries).unwrap();
            let right = builder.map_put(&left, b"key002000", b"changed").unwrap();
            (left, right)
        };

        let total_chunks = store.get_info().unwrap().chunks;
        let loader = ChunkLoader::new(&store);
        let diff: Vec<_> = TreeDiff::new(&loader, &left, &right)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].key, b"key002000".to_vec());
        assert!(
            (loader.num_cached() as u64) < total_chunks / 4,
            "diff loaded {} of {total_chunks} chunks",
            loader.num_cached()
        );
    }
}
