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

//! Entry cursors.
//!
//! A cursor walks the entries of all nodes at one tree height, left to
//! right, holding the spine of meta nodes above it. Height 0 walks leaf
//! entries; higher cursors walk the meta entries the write path splices.
//! Chunks load lazily through the operation's loader as the cursor crosses
//! node boundaries.

use storage::ChunkStore;

use crate::{
    error::Error,
    hash::Hash,
    loader::ChunkLoader,
    node::{MetaNode, Node},
    orderedkey::OrderedKey,
};

/// Number of meta levels above the leaves (0 for a single-leaf tree).
pub fn tree_height<S: ChunkStore>(loader: &ChunkLoader<S>, root: &Hash) -> Result<usize, Error> {
    let mut height = 0usize;
    let mut node = loader.load_node(root)?;
    while let Node::Meta(meta) = &node {
        if meta.num_entries() == 0 {
            return Err(Error::CorruptChunk("meta node with no children".to_string()));
        }
        let child = *meta.get_child_hash_by_entry(0);
        node = loader.load_node(&child)?;
        height += 1;
    }
    Ok(height)
}

/// The leaf chunk kind of a tree, found by walking its leftmost edge.
pub fn leaf_chunk_type<S: ChunkStore>(
    loader: &ChunkLoader<S>,
    root: &Hash,
) -> Result<crate::chunk::ChunkType, Error> {
    let mut node = loader.load_node(root)?;
    while let Node::Meta(meta) = &node {
        if meta.num_entries() == 0 {
            return Err(Error::CorruptChunk("meta node with no children".to_string()));
        }
        let child = *meta.get_child_hash_by_entry(0);
        node = loader.load_node(&child)?;
    }
    Ok(node.chunk_type())
}

/// Where a seek should land.
#[derive(Debug, Clone, Copy)]
pub enum SeekTarget<'k> {
    /// The first entry of the level
    Start,
    /// The first entry ordered at or after the key
    Key(&'k OrderedKey),
    /// The entry holding the element at this position
    Index(u64),
}

/// What an advance crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Still inside the same node
    Within,
    /// Stepped into the next node at this height
    NewChunk,
    /// Ran off the end of the level
    End,
}

#[derive(Debug, Clone)]
struct SpineStep {
    node: MetaNode,
    idx: usize,
}

/// A cursor over the entries at one height of a tree.
pub struct NodeCursor<'a, S: ChunkStore> {
    loader: &'a ChunkLoader<'a, S>,
    spine: Vec<SpineStep>,
    spine_len: usize,
    node: Node,
    idx: usize,
    done: bool,
}

impl<'a, S: ChunkStore> NodeCursor<'a, S> {
    /// Positions a cursor at `target` among the nodes `height` levels above
    /// the leaves.
    pub fn seek(
        loader: &'a ChunkLoader<'a, S>,
        root: &Hash,
        target: SeekTarget,
        height: usize,
    ) -> Result<Self, Error> {
        let total_height = tree_height(loader, root)?;
        if height > total_height {
            return Err(Error::InvalidInput(format!(
                "no level {height} in a tree of height {total_height}"
            )));
        }
        let spine_len = total_height - height;
        let mut spine = Vec::with_capacity(spine_len);
        let mut node = loader.load_node(root)?;
        let mut remaining = match target {
            SeekTarget::Index(position) => position,
            _ => 0,
        };

        for _ in 0..spine_len {
            let meta = match node {
                Node::Meta(meta) => meta,
                _ => return Err(Error::CorruptChunk("leaf where meta expected".to_string())),
            };
            let last = meta.num_entries() - 1;
            let idx = match target {
                SeekTarget::Start => 0,
                SeekTarget::Key(key) => meta.get_child_hash_by_key(key).1.min(last),
                SeekTarget::Index(_) => {
                    let idx = meta.get_child_hash_by_index(remaining).1.min(last);
                    remaining -= meta.num_elements_until_entry(idx);
                    idx
                }
            };
            let child = *meta.get_child_hash_by_entry(idx);
            spine.push(SpineStep { node: meta, idx });
            node = loader.load_node(&child)?;
        }

        let idx = match target {
            SeekTarget::Start => 0,
            SeekTarget::Key(key) => match &node {
                // splice cursors over meta levels descend, so clamp to the
                // child that would contain the key
                Node::Meta(meta) => {
                    let last = meta.num_entries() - 1;
                    meta.get_child_hash_by_key(key).1.min(last)
                }
                leaf => leaf.get_idx_for_key(key)?,
            },
            SeekTarget::Index(_) => match &node {
                Node::Meta(meta) => {
                    let last = meta.num_entries() - 1;
                    meta.get_child_hash_by_index(remaining).1.min(last)
                }
                leaf => {
                    let position = remaining as usize;
                    if position > leaf.num_entries() {
                        return Err(Error::InvalidInput(format!(
                            "position {position} past the end of the tree"
                        )));
                    }
                    position
                }
            },
        };

        let done = idx >= node.num_entries();
        Ok(Self {
            loader,
            spine,
            spine_len,
            node,
            idx,
            done,
        })
    }

    pub fn seek_start(
        loader: &'a ChunkLoader<'a, S>,
        root: &Hash,
        height: usize,
    ) -> Result<Self, Error> {
        Self::seek(loader, root, SeekTarget::Start, height)
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Entry position within the current node
    pub fn idx(&self) -> usize {
        self.idx
    }

    /// Whether the cursor ran off the end of its level
    pub fn done(&self) -> bool {
        self.done
    }

    /// Raw bytes of the current entry.
    ///
    /// Panics when the cursor is done.
    pub fn current_entry(&self) -> &[u8] {
        assert!(!self.done, "cursor is past the end");
        self.node.data(self.idx)
    }

    /// Ordered key of the current entry; `None` on blob leaves.
    pub fn current_key(&self) -> Option<OrderedKey> {
        if self.done {
            return None;
        }
        self.node.entry_key(self.idx)
    }

    pub fn at_chunk_start(&self) -> bool {
        self.idx == 0
    }

    /// Hash of the node the cursor stands in
    pub fn chunk_hash(&self) -> &Hash {
        self.node.hash()
    }

    /// Moves to the next entry, crossing node boundaries as needed.
    pub fn advance(&mut self) -> Result<Advance, Error> {
        if self.done {
            return Ok(Advance::End);
        }
        self.idx += 1;
        if self.idx < self.node.num_entries() {
            return Ok(Advance::Within);
        }
        let mut level = self.spine.len();
        loop {
            if level == 0 {
                self.done = true;
                return Ok(Advance::End);
            }
            level -= 1;
            if self.spine[level].idx + 1 < self.spine[level].node.num_entries() {
                self.spine[level].idx += 1;
                let child = *self.spine[level]
                    .node
                    .get_child_hash_by_entry(self.spine[level].idx);
                self.descend_leftmost(level, child)?;
                return Ok(Advance::NewChunk);
            }
        }
    }

    /// Levels of spine above this cursor; subtree skipping addresses them
    /// outermost-first.
    pub fn subtree_levels(&self) -> usize {
        self.spine.len()
    }

    /// Hash of the subtree the cursor is inside at spine `level`.
    pub fn subtree_hash(&self, level: usize) -> &Hash {
        let step = &self.spine[level];
        step.node.get_child_hash_by_entry(step.idx)
    }

    /// Whether the cursor stands at the very first entry of the subtree at
    /// spine `level`.
    pub fn at_subtree_start(&self, level: usize) -> bool {
        self.idx == 0 && self.spine[level + 1..].iter().all(|step| step.idx == 0)
    }

    /// Skips the whole subtree at spine `level`. The cursor must stand at
    /// its first entry.
    pub fn advance_subtree(&mut self, level: usize) -> Result<Advance, Error> {
        debug_assert!(self.at_subtree_start(level));
        let mut lvl = level;
        loop {
            if self.spine[lvl].idx + 1 < self.spine[lvl].node.num_entries() {
                self.spine[lvl].idx += 1;
                let child = *self.spine[lvl]
                    .node
                    .get_child_hash_by_entry(self.spine[lvl].idx);
                self.descend_leftmost(lvl, child)?;
                return Ok(Advance::NewChunk);
            }
            if lvl == 0 {
                self.idx = self.node.num_entries();
                self.done = true;
                return Ok(Advance::End);
            }
            lvl -= 1;
        }
    }

    fn descend_leftmost(&mut self, level: usize, child_hash: Hash) -> Result<(), Error> {
        self.spine.truncate(level + 1);
        let mut node = self.loader.load_node(&child_hash)?;
        while self.spine.len() < self.spine_len {
            let meta = match node {
                Node::Meta(meta) => meta,
                _ => return Err(Error::CorruptChunk("leaf where meta expected".to_string())),
            };
            let child = *meta.get_child_hash_by_entry(0);
            self.spine.push(SpineStep { node: meta, idx: 0 });
            node = self.loader.load_node(&child)?;
        }
        self.node = node;
        self.idx = 0;
        self.done = self.node.num_entries() == 0;
        Ok(())
    }
}
