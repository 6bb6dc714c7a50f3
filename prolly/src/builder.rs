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

//! The write path.
//!
//! Trees are built by streaming encoded entries through a pipeline of
//! per-level chunkers. Each level runs a rolling hasher over its entry
//! bytes; a crossed boundary cuts a chunk, stores it, and files its
//! `MetaEntry` with the level above. Mutations splice: the affected chunk's
//! prefix is replayed so boundaries re-align, deleted entries are skipped,
//! new entries fed, and the suffix replayed only until a cut lands on an old
//! chunk boundary, at which point the rest of the old tree is reused by
//! reference. Chunks reach the store strictly children-before-parents, and
//! a cooperative cancel flag is checked between emissions.
//!
//! Boundaries depend only on the bytes since the previous cut, so any
//! mutation history converges on the chunking a bulk build of the same
//! entries would produce. That is the determinism the whole store hangs off.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use ed::Encode;
use storage::ChunkStore;

use crate::{
    chunk::{Chunk, ChunkType},
    chunker::{ChunkInfo, NodeChunker},
    config::ChunkConfig,
    cursor::{leaf_chunk_type, tree_height, Advance, NodeCursor, SeekTarget},
    error::Error,
    hash::Hash,
    loader::ChunkLoader,
    node::{map, set, MetaEntry, MetaNode, Node},
    orderedkey::OrderedKey,
    rolling_hash::RollingHasher,
    segment::{FixedSegment, Segment, VarSegment},
};

/// Where a splice applies.
#[derive(Debug, Clone)]
pub enum SpliceAt {
    /// Ordered trees: at the first entry with key `>=` this
    Key(OrderedKey),
    /// Positional trees: at this element position
    Index(u64),
}

/// New entries handed to a splice, either pre-encoded or one entry per byte
/// for positional trees.
enum Inserts<'i> {
    Entries(&'i [Vec<u8>]),
    Bytes(&'i [u8]),
}

/// One level of the chunk pipeline: pending entry bytes plus the rolling
/// hasher deciding where they cut.
struct LevelChunker {
    chunker: NodeChunker,
    hasher: RollingHasher,
    buf: Vec<u8>,
    offsets: Vec<usize>,
    chunks_cut: usize,
}

impl LevelChunker {
    fn new(chunker: NodeChunker, config: &ChunkConfig) -> Self {
        Self {
            chunker,
            hasher: RollingHasher::new(config),
            buf: Vec::new(),
            offsets: Vec::new(),
            chunks_cut: 0,
        }
    }

    /// Feeds one entry; cuts and returns a chunk when the hasher crossed a
    /// boundary inside it.
    fn append(&mut self, entry: &[u8]) -> Result<Option<ChunkInfo>, Error> {
        if self.chunker != NodeChunker::Blob {
            self.offsets.push(self.buf.len());
        }
        self.buf.extend_from_slice(entry);
        self.hasher.hash_bytes(entry);
        if self.hasher.crossed_boundary() {
            self.cut().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Cuts whatever is pending into a chunk; legal on an empty buffer,
    /// which produces the empty leaf chunk.
    fn cut(&mut self) -> Result<ChunkInfo, Error> {
        let info = {
            let segment = if self.chunker == NodeChunker::Blob {
                Segment::Fixed(FixedSegment::new(&self.buf, 1))
            } else {
                Segment::Var(VarSegment::new(&self.buf, std::mem::take(&mut self.offsets)))
            };
            self.chunker.make(&[segment])?
        };
        self.buf.clear();
        self.offsets.clear();
        self.hasher.reset();
        self.chunks_cut += 1;
        Ok(info)
    }

    fn flush(&mut self) -> Result<Option<ChunkInfo>, Error> {
        if self.buf.is_empty() {
            Ok(None)
        } else {
            self.cut().map(Some)
        }
    }

    fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }
}

struct LevelOutcome {
    emitted: Vec<MetaEntry>,
    consumed_chunks: usize,
}

/// Builds and rebuilds trees against a chunk store.
pub struct TreeBuilder<'a, S: ChunkStore> {
    store: &'a S,
    loader: &'a ChunkLoader<'a, S>,
    config: ChunkConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, S: ChunkStore> TreeBuilder<'a, S> {
    pub fn new(store: &'a S, loader: &'a ChunkLoader<'a, S>, config: ChunkConfig) -> Self {
        Self {
            store,
            loader,
            config,
            cancel: None,
        }
    }

    /// Installs a cooperative cancellation flag, checked between chunk
    /// emissions.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Builds a fresh tree from encoded leaf entries. Entries must already
    /// be in their final order.
    pub fn build<I>(&self, leaf_kind: ChunkType, entries: I) -> Result<Hash, Error>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut levels = vec![LevelChunker::new(NodeChunker::for_leaf(leaf_kind)?, &self.config)];
        for entry in entries {
            self.append_at(&mut levels, 0, entry.as_ref())?;
        }
        self.finish(levels)
    }

    /// Builds a map from key/value pairs in strictly increasing key order.
    pub fn build_map<I>(&self, entries: I) -> Result<Hash, Error>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        let mut levels = vec![LevelChunker::new(NodeChunker::Map, &self.config)];
        let mut last_key: Option<Vec<u8>> = None;
        let mut entry = Vec::new();
        for (key, value) in entries {
            if last_key.as_deref().map_or(false, |prev| prev >= key.as_slice()) {
                return Err(Error::InvalidInput(
                    "map entries must arrive in strictly increasing key order".to_string(),
                ));
            }
            entry.clear();
            map::encode_entry(&mut entry, &key, &value);
            self.append_at(&mut levels, 0, &entry)?;
            last_key = Some(key);
        }
        self.finish(levels)
    }

    /// Builds a set from items in strictly increasing order.
    pub fn build_set<I>(&self, items: I) -> Result<Hash, Error>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut levels = vec![LevelChunker::new(NodeChunker::Set, &self.config)];
        let mut last_item: Option<Vec<u8>> = None;
        let mut entry = Vec::new();
        for item in items {
            if last_item
                .as_deref()
                .map_or(false, |prev| prev >= item.as_slice())
            {
                return Err(Error::InvalidInput(
                    "set items must arrive in strictly increasing order".to_string(),
                ));
            }
            entry.clear();
            set::encode_entry(&mut entry, &item);
            self.append_at(&mut levels, 0, &entry)?;
            last_item = Some(item);
        }
        self.finish(levels)
    }

    /// Builds a blob over raw bytes.
    pub fn build_blob(&self, bytes: &[u8]) -> Result<Hash, Error> {
        self.build(ChunkType::Blob, bytes.chunks(1))
    }

    /// Inserts or replaces one map entry.
    pub fn map_put(&self, root: &Hash, key: &[u8], value: &[u8]) -> Result<Hash, Error> {
        let ordered = OrderedKey::ByBytes(key.to_vec());
        let cursor = NodeCursor::seek(self.loader, root, SeekTarget::Key(&ordered), 0)?;
        let existing = match cursor.node() {
            Node::Map(node) => {
                (!cursor.done() && node.key(cursor.idx()) == key).then(|| node.value(cursor.idx()))
            }
            _ => {
                return Err(Error::InvalidInput(
                    "map_put against a tree that is not a map".to_string(),
                ))
            }
        };
        if existing == Some(value) {
            return Ok(*root);
        }
        let replace = u64::from(existing.is_some());
        let mut entry = Vec::new();
        map::encode_entry(&mut entry, key, value);
        self.splice(
            root,
            SpliceAt::Key(ordered),
            replace,
            Inserts::Entries(&[entry]),
        )
    }

    /// Removes one map entry; absent keys leave the root untouched.
    pub fn map_remove(&self, root: &Hash, key: &[u8]) -> Result<Hash, Error> {
        let ordered = OrderedKey::ByBytes(key.to_vec());
        let cursor = NodeCursor::seek(self.loader, root, SeekTarget::Key(&ordered), 0)?;
        let present = match cursor.node() {
            Node::Map(node) => !cursor.done() && node.key(cursor.idx()) == key,
            _ => {
                return Err(Error::InvalidInput(
                    "map_remove against a tree that is not a map".to_string(),
                ))
            }
        };
        if !present {
            return Ok(*root);
        }
        self.splice(root, SpliceAt::Key(ordered), 1, Inserts::Entries(&[]))
    }

    /// Adds one set item; present items leave the root untouched.
    pub fn set_insert(&self, root: &Hash, item: &[u8]) -> Result<Hash, Error> {
        let ordered = OrderedKey::ByBytes(item.to_vec());
        let cursor = NodeCursor::seek(self.loader, root, SeekTarget::Key(&ordered), 0)?;
        let present = match cursor.node() {
            Node::Set(node) => !cursor.done() && node.item(cursor.idx()) == item,
            _ => {
                return Err(Error::InvalidInput(
                    "set_insert against a tree that is not a set".to_string(),
                ))
            }
        };
        if present {
            return Ok(*root);
        }
        let mut entry = Vec::new();
        set::encode_entry(&mut entry, item);
        self.splice(root, SpliceAt::Key(ordered), 0, Inserts::Entries(&[entry]))
    }

    /// Drops one set item; absent items leave the root untouched.
    pub fn set_remove(&self, root: &Hash, item: &[u8]) -> Result<Hash, Error> {
        let ordered = OrderedKey::ByBytes(item.to_vec());
        let cursor = NodeCursor::seek(self.loader, root, SeekTarget::Key(&ordered), 0)?;
        let present = match cursor.node() {
            Node::Set(node) => !cursor.done() && node.item(cursor.idx()) == item,
            _ => {
                return Err(Error::InvalidInput(
                    "set_remove against a tree that is not a set".to_string(),
                ))
            }
        };
        if !present {
            return Ok(*root);
        }
        self.splice(root, SpliceAt::Key(ordered), 1, Inserts::Entries(&[]))
    }

    /// Splices raw bytes into a blob: deletes `n_delete` bytes at `pos` and
    /// inserts `bytes` there.
    pub fn blob_splice(
        &self,
        root: &Hash,
        pos: u64,
        n_delete: u64,
        bytes: &[u8],
    ) -> Result<Hash, Error> {
        if self.leaf_kind(root)? != ChunkType::Blob {
            return Err(Error::InvalidInput(
                "blob splice against a tree that is not a blob".to_string(),
            ));
        }
        self.splice(root, SpliceAt::Index(pos), n_delete, Inserts::Bytes(bytes))
    }

    /// Appends bytes to a blob.
    pub fn blob_append(&self, root: &Hash, bytes: &[u8]) -> Result<Hash, Error> {
        let total = self.loader.load_node(root)?.num_elements();
        self.blob_splice(root, total, 0, bytes)
    }

    /// Rebuilds a tree around one splice, reusing every chunk the mutation
    /// does not reach.
    fn splice(
        &self,
        root: &Hash,
        target: SpliceAt,
        n_delete: u64,
        new_entries: Inserts,
    ) -> Result<Hash, Error> {
        let height = tree_height(self.loader, root)?;
        let leaf_kind = self.leaf_kind(root)?;

        let mut n_delete = n_delete as usize;
        let mut meta_inserts: Vec<Vec<u8>> = Vec::new();
        for level in 0..=height {
            let seek_target = match &target {
                SpliceAt::Key(key) => SeekTarget::Key(key),
                SpliceAt::Index(position) => SeekTarget::Index(*position),
            };
            let cursor = NodeCursor::seek(self.loader, root, seek_target, level)?;
            let kind = if level == 0 {
                NodeChunker::for_leaf(leaf_kind)?
            } else {
                NodeChunker::Meta
            };
            let inserts = if level == 0 {
                // the caller's entries
                match &new_entries {
                    Inserts::Entries(entries) => Inserts::Entries(*entries),
                    Inserts::Bytes(bytes) => Inserts::Bytes(*bytes),
                }
            } else {
                Inserts::Entries(meta_inserts.as_slice())
            };

            let outcome = self.splice_level(cursor, kind, &inserts, n_delete)?;
            if outcome.emitted.is_empty() && outcome.consumed_chunks == 0 {
                // nothing moved at this level, so nothing can move above it
                return Ok(*root);
            }
            if level == height {
                return self.reduce(leaf_kind, outcome.emitted);
            }
            n_delete = outcome.consumed_chunks;
            meta_inserts = outcome
                .emitted
                .iter()
                .map(Encode::encode)
                .collect::<ed::Result<_>>()?;
        }
        unreachable!("splice always returns at the root level")
    }

    /// Splices one tree level: prefix replay, deletion, insertion, then
    /// suffix replay until a cut re-aligns with an old chunk boundary.
    fn splice_level(
        &self,
        mut cursor: NodeCursor<'a, S>,
        kind: NodeChunker,
        inserts: &Inserts,
        mut n_delete: usize,
    ) -> Result<LevelOutcome, Error> {
        let mut lc = LevelChunker::new(kind, &self.config);
        let mut emitted = Vec::new();
        let mut consumed = 0usize;
        let mut touched = false;

        // replay the prefix of the chunk holding the splice point
        for idx in 0..cursor.idx() {
            let bytes = cursor.node().data(idx);
            self.feed(&mut lc, &mut emitted, bytes)?;
            touched = true;
        }

        // drop deleted entries, crossing chunks as needed
        while n_delete > 0 {
            if cursor.done() {
                return Err(Error::InvalidInput(
                    "deletion runs past the end of the tree".to_string(),
                ));
            }
            touched = true;
            n_delete -= 1;
            if cursor.advance()? == Advance::NewChunk {
                consumed += 1;
                touched = false;
            }
        }

        // feed the new entries
        match inserts {
            Inserts::Entries(entries) => {
                for entry in *entries {
                    self.feed(&mut lc, &mut emitted, entry)?;
                }
            }
            Inserts::Bytes(bytes) => {
                for byte in bytes.iter() {
                    self.feed(&mut lc, &mut emitted, std::slice::from_ref(byte))?;
                }
            }
        }

        // replay the suffix until a cut lands on an old boundary
        while !cursor.done() {
            if cursor.at_chunk_start() && !lc.has_pending() && !touched {
                // aligned: every remaining chunk at this level is reused
                return Ok(LevelOutcome {
                    emitted,
                    consumed_chunks: consumed,
                });
            }
            touched = true;
            let bytes = cursor.current_entry().to_vec();
            self.feed(&mut lc, &mut emitted, &bytes)?;
            if cursor.advance()? == Advance::NewChunk {
                consumed += 1;
                touched = false;
            }
        }

        if let Some(info) = lc.flush()? {
            self.emit_chunk(&info.chunk)?;
            emitted.push(info.meta_entry);
        }
        if touched {
            consumed += 1;
        }
        Ok(LevelOutcome {
            emitted,
            consumed_chunks: consumed,
        })
    }

    /// Folds the entries emitted at the old root level into a single root.
    fn reduce(&self, leaf_kind: ChunkType, emitted: Vec<MetaEntry>) -> Result<Hash, Error> {
        match emitted.len() {
            0 => {
                // the splice deleted the whole tree
                let mut level =
                    LevelChunker::new(NodeChunker::for_leaf(leaf_kind)?, &self.config);
                let info = level.cut()?;
                self.emit_chunk(&info.chunk)?;
                Ok(*info.chunk.hash())
            }
            1 => self.flatten(emitted[0].child_hash),
            _ => {
                let mut levels = vec![LevelChunker::new(NodeChunker::Meta, &self.config)];
                for meta_entry in &emitted {
                    self.append_at(&mut levels, 0, &meta_entry.encode()?)?;
                }
                self.finish(levels)
            }
        }
    }

    /// Feeds one entry at `level`, cascading cut chunks upward.
    fn append_at(
        &self,
        levels: &mut Vec<LevelChunker>,
        level: usize,
        entry: &[u8],
    ) -> Result<(), Error> {
        let mut level = level;
        let mut pending: Option<Vec<u8>> = None;
        loop {
            while levels.len() <= level {
                levels.push(LevelChunker::new(NodeChunker::Meta, &self.config));
            }
            let bytes = match &pending {
                Some(encoded) => encoded.as_slice(),
                None => entry,
            };
            match levels[level].append(bytes)? {
                None => return Ok(()),
                Some(info) => {
                    self.emit_chunk(&info.chunk)?;
                    pending = Some(info.meta_entry.encode()?);
                    level += 1;
                }
            }
        }
    }

    /// Flushes the pipeline bottom-up and names the root.
    fn finish(&self, mut levels: Vec<LevelChunker>) -> Result<Hash, Error> {
        let mut level = 0usize;
        loop {
            match levels[level].flush()? {
                Some(info) => {
                    self.emit_chunk(&info.chunk)?;
                    if level + 1 == levels.len() {
                        debug_assert_eq!(levels[level].chunks_cut, 1);
                        return self.flatten(*info.chunk.hash());
                    }
                    let encoded = info.meta_entry.encode()?;
                    self.append_at(&mut levels, level + 1, &encoded)?;
                }
                None if levels[level].chunks_cut == 0 => {
                    // an entirely empty build: the root is one empty leaf
                    debug_assert_eq!(level, 0);
                    let info = levels[level].cut()?;
                    self.emit_chunk(&info.chunk)?;
                    return Ok(*info.chunk.hash());
                }
                None => {}
            }
            level += 1;
        }
    }

    /// Collapses unary meta roots so no internal node has a single child.
    fn flatten(&self, mut root: Hash) -> Result<Hash, Error> {
        loop {
            let chunk = self.loader.load(&root)?;
            if chunk.chunk_type() != ChunkType::Meta {
                return Ok(root);
            }
            let meta = MetaNode::decode(chunk)?;
            if meta.num_entries() != 1 {
                return Ok(root);
            }
            root = *meta.get_child_hash_by_entry(0);
        }
    }

    fn feed(
        &self,
        lc: &mut LevelChunker,
        emitted: &mut Vec<MetaEntry>,
        bytes: &[u8],
    ) -> Result<(), Error> {
        if let Some(info) = lc.append(bytes)? {
            self.emit_chunk(&info.chunk)?;
            emitted.push(info.meta_entry);
        }
        Ok(())
    }

    fn emit_chunk(&self, chunk: &Chunk) -> Result<(), Error> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
        }
        self.store.put(chunk.hash().as_bytes(), chunk.bytes())?;
        self.loader.cache_chunk(chunk);
        Ok(())
    }

    fn leaf_kind(&self, root: &Hash) -> Result<ChunkType, Error> {
        leaf_chunk_type(self.loader, root)
    }
}
