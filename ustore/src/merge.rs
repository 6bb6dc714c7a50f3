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

//! Three-way merge.
//!
//! Both sides are diffed against their common ancestor and the two change
//! streams merged key by key. A key changed on one side only takes that
//! side's change; a key changed identically on both sides stays; a key
//! changed differently is a conflict handed to the caller's resolver. The
//! winning changes re-run the tree builder on the destination's value.

use std::collections::{HashSet, VecDeque};

use itertools::{EitherOrBoth, Itertools};
use prolly::{CellNode, ChunkLoader, ChunkType, DiffEntry, Hash, TreeBuilder, TreeDiff};
use storage::ChunkStore;

use crate::error::Error;

/// A key both sides changed in different ways, with the value each history
/// sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub key: Vec<u8>,
    pub base: Option<Vec<u8>>,
    pub left: Option<Vec<u8>>,
    pub right: Option<Vec<u8>>,
}

/// What a resolver decided for one conflicting key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the destination's change
    KeepLeft,
    /// Take the merged-in side's change
    TakeRight,
    /// Write this value instead
    Value(Vec<u8>),
}

/// Nearest commit reachable from both heads, breadth-first over cell
/// parents. `None` when the histories share nothing.
pub(crate) fn common_ancestor<S: ChunkStore>(
    loader: &ChunkLoader<S>,
    ours: &Hash,
    theirs: &Hash,
) -> Result<Option<Hash>, Error> {
    let mut our_ancestors = HashSet::new();
    let mut queue = VecDeque::from([*ours]);
    while let Some(hash) = queue.pop_front() {
        if !our_ancestors.insert(hash) {
            continue;
        }
        let cell = CellNode::decode(loader.load(&hash)?)?;
        queue.extend(cell.parent1().copied());
        queue.extend(cell.parent2().copied());
    }

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([*theirs]);
    while let Some(hash) = queue.pop_front() {
        if our_ancestors.contains(&hash) {
            return Ok(Some(hash));
        }
        if !visited.insert(hash) {
            continue;
        }
        let cell = CellNode::decode(loader.load(&hash)?)?;
        queue.extend(cell.parent1().copied());
        queue.extend(cell.parent2().copied());
    }
    Ok(None)
}

/// Merges `theirs` into `ours` over the shared `base`, returning the new
/// value root. `resolver` is consulted per conflicting key; a `None` verdict
/// aborts with [`Error::MergeConflict`].
pub(crate) fn merge_value<S: ChunkStore>(
    builder: &TreeBuilder<S>,
    loader: &ChunkLoader<S>,
    kind: ChunkType,
    base_root: &Hash,
    our_root: &Hash,
    their_root: &Hash,
    resolver: &mut dyn FnMut(&MergeConflict) -> Option<Resolution>,
) -> Result<Hash, Error> {
    let ours: Vec<DiffEntry> =
        TreeDiff::new(loader, base_root, our_root)?.collect::<Result<_, _>>()?;
    let theirs: Vec<DiffEntry> =
        TreeDiff::new(loader, base_root, their_root)?.collect::<Result<_, _>>()?;

    let mut root = *our_root;
    for pair in ours
        .into_iter()
        .merge_join_by(theirs, |left, right| left.key.cmp(&right.key))
    {
        match pair {
            // our change is already part of the destination value
            EitherOrBoth::Left(_) => {}
            EitherOrBoth::Right(change) => {
                root = apply_change(builder, kind, &root, &change.key, change.right.as_deref())?;
            }
            EitherOrBoth::Both(our_change, their_change) => {
                if our_change.right == their_change.right {
                    continue;
                }
                let conflict = MergeConflict {
                    key: our_change.key,
                    base: our_change.left,
                    left: our_change.right,
                    right: their_change.right,
                };
                let resolution = resolver(&conflict)
                    .ok_or_else(|| Error::MergeConflict(conflict.key.clone()))?;
                root = match resolution {
                    Resolution::KeepLeft => root,
                    Resolution::TakeRight => apply_change(
                        builder,
                        kind,
                        &root,
                        &conflict.key,
                        conflict.right.as_deref(),
                    )?,
                    Resolution::Value(value) => {
                        apply_change(builder, kind, &root, &conflict.key, Some(&value))?
                    }
                };
            }
        }
    }
    Ok(root)
}

fn apply_change<S: ChunkStore>(
    builder: &TreeBuilder<S>,
    kind: ChunkType,
    root: &Hash,
    key: &[u8],
    value: Option<&[u8]>,
) -> Result<Hash, Error> {
    let root = match (kind, value) {
        (ChunkType::Map, Some(value)) => builder.map_put(root, key, value)?,
        (ChunkType::Map, None) => builder.map_remove(root, key)?,
        (ChunkType::Set, Some(_)) => builder.set_insert(root, key)?,
        (ChunkType::Set, None) => builder.set_remove(root, key)?,
        (other, _) => return Err(Error::MergeUnsupported(other)),
    };
    Ok(root)
}
