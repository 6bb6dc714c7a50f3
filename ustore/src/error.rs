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

//! Errors

use prolly::{ChunkConfig, ChunkType};

/// Store-level errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tree layer error
    #[error(transparent)]
    Prolly(#[from] prolly::Error),
    /// Backend error
    #[error(transparent)]
    Storage(#[from] storage::Error),
    /// Named branch does not exist
    #[error("branch not found: {0}")]
    BranchNotFound(String),
    /// Branch name already taken
    #[error("branch already exists: {0}")]
    BranchExists(String),
    /// Branch head points at a different value kind
    #[error("branch {branch} holds a {actual} value, expected {expected}")]
    WrongValueType {
        branch: String,
        expected: ChunkType,
        actual: ChunkType,
    },
    /// Three-way merge found a conflicting key and no resolver took it
    #[error("merge conflict on key {}", hex::encode(.0))]
    MergeConflict(Vec<u8>),
    /// Merge requested on a value kind that has no merge semantics
    #[error("merge is not defined on {0} values")]
    MergeUnsupported(ChunkType),
    /// The store was created under different chunking parameters
    #[error("store records chunking config {stored:?}, caller supplied {requested:?}")]
    ConfigMismatch {
        stored: ChunkConfig,
        requested: ChunkConfig,
    },
    /// Branch table record did not decode
    #[error("unable to decode branch table")]
    BranchTable(#[from] bincode::Error),
}
