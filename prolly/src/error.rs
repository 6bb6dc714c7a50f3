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

use crate::hash::Hash;

/// Errors surfaced by the chunked data layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Navigation referenced an absent entry
    #[error("key not found")]
    KeyNotFound,
    /// The store could not resolve a hash
    #[error("chunk not found: {0}")]
    HashNotFound(Hash),
    /// Header mismatch, unknown type byte, truncation or digest failure
    #[error("corrupted chunk: {0}")]
    CorruptChunk(String),
    /// Caller handed the core something it cannot act on
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Backend failure, surfaced with no translation
    #[error("storage error: {0}")]
    StorageError(#[from] storage::Error),
    /// Codec failure
    #[error("ed error: {0}")]
    EdError(#[from] ed::Error),
    /// Cooperative cancellation observed between chunk emissions
    #[error("operation cancelled")]
    Cancelled,
}
