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

//! Chunking parameters.
//!
//! The window, pattern and size cap decide every chunk boundary and with
//! them every hash in the store. They are chosen at store creation, recorded
//! in store metadata, and must never change afterwards: two stores with
//! different parameters produce different hashes and must not be mixed.

use integer_encoding::VarInt;

use crate::error::Error;

/// Metadata key under which a store records its chunking parameters
pub const CHUNK_CONFIG_META_KEY: &[u8] = b"chunking-config";

/// Rolling-hash window width in bytes
pub const DEFAULT_CHUNK_WINDOW: u32 = 64;
/// Boundary pattern: lower twelve bits set
pub const DEFAULT_CHUNK_PATTERN: u32 = (1 << 12) - 1;
/// Hard cap on chunk size
pub const DEFAULT_MAX_CHUNK_SIZE: u32 = 1 << 16;

/// Boundary-detection parameters, global per store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    pub window_size: u32,
    pub chunk_pattern: u32,
    pub max_chunk_size: u32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_CHUNK_WINDOW,
            chunk_pattern: DEFAULT_CHUNK_PATTERN,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

impl ChunkConfig {
    /// Serializes for the store metadata record.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(12);
        bytes.extend_from_slice(&self.window_size.encode_var_vec());
        bytes.extend_from_slice(&self.chunk_pattern.encode_var_vec());
        bytes.extend_from_slice(&self.max_chunk_size.encode_var_vec());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut pos = 0usize;
        let mut next = || -> Result<u32, Error> {
            let (value, read) = u32::decode_var(&bytes[pos..]).ok_or_else(|| {
                Error::CorruptChunk("truncated chunking config record".to_string())
            })?;
            pos += read;
            Ok(value)
        };
        let window_size = next()?;
        let chunk_pattern = next()?;
        let max_chunk_size = next()?;
        if window_size == 0 || max_chunk_size == 0 {
            return Err(Error::InvalidInput(
                "chunking config must have nonzero window and size cap".to_string(),
            ));
        }
        Ok(Self {
            window_size,
            chunk_pattern,
            max_chunk_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChunkConfig::default();
        assert_eq!(config.window_size, 64);
        assert_eq!(config.chunk_pattern, 0x0FFF);
        assert_eq!(config.max_chunk_size, 64 * 1024);
    }

    #[test]
    fn record_round_trip() {
        let config = ChunkConfig {
            window_size: 48,
            chunk_pattern: (1 << 10) - 1,
            max_chunk_size: 1 << 20,
        };
        assert_eq!(ChunkConfig::decode(&config.encode()).unwrap(), config);
    }

    #[test]
    fn rejects_degenerate_records() {
        assert!(ChunkConfig::decode(&[]).is_err());
        let zero_window = ChunkConfig {
            window_size: 0,
            ..ChunkConfig::default()
        };
        assert!(ChunkConfig::decode(&zero_window.encode()).is_err());
    }
}
