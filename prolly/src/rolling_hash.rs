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

//! Content-defined chunk boundaries.
//!
//! A fixed-window buzhash runs over the byte stream; a boundary is declared
//! whenever the window hash matches the chunk pattern, or the size cap is
//! reached. Boundaries depend only on the bytes fed since the last reset,
//! never on stream position, which is what makes chunking converge across
//! differently-ordered mutation histories.

use crate::config::ChunkConfig;

/// Per-byte mixing table. Built once at compile time so every store on every
/// host agrees on it.
static BUZ_TABLE: [u32; 256] = buz_table();

const fn buz_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        // splitmix64 finalizer over the byte index, truncated to 32 bits
        let mut z = (i as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        table[i] = z as u32;
        i += 1;
    }
    table
}

/// Cyclic-polynomial hash over a fixed-width sliding window.
#[derive(Debug, Clone)]
struct BuzHash {
    window: Vec<u8>,
    pos: usize,
    filled: usize,
    state: u32,
    evict_rot: u32,
}

impl BuzHash {
    fn new(window_size: u32) -> Self {
        Self {
            window: vec![0u8; window_size as usize],
            pos: 0,
            filled: 0,
            state: 0,
            evict_rot: window_size % 32,
        }
    }

    fn hash_byte(&mut self, byte: u8) {
        self.state = self.state.rotate_left(1);
        if self.filled == self.window.len() {
            let evicted = self.window[self.pos];
            self.state ^= BUZ_TABLE[evicted as usize].rotate_left(self.evict_rot);
        } else {
            self.filled += 1;
        }
        self.state ^= BUZ_TABLE[byte as usize];
        self.window[self.pos] = byte;
        self.pos = (self.pos + 1) % self.window.len();
    }

    fn sum32(&self) -> u32 {
        self.state
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.filled = 0;
        self.state = 0;
    }
}

/// Decides where a byte stream splits into chunks.
///
/// The boundary flag is sticky: once crossed it stays set until [`reset`],
/// so callers may feed a whole entry and test afterwards. Fewer than
/// `window_size` bytes never cross; a stream hitting `max_chunk_size` crosses
/// with or without a pattern match.
///
/// [`reset`]: RollingHasher::reset
#[derive(Debug, Clone)]
pub struct RollingHasher {
    chunk_pattern: u32,
    window_size: usize,
    max_chunk_size: usize,
    buz: BuzHash,
    byte_hashed: usize,
    crossed_boundary: bool,
}

impl RollingHasher {
    pub fn new(config: &ChunkConfig) -> Self {
        Self {
            chunk_pattern: config.chunk_pattern,
            window_size: config.window_size as usize,
            max_chunk_size: config.max_chunk_size as usize,
            buz: BuzHash::new(config.window_size),
            byte_hashed: 0,
            crossed_boundary: false,
        }
    }

    pub fn hash_byte(&mut self, byte: u8) {
        self.byte_hashed += 1;
        self.buz.hash_byte(byte);
        self.crossed_boundary = self.byte_hashed >= self.window_size
            && (self.crossed_boundary
                || (self.buz.sum32() & self.chunk_pattern) == self.chunk_pattern
                || self.byte_hashed >= self.max_chunk_size);
    }

    pub fn hash_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.hash_byte(byte);
        }
    }

    pub fn crossed_boundary(&self) -> bool {
        self.crossed_boundary
    }

    /// Bytes fed since the last reset
    pub fn byte_hashed(&self) -> usize {
        self.byte_hashed
    }

    pub fn reset(&mut self) {
        self.buz.reset();
        self.byte_hashed = 0;
        self.crossed_boundary = false;
    }
}

impl Default for RollingHasher {
    fn default() -> Self {
        Self::new(&ChunkConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::*;

    fn boundary_positions(config: &ChunkConfig, data: &[u8]) -> Vec<usize> {
        let mut hasher = RollingHasher::new(config);
        let mut positions = Vec::new();
        for (pos, &byte) in data.iter().enumerate() {
            hasher.hash_byte(byte);
            if hasher.crossed_boundary() {
                positions.push(pos + 1);
                hasher.reset();
            }
        }
        positions
    }

    fn test_config() -> ChunkConfig {
        // small pattern so boundaries show up in kilobytes of data
        ChunkConfig {
            window_size: 16,
            chunk_pattern: (1 << 6) - 1,
            max_chunk_size: 1 << 12,
        }
    }

    #[test]
    fn short_streams_never_cross() {
        let config = ChunkConfig::default();
        let mut hasher = RollingHasher::new(&config);
        for byte in 0..63u8 {
            hasher.hash_byte(byte);
        }
        assert!(!hasher.crossed_boundary());
    }

    #[test]
    fn size_cap_forces_a_boundary() {
        let config = ChunkConfig {
            window_size: 16,
            chunk_pattern: u32::MAX, // unmatchable for all practical purposes
            max_chunk_size: 256,
        };
        let mut hasher = RollingHasher::new(&config);
        hasher.hash_bytes(&vec![0u8; 255]);
        assert!(!hasher.crossed_boundary());
        hasher.hash_byte(0);
        assert!(hasher.crossed_boundary());
        assert_eq!(hasher.byte_hashed(), 256);
    }

    #[test]
    fn boundary_flag_is_sticky_until_reset() {
        let config = test_config();
        let mut data = vec![0u8; 1 << 13];
        SmallRng::seed_from_u64(7).fill(data.as_mut_slice());

        let mut hasher = RollingHasher::new(&config);
        hasher.hash_bytes(&data);
        assert!(hasher.crossed_boundary());
        assert!(hasher.crossed_boundary());
        hasher.reset();
        assert!(!hasher.crossed_boundary());
        assert_eq!(hasher.byte_hashed(), 0);
    }

    #[test]
    fn feed_granularity_does_not_move_boundaries() {
        let config = test_config();
        let mut data = vec![0u8; 1 << 14];
        SmallRng::seed_from_u64(42).fill(data.as_mut_slice());

        let whole = boundary_positions(&config, &data);
        assert!(!whole.is_empty());

        // same stream fed in uneven pieces through hash_bytes
        let mut hasher = RollingHasher::new(&config);
        let mut positions = Vec::new();
        let mut consumed = 0usize;
        for piece in data.chunks(33) {
            for (offset, &byte) in piece.iter().enumerate() {
                hasher.hash_byte(byte);
                if hasher.crossed_boundary() {
                    positions.push(consumed + offset + 1);
                    hasher.reset();
                }
            }
            consumed += piece.len();
        }
        assert_eq!(whole, positions);
    }

    #[test]
    fn boundaries_are_a_pure_function_of_the_stream() {
        let config = test_config();
        let mut data = vec![0u8; 1 << 13];
        SmallRng::seed_from_u64(3).fill(data.as_mut_slice());

        // state never leaks across a reset: chunking the second half alone
        // gives the same cuts as chunking it after the first half, provided
        // the first half ends on a cut
        let positions = boundary_positions(&config, &data);
        let first_cut = positions[0];
        let tail_alone = boundary_positions(&config, &data[first_cut..]);
        let tail_in_stream: Vec<usize> = positions[1..]
            .iter()
            .map(|pos| pos - first_cut)
            .collect();
        assert_eq!(tail_alone, tail_in_stream);
    }
}
