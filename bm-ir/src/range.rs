//! Byte ranges for sub-range encode/decode windows (`spec.md` §3's
//! `BEGIN_ENCODE_SUB_RANGE`/`BEGIN_DECODE_SUB_RANGE` family).

use bm_types::{Decode, Encode};

/// A half-open byte window `[start, start + len)` within the enclosing
/// buffer, as tracked by the sub-range lowering in `bm-core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Range {
    pub start: u64,
    pub len: u64,
}

impl Range {
    /// Builds a range covering `[start, start + len)`.
    pub const fn new(start: u64, len: u64) -> Self {
        Range { start, len }
    }

    /// The first byte offset outside this range.
    pub const fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Whether `offset` falls within this range.
    pub const fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end()
    }
}
