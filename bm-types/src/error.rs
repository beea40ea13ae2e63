use thiserror::Error;

/// Errors raised by the wire-level primitives in this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A value did not fit in the 30-bit varint payload space.
    #[error("varint overflow: {0} does not fit in 30 bits")]
    VarintOverflow(u64),
    /// A varint-prefixed buffer ended before its declared payload width.
    #[error("truncated varint: expected {expected} more byte(s)")]
    TruncatedVarint {
        /// Bytes still required to complete the payload.
        expected: usize,
    },
    /// A length-prefixed sequence's buffer ended before the declared count.
    #[error("truncated buffer: expected {expected} more byte(s)")]
    TruncatedBuffer {
        /// Bytes still required.
        expected: usize,
    },
    /// An enum discriminant tag did not match any known variant.
    #[error("unknown discriminant tag {tag}")]
    UnknownDiscriminant {
        /// The tag value that failed to match.
        tag: u64,
    },
}

/// Convenience alias for wire-level results.
pub type Result<T, E = Error> = core::result::Result<T, E>;
