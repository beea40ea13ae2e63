//! Endianness tagging for integer encode/decode operations (`spec.md` §4.5).

use bm_types::{Decode, Encode};

/// The byte order an `ENCODE_INT`/`DECODE_INT` (or vector variant) uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum Endian {
    /// Byte order fixed at compile time.
    Big,
    /// Byte order fixed at compile time.
    Little,
    /// Byte order read from a runtime boolean (`IS_LITTLE_ENDIAN`'s `ref` operand).
    Dynamic,
}

impl Endian {
    /// Whether this tag requires a runtime `ref` operand on the owning [`crate::Code`].
    pub const fn is_dynamic(self) -> bool {
        matches!(self, Endian::Dynamic)
    }
}
