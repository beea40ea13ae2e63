//! Small closed tag sets and bitflags carried by the less common
//! [`crate::Code`] operand slots (`spec.md` §3).

use bitflags::bitflags;
use bm_types::{Decode, Encode};

bitflags! {
    /// Modifiers on an `ENCODE_INT_VECTOR`/`ENCODE_INT_VECTOR_FIXED` emission.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EncodeFlags: u8 {
        /// The vector is terminated by a known sentinel value rather than a length prefix.
        const CONSTANT_TERMINATED = 1 << 0;
        /// A `LENGTH_CHECK` must run before the elements are written.
        const LENGTH_PREFIXED = 1 << 1;
    }
}

bitflags! {
    /// Modifiers on a `DECODE_INT_VECTOR`/`DECODE_INT_VECTOR_UNTIL_EOF` emission.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DecodeFlags: u8 {
        /// Stop decoding once the constant sentinel value is peeked (`PEEK_INT_VECTOR`).
        const CONSTANT_TERMINATED = 1 << 0;
        /// Stop decoding once the input is exhausted (`CAN_READ` returns false).
        const EOF_TERMINATED = 1 << 1;
    }
}

impl Encode for EncodeFlags {
    fn encode<O: bm_types::Output + ?Sized>(&self, out: &mut O) -> bm_types::Result<()> {
        self.bits().encode(out)
    }
}

impl Decode for EncodeFlags {
    fn decode(input: &mut bm_types::Input<'_>) -> bm_types::Result<Self> {
        let bits = u8::decode(input)?;
        Ok(EncodeFlags::from_bits_truncate(bits))
    }
}

impl Encode for DecodeFlags {
    fn encode<O: bm_types::Output + ?Sized>(&self, out: &mut O) -> bm_types::Result<()> {
        self.bits().encode(out)
    }
}

impl Decode for DecodeFlags {
    fn decode(input: &mut bm_types::Input<'_>) -> bm_types::Result<Self> {
        let bits = u8::decode(input)?;
        Ok(DecodeFlags::from_bits_truncate(bits))
    }
}

/// Selects how a bit-field group's packed operation computes its byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum PackedOpType {
    /// Every member's width is a compile-time constant; the group's total byte span is fixed.
    Fixed,
    /// At least one member's width depends on a runtime value; the span is computed per-instance.
    Variable,
}

/// Selects what a `BEGIN_*_SUB_RANGE` bounds its window by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum SubRangeType {
    /// The window spans exactly `ref` bytes.
    ByteLength,
    /// The window spans the remainder of the enclosing range or buffer.
    Remaining,
}

/// Which kind of callable a `DEFINE_FUNCTION` block introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum FuncType {
    /// A synthesized per-format encoder, targeted by `CALL_ENCODE`.
    Encoder,
    /// A synthesized per-format decoder, targeted by `CALL_DECODE`.
    Decoder,
    /// A synthesized discriminated-union property getter/setter.
    Property,
    /// A function written directly in the source format description.
    UserDefined,
}

/// How a run of `CONDITIONAL_FIELD`s collapses into one synthesized property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum MergeMode {
    /// All arms share a single common storage type; the merged property exposes that type directly.
    CommonType,
}

/// The phase at which a conditional check (`FIELD_AVAILABLE`, a bit-field
/// group's validity) is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum CheckAt {
    Encode,
    Decode,
    Both,
}

/// Which storage-to-storage conversion a `CAST`/`CALL_CAST` performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum CastType {
    /// Sign- or zero-extend to a wider integer storage.
    IntWiden,
    /// Truncate to a narrower integer storage.
    IntNarrow,
    /// Convert an integer value to a floating-point storage.
    IntToFloat,
    /// Convert a floating-point value to an integer storage (truncating).
    FloatToInt,
    /// Read an enum's underlying integer value.
    EnumToInt,
    /// Build an enum from an underlying integer value, failing on an unknown discriminant.
    IntToEnum,
    /// `false`/`true` to `0`/`1`.
    BoolToInt,
    /// Nonzero/zero to `true`/`false`.
    IntToBool,
    /// Reinterpret an integer's bit pattern as a float of the same width, or vice versa.
    FloatBitReinterpret,
}
