//! The `Encode`/`Decode` traits implemented by `#[derive(bm_derive::Encode,
//! bm_derive::Decode)]` and by hand for the primitive wire types. Split out
//! from `io.rs` the way the teacher keeps `fuel_types::canonical::{Serialize,
//! Deserialize}` as the public trait surface re-exporting the sibling
//! `fuel_derive` proc-macros.

use crate::error::Result;
use crate::id::ObjectId;
use crate::io::{read_sequence, write_sequence, Input, Output};
use crate::varint::Varint;

// Derive macros and traits share a name but live in different namespaces,
// the same way `fuel_types::canonical` re-exports `fuel_derive::Serialize`
// right alongside its own `trait Serialize`.
pub use bm_derive::{Decode, Encode};

/// A type that can serialize itself onto an [`Output`] sink. Implemented by
/// hand for the primitive wire types below and by `#[derive(bm_derive::Encode)]`
/// for the IR's composite structs and enums.
pub trait Encode {
    /// Appends `self`'s wire representation to `out`.
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()>;
}

/// The mirror image of [`Encode`]: parses `Self` from an [`Input`] cursor.
pub trait Decode: Sized {
    /// Reads and consumes `Self`'s wire representation from `input`.
    fn decode(input: &mut Input<'_>) -> Result<Self>;
}

/// Encodes a value into a byte buffer using its `Encode` impl.
pub fn write<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    value.encode(&mut buf)?;
    Ok(buf)
}

/// Decodes a value from a byte buffer using its `Decode` impl, returning the
/// value and the number of bytes consumed.
pub fn read<T: Decode>(bytes: &[u8]) -> Result<(T, usize)> {
    let mut input = Input::new(bytes);
    let value = T::decode(&mut input)?;
    let consumed = bytes.len() - input.remaining().len();
    Ok((value, consumed))
}

impl Encode for bool {
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_u8(if *self { 1 } else { 0 });
        Ok(())
    }
}

impl Decode for bool {
    fn decode(input: &mut Input<'_>) -> Result<Self> {
        Ok(input.read_bytes(1)?[0] != 0)
    }
}

impl Encode for u8 {
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_u8(*self);
        Ok(())
    }
}

impl Decode for u8 {
    fn decode(input: &mut Input<'_>) -> Result<Self> {
        Ok(input.read_bytes(1)?[0])
    }
}

impl Encode for u32 {
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_varint(*self as u64)
    }
}

impl Decode for u32 {
    fn decode(input: &mut Input<'_>) -> Result<Self> {
        Ok(input.read_varint()?.value() as u32)
    }
}

impl Encode for u64 {
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_bytes(&self.to_be_bytes());
        Ok(())
    }
}

impl Decode for u64 {
    fn decode(input: &mut Input<'_>) -> Result<Self> {
        Ok(u64::from_be_bytes(input.read_bytes(8)?.try_into().expect("read_bytes(8) yields 8 bytes")))
    }
}

impl Encode for i64 {
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()> {
        (*self as u64).encode(out)
    }
}

impl Decode for i64 {
    fn decode(input: &mut Input<'_>) -> Result<Self> {
        Ok(u64::decode(input)? as i64)
    }
}

impl Encode for Varint {
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_bytes(&self.to_bytes());
        Ok(())
    }
}

impl Decode for Varint {
    fn decode(input: &mut Input<'_>) -> Result<Self> {
        input.read_varint()
    }
}

impl Encode for ObjectId {
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_varint(self.value())
    }
}

impl Decode for ObjectId {
    fn decode(input: &mut Input<'_>) -> Result<Self> {
        Ok(ObjectId::from_varint(input.read_varint()?))
    }
}

impl Encode for String {
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_string(self)
    }
}

impl Decode for String {
    fn decode(input: &mut Input<'_>) -> Result<Self> {
        input.read_string()
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()> {
        write_sequence(out, self, |o, item| item.encode(o))
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut Input<'_>) -> Result<Self> {
        read_sequence(input, T::decode)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<O: Output + ?Sized>(&self, out: &mut O) -> Result<()> {
        match self {
            Some(v) => {
                out.write_u8(1);
                v.encode(out)
            }
            None => {
                out.write_u8(0);
                Ok(())
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(input: &mut Input<'_>) -> Result<Self> {
        let tag = input.read_bytes(1)?[0];
        if tag == 0 {
            Ok(None)
        } else {
            Ok(Some(T::decode(input)?))
        }
    }
}
