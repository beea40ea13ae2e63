//! Derive macros for binmod's wire `Encode`/`Decode` traits.
//!
//! Mirrors the split in the teacher's `fuel_derive` crate (separate
//! `serialize`/`deserialize` modules driven by `synstructure`), narrowed to
//! the shape the binary module's side tables actually need: fields encoded
//! in declaration order, enums prefixed by a varint discriminant.

#![deny(unused_must_use)]

extern crate proc_macro;

mod decode;
mod encode;

use self::{decode::decode_derive, encode::encode_derive};

synstructure::decl_derive!(
    [Encode] =>
    /// Derives `bm_derive::Encode` for the given `struct` or `enum`.
    encode_derive
);
synstructure::decl_derive!(
    [Decode] =>
    /// Derives `bm_derive::Decode` for the given `struct` or `enum`.
    decode_derive
);
