//! Minimal `Output`/`Input` wire traits shared by the module serializer and
//! the `#[derive(Encode, Decode)]` macros in `bm-derive`. Modeled on the
//! `Output`/`Serialize` split in the teacher's `fuel_types::canonical`.

use crate::error::{Error, Result};
use crate::varint::Varint;

/// A sink that accepts raw bytes. `Vec<u8>` is the only implementor used by
/// this crate; the trait exists so `bm-derive`-generated code doesn't need
/// to know the concrete buffer type.
pub trait Output {
    /// Appends raw bytes to the stream.
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Appends a single byte.
    fn write_u8(&mut self, byte: u8) {
        self.write_bytes(&[byte]);
    }

    /// Appends a varint-encoded integer.
    fn write_varint(&mut self, value: u64) -> Result<()> {
        let v = Varint::encode(value)?;
        self.write_bytes(&v.to_bytes());
        Ok(())
    }

    /// Appends a length-prefixed byte string (varint length, then bytes).
    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_varint(s.len() as u64)?;
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

impl Output for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// A cursor over an immutable byte slice, used to parse the on-disk BM.
#[derive(Debug, Clone, Copy)]
pub struct Input<'a> {
    buf: &'a [u8],
}

impl<'a> Input<'a> {
    /// Wraps a byte slice for sequential reading.
    pub fn new(buf: &'a [u8]) -> Self {
        Input { buf }
    }

    /// Remaining unread bytes.
    pub fn remaining(&self) -> &'a [u8] {
        self.buf
    }

    /// True if every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Reads and consumes a varint.
    pub fn read_varint(&mut self) -> Result<Varint> {
        let (v, rest) = Varint::decode(self.buf)?;
        self.buf = rest;
        Ok(v)
    }

    /// Reads and consumes exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::TruncatedBuffer {
                expected: n - self.buf.len(),
            });
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_varint()?.as_usize();
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Writes a length-prefixed sequence: a varint count followed by each
/// element written with `write_one`. This is the shape every table in the
/// on-disk BM uses (`spec.md` §6).
pub fn write_sequence<T, O: Output>(
    out: &mut O,
    items: &[T],
    mut write_one: impl FnMut(&mut O, &T) -> Result<()>,
) -> Result<()> {
    out.write_varint(items.len() as u64)?;
    for item in items {
        write_one(out, item)?;
    }
    Ok(())
}

/// Reads a length-prefixed sequence written by [`write_sequence`].
pub fn read_sequence<T>(
    input: &mut Input<'_>,
    mut read_one: impl FnMut(&mut Input<'_>) -> Result<T>,
) -> Result<Vec<T>> {
    let len = input.read_varint()?.as_usize();
    let mut out = Vec::with_capacity(len.min(1 << 16));
    for _ in 0..len {
        out.push(read_one(input)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_round_trips() {
        let mut buf = Vec::new();
        write_sequence(&mut buf, &[1u64, 2, 3], |o, v| o.write_varint(*v)).unwrap();
        let mut input = Input::new(&buf);
        let items = read_sequence(&mut input, |i| Ok(i.read_varint()?.value())).unwrap();
        assert_eq!(items, vec![1, 2, 3]);
        assert!(input.is_empty());
    }

    #[test]
    fn string_round_trips() {
        let mut buf = Vec::new();
        buf.write_string("hello").unwrap();
        let mut input = Input::new(&buf);
        assert_eq!(input.read_string().unwrap(), "hello");
    }
}
