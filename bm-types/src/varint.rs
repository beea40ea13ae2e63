//! The 2-bit-prefix variable-length integer used throughout the IR and the
//! on-disk binary module (`spec.md` §4.1).

use crate::error::{Error, Result};

/// Maximum payload value representable by a varint (30-bit payload space).
pub const MAX_VALUE: u64 = (1 << 30) - 1;

const PREFIX_BITS: [(u8, u32, u64); 4] = [
    // (prefix, total payload bits, max value for this prefix)
    (0b00, 6, (1 << 6) - 1),
    (0b01, 14, (1 << 14) - 1),
    (0b10, 22, (1 << 22) - 1),
    (0b11, 30, (1 << 30) - 1),
];

/// A varint as it was (or will be) written to the wire.
///
/// `Varint` remembers which of the four prefix widths was chosen, not just
/// the decoded value, so that `decode(encode(v)) == v` reproduces the exact
/// byte length the original writer chose rather than always re-minimizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Varint {
    prefix: u8,
    value: u32,
}

impl Varint {
    /// Selects the narrowest prefix that fits `n` and builds a `Varint`.
    pub fn encode(n: u64) -> Result<Self> {
        for (prefix, _bits, max) in PREFIX_BITS {
            if n <= max {
                return Ok(Varint {
                    prefix,
                    value: n as u32,
                });
            }
        }
        Err(Error::VarintOverflow(n))
    }

    /// The decoded payload value.
    pub const fn value(&self) -> u64 {
        self.value as u64
    }

    /// The decoded payload value as `usize`, for indexing.
    pub const fn as_usize(&self) -> usize {
        self.value as usize
    }

    /// Number of bytes this varint occupies on the wire.
    pub const fn byte_len(&self) -> usize {
        match self.prefix {
            0b00 => 1,
            0b01 => 2,
            0b10 => 3,
            _ => 4,
        }
    }

    /// Serializes this varint to its big-endian byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let total_bits = PREFIX_BITS[self.prefix as usize].1;
        let shifted = (self.prefix as u32) << (total_bits) | self.value;
        let width = self.byte_len();
        let full = shifted.to_be_bytes();
        full[4 - width..].to_vec()
    }

    /// Reads a varint from the front of `buf`, returning it and the rest.
    pub fn decode(buf: &[u8]) -> Result<(Self, &[u8])> {
        let first = *buf
            .first()
            .ok_or(Error::TruncatedVarint { expected: 1 })?;
        let prefix = first >> 6;
        let width = match prefix {
            0b00 => 1,
            0b01 => 2,
            0b10 => 3,
            _ => 4,
        };
        if buf.len() < width {
            return Err(Error::TruncatedVarint {
                expected: width - buf.len(),
            });
        }
        let mut raw = [0u8; 4];
        raw[4 - width..].copy_from_slice(&buf[..width]);
        let word = u32::from_be_bytes(raw);
        let total_bits = PREFIX_BITS[prefix as usize].1;
        let mask = (1u32 << total_bits) - 1;
        let value = word & mask;
        Ok((Varint { prefix, value }, &buf[width..]))
    }
}

impl From<Varint> for u64 {
    fn from(v: Varint) -> u64 {
        v.value()
    }
}

impl TryFrom<u64> for Varint {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self> {
        Varint::encode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_prefix_boundary() {
        for &n in &[0u64, 1, 63, 64, 16383, 16384, 4194303, 4194304, MAX_VALUE] {
            let v = Varint::encode(n).unwrap();
            assert_eq!(v.value(), n);
            let bytes = v.to_bytes();
            let (decoded, rest) = Varint::decode(&bytes).unwrap();
            assert!(rest.is_empty());
            assert_eq!(decoded, v);
            assert_eq!(decoded.value(), n);
        }
    }

    #[test]
    fn chooses_narrowest_prefix() {
        assert_eq!(Varint::encode(0).unwrap().byte_len(), 1);
        assert_eq!(Varint::encode(63).unwrap().byte_len(), 1);
        assert_eq!(Varint::encode(64).unwrap().byte_len(), 2);
        assert_eq!(Varint::encode(16383).unwrap().byte_len(), 2);
        assert_eq!(Varint::encode(16384).unwrap().byte_len(), 3);
        assert_eq!(Varint::encode(4194303).unwrap().byte_len(), 3);
        assert_eq!(Varint::encode(4194304).unwrap().byte_len(), 4);
        assert_eq!(Varint::encode(MAX_VALUE).unwrap().byte_len(), 4);
    }

    #[test]
    fn overflow_above_30_bits() {
        assert_eq!(
            Varint::encode(MAX_VALUE + 1),
            Err(Error::VarintOverflow(MAX_VALUE + 1))
        );
    }

    #[test]
    fn decode_reports_truncation() {
        let v = Varint::encode(16384).unwrap();
        let bytes = v.to_bytes();
        assert!(Varint::decode(&bytes[..1]).is_err());
    }
}
