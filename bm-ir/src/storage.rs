//! Type storage vectors: the flat linear representation of a type
//! (`spec.md` §3, §4.4).

use bm_types::{Encode, Decode, ObjectId, Varint};

/// One tag in a type descriptor vector.
///
/// Composite tags (`Array`, `Vector`, `Optional`, `Ptr`, `Variant`) are
/// followed in the owning [`Storages`] by their element/inner/member
/// storages; leaves (`Bool`, `Uint`, …) terminate a sub-sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub enum Storage {
    /// A boolean.
    Bool,
    /// An unsigned integer of `bits` width.
    Uint {
        /// Bit width; must be greater than zero.
        bits: Varint,
    },
    /// A signed integer of `bits` width.
    Int {
        /// Bit width; must be greater than zero.
        bits: Varint,
    },
    /// A floating-point number of `bits` width.
    Float {
        /// Bit width.
        bits: Varint,
    },
    /// A fixed-length array of `size` elements; the element storage(s) follow.
    Array {
        /// Element count.
        size: Varint,
    },
    /// A dynamically-sized vector; the element storage(s) follow.
    Vector,
    /// An optional value; the inner storage follows.
    Optional,
    /// An indirect (pointer/box/arena) reference; the inner storage follows.
    Ptr,
    /// A tagged union of `member_count` arms; `member_count` `StructRef`
    /// member storages follow.
    Variant {
        /// Number of member arms.
        member_count: Varint,
        /// The owning union's object id (`0` until `define_union` patches it in).
        reference: ObjectId,
    },
    /// A named enum; its underlying integer storage follows if statically known.
    Enum {
        /// The enum definition's object id.
        reference: ObjectId,
    },
    /// A reference to a non-recursive struct (format).
    StructRef {
        /// The format's object id.
        reference: ObjectId,
        /// Plus-one encoded bit width: `0` means "variable", `N + 1` means "exactly N bits".
        size_plus: Varint,
    },
    /// A reference to a self-referential struct, lowered as an indexed
    /// reference rather than an inline structural cycle (`spec.md` §9).
    RecursiveStructRef {
        /// The format's object id.
        reference: ObjectId,
    },
    /// The synthetic return type of an encode/decode coder function.
    CoderReturn,
    /// The synthetic return type of a union-member property setter.
    PropertySetterReturn,
}

/// A non-empty linear sequence of [`Storage`] records: a fully flattened type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Storages(pub Vec<Storage>);

impl Storages {
    /// Wraps a non-empty vector of storage records.
    ///
    /// # Panics
    /// Panics if `storages` is empty — a `Storages` always describes at
    /// least one tag (`spec.md` §3).
    pub fn new(storages: Vec<Storage>) -> Self {
        assert!(!storages.is_empty(), "a Storages vector must be non-empty");
        Storages(storages)
    }

    /// The leaf/prefix tags in declaration order.
    pub fn as_slice(&self) -> &[Storage] {
        &self.0
    }

    /// The byte-level key used to deduplicate storages in the type-interning
    /// table (`spec.md` §4.2's `get_storage_ref`).
    pub fn key(&self) -> Vec<u8> {
        bm_types::write(self).expect("Storages encoding never fails")
    }
}

/// An interned handle for a deduplicated [`Storages`] vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct StorageRef(pub ObjectId);

impl StorageRef {
    /// The underlying object id.
    pub fn id(&self) -> ObjectId {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_shape_storages_share_a_key() {
        let a = Storages::new(vec![Storage::Array {
            size: Varint::encode(4).unwrap(),
        }, Storage::Uint { bits: Varint::encode(8).unwrap() }]);
        let b = Storages::new(vec![Storage::Array {
            size: Varint::encode(4).unwrap(),
        }, Storage::Uint { bits: Varint::encode(8).unwrap() }]);
        let c = Storages::new(vec![Storage::Uint { bits: Varint::encode(16).unwrap() }]);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }
}
