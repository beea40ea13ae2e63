//! Type expression nodes (`spec.md` §4.4's `define_storage` input grammar).

use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::ident::Ident;

/// A type as written (or resolved) in the AST, input to `define_storage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TypeExpr {
    Bool,
    Int {
        bits: u32,
        signed: bool,
    },
    Float {
        bits: u32,
    },
    /// A fixed-content string/byte literal used as a type (e.g. a magic tag or terminator).
    StrLiteral {
        value: String,
    },
    /// An identifier reference that must be resolved by recursing on its base.
    Ident(Ident),
    /// A reference to a previously declared `Format`.
    Struct {
        base: Ident,
        recursive: bool,
        bit_size: Option<u64>,
    },
    /// A reference to a previously declared `Enum`.
    Enum {
        base: Ident,
    },
    /// The untagged-union *storage* view: a fixed set of alternative member types.
    StructUnion {
        members: Vec<TypeExpr>,
    },
    /// The discriminated-union *view*: conditions selecting which arm is active.
    Union {
        arms: Vec<UnionArm>,
        common_type: Option<Box<TypeExpr>>,
    },
    Array {
        element: Box<TypeExpr>,
        /// `None` means a dynamically-sized (`..`) array.
        length: Option<Box<Expr>>,
    },
    /// An indirect reference (pointer/box), as the upstream AST can express for recursive fields.
    Ptr {
        inner: Box<TypeExpr>,
    },
    Optional {
        inner: Box<TypeExpr>,
    },
}

/// One arm of a discriminated union's `Union` type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionArm {
    /// `None` for the catch-all "any range" arm.
    pub cond: Option<Expr>,
    /// `None` when this arm contributes no payload (unreachable in practice, permitted for parity with the upstream grammar).
    pub field: Option<Box<TypeExpr>>,
}
