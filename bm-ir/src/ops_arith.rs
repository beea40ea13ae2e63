//! Binary and unary operator tags carried by `BINARY`/`UNARY` [`crate::Code`]
//! records (`spec.md` §3's expression grammar).

use bm_types::{Decode, Encode};

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LeftShift,
    RightShift,
    /// Preserved mapping for the source's `left_arithmetic_shift_assign` branch (`spec.md` §9 open question).
    LeftArithmeticShift,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinOp {
    /// True for the comparison family, which always produces a `bool`.
    pub const fn is_comparison(self) -> bool {
        use BinOp::*;
        matches!(
            self,
            Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual
        )
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub enum UnOp {
    Negate,
    LogicalNot,
    BitNot,
}
