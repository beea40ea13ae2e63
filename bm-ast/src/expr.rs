//! Expression nodes (`spec.md` §4.5, §6's AST input contract).

use serde::{Deserialize, Serialize};

use crate::ident::Ident;
use crate::types::TypeExpr;

/// A binary operator, as written in the AST (before lowering to [`bm_ir::BinOp`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LeftShift,
    RightShift,
    /// The source's `left_arithmetic_shift` — preserved verbatim per `spec.md` §9's open question.
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
    /// Plain `a = b`.
    Assign,
    /// A compound assignment (`+=`, `<<=`, …); `AssignCompound(op)` names the underlying operator.
    AssignCompound(Box<BinaryOp>),
    /// `a := b` / `const a = b` — introduces a new binding rather than assigning an existing one.
    DefineAssign,
    ConstAssign,
    /// `a[] += b` lowered to an indexed append.
    AppendAssign,
    /// `for x in y` membership, handled entirely by loop lowering.
    InAssign,
    /// `a, b` — evaluates both, yields the right operand.
    Comma,
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    BitNot,
}

/// An I/O primitive exposed by the upstream AST for reading/writing the
/// underlying stream directly (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoMethod {
    InputBackward,
    InputOffset,
    InputBitOffset,
    InputGet,
    OutputPut,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expr {
    IntLiteral {
        value: i64,
        expr_type: TypeExpr,
    },
    /// A literal outside the varint range; lowered to `IMMEDIATE_INT64`.
    Int64Literal {
        value: i64,
        expr_type: TypeExpr,
    },
    BoolLiteral {
        value: bool,
    },
    CharLiteral {
        value: char,
    },
    StrLiteral {
        value: String,
    },
    /// A type used as a value, e.g. `cast`'s target.
    TypeLiteral {
        value: Box<TypeExpr>,
    },
    Ident(Ident),
    Paren {
        inner: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        expr_type: TypeExpr,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        expr_type: TypeExpr,
    },
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
        expr_type: TypeExpr,
    },
    Cast {
        target: TypeExpr,
        expr: Box<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        expr_type: TypeExpr,
    },
    MemberAccess {
        base: Box<Expr>,
        member: String,
        expr_type: TypeExpr,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        expr_type: TypeExpr,
    },
    /// `available(target)` — queries whether an optional/union arm currently holds a value.
    Available {
        target: Box<Expr>,
    },
    /// A direct stream I/O primitive.
    IoOperation {
        method: IoMethod,
        args: Vec<Expr>,
    },
    /// Marks that the enclosing block's trailing expression is its value,
    /// the way a Rust block's final expression is its tail value.
    ImplicitYield {
        value: Box<Expr>,
    },
    /// A pass-through reference to "the value currently being processed"
    /// (the implicit subject of a bare encode/decode expression).
    Identity,
}
