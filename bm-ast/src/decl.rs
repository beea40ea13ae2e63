//! Top-level and nested declaration nodes (`spec.md` §4.10, §6).

use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::ident::Ident;
use crate::stmt::Stmt;
use crate::types::TypeExpr;

/// The root AST node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub ident: Ident,
    #[serde(default)]
    pub imports: Vec<Import>,
    #[serde(default)]
    pub formats: Vec<Format>,
    #[serde(default)]
    pub states: Vec<State>,
    #[serde(default)]
    pub enums: Vec<Enum>,
}

/// A module import; tracked for completeness but otherwise inert to the core,
/// which operates on one already-resolved AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
}

/// A struct-like format: a wire-visible type with ordered fields and
/// (usually) synthesized encode/decode functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub ident: Ident,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub recursive: bool,
    /// Present iff the format's total bit width is statically computable.
    #[serde(default)]
    pub bit_size: Option<u64>,
}

/// A format with no wire representation of its own — fields only exist to
/// be referenced by sibling formats' `is_state_variable` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub ident: Ident,
    pub fields: Vec<Field>,
}

/// An enum declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enum {
    pub ident: Ident,
    pub members: Vec<EnumMember>,
    /// The enum's underlying integer type, if statically known.
    #[serde(default)]
    pub underlying: Option<TypeExpr>,
}

/// One enum member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumMember {
    pub ident: Ident,
    pub value: i64,
}

/// A field's termination rule for variable-length trailing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Follow {
    /// Extends to the end of the input/sub-range.
    End,
    /// A statically or dynamically known fixed length.
    Fixed,
    /// Terminates when a following literal (`next`) matches.
    Constant,
}

/// The optional attribute bag a field can carry (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldArguments {
    /// Byte alignment required before this field starts.
    #[serde(default)]
    pub alignment: Option<u64>,
    /// An explicit type-mapping override (e.g. an enum's wire-vs-logical type).
    #[serde(default)]
    pub type_map: Option<Box<TypeExpr>>,
    /// Sub-range window start, if this field seeks before coding.
    #[serde(default)]
    pub sub_byte_begin: Option<Box<Expr>>,
    /// Sub-range window length, if this field is bounded.
    #[serde(default)]
    pub sub_byte_length: Option<Box<Expr>>,
    /// Set when the field carries a sub-range window whose length is
    /// open-ended (extends to the end of input) rather than absent
    /// altogether — distinguishes "no sub-range at all" from "a sub-range
    /// with no fixed length" when `sub_byte_length` and `sub_byte_begin`
    /// are both `None` (`spec.md` §4.11 item 3).
    #[serde(default)]
    pub open_ended_sub_range: bool,
    /// Assertions that the decoded value matches a literal exactly (a "magic" field).
    #[serde(default)]
    pub direct_match: Vec<Expr>,
}

/// A field within a `Format`/`State`/bit-field group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub ident: Ident,
    pub type_expr: TypeExpr,
    #[serde(default)]
    pub arguments: FieldArguments,
    #[serde(default)]
    pub follow: Option<Follow>,
    /// The owning format's ident, when known independently of lexical nesting.
    #[serde(default)]
    pub belong_struct: Option<Ident>,
    #[serde(default)]
    pub is_state_variable: bool,
    #[serde(default)]
    pub bit_alignment: Option<u64>,
    #[serde(default)]
    pub eventual_bit_alignment: Option<u64>,
    /// The literal that terminates a `Follow::Constant` field.
    #[serde(default)]
    pub next: Option<Box<Expr>>,
}

/// What role a function plays with respect to its owning format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionRole {
    Encode,
    Decode,
    UserDefined,
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub ident: Ident,
    pub type_expr: TypeExpr,
}

/// A function definition, including the synthesized per-format encode/decode
/// coders (`spec.md` §4.10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub ident: Ident,
    pub role: FunctionRole,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub return_type: Option<TypeExpr>,
    pub body: Vec<Stmt>,
}
