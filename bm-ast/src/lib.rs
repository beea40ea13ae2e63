//! The upstream format-description AST (`spec.md` §6's AST input contract).
//!
//! This crate owns no behavior — it is a pure data model, deserialized from
//! AST-JSON by `serde_json` in `bm-cli` and walked read-only by `bm-core`'s
//! lowering passes. Node shapes mirror the node kinds spec.md's AST input
//! contract names exactly; nothing here performs semantic validation, which
//! the upstream AST layer is assumed to have already done.

mod decl;
mod expr;
mod ident;
mod stmt;
mod types;

pub use decl::{
    Enum, EnumMember, Field, FieldArguments, Follow, Format, Function, FunctionRole, Import,
    Param, Program, State,
};
pub use expr::{BinaryOp, Expr, IoMethod, UnaryOp};
pub use ident::{Ident, NodeId};
pub use stmt::{CasePattern, LoopForm, MatchArm, Stmt};
pub use types::{TypeExpr, UnionArm};

/// Parses a `Program` from AST-JSON, the shape produced by the upstream
/// parser and consumed by `bm-cli -i`.
pub fn parse(json: &str) -> serde_json::Result<Program> {
    serde_json::from_str(json)
}
