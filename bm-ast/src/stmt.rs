//! Statement nodes (`spec.md` §4.6, §6).

use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::ident::Ident;

/// One `match` arm's pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CasePattern {
    /// A single matched value.
    Value(Expr),
    /// The catch-all arm ("any range").
    AnyRange,
}

/// One `match` arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub pattern: CasePattern,
    pub body: Box<Stmt>,
}

/// The three loop shapes the AST can express (`spec.md` §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LoopForm {
    /// `for x in y` where `y` is an integer: a counter loop.
    ForInInt { var: Ident, count: Expr },
    /// `for x in a..b`: conditional loop stepping a counter to `end`.
    ForInRange {
        var: Ident,
        start: Expr,
        end: Expr,
        inclusive: bool,
    },
    /// `for x in array_or_string`: counter loop indexing the base, `var` bound by-reference.
    ForInIndexable { var: Ident, base: Expr },
    /// A general C-style loop: optional init/condition/step, any of which may be absent.
    General {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
    },
}

/// A statement node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Stmt {
    Expr(Expr),
    Block {
        statements: Vec<Stmt>,
    },
    If {
        cond: Expr,
        then_block: Box<Stmt>,
        /// `Some` covers both a trailing `elif` (itself an `If`) and a plain `else`.
        else_block: Option<Box<Stmt>>,
    },
    Match {
        cond: Option<Expr>,
        arms: Vec<MatchArm>,
        exhaustive: bool,
    },
    Loop {
        form: LoopForm,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Return {
        value: Option<Expr>,
    },
    Assert {
        cond: Expr,
        message: Option<String>,
    },
    /// An explicit, unconditional compile-time error the AST can embed (e.g. an unreachable arm).
    ExplicitError {
        message: String,
    },
    /// A free-standing annotation attached to the following declaration or
    /// statement; carries a name and argument expressions.
    Metadata {
        name: String,
        args: Vec<Expr>,
    },
}
