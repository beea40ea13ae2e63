//! The core's error type (`spec.md` §7).

use bm_ast::NodeId;
use thiserror::Error;

/// Every lowering function returns `Result<T, Error>`; on error, callers
/// unwind without emitting further IR. Nothing is swallowed, nothing is
/// retried — the pipeline is deterministic and single-shot.
#[derive(Debug, Error)]
pub enum Error {
    /// An integer literal did not fit in the 30-bit varint payload space.
    #[error("varint overflow: {0} does not fit in 30 bits")]
    VarintOverflow(u64),

    /// An AST type this core has no `define_storage`/`encode_type`/`decode_type` rule for.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// An AST expression/statement construct this core has no lowering rule for.
    #[error("unsupported operation: {0}")]
    UnsupportedOp(String),

    /// An integer literal that failed to parse.
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),

    /// `lookup_ident` was asked to resolve an AST ident with no resolvable base.
    #[error("identifier has no resolvable binding: node {0}")]
    MissingBinding(NodeId),

    /// An impossible state: a bug in the core or in the upstream AST. Reported verbatim, never recovered.
    #[error("internal invariant violated: {0}")]
    BugInvariant(String),

    /// An open-ended sub-range with no explicit begin offset.
    #[error("sub-range has no explicit begin offset")]
    MissingSubRangeBegin,

    /// A field's `follow` attribute is inconsistent with its resolved type.
    #[error("follow attribute is inconsistent with the field's type: {0}")]
    InvalidFollow(String),

    /// A downstream I/O failure while writing the module.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// A wire-level encode/decode failure bubbled up from `bm_types`.
    #[error("wire error: {0}")]
    Wire(#[from] bm_types::Error),

    /// A filesystem failure reading the AST or writing the BM/CFG output.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
