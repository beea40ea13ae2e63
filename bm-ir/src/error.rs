//! Errors raised while building or validating IR structures directly (as
//! opposed to lowering errors, which belong to `bm-core`'s own error type).

use bm_types::ObjectId;
use thiserror::Error;

/// Failures that can occur while constructing or deduplicating IR-level
/// structures that carry their own invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("storages vector must describe at least one tag")]
    EmptyStorages,

    #[error("object id {0} referenced before it was defined")]
    DanglingReference(ObjectId),

    #[error("wire error: {0}")]
    Wire(#[from] bm_types::Error),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
