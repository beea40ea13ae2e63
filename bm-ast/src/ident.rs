//! Identifier nodes and the binding chain `lookup_ident` follows to find an
//! identifier's canonical declaration (`spec.md` §4.2).

use serde::{Deserialize, Serialize};

/// A reference-counted-by-value node id minted by the upstream parser.
/// Two [`Ident`] nodes that resolve to the same declaration share a `base`
/// chain that bottoms out at the same `node_id`.
pub type NodeId = u64;

/// An identifier occurrence in the AST.
///
/// `base` is `None` for a canonical declaration site and `Some(other)` for
/// an alias (e.g. a `use`, a pattern binding, a loop variable) that should
/// intern to the same object id as the node it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ident {
    pub node_id: NodeId,
    pub name: String,
    #[serde(default)]
    pub base: Option<NodeId>,
}

impl Ident {
    /// A fresh, unaliased declaration-site identifier.
    pub fn declaration(node_id: NodeId, name: impl Into<String>) -> Self {
        Ident {
            node_id,
            name: name.into(),
            base: None,
        }
    }
}
