//! Interning tables: dedup strings, identifiers, metadata names, and type
//! storages, minting a fresh monotonic [`ObjectId`] on first insertion
//! (`spec.md` §4.2).

use std::collections::HashMap;

use bm_ast::NodeId;
use bm_ir::{Storages, StorageRef};
use bm_types::{IdCounter, ObjectId};

/// One entry of the `metadata`/`strings`/`identifiers` on-disk tables: the
/// entry's assigned id paired with its string content (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternedString {
    pub id: ObjectId,
    pub value: String,
}

/// A dedup-by-content string table. Used independently for the `strings`,
/// `identifiers`, and `metadata` tables — each keeps its own ids and its own
/// insertion order, but shares this lookup-or-insert behavior.
#[derive(Debug, Default)]
pub struct StringTable {
    by_value: HashMap<String, ObjectId>,
    entries: Vec<InternedString>,
}

impl StringTable {
    /// Returns `s`'s existing id, minting one from `ids` on first sight.
    pub fn intern(&mut self, ids: &mut IdCounter, s: &str) -> ObjectId {
        if let Some(&id) = self.by_value.get(s) {
            return id;
        }
        let id = ids.next_id();
        self.by_value.insert(s.to_string(), id);
        self.entries.push(InternedString {
            id,
            value: s.to_string(),
        });
        id
    }

    pub fn entries(&self) -> &[InternedString] {
        &self.entries
    }
}

/// Identifier interning: follows an AST ident's `base` chain to its
/// canonical declaration node, then interns by that node id so every
/// reference to the same declaration yields the same [`ObjectId`].
#[derive(Debug, Default)]
pub struct IdentTable {
    by_node: HashMap<NodeId, ObjectId>,
    entries: Vec<InternedString>,
}

impl IdentTable {
    /// Resolves `ident` to its canonical base node (following `base` at most
    /// once, since the AST's binding chain is assumed already flattened by
    /// the upstream resolver) and interns by that node id.
    pub fn lookup(&mut self, ids: &mut IdCounter, ident: &bm_ast::Ident) -> ObjectId {
        let canonical_node = ident.base.unwrap_or(ident.node_id);
        if let Some(&id) = self.by_node.get(&canonical_node) {
            return id;
        }
        let id = ids.next_id();
        self.by_node.insert(canonical_node, id);
        self.entries.push(InternedString {
            id,
            value: ident.name.clone(),
        });
        id
    }

    /// Looks up a node id's interned [`ObjectId`] without minting a new one.
    pub fn id_for_node(&self, node: NodeId) -> Option<ObjectId> {
        self.by_node.get(&node).copied()
    }

    /// Mints a fresh ephemeral id for a compiler-generated temporary with no
    /// backing AST node (e.g. a synthesized coder name).
    pub fn fresh_ephemeral(&mut self, ids: &mut IdCounter, name: &str) -> ObjectId {
        let id = ids.next_id();
        self.entries.push(InternedString {
            id,
            value: name.to_string(),
        });
        id
    }

    pub fn entries(&self) -> &[InternedString] {
        &self.entries
    }
}

/// Type storage interning: dedups `Storages` vectors by their byte-level key.
#[derive(Debug, Default)]
pub struct StorageTable {
    by_key: HashMap<Vec<u8>, StorageRef>,
    entries: Vec<(ObjectId, Storages)>,
}

impl StorageTable {
    /// Returns `storages`'s existing [`StorageRef`], interning it on first sight.
    pub fn intern(&mut self, ids: &mut IdCounter, storages: Storages) -> StorageRef {
        let key = storages.key();
        if let Some(&r) = self.by_key.get(&key) {
            return r;
        }
        let id = ids.next_id();
        let r = StorageRef(id);
        self.by_key.insert(key, r);
        self.entries.push((id, storages));
        r
    }

    pub fn entries(&self) -> &[(ObjectId, Storages)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_table_dedups_by_content() {
        let mut ids = IdCounter::new();
        let mut table = StringTable::default();
        let a = table.intern(&mut ids, "hello");
        let b = table.intern(&mut ids, "hello");
        let c = table.intern(&mut ids, "world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.entries().len(), 2);
    }

    #[test]
    fn ident_table_dedups_aliases_to_their_base() {
        let mut ids = IdCounter::new();
        let mut table = IdentTable::default();
        let decl = bm_ast::Ident::declaration(1, "x");
        let alias = bm_ast::Ident {
            node_id: 2,
            name: "x".to_string(),
            base: Some(1),
        };
        let a = table.lookup(&mut ids, &decl);
        let b = table.lookup(&mut ids, &alias);
        assert_eq!(a, b);
    }
}
