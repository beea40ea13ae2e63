//! The on-disk `BinaryModule` wire format (`spec.md` §6): flattens a
//! finished [`Module`] into the fixed table sequence the CLI's `-o` writes
//! and a later `-i` of a `.bm` file would read back.

use bm_ir::{Code, Storages};
use bm_types::{Decode, Encode, ObjectId, Varint};

use crate::error::{Error, Result};
use crate::module::Module;

fn varint(n: u64) -> Result<Varint> {
    Varint::encode(n).map_err(Error::Wire)
}

/// One `{code, string}` row shared by the `metadata`/`strings`/`identifiers`
/// tables (`spec.md` §6 item 2-4): `code` is the table entry's own
/// [`ObjectId`], `string` its interned content.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct StringEntry {
    pub code: ObjectId,
    pub string: String,
}

/// One `{ident, index}` row of the `ident_indexes` table (`spec.md` §6 item
/// 5): which buffer position defines `ident`.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct IdentIndexEntry {
    pub ident: ObjectId,
    pub index: Varint,
}

/// One `{code, storage}` row of the `types` table (`spec.md` §6 item 6).
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct TypeEntry {
    pub code: ObjectId,
    pub storage: Storages,
}

/// A `{start, end}` varint pair, the wire shape both `programs` and
/// `ident_ranges` reduce a [`bm_ir::Range`] to (`spec.md` §6 items 7-8).
#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct WireRange {
    pub start: Varint,
    pub end: Varint,
}

impl From<bm_ir::Range> for WireRange {
    fn from(r: bm_ir::Range) -> Self {
        // Ranges recorded by `Module::emit` never exceed 30 bits of buffer
        // position in any module this compiler would realistically produce;
        // `unwrap_or` falls back to the widest single-field varint rather
        // than panic on a pathological input.
        WireRange {
            start: Varint::encode(r.start).unwrap_or(Varint::encode(bm_types::MAX_VALUE).unwrap()),
            end: Varint::encode(r.end()).unwrap_or(Varint::encode(bm_types::MAX_VALUE).unwrap()),
        }
    }
}

/// One `{ident, range}` row of the `ident_ranges` table (`spec.md` §6 item 8).
#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct IdentRangeEntry {
    pub ident: ObjectId,
    pub range: WireRange,
}

/// The complete serialized form of a compiled module, laid out in exactly
/// the order `spec.md` §6 names: `max_id`, `metadata`, `strings`,
/// `identifiers`, `ident_indexes`, `types`, `programs`, `ident_ranges`,
/// then `code_length` followed by that many [`Code`] records.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct BinaryModule {
    pub max_id: Varint,
    pub metadata: Vec<StringEntry>,
    pub strings: Vec<StringEntry>,
    pub identifiers: Vec<StringEntry>,
    pub ident_indexes: Vec<IdentIndexEntry>,
    pub types: Vec<TypeEntry>,
    pub programs: Vec<WireRange>,
    pub ident_ranges: Vec<IdentRangeEntry>,
    pub code: Vec<Code>,
}

fn string_entries(table: &crate::intern::StringTable) -> Vec<StringEntry> {
    table
        .entries()
        .iter()
        .map(|e| StringEntry {
            code: e.id,
            string: e.value.clone(),
        })
        .collect()
}

impl BinaryModule {
    /// Flattens a finished [`Module`] into its on-disk tables. Every table
    /// is interning-order, not sorted — a reader walks `ident_indexes` to
    /// resolve a reference, not the other way around.
    pub fn from_module(module: &Module) -> Result<BinaryModule> {
        let max_id = varint(module.ids.max_id().value())?;

        let metadata = string_entries(&module.metadata_names);
        let strings = string_entries(&module.strings);
        let identifiers: Vec<StringEntry> = module
            .idents
            .entries()
            .iter()
            .map(|e| StringEntry {
                code: e.id,
                string: e.value.clone(),
            })
            .collect();

        let mut ident_indexes: Vec<IdentIndexEntry> = Vec::with_capacity(module.index.len());
        for (&ident, &index) in &module.index {
            ident_indexes.push(IdentIndexEntry {
                ident,
                index: varint(index as u64)?,
            });
        }
        ident_indexes.sort_by_key(|e| e.index.value());

        let mut types: Vec<TypeEntry> = module
            .storages
            .entries()
            .iter()
            .map(|(id, storages)| TypeEntry {
                code: *id,
                storage: storages.clone(),
            })
            .collect();
        types.sort_by_key(|e| e.code.value());

        let programs: Vec<WireRange> = module.programs.iter().copied().map(WireRange::from).collect();

        let mut ident_ranges: Vec<IdentRangeEntry> = module
            .ranges
            .iter()
            .map(|(&ident, &range)| IdentRangeEntry {
                ident,
                range: range.into(),
            })
            .collect();
        ident_ranges.sort_by_key(|e| e.ident.value());

        Ok(BinaryModule {
            max_id,
            metadata,
            strings,
            identifiers,
            ident_indexes,
            types,
            programs,
            ident_ranges,
            code: module.code.clone(),
        })
    }

    /// Serializes to bytes per `spec.md` §6: every length field is the
    /// literal record count of the sequence that follows it, `code_length`
    /// included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bm_types::write(self).map_err(Error::Wire)
    }

    /// Parses a previously-written module back, without re-validating any
    /// of the semantic invariants `post_passes` establishes — a reader that
    /// wants those checked calls [`crate::module::Module`]'s own builder
    /// instead of trusting an arbitrary `.bm` file.
    pub fn from_bytes(bytes: &[u8]) -> Result<BinaryModule> {
        let (value, _consumed) = bm_types::read(bytes).map_err(Error::Wire)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_ir::AbstractOp;

    #[test]
    fn round_trips_through_bytes() {
        let mut module = Module::new();
        let fmt_id = module.new_id();
        module.emit(Code::new(AbstractOp::DefineFormat).with_ident(fmt_id));
        module.emit(Code::new(AbstractOp::EndFormat));

        let bm = BinaryModule::from_module(&module).expect("flatten");
        let bytes = bm.to_bytes().expect("encode");
        let parsed = BinaryModule::from_bytes(&bytes).expect("decode");
        assert_eq!(bm, parsed);
    }

    #[test]
    fn code_length_matches_the_code_vec() {
        let mut module = Module::new();
        module.emit(Code::new(AbstractOp::DefineProgram));
        module.emit(Code::new(AbstractOp::EndProgram));
        let bm = BinaryModule::from_module(&module).unwrap();
        assert_eq!(bm.code.len(), 2);
    }
}
