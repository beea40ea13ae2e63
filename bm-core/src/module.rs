//! The pipeline object: single-threaded, synchronous owner of every piece of
//! mutable compile-time state (`spec.md` §5).

use std::collections::HashMap;

use bm_ir::{AbstractOp, Code, CodeRef};
use bm_types::{IdCounter, ObjectId};

use crate::intern::{IdentTable, StorageTable, StringTable};

/// Whether the lowering currently in progress is synthesizing an encoder or
/// a decoder body; `encode_type`/`decode_type` and the sub-range/seek
/// lowering consult this instead of threading a parameter through every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoderMode {
    Encode,
    Decode,
}

/// One arm contributed to an open branching construct's phi frame.
#[derive(Debug, Clone, Default)]
pub struct PhiArm {
    /// `None` for the unconditional/default/else arm.
    pub cond: Option<CodeRef>,
    /// Variables assigned within this arm, and the value id each received.
    pub assignments: HashMap<ObjectId, CodeRef>,
}

/// A frame on the phi stack, opened when a branching construct (`if`,
/// `match`, `loop`) begins and closed when phi insertion runs at its join
/// point (`spec.md` §4.6).
#[derive(Debug, Clone, Default)]
pub struct PhiFrame {
    pub arms: Vec<PhiArm>,
}

impl PhiFrame {
    /// Starts a new arm, closing whichever arm was previously open.
    pub fn open_arm(&mut self, cond: Option<CodeRef>) {
        self.arms.push(PhiArm {
            cond,
            assignments: HashMap::new(),
        });
    }

    /// Records that `var` received `value` in the currently open arm.
    pub fn record_assignment(&mut self, var: ObjectId, value: CodeRef) {
        if let Some(arm) = self.arms.last_mut() {
            arm.assignments.insert(var, value);
        }
    }

    /// The set of variables assigned on at least one arm, each mapped to the
    /// `(cond, value)` pairs of every arm that assigned it.
    pub fn merge_candidates(&self) -> HashMap<ObjectId, Vec<(Option<CodeRef>, CodeRef)>> {
        let mut out: HashMap<ObjectId, Vec<(Option<CodeRef>, CodeRef)>> = HashMap::new();
        for arm in &self.arms {
            for (&var, &value) in &arm.assignments {
                out.entry(var).or_default().push((arm.cond, value));
            }
        }
        out
    }
}

/// Opcodes whose `DEFINE_X`/`END_X` bracket additionally gets a `Range`
/// entry keyed by `ident` (`spec.md` §3: "program, format, enum, function,
/// bit field, union, union member, property"). Fields and parameters get an
/// index-map entry but no separate range.
fn is_range_tracked(op: AbstractOp) -> bool {
    matches!(
        op,
        AbstractOp::DefineProgram
            | AbstractOp::DefineFormat
            | AbstractOp::DefineState
            | AbstractOp::DefineEnum
            | AbstractOp::DefineFunction
            | AbstractOp::DefineBitField
            | AbstractOp::DefineUnion
            | AbstractOp::DefineUnionMember
            | AbstractOp::DefineProperty
    )
}

/// Maps a bracket-opening op to the op(s) that legally close it, for the
/// "no intervening unbalanced bracket of the same class" invariant (`spec.md`
/// §8 property 4). `ELIF`/`ELSE` never appear here: they're markers inside
/// the region `IF` opens, not brackets of their own, so `emit` below neither
/// pushes nor pops a frame for them. `CASE`/`DEFAULT_CASE` are themselves
/// nested brackets, each closed only by its own `EndCase`.
fn closes(open: AbstractOp, close: AbstractOp) -> bool {
    use AbstractOp::*;
    matches!(
        (open, close),
        (DefineProgram, EndProgram)
            | (DefineFormat, EndFormat)
            | (DefineState, EndState)
            | (DefineEnum, EndEnum)
            | (DefineField, EndField)
            | (DefineUnion, EndUnion)
            | (DefineUnionMember, EndUnionMember)
            | (DefineProperty, EndProperty)
            | (DefineFunction, EndFunction)
            | (DefineParameter, EndParameter)
            | (DefineBitField, EndBitField)
            | (If, EndIf)
            | (Match, EndMatch)
            | (ExhaustiveMatch, EndMatch)
            | (Case, EndCase)
            | (DefaultCase, EndCase)
            | (LoopInfinite, EndLoop)
            | (LoopCondition, EndLoop)
            | (BeginEncodeSubRange, EndEncodeSubRange)
            | (BeginDecodeSubRange, EndDecodeSubRange)
            | (BeginEncodePackedOperation, EndEncodePackedOperation)
            | (BeginDecodePackedOperation, EndDecodePackedOperation)
    )
}

/// One open bracket frame: the opening opcode, its ident (if any), and the
/// buffer position it was emitted at.
struct BracketFrame {
    op: AbstractOp,
    ident: Option<ObjectId>,
    start: usize,
}

/// The single pipeline object whose lifetime spans one compile (`spec.md`
/// §5). Owns the ID counter, every interning table, the append-only `Code`
/// buffer and its ident index, the range table, the phi stack, and the
/// current encode/decode mode.
pub struct Module {
    pub ids: IdCounter,
    pub strings: StringTable,
    pub idents: IdentTable,
    pub metadata_names: StringTable,
    pub storages: StorageTable,
    pub code: Vec<Code>,
    pub index: HashMap<ObjectId, usize>,
    pub ranges: HashMap<ObjectId, bm_ir::Range>,
    pub programs: Vec<bm_ir::Range>,
    pub prev_expr: Option<CodeRef>,
    pub phi_stack: Vec<PhiFrame>,
    pub current_function: Option<ObjectId>,
    pub mode: Option<CoderMode>,
    /// What a declared ident's `Ident(..)` type-expression resolves to, populated
    /// as formats/states/enums are registered so `define_storage` can recurse
    /// through named-type references (`spec.md` §4.4's `ident_type` rule).
    pub type_env: HashMap<ObjectId, bm_ast::TypeExpr>,
    /// Which format idents the AST marked `recursive`, consulted by
    /// `define_storage`'s `struct_type` rule.
    pub recursive_formats: std::collections::HashSet<ObjectId>,
    /// An enum ident's statically-known underlying integer type, consulted by
    /// `define_storage`'s `enum_type` rule and by `CAST(EnumToInt)`/`CAST(IntToEnum)`
    /// synthesis. Kept separate from `type_env` since an enum's own ident
    /// there resolves to `TypeExpr::Enum`, not its underlying width.
    pub enum_underlying: HashMap<ObjectId, bm_ast::TypeExpr>,
    /// Pending `CALL_ENCODE`/`CALL_DECODE` sites recorded as they're emitted
    /// (`left_ref` points at the target format's `DEFINE_FORMAT`); the
    /// `bind_encoder_and_decoder` post-pass retargets each to the
    /// synthesized coder function once it exists (`spec.md` §9).
    pub pending_coder_calls: Vec<(CodeRef, ObjectId, CoderMode)>,
    /// The `belong` operand fields currently pick up: the position of the
    /// innermost enclosing `DEFINE_FORMAT`/`DEFINE_BIT_FIELD`. Bit-field
    /// grouping temporarily remaps this to the bit-field's own position
    /// (`spec.md` §4.10).
    pub current_belong: Option<CodeRef>,
    /// Topological emission order of format idents, computed by the
    /// `sort_formats` post-pass from struct-reference dependencies. The
    /// `Code` buffer itself is append-only and position-addressed, so this
    /// records the order as a side table rather than relocating instructions.
    pub format_order: Vec<ObjectId>,
    /// Basic-block boundaries computed by the `generate_cfg1` post-pass,
    /// feeding the CLI's `-c` CFG side-data output.
    pub basic_blocks: Vec<bm_ir::Range>,
    brackets: Vec<BracketFrame>,
}

impl Default for Module {
    fn default() -> Self {
        Module {
            ids: IdCounter::new(),
            strings: StringTable::default(),
            idents: IdentTable::default(),
            metadata_names: StringTable::default(),
            storages: StorageTable::default(),
            code: Vec::new(),
            index: HashMap::new(),
            ranges: HashMap::new(),
            programs: Vec::new(),
            prev_expr: None,
            phi_stack: Vec::new(),
            current_function: None,
            mode: None,
            type_env: HashMap::new(),
            recursive_formats: std::collections::HashSet::new(),
            enum_underlying: HashMap::new(),
            pending_coder_calls: Vec::new(),
            current_belong: None,
            format_order: Vec::new(),
            basic_blocks: Vec::new(),
            brackets: Vec::new(),
        }
    }
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// The position the next `emit` will land at.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn get(&self, r: CodeRef) -> &Code {
        &self.code[r.index()]
    }

    /// Appends `code`, recording an ident-index entry and/or opening/closing
    /// a bracket frame as its opcode requires.
    pub fn emit(&mut self, code: Code) -> CodeRef {
        let pos = self.code.len();
        let op = code.op;

        if op.opens_bracket() {
            self.brackets.push(BracketFrame {
                op,
                ident: code.ident,
                start: pos,
            });
        } else if op.closes_bracket() {
            if let Some(depth) = self
                .brackets
                .iter()
                .rposition(|frame| closes(frame.op, op))
            {
                if depth == self.brackets.len() - 1 {
                    let frame = self.brackets.pop().expect("just located this frame");
                    if is_range_tracked(frame.op) {
                        if let Some(ident) = frame.ident {
                            let end = pos + 1;
                            self.ranges.insert(
                                ident,
                                bm_ir::Range::new(frame.start as u64, (end - frame.start) as u64),
                            );
                            if frame.op == AbstractOp::DefineProgram {
                                self.programs
                                    .push(bm_ir::Range::new(frame.start as u64, (end - frame.start) as u64));
                            }
                        }
                    }
                }
            }
        }

        if op.is_definition() {
            if let Some(ident) = code.ident {
                self.index.insert(ident, pos);
            }
        }

        self.code.push(code);
        CodeRef(pos as u32)
    }

    pub fn new_id(&mut self) -> ObjectId {
        self.ids.next_id()
    }

    pub fn set_prev_expr(&mut self, r: CodeRef) {
        self.prev_expr = Some(r);
    }

    /// Read-and-clear the expression scratch register (`spec.md` §4.3).
    pub fn take_prev_expr(&mut self) -> Option<CodeRef> {
        self.prev_expr.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_ir::AbstractOp;

    #[test]
    fn bracket_emission_records_a_range_keyed_by_ident() {
        let mut m = Module::new();
        let fmt_id = m.new_id();
        m.emit(Code::new(AbstractOp::DefineFormat).with_ident(fmt_id));
        m.emit(Code::new(AbstractOp::DefineField));
        m.emit(Code::new(AbstractOp::EndField));
        m.emit(Code::new(AbstractOp::EndFormat));
        let range = m.ranges.get(&fmt_id).expect("format range recorded");
        assert_eq!(range.start, 0);
        assert_eq!(range.end(), 4);
    }

    #[test]
    fn ident_index_points_at_the_defining_instruction() {
        let mut m = Module::new();
        let field_id = m.new_id();
        m.emit(Code::new(AbstractOp::DefineField).with_ident(field_id));
        m.emit(Code::new(AbstractOp::EndField));
        let idx = *m.index.get(&field_id).unwrap();
        assert_eq!(m.code[idx].op, AbstractOp::DefineField);
    }
}
