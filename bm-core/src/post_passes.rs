//! The fixed post-pass pipeline (`spec.md` §5):
//! `flatten → decide_bit_field_size → bind_encoder_and_decoder → sort_formats
//! → merge_conditional_field → derive_property_functions → generate_cfg1 →
//! expand_bit_operation`, each followed by an ident-index rebuild
//! (`original_source/src/bm/optimize.cpp`'s `rebind_ident_index`).
//!
//! Every pass here either mutates existing `Code` entries in place or
//! appends new ones at the tail of the buffer; none relocate or remove
//! instructions, since every cross-reference in the IR is a buffer
//! position (`CodeRef`) and the buffer has no stable way to renumber those
//! after the fact.

use std::collections::{HashMap, HashSet};

use bm_ast::{Field, Format, Program, TypeExpr};
use bm_ir::{AbstractOp, Code, CodeRef, FuncType, PackedOpType, Storage, Storages};
use bm_types::{ObjectId, Varint};

use crate::codec_decode::decode_type;
use crate::codec_encode::encode_type;
use crate::error::{Error, Result};
use crate::module::{CoderMode, Module};
use crate::sub_range::with_sub_range;

fn varint(n: u64) -> Result<Varint> {
    Varint::encode(n).map_err(|_| Error::VarintOverflow(n))
}

/// Runs every pass in the fixed order, rebinding the ident index after each.
#[tracing::instrument(skip(module, program))]
pub fn run_all(module: &mut Module, program: &Program) -> Result<()> {
    flatten(module);
    rebind_ident_index(module);

    decide_bit_field_size(module)?;
    rebind_ident_index(module);

    bind_encoder_and_decoder(module, program)?;
    rebind_ident_index(module);

    sort_formats(module, program);
    rebind_ident_index(module);

    merge_conditional_field(module);
    rebind_ident_index(module);

    derive_property_functions(module)?;
    rebind_ident_index(module);

    generate_cfg1(module);
    rebind_ident_index(module);

    expand_bit_operation(module)?;
    rebind_ident_index(module);

    Ok(())
}

/// Rebuilds `module.index` by a single linear scan over the code buffer
/// (`original_source/src/bm/optimize.cpp`'s `rebind_ident_index`).
#[tracing::instrument(skip(module))]
pub fn rebind_ident_index(module: &mut Module) {
    module.index.clear();
    for (pos, code) in module.code.iter().enumerate() {
        if code.op.is_definition() {
            if let Some(ident) = code.ident {
                module.index.insert(ident, pos);
            }
        }
    }
}

/// Lowering already emits directly into a single flat `Vec<Code>` rather
/// than a nested tree, so there is nothing left to flatten; kept as an
/// explicit no-op step so the pipeline's fixed order stays visible in one
/// place.
#[tracing::instrument(skip(module))]
fn flatten(_module: &mut Module) {}

/// Sums each bit field's member widths from their already-lowered
/// `SPECIFY_STORAGE_TYPE` and stashes the byte-rounded total on the
/// `DEFINE_BIT_FIELD` itself (`spec.md` scenario E).
#[tracing::instrument(skip(module))]
fn decide_bit_field_size(module: &mut Module) -> Result<()> {
    let bitfield_starts: Vec<usize> = module
        .ranges
        .values()
        .map(|r| r.start as usize)
        .filter(|&start| module.code[start].op == AbstractOp::DefineBitField)
        .collect();

    for start in bitfield_starts {
        let end = module.ranges.values().find(|r| r.start as usize == start).map(|r| r.end() as usize).unwrap_or(start);
        let mut total_bits: u64 = 0;
        for idx in start..end {
            if module.code[idx].op == AbstractOp::SpecifyStorageType {
                if let Some(storages) = &module.code[idx].storage {
                    if let Some(first) = storages.as_slice().first() {
                        total_bits += storage_bit_width(first);
                    }
                }
            }
        }
        module.code[start].bit_size_plus = Some(varint(total_bits + 1)?);
    }
    Ok(())
}

fn storage_bit_width(storage: &Storage) -> u64 {
    match storage {
        Storage::Bool => 1,
        Storage::Uint { bits } | Storage::Int { bits } | Storage::Float { bits } => bits.value(),
        _ => 0,
    }
}

/// Synthesizes each format's encode/decode coder bodies and retargets every
/// `CALL_ENCODE`/`CALL_DECODE` site recorded in `pending_coder_calls`
/// (`spec.md`'s "two-phase naming for coders").
#[tracing::instrument(skip(module, program))]
fn bind_encoder_and_decoder(module: &mut Module, program: &Program) -> Result<()> {
    let mut coder_positions: HashMap<(ObjectId, CoderMode), CodeRef> = HashMap::new();

    for format in &program.formats {
        let format_id = module.idents.lookup(&mut module.ids, &format.ident);
        let encode_pos = synthesize_coder(module, format_id, format, CoderMode::Encode)?;
        coder_positions.insert((format_id, CoderMode::Encode), encode_pos);
        let decode_pos = synthesize_coder(module, format_id, format, CoderMode::Decode)?;
        coder_positions.insert((format_id, CoderMode::Decode), decode_pos);
    }

    for &(call_ref, format_id, mode) in &module.pending_coder_calls.clone() {
        if let Some(&target) = coder_positions.get(&(format_id, mode)) {
            module.code[call_ref.index()].left_ref = Some(target);
        }
    }
    Ok(())
}

fn synthesize_coder(module: &mut Module, format_id: ObjectId, format: &Format, mode: CoderMode) -> Result<CodeRef> {
    let belong_pos = module.index.get(&format_id).copied().map(|p| CodeRef(p as u32));
    let func_name = match mode {
        CoderMode::Encode => "synthesized_encoder",
        CoderMode::Decode => "synthesized_decoder",
    };
    let func_id = module.idents.fresh_ephemeral(&mut module.ids, func_name);
    let func_type = match mode {
        CoderMode::Encode => FuncType::Encoder,
        CoderMode::Decode => FuncType::Decoder,
    };

    let mut code = Code::new(AbstractOp::DefineFunction).with_ident(func_id).with_func_type(func_type);
    if let Some(b) = belong_pos {
        code = code.with_belong(b);
    }
    let func_pos = module.emit(code);
    let return_storage = Storages::new(vec![Storage::CoderReturn]);
    let storage_ref = module.storages.intern(&mut module.ids, return_storage.clone());
    module.emit(Code::new(AbstractOp::SpecifyStorageType).with_storage(return_storage).with_storage_ref(storage_ref));

    let saved_mode = module.mode.replace(mode);
    let saved_function = module.current_function.replace(func_id);

    for field in &format.fields {
        synthesize_field_coder(module, field, mode)?;
    }

    module.emit(Code::new(AbstractOp::RetSuccess));
    module.mode = saved_mode;
    module.current_function = saved_function;
    module.emit(Code::new(AbstractOp::EndFunction));
    Ok(func_pos)
}

/// Struct-union and discriminated-union fields get their accessors from
/// `derive_property_functions` instead; a plain field's coder body is a
/// single `encode_type`/`decode_type` call wrapped in whatever sub-range
/// window its arguments call for.
fn synthesize_field_coder(module: &mut Module, field: &Field, mode: CoderMode) -> Result<()> {
    if matches!(field.type_expr, TypeExpr::StructUnion { .. } | TypeExpr::Union { .. }) {
        return Ok(());
    }

    let field_id = module.idents.lookup(&mut module.ids, &field.ident);
    let field_pos = module
        .index
        .get(&field_id)
        .copied()
        .map(|p| CodeRef(p as u32))
        .ok_or_else(|| Error::BugInvariant(format!("field {} not yet lowered", field.ident.name)))?;
    let has_alignment = field.arguments.alignment.is_some();

    match mode {
        CoderMode::Encode => {
            let value = module.emit(Code::new(AbstractOp::IdentRef).with_ident(field_id));
            with_sub_range(module, field, field_pos, mode, |m| {
                encode_type(m, field_pos, value, &field.type_expr, has_alignment)
            })
        }
        CoderMode::Decode => with_sub_range(module, field, field_pos, mode, |m| {
            let decoded = decode_type(m, field_pos, &field.type_expr, field.follow, None)?;
            m.emit(Code::new(AbstractOp::AssignCast).with_left_ref(field_pos).with_right_ref(decoded));
            Ok(())
        }),
    }
}

/// Topologically orders formats by `StructRef`/`RecursiveStructRef`
/// dependency, recording the order in `module.format_order` for backends
/// that need forward-declaration order; the `DEFINE_FORMAT` positions
/// themselves are untouched.
#[tracing::instrument(skip(module, program))]
fn sort_formats(module: &mut Module, program: &Program) {
    let mut deps: HashMap<ObjectId, HashSet<ObjectId>> = HashMap::new();
    let mut ids: Vec<ObjectId> = Vec::with_capacity(program.formats.len());

    for format in &program.formats {
        let id = module.idents.lookup(&mut module.ids, &format.ident);
        ids.push(id);
        deps.entry(id).or_default();
    }
    for format in &program.formats {
        let id = module.idents.lookup(&mut module.ids, &format.ident);
        let mut found = HashSet::new();
        collect_format_deps(module, format, &mut found);
        deps.entry(id).or_default().extend(found);
    }

    let mut order = Vec::with_capacity(ids.len());
    let mut visited = HashSet::new();
    for &id in &ids {
        visit_format(id, &deps, &mut visited, &mut order);
    }
    module.format_order = order;
}

fn collect_format_deps(module: &mut Module, format: &Format, out: &mut HashSet<ObjectId>) {
    for field in &format.fields {
        collect_type_deps(module, &field.type_expr, out);
    }
}

fn collect_type_deps(module: &mut Module, ty: &TypeExpr, out: &mut HashSet<ObjectId>) {
    match ty {
        TypeExpr::Struct { base, .. } => {
            out.insert(module.idents.lookup(&mut module.ids, base));
        }
        TypeExpr::Array { element, .. } | TypeExpr::Ptr { inner: element } | TypeExpr::Optional { inner: element } => {
            collect_type_deps(module, element, out);
        }
        TypeExpr::StructUnion { members } => {
            for member in members {
                collect_type_deps(module, member, out);
            }
        }
        _ => {}
    }
}

fn visit_format(id: ObjectId, deps: &HashMap<ObjectId, HashSet<ObjectId>>, visited: &mut HashSet<ObjectId>, order: &mut Vec<ObjectId>) {
    if !visited.insert(id) {
        return;
    }
    if let Some(children) = deps.get(&id) {
        for &child in children {
            if deps.contains_key(&child) {
                visit_format(child, deps, visited, order);
            }
        }
    }
    order.push(id);
}

/// The `common_type`-annotated case is already sealed with a
/// `MERGED_CONDITIONAL_FIELD` at lowering time
/// (`field_lower::lower_property_field`); this pass only validates that
/// invariant holds, since retroactively inferring a merge for
/// non-annotated homogeneous arms would require inserting mid-buffer,
/// which the position-addressed `Code` buffer does not support.
#[tracing::instrument(skip(module))]
fn merge_conditional_field(module: &Module) {
    for range in module.ranges.values() {
        let start = range.start as usize;
        if module.code[start].op != AbstractOp::DefineProperty {
            continue;
        }
        let end = range.end() as usize;
        let conditional_count = module.code[start..end].iter().filter(|c| c.op == AbstractOp::ConditionalField).count();
        let merged_count = module.code[start..end].iter().filter(|c| c.op == AbstractOp::MergedConditionalField).count();
        debug_assert!(merged_count <= 1, "a property seals at most one merged conditional field");
        let _ = conditional_count;
    }
}

/// Synthesizes one accessor function per `DEFINE_PROPERTY`, carrying both
/// the pointer- and `Option`-returning getter shapes (`spec.md` §9's open
/// question on `PROPERTY_GETTER_PTR` vs `PROPERTY_GETTER_OPTIONAL`): the
/// `Option` form is primary, with the pointer form linked as its
/// `fallback` so a backend that can't use one falls back to the other.
#[tracing::instrument(skip(module))]
fn derive_property_functions(module: &mut Module) -> Result<()> {
    let properties: Vec<(usize, Option<CodeRef>)> = module
        .ranges
        .values()
        .filter(|r| module.code[r.start as usize].op == AbstractOp::DefineProperty)
        .map(|r| (r.start as usize, module.code[r.start as usize].belong))
        .collect();

    for (prop_start, belong) in properties {
        let prop_pos = CodeRef(prop_start as u32);
        let func_id = module.idents.fresh_ephemeral(&mut module.ids, "property_getter");
        let mut code = Code::new(AbstractOp::DefineFunction).with_ident(func_id).with_func_type(FuncType::Property);
        if let Some(b) = belong {
            code = code.with_belong(b);
        }
        module.emit(code);

        let ptr_ref = module.emit(Code::new(AbstractOp::PropertyGetterPtr).with_reference(prop_pos).with_belong(prop_pos));
        let opt_ref = module.emit(
            Code::new(AbstractOp::PropertyGetterOptional)
                .with_reference(prop_pos)
                .with_belong(prop_pos)
                .with_fallback(ptr_ref),
        );
        module.emit(Code::new(AbstractOp::RetSuccess).with_reference(opt_ref));
        module.emit(Code::new(AbstractOp::EndFunction));
    }
    Ok(())
}

/// Basic-block boundaries for the CLI's `-c` CFG side-data output: a new
/// block starts at every control-flow opening/closing opcode.
#[tracing::instrument(skip(module))]
fn generate_cfg1(module: &mut Module) {
    let is_boundary = |op: AbstractOp| {
        matches!(
            op,
            AbstractOp::If
                | AbstractOp::Elif
                | AbstractOp::Else
                | AbstractOp::EndIf
                | AbstractOp::Match
                | AbstractOp::ExhaustiveMatch
                | AbstractOp::Case
                | AbstractOp::DefaultCase
                | AbstractOp::EndCase
                | AbstractOp::EndMatch
                | AbstractOp::LoopInfinite
                | AbstractOp::LoopCondition
                | AbstractOp::EndLoop
        )
    };

    let mut blocks = Vec::new();
    let mut block_start = 0usize;
    for (idx, code) in module.code.iter().enumerate() {
        if is_boundary(code.op) {
            if idx > block_start {
                blocks.push(bm_ir::Range::new(block_start as u64, (idx - block_start) as u64));
            }
            block_start = idx;
        }
    }
    if block_start < module.code.len() {
        blocks.push(bm_ir::Range::new(block_start as u64, (module.code.len() - block_start) as u64));
    }
    module.basic_blocks = blocks;
}

/// Links each bit-field member's `ENCODE_INT`/`DECODE_INT` to a single
/// packed byte-granular pack/unpack via `fallback`, per the design notes'
/// "fallback operands" convention: the original per-member op remains a
/// valid (if less efficient) lowering, and a backend that can exploit the
/// packed form follows the `fallback` link instead (`spec.md` scenario E).
#[tracing::instrument(skip(module))]
fn expand_bit_operation(module: &mut Module) -> Result<()> {
    let bitfield_ranges: Vec<bm_ir::Range> = module
        .ranges
        .values()
        .copied()
        .filter(|r| module.code[r.start as usize].op == AbstractOp::DefineBitField)
        .collect();
    if bitfield_ranges.is_empty() {
        return Ok(());
    }

    for range in bitfield_ranges {
        let bf_pos = CodeRef(range.start as u32);
        let member_fields = member_field_positions(module, range);

        let encode_sites = collect_sites(module, &member_fields, AbstractOp::EncodeInt);
        if !encode_sites.is_empty() {
            let bits = total_bit_size(module, &encode_sites);
            let begin = module.emit(
                Code::new(AbstractOp::BeginEncodePackedOperation)
                    .with_belong(bf_pos)
                    .with_packed_op_type(PackedOpType::Fixed)
                    .with_bit_size(varint((bits + 7) / 8 * 8)?),
            );
            module.emit(Code::new(AbstractOp::EndEncodePackedOperation));
            for idx in encode_sites {
                module.code[idx].fallback = Some(begin);
            }
        }

        let decode_sites = collect_sites(module, &member_fields, AbstractOp::DecodeInt);
        if !decode_sites.is_empty() {
            let bits = total_bit_size(module, &decode_sites);
            let begin = module.emit(
                Code::new(AbstractOp::BeginDecodePackedOperation)
                    .with_belong(bf_pos)
                    .with_packed_op_type(PackedOpType::Fixed)
                    .with_bit_size(varint((bits + 7) / 8 * 8)?),
            );
            module.emit(Code::new(AbstractOp::EndDecodePackedOperation));
            for idx in decode_sites {
                module.code[idx].fallback = Some(begin);
            }
        }
    }
    Ok(())
}

fn member_field_positions(module: &Module, bitfield_range: bm_ir::Range) -> HashSet<usize> {
    let start = bitfield_range.start as usize;
    let end = bitfield_range.end() as usize;
    (start..end).filter(|&idx| module.code[idx].op == AbstractOp::DefineField).collect()
}

fn collect_sites(module: &Module, member_fields: &HashSet<usize>, op: AbstractOp) -> Vec<usize> {
    module
        .code
        .iter()
        .enumerate()
        .filter(|(_, code)| code.op == op)
        .filter(|(_, code)| code.belong.is_some_and(|b| member_fields.contains(&b.index())))
        .map(|(idx, _)| idx)
        .collect()
}

fn total_bit_size(module: &Module, sites: &[usize]) -> u64 {
    sites.iter().filter_map(|&idx| module.code[idx].bit_size.map(|v| v.value())).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_ast::{Enum, Ident, Program as AstProgram, State};

    fn program_with_format(format: Format) -> AstProgram {
        AstProgram {
            ident: Ident::declaration(0, "root"),
            imports: vec![],
            formats: vec![format],
            states: vec![],
            enums: vec![],
        }
    }

    fn plain_field(name: &str, node: u64, ty: TypeExpr) -> Field {
        Field {
            ident: Ident::declaration(node, name),
            type_expr: ty,
            arguments: bm_ast::FieldArguments::default(),
            follow: None,
            belong_struct: None,
            is_state_variable: false,
            bit_alignment: None,
            eventual_bit_alignment: None,
            next: None,
        }
    }

    #[test]
    fn rebind_ident_index_rebuilds_after_tail_append() {
        let mut m = Module::new();
        let fmt_id = m.new_id();
        m.emit(Code::new(AbstractOp::DefineFormat).with_ident(fmt_id));
        m.emit(Code::new(AbstractOp::EndFormat));
        let extra_id = m.new_id();
        m.emit(Code::new(AbstractOp::DefineFunction).with_ident(extra_id));
        m.emit(Code::new(AbstractOp::EndFunction));
        rebind_ident_index(&mut m);
        assert_eq!(*m.index.get(&fmt_id).unwrap(), 0);
        assert_eq!(*m.index.get(&extra_id).unwrap(), 2);
    }

    #[test]
    fn bind_encoder_and_decoder_retargets_pending_calls() {
        let mut m = Module::new();
        let format = Format {
            ident: Ident::declaration(1, "F"),
            fields: vec![plain_field("x", 2, TypeExpr::Int { bits: 16, signed: false })],
            functions: vec![],
            recursive: false,
            bit_size: None,
        };
        let program = program_with_format(format);
        crate::field_lower::lower_program(&mut m, &program).unwrap();

        let format_id = m.idents.lookup(&mut m.ids, &Ident::declaration(1, "F"));
        let format_pos = CodeRef(*m.index.get(&format_id).unwrap() as u32);
        let call = m.emit(Code::new(AbstractOp::CallEncode).with_left_ref(format_pos));
        m.pending_coder_calls.push((call, format_id, CoderMode::Encode));

        bind_encoder_and_decoder(&mut m, &program).unwrap();
        assert_ne!(m.code[call.index()].left_ref, Some(format_pos));
        let retargeted = m.code[call.index()].left_ref.unwrap();
        assert_eq!(m.code[retargeted.index()].op, AbstractOp::DefineFunction);
    }

    #[test]
    fn sort_formats_orders_dependency_before_dependent() {
        let mut m = Module::new();
        let inner = Format {
            ident: Ident::declaration(1, "Inner"),
            fields: vec![],
            functions: vec![],
            recursive: false,
            bit_size: None,
        };
        let outer_field = plain_field(
            "v",
            3,
            TypeExpr::Struct { base: Ident::declaration(1, "Inner"), recursive: false, bit_size: None },
        );
        let outer = Format {
            ident: Ident::declaration(2, "Outer"),
            fields: vec![outer_field],
            functions: vec![],
            recursive: false,
            bit_size: None,
        };
        let program = AstProgram {
            ident: Ident::declaration(0, "root"),
            imports: vec![],
            formats: vec![outer, inner],
            states: vec![],
            enums: vec![],
        };
        crate::field_lower::register_types(&mut m, &program);
        sort_formats(&mut m, &program);
        let inner_id = m.idents.lookup(&mut m.ids, &Ident::declaration(1, "Inner"));
        let outer_id = m.idents.lookup(&mut m.ids, &Ident::declaration(2, "Outer"));
        let inner_pos = m.format_order.iter().position(|&id| id == inner_id).unwrap();
        let outer_pos = m.format_order.iter().position(|&id| id == outer_id).unwrap();
        assert!(inner_pos < outer_pos);
    }

    #[test]
    fn expand_bit_operation_links_fallback_for_packed_members() {
        let mut m = Module::new();
        let mut a = plain_field("a", 2, TypeExpr::Int { bits: 3, signed: false });
        a.bit_alignment = Some(1);
        a.eventual_bit_alignment = Some(4);
        let mut b = plain_field("b", 3, TypeExpr::Int { bits: 5, signed: false });
        b.bit_alignment = Some(4);
        b.eventual_bit_alignment = Some(8);
        let format = Format {
            ident: Ident::declaration(1, "F"),
            fields: vec![a, b],
            functions: vec![],
            recursive: false,
            bit_size: None,
        };
        let program = program_with_format(format.clone());
        crate::field_lower::lower_program(&mut m, &program).unwrap();
        bind_encoder_and_decoder(&mut m, &program).unwrap();
        expand_bit_operation(&mut m).unwrap();
        let packed_begins = m.code.iter().filter(|c| c.op == AbstractOp::BeginEncodePackedOperation).count();
        assert_eq!(packed_begins, 1);
        let linked = m.code.iter().filter(|c| c.op == AbstractOp::EncodeInt && c.fallback.is_some()).count();
        assert_eq!(linked, 2);
    }

    #[test]
    fn decide_bit_field_size_sums_member_widths() {
        let mut m = Module::new();
        let mut a = plain_field("a", 2, TypeExpr::Int { bits: 3, signed: false });
        a.bit_alignment = Some(1);
        a.eventual_bit_alignment = Some(4);
        let mut b = plain_field("b", 3, TypeExpr::Int { bits: 5, signed: false });
        b.bit_alignment = Some(4);
        b.eventual_bit_alignment = Some(8);
        let format = Format {
            ident: Ident::declaration(1, "F"),
            fields: vec![a, b],
            functions: vec![],
            recursive: false,
            bit_size: None,
        };
        let program = program_with_format(format);
        crate::field_lower::lower_program(&mut m, &program).unwrap();
        decide_bit_field_size(&mut m).unwrap();
        let bf = m.code.iter().find(|c| c.op == AbstractOp::DefineBitField).unwrap();
        assert_eq!(bf.bit_size_plus.unwrap().value(), 9);
    }

    #[test]
    fn generate_cfg1_splits_on_control_flow_boundaries() {
        let mut m = Module::new();
        m.emit(Code::new(AbstractOp::DefineFunction));
        m.emit(Code::new(AbstractOp::If));
        m.emit(Code::new(AbstractOp::Break));
        m.emit(Code::new(AbstractOp::EndIf));
        m.emit(Code::new(AbstractOp::EndFunction));
        generate_cfg1(&mut m);
        assert!(m.basic_blocks.len() >= 3);
    }

    #[allow(dead_code)]
    fn use_unused_enum_state(_e: &Enum, _s: &State) {}
}
