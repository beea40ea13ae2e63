//! Field / format / function lowering (`spec.md` §4.10): the definitions
//! pass that walks a [`bm_ast::Program`] and emits its `DEFINE_*`/`END_*`
//! brackets, including bit-field grouping and the union/property field
//! special cases.

use bm_ast::{Enum, Field, Follow, Format, Function, FunctionRole, Param, Program, State, TypeExpr};
use bm_ir::{AbstractOp, Code, FuncType, Storage, Storages};

use crate::control_flow::lower_block;
use crate::error::Result;
use crate::module::Module;
use crate::storage_build::define_storage;
use crate::union_cond::handle_union_type;

/// Emits a `SPECIFY_STORAGE_TYPE` carrying `storages`, interning it against
/// the module's storage table first so two fields of identical type share
/// one `StorageRef` (`spec.md` §4.2's dedup rule, extended to types).
fn emit_storage_type(module: &mut Module, storages: Vec<Storage>) -> bm_ir::CodeRef {
    let storages = Storages::new(storages);
    let storage_ref = module.storages.intern(&mut module.ids, storages.clone());
    module.emit(Code::new(AbstractOp::SpecifyStorageType).with_storage(storages).with_storage_ref(storage_ref))
}

/// Registers every format/state/enum's ident against the type it resolves
/// to, so `define_storage`'s `ident_type` rule can recurse through a named
/// reference before any field lowering runs (`spec.md` §5's ordering
/// guarantee: "definition lowering must complete for every type before any
/// encode/decode lowering references it").
pub fn register_types(module: &mut Module, program: &Program) {
    for format in &program.formats {
        let id = module.idents.lookup(&mut module.ids, &format.ident);
        module.type_env.insert(
            id,
            TypeExpr::Struct {
                base: format.ident.clone(),
                recursive: format.recursive,
                bit_size: format.bit_size,
            },
        );
        if format.recursive {
            module.recursive_formats.insert(id);
        }
    }
    for state in &program.states {
        let id = module.idents.lookup(&mut module.ids, &state.ident);
        module.type_env.insert(
            id,
            TypeExpr::Struct {
                base: state.ident.clone(),
                recursive: false,
                bit_size: None,
            },
        );
    }
    for en in &program.enums {
        let id = module.idents.lookup(&mut module.ids, &en.ident);
        module.type_env.insert(id, TypeExpr::Enum { base: en.ident.clone() });
        if let Some(underlying) = &en.underlying {
            module.enum_underlying.insert(id, underlying.clone());
        }
    }
}

pub fn lower_program(module: &mut Module, program: &Program) -> Result<()> {
    register_types(module, program);
    let program_id = module.idents.lookup(&mut module.ids, &program.ident);
    module.emit(Code::new(AbstractOp::DefineProgram).with_ident(program_id));
    for format in &program.formats {
        lower_format(module, format)?;
    }
    for state in &program.states {
        lower_state(module, state)?;
    }
    for en in &program.enums {
        lower_enum(module, en)?;
    }
    module.emit(Code::new(AbstractOp::EndProgram));
    Ok(())
}

fn lower_format(module: &mut Module, format: &Format) -> Result<()> {
    let format_id = module.idents.lookup(&mut module.ids, &format.ident);
    let format_pos = module.emit(Code::new(AbstractOp::DefineFormat).with_ident(format_id));
    let saved_belong = module.current_belong;
    module.current_belong = Some(format_pos);

    lower_field_run(module, &format.fields)?;
    for function in &format.functions {
        lower_function(module, function, format_id)?;
    }

    module.current_belong = saved_belong;
    module.emit(Code::new(AbstractOp::EndFormat));
    Ok(())
}

fn lower_state(module: &mut Module, state: &State) -> Result<()> {
    let state_id = module.idents.lookup(&mut module.ids, &state.ident);
    let state_pos = module.emit(Code::new(AbstractOp::DefineState).with_ident(state_id));
    let saved_belong = module.current_belong;
    module.current_belong = Some(state_pos);
    lower_field_run(module, &state.fields)?;
    module.current_belong = saved_belong;
    module.emit(Code::new(AbstractOp::EndState));
    Ok(())
}

fn lower_enum(module: &mut Module, en: &Enum) -> Result<()> {
    let enum_id = module.idents.lookup(&mut module.ids, &en.ident);
    module.emit(Code::new(AbstractOp::DefineEnum).with_ident(enum_id));
    for member in &en.members {
        let member_id = module.idents.lookup(&mut module.ids, &member.ident);
        module.emit(Code::new(AbstractOp::DefineEnumMember).with_ident(member_id).with_int_value(member.value));
    }
    module.emit(Code::new(AbstractOp::EndEnum));
    Ok(())
}

/// A field "starts" a bit-field group if its starting bit alignment is not a
/// byte boundary; the group closes at the first field whose *ending*
/// alignment lands on one (`spec.md` §4.10).
fn starts_bit_field(field: &Field) -> bool {
    field.bit_alignment.is_some_and(|a| a % 8 != 0)
}

fn ends_bit_field(field: &Field) -> bool {
    field.eventual_bit_alignment.is_some_and(|a| a % 8 == 0)
}

/// Walks a run of sibling fields, wrapping runs of adjacent sub-byte fields
/// in `DEFINE_BIT_FIELD`/`END_BIT_FIELD` brackets.
fn lower_field_run(module: &mut Module, fields: &[Field]) -> Result<()> {
    let mut i = 0;
    while i < fields.len() {
        if starts_bit_field(&fields[i]) {
            let mut end = i;
            while end < fields.len() - 1 && !ends_bit_field(&fields[end]) {
                end += 1;
            }
            let bf_id = module.new_id();
            let saved_belong = module.current_belong;
            let bf_pos = match saved_belong {
                Some(b) => module.emit(Code::new(AbstractOp::DefineBitField).with_ident(bf_id).with_belong(b)),
                None => module.emit(Code::new(AbstractOp::DefineBitField).with_ident(bf_id)),
            };
            module.current_belong = Some(bf_pos);
            for field in &fields[i..=end] {
                lower_field(module, field)?;
            }
            module.current_belong = saved_belong;
            module.emit(Code::new(AbstractOp::EndBitField));
            i = end + 1;
        } else {
            lower_field(module, &fields[i])?;
            i += 1;
        }
    }
    Ok(())
}

fn lower_field(module: &mut Module, field: &Field) -> Result<()> {
    match &field.type_expr {
        TypeExpr::StructUnion { members } => lower_union_field(module, field, members),
        TypeExpr::Union { arms, common_type } => lower_property_field(module, field, arms, common_type.as_deref()),
        _ => lower_plain_field(module, field),
    }
}

fn lower_plain_field(module: &mut Module, field: &Field) -> Result<()> {
    let field_id = module.idents.lookup(&mut module.ids, &field.ident);
    module.type_env.insert(field_id, field.type_expr.clone());

    let mut code = Code::new(AbstractOp::DefineField).with_ident(field_id);
    if let Some(belong) = module.current_belong {
        code = code.with_belong(belong);
    }
    module.emit(code);

    let mut storages = Vec::new();
    define_storage(module, &field.type_expr, &mut storages)?;
    emit_storage_type(module, storages);

    for assertion in &field.arguments.direct_match {
        let value = crate::expr::lower_expr(module, assertion)?;
        let self_ref = module.emit(Code::new(AbstractOp::IdentRef).with_ident(field_id));
        module.emit(
            Code::new(AbstractOp::Binary)
                .with_bop(bm_ir::BinOp::Equal)
                .with_left_ref(self_ref)
                .with_right_ref(value),
        );
    }

    module.emit(Code::new(AbstractOp::EndField));
    Ok(())
}

/// A field whose type is a `StructUnionType` (untagged storage view): wraps a
/// `DEFINE_UNION` with one `DEFINE_UNION_MEMBER` per alternative, and
/// back-patches the field's `Variant` storage with the freshly minted union
/// id (`spec.md` §4.10).
fn lower_union_field(module: &mut Module, field: &Field, members: &[TypeExpr]) -> Result<()> {
    let field_id = module.idents.lookup(&mut module.ids, &field.ident);
    let union_id = module.new_id();

    let mut field_code = Code::new(AbstractOp::DefineField).with_ident(field_id);
    if let Some(belong) = module.current_belong {
        field_code = field_code.with_belong(belong);
    }
    let field_pos = module.emit(field_code);

    let mut storages = Vec::new();
    define_storage(module, &field.type_expr, &mut storages)?;
    if let Some(Storage::Variant { reference, .. }) = storages.first_mut() {
        *reference = union_id;
    }
    emit_storage_type(module, storages);

    let union_pos = module.emit(Code::new(AbstractOp::DefineUnion).with_ident(union_id).with_belong(field_pos));
    for (i, member) in members.iter().enumerate() {
        let member_id = module.new_id();
        module.emit(
            Code::new(AbstractOp::DefineUnionMember)
                .with_ident(member_id)
                .with_belong(union_pos)
                .with_int_value(i as i64),
        );
        let mut member_storage = Vec::new();
        define_storage(module, member, &mut member_storage)?;
        emit_storage_type(module, member_storage);
        module.emit(Code::new(AbstractOp::EndUnionMember));
    }
    module.emit(Code::new(AbstractOp::EndUnion));
    module.emit(Code::new(AbstractOp::EndField));
    Ok(())
}

/// A field whose type is the discriminated `Union` view: lowered as a
/// `DEFINE_PROPERTY` containing one `CONDITIONAL_FIELD` per arm, optionally
/// sealed with a `MERGED_CONDITIONAL_FIELD` (`spec.md` §4.7, §4.10).
fn lower_property_field(
    module: &mut Module,
    field: &Field,
    arms: &[bm_ast::UnionArm],
    common_type: Option<&TypeExpr>,
) -> Result<()> {
    let field_id = module.idents.lookup(&mut module.ids, &field.ident);
    module.type_env.insert(field_id, field.type_expr.clone());

    let mut code = Code::new(AbstractOp::DefineProperty).with_ident(field_id);
    if let Some(belong) = module.current_belong {
        code = code.with_belong(belong);
    }
    module.emit(code);

    let arm_results = handle_union_type(module, None, arms)?;
    for (cond, arm_field) in &arm_results {
        let mut cf = Code::new(AbstractOp::ConditionalField).with_reference(*cond);
        if let Some(ty) = arm_field {
            let mut storages = Vec::new();
            define_storage(module, ty, &mut storages)?;
            let storages = Storages::new(storages);
            let storage_ref = module.storages.intern(&mut module.ids, storages.clone());
            cf = cf.with_storage(storages).with_storage_ref(storage_ref);
        }
        module.emit(cf);
    }

    if let Some(common) = common_type {
        let mut storages = Vec::new();
        define_storage(module, common, &mut storages)?;
        let storages = Storages::new(storages);
        let storage_ref = module.storages.intern(&mut module.ids, storages.clone());
        module.emit(
            Code::new(AbstractOp::MergedConditionalField)
                .with_merge_mode(bm_ir::MergeMode::CommonType)
                .with_storage(storages)
                .with_storage_ref(storage_ref),
        );
    }

    module.emit(Code::new(AbstractOp::EndProperty));
    Ok(())
}

/// Lowers a user-written (or synthesized) function. Encode/decode coders
/// get a `CODER_RETURN` storage prefixed onto their declared return type so
/// backends emit a `Result`-like signature (`spec.md` §4.10).
pub fn lower_function(module: &mut Module, function: &Function, belong_format: bm_types::ObjectId) -> Result<()> {
    let func_id = module.idents.lookup(&mut module.ids, &function.ident);
    let belong_pos = module.index.get(&belong_format).copied().map(|p| bm_ir::CodeRef(p as u32));

    let func_type = match function.role {
        FunctionRole::Encode => FuncType::Encoder,
        FunctionRole::Decode => FuncType::Decoder,
        FunctionRole::UserDefined => FuncType::UserDefined,
    };
    let mut code = Code::new(AbstractOp::DefineFunction).with_ident(func_id).with_func_type(func_type);
    if let Some(b) = belong_pos {
        code = code.with_belong(b);
    }
    module.emit(code);

    let saved_function = module.current_function.replace(func_id);
    let saved_mode = module.mode;
    module.mode = match function.role {
        FunctionRole::Encode => Some(crate::module::CoderMode::Encode),
        FunctionRole::Decode => Some(crate::module::CoderMode::Decode),
        FunctionRole::UserDefined => None,
    };

    for param in &function.params {
        lower_param(module, param)?;
    }

    let mut return_storages = Vec::new();
    if matches!(function.role, FunctionRole::Encode | FunctionRole::Decode) {
        return_storages.push(Storage::CoderReturn);
    }
    if let Some(return_type) = &function.return_type {
        define_storage(module, return_type, &mut return_storages)?;
    }
    if !return_storages.is_empty() {
        emit_storage_type(module, return_storages);
    }

    lower_block(module, &function.body)?;

    module.mode = saved_mode;
    module.current_function = saved_function;
    module.emit(Code::new(AbstractOp::EndFunction));
    Ok(())
}

fn lower_param(module: &mut Module, param: &Param) -> Result<()> {
    let param_id = module.idents.lookup(&mut module.ids, &param.ident);
    module.emit(Code::new(AbstractOp::DefineParameter).with_ident(param_id));
    let mut storages = Vec::new();
    define_storage(module, &param.type_expr, &mut storages)?;
    emit_storage_type(module, storages);
    module.emit(Code::new(AbstractOp::EndParameter));
    Ok(())
}

/// Whether a field's `follow` attribute is internally consistent with its
/// resolved type (`spec.md` §7's `InvalidFollow`): only dynamic-length
/// vectors can carry one.
pub fn check_follow_consistency(field: &Field) -> Result<()> {
    if field.follow.is_none() {
        return Ok(());
    }
    match &field.type_expr {
        TypeExpr::Array { length: None, .. } => Ok(()),
        TypeExpr::Array { length: Some(_), .. } => Err(crate::error::Error::InvalidFollow(format!(
            "field {:?} has a follow attribute but a statically-sized array type",
            field.ident.name
        ))),
        other => Err(crate::error::Error::InvalidFollow(format!(
            "field {:?}'s follow attribute requires a vector type, got {other:?}",
            field.ident.name
        ))),
    }
}

/// `Follow::Fixed` requires a later field's byte width to subtract against;
/// callers that can't determine one raise `InvalidFollow` rather than guess.
pub fn describe_follow(follow: Follow) -> &'static str {
    match follow {
        Follow::End => "end",
        Follow::Fixed => "fixed",
        Follow::Constant => "constant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_ast::{FieldArguments, Ident};

    fn plain_field(name: &str, node: u64, ty: TypeExpr) -> Field {
        Field {
            ident: Ident::declaration(node, name),
            type_expr: ty,
            arguments: FieldArguments::default(),
            follow: None,
            belong_struct: None,
            is_state_variable: false,
            bit_alignment: None,
            eventual_bit_alignment: None,
            next: None,
        }
    }

    #[test]
    fn trivial_u16_field_matches_scenario_a_skeleton() {
        let mut m = Module::new();
        let format = Format {
            ident: Ident::declaration(1, "F"),
            fields: vec![plain_field("x", 2, TypeExpr::Int { bits: 16, signed: false })],
            functions: vec![],
            recursive: false,
            bit_size: None,
        };
        let program = Program {
            ident: Ident::declaration(0, "root"),
            imports: vec![],
            formats: vec![format],
            states: vec![],
            enums: vec![],
        };
        lower_program(&mut m, &program).unwrap();
        let ops: Vec<_> = m.code.iter().map(|c| c.op).collect();
        assert_eq!(
            ops,
            vec![
                AbstractOp::DefineProgram,
                AbstractOp::DefineFormat,
                AbstractOp::DefineField,
                AbstractOp::SpecifyStorageType,
                AbstractOp::EndField,
                AbstractOp::EndFormat,
                AbstractOp::EndProgram,
            ]
        );
    }

    #[test]
    fn bit_field_run_wraps_adjacent_sub_byte_fields() {
        let mut m = Module::new();
        let mut a = plain_field("a", 2, TypeExpr::Int { bits: 3, signed: false });
        a.bit_alignment = Some(0);
        a.eventual_bit_alignment = Some(3);
        let mut b = plain_field("b", 3, TypeExpr::Int { bits: 5, signed: false });
        b.bit_alignment = Some(3);
        b.eventual_bit_alignment = Some(8);
        let format = Format {
            ident: Ident::declaration(1, "F"),
            fields: vec![a, b],
            functions: vec![],
            recursive: false,
            bit_size: None,
        };
        lower_format(&mut m, &format).unwrap();
        let ops: Vec<_> = m.code.iter().map(|c| c.op).collect();
        assert_eq!(ops.first().copied(), Some(AbstractOp::DefineFormat));
        assert!(ops.contains(&AbstractOp::DefineBitField));
        assert!(ops.contains(&AbstractOp::EndBitField));
        let begin = ops.iter().position(|op| *op == AbstractOp::DefineBitField).unwrap();
        let end = ops.iter().position(|op| *op == AbstractOp::EndBitField).unwrap();
        assert_eq!(ops[begin + 1..end].iter().filter(|op| **op == AbstractOp::DefineField).count(), 2);
    }
}
