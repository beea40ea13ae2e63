//! Decode synthesis (`spec.md` §4.9, `decode_type`): the mirror image of
//! [`crate::codec_encode`], plus the `follow`-driven termination machinery
//! for open-ended vectors.

use bm_ast::{Expr, Follow, TypeExpr};
use bm_ir::{AbstractOp, CastType, Code, CodeRef, DecodeFlags, Endian};
use bm_types::{ObjectId, Varint};

use crate::error::{Error, Result};
use crate::expr::lower_expr;
use crate::module::{CoderMode, Module};

fn varint(n: u64) -> Result<Varint> {
    Varint::encode(n).map_err(|_| Error::VarintOverflow(n))
}

fn const_len(expr: &Expr) -> Option<u64> {
    match expr {
        Expr::IntLiteral { value, .. } => u64::try_from(*value).ok(),
        Expr::Int64Literal { value, .. } => u64::try_from(*value).ok(),
        _ => None,
    }
}

fn resolve(module: &Module, ty: &TypeExpr) -> Result<TypeExpr> {
    match ty {
        TypeExpr::Ident(ident) => {
            let id = module.idents.id_for_node(ident.base.unwrap_or(ident.node_id)).ok_or(Error::MissingBinding(ident.node_id))?;
            let next = module.type_env.get(&id).cloned().ok_or(Error::MissingBinding(ident.node_id))?;
            resolve(module, &next)
        }
        other => Ok(other.clone()),
    }
}

/// Decodes `ty` into a fresh value, returning the [`CodeRef`] that reads it
/// back (every leaf op binds a fresh ephemeral ident internally so composite
/// callers compose uniformly regardless of which op actually wrote it).
pub fn decode_type(
    module: &mut Module,
    field_pos: CodeRef,
    ty: &TypeExpr,
    follow: Option<Follow>,
    terminator: Option<&Expr>,
) -> Result<CodeRef> {
    match resolve(module, ty)? {
        TypeExpr::Bool => {
            let id = module.idents.fresh_ephemeral(&mut module.ids, "decoded_bool");
            module.emit(Code::new(AbstractOp::DecodeInt).with_ident(id).with_bit_size(varint(1)?).with_endian(Endian::Big).with_belong(field_pos));
            Ok(module.emit(Code::new(AbstractOp::IdentRef).with_ident(id)))
        }
        TypeExpr::Int { bits, .. } => decode_int(module, field_pos, bits, Endian::Big),
        TypeExpr::Float { bits } => {
            let int_ref = decode_int(module, field_pos, bits, Endian::Big)?;
            Ok(module.emit(Code::new(AbstractOp::Cast).with_cast_type(CastType::FloatBitReinterpret).with_reference(int_ref)))
        }
        TypeExpr::Enum { base } => {
            let enum_id = module.idents.lookup(&mut module.ids, &base);
            let underlying = module
                .enum_underlying
                .get(&enum_id)
                .cloned()
                .ok_or_else(|| Error::BugInvariant(format!("enum {} has no underlying type recorded", base.name)))?;
            let as_int = decode_type(module, field_pos, &underlying, None, None)?;
            Ok(module.emit(Code::new(AbstractOp::Cast).with_cast_type(CastType::IntToEnum).with_reference(as_int)))
        }
        TypeExpr::Struct { base, recursive, bit_size } => decode_struct_ref(module, field_pos, &base, recursive, bit_size),
        TypeExpr::Array { element, length: Some(len_expr) } => decode_array(module, field_pos, &element, &len_expr),
        TypeExpr::Array { element, length: None } => decode_open_vector(module, field_pos, &element, follow, terminator),
        other => Err(Error::UnsupportedType(format!("decode_type has no rule for {other:?}"))),
    }
}

fn decode_int(module: &mut Module, field_pos: CodeRef, bits: u32, endian: Endian) -> Result<CodeRef> {
    let id = module.idents.fresh_ephemeral(&mut module.ids, "decoded_int");
    module.emit(
        Code::new(AbstractOp::DecodeInt)
            .with_ident(id)
            .with_bit_size(varint(bits as u64)?)
            .with_endian(endian)
            .with_belong(field_pos),
    );
    Ok(module.emit(Code::new(AbstractOp::IdentRef).with_ident(id)))
}

fn decode_struct_ref(
    module: &mut Module,
    field_pos: CodeRef,
    base: &bm_ast::Ident,
    recursive: bool,
    bit_size: Option<u64>,
) -> Result<CodeRef> {
    let format_id = module.idents.lookup(&mut module.ids, base);
    let recursive = recursive || module.recursive_formats.contains(&format_id);
    let target = module.idents.fresh_ephemeral(&mut module.ids, "decoded_struct");

    if recursive {
        // `fallback.hpp`'s `new_default_var`: allocate a zero-valued instance
        // before decoding fields into it, rather than decoding in place.
        module.emit(Code::new(AbstractOp::NewObject).with_ident(target).with_belong(field_pos));
    }

    let size_plus = match bit_size {
        Some(n) => varint(n + 1)?,
        None => varint(0)?,
    };
    let format_pos = module
        .index
        .get(&format_id)
        .copied()
        .map(|p| CodeRef(p as u32))
        .ok_or_else(|| Error::BugInvariant(format!("format {} not yet lowered", base.name)))?;

    let mut call_code = Code::new(AbstractOp::CallDecode)
        .with_left_ref(format_pos)
        .with_bit_size_plus(size_plus)
        .with_belong(field_pos);
    if recursive {
        let target_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(target));
        call_code = call_code.with_right_ref(target_read);
    }
    let call = module.emit(call_code);
    module.pending_coder_calls.push((call, format_id, CoderMode::Decode));
    if !recursive {
        module.emit(Code::new(AbstractOp::DefineVariable).with_ident(target).with_reference(call));
    }
    Ok(module.emit(Code::new(AbstractOp::IdentRef).with_ident(target)))
}

fn decode_array(module: &mut Module, field_pos: CodeRef, element: &TypeExpr, len_expr: &Expr) -> Result<CodeRef> {
    let resolved_elem = resolve(module, element)?;
    let target = module.idents.fresh_ephemeral(&mut module.ids, "decoded_array");

    match (&resolved_elem, const_len(len_expr)) {
        (TypeExpr::Int { bits, .. }, Some(n)) => {
            module.emit(Code::new(AbstractOp::ReserveSize).with_ident(target).with_int_value(n as i64).with_belong(field_pos));
            module.emit(
                Code::new(AbstractOp::DecodeIntVector)
                    .with_ident(target)
                    .with_bit_size(varint(*bits as u64)?)
                    .with_endian(Endian::Big)
                    .with_belong(field_pos),
            );
        }
        (_, Some(n)) => {
            let zero = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(0));
            module.emit(Code::new(AbstractOp::DefineVariable).with_ident(target).with_reference(zero));
            module.emit(Code::new(AbstractOp::ReserveSize).with_ident(target).with_int_value(n as i64).with_belong(field_pos));
            decode_counter_loop(module, field_pos, target, &resolved_elem, n)?;
        }
        (_, None) => {
            let len_ref = lower_expr(module, len_expr)?;
            module.emit(Code::new(AbstractOp::DefineVariable).with_ident(target).with_reference(len_ref));
            module.emit(Code::new(AbstractOp::ReserveSize).with_ident(target).with_reference(len_ref).with_belong(field_pos));
            decode_counter_loop_runtime(module, field_pos, target, &resolved_elem, len_ref)?;
        }
    }
    Ok(module.emit(Code::new(AbstractOp::IdentRef).with_ident(target)))
}

fn decode_counter_loop(module: &mut Module, field_pos: CodeRef, target: ObjectId, element: &TypeExpr, n: u64) -> Result<()> {
    let counter = module.idents.fresh_ephemeral(&mut module.ids, "decode_counter");
    let zero = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(0));
    module.emit(Code::new(AbstractOp::DefineVariable).with_ident(counter).with_reference(zero));
    let limit = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(n as i64));
    let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
    let cond = module.emit(Code::new(AbstractOp::Binary).with_bop(bm_ir::BinOp::Less).with_left_ref(counter_read).with_right_ref(limit));
    module.emit(Code::new(AbstractOp::LoopCondition).with_reference(cond));
    let element_ref = decode_type(module, field_pos, element, None, None)?;
    let target_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(target));
    module.emit(Code::new(AbstractOp::Append).with_left_ref(target_read).with_right_ref(element_ref));
    let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
    module.emit(Code::new(AbstractOp::Inc).with_reference(counter_read));
    module.emit(Code::new(AbstractOp::EndLoop));
    Ok(())
}

fn decode_counter_loop_runtime(module: &mut Module, field_pos: CodeRef, target: ObjectId, element: &TypeExpr, limit: CodeRef) -> Result<()> {
    let counter = module.idents.fresh_ephemeral(&mut module.ids, "decode_counter");
    let zero = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(0));
    module.emit(Code::new(AbstractOp::DefineVariable).with_ident(counter).with_reference(zero));
    let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
    let cond = module.emit(Code::new(AbstractOp::Binary).with_bop(bm_ir::BinOp::Less).with_left_ref(counter_read).with_right_ref(limit));
    module.emit(Code::new(AbstractOp::LoopCondition).with_reference(cond));
    let element_ref = decode_type(module, field_pos, element, None, None)?;
    let target_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(target));
    module.emit(Code::new(AbstractOp::Append).with_left_ref(target_read).with_right_ref(element_ref));
    let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
    module.emit(Code::new(AbstractOp::Inc).with_reference(counter_read));
    module.emit(Code::new(AbstractOp::EndLoop));
    Ok(())
}

/// The three `follow` termination rules for an open-ended (`..`) vector
/// (`spec.md` §4.9).
fn decode_open_vector(
    module: &mut Module,
    field_pos: CodeRef,
    element: &TypeExpr,
    follow: Option<Follow>,
    terminator: Option<&Expr>,
) -> Result<CodeRef> {
    let resolved_elem = resolve(module, element)?;
    let target = module.idents.fresh_ephemeral(&mut module.ids, "decoded_vector");
    let empty = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(0));
    module.emit(Code::new(AbstractOp::DefineVariable).with_ident(target).with_reference(empty));

    match follow {
        Some(Follow::End) => decode_until_eof(module, field_pos, target, &resolved_elem)?,
        Some(Follow::Fixed) => decode_fixed_tail(module, field_pos, target, &resolved_elem)?,
        Some(Follow::Constant) => decode_constant_terminated(module, field_pos, target, &resolved_elem, terminator)?,
        None => decode_until_eof(module, field_pos, target, &resolved_elem)?,
    }

    Ok(module.emit(Code::new(AbstractOp::IdentRef).with_ident(target)))
}

fn decode_until_eof(module: &mut Module, field_pos: CodeRef, target: ObjectId, element: &TypeExpr) -> Result<()> {
    if let TypeExpr::Int { bits: 8, .. } = resolve(module, element)? {
        module.emit(
            Code::new(AbstractOp::DecodeIntVectorUntilEof)
                .with_ident(target)
                .with_bit_size(varint(8)?)
                .with_decode_flags(DecodeFlags::EOF_TERMINATED)
                .with_belong(field_pos),
        );
        return Ok(());
    }
    let can_read = module.emit(Code::new(AbstractOp::CanRead).with_belong(field_pos));
    module.emit(Code::new(AbstractOp::LoopCondition).with_reference(can_read));
    let element_ref = decode_type(module, field_pos, element, None, None)?;
    let target_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(target));
    module.emit(Code::new(AbstractOp::Append).with_left_ref(target_read).with_right_ref(element_ref));
    module.emit(Code::new(AbstractOp::EndLoop));
    Ok(())
}

/// `REMAIN_BYTES / tail`, asserted divisible by the element size when it's a
/// fixed-width int, decoded exactly that many times
/// (`spec.md` §4.9's `follow=fixed`).
fn decode_fixed_tail(module: &mut Module, field_pos: CodeRef, target: ObjectId, element: &TypeExpr) -> Result<()> {
    let remain = module.emit(Code::new(AbstractOp::RemainBytes).with_belong(field_pos));

    if let TypeExpr::Int { bits, .. } = resolve(module, element)? {
        let elem_bytes = (bits as i64 + 7) / 8;
        let elem_size = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(elem_bytes));
        let remainder = module.emit(Code::new(AbstractOp::Binary).with_bop(bm_ir::BinOp::Mod).with_left_ref(remain).with_right_ref(elem_size));
        let zero = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(0));
        let divisible = module.emit(Code::new(AbstractOp::Binary).with_bop(bm_ir::BinOp::Equal).with_left_ref(remainder).with_right_ref(zero));
        let assert_callee = module.idents.fresh_ephemeral(&mut module.ids, "assert");
        module.emit(Code::new(AbstractOp::Call).with_ident(assert_callee).with_param(vec![divisible]));
        let count = module.emit(Code::new(AbstractOp::Binary).with_bop(bm_ir::BinOp::Div).with_left_ref(remain).with_right_ref(elem_size));
        decode_counter_loop_runtime(module, field_pos, target, &TypeExpr::Int { bits, signed: false }, count)
    } else {
        let count = module.idents.fresh_ephemeral(&mut module.ids, "fixed_tail_count");
        module.emit(Code::new(AbstractOp::DefineVariable).with_ident(count).with_reference(remain));
        let count_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(count));
        decode_counter_loop_runtime(module, field_pos, target, element, count_read)
    }
}

/// An infinite loop that peeks the terminator length, compares element-wise
/// via a phi-propagated bool flag, and breaks on a match
/// (`spec.md` §4.9's `follow=constant`, scenario D).
fn decode_constant_terminated(
    module: &mut Module,
    field_pos: CodeRef,
    target: ObjectId,
    element: &TypeExpr,
    terminator: Option<&Expr>,
) -> Result<()> {
    let terminator = terminator.ok_or_else(|| {
        Error::BugInvariant("follow=constant requires a terminator literal".to_string())
    })?;
    let term_ref = lower_expr(module, terminator)?;
    let term_len = module.emit(Code::new(AbstractOp::ArraySize).with_reference(term_ref));

    module.emit(Code::new(AbstractOp::LoopInfinite));
    module.phi_stack.push(Default::default());
    let peeked = module.emit(
        Code::new(AbstractOp::PeekIntVector)
            .with_reference(term_len)
            .with_bit_size(varint(8)?)
            .with_decode_flags(DecodeFlags::CONSTANT_TERMINATED)
            .with_belong(field_pos),
    );
    let matched = module.emit(
        Code::new(AbstractOp::Binary)
            .with_bop(bm_ir::BinOp::Equal)
            .with_left_ref(peeked)
            .with_right_ref(term_ref),
    );
    let flag = module.idents.fresh_ephemeral(&mut module.ids, "constant_terminated_flag");
    let flag_def = module.emit(Code::new(AbstractOp::DefineVariable).with_ident(flag).with_reference(matched));

    module.emit(Code::new(AbstractOp::If).with_reference(flag_def));
    module.phi_stack.last_mut().expect("just pushed").open_arm(Some(flag_def));
    module.emit(Code::new(AbstractOp::Break));
    module.phi_stack.last_mut().expect("open if frame").open_arm(None);
    module.emit(Code::new(AbstractOp::Else));
    let element_ref = decode_type(module, field_pos, element, None, None)?;
    let target_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(target));
    module.emit(Code::new(AbstractOp::Append).with_left_ref(target_read).with_right_ref(element_ref));
    module.emit(Code::new(AbstractOp::EndIf));
    crate::control_flow::insert_phis(module);
    module.emit(Code::new(AbstractOp::EndLoop));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_u16_decode_emits_decode_int() {
        let mut m = Module::new();
        let r = decode_type(&mut m, CodeRef(0), &TypeExpr::Int { bits: 16, signed: false }, None, None).unwrap();
        let ident_ref = m.get(r);
        assert_eq!(ident_ref.op, AbstractOp::IdentRef);
        let decode = m.code.iter().find(|c| c.op == AbstractOp::DecodeInt).unwrap();
        assert_eq!(decode.bit_size.unwrap().value(), 16);
    }

    #[test]
    fn eof_follow_on_byte_vector_emits_until_eof() {
        let mut m = Module::new();
        let ty = TypeExpr::Array { element: Box::new(TypeExpr::Int { bits: 8, signed: false }), length: None };
        decode_type(&mut m, CodeRef(0), &ty, Some(Follow::End), None).unwrap();
        assert!(m.code.iter().any(|c| c.op == AbstractOp::DecodeIntVectorUntilEof));
    }
}
