//! Encode synthesis (`spec.md` §4.8, `encode_type`): dispatches on a field's
//! resolved AST type and emits the IR sequence that writes its value to the
//! output.

use bm_ast::{Expr, TypeExpr};
use bm_ir::{AbstractOp, CastType, Code, CodeRef, EncodeFlags, Endian};
use bm_types::Varint;

use crate::error::{Error, Result};
use crate::expr::lower_expr;
use crate::module::{CoderMode, Module};
use crate::storage_build::define_storage;

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

/// Resolves an `Ident` type expression through `module.type_env` until it
/// reaches a non-`Ident` shape.
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

/// Emits the encode IR for `value` (already-lowered, e.g. an `IDENT_REF` of
/// the field) at `field_pos` (the owning `DEFINE_FIELD`'s position), per the
/// dispatch table in `spec.md` §4.8.
pub fn encode_type(
    module: &mut Module,
    field_pos: CodeRef,
    value: CodeRef,
    ty: &TypeExpr,
    has_alignment: bool,
) -> Result<()> {
    match resolve(module, ty)? {
        TypeExpr::Bool => {
            let bits = varint(1)?;
            module.emit(
                Code::new(AbstractOp::EncodeInt)
                    .with_reference(value)
                    .with_bit_size(bits)
                    .with_endian(Endian::Big)
                    .with_belong(field_pos),
            );
            Ok(())
        }
        TypeExpr::Int { bits, .. } => {
            encode_endian_aware(module, field_pos, value, bits, Endian::Big);
            Ok(())
        }
        TypeExpr::Float { bits } => {
            let as_int = module.emit(Code::new(AbstractOp::Cast).with_cast_type(CastType::FloatBitReinterpret).with_reference(value));
            encode_endian_aware(module, field_pos, as_int, bits, Endian::Big);
            Ok(())
        }
        TypeExpr::StrLiteral { value: literal } => {
            encode_str_literal(module, field_pos, &literal);
            Ok(())
        }
        TypeExpr::Enum { base } => {
            let enum_id = module.idents.lookup(&mut module.ids, &base);
            let underlying = module
                .enum_underlying
                .get(&enum_id)
                .cloned()
                .ok_or_else(|| Error::BugInvariant(format!("enum {} has no underlying type recorded", base.name)))?;
            let as_int = module.emit(Code::new(AbstractOp::Cast).with_cast_type(CastType::EnumToInt).with_reference(value));
            encode_type(module, field_pos, as_int, &underlying, has_alignment)
        }
        TypeExpr::Struct { base, recursive, bit_size } => {
            encode_struct_ref(module, field_pos, value, &base, recursive, bit_size)
        }
        TypeExpr::Array { element, length: Some(len_expr) } => {
            encode_array(module, field_pos, value, &element, &len_expr, has_alignment)
        }
        TypeExpr::Array { element, length: None } => {
            encode_open_vector(module, field_pos, value, &element, has_alignment)
        }
        other => Err(Error::UnsupportedType(format!("encode_type has no rule for {other:?}"))),
    }
}

fn encode_endian_aware(module: &mut Module, field_pos: CodeRef, value: CodeRef, bits: u32, endian: Endian) {
    let size = varint(bits as u64).expect("storage builder already validated bit width");
    module.emit(
        Code::new(AbstractOp::EncodeInt)
            .with_reference(value)
            .with_bit_size(size)
            .with_endian(endian)
            .with_belong(field_pos),
    );
}

/// `counter loop 0..L: INDEX(lit, i) -> ENCODE_INT(8)` (`spec.md` §4.8).
fn encode_str_literal(module: &mut Module, field_pos: CodeRef, literal: &str) {
    let bits = varint(8).expect("8 always fits a varint");
    for byte in literal.bytes() {
        let byte_ref = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(byte as i64));
        module.emit(
            Code::new(AbstractOp::EncodeInt)
                .with_reference(byte_ref)
                .with_bit_size(bits.clone())
                .with_endian(Endian::Big)
                .with_belong(field_pos),
        );
    }
}

fn encode_struct_ref(
    module: &mut Module,
    field_pos: CodeRef,
    value: CodeRef,
    base: &bm_ast::Ident,
    recursive: bool,
    bit_size: Option<u64>,
) -> Result<()> {
    let format_id = module.idents.lookup(&mut module.ids, base);
    let recursive = recursive || module.recursive_formats.contains(&format_id);
    if recursive {
        module.emit(Code::new(AbstractOp::CheckRecursiveStruct).with_reference(value).with_belong(field_pos));
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
    let call = module.emit(
        Code::new(AbstractOp::CallEncode)
            .with_left_ref(format_pos)
            .with_right_ref(value)
            .with_bit_size_plus(size_plus)
            .with_belong(field_pos),
    );
    module.pending_coder_calls.push((call, format_id, CoderMode::Encode));
    Ok(())
}

fn encode_array(
    module: &mut Module,
    field_pos: CodeRef,
    value: CodeRef,
    element: &TypeExpr,
    len_expr: &Expr,
    has_alignment: bool,
) -> Result<()> {
    let resolved_elem = resolve(module, element)?;
    match (&resolved_elem, const_len(len_expr)) {
        (TypeExpr::Int { bits, .. }, Some(n)) => {
            let size = varint(*bits as u64)?;
            let n_varint = varint(n)?;
            module.emit(
                Code::new(AbstractOp::EncodeIntVectorFixed)
                    .with_left_ref(value)
                    .with_int_value(n as i64)
                    .with_bit_size(size)
                    .with_bit_size_plus(n_varint)
                    .with_endian(Endian::Big)
                    .with_belong(field_pos),
            );
            Ok(())
        }
        (_, Some(n)) => encode_counter_loop(module, field_pos, value, &resolved_elem, n, has_alignment),
        (_, None) => encode_dynamic_vector(module, field_pos, value, len_expr, &resolved_elem, has_alignment),
    }
}

/// Fixed-length array of non-integer elements: a counter loop that indexes
/// and recurses.
fn encode_counter_loop(
    module: &mut Module,
    field_pos: CodeRef,
    value: CodeRef,
    element: &TypeExpr,
    n: u64,
    has_alignment: bool,
) -> Result<()> {
    let counter = module.idents.fresh_ephemeral(&mut module.ids, "encode_counter");
    let zero = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(0));
    module.emit(Code::new(AbstractOp::DefineVariable).with_ident(counter).with_reference(zero));
    let limit = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(n as i64));
    let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
    let cond = module.emit(
        Code::new(AbstractOp::Binary)
            .with_bop(bm_ir::BinOp::Less)
            .with_left_ref(counter_read)
            .with_right_ref(limit),
    );
    module.emit(Code::new(AbstractOp::LoopCondition).with_reference(cond));
    let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
    let element_ref = module.emit(Code::new(AbstractOp::Index).with_left_ref(value).with_right_ref(counter_read));
    encode_type(module, field_pos, element_ref, element, has_alignment)?;
    module.emit(Code::new(AbstractOp::Inc).with_reference(counter_read));
    module.emit(Code::new(AbstractOp::EndLoop));
    Ok(())
}

fn encode_dynamic_vector(
    module: &mut Module,
    field_pos: CodeRef,
    value: CodeRef,
    len_expr: &Expr,
    element: &TypeExpr,
    has_alignment: bool,
) -> Result<()> {
    let len_ref = lower_expr(module, len_expr)?;
    let tmp = module.idents.fresh_ephemeral(&mut module.ids, "length_check_tmp");
    module.emit(Code::new(AbstractOp::DefineVariable).with_ident(tmp).with_reference(len_ref));
    let tmp_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(tmp));
    module.emit(Code::new(AbstractOp::LengthCheck).with_left_ref(value).with_right_ref(tmp_read));
    if let TypeExpr::Int { bits, .. } = element {
        let size = varint(*bits as u64)?;
        module.emit(
            Code::new(AbstractOp::EncodeIntVector)
                .with_reference(value)
                .with_bit_size(size)
                .with_endian(Endian::Big)
                .with_encode_flags(EncodeFlags::LENGTH_PREFIXED)
                .with_belong(field_pos),
        );
        Ok(())
    } else {
        encode_open_vector(module, field_pos, value, element, has_alignment)
    }
}

/// The `..` (open-ended) vector cases: alignment padding, or a plain
/// element-wise loop with no length prefix.
fn encode_open_vector(
    module: &mut Module,
    field_pos: CodeRef,
    value: CodeRef,
    element: &TypeExpr,
    has_alignment: bool,
) -> Result<()> {
    if has_alignment {
        if let TypeExpr::Int { bits: 8, .. } = resolve(module, element)? {
            module.emit(
                Code::new(AbstractOp::EncodeIntVector)
                    .with_reference(value)
                    .with_bit_size(varint(8)?)
                    .with_endian(Endian::Big)
                    .with_encode_flags(EncodeFlags::empty())
                    .with_belong(field_pos),
            );
            return Ok(());
        }
    }
    let len_ref = module.emit(Code::new(AbstractOp::ArraySize).with_reference(value));
    encode_counter_loop_runtime(module, field_pos, value, element, len_ref)
}

fn encode_counter_loop_runtime(
    module: &mut Module,
    field_pos: CodeRef,
    value: CodeRef,
    element: &TypeExpr,
    limit: CodeRef,
) -> Result<()> {
    let counter = module.idents.fresh_ephemeral(&mut module.ids, "encode_counter");
    let zero = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(0));
    module.emit(Code::new(AbstractOp::DefineVariable).with_ident(counter).with_reference(zero));
    let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
    let cond = module.emit(Code::new(AbstractOp::Binary).with_bop(bm_ir::BinOp::Less).with_left_ref(counter_read).with_right_ref(limit));
    module.emit(Code::new(AbstractOp::LoopCondition).with_reference(cond));
    let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
    let element_ref = module.emit(Code::new(AbstractOp::Index).with_left_ref(value).with_right_ref(counter_read));
    encode_type(module, field_pos, element_ref, element, false)?;
    module.emit(Code::new(AbstractOp::Inc).with_reference(counter_read));
    module.emit(Code::new(AbstractOp::EndLoop));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_ast::Ident;

    #[test]
    fn plain_u16_encodes_as_single_encode_int() {
        let mut m = Module::new();
        let value = m.emit(Code::new(AbstractOp::IdentRef).with_ident(m.new_id()));
        let field_pos = CodeRef(0);
        encode_type(&mut m, field_pos, value, &TypeExpr::Int { bits: 16, signed: false }, false).unwrap();
        let emitted = &m.code[m.code.len() - 1];
        assert_eq!(emitted.op, AbstractOp::EncodeInt);
        assert_eq!(emitted.bit_size.unwrap().value(), 16);
        assert_eq!(emitted.endian, Some(Endian::Big));
    }

    #[test]
    fn enum_encode_casts_then_recurses_on_underlying() {
        let mut m = Module::new();
        let base = Ident::declaration(1, "Color");
        let enum_id = m.idents.lookup(&mut m.ids, &base);
        m.enum_underlying.insert(enum_id, TypeExpr::Int { bits: 8, signed: false });
        let value = m.emit(Code::new(AbstractOp::IdentRef).with_ident(m.new_id()));
        encode_type(&mut m, CodeRef(0), value, &TypeExpr::Enum { base }, false).unwrap();
        let ops: Vec<_> = m.code.iter().map(|c| c.op).collect();
        assert!(ops.contains(&AbstractOp::Cast));
        assert!(ops.contains(&AbstractOp::EncodeInt));
    }

    #[test]
    fn fixed_int_array_emits_single_vector_fixed_op() {
        let mut m = Module::new();
        let value = m.emit(Code::new(AbstractOp::IdentRef).with_ident(m.new_id()));
        let ty = TypeExpr::Array {
            element: Box::new(TypeExpr::Int { bits: 8, signed: false }),
            length: Some(Box::new(Expr::IntLiteral { value: 4, expr_type: TypeExpr::Int { bits: 32, signed: false } })),
        };
        encode_type(&mut m, CodeRef(0), value, &ty, false).unwrap();
        let last = m.code.last().unwrap();
        assert_eq!(last.op, AbstractOp::EncodeIntVectorFixed);
    }
}
