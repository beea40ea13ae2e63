//! Sub-range/seek lowering for fields with a bounded window (`spec.md`
//! §4.11): `sub_byte_begin`/`sub_byte_length` wrap a field's normal
//! encode/decode in a seek-save, bracket, seek-restore sandwich.

use bm_ast::Field;
use bm_ir::{AbstractOp, Code, CodeRef};

use crate::error::{Error, Result};
use crate::expr::lower_expr;
use crate::module::{CoderMode, Module};

/// Runs `body` (the field's ordinary encode/decode emission) wrapped in
/// whatever sub-range machinery `field.arguments` calls for. A field with
/// neither `sub_byte_begin` nor `sub_byte_length` runs `body` unwrapped.
pub fn with_sub_range(
    module: &mut Module,
    field: &Field,
    field_pos: CodeRef,
    mode: CoderMode,
    body: impl FnOnce(&mut Module) -> Result<()>,
) -> Result<()> {
    let begin = field.arguments.sub_byte_begin.as_deref();
    let length = field.arguments.sub_byte_length.as_deref();
    let open_ended = field.arguments.open_ended_sub_range;

    if begin.is_none() && length.is_none() && !open_ended {
        return body(module);
    }

    let seek_op = match mode {
        CoderMode::Encode => AbstractOp::SeekEncoder,
        CoderMode::Decode => AbstractOp::SeekDecoder,
    };

    let saved_offset = match begin {
        Some(begin_expr) => {
            let target = lower_expr(module, begin_expr)?;
            let save = module.idents.fresh_ephemeral(&mut module.ids, "sub_range_saved_offset");
            let zero = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(0));
            module.emit(Code::new(AbstractOp::DefineVariable).with_ident(save).with_reference(zero));
            module.emit(Code::new(seek_op).with_reference(target));
            Some(save)
        }
        None => None,
    };

    let (open_op, close_op) = match mode {
        CoderMode::Encode => (AbstractOp::BeginEncodeSubRange, AbstractOp::EndEncodeSubRange),
        CoderMode::Decode => (AbstractOp::BeginDecodeSubRange, AbstractOp::EndDecodeSubRange),
    };

    match length {
        Some(len_expr) => {
            let len_ref = lower_expr(module, len_expr)?;
            module.emit(
                Code::new(open_op)
                    .with_reference(len_ref)
                    .with_sub_range_type(bm_ir::SubRangeType::ByteLength)
                    .with_belong(field_pos),
            );
            body(module)?;
            module.emit(Code::new(close_op));
        }
        None => {
            if saved_offset.is_none() {
                return Err(Error::MissingSubRangeBegin);
            }
            module.emit(
                Code::new(open_op)
                    .with_sub_range_type(bm_ir::SubRangeType::Remaining)
                    .with_belong(field_pos),
            );
            body(module)?;
            module.emit(Code::new(close_op));
        }
    }

    if let Some(save) = saved_offset {
        let restore = module.emit(Code::new(AbstractOp::IdentRef).with_ident(save));
        module.emit(Code::new(seek_op).with_reference(restore));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_ast::{Expr, FieldArguments, Ident, TypeExpr};

    fn field_with_window(begin: Option<Expr>, length: Option<Expr>) -> Field {
        Field {
            ident: Ident::declaration(1, "f"),
            type_expr: TypeExpr::Int { bits: 8, signed: false },
            arguments: FieldArguments {
                sub_byte_begin: begin.map(Box::new),
                sub_byte_length: length.map(Box::new),
                ..Default::default()
            },
            follow: None,
            belong_struct: None,
            is_state_variable: false,
            bit_alignment: None,
            eventual_bit_alignment: None,
            next: None,
        }
    }

    fn int_lit(v: i64) -> Expr {
        Expr::IntLiteral { value: v, expr_type: TypeExpr::Int { bits: 32, signed: false } }
    }

    #[test]
    fn no_window_runs_body_unwrapped() {
        let mut m = Module::new();
        let field = field_with_window(None, None);
        let pos = CodeRef(0);
        let mut ran = false;
        with_sub_range(&mut m, &field, pos, CoderMode::Encode, |_| {
            ran = true;
            Ok(())
        })
        .unwrap();
        assert!(ran);
        assert!(m.code.is_empty());
    }

    #[test]
    fn open_ended_length_with_no_begin_errors() {
        let mut m = Module::new();
        let mut field = field_with_window(None, None);
        field.arguments.open_ended_sub_range = true;
        let pos = CodeRef(0);
        let result = with_sub_range(&mut m, &field, pos, CoderMode::Decode, |_| Ok(()));
        assert!(matches!(result, Err(Error::MissingSubRangeBegin)));
    }

    #[test]
    fn open_ended_length_with_begin_opens_a_remaining_sub_range() {
        let mut m = Module::new();
        let mut field = field_with_window(Some(int_lit(4)), None);
        field.arguments.open_ended_sub_range = true;
        let pos = CodeRef(0);
        with_sub_range(&mut m, &field, pos, CoderMode::Decode, |_| Ok(())).unwrap();
        let ops: Vec<_> = m.code.iter().map(|c| c.op).collect();
        assert!(ops.contains(&AbstractOp::SeekDecoder));
        assert!(ops.contains(&AbstractOp::BeginDecodeSubRange));
        assert!(ops.contains(&AbstractOp::EndDecodeSubRange));
    }

    #[test]
    fn begin_and_length_brackets_a_sub_range() {
        let mut m = Module::new();
        let field = field_with_window(Some(int_lit(4)), Some(int_lit(2)));
        let pos = CodeRef(0);
        with_sub_range(&mut m, &field, pos, CoderMode::Encode, |_| Ok(())).unwrap();
        let ops: Vec<_> = m.code.iter().map(|c| c.op).collect();
        assert!(ops.contains(&AbstractOp::SeekEncoder));
        assert!(ops.contains(&AbstractOp::BeginEncodeSubRange));
        assert!(ops.contains(&AbstractOp::EndEncodeSubRange));
    }
}
