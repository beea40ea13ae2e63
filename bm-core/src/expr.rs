//! Expression lowering: one function per AST expression kind (`spec.md`
//! §4.5). Every lowering function produces exactly one result [`CodeRef`]
//! and leaves `module.prev_expr` pointing at it before returning.

use bm_ast::{BinaryOp, Expr, IoMethod, UnaryOp};
use bm_ir::{AbstractOp, BinOp, Code, UnOp};
use bm_types::Varint;

use crate::error::{Error, Result};
use crate::module::Module;
use crate::storage_build::define_storage;

fn varint(n: u64) -> Result<Varint> {
    Varint::encode(n).map_err(|_| Error::VarintOverflow(n))
}

fn binop(op: BinaryOp) -> Result<BinOp> {
    Ok(match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Mod => BinOp::Mod,
        BinaryOp::LeftShift => BinOp::LeftShift,
        BinaryOp::RightShift => BinOp::RightShift,
        BinaryOp::LeftArithmeticShift => BinOp::LeftArithmeticShift,
        BinaryOp::BitAnd => BinOp::BitAnd,
        BinaryOp::BitOr => BinOp::BitOr,
        BinaryOp::BitXor => BinOp::BitXor,
        BinaryOp::LogicalAnd => BinOp::LogicalAnd,
        BinaryOp::LogicalOr => BinOp::LogicalOr,
        BinaryOp::Equal => BinOp::Equal,
        BinaryOp::NotEqual => BinOp::NotEqual,
        BinaryOp::Less => BinOp::Less,
        BinaryOp::LessEqual => BinOp::LessEqual,
        BinaryOp::Greater => BinOp::Greater,
        BinaryOp::GreaterEqual => BinOp::GreaterEqual,
        other => {
            return Err(Error::UnsupportedOp(format!(
                "{other:?} is not a plain binary operator"
            )))
        }
    })
}

/// Lowers `expr`, returning the [`CodeRef`] of the value it produced.
/// Equivalent to calling [`lower_expr`] then `module.take_prev_expr()`.
pub fn lower_expr(module: &mut Module, expr: &Expr) -> Result<bm_ir::CodeRef> {
    let result = lower_expr_inner(module, expr)?;
    module.set_prev_expr(result);
    Ok(result)
}

fn lower_expr_inner(module: &mut Module, expr: &Expr) -> Result<bm_ir::CodeRef> {
    match expr {
        Expr::IntLiteral { value, .. } => Ok(module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(*value))),
        Expr::Int64Literal { value, .. } => {
            Ok(module.emit(Code::new(AbstractOp::ImmediateInt64).with_int_value64(*value)))
        }
        Expr::BoolLiteral { value } => Ok(module.emit(Code::new(if *value {
            AbstractOp::ImmediateTrue
        } else {
            AbstractOp::ImmediateFalse
        }))),
        Expr::CharLiteral { value } => {
            Ok(module.emit(Code::new(AbstractOp::ImmediateChar).with_int_value(*value as i64)))
        }
        Expr::StrLiteral { value } => {
            let id = module.strings.intern(&mut module.ids, value);
            Ok(module.emit(Code::new(AbstractOp::ImmediateString).with_ident(id)))
        }
        Expr::TypeLiteral { value } => {
            let mut storages = Vec::new();
            define_storage(module, value, &mut storages)?;
            let storages = bm_ir::Storages::new(storages);
            Ok(module.emit(Code::new(AbstractOp::ImmediateType).with_storage(storages)))
        }
        Expr::Ident(ident) => {
            let id = module.idents.lookup(&mut module.ids, ident);
            Ok(module.emit(Code::new(AbstractOp::IdentRef).with_ident(id)))
        }
        Expr::Paren { inner } => lower_expr_inner(module, inner),
        Expr::Binary {
            op,
            left,
            right,
            ..
        } => lower_binary(module, *op, left, right),
        Expr::Unary { op, expr, .. } => lower_unary(module, *op, expr),
        Expr::Cond { cond, then, els, .. } => lower_cond(module, cond, then, els),
        Expr::Cast { target, expr } => lower_cast(module, target, expr),
        Expr::Index { base, index, .. } => {
            let base = lower_expr(module, base)?;
            let index = lower_expr(module, index)?;
            Ok(module.emit(Code::new(AbstractOp::Index).with_left_ref(base).with_right_ref(index)))
        }
        Expr::MemberAccess { base, member, .. } => {
            let base_ref = lower_expr(module, base)?;
            if member == "length" {
                Ok(module.emit(Code::new(AbstractOp::ArraySize).with_reference(base_ref)))
            } else {
                let member_id = module.idents.fresh_ephemeral(&mut module.ids, member);
                let member_ref = module.emit(Code::new(AbstractOp::IdentRef).with_ident(member_id));
                Ok(module
                    .emit(Code::new(AbstractOp::Access).with_left_ref(base_ref).with_right_ref(member_ref)))
            }
        }
        Expr::Call { callee, args, .. } => {
            let callee_ref = lower_expr(module, callee)?;
            let mut param = Vec::with_capacity(args.len());
            for arg in args {
                param.push(lower_expr(module, arg)?);
            }
            Ok(module.emit(Code::new(AbstractOp::Call).with_reference(callee_ref).with_param(param)))
        }
        Expr::Available { target } => crate::union_cond::lower_available(module, target),
        Expr::IoOperation { args, .. } => {
            // Stream I/O primitives are opaque calls from the core's perspective;
            // the backend recognizes the callee by its synthesized identifier.
            let mut param = Vec::with_capacity(args.len());
            for arg in args {
                param.push(lower_expr(module, arg)?);
            }
            let callee = module.idents.fresh_ephemeral(&mut module.ids, "io");
            Ok(module.emit(Code::new(AbstractOp::Call).with_ident(callee).with_param(param)))
        }
        Expr::ImplicitYield { value } => lower_expr_inner(module, value),
        Expr::Identity => Ok(module.emit(Code::new(AbstractOp::IdentRef))),
    }
}

fn lower_binary(module: &mut Module, op: BinaryOp, left: &Expr, right: &Expr) -> Result<bm_ir::CodeRef> {
    match op {
        BinaryOp::Assign => {
            let lhs = lower_expr(module, left)?;
            let rhs = lower_expr(module, right)?;
            record_phi_assignment(module, left, rhs);
            Ok(module.emit(Code::new(AbstractOp::Assign).with_left_ref(lhs).with_right_ref(rhs)))
        }
        BinaryOp::AssignCompound(inner) => {
            let lhs = lower_expr(module, left)?;
            let rhs = lower_expr(module, right)?;
            let bop = binop(*inner)?;
            let value = module.emit(Code::new(AbstractOp::Binary).with_bop(bop).with_left_ref(lhs).with_right_ref(rhs));
            record_phi_assignment(module, left, value);
            Ok(module.emit(Code::new(AbstractOp::Assign).with_left_ref(lhs).with_right_ref(value)))
        }
        BinaryOp::DefineAssign | BinaryOp::ConstAssign => {
            let rhs = lower_expr(module, right)?;
            let ident = expr_ident(left)?;
            let id = module.idents.lookup(&mut module.ids, ident);
            let def = module.emit(Code::new(AbstractOp::DefineVariable).with_ident(id).with_reference(rhs));
            module.phi_stack.last_mut().map(|f| f.record_assignment(id, def));
            Ok(def)
        }
        BinaryOp::AppendAssign => {
            let base = match left {
                Expr::Index { base, .. } => lower_expr(module, base)?,
                other => lower_expr(module, other)?,
            };
            let rhs = lower_expr(module, right)?;
            Ok(module.emit(Code::new(AbstractOp::Append).with_left_ref(base).with_right_ref(rhs)))
        }
        BinaryOp::Comma => {
            lower_expr(module, left)?;
            lower_expr(module, right)
        }
        BinaryOp::InAssign => Err(Error::UnsupportedOp(
            "in_assign is lowered by loop lowering, not expression lowering".to_string(),
        )),
        plain => {
            let lhs = lower_expr(module, left)?;
            let rhs = lower_expr(module, right)?;
            let bop = binop(plain)?;
            Ok(module.emit(Code::new(AbstractOp::Binary).with_bop(bop).with_left_ref(lhs).with_right_ref(rhs)))
        }
    }
}

/// Notes that the currently-open phi arm (if any) assigned a new value to
/// `target`, when `target` is a bare identifier. Index/member-access
/// targets don't introduce a fresh SSA name and are skipped.
fn record_phi_assignment(module: &mut Module, target: &Expr, value: bm_ir::CodeRef) {
    if let Expr::Ident(ident) = unwrap_paren(target) {
        let id = module.idents.lookup(&mut module.ids, ident);
        if let Some(frame) = module.phi_stack.last_mut() {
            frame.record_assignment(id, value);
        }
    }
}

fn unwrap_paren(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren { inner } => unwrap_paren(inner),
        other => other,
    }
}

fn expr_ident(expr: &Expr) -> Result<&bm_ast::Ident> {
    match unwrap_paren(expr) {
        Expr::Ident(ident) => Ok(ident),
        other => Err(Error::UnsupportedOp(format!(
            "define_assign target must be a plain identifier, got {other:?}"
        ))),
    }
}

/// Whether `expr` statically has `bool` type: literal comparisons/logical
/// combinators carry `Bool` directly in their `expr_type`, while a bare
/// identifier or member access is resolved through `module.type_env` the
/// same way `union_cond::resolve_declared_type` does.
fn expr_is_bool(module: &Module, expr: &Expr) -> bool {
    use bm_ast::TypeExpr;
    match expr {
        Expr::BoolLiteral { .. } => true,
        Expr::Binary { expr_type, .. }
        | Expr::Unary { expr_type, .. }
        | Expr::Cond { expr_type, .. }
        | Expr::Index { expr_type, .. }
        | Expr::MemberAccess { expr_type, .. }
        | Expr::Call { expr_type, .. } => matches!(expr_type, TypeExpr::Bool),
        Expr::Paren { inner } => expr_is_bool(module, inner),
        Expr::Ident(ident) => {
            let Some(id) = module.idents.id_for_node(ident.base.unwrap_or(ident.node_id)) else {
                return false;
            };
            matches!(module.type_env.get(&id), Some(TypeExpr::Bool))
        }
        _ => false,
    }
}

/// `logical_not` on a non-`bool` operand is silently rewritten to `bit_not`
/// — the sole implicit coercion rule in expression lowering (`spec.md` §4.5).
fn lower_unary(module: &mut Module, op: UnaryOp, expr: &Expr) -> Result<bm_ir::CodeRef> {
    let operand_is_bool = expr_is_bool(module, expr);
    let value = lower_expr(module, expr)?;
    let uop = match op {
        UnaryOp::Negate => UnOp::Negate,
        UnaryOp::BitNot => UnOp::BitNot,
        UnaryOp::LogicalNot if operand_is_bool => UnOp::LogicalNot,
        UnaryOp::LogicalNot => UnOp::BitNot,
    };
    Ok(module.emit(Code::new(AbstractOp::Unary).with_uop(uop).with_reference(value)))
}

fn lower_cond(module: &mut Module, cond: &Expr, then: &Expr, els: &Expr) -> Result<bm_ir::CodeRef> {
    let tmp = module.idents.fresh_ephemeral(&mut module.ids, "cond_tmp");
    let tmp_def = module.emit(Code::new(AbstractOp::DefineVariable).with_ident(tmp));
    let cond_ref = lower_expr(module, cond)?;
    module.emit(Code::new(AbstractOp::If).with_reference(cond_ref));
    let then_val = lower_expr(module, then)?;
    module.emit(Code::new(AbstractOp::Assign).with_left_ref(tmp_def).with_right_ref(then_val));
    module.emit(Code::new(AbstractOp::Else));
    let else_val = lower_expr(module, els)?;
    module.emit(Code::new(AbstractOp::Assign).with_left_ref(tmp_def).with_right_ref(else_val));
    module.emit(Code::new(AbstractOp::EndIf));
    Ok(module.emit(Code::new(AbstractOp::IdentRef).with_ident(tmp)))
}

fn lower_cast(module: &mut Module, target: &bm_ast::TypeExpr, expr: &Expr) -> Result<bm_ir::CodeRef> {
    let value = lower_expr(module, expr)?;
    let mut storages = Vec::new();
    define_storage(module, target, &mut storages)?;
    let storages = bm_ir::Storages::new(storages);
    Ok(module.emit(
        Code::new(AbstractOp::CallCast)
            .with_storage(storages)
            .with_param(vec![value]),
    ))
}

/// Lowers `IoOperation`'s method tag onto its synthesized callee name, kept
/// here so future backends can special-case by method without touching the
/// general `Call` shape above.
pub fn io_method_name(method: IoMethod) -> &'static str {
    match method {
        IoMethod::InputBackward => "input_backward",
        IoMethod::InputOffset => "input_offset",
        IoMethod::InputBitOffset => "input_bit_offset",
        IoMethod::InputGet => "input_get",
        IoMethod::OutputPut => "output_put",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_ast::TypeExpr;

    #[test]
    fn int_literal_lowers_to_immediate_int() {
        let mut m = Module::new();
        let r = lower_expr(&mut m, &Expr::IntLiteral { value: 42, expr_type: TypeExpr::Int { bits: 32, signed: true } }).unwrap();
        assert_eq!(m.get(r).op, AbstractOp::ImmediateInt);
        assert_eq!(m.get(r).int_value, Some(42));
        assert_eq!(m.take_prev_expr(), Some(r));
    }

    #[test]
    fn logical_not_on_non_bool_becomes_bit_not() {
        let mut m = Module::new();
        let r = lower_expr(
            &mut m,
            &Expr::Unary {
                op: UnaryOp::LogicalNot,
                expr: Box::new(Expr::IntLiteral { value: 1, expr_type: TypeExpr::Int { bits: 8, signed: false } }),
                expr_type: TypeExpr::Bool,
            },
        )
        .unwrap();
        assert_eq!(m.get(r).uop, Some(UnOp::BitNot));
    }

    #[test]
    fn logical_not_on_comparison_stays_logical_not() {
        let mut m = Module::new();
        let r = lower_expr(
            &mut m,
            &Expr::Unary {
                op: UnaryOp::LogicalNot,
                expr: Box::new(Expr::Binary {
                    op: BinaryOp::Equal,
                    left: Box::new(Expr::IntLiteral { value: 1, expr_type: TypeExpr::Int { bits: 8, signed: false } }),
                    right: Box::new(Expr::IntLiteral { value: 2, expr_type: TypeExpr::Int { bits: 8, signed: false } }),
                    expr_type: TypeExpr::Bool,
                }),
                expr_type: TypeExpr::Bool,
            },
        )
        .unwrap();
        assert_eq!(m.get(r).uop, Some(UnOp::LogicalNot));
    }

    #[test]
    fn member_length_access_emits_array_size() {
        let mut m = Module::new();
        let base = bm_ast::Ident::declaration(1, "buf");
        let r = lower_expr(
            &mut m,
            &Expr::MemberAccess {
                base: Box::new(Expr::Ident(base)),
                member: "length".to_string(),
                expr_type: TypeExpr::Int { bits: 64, signed: false },
            },
        )
        .unwrap();
        assert_eq!(m.get(r).op, AbstractOp::ArraySize);
    }
}
