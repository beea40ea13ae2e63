//! Union-condition lowering (`spec.md` §4.7, `handle_union_type`).
//!
//! A discriminated union (`TypeExpr::Union`) carries an optional base
//! discriminant and an ordered list of arms, each pairing a condition with
//! the payload type it selects. This module turns that into a flat list of
//! `(condition, field)` pairs the caller (control-flow lowering or field
//! lowering) turns into `IF`/`ELIF` chains or `CONDITIONAL_FIELD`s.

use bm_ast::{Expr, TypeExpr, UnionArm};
use bm_ir::{AbstractOp, BinOp, Code, CodeRef, UnOp};

use crate::error::Result;
use crate::expr::lower_expr;
use crate::module::Module;

/// Lowers a union's arm list into `(condition, field)` pairs.
///
/// The first arm with a real condition lowers as that condition (or
/// `base == cond` when a base discriminant is given); each later arm
/// becomes `¬prev ∧ cond` chained against the *previous arm's already-lowered*
/// condition, so a three-arm union's third condition embeds the first two's
/// negations transitively. An "any range" arm (no `cond`) becomes `¬prev`, or
/// `true` if it is the first (and only) arm.
pub fn handle_union_type(
    module: &mut Module,
    base: Option<&Expr>,
    arms: &[UnionArm],
) -> Result<Vec<(CodeRef, Option<TypeExpr>)>> {
    let base_ref = match base {
        Some(b) => Some(lower_expr(module, b)?),
        None => None,
    };

    let mut results = Vec::with_capacity(arms.len());
    let mut prev_final: Option<CodeRef> = None;

    for arm in arms {
        let cond_final = match &arm.cond {
            Some(c) => {
                let c_ref = lower_expr(module, c)?;
                let raw = match base_ref {
                    Some(b) => module.emit(
                        Code::new(AbstractOp::Binary)
                            .with_bop(BinOp::Equal)
                            .with_left_ref(b)
                            .with_right_ref(c_ref),
                    ),
                    None => c_ref,
                };
                match prev_final {
                    None => raw,
                    Some(prev) => {
                        let not_prev = module.emit(Code::new(AbstractOp::Unary).with_uop(UnOp::LogicalNot).with_reference(prev));
                        module.emit(
                            Code::new(AbstractOp::Binary)
                                .with_bop(BinOp::LogicalAnd)
                                .with_left_ref(not_prev)
                                .with_right_ref(raw),
                        )
                    }
                }
            }
            None => match prev_final {
                None => module.emit(Code::new(AbstractOp::ImmediateTrue)),
                Some(prev) => module.emit(Code::new(AbstractOp::Unary).with_uop(UnOp::LogicalNot).with_reference(prev)),
            },
        };
        results.push((cond_final, arm.field.as_deref().cloned()));
        prev_final = Some(cond_final);
    }

    Ok(results)
}

/// ORs a (possibly empty) list of conditions together; an empty list lowers
/// to `IMMEDIATE_FALSE` (no arm selects the target, so it is never available).
fn fold_or(module: &mut Module, conds: &[CodeRef]) -> CodeRef {
    let mut iter = conds.iter().copied();
    let Some(first) = iter.next() else {
        return module.emit(Code::new(AbstractOp::ImmediateFalse));
    };
    iter.fold(first, |acc, next| {
        module.emit(
            Code::new(AbstractOp::Binary)
                .with_bop(BinOp::LogicalOr)
                .with_left_ref(acc)
                .with_right_ref(next),
        )
    })
}

/// Whether a union arm's payload type plausibly names `member` — either
/// directly (a `Struct`/`Enum` reference whose base ident matches) or
/// because the arm carries no field at all and thus always satisfies no
/// particular member (handled by the caller, which excludes fieldless arms).
fn arm_names_member(field: &TypeExpr, member: &str) -> bool {
    match field {
        TypeExpr::Struct { base, .. } | TypeExpr::Enum { base } => base.name == member,
        TypeExpr::Ident(ident) => ident.name == member,
        _ => true,
    }
}

/// Looks up the declared type of `expr`, when `expr` is a plain identifier
/// whose type was registered by field lowering (`spec.md` §4.10 registers
/// each field's type into `module.type_env` keyed by its ident).
fn resolve_declared_type(module: &Module, expr: &Expr) -> Option<TypeExpr> {
    match expr {
        Expr::Ident(ident) => {
            let id = module.idents.id_for_node(ident.base.unwrap_or(ident.node_id))?;
            module.type_env.get(&id).cloned()
        }
        Expr::Paren { inner } => resolve_declared_type(module, inner),
        _ => None,
    }
}

fn is_addressable(expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(_) | Expr::Index { .. } | Expr::MemberAccess { .. } | Expr::Paren { .. })
}

/// Lowers `available(target)` (`spec.md` §4.5, scenario F).
pub fn lower_available(module: &mut Module, target: &Expr) -> Result<CodeRef> {
    if let Expr::MemberAccess { base, member, .. } = target {
        let base_ref = lower_expr(module, base)?;
        if let Some(TypeExpr::Union { arms, .. }) = resolve_declared_type(module, base) {
            let arm_results = handle_union_type(module, None, &arms)?;
            let selected: Vec<CodeRef> = arm_results
                .iter()
                .filter(|(_, field)| field.as_ref().is_some_and(|f| arm_names_member(f, member)))
                .map(|(cond, _)| *cond)
                .collect();
            let disjunction = fold_or(module, &selected);
            return Ok(module.emit(
                Code::new(AbstractOp::FieldAvailable)
                    .with_left_ref(base_ref)
                    .with_right_ref(disjunction),
            ));
        }
        let always = module.emit(Code::new(AbstractOp::ImmediateTrue));
        return Ok(module.emit(
            Code::new(AbstractOp::FieldAvailable)
                .with_left_ref(base_ref)
                .with_right_ref(always),
        ));
    }

    let base_ref = lower_expr(module, target)?;
    let flag = module.emit(Code::new(if is_addressable(target) {
        AbstractOp::ImmediateTrue
    } else {
        AbstractOp::ImmediateFalse
    }));
    Ok(module.emit(
        Code::new(AbstractOp::FieldAvailable)
            .with_left_ref(base_ref)
            .with_right_ref(flag),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_ast::Ident;

    fn tag_eq(value: i64) -> Expr {
        Expr::IntLiteral {
            value,
            expr_type: TypeExpr::Int { bits: 8, signed: false },
        }
    }

    #[test]
    fn two_arm_union_second_condition_negates_the_first() {
        let mut m = Module::new();
        let base = Expr::Ident(Ident::declaration(1, "tag"));
        let arms = vec![
            UnionArm {
                cond: Some(tag_eq(0)),
                field: Some(Box::new(TypeExpr::Struct {
                    base: Ident::declaration(2, "A"),
                    recursive: false,
                    bit_size: None,
                })),
            },
            UnionArm {
                cond: Some(tag_eq(1)),
                field: Some(Box::new(TypeExpr::Struct {
                    base: Ident::declaration(3, "B"),
                    recursive: false,
                    bit_size: None,
                })),
            },
        ];
        let results = handle_union_type(&mut m, Some(&base), &arms).unwrap();
        assert_eq!(results.len(), 2);
        let second_cond = m.get(results[1].0);
        assert_eq!(second_cond.op, AbstractOp::Binary);
        assert_eq!(second_cond.bop, Some(BinOp::LogicalAnd));
        let not_first = m.get(second_cond.left_ref.unwrap());
        assert_eq!(not_first.op, AbstractOp::Unary);
        assert_eq!(not_first.uop, Some(UnOp::LogicalNot));
    }

    #[test]
    fn solitary_any_range_arm_is_unconditionally_true() {
        let mut m = Module::new();
        let arms = vec![UnionArm { cond: None, field: None }];
        let results = handle_union_type(&mut m, None, &arms).unwrap();
        assert_eq!(m.get(results[0].0).op, AbstractOp::ImmediateTrue);
    }
}
