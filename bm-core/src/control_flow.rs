//! Control-flow lowering: `if`/`elif`/`else`, `match`, `loop`, `break`/
//! `continue`, with phi-node insertion across merge points (`spec.md` §4.6).

use bm_ast::{CasePattern, Expr, LoopForm, MatchArm, Stmt, TypeExpr};
use bm_ir::{AbstractOp, BinOp, Code, CodeRef};

use crate::error::{Error, Result};
use crate::expr::lower_expr;
use crate::module::Module;
use crate::union_cond::handle_union_type;

/// Lowers a single statement. Expression statements discard the produced
/// value (read-and-clear `prev_expr` so a later statement never accidentally
/// inherits it).
pub fn lower_stmt(module: &mut Module, stmt: &Stmt) -> Result<()> {
    match stmt {
        Stmt::Expr(expr) => {
            lower_expr(module, expr)?;
            module.take_prev_expr();
            Ok(())
        }
        Stmt::Block { statements } => lower_block(module, statements),
        Stmt::If { cond, then_block, else_block } => lower_if(module, cond, then_block, else_block.as_deref()),
        Stmt::Match { cond, arms, exhaustive } => lower_match(module, cond.as_ref(), arms, *exhaustive),
        Stmt::Loop { form, body } => lower_loop(module, form, body),
        Stmt::Break => {
            module.emit(Code::new(AbstractOp::Break));
            Ok(())
        }
        Stmt::Continue => {
            module.emit(Code::new(AbstractOp::Continue));
            Ok(())
        }
        Stmt::Return { value } => {
            let mut code = Code::new(AbstractOp::RetSuccess);
            if let Some(value) = value {
                let r = lower_expr(module, value)?;
                code = code.with_reference(r);
            }
            module.emit(code);
            Ok(())
        }
        Stmt::Assert { cond, message } => {
            let cond_ref = lower_expr(module, cond)?;
            let callee = module.idents.fresh_ephemeral(&mut module.ids, "assert");
            let mut param = vec![cond_ref];
            if let Some(message) = message {
                let string_id = module.strings.intern(&mut module.ids, message);
                param.push(module.emit(Code::new(AbstractOp::ImmediateString).with_ident(string_id)));
            }
            module.emit(Code::new(AbstractOp::Call).with_ident(callee).with_param(param));
            Ok(())
        }
        Stmt::ExplicitError { message } => {
            let string_id = module.strings.intern(&mut module.ids, message);
            let msg_ref = module.emit(Code::new(AbstractOp::ImmediateString).with_ident(string_id));
            let callee = module.idents.fresh_ephemeral(&mut module.ids, "explicit_error");
            module.emit(Code::new(AbstractOp::Call).with_ident(callee).with_param(vec![msg_ref]));
            Ok(())
        }
        Stmt::Metadata { name, args } => {
            let name_id = module.metadata_names.intern(&mut module.ids, name);
            let mut param = Vec::with_capacity(args.len());
            for arg in args {
                param.push(lower_expr(module, arg)?);
            }
            module.emit(Code::new(AbstractOp::Metadata).with_metadata(name_id).with_param(param));
            Ok(())
        }
    }
}

/// Lowers every statement in a block in source order.
pub fn lower_block(module: &mut Module, statements: &[Stmt]) -> Result<()> {
    for stmt in statements {
        lower_stmt(module, stmt)?;
    }
    Ok(())
}

/// Declared type of `cond`'s left operand, if `cond` is `lhs == rhs` and
/// `lhs`'s type was registered by field lowering — used to decide whether an
/// `if`/`elif` arm narrows a union-typed field's discriminant.
fn union_switch_target(module: &Module, cond: &Expr) -> Option<(CodeRef, bm_ast::Ident)> {
    let Expr::Binary { op: bm_ast::BinaryOp::Equal, left, .. } = cond else {
        return None;
    };
    let ident = match left.as_ref() {
        Expr::Ident(ident) => ident.clone(),
        Expr::MemberAccess { member, .. } => bm_ast::Ident::declaration(0, member.clone()),
        _ => return None,
    };
    let id = module.idents.id_for_node(ident.base.unwrap_or(ident.node_id))?;
    match module.type_env.get(&id) {
        Some(TypeExpr::Union { .. }) => Some((CodeRef(0), ident)),
        _ => None,
    }
}

/// Emits `SWITCH_UNION`/`CHECK_UNION` for a branch condition that narrows a
/// union-typed field's discriminant (`spec.md` §4.6's `add_switch_union`).
fn add_switch_union(module: &mut Module, cond: &Expr, cond_ref: CodeRef) {
    if let Some((_, ident)) = union_switch_target(module, cond) {
        let field_id = module.idents.lookup(&mut module.ids, &ident);
        let check = module.emit(Code::new(AbstractOp::CheckUnion).with_reference(cond_ref).with_ident(field_id));
        module.emit(Code::new(AbstractOp::SwitchUnion).with_reference(check).with_ident(field_id));
    }
}

fn lower_if(module: &mut Module, cond: &Expr, then_block: &Stmt, else_block: Option<&Stmt>) -> Result<()> {
    module.phi_stack.push(Default::default());
    let cond_ref = lower_expr(module, cond)?;
    module.emit(Code::new(AbstractOp::If).with_reference(cond_ref));
    add_switch_union(module, cond, cond_ref);
    module.phi_stack.last_mut().expect("just pushed").open_arm(Some(cond_ref));
    lower_stmt(module, then_block)?;
    lower_if_tail(module, else_block)?;
    module.emit(Code::new(AbstractOp::EndIf));
    insert_phis(module);
    Ok(())
}

fn lower_if_tail(module: &mut Module, else_block: Option<&Stmt>) -> Result<()> {
    match else_block {
        None => Ok(()),
        Some(Stmt::If { cond, then_block, else_block }) => {
            let cond_ref = lower_expr(module, cond)?;
            module.phi_stack.last_mut().expect("open if frame").open_arm(Some(cond_ref));
            module.emit(Code::new(AbstractOp::Elif).with_reference(cond_ref));
            add_switch_union(module, cond, cond_ref);
            lower_stmt(module, then_block)?;
            lower_if_tail(module, else_block.as_deref())
        }
        Some(other) => {
            module.phi_stack.last_mut().expect("open if frame").open_arm(None);
            module.emit(Code::new(AbstractOp::Else));
            lower_stmt(module, other)
        }
    }
}

fn lower_match(module: &mut Module, cond: Option<&Expr>, arms: &[MatchArm], exhaustive: bool) -> Result<()> {
    let Some(cond) = cond else {
        // "If cond is absent, fall back to the if/elif/else lowering" (spec.md §4.6).
        return lower_match_as_if_chain(module, arms);
    };

    module.phi_stack.push(Default::default());
    let cond_ref = lower_expr(module, cond)?;
    module.emit(Code::new(if exhaustive { AbstractOp::ExhaustiveMatch } else { AbstractOp::Match }).with_reference(cond_ref));

    for arm in arms {
        match &arm.pattern {
            CasePattern::Value(pattern_expr) => {
                let pattern_ref = lower_expr(module, pattern_expr)?;
                module.phi_stack.last_mut().expect("open match frame").open_arm(Some(pattern_ref));
                module.emit(Code::new(AbstractOp::Case).with_reference(pattern_ref));
            }
            CasePattern::AnyRange => {
                module.phi_stack.last_mut().expect("open match frame").open_arm(None);
                module.emit(Code::new(AbstractOp::DefaultCase));
            }
        }
        lower_stmt(module, &arm.body)?;
        module.emit(Code::new(AbstractOp::EndCase));
    }

    module.emit(Code::new(AbstractOp::EndMatch));
    insert_phis(module);
    Ok(())
}

/// A `match` with no scrutinee is a chain of independently-evaluated arm
/// conditions, lowered exactly like `if`/`elif`/`else` (`spec.md` §4.6).
fn lower_match_as_if_chain(module: &mut Module, arms: &[MatchArm]) -> Result<()> {
    let Some((first, rest)) = arms.split_first() else {
        return Ok(());
    };
    let CasePattern::Value(first_cond) = &first.pattern else {
        return Err(Error::BugInvariant(
            "a condition-less match's first arm must carry a value pattern".to_string(),
        ));
    };

    module.phi_stack.push(Default::default());
    let cond_ref = lower_expr(module, first_cond)?;
    module.emit(Code::new(AbstractOp::If).with_reference(cond_ref));
    module.phi_stack.last_mut().expect("just pushed").open_arm(Some(cond_ref));
    lower_stmt(module, &first.body)?;

    for arm in rest {
        match &arm.pattern {
            CasePattern::Value(pattern_expr) => {
                let cond_ref = lower_expr(module, pattern_expr)?;
                module.phi_stack.last_mut().expect("open if frame").open_arm(Some(cond_ref));
                module.emit(Code::new(AbstractOp::Elif).with_reference(cond_ref));
            }
            CasePattern::AnyRange => {
                module.phi_stack.last_mut().expect("open if frame").open_arm(None);
                module.emit(Code::new(AbstractOp::Else));
            }
        }
        lower_stmt(module, &arm.body)?;
    }

    module.emit(Code::new(AbstractOp::EndIf));
    insert_phis(module);
    Ok(())
}

fn lower_loop(module: &mut Module, form: &LoopForm, body: &Stmt) -> Result<()> {
    match form {
        LoopForm::ForInInt { var, count } => lower_counter_loop(module, var, count, None, body),
        LoopForm::ForInRange { var, start, end, inclusive } => lower_range_loop(module, var, start, end, *inclusive, body),
        LoopForm::ForInIndexable { var, base } => lower_indexable_loop(module, var, base, body),
        LoopForm::General { init, cond, step } => lower_general_loop(module, init.as_deref(), cond.as_ref(), step.as_deref(), body),
    }
}

fn lower_general_loop(
    module: &mut Module,
    init: Option<&Stmt>,
    cond: Option<&Expr>,
    step: Option<&Stmt>,
    body: &Stmt,
) -> Result<()> {
    if let Some(init) = init {
        lower_stmt(module, init)?;
    }
    match cond {
        Some(cond) => {
            let cond_ref = lower_expr(module, cond)?;
            module.emit(Code::new(AbstractOp::LoopCondition).with_reference(cond_ref));
        }
        None => {
            module.emit(Code::new(AbstractOp::LoopInfinite));
        }
    }
    lower_stmt(module, body)?;
    if let Some(step) = step {
        lower_stmt(module, step)?;
    }
    module.emit(Code::new(AbstractOp::EndLoop));
    Ok(())
}

/// `for x in y` where `y` is an integer: a counter loop binding `x` to the
/// running counter. Shared by `ForInInt` (count = `y`, no explicit temp
/// beyond the counter) and the indexable/array/string loop below, which
/// additionally indexes a base.
fn lower_counter_loop(
    module: &mut Module,
    var: &bm_ast::Ident,
    count: &Expr,
    index_base: Option<&Expr>,
    body: &Stmt,
) -> Result<()> {
    let counter = module.idents.fresh_ephemeral(&mut module.ids, "for_counter");
    let zero = module.emit(Code::new(AbstractOp::ImmediateInt).with_int_value(0));
    let counter_def = module.emit(Code::new(AbstractOp::DefineVariable).with_ident(counter).with_reference(zero));

    let count_ref = lower_expr(module, count)?;
    let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
    let cond_ref = module.emit(
        Code::new(AbstractOp::Binary)
            .with_bop(BinOp::Less)
            .with_left_ref(counter_read)
            .with_right_ref(count_ref),
    );
    module.emit(Code::new(AbstractOp::LoopCondition).with_reference(cond_ref));

    let var_id = module.idents.lookup(&mut module.ids, var);
    match index_base {
        Some(base) => {
            let base_ref = lower_expr(module, base)?;
            let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
            let element = module.emit(Code::new(AbstractOp::Index).with_left_ref(base_ref).with_right_ref(counter_read));
            module.emit(Code::new(AbstractOp::DefineVariableRef).with_ident(var_id).with_reference(element));
        }
        None => {
            let counter_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(counter));
            module.emit(Code::new(AbstractOp::DefineVariable).with_ident(var_id).with_reference(counter_read));
        }
    }

    lower_stmt(module, body)?;
    module.emit(Code::new(AbstractOp::Inc).with_reference(counter_def));
    module.emit(Code::new(AbstractOp::EndLoop));
    Ok(())
}

fn lower_indexable_loop(module: &mut Module, var: &bm_ast::Ident, base: &Expr, body: &Stmt) -> Result<()> {
    let len_expr = Expr::MemberAccess {
        base: Box::new(base.clone()),
        member: "length".to_string(),
        expr_type: TypeExpr::Int { bits: 64, signed: false },
    };
    lower_counter_loop(module, var, &len_expr, Some(base), body)
}

/// `tmp = start`, conditional loop while `tmp </≤ end`, `INC tmp` at step
/// (`spec.md` §4.6).
fn lower_range_loop(
    module: &mut Module,
    var: &bm_ast::Ident,
    start: &Expr,
    end: &Expr,
    inclusive: bool,
    body: &Stmt,
) -> Result<()> {
    let var_id = module.idents.lookup(&mut module.ids, var);
    let start_ref = lower_expr(module, start)?;
    let var_def = module.emit(Code::new(AbstractOp::DefineVariable).with_ident(var_id).with_reference(start_ref));

    let var_read = module.emit(Code::new(AbstractOp::IdentRef).with_ident(var_id));
    let end_ref = lower_expr(module, end)?;
    let op = if inclusive { BinOp::LessEqual } else { BinOp::Less };
    let cond_ref = module.emit(Code::new(AbstractOp::Binary).with_bop(op).with_left_ref(var_read).with_right_ref(end_ref));
    module.emit(Code::new(AbstractOp::LoopCondition).with_reference(cond_ref));

    lower_stmt(module, body)?;
    module.emit(Code::new(AbstractOp::Inc).with_reference(var_def));
    module.emit(Code::new(AbstractOp::EndLoop));
    Ok(())
}

/// Closes the innermost open phi frame and emits one `PHI` per variable
/// assigned on at least one arm, in a deterministic (sorted-by-id) order.
pub(crate) fn insert_phis(module: &mut Module) {
    let frame = module.phi_stack.pop().expect("insert_phis called with an open frame");
    let candidates = frame.merge_candidates();
    let mut vars: Vec<_> = candidates.keys().copied().collect();
    vars.sort_by_key(|id| id.value());

    for var in vars {
        let phi_params = candidates[&var]
            .iter()
            .map(|(cond, value)| bm_ir::PhiParam { cond: *cond, value: *value })
            .collect();
        let phi_ref = module.emit(Code::new(AbstractOp::Phi).with_ident(var).with_phi_params(phi_params));
        if let Some(outer) = module.phi_stack.last_mut() {
            outer.record_assignment(var, phi_ref);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bm_ast::{BinaryOp, Ident};

    fn int_lit(v: i64) -> Expr {
        Expr::IntLiteral { value: v, expr_type: TypeExpr::Int { bits: 32, signed: true } }
    }

    #[test]
    fn if_else_inserts_one_phi_per_merged_variable() {
        let mut m = Module::new();
        let x = Ident::declaration(1, "x");
        let then_block = Stmt::Expr(Expr::Binary {
            op: BinaryOp::Assign,
            left: Box::new(Expr::Ident(x.clone())),
            right: Box::new(int_lit(1)),
            expr_type: TypeExpr::Int { bits: 32, signed: true },
        });
        let else_block = Stmt::Expr(Expr::Binary {
            op: BinaryOp::Assign,
            left: Box::new(Expr::Ident(x.clone())),
            right: Box::new(int_lit(2)),
            expr_type: TypeExpr::Int { bits: 32, signed: true },
        });
        lower_if(&mut m, &Expr::BoolLiteral { value: true }, &then_block, Some(&else_block)).unwrap();
        let phi_count = m.code.iter().filter(|c| c.op == AbstractOp::Phi).count();
        assert_eq!(phi_count, 1);
        assert!(m.phi_stack.is_empty());
    }

    #[test]
    fn break_and_continue_emit_bare_ops() {
        let mut m = Module::new();
        lower_stmt(&mut m, &Stmt::Break).unwrap();
        lower_stmt(&mut m, &Stmt::Continue).unwrap();
        assert_eq!(m.code[0].op, AbstractOp::Break);
        assert_eq!(m.code[1].op, AbstractOp::Continue);
    }

    #[test]
    fn counter_loop_ends_with_inc_and_end_loop() {
        let mut m = Module::new();
        let var = Ident::declaration(1, "i");
        lower_counter_loop(&mut m, &var, &int_lit(10), None, &Stmt::Block { statements: vec![] }).unwrap();
        let ops: Vec<_> = m.code.iter().map(|c| c.op).collect();
        assert_eq!(*ops.last().unwrap(), AbstractOp::EndLoop);
        assert!(ops.contains(&AbstractOp::Inc));
        assert!(ops.contains(&AbstractOp::LoopCondition));
    }
}
