//! The value-assignment pass: a comptime interpreter over the typed tree.
//!
//! No separate IR exists; this pass walks the same statement graph the
//! type-assignment pass produced, propagating literal values, running
//! `Value`-tagged intrinsics, and executing specialized user functions by
//! binding argument values into the parameter declarations of the
//! specialized body. `return`/`break`/`continue` flip flags on the shared
//! [`Sema`] which unwind through the enclosing blocks and loops.

use smallvec::{SmallVec, smallvec};

use crate::{
    ast::{self, StmtId, StmtKind},
    context::Context,
    diag::SemResult,
    intrinsics::{self, IntrinType},
    lex::Tok,
    typeassign::{Outcome, Sema},
    values::ValueId,
};

/// Evaluates a child slot (slot replacement kept for parity with the type
/// pass; value visits never rewrite the tree).
pub(crate) fn visit_slot(cx: &mut Context, sema: &mut Sema, slot: &mut StmtId) -> SemResult<()> {
    visit(cx, sema, *slot)
}

pub(crate) fn visit(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    match &cx.stmts.get(id).kind {
        StmtKind::Block { .. } => visit_block(cx, sema, id),
        StmtKind::Type { .. } => Ok(()),
        StmtKind::Simple { .. } => visit_simple(cx, sema, id),
        StmtKind::CallInfo { .. } => visit_callinfo(cx, sema, id),
        StmtKind::Expr { .. } => visit_expr(cx, sema, id),
        StmtKind::Var { .. } => visit_var(cx, sema, id),
        StmtKind::FnSig { .. } => Ok(()),
        StmtKind::FnDef { .. } => visit_fndef(cx, sema, id),
        StmtKind::Header { .. }
        | StmtKind::Lib { .. }
        | StmtKind::Extern { .. }
        | StmtKind::Enum { .. }
        | StmtKind::Struct { .. } => Ok(()),
        StmtKind::VarDecl { .. } => visit_vardecl(cx, sema, id),
        StmtKind::Cond { .. } => visit_cond(cx, sema, id),
        StmtKind::For { .. } => visit_for(cx, sema, id),
        StmtKind::Ret { .. } => visit_ret(cx, sema, id),
        StmtKind::Continue => {
            sema.continuing = true;
            Ok(())
        }
        StmtKind::Break => {
            sema.breaking = true;
            Ok(())
        }
        StmtKind::Defer { .. } => Ok(()),
    }
}

fn visit_block(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    let stmts = match &cx.stmts.get(id).kind {
        StmtKind::Block { stmts, .. } => stmts.clone(),
        _ => unreachable!("visit_block on non-block"),
    };
    for s in stmts {
        visit(cx, sema, s)
            .map_err(|_| cx.err(id, "failed to compute value of statement in block"))?;
        if sema.breaking || sema.continuing || sema.returning {
            break;
        }
    }
    Ok(())
}

fn visit_simple(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    let decl = match &cx.stmts.get(id).kind {
        StmtKind::Simple { decl, .. } => *decl,
        _ => unreachable!("visit_simple on non-simple"),
    };
    let has_data = cx
        .stmt_value_ref(id, false)
        .is_some_and(|v| cx.values.has_data(v));
    if !has_data && let Some(d) = decl {
        visit(cx, sema, d).map_err(|_| cx.err(id, "failed to determine value from declaration"))?;
    }
    Ok(())
}

fn visit_callinfo(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    let args = match &cx.stmts.get(id).kind {
        StmtKind::CallInfo { args } => args.clone(),
        _ => unreachable!("visit_callinfo on non-callinfo"),
    };
    for a in args {
        visit(cx, sema, a).map_err(|_| cx.err(id, "failed to determine value of argument"))?;
    }
    Ok(())
}

fn visit_expr(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    let (lhs, rhs, oper) = match &cx.stmts.get(id).kind {
        StmtKind::Expr { lhs, rhs, oper, .. } => (*lhs, *rhs, oper.tok),
        _ => unreachable!("visit_expr on non-expr"),
    };

    if oper != Tok::FnCall && oper != Tok::StCall
        && let Some(l) = lhs
    {
        visit(cx, sema, l)
            .map_err(|_| cx.err(id, "failed to determine value of LHS in expression"))?;
    }
    let rhs_is_callinfo = rhs.is_some_and(|r| matches!(cx.stmts.get(r).kind, StmtKind::CallInfo { .. }));
    if oper != Tok::Dot && oper != Tok::Arrow && oper != Tok::Quest
        && let Some(r) = rhs
        && !rhs_is_callinfo
    {
        visit(cx, sema, r)
            .map_err(|_| cx.err(id, "failed to determine value of RHS in expression"))?;
    }

    match oper {
        Tok::Dot | Tok::Arrow => {
            // resolution happened during type assignment; refresh the field
            // binding in case the struct value was replaced since
            let (Some(l), Some(r)) = (lhs, rhs) else {
                return Ok(());
            };
            let Some(lv) = cx.stmt_value_ref(l, false) else {
                return Ok(());
            };
            let fieldname = match &cx.stmts.get(r).kind {
                StmtKind::Simple { lex, .. } => lex.str_data().to_owned(),
                _ => return Ok(()),
            };
            if let Some(field) = cx.values.struct_field(lv, &fieldname) {
                let cur = cx.stmt_value_ref(id, true);
                if cur != Some(field) {
                    cx.rebind_stmt_value(id, field);
                }
            }
            Ok(())
        }
        Tok::FnCall => visit_fncall(cx, sema, id, lhs, rhs),
        Tok::StCall => {
            let Some(r) = rhs else {
                return Ok(());
            };
            visit(cx, sema, r)?;
            if let Some(v) = cx.stmt_value_ref(id, true) {
                cx.values.set_contains_data(v);
            }
            Ok(())
        }
        Tok::UAnd | Tok::UMul => Ok(()),
        Tok::Quest => {
            let (Some(l), Some(r)) = (lhs, rhs) else {
                return Ok(());
            };
            let Some(cv) = cx.stmt_value_ref(l, false) else {
                return Err(cx.err(id, "ternary condition has no value"));
            };
            let (then_arm, else_arm) = match &cx.stmts.get(r).kind {
                StmtKind::Expr { lhs, rhs, .. } => (*lhs, *rhs),
                _ => return Ok(()),
            };
            let arm = if cx.values.is_truthy(cv) { then_arm } else { else_arm };
            let Some(arm) = arm else {
                return Ok(());
            };
            visit(cx, sema, arm)?;
            if let Some(av) = cx.stmt_value_ref(arm, false) {
                cx.update_stmt_value(id, av);
            }
            Ok(())
        }
        Tok::Subs => {
            let (Some(l), Some(r)) = (lhs, rhs) else {
                return Ok(());
            };
            let Some(lty) = cx.stmt_value_ty(l, false) else {
                return Ok(());
            };
            if !cx.types.is_ptr(lty) {
                return visit_oper_call(cx, sema, id, l, Some(r));
            }
            let Some(lv) = cx.stmt_value_ref(l, false) else {
                return Ok(());
            };
            let Some(rv) = cx.stmt_value_ref(r, false) else {
                return Ok(());
            };
            let index = cx.values.as_int(rv);
            let elems = match &cx.values.get(lv).kind {
                crate::values::ValueKind::Vec(elems) => elems.clone(),
                _ => return Err(cx.err(id, "value of pointer/array must be a vector")),
            };
            if index < 0 || elems.len() <= index as usize {
                return Err(cx.err(id, "index out of bounds of pointer/array"));
            }
            cx.rebind_stmt_value(id, elems[index as usize]);
            Ok(())
        }
        // pass-through wrappers: variadic unpack markers, ternary arm
        // pairs, and or-block carriers share their operand's value
        Tok::PostVA | Tok::Col | Tok::Invalid => Ok(()),
        _ => visit_oper_call(cx, sema, id, lhs.unwrap(), rhs),
    }
}

/// Runs a resolved call: `Value` intrinsics execute in the compiler, user
/// functions execute by interpretation of their specialized bodies.
fn visit_fncall(cx: &mut Context, sema: &mut Sema, id: StmtId, lhs: Option<StmtId>, rhs: Option<StmtId>) -> SemResult<()> {
    let Some(l) = lhs else {
        return Ok(());
    };
    let callargs = match rhs.map(|r| &cx.stmts.get(r).kind) {
        Some(StmtKind::CallInfo { args }) => args.clone(),
        _ => return Ok(()),
    };
    for a in &callargs {
        visit(cx, sema, *a)
            .map_err(|_| cx.err(id, "failed to determine value of call argument"))?;
    }
    let Some(fnty) = cx.stmt_value_ty(l, false) else {
        return Err(cx.err(id, "call target has no type"));
    };
    let Some(f) = cx.types.as_func(fnty) else {
        return Err(cx.err(id, "call target is not a function"));
    };
    let (intrin, inty, var) = (f.intrin, f.inty, f.var);
    if let Some(which) = intrin {
        if inty != IntrinType::Parse {
            let mut out = Outcome::Keep;
            intrinsics::call_intrinsic(which, cx, sema, id, &mut out, &callargs)?;
        }
        return Ok(());
    }
    run_user_call(cx, sema, id, var, &callargs)
}

fn visit_oper_call(cx: &mut Context, sema: &mut Sema, id: StmtId, lhs: StmtId, rhs: Option<StmtId>) -> SemResult<()> {
    let mut args: SmallVec<[StmtId; 2]> = smallvec![lhs];
    if let Some(r) = rhs {
        args.push(r);
    }
    for a in &args {
        visit(cx, sema, *a)
            .map_err(|_| cx.err(id, "failed to determine value of operand"))?;
    }
    let called = match &cx.stmts.get(id).kind {
        StmtKind::Expr { called_fn, .. } => *called_fn,
        _ => None,
    };
    let Some(fnty) = called else {
        return Err(cx.err(id, "operator expression has no resolved callee"));
    };
    let Some(f) = cx.types.as_func(fnty) else {
        return Err(cx.err(id, "operator callee is not a function"));
    };
    let (intrin, inty, var) = (f.intrin, f.inty, f.var);
    if let Some(which) = intrin {
        if inty != IntrinType::Parse {
            let mut out = Outcome::Keep;
            intrinsics::call_intrinsic(which, cx, sema, id, &mut out, &args)?;
        }
        return Ok(());
    }
    run_user_call(cx, sema, id, var, &args)
}

/// Interprets a specialized function body against bound argument values.
/// Reference parameters alias their caller's storage, so writes through
/// them land in the caller automatically.
fn run_user_call(
    cx: &mut Context,
    sema: &mut Sema,
    id: StmtId,
    var: Option<StmtId>,
    callargs: &[StmtId],
) -> SemResult<()> {
    let Some(var) = var else {
        return Err(cx.err(id, "function type contains no definition"));
    };
    let fndef = match &cx.stmts.get(var).kind {
        StmtKind::Var { vval: Some(v), .. } => *v,
        _ => return Err(cx.err(id, "function has no definition to execute")),
    };
    let (sig, blk) = match &cx.stmts.get(fndef).kind {
        StmtKind::FnDef { sig, blk, .. } => (*sig, *blk),
        _ => return Err(cx.err(id, "function has no definition to execute")),
    };
    let defargs = match &cx.stmts.get(sig).kind {
        StmtKind::FnSig { args, .. } => args.clone(),
        _ => unreachable!(),
    };
    if defargs.len() != callargs.len() {
        return Err(cx.err(
            id,
            format!(
                "function definition and call must have same argument count (def: {}, call: {})",
                defargs.len(),
                callargs.len()
            ),
        ));
    }
    // snapshot non-reference parameter storage so recursive calls restore
    // the caller's bindings on return (reference parameters alias their
    // call site and must keep their writes)
    let mut saved: Vec<Option<crate::values::ValueRef>> = Vec::with_capacity(defargs.len());
    for &darg in &defargs {
        let vid = cx.stmts.get(darg).value_id;
        if vid == ValueId::NONE {
            saved.push(None);
            continue;
        }
        let exact = cx.values.obj_of(vid);
        if matches!(cx.values.get(exact).kind, crate::values::ValueKind::Ref(_)) {
            saved.push(None);
            continue;
        }
        let snapshot = cx.values.clone_obj(exact);
        saved.push(Some(snapshot));
    }
    for (&darg, &carg) in defargs.iter().zip(callargs.iter()) {
        let Some(aval) = cx.stmt_value_ref(carg, false) else {
            return Err(cx.err(carg, "call argument has no value"));
        };
        if cx.stmts.get(darg).value_id != ValueId::NONE {
            let dobj = cx.values.obj_of(cx.stmts.get(darg).value_id);
            cx.values.update_obj(&cx.types, dobj, aval);
        }
    }

    let res = visit(cx, sema, fndef)
        .map_err(|_| cx.err(id, "failed to determine value from function definition"));

    if res.is_ok()
        && let Some(blk) = blk
        && let Some(bv) = cx.stmt_value_ref(blk, false)
    {
        cx.update_stmt_value(id, bv);
    }
    if let Some(blk) = blk {
        ast::clear_values(cx, blk);
    }
    for (&darg, save) in defargs.iter().zip(saved) {
        let Some(snapshot) = save else {
            continue;
        };
        let dobj = cx.values.obj_of(cx.stmts.get(darg).value_id);
        cx.values.update_obj(&cx.types, dobj, snapshot);
    }
    sema.returning = false;
    res
}

fn visit_var(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    let vval = match &cx.stmts.get(id).kind {
        StmtKind::Var { vval, .. } => *vval,
        _ => unreachable!("visit_var on non-var"),
    };
    let Some(val) = vval else {
        return Ok(());
    };
    if cx.stmts.get(val).is_fndef() {
        return Ok(());
    }
    visit(cx, sema, val).map_err(|_| cx.err(id, "failed to determine value for variable"))?;
    if let Some(v) = cx.stmt_value_ref(val, false) {
        cx.update_stmt_value(id, v);
    }
    Ok(())
}

fn visit_fndef(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    let blk = match &cx.stmts.get(id).kind {
        StmtKind::FnDef { blk, .. } => *blk,
        _ => unreachable!("visit_fndef on non-fndef"),
    };
    let Some(blk) = blk else {
        return Err(cx.err(id, "failed to get value from a function definition without body"));
    };
    visit(cx, sema, blk)
        .map_err(|_| cx.err(id, "failed to determine value from function definition block"))?;
    if let Some(bv) = cx.stmt_value_ref(blk, false) {
        cx.update_stmt_value(id, bv);
    }
    Ok(())
}

fn visit_vardecl(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    let decls = match &cx.stmts.get(id).kind {
        StmtKind::VarDecl { decls } => decls.clone(),
        _ => unreachable!("visit_vardecl on non-vardecl"),
    };
    for d in decls {
        visit(cx, sema, d)
            .map_err(|_| cx.err(id, "failed to determine value of this variable declaration"))?;
    }
    Ok(())
}

fn visit_cond(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    let (conds, is_inline) = match &cx.stmts.get(id).kind {
        StmtKind::Cond { conds, is_inline } => (conds.clone(), *is_inline),
        _ => unreachable!("visit_cond on non-cond"),
    };
    if is_inline {
        let Some(first) = conds.first() else {
            return Ok(());
        };
        return visit(cx, sema, first.blk)
            .map_err(|_| cx.err(id, "failed to determine value for inline conditional block"));
    }
    for c in conds {
        let Some(cond) = c.cond else {
            visit(cx, sema, c.blk)
                .map_err(|_| cx.err(id, "failed to determine else-block value"))?;
            break;
        };
        visit(cx, sema, cond).map_err(|_| cx.err(id, "failed to determine conditional value"))?;
        let truthy = cx
            .stmt_value_ref(cond, false)
            .is_some_and(|v| cx.values.is_truthy(v));
        if !truthy {
            continue;
        }
        visit(cx, sema, c.blk)
            .map_err(|_| cx.err(id, "failed to determine conditional-block value"))?;
        break;
    }
    Ok(())
}

fn visit_for(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    let (init, cond, incr, blk, is_inline) = match &cx.stmts.get(id).kind {
        StmtKind::For {
            init,
            cond,
            incr,
            blk,
            is_inline,
        } => (*init, *cond, *incr, *blk, *is_inline),
        _ => unreachable!("visit_for on non-for"),
    };
    if is_inline {
        if let Some(i) = init {
            visit(cx, sema, i)
                .map_err(|_| cx.err(id, "failed to determine init value for inline for loop"))?;
        }
        return visit(cx, sema, blk)
            .map_err(|_| cx.err(id, "failed to determine block value for inline for loop"));
    }
    if let Some(i) = init {
        visit(cx, sema, i)
            .map_err(|_| cx.err(id, "failed to determine value for for-init statement"))?;
    }
    let Some(cond) = cond else {
        return Err(cx.err(id, "condition must be present in for loop for value assignment"));
    };
    visit(cx, sema, cond)
        .map_err(|_| cx.err(id, "failed to determine value for for-condition expression"))?;
    loop {
        let truthy = cx
            .stmt_value_ref(cond, false)
            .is_some_and(|v| cx.values.is_truthy(v));
        if !truthy {
            break;
        }
        visit(cx, sema, blk)
            .map_err(|_| cx.err(id, "failed to determine value for for-loop block"))?;
        sema.continuing = false;
        if sema.breaking || sema.returning {
            break;
        }
        if let Some(inc) = incr {
            visit(cx, sema, inc)
                .map_err(|_| cx.err(id, "failed to determine incr value for for-loop"))?;
        }
        visit(cx, sema, cond)
            .map_err(|_| cx.err(id, "failed to determine value for for-condition expression"))?;
    }
    sema.breaking = false;
    Ok(())
}

fn visit_ret(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<()> {
    let val = match &cx.stmts.get(id).kind {
        StmtKind::Ret { val, .. } => *val,
        _ => unreachable!("visit_ret on non-ret"),
    };
    if let Some(v) = val {
        visit(cx, sema, v)
            .map_err(|_| cx.err(id, "failed to determine value of return argument"))?;
        if let Some(vv) = cx.stmt_value_ref(v, false) {
            cx.update_stmt_value(id, vv);
        }
    }
    sema.returning = true;
    Ok(())
}
