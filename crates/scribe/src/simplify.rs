//! Post-combine simplification.
//!
//! Runs once over the combined tree: collapses single-statement blocks into
//! their parents, removes imported-namespace variables and variables whose
//! value vanished, drops metatype call arguments (they exist only for the
//! compiler), and erases function signatures that are still templates
//! (generic functions that were never called).

use crate::{
    ast::{self, StmtId, StmtKind},
    context::Context,
    diag::SemResult,
    typeassign::Outcome,
};

pub(crate) fn run(cx: &mut Context, tree: StmtId) -> SemResult<()> {
    visit(cx, tree).map(|_| ())
}

fn visit(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    match &cx.stmts.get(id).kind {
        StmtKind::Block { .. } => visit_block(cx, id),
        StmtKind::CallInfo { .. } => visit_callinfo(cx, id),
        StmtKind::Expr { .. } => visit_expr(cx, id),
        StmtKind::Var { .. } => visit_var(cx, id),
        StmtKind::FnSig { .. } => visit_fnsig(cx, id),
        StmtKind::FnDef { .. } => visit_fndef(cx, id),
        StmtKind::Extern { .. } => visit_extern(cx, id),
        StmtKind::VarDecl { .. } => visit_vardecl(cx, id),
        StmtKind::Cond { .. } => visit_cond(cx, id),
        StmtKind::For { .. } => visit_for(cx, id),
        StmtKind::Ret { .. } => visit_ret(cx, id),
        StmtKind::Struct { .. } => {
            // struct defs appear only as values of variables; nothing to do
            Ok(Outcome::Keep)
        }
        _ => Ok(Outcome::Keep),
    }
}

fn visit_slot(cx: &mut Context, slot: &mut StmtId) -> SemResult<bool> {
    match visit(cx, *slot)? {
        Outcome::Keep => Ok(true),
        Outcome::Replace(n) => {
            *slot = n;
            Ok(true)
        }
        Outcome::Drop => Ok(false),
    }
}

fn visit_block(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let mut stmts = match &mut cx.stmts.get_mut(id).kind {
        StmtKind::Block { stmts, .. } => std::mem::take(stmts),
        _ => unreachable!("visit_block on non-block"),
    };
    let mut i = 0usize;
    while i < stmts.len() {
        let mut slot = stmts[i];
        if !visit_slot(cx, &mut slot)? {
            stmts.remove(i);
            continue;
        }
        stmts[i] = slot;
        // a nested single-statement block collapses inline
        if let StmtKind::Block { stmts: inner, .. } = &cx.stmts.get(stmts[i]).kind
            && inner.len() == 1
        {
            let inner = inner.clone();
            stmts.splice(i..=i, inner);
            i += 1;
            continue;
        }
        i += 1;
    }
    if let StmtKind::Block { stmts: slot, .. } = &mut cx.stmts.get_mut(id).kind {
        *slot = stmts;
    }
    Ok(Outcome::Keep)
}

fn visit_callinfo(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let mut args = match &mut cx.stmts.get_mut(id).kind {
        StmtKind::CallInfo { args } => std::mem::take(args),
        _ => unreachable!("visit_callinfo on non-callinfo"),
    };
    let mut i = 0usize;
    while i < args.len() {
        // metatype arguments are compile-time only
        let is_type = cx
            .stmt_value_ref(args[i], false)
            .is_some_and(|v| cx.values.is_type(v));
        if is_type {
            args.remove(i);
            continue;
        }
        let mut slot = args[i];
        if !visit_slot(cx, &mut slot)? {
            args.remove(i);
            continue;
        }
        args[i] = slot;
        i += 1;
    }
    if let StmtKind::CallInfo { args: slot } = &mut cx.stmts.get_mut(id).kind {
        *slot = args;
    }
    Ok(Outcome::Keep)
}

fn visit_expr(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let (lhs, rhs) = match &cx.stmts.get(id).kind {
        StmtKind::Expr { lhs, rhs, .. } => (*lhs, *rhs),
        _ => unreachable!("visit_expr on non-expr"),
    };
    if let Some(mut l) = lhs
        && visit_slot(cx, &mut l)?
        && let StmtKind::Expr { lhs, .. } = &mut cx.stmts.get_mut(id).kind
    {
        *lhs = Some(l);
    }
    if let Some(mut r) = rhs
        && visit_slot(cx, &mut r)?
        && let StmtKind::Expr { rhs, .. } = &mut cx.stmts.get_mut(id).kind
    {
        *rhs = Some(r);
    }
    Ok(Outcome::Keep)
}

fn visit_var(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    if cx.stmts.get(id).value_id == crate::values::ValueId::NONE {
        return Ok(Outcome::Keep);
    }
    // imported-namespace variables have no runtime existence
    let is_import = cx
        .stmt_value_ref(id, false)
        .is_some_and(|v| cx.values.is_namespace(v));
    if is_import {
        return Ok(Outcome::Drop);
    }
    let (vtype, vval) = match &cx.stmts.get(id).kind {
        StmtKind::Var { vtype, vval, .. } => (*vtype, *vval),
        _ => unreachable!("visit_var on non-var"),
    };
    if let Some(mut v) = vval {
        if !visit_slot(cx, &mut v)? {
            // the variable's value vanished; so does the variable
            return Ok(Outcome::Drop);
        }
        if let StmtKind::Var { vval, .. } = &mut cx.stmts.get_mut(id).kind {
            *vval = Some(v);
        }
    }
    if let Some(mut t) = vtype
        && visit_slot(cx, &mut t)?
        && let StmtKind::Var { vtype, .. } = &mut cx.stmts.get_mut(id).kind
    {
        *vtype = Some(t);
    }
    Ok(Outcome::Keep)
}

fn visit_fnsig(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let templates_disabled = match &cx.stmts.get(id).kind {
        StmtKind::FnSig { templates_disabled, .. } => *templates_disabled,
        _ => unreachable!("visit_fnsig on non-fnsig"),
    };
    // a signature still carrying templates was never specialized: the
    // generic was never called and has no concrete form to keep
    if !templates_disabled {
        return Ok(Outcome::Drop);
    }
    let (mut args, mut ret) = match &cx.stmts.get(id).kind {
        StmtKind::FnSig { args, ret, .. } => (args.clone(), *ret),
        _ => unreachable!(),
    };
    let fnty = cx.stmt_value_ty(id, true);
    let mut i = 0usize;
    while i < args.len() {
        if cx
            .stmt_value_ty(args[i], false)
            .is_some_and(|t| cx.types.is_variadic(t))
        {
            return Err(cx.err(id, "variadic argument in function cannot reach simplify stage"));
        }
        let is_type = cx
            .stmt_value_ref(args[i], false)
            .is_some_and(|v| cx.values.is_type(v));
        if is_type {
            args.remove(i);
            if let Some(fnty) = fnty
                && let Some(f) = cx.types.as_func_mut(fnty)
                && i < f.args.len()
            {
                f.args.remove(i);
            }
            continue;
        }
        let mut slot = args[i];
        if !visit_slot(cx, &mut slot)? {
            args.remove(i);
            continue;
        }
        args[i] = slot;
        i += 1;
    }
    visit_slot(cx, &mut ret)?;
    if let StmtKind::FnSig { args: aslot, ret: rslot, .. } = &mut cx.stmts.get_mut(id).kind {
        *aslot = args;
        *rslot = ret;
    }
    Ok(Outcome::Keep)
}

fn visit_fndef(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let (mut sig, blk) = match &cx.stmts.get(id).kind {
        StmtKind::FnDef { sig, blk, .. } => (*sig, *blk),
        _ => unreachable!("visit_fndef on non-fndef"),
    };
    if !visit_slot(cx, &mut sig)? {
        return Ok(Outcome::Drop);
    }
    if let StmtKind::FnDef { sig: slot, .. } = &mut cx.stmts.get_mut(id).kind {
        *slot = sig;
    }
    if let Some(mut b) = blk {
        if visit_slot(cx, &mut b)?
            && let StmtKind::FnDef { blk, .. } = &mut cx.stmts.get_mut(id).kind
        {
            *blk = Some(b);
        }
        // an unexpanded template body cannot be lowered
        if ast::requires_template_init(cx, b) {
            return Ok(Outcome::Drop);
        }
    }
    Ok(Outcome::Keep)
}

fn visit_extern(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let (headers, libs, entity) = match &cx.stmts.get(id).kind {
        StmtKind::Extern {
            headers, libs, entity, ..
        } => (*headers, *libs, *entity),
        _ => unreachable!("visit_extern on non-extern"),
    };
    if let Some(mut e) = entity {
        if !visit_slot(cx, &mut e)? {
            return Ok(Outcome::Drop);
        }
        if let StmtKind::Extern { entity, .. } = &mut cx.stmts.get_mut(id).kind {
            *entity = Some(e);
        }
    }
    if let Some(mut h) = headers
        && visit_slot(cx, &mut h)?
        && let StmtKind::Extern { headers, .. } = &mut cx.stmts.get_mut(id).kind
    {
        *headers = Some(h);
    }
    if let Some(mut l) = libs
        && visit_slot(cx, &mut l)?
        && let StmtKind::Extern { libs, .. } = &mut cx.stmts.get_mut(id).kind
    {
        *libs = Some(l);
    }
    Ok(Outcome::Keep)
}

fn visit_vardecl(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let mut decls = match &mut cx.stmts.get_mut(id).kind {
        StmtKind::VarDecl { decls } => std::mem::take(decls),
        _ => unreachable!("visit_vardecl on non-vardecl"),
    };
    let mut i = 0usize;
    while i < decls.len() {
        let mut slot = decls[i];
        if !visit_slot(cx, &mut slot)? {
            decls.remove(i);
            continue;
        }
        decls[i] = slot;
        i += 1;
    }
    let empty = decls.is_empty();
    if let StmtKind::VarDecl { decls: slot } = &mut cx.stmts.get_mut(id).kind {
        *slot = decls;
    }
    if empty {
        return Ok(Outcome::Drop);
    }
    Ok(Outcome::Keep)
}

fn visit_cond(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let conds = match &cx.stmts.get(id).kind {
        StmtKind::Cond { conds, .. } => conds.clone(),
        _ => unreachable!("visit_cond on non-cond"),
    };
    let mut new_conds = Vec::with_capacity(conds.len());
    for mut c in conds {
        if let Some(mut cond) = c.cond
            && visit_slot(cx, &mut cond)?
        {
            c.cond = Some(cond);
        }
        let mut blk = c.blk;
        if visit_slot(cx, &mut blk)? {
            c.blk = blk;
        }
        new_conds.push(c);
    }
    if let StmtKind::Cond { conds: slot, .. } = &mut cx.stmts.get_mut(id).kind {
        *slot = new_conds;
    }
    Ok(Outcome::Keep)
}

fn visit_for(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let (init, cond, incr, mut blk) = match &cx.stmts.get(id).kind {
        StmtKind::For {
            init, cond, incr, blk, ..
        } => (*init, *cond, *incr, *blk),
        _ => unreachable!("visit_for on non-for"),
    };
    for (slot_val, pick) in [(init, 0usize), (cond, 1), (incr, 2)] {
        if let Some(mut s) = slot_val
            && visit_slot(cx, &mut s)?
            && let StmtKind::For { init, cond, incr, .. } = &mut cx.stmts.get_mut(id).kind
        {
            match pick {
                0 => *init = Some(s),
                1 => *cond = Some(s),
                _ => *incr = Some(s),
            }
        }
    }
    if visit_slot(cx, &mut blk)?
        && let StmtKind::For { blk: slot, .. } = &mut cx.stmts.get_mut(id).kind
    {
        *slot = blk;
    }
    Ok(Outcome::Keep)
}

fn visit_ret(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let val = match &cx.stmts.get(id).kind {
        StmtKind::Ret { val, .. } => *val,
        _ => unreachable!("visit_ret on non-ret"),
    };
    if let Some(mut v) = val
        && visit_slot(cx, &mut v)?
        && let StmtKind::Ret { val, .. } = &mut cx.stmts.get_mut(id).kind
    {
        *val = Some(v);
    }
    Ok(Outcome::Keep)
}
