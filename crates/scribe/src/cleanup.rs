//! Final cleanup: erases function definitions whose use count stayed at
//! zero and variable declarations that became empty as a result.

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
        StmtKind::Var { .. } => visit_var(cx, id),
        StmtKind::FnDef { .. } => {
            if !ast::is_used(cx, id) {
                return Ok(Outcome::Drop);
            }
            Ok(Outcome::Keep)
        }
        StmtKind::VarDecl { .. } => visit_vardecl(cx, id),
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

fn visit_var(cx: &mut Context, id: StmtId) -> SemResult<Outcome> {
    let vval = match &cx.stmts.get(id).kind {
        StmtKind::Var { vval, .. } => *vval,
        _ => unreachable!("visit_var on non-var"),
    };
    if let Some(mut v) = vval {
        if !visit_slot(cx, &mut v)? {
            return Ok(Outcome::Drop);
        }
        if let StmtKind::Var { vval, .. } = &mut cx.stmts.get_mut(id).kind {
            *vval = Some(v);
        }
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
