//! Token and tree dumps for the `-t`/`-a`/`-s` CLI flags.

use std::fmt::Write;

use crate::{
    ast::{StmtId, StmtKind},
    context::Context,
    loc::ModuleId,
    values::ValueId,
};

pub(crate) fn dump_tokens(cx: &Context, module: ModuleId) -> String {
    let Some(m) = cx.modules.get(module) else {
        return String::new();
    };
    let mut out = format!("Source: {}\n", m.path);
    for t in &m.tokens {
        let _ = write!(out, "{:<10} [{}]", t.tok.as_str(), cx.srcmap.loc_str(t.loc));
        match &t.data {
            crate::lex::Payload::None => {}
            crate::lex::Payload::Str(s) => {
                let _ = write!(out, " {s:?}");
            }
            crate::lex::Payload::Int(i) => {
                let _ = write!(out, " {i}");
            }
            crate::lex::Payload::Flt(f) => {
                let _ = write!(out, " {f}");
            }
        }
        out.push('\n');
    }
    out
}

/// The ` :: type -> cast ==> value` suffix on dumped statements.
fn type_string(cx: &Context, id: StmtId) -> String {
    let s = cx.stmts.get(id);
    if s.value_id == ValueId::NONE {
        return String::new();
    }
    let mut res = String::from(" :: ");
    if s.is_comptime() {
        res.push_str("comptime ");
    }
    if s.is_ref() {
        res.push_str("& ");
    }
    if s.is_const() {
        res.push_str("const ");
    }
    if let Some(ty) = cx.stmt_value_ty(id, false) {
        res.push_str(&cx.types.to_str(ty));
    }
    if let Some(cast) = s.cast_to {
        res.push_str(" -> ");
        res.push_str(&cx.types.to_str(cast));
    }
    if let Some(v) = cx.stmt_value_ref(id, false)
        && cx.values.has_data(v)
    {
        res.push_str(" ==> ");
        res.push_str(&cx.values.display(&cx.types, v));
    }
    res
}

pub(crate) fn dump_tree(cx: &Context, id: StmtId) -> String {
    let mut out = String::new();
    dump_stmt(cx, id, 0, &mut out);
    out
}

fn pad(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn line(cx: &Context, id: StmtId, depth: usize, out: &mut String, text: &str) {
    pad(out, depth);
    out.push_str(text);
    out.push_str(&type_string(cx, id));
    out.push('\n');
}

fn dump_stmt(cx: &Context, id: StmtId, depth: usize, out: &mut String) {
    match &cx.stmts.get(id).kind {
        StmtKind::Block { stmts, is_top, .. } => {
            line(cx, id, depth, out, &format!("Block [top = {}]:", if *is_top { "yes" } else { "no" }));
            for &s in stmts {
                dump_stmt(cx, s, depth + 1, out);
            }
        }
        StmtKind::Type { ptr, variadic, expr } => {
            line(cx, id, depth, out, &format!("Type [ptr = {ptr}] [variadic = {variadic}]:"));
            dump_stmt(cx, *expr, depth + 1, out);
        }
        StmtKind::Simple { lex, decl, self_of, .. } => {
            let payload = match &lex.data {
                crate::lex::Payload::None => String::new(),
                crate::lex::Payload::Str(s) => format!(" {s}"),
                crate::lex::Payload::Int(i) => format!(" {i}"),
                crate::lex::Payload::Flt(f) => format!(" {f}"),
            };
            line(
                cx,
                id,
                depth,
                out,
                &format!(
                    "Simple [decl = {}] [self = {}]: {}{payload}",
                    if decl.is_some() { "yes" } else { "no" },
                    if self_of.is_some() { "yes" } else { "no" },
                    lex.tok.as_str(),
                ),
            );
        }
        StmtKind::CallInfo { args } => {
            line(cx, id, depth, out, "Function Call Info:");
            for &a in args {
                dump_stmt(cx, a, depth + 1, out);
            }
        }
        StmtKind::Expr { lhs, oper, rhs, .. } => {
            line(cx, id, depth, out, &format!("Expression [oper = {}]:", oper.tok.as_str()));
            if let Some(l) = lhs {
                dump_stmt(cx, *l, depth + 1, out);
            }
            if let Some(r) = rhs {
                dump_stmt(cx, *r, depth + 1, out);
            }
        }
        StmtKind::Var { name, vtype, vval, .. } => {
            line(cx, id, depth, out, &format!("Variable: {}", name.str_data()));
            if let Some(t) = vtype {
                pad(out, depth + 1);
                out.push_str("Type:\n");
                dump_stmt(cx, *t, depth + 2, out);
            }
            if let Some(v) = vval {
                pad(out, depth + 1);
                out.push_str("Value:\n");
                dump_stmt(cx, *v, depth + 2, out);
            }
        }
        StmtKind::FnSig {
            args,
            ret,
            has_variadic,
            ..
        } => {
            line(cx, id, depth, out, &format!("Function Signature [variadic = {has_variadic}]:"));
            for &a in args {
                dump_stmt(cx, a, depth + 1, out);
            }
            pad(out, depth + 1);
            out.push_str("Return Type:\n");
            dump_stmt(cx, *ret, depth + 2, out);
        }
        StmtKind::FnDef { sig, blk, used, .. } => {
            line(cx, id, depth, out, &format!("Function definition [used = {used}]:"));
            dump_stmt(cx, *sig, depth + 1, out);
            if let Some(b) = blk {
                dump_stmt(cx, *b, depth + 1, out);
            }
        }
        StmtKind::Header { names, .. } => {
            line(cx, id, depth, out, &format!("Header: {}", names.str_data()));
        }
        StmtKind::Lib { flags } => {
            line(cx, id, depth, out, &format!("Library flags: {}", flags.str_data()));
        }
        StmtKind::Extern { name, entity, .. } => {
            line(cx, id, depth, out, &format!("Extern: {}", name.str_data()));
            if let Some(e) = entity {
                dump_stmt(cx, *e, depth + 1, out);
            }
        }
        StmtKind::Enum { items } => {
            let names: Vec<&str> = items.iter().map(|i| i.str_data()).collect();
            line(cx, id, depth, out, &format!("Enumeration: {}", names.join(", ")));
        }
        StmtKind::Struct { fields, templates, .. } => {
            let tnames: Vec<&str> = templates.iter().map(|t| t.str_data()).collect();
            line(cx, id, depth, out, &format!("Struct [templates = {}]:", tnames.join(", ")));
            for &f in fields {
                dump_stmt(cx, f, depth + 1, out);
            }
        }
        StmtKind::VarDecl { decls } => {
            line(cx, id, depth, out, "Variable declarations:");
            for &d in decls {
                dump_stmt(cx, d, depth + 1, out);
            }
        }
        StmtKind::Cond { conds, is_inline } => {
            line(cx, id, depth, out, &format!("Conditional [inline = {is_inline}]:"));
            for c in conds {
                pad(out, depth + 1);
                out.push_str(if c.cond.is_some() { "Branch:\n" } else { "Else:\n" });
                if let Some(cond) = c.cond {
                    dump_stmt(cx, cond, depth + 2, out);
                }
                dump_stmt(cx, c.blk, depth + 2, out);
            }
        }
        StmtKind::For {
            init,
            cond,
            incr,
            blk,
            is_inline,
        } => {
            line(cx, id, depth, out, &format!("For [inline = {is_inline}]:"));
            for (label, s) in [("Init:", init), ("Cond:", cond), ("Incr:", incr)] {
                if let Some(s) = s {
                    pad(out, depth + 1);
                    out.push_str(label);
                    out.push('\n');
                    dump_stmt(cx, *s, depth + 2, out);
                }
            }
            dump_stmt(cx, *blk, depth + 1, out);
        }
        StmtKind::Ret { val, .. } => {
            line(cx, id, depth, out, "Return:");
            if let Some(v) = val {
                dump_stmt(cx, *v, depth + 1, out);
            }
        }
        StmtKind::Continue => line(cx, id, depth, out, "Continue"),
        StmtKind::Break => line(cx, id, depth, out, "Break"),
        StmtKind::Defer { val } => {
            line(cx, id, depth, out, "Defer:");
            dump_stmt(cx, *val, depth + 1, out);
        }
    }
}
