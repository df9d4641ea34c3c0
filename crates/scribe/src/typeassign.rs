//! The type-assignment pass.
//!
//! A post-order walk that resolves names (with per-module mangling), turns
//! operators into member-function dispatch, specializes function and struct
//! templates at their call sites, applies implicit primitive coercions as
//! cast nodes, expands `inline if`/`inline for` using the comptime value
//! pass, and rewrites member access through namespaces and structs.
//!
//! Visits return an [`Outcome`] telling the parent what to do with the
//! child slot; this replaces pointer-to-pointer surgery with explicit tree
//! edits.

use ahash::AHashMap;

use crate::{
    ast::{self, StmtId, StmtKind, StmtMask},
    context::Context,
    diag::{Halted, SemResult},
    intrinsics::{self, IntrinType},
    lex::{Lexeme, Tok},
    loc::ModuleId,
    scope::ScopeStack,
    types::{self, TypeId, TypeInfo},
    valueassign,
    values::{ContainsData, Value, ValueId, ValueKind},
};

/// What a visit did to the node it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Keep,
    Replace(StmtId),
    Drop,
}

impl Outcome {
    pub fn current(self, id: StmtId) -> Option<StmtId> {
        match self {
            Self::Keep => Some(id),
            Self::Replace(n) => Some(n),
            Self::Drop => None,
        }
    }
}

/// Applies an outcome to a child slot; returns false when the child was
/// dropped and should be removed from its parent.
fn apply_to_slot(slot: &mut StmtId, out: Outcome) -> bool {
    match out {
        Outcome::Keep => true,
        Outcome::Replace(n) => {
            *slot = n;
            true
        }
        Outcome::Drop => false,
    }
}

/// Shared state of the semantic passes: scope stack, in-flight template
/// instantiations, per-function variadic lengths, and the comptime
/// interpreter's control-flow flags.
pub(crate) struct Sema {
    pub scopes: ScopeStack,
    /// Specialized functions and enum items, appended to the module top
    /// block once its visit finishes.
    pub additional_vars: Vec<StmtId>,
    va_len: Vec<usize>,
    fn_va: Vec<bool>,
    pub disabled_mangling: bool,
    /// Keyed `name + non-uniq-id`, breaks recursion between mutually
    /// templated calls.
    being_templated: AHashMap<String, StmtId>,
    enum_count: usize,
    // value-pass control flow
    pub returning: bool,
    pub breaking: bool,
    pub continuing: bool,
}

impl Sema {
    pub fn new(cx: &mut Context) -> Self {
        let mut scopes = ScopeStack::new();
        intrinsics::seed_builtins(cx, &mut scopes);
        Self {
            scopes,
            additional_vars: Vec::new(),
            va_len: Vec::new(),
            fn_va: Vec::new(),
            disabled_mangling: false,
            being_templated: AHashMap::new(),
            enum_count: 0,
            returning: false,
            breaking: false,
            continuing: false,
        }
    }

    pub fn is_fn_va(&self) -> bool {
        self.fn_va.last().copied().unwrap_or(false)
    }

    pub fn fn_va_len(&self) -> usize {
        self.va_len.last().copied().unwrap_or(0)
    }

    fn push_func(&mut self) {
        self.scopes.push_func(None);
        self.scopes.push_layer();
        self.fn_va.push(false);
        self.va_len.push(0);
    }

    fn update_last_func(&mut self, fty: TypeId, is_va: bool, va_len: usize) {
        self.scopes.set_top_func_ty(fty);
        if let Some(v) = self.fn_va.last_mut() {
            *v = is_va;
        }
        if let Some(v) = self.va_len.last_mut() {
            *v = va_len;
        }
    }

    fn pop_func(&mut self) {
        self.scopes.pop_layer();
        self.scopes.pop_func();
        self.fn_va.pop();
        self.va_len.pop();
    }
}

/// Runs the pass over a module's top block.
pub(crate) fn run(cx: &mut Context, sema: &mut Sema, tree: StmtId) -> SemResult<()> {
    match visit(cx, sema, tree)? {
        Outcome::Keep => Ok(()),
        _ => Err(cx.err(tree, "internal compiler error: module top block was replaced")),
    }
}

pub(crate) fn visit(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    if cx.diags.at_limit() {
        return Err(Halted);
    }
    let out = match &cx.stmts.get(id).kind {
        StmtKind::Block { .. } => visit_block(cx, sema, id),
        StmtKind::Type { .. } => visit_type(cx, sema, id),
        StmtKind::Simple { .. } => visit_simple(cx, sema, id),
        StmtKind::CallInfo { .. } => visit_callinfo(cx, sema, id),
        StmtKind::Expr { .. } => visit_expr(cx, sema, id),
        StmtKind::Var { .. } => visit_var(cx, sema, id),
        StmtKind::FnSig { .. } => visit_fnsig(cx, sema, id),
        StmtKind::FnDef { .. } => visit_fndef(cx, sema, id),
        StmtKind::Header { .. } | StmtKind::Lib { .. } => Ok(Outcome::Keep),
        StmtKind::Extern { .. } => visit_extern(cx, sema, id),
        StmtKind::Enum { .. } => visit_enum(cx, sema, id),
        StmtKind::Struct { .. } => visit_struct(cx, sema, id),
        StmtKind::VarDecl { .. } => visit_vardecl(cx, sema, id),
        StmtKind::Cond { .. } => visit_cond(cx, sema, id),
        StmtKind::For { .. } => visit_for(cx, sema, id),
        StmtKind::Ret { .. } => visit_ret(cx, sema, id),
        StmtKind::Continue | StmtKind::Break => Ok(Outcome::Keep),
        StmtKind::Defer { .. } => {
            Err(cx.err(id, "internal compiler error: defer statement survived parsing"))
        }
    }?;

    // a comptime expression with a concrete type must be evaluated now
    if let Some(cur) = out.current(id)
        && cx.stmts.get(cur).value_id != ValueId::NONE
        && cx.stmts.get(cur).is_comptime()
        && let Some(ty) = cx.stmt_value_ty(cur, false)
        && !cx.types.is_template(ty, 0)
        && valueassign::visit(cx, sema, cur).is_err()
    {
        return Err(cx.err(cur, "failed to get value for a comptime type"));
    }
    Ok(out)
}

fn visit_child(cx: &mut Context, sema: &mut Sema, slot: &mut StmtId) -> SemResult<bool> {
    let out = visit(cx, sema, *slot)?;
    Ok(apply_to_slot(slot, out))
}

// ----------------------------------------------------------------------
// blocks
// ----------------------------------------------------------------------

fn visit_block(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let (is_top, layering_disabled) = match &cx.stmts.get(id).kind {
        StmtKind::Block {
            is_top,
            layering_disabled,
            ..
        } => (*is_top, *layering_disabled),
        _ => unreachable!("visit_block on non-block"),
    };
    let module_is_main = cx.modules.is_main(cx.stmts.loc(id).module);
    let layered = !layering_disabled && (module_is_main || !is_top);
    if layered {
        sema.scopes.push_layer();
    }

    let mut stmts = match &mut cx.stmts.get_mut(id).kind {
        StmtKind::Block { stmts, .. } => std::mem::take(stmts),
        _ => unreachable!(),
    };

    let mut i = 0usize;
    let mut failed = false;
    while i < stmts.len() {
        match visit(cx, sema, stmts[i]) {
            Ok(Outcome::Keep) => {}
            Ok(Outcome::Replace(n)) => stmts[i] = n,
            Ok(Outcome::Drop) => {
                stmts.remove(i);
                continue;
            }
            Err(Halted) => {
                failed = true;
                break;
            }
        }
        // flatten nested blocks at module top (conditional imports leave
        // them behind); their contents are already fully visited
        if is_top && cx.stmts.get(stmts[i]).is_block() {
            let inner = match &mut cx.stmts.get_mut(stmts[i]).kind {
                StmtKind::Block { stmts, .. } => std::mem::take(stmts),
                _ => unreachable!(),
            };
            let count = inner.len();
            stmts.splice(i..=i, inner);
            i += count;
            continue;
        }
        i += 1;
    }

    if is_top && !failed {
        let extra = std::mem::take(&mut sema.additional_vars);
        stmts.splice(0..0, extra);
    }

    if let StmtKind::Block { stmts: slot, .. } = &mut cx.stmts.get_mut(id).kind {
        *slot = stmts;
    }
    if layered {
        sema.scopes.pop_layer();
    }
    if failed {
        return Err(Halted);
    }
    Ok(Outcome::Keep)
}

// ----------------------------------------------------------------------
// types and simple expressions
// ----------------------------------------------------------------------

fn type_info_from_mask(mask: StmtMask, variadic: bool) -> TypeInfo {
    let mut info = TypeInfo::empty();
    if mask.contains(StmtMask::REF) {
        info |= TypeInfo::REF;
    }
    if mask.contains(StmtMask::STATIC) {
        info |= TypeInfo::STATIC;
    }
    if mask.contains(StmtMask::CONST) {
        info |= TypeInfo::CONST;
    }
    if mask.contains(StmtMask::VOLATILE) {
        info |= TypeInfo::VOLATILE;
    }
    if mask.contains(StmtMask::COMPTIME) {
        info |= TypeInfo::COMPTIME;
    }
    if variadic {
        info |= TypeInfo::VARIADIC;
    }
    info
}

fn visit_type(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let (ptr, variadic, mut expr) = match &cx.stmts.get(id).kind {
        StmtKind::Type { ptr, variadic, expr } => (*ptr, *variadic, *expr),
        _ => unreachable!("visit_type on non-type"),
    };
    if !visit_child(cx, sema, &mut expr)? {
        return Err(cx.err(id, "failed to determine type of type-expr"));
    }
    if let StmtKind::Type { expr: slot, .. } = &mut cx.stmts.get_mut(id).kind {
        *slot = expr;
    }
    let Some(expr_ty) = cx.stmt_value_ty(expr, false) else {
        return Err(cx.err(id, "failed to determine type of type-expr"));
    };

    // a self-referencing struct member must sit behind a (weak) pointer
    let is_self = matches!(
        &cx.stmts.get(expr).kind,
        StmtKind::Simple { lex, .. } if lex.tok == Tok::Iden && lex.str_data() == "Self"
    );
    if is_self && ptr == 0 {
        return Err(cx.err(id, "self referencing struct member must be a pointer"));
    }

    let mut res = if is_self {
        expr_ty
    } else {
        cx.types.specialize(expr_ty)
    };
    for i in 0..ptr {
        let weak = is_self && i == ptr - 1;
        res = cx.types.mk_ptr(res, 0, weak);
    }
    let info = type_info_from_mask(cx.stmts.get(id).mask, variadic);
    if !info.is_empty() && !(is_self && ptr == 0) {
        cx.types.append_info(res, info);
    }
    let v = cx.values.alloc(Value {
        ty: res,
        has_data: ContainsData::Perma,
        kind: ValueKind::Type,
    });
    cx.set_stmt_value(id, v);
    Ok(Outcome::Keep)
}

fn mangled_name(module: ModuleId, name: &str) -> String {
    format!("{name}_{}", module.index())
}

fn visit_simple(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let lex = match &cx.stmts.get(id).kind {
        StmtKind::Simple { lex, .. } => lex.clone(),
        _ => unreachable!("visit_simple on non-simple"),
    };
    match lex.tok {
        Tok::Void => {
            let ty = cx.types.mk_void();
            let v = cx.values.alloc(Value {
                ty,
                has_data: ContainsData::True,
                kind: ValueKind::Void,
            });
            cx.set_stmt_value(id, v);
        }
        Tok::Any => {
            let ty = cx.types.mk_any();
            set_type_value(cx, id, ty);
        }
        Tok::Type => {
            let ty = cx.types.mk_typety();
            set_type_value(cx, id, ty);
        }
        // literals are permanent data; they participate in comptime
        // propagation so literal arithmetic folds during this pass
        Tok::True => {
            set_int_value(cx, id, 1, 1, true);
            cx.stmts.get_mut(id).mask |= StmtMask::COMPTIME;
        }
        Tok::False | Tok::Nil => {
            set_int_value(cx, id, 1, 0, true);
            cx.stmts.get_mut(id).mask |= StmtMask::COMPTIME;
        }
        Tok::Char => {
            let ch = lex.str_data().bytes().next().unwrap_or(0);
            set_int_value(cx, id, 8, i64::from(ch), true);
            cx.stmts.get_mut(id).mask |= StmtMask::COMPTIME;
        }
        Tok::Int => {
            let n = lex.data.as_int();
            let bits = if i32::try_from(n).is_ok() { 32 } else { 64 };
            set_int_value(cx, id, bits, n, true);
            cx.stmts.get_mut(id).mask |= StmtMask::COMPTIME;
        }
        Tok::Flt => {
            let ty = cx.types.mk_flt(32);
            let v = cx.values.alloc(Value {
                ty,
                has_data: ContainsData::Perma,
                kind: ValueKind::Flt(lex.data.as_flt()),
            });
            cx.set_stmt_value(id, v);
            cx.stmts.get_mut(id).mask |= StmtMask::COMPTIME;
        }
        Tok::Str => {
            let v = cx.values.mk_str(&mut cx.types, lex.str_data(), ContainsData::Perma);
            cx.set_stmt_value(id, v);
            cx.stmts.get_mut(id).mask |= StmtMask::CONST | StmtMask::COMPTIME;
        }
        Tok::I1 => set_type_int(cx, id, 1, true),
        Tok::I8 => set_type_int(cx, id, 8, true),
        Tok::I16 => set_type_int(cx, id, 16, true),
        Tok::I32 => set_type_int(cx, id, 32, true),
        Tok::I64 => set_type_int(cx, id, 64, true),
        Tok::U8 => set_type_int(cx, id, 8, false),
        Tok::U16 => set_type_int(cx, id, 16, false),
        Tok::U32 => set_type_int(cx, id, 32, false),
        Tok::U64 => set_type_int(cx, id, 64, false),
        Tok::F32 => {
            let ty = cx.types.mk_flt(32);
            set_type_value(cx, id, ty);
        }
        Tok::F64 => {
            let ty = cx.types.mk_flt(64);
            set_type_value(cx, id, ty);
        }
        Tok::Iden => {
            let applied = matches!(
                &cx.stmts.get(id).kind,
                StmtKind::Simple { applied_module_id: true, .. }
            );
            let name = lex.str_data().to_owned();
            let module = cx.stmts.loc(id).module;
            let mut decl = None;
            let mut vid = ValueId::NONE;
            if !applied {
                let mangled = mangled_name(module, &name);
                vid = sema.scopes.get_var(&mangled, false, true);
                if vid != ValueId::NONE {
                    decl = sema.scopes.get_decl(&mangled, false, true);
                    if let StmtKind::Simple { lex, .. } = &mut cx.stmts.get_mut(id).kind {
                        lex.set_str_data(mangled);
                    }
                }
            }
            if vid == ValueId::NONE {
                vid = sema.scopes.get_var(&name, false, true);
                decl = sema.scopes.get_decl(&name, false, true);
            }
            if vid == ValueId::NONE {
                return Err(cx.err(id, format!("undefined variable: {name}")));
            }
            cx.stmts.get_mut(id).value_id = vid;
            if let StmtKind::Simple {
                applied_module_id,
                decl: dslot,
                ..
            } = &mut cx.stmts.get_mut(id).kind
            {
                *applied_module_id = true;
                *dslot = decl;
            }
            if let Some(d) = decl {
                let mask = cx.stmts.get(d).mask;
                cx.stmts.get_mut(id).mask = mask;
            }
        }
        _ => return Err(cx.err(id, "cannot assign a type to this token")),
    }
    Ok(Outcome::Keep)
}

fn set_type_value(cx: &mut Context, id: StmtId, ty: TypeId) {
    let v = cx.values.alloc(Value {
        ty,
        has_data: ContainsData::Perma,
        kind: ValueKind::Type,
    });
    cx.set_stmt_value(id, v);
}

fn set_type_int(cx: &mut Context, id: StmtId, bits: u16, signed: bool) {
    let ty = cx.types.mk_int(bits, signed);
    set_type_value(cx, id, ty);
}

fn set_int_value(cx: &mut Context, id: StmtId, bits: u16, val: i64, signed: bool) {
    let ty = cx.types.mk_int(bits, signed);
    let v = cx.values.alloc(Value {
        ty,
        has_data: ContainsData::Perma,
        kind: ValueKind::Int(val),
    });
    cx.set_stmt_value(id, v);
}

fn visit_callinfo(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let mut args = match &mut cx.stmts.get_mut(id).kind {
        StmtKind::CallInfo { args } => std::mem::take(args),
        _ => unreachable!("visit_callinfo on non-callinfo"),
    };
    sema.scopes.push_layer();
    let mut res = Ok(());
    for slot in &mut args {
        if let Err(e) = visit_child(cx, sema, slot) {
            res = Err(e);
            break;
        }
    }
    sema.scopes.pop_layer();
    if let StmtKind::CallInfo { args: slot } = &mut cx.stmts.get_mut(id).kind {
        *slot = args;
    }
    res.map(|()| Outcome::Keep)
}

// ----------------------------------------------------------------------
// expressions
// ----------------------------------------------------------------------

struct ExprParts {
    lhs: Option<StmtId>,
    rhs: Option<StmtId>,
    oper: Lexeme,
    commas: u16,
    is_intrinsic: bool,
}

fn expr_parts(cx: &Context, id: StmtId) -> ExprParts {
    match &cx.stmts.get(id).kind {
        StmtKind::Expr {
            lhs,
            rhs,
            oper,
            commas,
            is_intrinsic,
            ..
        } => ExprParts {
            lhs: *lhs,
            rhs: *rhs,
            oper: oper.clone(),
            commas: *commas,
            is_intrinsic: *is_intrinsic,
        },
        _ => unreachable!("expr_parts on non-expr"),
    }
}

fn store_lhs(cx: &mut Context, id: StmtId, new_lhs: StmtId) {
    if let StmtKind::Expr { lhs, .. } = &mut cx.stmts.get_mut(id).kind {
        *lhs = Some(new_lhs);
    }
}

fn store_rhs(cx: &mut Context, id: StmtId, new_rhs: StmtId) {
    if let StmtKind::Expr { rhs, .. } = &mut cx.stmts.get_mut(id).kind {
        *rhs = Some(new_rhs);
    }
}

fn set_called_fn(cx: &mut Context, id: StmtId, fnty: TypeId) {
    if let StmtKind::Expr { called_fn, .. } = &mut cx.stmts.get_mut(id).kind {
        *called_fn = Some(fnty);
    }
}

fn visit_expr(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let parts = expr_parts(cx, id);
    let oper = parts.oper.tok;

    let mut lhs = parts.lhs;
    if let Some(slot) = &mut lhs {
        if !visit_child(cx, sema, slot)? {
            return Err(cx.err(id, "failed to determine type of LHS in expression"));
        }
        store_lhs(cx, id, *slot);
    }
    let mut rhs = parts.rhs;
    if oper != Tok::Dot && oper != Tok::Arrow
        && let Some(slot) = &mut rhs
    {
        if !visit_child(cx, sema, slot)? {
            return Err(cx.err(id, "failed to determine type of RHS in expression"));
        }
        store_rhs(cx, id, *slot);
    }

    let out = match oper {
        Tok::Arrow | Tok::Dot => {
            if oper == Tok::Arrow {
                let lty = require_ty(cx, lhs.unwrap())?;
                if !cx.types.is_ptr(lty) {
                    return Err(cx.err(lhs.unwrap(), "LHS must be a pointer for arrow access"));
                }
            }
            visit_member_access(cx, sema, id, lhs.unwrap(), rhs.unwrap())?
        }
        Tok::FnCall => visit_fncall(cx, sema, id, lhs.unwrap(), rhs.unwrap(), parts.is_intrinsic)?,
        Tok::StCall => visit_stcall(cx, id, lhs.unwrap(), rhs.unwrap())?,
        Tok::UAnd => {
            let lhs = lhs.unwrap();
            let lv = require_val(cx, lhs)?;
            if cx.values.is_type(lv) {
                return Err(cx.err(id, "cannot use address-of operator on a type"));
            }
            let lty = require_ty(cx, lhs)?;
            let pty = cx.types.mk_ptr(lty, 0, false);
            let v = cx.values.alloc(Value {
                ty: pty,
                has_data: ContainsData::False,
                kind: ValueKind::Vec(vec![lv]),
            });
            cx.set_stmt_value(id, v);
            Outcome::Keep
        }
        Tok::UMul => {
            let lhs = lhs.unwrap();
            let lv = require_val(cx, lhs)?;
            if cx.values.is_type(lv) {
                let inner = cx.values.ty(lv);
                let resolved = cx.types.contained(inner).unwrap_or(inner);
                let pty = cx.types.mk_ptr(resolved, 0, false);
                set_type_value(cx, id, pty);
                Outcome::Keep
            } else {
                let lty = require_ty(cx, lhs)?;
                if !cx.types.is_ptr(lty) {
                    let s = cx.types.to_str(lty);
                    return Err(cx.err(id, format!("cannot dereference non pointer type: {s}")));
                }
                if cx.values.is_vec(lv) {
                    let elem = match &cx.values.get(lv).kind {
                        ValueKind::Vec(elems) => elems.first().copied(),
                        _ => None,
                    };
                    match elem {
                        Some(e) => {
                            cx.set_stmt_value(id, e);
                        }
                        None => {
                            let to = cx.types.ptr_to(lty).unwrap();
                            let loc = cx.stmts.loc(id);
                            let v = types::to_default_value(cx, to, loc, ContainsData::False, 0)?;
                            cx.set_stmt_value(id, v);
                        }
                    }
                } else {
                    let to = cx.types.ptr_to(lty).unwrap();
                    let loc = cx.stmts.loc(id);
                    let v = types::to_default_value(cx, to, loc, ContainsData::False, 0)?;
                    cx.set_stmt_value(id, v);
                }
                Outcome::Keep
            }
        }
        Tok::Subs => visit_subscript(cx, sema, id, lhs.unwrap(), rhs.unwrap())?,
        Tok::PostVA => {
            // `pack...` in argument position: the pack itself flows through
            Outcome::Replace(lhs.unwrap())
        }
        Tok::Quest => {
            let cty = require_ty(cx, lhs.unwrap())?;
            if !cx.types.is_primitive(cty) {
                return Err(cx.err(id, "ternary condition type must be primitive"));
            }
            let arm_ty = require_ty(cx, rhs.unwrap())?;
            let loc = cx.stmts.loc(id);
            let v = types::to_default_value(cx, arm_ty, loc, ContainsData::False, 0)?;
            cx.set_stmt_value(id, v);
            Outcome::Keep
        }
        Tok::Col => {
            // ternary arm pair: both arms typed alike, carries the then-arm
            let lty = require_ty(cx, lhs.unwrap())?;
            let rty = require_ty(cx, rhs.unwrap())?;
            let loc = cx.stmts.loc(id);
            if !types::is_compatible(cx, lty, rty, loc) {
                return Err(cx.err(id, "ternary arms have incompatible types"));
            }
            cx.share_stmt_value(id, lhs.unwrap());
            Outcome::Keep
        }
        Tok::Invalid if rhs.is_none() => {
            // bare expression wrapped only to carry an or-block
            cx.share_stmt_value(id, lhs.unwrap());
            Outcome::Keep
        }
        Tok::Assn => {
            // the parser builds `a = b` with the value on the left; swap so
            // dispatch sees the assignment target first
            let l = lhs.unwrap();
            let r = rhs.unwrap();
            store_lhs(cx, id, r);
            store_rhs(cx, id, l);
            visit_oper_fn(cx, sema, id, r, Some(l), parts.oper.clone())?
        }
        _ if !parts.oper.tok.oper_fn_name().is_empty() => {
            visit_oper_fn(cx, sema, id, lhs.unwrap(), rhs, parts.oper.clone())?
        }
        _ => {
            return Err(cx.err_loc(parts.oper.loc, "nonexistent operator"));
        }
    };

    if let Some(cur) = out.current(id)
        && cur == id
        && parts.commas > 0
    {
        cx.stmts.get_mut(id).value_id = ValueId::NONE;
    }
    Ok(out)
}

fn require_val(cx: &mut Context, id: StmtId) -> SemResult<crate::values::ValueRef> {
    match cx.stmt_value_ref(id, false) {
        Some(v) => Ok(v),
        None => Err(cx.err(id, "expression has no resolved value")),
    }
}

fn require_ty(cx: &mut Context, id: StmtId) -> SemResult<TypeId> {
    match cx.stmt_value_ty(id, false) {
        Some(t) => Ok(t),
        None => Err(cx.err(id, "expression has no resolved type")),
    }
}

/// `.` / `->`: namespace members remangle and collapse to the RHS; struct
/// fields alias the field's value; everything else resolves through the
/// type's member-function table with the LHS captured as `self`.
fn visit_member_access(
    cx: &mut Context,
    sema: &mut Sema,
    id: StmtId,
    lhs: StmtId,
    rhs: StmtId,
) -> SemResult<Outcome> {
    if !cx.stmts.get(rhs).is_simple() {
        return Err(cx.err(rhs, "member access expects an identifier on the right"));
    }
    let lv = require_val(cx, lhs)?;
    if cx.values.is_namespace(lv) {
        let ns = match &cx.values.get(lv).kind {
            ValueKind::Namespace(ns) => ns.clone(),
            _ => unreachable!(),
        };
        let rname = match &cx.stmts.get(rhs).kind {
            StmtKind::Simple { lex, .. } => lex.str_data().to_owned(),
            _ => unreachable!(),
        };
        let mangled = format!("{rname}_{ns}");
        if let StmtKind::Simple {
            lex,
            applied_module_id,
            ..
        } = &mut cx.stmts.get_mut(rhs).kind
        {
            lex.set_str_data(mangled);
            *applied_module_id = true;
        }
        let mut slot = rhs;
        if !visit_child(cx, sema, &mut slot)? {
            return Err(cx.err(id, "failed to determine type of RHS in dot expression"));
        }
        // the namespace LHS disappears from the tree
        return Ok(Outcome::Replace(slot));
    }

    let fieldname = match &cx.stmts.get(rhs).kind {
        StmtKind::Simple { lex, .. } => lex.str_data().to_owned(),
        _ => unreachable!(),
    };

    // count pointer hops so codegen knows how deep to dereference
    let mut v = cx.stmt_value_ref(lhs, true).ok_or_else(|| {
        cx.err(lhs, "expression has no resolved value");
        Halted
    })?;
    let mut ptrcount = 0u16;
    while cx.types.is_ptr(cx.values.ty(v)) {
        let next = match &cx.values.get(v).kind {
            ValueKind::Vec(elems) => elems.first().copied(),
            _ => None,
        };
        match next {
            Some(n) => {
                v = n;
                ptrcount += 1;
            }
            None => break,
        }
    }
    cx.stmts.get_mut(lhs).deref_count = ptrcount;

    let lv = require_val(cx, lhs)?;
    if cx.values.is_struct(lv)
        && let Some(field) = cx.values.struct_field(lv, &fieldname)
    {
        cx.set_stmt_value(rhs, field);
        cx.share_stmt_value(id, rhs);
        return Ok(Outcome::Keep);
    }

    let lty = require_ty(cx, lhs)?;
    let fnid = sema.scopes.get_type_fn(&cx.types, lty, &fieldname);
    if fnid == ValueId::NONE {
        let tyname = cx.types.to_str(lty);
        return Err(cx.err(
            id,
            format!("no field or function '{fieldname}' in struct '{tyname}'"),
        ));
    }
    // rewrite into a bare function reference with the receiver captured
    if let StmtKind::Simple { self_of, .. } = &mut cx.stmts.get_mut(rhs).kind {
        *self_of = Some(lhs);
    }
    let fnobj = cx.values.obj_of(fnid);
    cx.set_stmt_value(rhs, fnobj);
    Ok(Outcome::Replace(rhs))
}

/// Expands any argument whose value is a variadic pack into `name__0..n`.
fn expand_variadic_args(cx: &mut Context, args: &mut Vec<StmtId>) -> SemResult<()> {
    let mut i = 0usize;
    while i < args.len() {
        let Some(aty) = cx.stmt_value_ty(args[i], false) else {
            i += 1;
            continue;
        };
        if !cx.types.is_variadic(aty) {
            i += 1;
            continue;
        }
        let a = args[i];
        if !cx.stmts.get(a).is_simple() {
            i += 1;
            continue;
        }
        let Some(av) = cx.stmt_value_ref(a, false) else {
            i += 1;
            continue;
        };
        let elems = match &cx.values.get(av).kind {
            ValueKind::Vec(elems) => elems.clone(),
            _ => return Err(cx.err(a, "variadic value must be a vector")),
        };
        let name = match &cx.stmts.get(a).kind {
            StmtKind::Simple { lex, .. } => lex.str_data().to_owned(),
            _ => unreachable!(),
        };
        args.remove(i);
        for (j, &elem) in elems.iter().enumerate() {
            let newa = cx.stmts.clone_deep(a);
            if let StmtKind::Simple { lex, .. } = &mut cx.stmts.get_mut(newa).kind {
                lex.set_str_data(format!("{name}__{j}"));
            }
            cx.set_stmt_value(newa, elem);
            args.insert(i + j, newa);
        }
        i += elems.len();
    }
    Ok(())
}

fn visit_fncall(
    cx: &mut Context,
    sema: &mut Sema,
    id: StmtId,
    lhs: StmtId,
    rhs: StmtId,
    is_intrinsic: bool,
) -> SemResult<Outcome> {
    let lv = require_val(cx, lhs)?;
    let lty = require_ty(cx, lhs)?;
    let callable_fn = cx.types.is_func(lty);
    let struct_def = cx.values.is_type(lv) && cx.types.is_struct(lty);
    if !callable_fn && !struct_def {
        let s = cx.types.to_str(lty);
        return Err(cx.err(
            id,
            format!("func call can be performed only on funcs or struct defs, found: {s}"),
        ));
    }

    let mut args = match &cx.stmts.get(rhs).kind {
        StmtKind::CallInfo { args } => args.clone(),
        _ => return Err(cx.err(rhs, "function call expects call info on the right")),
    };
    // a member-function reference carries its receiver as the first arg
    if let StmtKind::Simple {
        self_of: Some(selfv), ..
    } = &cx.stmts.get(lhs).kind
    {
        args.insert(0, *selfv);
    }
    expand_variadic_args(cx, &mut args)?;

    if cx.values.is_func(lv) {
        let loc = cx.stmts.loc(id);
        let orig_fn = lty;
        let Some(mut fnty) = types::create_call(cx, orig_fn, loc, &args) else {
            let s = cx.types.to_str(orig_fn);
            return Err(cx.err(
                id,
                format!("function '{s}' is incompatible with call arguments"),
            ));
        };
        let fnval = cx.values.alloc(Value {
            ty: fnty,
            has_data: ContainsData::True,
            kind: ValueKind::Func,
        });
        cx.set_stmt_value(lhs, fnval);

        coerce_call_args(cx, sema, fnty, &mut args)?;

        let f = cx.types.as_func(fnty).unwrap();
        let (intrin, inty, ret) = (f.intrin, f.inty, f.ret);
        if is_intrinsic {
            let loc = cx.stmts.loc(id);
            let rv = types::to_default_value(cx, ret, loc, ContainsData::False, 0)?;
            cx.set_stmt_value(id, rv);
            let Some(which) = intrin else {
                return Err(cx.err(id, "function call is intrinsic but the function itself is not"));
            };
            let mut out = Outcome::Keep;
            if inty == IntrinType::Parse {
                intrinsics::call_intrinsic(which, cx, sema, id, &mut out, &args)?;
            }
            set_called_fn(cx, id, fnty);
            if let StmtKind::CallInfo { args: slot } = &mut cx.stmts.get_mut(rhs).kind {
                *slot = args;
            }
            return Ok(out);
        } else if intrin.is_some() {
            return Err(cx.err(id, "function is intrinsic - required '@' before call"));
        }

        init_template_func(cx, sema, id, &mut fnty, &mut args)?;
        if let Some(v) = cx.stmt_value_ref(lhs, true) {
            cx.values.get_mut(v).ty = fnty;
        }
        set_called_fn(cx, id, fnty);
        let ret = cx.types.as_func(fnty).unwrap().ret;
        let loc = cx.stmts.loc(id);
        let rv = types::to_default_value(cx, ret, loc, ContainsData::False, 0)?;
        cx.set_stmt_value(id, rv);
        if let Some(sig) = cx.types.as_func(fnty).unwrap().sig {
            let ret_stmt = match &cx.stmts.get(sig).kind {
                StmtKind::FnSig { ret, .. } => *ret,
                _ => unreachable!(),
            };
            let mask = cx.stmts.get(ret_stmt).mask;
            cx.stmts.get_mut(id).mask |= mask;
        }
        if let StmtKind::CallInfo { args: slot } = &mut cx.stmts.get_mut(rhs).kind {
            *slot = args;
        }
        Ok(Outcome::Keep)
    } else {
        // struct template specialization through call syntax
        let mut argtys = Vec::with_capacity(args.len());
        for &a in &args {
            argtys.push(require_ty(cx, a)?);
        }
        let loc = cx.stmts.loc(id);
        let resst = types::apply_templates(cx, lty, loc, &argtys)?;
        set_type_value(cx, lhs, resst);
        Ok(Outcome::Replace(lhs))
    }
}

/// Per-argument handling after `create_call`: const-pointer casts, implicit
/// primitive coercion, use-marking of function-typed arguments, and eager
/// evaluation of comptime parameters.
fn coerce_call_args(cx: &mut Context, sema: &mut Sema, fnty: TypeId, args: &mut [StmtId]) -> SemResult<()> {
    let f = cx.types.as_func(fnty).unwrap().clone();
    let fnarglen = f.args.len();
    let mut k = 0usize;
    let mut i = 0usize;
    let mut j = 0usize;
    while i < fnarglen && j < args.len() {
        let mut coerced_to = f.args[i];
        let arg = args[j];
        let sig_arg = f.sig.and_then(|sig| match &cx.stmts.get(sig).kind {
            StmtKind::FnSig { args, .. } => args.get(i).copied(),
            _ => None,
        });
        let arg_comptime = f.is_arg_comptime(i);
        if cx.types.is_variadic(coerced_to) {
            let va_args = cx.types.variadic_args(coerced_to).unwrap();
            if k < va_args.len() {
                coerced_to = va_args[k];
                k += 1;
            }
        } else {
            i += 1;
        }

        // losing or gaining pointer constness is an explicit cast
        if let Some(fnarg) = sig_arg {
            let fnarg_const = cx.stmts.get(fnarg).is_const();
            let aty = require_ty(cx, arg)?;
            if cx.stmts.get(arg).is_const() != fnarg_const
                && cx.types.is_ptr(coerced_to)
                && cx.types.is_ptr(aty)
            {
                let mask = cx.stmts.get(fnarg).mask;
                cx.stmts.get_mut(arg).cast_to(coerced_to, mask);
            }
        }
        if cx.stmts.get(arg).cast_to.is_none() {
            apply_primitive_coercion(cx, coerced_to, arg);
        }
        mark_fn_arg_used(cx, arg);
        if arg_comptime {
            let mut slot = args[j];
            if valueassign::visit_slot(cx, sema, &mut slot).is_err() {
                return Err(cx.err(arg, "failed to determine value for comptime arg"));
            }
            args[j] = slot;
        }
        j += 1;
    }
    Ok(())
}

/// A function passed as an argument keeps its definition alive.
fn mark_fn_arg_used(cx: &mut Context, arg: StmtId) {
    let Some(aty) = cx.stmt_value_ty(arg, false) else {
        return;
    };
    let Some(f) = cx.types.as_func(aty) else {
        return;
    };
    let Some(var) = f.var else {
        return;
    };
    if let StmtKind::Var { vval: Some(vv), .. } = &cx.stmts.get(var).kind
        && cx.stmts.get(*vv).is_fndef()
    {
        ast::inc_used(cx, *vv);
    }
}

fn visit_stcall(cx: &mut Context, id: StmtId, lhs: StmtId, rhs: StmtId) -> SemResult<Outcome> {
    let lv = require_val(cx, lhs)?;
    if !cx.values.is_type(lv) || !cx.types.is_struct(cx.values.ty(lv)) {
        let s = cx.values.display(&cx.types, lv);
        return Err(cx.err(
            id,
            format!("struct call is only applicable on struct definitions, found: {s}"),
        ));
    }
    let st = cx.values.ty(lv);
    let args = match &cx.stmts.get(rhs).kind {
        StmtKind::CallInfo { args } => args.clone(),
        _ => return Err(cx.err(rhs, "struct call expects call info on the right")),
    };
    let loc = cx.stmts.loc(id);
    let st = types::instantiate_struct(cx, st, loc, &args)?;

    let fields = cx.types.as_struct(st).unwrap().fields.clone();
    let names = cx.types.as_struct(st).unwrap().field_names.clone();
    let mut vals = indexmap::IndexMap::new();
    for ((field_ty, name), &arg) in fields.iter().zip(names.iter()).zip(args.iter()) {
        apply_primitive_coercion(cx, *field_ty, arg);
        let av = require_val(cx, arg)?;
        let cloned = cx.values.clone_obj(av);
        cx.values.get_mut(cloned).ty = *field_ty;
        vals.insert(name.clone(), cloned);
    }
    let sv = cx.values.alloc(Value {
        ty: st,
        has_data: ContainsData::False,
        kind: ValueKind::Struct(vals),
    });
    cx.set_stmt_value(id, sv);
    Ok(Outcome::Keep)
}

fn visit_subscript(cx: &mut Context, sema: &mut Sema, id: StmtId, lhs: StmtId, rhs: StmtId) -> SemResult<Outcome> {
    let lty = require_ty(cx, lhs)?;
    if cx.types.is_variadic(lty) {
        if !cx.stmts.get(lhs).is_simple() {
            return Err(cx.err(id, "LHS in variadic subscript must be a simple stmt"));
        }
        let rv = require_val(cx, rhs)?;
        if !cx.values.is_int(rv) {
            return Err(cx.err(rhs, "index for a variadic must be integral"));
        }
        if !cx.values.has_data(rv) {
            let mut slot = rhs;
            if valueassign::visit_slot(cx, sema, &mut slot).is_err() {
                return Err(cx.err(id, "variadic index must be calculable at comptime"));
            }
        }
        let rv = require_val(cx, rhs)?;
        let index = cx.values.as_int(rv);
        let va_len = sema.fn_va_len();
        if index < 0 || va_len <= index as usize {
            return Err(cx.err(
                id,
                format!("variadic index out of bounds (va: {va_len}, index: {index})"),
            ));
        }
        let l = cx.stmts.clone_deep(lhs);
        if let StmtKind::Simple { lex, .. } = &mut cx.stmts.get_mut(l).kind {
            let name = lex.str_data().to_owned();
            lex.set_str_data(format!("{name}__{index}"));
        }
        let mut slot = l;
        if !visit_child(cx, sema, &mut slot)? {
            return Err(cx.err(id, "failed to determine type of LHS in expression"));
        }
        return Ok(Outcome::Replace(slot));
    }
    if cx.types.is_ptr(lty) {
        let rv = require_val(cx, rhs)?;
        if !cx.values.is_int(rv) {
            return Err(cx.err(rhs, "index for a pointer must be integral"));
        }
        let to = cx.types.ptr_to(lty).unwrap();
        let loc = cx.stmts.loc(id);
        let v = types::to_default_value(cx, to, loc, ContainsData::False, 0)?;
        cx.set_stmt_value(id, v);
        return Ok(Outcome::Keep);
    }
    let oper = Lexeme::new(cx.stmts.loc(id), Tok::Subs);
    visit_oper_fn(cx, sema, id, lhs, Some(rhs), oper)
}

/// Operator dispatch: the operator name is looked up in the LHS type's
/// member-function table and the call is specialized like any other.
fn visit_oper_fn(
    cx: &mut Context,
    sema: &mut Sema,
    id: StmtId,
    lhs: StmtId,
    rhs: Option<StmtId>,
    oper: Lexeme,
) -> SemResult<Outcome> {
    apply_binary_coercion(cx, lhs, rhs, &oper);

    let fname = oper.tok.oper_fn_name();
    let lty = require_ty(cx, lhs)?;
    let fnid = sema.scopes.get_type_fn(&cx.types, lty, fname);
    if fnid == ValueId::NONE {
        let tyname = cx.types.to_str(lty);
        return Err(cx.err(
            id,
            format!("function '{fname}' does not exist for type: {tyname}"),
        ));
    }
    if oper.tok.is_assign()
        && (cx.stmts.get(lhs).is_const() || cx.stmts.get(lhs).is_cast_const())
        && !cx.types.is_ptr(lty)
    {
        return Err(cx.err(id, "cannot perform assignment (like) operations on const data"));
    }

    let fnobj = cx.values.obj_of(fnid);
    let orig_fn = cx.values.ty(fnobj);

    let mut args = vec![lhs];
    if let Some(r) = rhs {
        args.push(r);
    }
    expand_variadic_args(cx, &mut args)?;

    let loc = cx.stmts.loc(id);
    let Some(mut fnty) = types::create_call(cx, orig_fn, loc, &args) else {
        return Err(cx.err(id, "function is incompatible with call arguments"));
    };

    let mut both_comptime = cx.stmts.get(lhs).is_comptime();
    if let Some(r) = rhs
        && !cx.stmts.get(r).is_comptime()
    {
        both_comptime = false;
    }

    // const pointer cast on the right operand
    if let Some(r) = rhs {
        let f = cx.types.as_func(fnty).unwrap();
        let fn_arg1 = f.args.get(1).copied();
        let sig_arg1 = f.sig.and_then(|sig| match &cx.stmts.get(sig).kind {
            StmtKind::FnSig { args, .. } => args.get(1).copied(),
            _ => None,
        });
        if let Some(fa1) = fn_arg1 {
            let rty = require_ty(cx, r)?;
            let fnrhs_const = sig_arg1.map_or(cx.stmts.get(r).is_const(), |s| cx.stmts.get(s).is_const());
            if cx.stmts.get(r).is_const() != fnrhs_const
                && cx.types.is_ptr(fa1)
                && cx.types.is_ptr(rty)
            {
                let mask = sig_arg1.map_or(StmtMask::empty(), |s| cx.stmts.get(s).mask);
                cx.stmts.get_mut(r).cast_to(fa1, mask);
            }
        }
    }

    {
        let f = cx.types.as_func(fnty).unwrap().clone();
        for (i, slot) in args.iter_mut().enumerate() {
            mark_fn_arg_used(cx, *slot);
            let arg_comptime = f.is_arg_comptime(i);
            if (!both_comptime && !arg_comptime) || valueassign::visit_slot(cx, sema, slot).is_ok() {
                continue;
            }
            return Err(cx.err(id, "failed to determine value for comptime arg"));
        }
    }

    let f = cx.types.as_func(fnty).unwrap();
    let (intrin, inty, ret) = (f.intrin, f.inty, f.ret);
    if intrin.is_some() && inty == IntrinType::Parse {
        let rv = types::to_default_value(cx, ret, loc, ContainsData::False, 0)?;
        cx.set_stmt_value(id, rv);
        if !both_comptime {
            return Err(cx.err(id, "arguments to parse intrinsic are not comptime"));
        }
        let mut out = Outcome::Keep;
        intrinsics::call_intrinsic(intrin.unwrap(), cx, sema, id, &mut out, &args)?;
        set_called_fn(cx, id, fnty);
        return Ok(out);
    }

    init_template_func(cx, sema, id, &mut fnty, &mut args)?;

    // primitive non-assignment results are plain values, never references
    let mut both_primitive = true;
    if let Some(t) = cx.stmt_value_ty(lhs, true)
        && !cx.types.is_primitive_or_ptr(t)
    {
        both_primitive = false;
    }
    if let Some(r) = rhs
        && let Some(t) = cx.stmt_value_ty(r, true)
        && !cx.types.is_primitive_or_ptr(t)
    {
        both_primitive = false;
    }
    if both_primitive && !oper.tok.is_assign()
        && let Some(sig) = cx.types.as_func(fnty).unwrap().sig
    {
        let ret_stmt = match &cx.stmts.get(sig).kind {
            StmtKind::FnSig { ret, .. } => *ret,
            _ => unreachable!(),
        };
        cx.stmts.get_mut(ret_stmt).mask.remove(StmtMask::REF);
    }

    set_called_fn(cx, id, fnty);
    let ret = cx.types.as_func(fnty).unwrap().ret;
    let rv = types::to_default_value(cx, ret, loc, ContainsData::False, 0)?;
    cx.set_stmt_value(id, rv);
    if let Some(sig) = cx.types.as_func(fnty).unwrap().sig {
        let ret_stmt = match &cx.stmts.get(sig).kind {
            StmtKind::FnSig { ret, .. } => *ret,
            _ => unreachable!(),
        };
        let mask = cx.stmts.get(ret_stmt).mask;
        cx.stmts.get_mut(id).mask |= mask;
    }
    if both_comptime {
        cx.stmts.get_mut(id).mask |= StmtMask::COMPTIME;
    }
    Ok(Outcome::Keep)
}

// ----------------------------------------------------------------------
// coercion
// ----------------------------------------------------------------------

/// Casts `from` to `to` when both are primitives/pointers differing in
/// representation.
fn apply_primitive_coercion(cx: &mut Context, to: TypeId, from: StmtId) {
    let Some(fty) = cx.stmt_value_ty(from, false) else {
        return;
    };
    if !cx.types.is_primitive_or_ptr(to) || !cx.types.is_primitive_or_ptr(fty) {
        return;
    }
    if !cx.types.requires_cast(to, fty) {
        return;
    }
    cx.stmts.get_mut(from).cast_to(to, StmtMask::empty());
}

/// Between two primitive operands, casts the inferior side to the superior
/// type (float beats int, wider beats narrower, unsigned beats signed).
/// Assignments always cast the right side to the left's type.
fn apply_binary_coercion(cx: &mut Context, lhs: StmtId, rhs: Option<StmtId>, oper: &Lexeme) {
    let Some(r) = rhs else {
        return;
    };
    let (Some(l_ty), Some(r_ty)) = (cx.stmt_value_ty(lhs, false), cx.stmt_value_ty(r, false)) else {
        return;
    };
    if !cx.types.is_primitive_or_ptr(l_ty) || !cx.types.is_primitive_or_ptr(r_ty) {
        return;
    }
    if oper.tok == Tok::Subs {
        return;
    }
    if cx.types.id(l_ty) == cx.types.id(r_ty) {
        return;
    }
    if oper.tok.is_assign() {
        if cx.types.is_ptr(r_ty) && !cx.types.is_ptr(l_ty) {
            return;
        }
        let target = cx.types.specialize(l_ty);
        let mask = cx.stmts.get(lhs).mask;
        cx.stmts.get_mut(r).cast_to(target, mask);
        cx.stmts.get_mut(r).cast_mask.remove(StmtMask::REF);
        return;
    }
    if choose_superior_primitive(cx, l_ty, r_ty) {
        let target = cx.types.specialize(l_ty);
        let mask = cx.stmts.get(lhs).mask;
        cx.stmts.get_mut(r).cast_to(target, mask);
    } else {
        let target = cx.types.specialize(r_ty);
        let mask = cx.stmts.get(r).mask;
        cx.stmts.get_mut(lhs).cast_to(target, mask);
    }
}

/// True when the left type wins the promotion contest.
fn choose_superior_primitive(cx: &Context, l: TypeId, r: TypeId) -> bool {
    let t = &cx.types;
    if t.is_flt(l) && t.is_int(r) {
        return true;
    }
    if t.is_flt(r) && t.is_int(l) {
        return false;
    }
    if t.is_flt(l) && t.is_flt(r) {
        return t.flt_bits(l) > t.flt_bits(r);
    }
    if t.is_int(l) && t.is_int(r) {
        if t.int_bits(l) > t.int_bits(r) {
            return true;
        }
        if t.int_bits(l) < t.int_bits(r) {
            return false;
        }
        if !t.int_signed(l) && t.int_signed(r) {
            return true;
        }
        if t.int_signed(l) && !t.int_signed(r) {
            return false;
        }
    }
    true
}

// ----------------------------------------------------------------------
// variables
// ----------------------------------------------------------------------

fn visit_var(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let (name_lex, mut vtype, mut vval, applied) = match &cx.stmts.get(id).kind {
        StmtKind::Var {
            name,
            vtype,
            vval,
            applied_module_id,
        } => (name.clone(), *vtype, *vval, *applied_module_id),
        _ => unreachable!("visit_var on non-var"),
    };
    let is_in = cx.stmts.get(id).is_in();
    let is_global = cx.stmts.get(id).is_global();
    let is_comptime = cx.stmts.get(id).is_comptime();

    let mut skip_val = false;
    let mut skip_mangle = is_global || sema.disabled_mangling || applied;
    if let Some(v) = vval {
        if cx.stmts.get(v).is_fndef() {
            if let StmtKind::FnDef { parent_var, .. } = &mut cx.stmts.get_mut(v).kind {
                *parent_var = Some(id);
            }
            if is_in {
                skip_mangle = true;
            }
        }
        if cx.stmts.get(v).is_extern() {
            let no_entity = matches!(&cx.stmts.get(v).kind, StmtKind::Extern { entity: None, .. });
            if let StmtKind::Extern { parent_var, .. } = &mut cx.stmts.get_mut(v).kind {
                *parent_var = Some(id);
            }
            if no_entity {
                skip_val = true;
            }
        }
    }

    let name = if skip_mangle {
        name_lex.str_data().to_owned()
    } else {
        let mangled = mangled_name(cx.stmts.loc(id).module, name_lex.str_data());
        if let StmtKind::Var {
            name, applied_module_id, ..
        } = &mut cx.stmts.get_mut(id).kind
        {
            name.set_str_data(mangled.clone());
            *applied_module_id = true;
        }
        mangled
    };

    if let Some(slot) = &mut vval {
        let kept = visit_child(cx, sema, slot)?;
        if !kept {
            vval = None;
        }
        if let StmtKind::Var { vval: vslot, .. } = &mut cx.stmts.get_mut(id).kind {
            *vslot = vval;
        }
        if let Some(v) = vval
            && !skip_val
            && cx.stmt_value_ty(v, false).is_none()
        {
            return Err(cx.err(id, "unable to determine type of value of this variable"));
        }
    }
    if let Some(slot) = &mut vtype {
        if !visit_child(cx, sema, slot)? {
            return Err(cx.err(id, "unable to determine type from the given type of this variable"));
        }
        if let StmtKind::Var { vtype: tslot, .. } = &mut cx.stmts.get_mut(id).kind {
            *tslot = Some(*slot);
        }
        if cx.stmt_value_ty(*slot, false).is_none() {
            return Err(cx.err(id, "unable to determine type from the given type of this variable"));
        }
    }

    if is_in {
        let selfty = member_self_ty(cx, vval)?;
        if sema.scopes.has_type_fn(&cx.types, selfty, &name) {
            let tyname = cx.types.to_str(selfty);
            return Err(cx.err(
                id,
                format!("member function '{name}' already exists for type: {tyname}"),
            ));
        }
    } else if sema.scopes.exists(&name, true, false) {
        return Err(cx.err_loc(
            name_lex.loc,
            format!("variable '{name}' already exists in scope"),
        ));
    }

    if let Some(v) = vval
        && !skip_val
        && cx.stmt_value_ty(v, false).is_some_and(|t| cx.types.is_void(t))
    {
        return Err(cx.err(id, "value expression returns void, which cannot be assigned to a var"));
    }
    if let (Some(t), Some(v)) = (vtype, vval)
        && !skip_val
    {
        let tty = require_ty(cx, t)?;
        let vty = require_ty(cx, v)?;
        let loc = cx.stmts.loc(id);
        if !types::is_compatible(cx, tty, vty, loc) {
            return Err(cx.err(id, "incompatible given type and value of the variable decl"));
        }
    }
    if let Some(v) = vval
        && !skip_val
        && is_comptime
    {
        let mut slot = v;
        let evaluated = valueassign::visit_slot(cx, sema, &mut slot).is_ok();
        let has_data = cx.stmt_value_ref(slot, false).is_some_and(|r| cx.values.has_data(r));
        if !evaluated || !has_data {
            return Err(cx.err(id, "value of comptime variable could not be calculated"));
        }
        cx.stmts.get_mut(slot).mask |= StmtMask::COMPTIME;
        vval = Some(slot);
        if let StmtKind::Var { vval: vslot, .. } = &mut cx.stmts.get_mut(id).kind {
            *vslot = vval;
        }
    }

    if let Some(v) = vval
        && vtype.is_none()
    {
        if let Some(cast) = cx.stmts.get(v).cast_to {
            let loc = cx.stmts.loc(v);
            let rv = types::to_default_value(cx, cast, loc, ContainsData::False, 0)?;
            cx.set_stmt_value(id, rv);
        } else {
            cx.share_stmt_value(id, v);
        }
    } else if let Some(t) = vtype {
        cx.share_stmt_value(id, t);
    }

    if let Some(t) = vtype {
        let mask = cx.stmts.get(t).mask;
        cx.stmts.get_mut(id).mask |= mask;
    }
    if let Some(v) = vval {
        let mask = cx.stmts.get(v).mask;
        cx.stmts.get_mut(id).mask |= mask;
    }
    if let Some(t) = vtype {
        if !cx.stmts.get(t).is_const() {
            cx.stmts.get_mut(id).mask.remove(StmtMask::CONST);
        }
        if !cx.stmts.get(t).is_ref() {
            cx.stmts.get_mut(id).mask.remove(StmtMask::REF);
        }
    }

    // a declared type stands for its default value
    if vtype.is_some()
        && let Some(v) = cx.stmt_value_ref(id, false)
        && cx.values.is_type(v)
    {
        let t = cx.values.ty(v);
        let t = cx.types.contained(t).unwrap_or(t);
        let loc = cx.stmts.loc(id);
        let Ok(res) = types::to_default_value(cx, t, loc, ContainsData::False, 0) else {
            let s = cx.types.to_str(t);
            return Err(cx.err(id, format!("failed to retrieve default value for type: {s}")));
        };
        cx.set_stmt_value(id, res);
    }

    if !cx.stmts.get(id).is_ref() {
        if let Some(v) = cx.stmt_value_ref(id, false) {
            let cloned = cx.values.clone_obj(v);
            cx.set_stmt_value(id, cloned);
        }
    } else if let Some(v) = cx.stmt_value_ref(id, false)
        && cx.values.has_perma_data(v)
        && !cx.values.is_type(v)
    {
        return Err(cx.err(id, "a reference variable cannot have perma data"));
    }

    if let (Some(t), Some(v)) = (vtype, vval)
        && !skip_val
    {
        if cx.stmts.get(v).is_const() != cx.stmts.get(t).is_const() {
            let tty = require_ty(cx, t)?;
            let mask = cx.stmts.get(t).mask;
            cx.stmts.get_mut(v).cast_to(tty, mask);
        }
        if cx.stmts.get(v).cast_to.is_none() {
            let tty = require_ty(cx, t)?;
            apply_primitive_coercion(cx, tty, v);
        }
    }

    // a function variable with an explicit signature type remembers the
    // signature statement for parameter masks
    if let Some(t) = vtype
        && let Some(vty) = cx.stmt_value_ty(id, false)
        && cx.types.is_func(vty)
    {
        let sig_stmt = match &cx.stmts.get(t).kind {
            StmtKind::Type { expr, .. } if cx.stmts.get(*expr).is_fnsig() => Some(*expr),
            _ => None,
        };
        if let Some(sig) = sig_stmt
            && let Some(f) = cx.types.as_func_mut(vty)
            && f.sig.is_none()
        {
            f.sig = Some(sig);
        }
    }

    let vid = cx.stmts.get(id).value_id;
    if is_in {
        let selfty = member_self_ty(cx, vval)?;
        if !sema.scopes.add_type_fn(&cx.types, selfty, &name, vid) {
            return Err(cx.err(id, format!("member function '{name}' already exists for type")));
        }
        return Ok(Outcome::Keep);
    }
    // function declarations carry themselves via their type; others keep a
    // back-pointer for value recomputation
    let is_fn = cx.stmt_value_ty(id, false).is_some_and(|t| cx.types.is_func(t));
    let decl = if is_fn { None } else { Some(id) };
    if !sema.scopes.add_var(&name, vid, decl, is_global) {
        return Err(cx.err_loc(
            name_lex.loc,
            format!("variable '{name}' already exists in scope"),
        ));
    }
    Ok(Outcome::Keep)
}

/// The receiver type of a `let name in Type = fn(...)` member function.
fn member_self_ty(cx: &mut Context, vval: Option<StmtId>) -> SemResult<TypeId> {
    let Some(def) = vval else {
        return Err(cx.diags.error(None, "member function has no definition"));
    };
    let sig = match &cx.stmts.get(def).kind {
        StmtKind::FnDef { sig, .. } => *sig,
        _ => return Err(cx.err(def, "member function value must be a function definition")),
    };
    let self_arg = match &cx.stmts.get(sig).kind {
        StmtKind::FnSig { args, .. } => args.first().copied(),
        _ => unreachable!(),
    };
    let Some(self_arg) = self_arg else {
        return Err(cx.err(def, "member function signature is missing its receiver"));
    };
    require_ty(cx, self_arg)
}

// ----------------------------------------------------------------------
// functions
// ----------------------------------------------------------------------

fn visit_fnsig(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let (mut args, mut ret) = match &cx.stmts.get(id).kind {
        StmtKind::FnSig { args, ret, .. } => (args.clone(), *ret),
        _ => unreachable!("visit_fnsig on non-fnsig"),
    };
    sema.disabled_mangling = true;
    for slot in &mut args {
        if !visit_child(cx, sema, slot)? {
            sema.disabled_mangling = false;
            return Err(cx.err(id, "failed to determine type of argument"));
        }
    }
    let ret_ok = visit_child(cx, sema, &mut ret)?;
    sema.disabled_mangling = false;
    if !ret_ok {
        return Err(cx.err(id, "failed to determine type of return type"));
    }
    if let StmtKind::FnSig { args: aslot, ret: rslot, .. } = &mut cx.stmts.get_mut(id).kind {
        *aslot = args.clone();
        *rslot = ret;
    }

    let mut argst = Vec::with_capacity(args.len());
    let mut arg_comptime = Vec::with_capacity(args.len());
    for &a in &args {
        argst.push(require_ty(cx, a)?);
        arg_comptime.push(cx.stmts.get(a).is_comptime());
    }
    let retty = require_ty(cx, ret)?;
    let fnty = cx.types.mk_func(None, argst, arg_comptime, retty, None, IntrinType::None, false);
    cx.types.as_func_mut(fnty).unwrap().sig = Some(id);
    let v = cx.values.alloc(Value {
        ty: fnty,
        has_data: ContainsData::True,
        kind: ValueKind::Func,
    });
    cx.set_stmt_value(id, v);
    // latches `templates_disabled` when the signature is fully concrete
    ast::requires_template_init(cx, id);
    Ok(Outcome::Keep)
}

fn visit_fndef(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let (mut sig, blk, parent_var) = match &cx.stmts.get(id).kind {
        StmtKind::FnDef {
            sig, blk, parent_var, ..
        } => (*sig, *blk, *parent_var),
        _ => unreachable!("visit_fndef on non-fndef"),
    };

    sema.push_func();
    let res = (|| -> SemResult<()> {
        if !visit_child(cx, sema, &mut sig)? {
            return Err(cx.err(id, "failed to determine type of func signature"));
        }
        let sigty = require_ty(cx, sig)?;
        cx.types.as_func_mut(sigty).unwrap().var = parent_var;
        sema.scopes.set_top_func_ty(sigty);

        if let Some(pv) = parent_var {
            let pname = match &cx.stmts.get(pv).kind {
                StmtKind::Var { name, .. } => name.str_data().to_owned(),
                _ => unreachable!(),
            };
            let sig_vid = cx.stmts.get(sig).value_id;
            sema.scopes.add_var(&pname, sig_vid, Some(pv), false);
        }

        if !ast::requires_template_init(cx, id)
            && let Some(mut blk) = blk
        {
            let ret = cx.types.as_func(sigty).unwrap().ret;
            let loc = cx.stmts.loc(id);
            let dv = types::to_default_value(cx, ret, loc, ContainsData::False, 0)?;
            cx.set_stmt_value(blk, dv);
            if !visit_child(cx, sema, &mut blk)? {
                return Err(cx.err(id, "failed to determine type of function block"));
            }
        }
        Ok(())
    })();
    sema.pop_func();
    res?;

    if let StmtKind::FnDef { sig: s, .. } = &mut cx.stmts.get_mut(id).kind {
        *s = sig;
    }
    cx.share_stmt_value(id, sig);
    Ok(Outcome::Keep)
}

fn visit_extern(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let (mut headers, mut libs, entity) = match &cx.stmts.get(id).kind {
        StmtKind::Extern {
            headers, libs, entity, ..
        } => (*headers, *libs, *entity),
        _ => unreachable!("visit_extern on non-extern"),
    };
    if let Some(slot) = &mut headers
        && !visit_child(cx, sema, slot)?
    {
        return Err(cx.err(id, "failed to assign header type"));
    }
    if let Some(slot) = &mut libs
        && !visit_child(cx, sema, slot)?
    {
        return Err(cx.err(id, "failed to assign lib type"));
    }
    let Some(mut entity) = entity else {
        return Ok(Outcome::Keep);
    };
    sema.scopes.push_layer();
    if let StmtKind::Struct { externed, .. } = &mut cx.stmts.get_mut(entity).kind {
        *externed = true;
    }
    let kept = visit_child(cx, sema, &mut entity);
    sema.scopes.pop_layer();
    if !kept? {
        return Err(cx.err(id, "failed to determine type of extern entity"));
    }
    if let StmtKind::Extern { entity: eslot, .. } = &mut cx.stmts.get_mut(id).kind {
        *eslot = Some(entity);
    }
    if cx.stmts.get(entity).is_fnsig()
        && let Some(fnty) = cx.stmt_value_ty(entity, false)
        && let Some(f) = cx.types.as_func_mut(fnty)
    {
        f.externed = true;
        f.uniq_id = 0;
        let pv = match &cx.stmts.get(id).kind {
            StmtKind::Extern { parent_var, .. } => *parent_var,
            _ => None,
        };
        cx.types.as_func_mut(fnty).unwrap().var = pv;
    }
    cx.share_stmt_value(id, entity);
    Ok(Outcome::Keep)
}

/// Enums lower to comptime i32 constants behind a private namespace; the
/// constants themselves are appended to the module top as additional vars.
fn visit_enum(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let items = match &cx.stmts.get(id).kind {
        StmtKind::Enum { items } => items.clone(),
        _ => unreachable!("visit_enum on non-enum"),
    };
    let loc = cx.stmts.loc(id);
    let enum_ns = format!("enum_{}", sema.enum_count);
    sema.enum_count += 1;

    for (i, item) in items.iter().enumerate() {
        let mangled = format!("{}_{enum_ns}", item.str_data());
        let ity = cx.types.mk_int(32, true);
        let vid = cx.values.create_id(Value {
            ty: ity,
            has_data: ContainsData::Perma,
            kind: ValueKind::Int(i as i64),
        });
        let val = cx.stmts.alloc(
            loc,
            StmtKind::Simple {
                lex: Lexeme::with_int(loc, i as i64),
                decl: None,
                self_of: None,
                applied_module_id: false,
            },
        );
        cx.stmts.get_mut(val).value_id = vid;
        let mut name = item.clone();
        name.set_str_data(mangled.clone());
        let var = cx.stmts.alloc(
            loc,
            StmtKind::Var {
                name,
                vtype: None,
                vval: Some(val),
                applied_module_id: true,
            },
        );
        cx.stmts.get_mut(var).mask |= StmtMask::COMPTIME;
        cx.stmts.get_mut(var).value_id = vid;
        sema.additional_vars.push(var);
        if !sema.scopes.add_var(&mangled, vid, Some(var), false) {
            return Err(cx.err_loc(item.loc, format!("duplicate enum item: {}", item.str_data())));
        }
    }

    let ns_ty = cx.types.mk_str();
    let ns = cx.values.alloc(Value {
        ty: ns_ty,
        has_data: ContainsData::True,
        kind: ValueKind::Namespace(enum_ns),
    });
    cx.set_stmt_value(id, ns);
    Ok(Outcome::Keep)
}

fn visit_struct(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let (mut fields, template_lexes, externed) = match &cx.stmts.get(id).kind {
        StmtKind::Struct {
            fields,
            templates,
            externed,
        } => (fields.clone(), templates.clone(), *externed),
        _ => unreachable!("visit_struct on non-struct"),
    };

    sema.scopes.push_layer();
    sema.disabled_mangling = true;
    let res = (|| -> SemResult<()> {
        let mut templates = Vec::with_capacity(template_lexes.len());
        let mut template_names = Vec::with_capacity(template_lexes.len());
        for t in &template_lexes {
            let hole = cx.types.mk_typety();
            templates.push(hole);
            template_names.push(t.str_data().to_owned());
            let vid = cx.values.create_id(Value {
                ty: hole,
                has_data: ContainsData::Perma,
                kind: ValueKind::Type,
            });
            sema.scopes.add_var(t.str_data(), vid, None, false);
        }

        let base_id = cx.types.gen_base_id();
        let has_template = !templates.is_empty();
        let st = cx.types.mk_struct(types::StructTy {
            base_id,
            field_names: Vec::new(),
            fields: Vec::new(),
            template_names,
            templates,
            has_template,
            externed,
        });
        set_type_value(cx, id, st);
        let self_vid = cx.stmts.get(id).value_id;
        sema.scopes.add_var("Self", self_vid, None, false);

        for slot in &mut fields {
            if !visit_child(cx, sema, slot)? {
                return Err(cx.err(id, "failed to determine type of struct field"));
            }
            let fname = match &cx.stmts.get(*slot).kind {
                StmtKind::Var { name, .. } => name.str_data().to_owned(),
                _ => unreachable!(),
            };
            let fty = require_ty(cx, *slot)?;
            let stm = cx.types.as_struct_mut(st).unwrap();
            stm.field_names.push(fname);
            stm.fields.push(fty);
        }
        if let StmtKind::Struct { fields: fslot, .. } = &mut cx.stmts.get_mut(id).kind {
            *fslot = fields.clone();
        }
        Ok(())
    })();
    sema.disabled_mangling = false;
    sema.scopes.pop_layer();
    res?;
    Ok(Outcome::Keep)
}

fn visit_vardecl(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let mut decls = match &cx.stmts.get(id).kind {
        StmtKind::VarDecl { decls } => decls.clone(),
        _ => unreachable!("visit_vardecl on non-vardecl"),
    };
    for slot in &mut decls {
        if !visit_child(cx, sema, slot)? {
            return Err(cx.err(id, "failed to determine type of this variable declaration"));
        }
    }
    if let StmtKind::VarDecl { decls: dslot } = &mut cx.stmts.get_mut(id).kind {
        *dslot = decls;
    }
    Ok(Outcome::Keep)
}

// ----------------------------------------------------------------------
// control flow
// ----------------------------------------------------------------------

fn visit_cond(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let (conds, is_inline) = match &cx.stmts.get(id).kind {
        StmtKind::Cond { conds, is_inline } => (conds.clone(), *is_inline),
        _ => unreachable!("visit_cond on non-cond"),
    };
    let mut new_conds = Vec::with_capacity(conds.len());
    for mut c in conds {
        if let Some(slot) = &mut c.cond {
            if !visit_child(cx, sema, slot)? {
                return Err(cx.err(id, "failed to determine type of conditional"));
            }
            let cty = require_ty(cx, *slot)?;
            if !cx.types.is_primitive(cty) {
                return Err(cx.err(id, "conditional expression type must be primitive"));
            }
        }
        if !is_inline {
            let mut blk = c.blk;
            if !visit_child(cx, sema, &mut blk)? {
                return Err(cx.err(id, "failed to determine type in conditional block"));
            }
            c.blk = blk;
            new_conds.push(c);
            continue;
        }

        // inline: evaluate the condition now; splice the first true branch
        let chosen = match &mut c.cond {
            None => true,
            Some(slot) => {
                if valueassign::visit_slot(cx, sema, slot).is_err() {
                    return Err(cx.err(id, "failed to get condition value for inline conditional"));
                }
                let Some(cv) = cx.stmt_value_ref(*slot, false) else {
                    return Err(cx.err(id, "inline condition received no value"));
                };
                if !cx.values.has_data(cv) {
                    return Err(cx.err(id, "inline condition received no value"));
                }
                cx.values.is_truthy(cv)
            }
        };
        if !chosen {
            new_conds.push(c);
            continue;
        }
        // no scoping layer when the chosen block splices at module top
        if sema.scopes.is_top()
            && let StmtKind::Block { layering_disabled, .. } = &mut cx.stmts.get_mut(c.blk).kind
        {
            *layering_disabled = true;
        }
        let mut blk = c.blk;
        if !visit_child(cx, sema, &mut blk)? {
            return Err(cx.err(id, "failed to determine types in inline conditional block"));
        }
        // only the block's own cached value resets; the spliced statements
        // keep their comptime data
        if let Some(v) = cx.stmt_value_ref(blk, true) {
            cx.values.clear_has_data(v);
        }
        return Ok(Outcome::Replace(blk));
    }
    if is_inline {
        // no branch matched: the whole conditional disappears
        return Ok(Outcome::Drop);
    }
    if let StmtKind::Cond { conds: cslot, .. } = &mut cx.stmts.get_mut(id).kind {
        *cslot = new_conds;
    }
    Ok(Outcome::Keep)
}

fn visit_for(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    let (mut init, mut cond, mut incr, blk, is_inline) = match &cx.stmts.get(id).kind {
        StmtKind::For {
            init,
            cond,
            incr,
            blk,
            is_inline,
        } => (*init, *cond, *incr, *blk, *is_inline),
        _ => unreachable!("visit_for on non-for"),
    };
    if is_inline && cond.is_none() {
        return Err(cx.err(id, "inline for-loop requires a condition"));
    }

    sema.scopes.push_layer();
    let res = (|| -> SemResult<()> {
        if let Some(slot) = &mut init
            && !visit_child(cx, sema, slot)?
        {
            return Err(cx.err(id, "failed to determine type of init expression in for loop"));
        }
        if let Some(slot) = &mut cond
            && !visit_child(cx, sema, slot)?
        {
            return Err(cx.err(id, "failed to determine type of cond expression in for loop"));
        }
        if let Some(slot) = &mut incr
            && !visit_child(cx, sema, slot)?
        {
            return Err(cx.err(id, "failed to determine type of incr expression in for loop"));
        }
        if let Some(c) = cond {
            let cty = require_ty(cx, c)?;
            if !cx.types.is_primitive(cty) {
                return Err(cx.err(id, "for-loop's condition must be a primitive (int/flt)"));
            }
        }
        Ok(())
    })();
    if let Err(e) = res {
        sema.scopes.pop_layer();
        return Err(e);
    }
    if let StmtKind::For {
        init: islot,
        cond: cslot,
        incr: inslot,
        ..
    } = &mut cx.stmts.get_mut(id).kind
    {
        *islot = init;
        *cslot = cond;
        *inslot = incr;
    }

    if !is_inline {
        let mut blk = blk;
        let kept = visit_child(cx, sema, &mut blk);
        sema.scopes.pop_layer();
        if !kept? {
            return Err(cx.err(id, "failed to determine type of for-loop block"));
        }
        if let StmtKind::For { blk: bslot, .. } = &mut cx.stmts.get_mut(id).kind {
            *bslot = blk;
        }
        return Ok(Outcome::Keep);
    }

    // inline: unroll by repeated comptime evaluation of the condition
    let res = (|| -> SemResult<Vec<StmtId>> {
        let mut new_stmts = Vec::new();
        if let Some(slot) = &mut init
            && valueassign::visit_slot(cx, sema, slot).is_err()
        {
            return Err(cx.err(id, "failed to determine value of inline for-loop init expr"));
        }
        let cond_slot = cond.as_mut().unwrap();
        if valueassign::visit_slot(cx, sema, cond_slot).is_err() {
            return Err(cx.err(
                id,
                "failed to determine value of inline for-loop condition; ensure relevant variables are comptime",
            ));
        }
        if let Some(i) = init {
            let c = cx.stmts.clone_deep(i);
            new_stmts.push(c);
        }
        loop {
            let Some(cv) = cx.stmt_value_ref(*cond_slot, false) else {
                break;
            };
            if !cx.values.is_truthy(cv) {
                break;
            }
            let body_stmts = match &cx.stmts.get(blk).kind {
                StmtKind::Block { stmts, .. } => stmts.clone(),
                _ => unreachable!(),
            };
            for s in body_stmts {
                let c = cx.stmts.clone_deep(s);
                new_stmts.push(c);
            }
            if let Some(inc) = incr {
                let c = cx.stmts.clone_deep(inc);
                new_stmts.push(c);
            }
            // re-evaluation recomputes through the resolved callees; the
            // operand values must survive between iterations
            if let Some(slot) = &mut incr
                && valueassign::visit_slot(cx, sema, slot).is_err()
            {
                return Err(cx.err(id, "failed to determine value of inline for-loop incr"));
            }
            if valueassign::visit_slot(cx, sema, cond_slot).is_err() {
                return Err(cx.err(id, "failed to determine value of inline for-loop condition"));
            }
        }
        Ok(new_stmts)
    })();
    sema.scopes.pop_layer();
    let new_stmts = res?;

    if let StmtKind::Block { stmts, .. } = &mut cx.stmts.get_mut(blk).kind {
        *stmts = new_stmts;
    }
    let mut slot = blk;
    if !visit_child(cx, sema, &mut slot)? {
        return Err(cx.err(id, "failed to determine type of inlined for-loop block"));
    }
    if let Some(v) = cx.stmt_value_ref(slot, true) {
        cx.values.clear_has_data(v);
    }
    Ok(Outcome::Replace(slot))
}

fn visit_ret(cx: &mut Context, sema: &mut Sema, id: StmtId) -> SemResult<Outcome> {
    if !sema.scopes.has_func() {
        return Err(cx.err(id, "return statements can be in functions only"));
    }
    let mut val = match &cx.stmts.get(id).kind {
        StmtKind::Ret { val, .. } => *val,
        _ => unreachable!("visit_ret on non-ret"),
    };
    if let Some(slot) = &mut val {
        if !visit_child(cx, sema, slot)? {
            return Err(cx.err(id, "failed to determine type of the return argument"));
        }
        if let StmtKind::Ret { val: vslot, .. } = &mut cx.stmts.get_mut(id).kind {
            *vslot = Some(*slot);
        }
    }

    let Some(fnty) = sema.scopes.top_func_ty() else {
        return Err(cx.err(id, "function type has no declaration"));
    };
    let f = cx.types.as_func(fnty).unwrap().clone();
    let fnblk = f.var.and_then(|var| match &cx.stmts.get(var).kind {
        StmtKind::Var { vval: Some(v), .. } => match &cx.stmts.get(*v).kind {
            StmtKind::FnDef { blk, .. } => *blk,
            _ => None,
        },
        _ => None,
    });

    let valtype = match val {
        Some(v) => {
            let t = require_ty(cx, v)?;
            cx.types.specialize(t)
        }
        None => cx.types.mk_void(),
    };
    let mut was_any = false;
    if cx.types.is_any(f.ret) {
        let newr = cx.types.specialize(valtype);
        cx.types.as_func_mut(fnty).unwrap().ret = newr;
        if let Some(blk) = fnblk {
            let loc = cx.stmts.loc(id);
            let dv = types::to_default_value(cx, newr, loc, ContainsData::False, 0)?;
            if cx.stmts.get(blk).value_id != ValueId::NONE {
                cx.rebind_stmt_value(blk, dv);
            } else {
                cx.set_stmt_value(blk, dv);
            }
        }
        if let (Some(v), Some(sig)) = (val, f.sig) {
            let ret_stmt = match &cx.stmts.get(sig).kind {
                StmtKind::FnSig { ret, .. } => *ret,
                _ => unreachable!(),
            };
            let mask = cx.stmts.get(v).mask;
            cx.stmts.get_mut(ret_stmt).mask |= mask;
        }
        was_any = true;
    }
    let fnretty = cx.types.as_func(fnty).unwrap().ret;
    if let (Some(_), Some(sig)) = (val, f.sig) {
        let ret_stmt = match &cx.stmts.get(sig).kind {
            StmtKind::FnSig { ret, .. } => *ret,
            _ => unreachable!(),
        };
        let mask = cx.stmts.get(ret_stmt).mask;
        cx.stmts.get_mut(id).mask |= mask;
    }
    let loc = cx.stmts.loc(id);
    if !was_any && !types::is_compatible(cx, fnretty, valtype, loc) {
        let (fs, vs) = (cx.types.to_str(fnretty), cx.types.to_str(valtype));
        return Err(cx.err(
            id,
            format!("function return type '{fs}' and deduced return type '{vs}' are incompatible"),
        ));
    }
    if let Some(blk) = fnblk {
        if let StmtKind::Ret { fn_blk, .. } = &mut cx.stmts.get_mut(id).kind {
            *fn_blk = Some(blk);
        }
        cx.share_stmt_value(id, blk);
    }
    if let Some(v) = val
        && cx.stmts.get(v).cast_to.is_none()
        && cx.types.requires_cast(fnretty, valtype)
    {
        let mask = f.sig.map_or(StmtMask::empty(), |sig| {
            let ret_stmt = match &cx.stmts.get(sig).kind {
                StmtKind::FnSig { ret, .. } => *ret,
                _ => unreachable!(),
            };
            cx.stmts.get(ret_stmt).mask
        });
        cx.stmts.get_mut(v).cast_to(fnretty, mask);
    }
    Ok(Outcome::Keep)
}

// ----------------------------------------------------------------------
// template instantiation
// ----------------------------------------------------------------------

/// Specializes the body of a template function for one call site.
///
/// The original declaration stays untouched; a deep clone gets concrete
/// parameter bindings (by reference where declared so), its trailing
/// variadic expanded into `name__0..n`, and its body re-typed inside a
/// fresh function frame. The finished clone joins `additional_vars` for the
/// module top. In-flight instantiations are deduplicated by
/// `(name, non-uniq-id)` so recursive templates terminate.
fn init_template_func(
    cx: &mut Context,
    sema: &mut Sema,
    caller: StmtId,
    fnty: &mut TypeId,
    args: &mut Vec<StmtId>,
) -> SemResult<()> {
    let f = cx.types.as_func(*fnty).unwrap().clone();
    let Some(orig_var) = f.var else {
        return Ok(());
    };
    let orig_vval = match &cx.stmts.get(orig_var).kind {
        StmtKind::Var { vval: Some(v), .. } => *v,
        _ => return Ok(()),
    };
    if !ast::requires_template_init(cx, orig_vval) {
        if cx.stmts.get(orig_vval).is_fndef() {
            ast::inc_used(cx, orig_vval);
        }
        return Ok(());
    }

    let var_name = match &cx.stmts.get(orig_var).kind {
        StmtKind::Var { name, .. } => name.str_data().to_owned(),
        _ => unreachable!(),
    };
    let uniqname = format!("{var_name}{}", cx.types.non_uniq_id(*fnty));
    if let Some(&in_flight) = sema.being_templated.get(&uniqname) {
        if let Some(t) = cx.stmt_value_ty(in_flight, false) {
            *fnty = t;
        }
        return Ok(());
    }

    cx.trace(|| format!("instantiating template function '{var_name}'"));
    let cfvar = cx.stmts.clone_deep(orig_var);
    cx.types.as_func_mut(*fnty).unwrap().var = Some(cfvar);
    let cfval = match &cx.stmts.get(cfvar).kind {
        StmtKind::Var { vval: Some(v), .. } => *v,
        _ => unreachable!("template var lost its value"),
    };
    let (cfsig, cfblk) = if cx.stmts.get(cfval).is_fndef() {
        if let StmtKind::FnDef { parent_var, .. } = &mut cx.stmts.get_mut(cfval).kind {
            *parent_var = Some(cfvar);
        }
        ast::inc_used(cx, cfval);
        match &cx.stmts.get(cfval).kind {
            StmtKind::FnDef { sig, blk, .. } => (*sig, *blk),
            _ => unreachable!(),
        }
    } else if cx.stmts.get(cfval).is_extern() {
        if let StmtKind::Extern { parent_var, .. } = &mut cx.stmts.get_mut(cfval).kind {
            *parent_var = Some(cfvar);
        }
        match &cx.stmts.get(cfval).kind {
            StmtKind::Extern { entity: Some(e), .. } => (*e, None),
            _ => return Err(cx.err(caller, "extern specialization has no signature")),
        }
    } else {
        return Ok(());
    };
    if let StmtKind::FnSig {
        templates_disabled,
        has_variadic,
        ..
    } = &mut cx.stmts.get_mut(cfsig).kind
    {
        *templates_disabled = true;
        *has_variadic = false;
    }
    cx.types.as_func_mut(*fnty).unwrap().sig = Some(cfsig);

    sema.push_func();
    let res = (|| -> SemResult<(bool, usize)> {
        let mut is_va = false;
        let mut va_count = 0usize;
        let fn_args = cx.types.as_func(*fnty).unwrap().args.clone();
        let no_va_arg =
            fn_args.last().is_some_and(|&a| cx.types.is_variadic(a)) && args.len() < fn_args.len();

        let mut i = 0usize;
        while i < args.len() + usize::from(no_va_arg) {
            let sig_args = match &cx.stmts.get(cfsig).kind {
                StmtKind::FnSig { args, .. } => args.clone(),
                _ => unreachable!(),
            };
            let cfa = sig_args[i];
            let cft = cx.types.as_func(*fnty).unwrap().args[i];
            if !cx.types.is_variadic(cft) {
                let argty = require_ty(cx, args[i])?;
                let cftc = if cx.types.is_any(cft) { argty } else { cft };
                let cftc = cx.types.specialize(cftc);
                let argval = require_val(cx, args[i])?;
                if cx.stmts.get(cfa).is_ref() {
                    let rv = cx.values.alloc(Value {
                        ty: cftc,
                        has_data: ContainsData::True,
                        kind: ValueKind::Ref(argval),
                    });
                    cx.set_stmt_value(cfa, rv);
                } else {
                    let cloned = cx.values.clone_obj(argval);
                    cx.values.get_mut(cloned).ty = cftc;
                    cx.set_stmt_value(cfa, cloned);
                }
                if let Some(cast) = cx.stmts.get(args[i]).cast_to {
                    let cmask = cx.stmts.get(args[i]).cast_mask;
                    cx.stmts.get_mut(cfa).cast_to(cast, cmask);
                }
                let cfa_ty = require_ty(cx, cfa)?;
                cx.types.as_func_mut(*fnty).unwrap().args[i] = cfa_ty;
                let cfa_name = match &cx.stmts.get(cfa).kind {
                    StmtKind::Var { name, .. } => name.str_data().to_owned(),
                    _ => unreachable!(),
                };
                let cfa_vid = cx.stmts.get(cfa).value_id;
                sema.scopes.add_var(&cfa_name, cfa_vid, Some(cfa), false);
                i += 1;
                continue;
            }

            // trailing variadic: bind `name` to the pack and each element
            // to `name__k`
            is_va = true;
            let va_name = match &cx.stmts.get(cfa).kind {
                StmtKind::Var { name, .. } => name.str_data().to_owned(),
                _ => unreachable!(),
            };
            if let StmtKind::FnSig { args, .. } = &mut cx.stmts.get_mut(cfsig).kind {
                args.pop();
            }
            cx.types.as_func_mut(*fnty).unwrap().args.pop();
            let vaty = cft;
            let vtmp = cx.values.alloc(Value {
                ty: vaty,
                has_data: ContainsData::False,
                kind: ValueKind::Vec(Vec::new()),
            });
            let vavid = cx.values.register(vtmp);
            sema.scopes.add_var(&va_name, vavid, Some(cfa), false);
            while i < args.len() {
                let argn = format!("{va_name}__{va_count}");
                let newv = cx.stmts.clone_deep(cfa);
                let vtype_id = if let StmtKind::Var { name, vtype, .. } = &mut cx.stmts.get_mut(newv).kind {
                    name.set_str_data(argn.clone());
                    *vtype
                } else {
                    None
                };
                if let Some(t) = vtype_id
                    && let StmtKind::Type { variadic, .. } = &mut cx.stmts.get_mut(t).kind
                {
                    *variadic = false;
                }
                let argty = require_ty(cx, args[i])?;
                let t = cx.types.specialize(argty);
                let argval = require_val(cx, args[i])?;
                if cx.stmts.get(newv).is_ref() {
                    let rv = cx.values.alloc(Value {
                        ty: t,
                        has_data: ContainsData::True,
                        kind: ValueKind::Ref(argval),
                    });
                    cx.set_stmt_value(newv, rv);
                } else {
                    let cloned = cx.values.clone_obj(argval);
                    cx.values.get_mut(cloned).ty = t;
                    cx.set_stmt_value(newv, cloned);
                }
                let elem = cx.stmt_value_ref(newv, true).unwrap();
                if let ValueKind::Vec(elems) = &mut cx.values.get_mut(vtmp).kind {
                    elems.push(elem);
                }
                if let StmtKind::FnSig { args, .. } = &mut cx.stmts.get_mut(cfsig).kind {
                    args.push(newv);
                }
                cx.types.as_func_mut(*fnty).unwrap().args.push(t);
                let vid = cx.stmts.get(newv).value_id;
                sema.scopes.add_var(&argn, vid, Some(newv), false);
                va_count += 1;
                i += 1;
            }
            break;
        }
        Ok((is_va, va_count))
    })();
    let (is_va, va_count) = match res {
        Ok(v) => v,
        Err(e) => {
            sema.pop_func();
            return Err(e);
        }
    };

    let body = (|| -> SemResult<()> {
        let cfn = cx.values.alloc(Value {
            ty: *fnty,
            has_data: ContainsData::True,
            kind: ValueKind::Func,
        });
        let fret = cx.types.as_func(*fnty).unwrap().ret;
        let ret_stmt = match &cx.stmts.get(cfsig).kind {
            StmtKind::FnSig { ret, .. } => *ret,
            _ => unreachable!(),
        };
        set_type_value(cx, ret_stmt, fret);
        cx.set_stmt_value(cfsig, cfn);
        cx.share_stmt_value(cfval, cfsig);
        cx.share_stmt_value(cfvar, cfsig);

        if cx.types.as_func(*fnty).unwrap().externed {
            return Ok(());
        }
        let Some(mut blk) = cfblk else {
            return Err(cx.err(caller, "function definition for specialization has no block"));
        };
        sema.being_templated.insert(uniqname.clone(), cfvar);
        let loc = cx.stmts.loc(caller);
        let dv = types::to_default_value(cx, fret, loc, ContainsData::False, 0)?;
        cx.set_stmt_value(blk, dv);
        sema.update_last_func(*fnty, is_va, va_count);
        let visited = visit_child(cx, sema, &mut blk);
        sema.being_templated.remove(&uniqname);
        if !visited? {
            return Err(cx.err(caller, "failed to assign type for called template function's body"));
        }
        if let StmtKind::FnDef { blk: bslot, .. } = &mut cx.stmts.get_mut(cfval).kind {
            *bslot = Some(blk);
        }
        // the return type may have been rewritten by `return` on `any`
        let fret = cx.types.as_func(*fnty).unwrap().ret;
        if let Some(v) = cx.stmt_value_ref(ret_stmt, true) {
            cx.values.get_mut(v).ty = fret;
        }
        Ok(())
    })();
    sema.pop_func();
    body?;

    sema.additional_vars.push(cfvar);
    Ok(())
}
