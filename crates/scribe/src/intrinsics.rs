//! Builtin functions.
//!
//! Each intrinsic is a tagged variant dispatched either at type-assignment
//! time (`Parse`, may rewrite the tree) or during comptime evaluation
//! (`Value`). The primitive operator grid for ints and floats, plus pointer
//! assignment, is seeded into the per-type function tables so operator
//! expressions dispatch exactly like user member functions.

use crate::{
    ast::{StmtId, StmtMask},
    context::Context,
    diag::SemResult,
    module,
    scope::ScopeStack,
    types::{self, TypeId, TypeInfo, TPTR},
    typeassign::{Outcome, Sema},
    values::{ContainsData, Value, ValueKind, ValueRef},
};

/// When an intrinsic's handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum IntrinType {
    #[default]
    None,
    /// During type assignment; may rewrite the call site.
    Parse,
    /// During value assignment (comptime evaluation).
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intrinsic {
    Import,
    IsMainSrc,
    IsPrimitive,
    IsPrimitiveOrPtr,
    IsCString,
    IsCChar,
    IsEqualTy,
    As,
    TypeOf,
    Ptr,
    SizeOf,
    VaLen,
    GetOsId,
    SysPathMax,
    CompileError,
    SetMaxErrs,
    Array,
    AssnPtr,
    // int primitives
    AssnInt,
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    ModInt,
    BAndInt,
    BOrInt,
    BXorInt,
    LShiftInt,
    RShiftInt,
    AddAssnInt,
    SubAssnInt,
    MulAssnInt,
    DivAssnInt,
    ModAssnInt,
    BAndAssnInt,
    BOrAssnInt,
    BXorAssnInt,
    LShiftAssnInt,
    RShiftAssnInt,
    LogAndInt,
    LogOrInt,
    EqInt,
    LtInt,
    GtInt,
    LeInt,
    GeInt,
    NeInt,
    UAddInt,
    USubInt,
    LogNotInt,
    BNotInt,
    IncXInt,
    DecXInt,
    XIncInt,
    XDecInt,
    // float primitives
    AssnFlt,
    AddFlt,
    SubFlt,
    MulFlt,
    DivFlt,
    AddAssnFlt,
    SubAssnFlt,
    MulAssnFlt,
    DivAssnFlt,
    LogAndFlt,
    LogOrFlt,
    EqFlt,
    LtFlt,
    GtFlt,
    LeFlt,
    GeFlt,
    NeFlt,
    UAddFlt,
    USubFlt,
    LogNotFlt,
}

// ----------------------------------------------------------------------
// dispatch
// ----------------------------------------------------------------------

pub(crate) fn call_intrinsic(
    which: Intrinsic,
    cx: &mut Context,
    sema: &mut Sema,
    stmt: StmtId,
    out: &mut Outcome,
    args: &[StmtId],
) -> SemResult<()> {
    use Intrinsic::*;
    match which {
        Import => import(cx, sema, stmt, args),
        IsMainSrc => {
            let is_main = cx.modules.is_main(cx.stmts.loc(stmt).module);
            set_bool(cx, stmt, is_main, ContainsData::True)
        }
        IsPrimitive => {
            let res = arg_ty(cx, stmt, args, 0).map(|t| cx.types.is_primitive(t))?;
            set_bool(cx, stmt, res, ContainsData::Perma)
        }
        IsPrimitiveOrPtr => {
            let res = arg_ty(cx, stmt, args, 0).map(|t| cx.types.is_primitive_or_ptr(t))?;
            set_bool(cx, stmt, res, ContainsData::Perma)
        }
        IsCString => {
            let res = match cx.stmt_value_ref(args[0], false) {
                Some(v) => cx.values.has_data(v) && cx.values.is_str_literal(&cx.types, v),
                None => false,
            };
            set_bool(cx, stmt, res, ContainsData::Perma)
        }
        IsCChar => {
            let t = arg_ty(cx, stmt, args, 0)?;
            let res = cx.types.is_int(t) && cx.types.int_bits(t) == 8 && cx.types.int_signed(t);
            set_bool(cx, stmt, res, ContainsData::Perma)
        }
        IsEqualTy => {
            let a = arg_ty(cx, stmt, args, 0)?;
            let b = arg_ty(cx, stmt, args, 1)?;
            let res = cx.types.id(a) == cx.types.id(b);
            set_bool(cx, stmt, res, ContainsData::Perma)
        }
        As => {
            let target = arg_contained_ty(cx, stmt, args, 0)?;
            cx.stmts.get_mut(args[1]).cast_to(target, StmtMask::empty());
            *out = Outcome::Replace(args[1]);
            Ok(())
        }
        TypeOf => {
            let t = arg_ty(cx, stmt, args, 0)?;
            let v = cx.values.alloc(Value {
                ty: t,
                has_data: ContainsData::Perma,
                kind: ValueKind::Type,
            });
            cx.set_stmt_value(stmt, v);
            Ok(())
        }
        Ptr => {
            let t = arg_contained_ty(cx, stmt, args, 0)?;
            let cloned = cx.types.clone_ty(t, false, 0);
            let pty = cx.types.mk_ptr(cloned, 0, false);
            let v = cx.values.alloc(Value {
                ty: pty,
                has_data: ContainsData::Perma,
                kind: ValueKind::Type,
            });
            cx.set_stmt_value(stmt, v);
            Ok(())
        }
        SizeOf => {
            let t = arg_ty(cx, stmt, args, 0)?;
            let sz = size_of(cx, t);
            if sz == 0 {
                return Err(cx.err(args[0], "invalid type info, received size 0"));
            }
            let ity = cx.types.mk_int(64, false);
            let v = cx.values.alloc(Value {
                ty: ity,
                has_data: ContainsData::Perma,
                kind: ValueKind::Int(sz as i64),
            });
            update_stmt(cx, stmt, v)
        }
        VaLen => {
            if let Some(v) = cx.stmt_value_ref(stmt, false)
                && cx.values.has_data(v)
            {
                return Ok(());
            }
            if !sema.is_fn_va() {
                return Err(cx.err(stmt, "this is not a variadic function"));
            }
            let len = sema.fn_va_len();
            let ity = cx.types.mk_int(64, false);
            let v = cx.values.alloc(Value {
                ty: ity,
                has_data: ContainsData::Perma,
                kind: ValueKind::Int(len as i64),
            });
            cx.set_stmt_value(stmt, v);
            Ok(())
        }
        GetOsId => {
            let os = match std::env::consts::OS {
                "linux" => 1,
                "windows" => 2,
                "macos" => 3,
                "android" => 4,
                "freebsd" => 5,
                "netbsd" => 6,
                "openbsd" => 7,
                "dragonfly" => 8,
                _ => 0,
            };
            set_int32(cx, stmt, os)
        }
        SysPathMax => set_int32(cx, stmt, 4096),
        CompileError => {
            let mut msg = String::new();
            for &a in args {
                let Some(v) = cx.stmt_value_ref(a, false) else {
                    continue;
                };
                if cx.values.has_data(v) && cx.values.is_str_literal(&cx.types, v) {
                    msg.push_str(&cx.values.vec_as_string(v).unwrap_or_default());
                } else {
                    msg.push_str(&cx.values.display(&cx.types, v));
                }
            }
            Err(cx.err(stmt, msg))
        }
        SetMaxErrs => {
            let n = arg_int(cx, stmt, args, 0)?;
            cx.diags.set_max_errors(n.max(1) as usize);
            let v = cx.values.alloc(Value {
                ty: cx.types.mk_void(),
                has_data: ContainsData::True,
                kind: ValueKind::Void,
            });
            cx.set_stmt_value(stmt, v);
            Ok(())
        }
        Array => array(cx, stmt, args),
        AssnPtr => {
            let dst = arg_val(cx, stmt, args, 0)?;
            let src = arg_val(cx, stmt, args, 1)?;
            cx.values.update_obj(&cx.types, dst, src);
            let dst = arg_val(cx, stmt, args, 0)?;
            update_stmt(cx, stmt, dst)
        }
        // arithmetic over ints
        AssnInt | AssnFlt => {
            let dst = arg_val(cx, stmt, args, 0)?;
            let src = arg_val(cx, stmt, args, 1)?;
            cx.values.update_obj(&cx.types, dst, src);
            let dst = arg_val(cx, stmt, args, 0)?;
            update_stmt(cx, stmt, dst)
        }
        AddInt => int_binop(cx, stmt, args, |a, b| Ok(a.wrapping_add(b))),
        SubInt => int_binop(cx, stmt, args, |a, b| Ok(a.wrapping_sub(b))),
        MulInt => int_binop(cx, stmt, args, |a, b| Ok(a.wrapping_mul(b))),
        DivInt => int_binop(cx, stmt, args, checked_div),
        ModInt => int_binop(cx, stmt, args, checked_rem),
        BAndInt => int_binop(cx, stmt, args, |a, b| Ok(a & b)),
        BOrInt => int_binop(cx, stmt, args, |a, b| Ok(a | b)),
        BXorInt => int_binop(cx, stmt, args, |a, b| Ok(a ^ b)),
        LShiftInt => int_binop(cx, stmt, args, |a, b| Ok(a.wrapping_shl(b as u32))),
        RShiftInt => int_binop(cx, stmt, args, |a, b| Ok(a.wrapping_shr(b as u32))),
        AddAssnInt => int_assnop(cx, stmt, args, |a, b| Ok(a.wrapping_add(b))),
        SubAssnInt => int_assnop(cx, stmt, args, |a, b| Ok(a.wrapping_sub(b))),
        MulAssnInt => int_assnop(cx, stmt, args, |a, b| Ok(a.wrapping_mul(b))),
        DivAssnInt => int_assnop(cx, stmt, args, checked_div),
        ModAssnInt => int_assnop(cx, stmt, args, checked_rem),
        BAndAssnInt => int_assnop(cx, stmt, args, |a, b| Ok(a & b)),
        BOrAssnInt => int_assnop(cx, stmt, args, |a, b| Ok(a | b)),
        BXorAssnInt => int_assnop(cx, stmt, args, |a, b| Ok(a ^ b)),
        LShiftAssnInt => int_assnop(cx, stmt, args, |a, b| Ok(a.wrapping_shl(b as u32))),
        RShiftAssnInt => int_assnop(cx, stmt, args, |a, b| Ok(a.wrapping_shr(b as u32))),
        LogAndInt => int_cmpop(cx, stmt, args, |a, b| a != 0 && b != 0),
        LogOrInt => int_cmpop(cx, stmt, args, |a, b| a != 0 || b != 0),
        EqInt => int_cmpop(cx, stmt, args, |a, b| a == b),
        LtInt => int_cmpop(cx, stmt, args, |a, b| a < b),
        GtInt => int_cmpop(cx, stmt, args, |a, b| a > b),
        LeInt => int_cmpop(cx, stmt, args, |a, b| a <= b),
        GeInt => int_cmpop(cx, stmt, args, |a, b| a >= b),
        NeInt => int_cmpop(cx, stmt, args, |a, b| a != b),
        UAddInt => int_unop(cx, stmt, args, |a| a),
        USubInt => int_unop(cx, stmt, args, i64::wrapping_neg),
        LogNotInt => {
            let a = arg_int(cx, stmt, args, 0)?;
            set_bool(cx, stmt, a == 0, ContainsData::True)
        }
        BNotInt => int_unop(cx, stmt, args, |a| !a),
        IncXInt => int_stepop(cx, stmt, args, 1, false),
        DecXInt => int_stepop(cx, stmt, args, -1, false),
        XIncInt => int_stepop(cx, stmt, args, 1, true),
        XDecInt => int_stepop(cx, stmt, args, -1, true),
        // arithmetic over floats
        AddFlt => flt_binop(cx, stmt, args, |a, b| a + b),
        SubFlt => flt_binop(cx, stmt, args, |a, b| a - b),
        MulFlt => flt_binop(cx, stmt, args, |a, b| a * b),
        DivFlt => flt_binop(cx, stmt, args, |a, b| a / b),
        AddAssnFlt => flt_assnop(cx, stmt, args, |a, b| a + b),
        SubAssnFlt => flt_assnop(cx, stmt, args, |a, b| a - b),
        MulAssnFlt => flt_assnop(cx, stmt, args, |a, b| a * b),
        DivAssnFlt => flt_assnop(cx, stmt, args, |a, b| a / b),
        LogAndFlt => flt_cmpop(cx, stmt, args, |a, b| a != 0.0 && b != 0.0),
        LogOrFlt => flt_cmpop(cx, stmt, args, |a, b| a != 0.0 || b != 0.0),
        EqFlt => flt_cmpop(cx, stmt, args, |a, b| a == b),
        LtFlt => flt_cmpop(cx, stmt, args, |a, b| a < b),
        GtFlt => flt_cmpop(cx, stmt, args, |a, b| a > b),
        LeFlt => flt_cmpop(cx, stmt, args, |a, b| a <= b),
        GeFlt => flt_cmpop(cx, stmt, args, |a, b| a >= b),
        NeFlt => flt_cmpop(cx, stmt, args, |a, b| a != b),
        UAddFlt => flt_unop(cx, stmt, args, |a| a),
        USubFlt => flt_unop(cx, stmt, args, |a| -a),
        LogNotFlt => {
            let a = arg_flt(cx, stmt, args, 0)?;
            set_bool(cx, stmt, a == 0.0, ContainsData::True)
        }
    }
}

// ----------------------------------------------------------------------
// handlers
// ----------------------------------------------------------------------

fn import(cx: &mut Context, sema: &mut Sema, stmt: StmtId, args: &[StmtId]) -> SemResult<()> {
    let v = arg_val(cx, stmt, args, 0)?;
    if !cx.values.has_data(v) || !cx.values.is_str_literal(&cx.types, v) {
        return Err(cx.err(stmt, "import must be a compile time computable string"));
    }
    let Some(modname) = cx.values.vec_as_string(v) else {
        return Err(cx.err(stmt, "invalid comptime value for module string"));
    };
    if modname.is_empty() {
        return Err(cx.err(stmt, "invalid comptime value for module string"));
    }
    let from = cx.stmts.loc(stmt).module;
    let Some(path) = module::resolve_import(cx, from, &modname) else {
        return Err(cx.err(stmt, format!("import file '{modname}' does not exist")));
    };
    let mod_id = match cx.modules.find(&path) {
        Some(existing) => existing,
        None => module::parse_module(cx, sema, &path, false).map_err(|_| {
            cx.err(stmt, format!("failed to parse source: {path}"));
            crate::diag::Halted
        })?,
    };
    let ns_ty = cx.types.mk_str();
    let v = cx.values.alloc(Value {
        ty: ns_ty,
        has_data: ContainsData::True,
        kind: ValueKind::Namespace(mod_id.index().to_string()),
    });
    cx.set_stmt_value(stmt, v);
    Ok(())
}

fn array(cx: &mut Context, stmt: StmtId, args: &[StmtId]) -> SemResult<()> {
    let mut resty = arg_contained_ty(cx, stmt, args, 0)?;
    let mut counts = Vec::new();
    for i in 1..args.len() {
        counts.insert(0, arg_int(cx, stmt, args, i)?);
    }
    for count in counts {
        if count <= 0 {
            return Err(cx.err(stmt, "array dimensions must be positive"));
        }
        resty = cx.types.mk_ptr(resty, count as u16, false);
    }
    let loc = cx.stmts.loc(stmt);
    let v = types::to_default_value(cx, resty, loc, ContainsData::Perma, 0)?;
    cx.set_stmt_value(stmt, v);
    Ok(())
}

fn size_of(cx: &Context, ty: TypeId) -> usize {
    if cx.types.is_ptr(ty) {
        return 8;
    }
    if cx.types.is_int(ty) {
        return usize::from(cx.types.int_bits(ty)) / 8;
    }
    if cx.types.is_flt(ty) {
        return usize::from(cx.types.flt_bits(ty)) / 8;
    }
    if let Some(st) = cx.types.as_struct(ty) {
        let mut sz = 0usize;
        let mut biggest = 0usize;
        for &f in &st.fields {
            let fsz = size_of(cx, f);
            if fsz > biggest {
                biggest = fsz;
            }
            sz += fsz;
        }
        if biggest == 0 {
            return 0;
        }
        while sz % biggest != 0 {
            sz += 1;
        }
        return sz;
    }
    0
}

// ----------------------------------------------------------------------
// shared argument plumbing
// ----------------------------------------------------------------------

fn arg_val(cx: &mut Context, stmt: StmtId, args: &[StmtId], i: usize) -> SemResult<ValueRef> {
    match args.get(i).and_then(|&a| cx.stmt_value_ref(a, false)) {
        Some(v) => Ok(v),
        None => Err(cx.err(stmt, format!("intrinsic argument {i} has no value"))),
    }
}

fn arg_ty(cx: &mut Context, stmt: StmtId, args: &[StmtId], i: usize) -> SemResult<TypeId> {
    match args.get(i).and_then(|&a| cx.stmt_value_ty(a, false)) {
        Some(t) => Ok(t),
        None => Err(cx.err(stmt, format!("intrinsic argument {i} has no type"))),
    }
}

/// Argument `i` must be a metatype value; yields the type it names.
fn arg_contained_ty(cx: &mut Context, stmt: StmtId, args: &[StmtId], i: usize) -> SemResult<TypeId> {
    let v = arg_val(cx, stmt, args, i)?;
    if !cx.values.is_type(v) {
        return Err(cx.err(stmt, format!("intrinsic argument {i} must be a type")));
    }
    let ty = cx.values.ty(v);
    Ok(cx.types.contained(ty).unwrap_or(ty))
}

/// An integer operand; a float value behind an integer cast converts.
fn arg_int(cx: &mut Context, stmt: StmtId, args: &[StmtId], i: usize) -> SemResult<i64> {
    let v = arg_val(cx, stmt, args, i)?;
    match cx.values.get(v).kind {
        ValueKind::Int(n) => Ok(n),
        ValueKind::Flt(f)
            if args
                .get(i)
                .and_then(|&a| cx.stmt_value_ty(a, false))
                .is_some_and(|t| cx.types.is_int(t)) =>
        {
            Ok(f as i64)
        }
        _ => Err(cx.err(stmt, format!("intrinsic argument {i} must be an integer"))),
    }
}

/// A float operand; an integer value behind a float cast converts.
fn arg_flt(cx: &mut Context, stmt: StmtId, args: &[StmtId], i: usize) -> SemResult<f64> {
    let v = arg_val(cx, stmt, args, i)?;
    match cx.values.get(v).kind {
        ValueKind::Flt(f) => Ok(f),
        ValueKind::Int(n)
            if args
                .get(i)
                .and_then(|&a| cx.stmt_value_ty(a, false))
                .is_some_and(|t| cx.types.is_flt(t)) =>
        {
            Ok(n as f64)
        }
        _ => Err(cx.err(stmt, format!("intrinsic argument {i} must be a float"))),
    }
}

fn update_stmt(cx: &mut Context, stmt: StmtId, v: ValueRef) -> SemResult<()> {
    cx.update_stmt_value(stmt, v);
    Ok(())
}

fn result_ty(cx: &mut Context, stmt: StmtId) -> TypeId {
    cx.stmt_value_ty(stmt, false)
        .unwrap_or_else(|| cx.types.mk_int(32, true))
}

fn set_bool(cx: &mut Context, stmt: StmtId, b: bool, cd: ContainsData) -> SemResult<()> {
    let ity = cx.types.mk_int(1, true);
    let v = cx.values.alloc(Value {
        ty: ity,
        has_data: cd,
        kind: ValueKind::Int(i64::from(b)),
    });
    update_stmt(cx, stmt, v)
}

fn set_int32(cx: &mut Context, stmt: StmtId, n: i64) -> SemResult<()> {
    let ity = cx.types.mk_int(32, true);
    let v = cx.values.alloc(Value {
        ty: ity,
        has_data: ContainsData::Perma,
        kind: ValueKind::Int(n),
    });
    update_stmt(cx, stmt, v)
}

fn checked_div(a: i64, b: i64) -> Result<i64, &'static str> {
    a.checked_div(b).ok_or("division by zero in comptime evaluation")
}

fn checked_rem(a: i64, b: i64) -> Result<i64, &'static str> {
    a.checked_rem(b).ok_or("remainder by zero in comptime evaluation")
}

fn int_binop(
    cx: &mut Context,
    stmt: StmtId,
    args: &[StmtId],
    op: impl Fn(i64, i64) -> Result<i64, &'static str>,
) -> SemResult<()> {
    let a = arg_int(cx, stmt, args, 0)?;
    let b = arg_int(cx, stmt, args, 1)?;
    let res = op(a, b).map_err(|e| cx.err(stmt, e))?;
    let ty = result_ty(cx, stmt);
    let v = cx.values.alloc(Value {
        ty,
        has_data: ContainsData::True,
        kind: ValueKind::Int(res),
    });
    update_stmt(cx, stmt, v)
}

fn int_assnop(
    cx: &mut Context,
    stmt: StmtId,
    args: &[StmtId],
    op: impl Fn(i64, i64) -> Result<i64, &'static str>,
) -> SemResult<()> {
    let a = arg_int(cx, stmt, args, 0)?;
    let b = arg_int(cx, stmt, args, 1)?;
    let res = op(a, b).map_err(|e| cx.err(stmt, e))?;
    let dst = arg_val(cx, stmt, args, 0)?;
    if let ValueKind::Int(i) = &mut cx.values.get_mut(dst).kind {
        *i = res;
    }
    cx.values.set_contains_data(dst);
    let ty = result_ty(cx, stmt);
    let v = cx.values.alloc(Value {
        ty,
        has_data: ContainsData::True,
        kind: ValueKind::Int(res),
    });
    update_stmt(cx, stmt, v)
}

fn int_cmpop(
    cx: &mut Context,
    stmt: StmtId,
    args: &[StmtId],
    op: impl Fn(i64, i64) -> bool,
) -> SemResult<()> {
    let a = arg_int(cx, stmt, args, 0)?;
    let b = arg_int(cx, stmt, args, 1)?;
    set_bool(cx, stmt, op(a, b), ContainsData::True)
}

fn int_unop(cx: &mut Context, stmt: StmtId, args: &[StmtId], op: impl Fn(i64) -> i64) -> SemResult<()> {
    let a = arg_int(cx, stmt, args, 0)?;
    let ty = result_ty(cx, stmt);
    let v = cx.values.alloc(Value {
        ty,
        has_data: ContainsData::True,
        kind: ValueKind::Int(op(a)),
    });
    update_stmt(cx, stmt, v)
}

/// Pre/post increment and decrement: post (`x...`) yields the old value.
fn int_stepop(cx: &mut Context, stmt: StmtId, args: &[StmtId], step: i64, post: bool) -> SemResult<()> {
    let old = arg_int(cx, stmt, args, 0)?;
    let new = old.wrapping_add(step);
    let dst = arg_val(cx, stmt, args, 0)?;
    if let ValueKind::Int(i) = &mut cx.values.get_mut(dst).kind {
        *i = new;
    }
    cx.values.set_contains_data(dst);
    let ty = result_ty(cx, stmt);
    let v = cx.values.alloc(Value {
        ty,
        has_data: ContainsData::True,
        kind: ValueKind::Int(if post { old } else { new }),
    });
    update_stmt(cx, stmt, v)
}

fn flt_binop(cx: &mut Context, stmt: StmtId, args: &[StmtId], op: impl Fn(f64, f64) -> f64) -> SemResult<()> {
    let a = arg_flt(cx, stmt, args, 0)?;
    let b = arg_flt(cx, stmt, args, 1)?;
    let ty = result_ty(cx, stmt);
    let v = cx.values.alloc(Value {
        ty,
        has_data: ContainsData::True,
        kind: ValueKind::Flt(op(a, b)),
    });
    update_stmt(cx, stmt, v)
}

fn flt_assnop(cx: &mut Context, stmt: StmtId, args: &[StmtId], op: impl Fn(f64, f64) -> f64) -> SemResult<()> {
    let a = arg_flt(cx, stmt, args, 0)?;
    let b = arg_flt(cx, stmt, args, 1)?;
    let res = op(a, b);
    let dst = arg_val(cx, stmt, args, 0)?;
    if let ValueKind::Flt(f) = &mut cx.values.get_mut(dst).kind {
        *f = res;
    }
    cx.values.set_contains_data(dst);
    let ty = result_ty(cx, stmt);
    let v = cx.values.alloc(Value {
        ty,
        has_data: ContainsData::True,
        kind: ValueKind::Flt(res),
    });
    update_stmt(cx, stmt, v)
}

fn flt_cmpop(
    cx: &mut Context,
    stmt: StmtId,
    args: &[StmtId],
    op: impl Fn(f64, f64) -> bool,
) -> SemResult<()> {
    let a = arg_flt(cx, stmt, args, 0)?;
    let b = arg_flt(cx, stmt, args, 1)?;
    set_bool(cx, stmt, op(a, b), ContainsData::True)
}

fn flt_unop(cx: &mut Context, stmt: StmtId, args: &[StmtId], op: impl Fn(f64) -> f64) -> SemResult<()> {
    let a = arg_flt(cx, stmt, args, 0)?;
    let ty = result_ty(cx, stmt);
    let v = cx.values.alloc(Value {
        ty,
        has_data: ContainsData::True,
        kind: ValueKind::Flt(op(a)),
    });
    update_stmt(cx, stmt, v)
}

// ----------------------------------------------------------------------
// registration
// ----------------------------------------------------------------------

fn mk_intrinsic_fn(
    cx: &mut Context,
    args: Vec<TypeId>,
    arg_comptime: Vec<bool>,
    ret: TypeId,
    which: Intrinsic,
    inty: IntrinType,
    variadic: bool,
) -> crate::values::ValueId {
    if variadic && let Some(&last) = args.last() {
        cx.types.append_info(last, TypeInfo::VARIADIC);
    }
    let fnty = cx.types.mk_func(None, args, arg_comptime, ret, Some(which), inty, false);
    cx.values.create_id(Value {
        ty: fnty,
        has_data: ContainsData::True,
        kind: ValueKind::Func,
    })
}

/// Seeds the builtin functions and the primitive operator grid. Globals go
/// into the scope stack's global map; operators go into the per-type
/// function tables for every int width/signedness and float width.
pub(crate) fn seed_builtins(cx: &mut Context, scopes: &mut ScopeStack) {
    use Intrinsic::*;

    let mut add_global = |cx: &mut Context,
                          scopes: &mut ScopeStack,
                          name: &str,
                          args: Vec<TypeId>,
                          comptime: Vec<bool>,
                          ret: TypeId,
                          which: Intrinsic,
                          inty: IntrinType,
                          va: bool| {
        let fid = mk_intrinsic_fn(cx, args, comptime, ret, which, inty, va);
        scopes.add_var(name, fid, None, true);
    };

    // core builtins
    {
        let g = cx.types.mk_typety();
        let cstr = cx.types.mk_str();
        add_global(cx, scopes, "import", vec![cstr], vec![true], g, Import, IntrinType::Parse, false);

        let i1 = cx.types.mk_int(1, true);
        add_global(cx, scopes, "isMainSrc", vec![], vec![], i1, IsMainSrc, IntrinType::Parse, false);

        let g = cx.types.mk_typety();
        let i1 = cx.types.mk_int(1, true);
        add_global(cx, scopes, "isPrimitive", vec![g], vec![], i1, IsPrimitive, IntrinType::Parse, false);

        let g = cx.types.mk_typety();
        let i1 = cx.types.mk_int(1, true);
        add_global(
            cx,
            scopes,
            "isPrimitiveOrPtr",
            vec![g],
            vec![],
            i1,
            IsPrimitiveOrPtr,
            IntrinType::Parse,
            false,
        );

        let g = cx.types.mk_typety();
        let i1 = cx.types.mk_int(1, true);
        add_global(cx, scopes, "isCString", vec![g], vec![], i1, IsCString, IntrinType::Parse, false);

        let g = cx.types.mk_typety();
        let i1 = cx.types.mk_int(1, true);
        add_global(cx, scopes, "isCChar", vec![g], vec![], i1, IsCChar, IntrinType::Parse, false);

        let g = cx.types.mk_typety();
        let g2 = cx.types.mk_typety();
        let i1 = cx.types.mk_int(1, true);
        add_global(cx, scopes, "isEqualTy", vec![g, g2], vec![], i1, IsEqualTy, IntrinType::Parse, false);

        let g = cx.types.mk_typety();
        let g2 = cx.types.mk_typety();
        add_global(cx, scopes, "as", vec![g, g2], vec![], g, As, IntrinType::Parse, false);

        let g = cx.types.mk_typety();
        add_global(cx, scopes, "typeOf", vec![g], vec![], g, TypeOf, IntrinType::Parse, false);

        let g = cx.types.mk_typety();
        let g2 = cx.types.mk_typety();
        add_global(cx, scopes, "ptr", vec![g], vec![], g2, Ptr, IntrinType::Parse, false);

        let g = cx.types.mk_typety();
        let u64t = cx.types.mk_int(64, false);
        add_global(cx, scopes, "sizeOf", vec![g], vec![], u64t, SizeOf, IntrinType::Value, false);

        // valen must resolve during type assignment: the variadic length is
        // a property of the enclosing specialization
        let i32t = cx.types.mk_int(32, true);
        add_global(cx, scopes, "valen", vec![], vec![], i32t, VaLen, IntrinType::Parse, false);

        let i32t = cx.types.mk_int(32, true);
        add_global(cx, scopes, "getOSID", vec![], vec![], i32t, GetOsId, IntrinType::Value, false);

        let i32t = cx.types.mk_int(32, true);
        add_global(cx, scopes, "sysPathMax", vec![], vec![], i32t, SysPathMax, IntrinType::Value, false);

        let a = cx.types.mk_any();
        let v = cx.types.mk_void();
        add_global(cx, scopes, "compileError", vec![a], vec![], v, CompileError, IntrinType::Parse, true);

        let i32t = cx.types.mk_int(32, true);
        let v = cx.types.mk_void();
        add_global(
            cx,
            scopes,
            "setMaxErrs",
            vec![i32t],
            vec![true],
            v,
            SetMaxErrs,
            IntrinType::Parse,
            false,
        );

        let g = cx.types.mk_typety();
        let g2 = cx.types.mk_typety();
        let i32a = cx.types.mk_int(32, true);
        let i32b = cx.types.mk_int(32, true);
        add_global(
            cx,
            scopes,
            "array",
            vec![g, i32a, i32b],
            vec![false, true, true],
            g2,
            Array,
            IntrinType::Parse,
            true,
        );
    }

    // pointer assignment
    {
        let g = cx.types.mk_typety();
        let g2 = cx.types.mk_typety();
        let g3 = cx.types.mk_typety();
        let fid = mk_intrinsic_fn(cx, vec![g, g2], vec![], g3, AssnPtr, IntrinType::Value, false);
        scopes.add_type_fn_by_id(TPTR, "__assn__", fid);
    }

    // the int/flt operator grids
    let int_fns: &[(&str, Intrinsic)] = &[
        ("__assn__", AssnInt),
        ("__add__", AddInt),
        ("__sub__", SubInt),
        ("__mul__", MulInt),
        ("__div__", DivInt),
        ("__mod__", ModInt),
        ("__band__", BAndInt),
        ("__bor__", BOrInt),
        ("__bxor__", BXorInt),
        ("__lshift__", LShiftInt),
        ("__rshift__", RShiftInt),
        ("__add_assn__", AddAssnInt),
        ("__sub_assn__", SubAssnInt),
        ("__mul_assn__", MulAssnInt),
        ("__div_assn__", DivAssnInt),
        ("__mod_assn__", ModAssnInt),
        ("__band_assn__", BAndAssnInt),
        ("__bor_assn__", BOrAssnInt),
        ("__bxor_assn__", BXorAssnInt),
        ("__lshift_assn__", LShiftAssnInt),
        ("__rshift_assn__", RShiftAssnInt),
    ];
    let int_cmp_fns: &[(&str, Intrinsic)] = &[
        ("__logand__", LogAndInt),
        ("__logor__", LogOrInt),
        ("__eq__", EqInt),
        ("__lt__", LtInt),
        ("__gt__", GtInt),
        ("__le__", LeInt),
        ("__ge__", GeInt),
        ("__ne__", NeInt),
    ];
    let int_un_fns: &[(&str, Intrinsic)] = &[
        ("__uadd__", UAddInt),
        ("__usub__", USubInt),
        ("__bnot__", BNotInt),
        ("__incx__", IncXInt),
        ("__decx__", DecXInt),
        ("__xinc__", XIncInt),
        ("__xdec__", XDecInt),
    ];

    for &(name, which) in int_fns {
        let g = cx.types.mk_typety();
        let i0 = cx.types.mk_int(0, true);
        let g2 = cx.types.mk_typety();
        let fid = mk_intrinsic_fn(cx, vec![g, i0], vec![], g2, which, IntrinType::Value, false);
        add_int_grid(cx, scopes, name, fid);
    }
    for &(name, which) in int_cmp_fns {
        let g = cx.types.mk_typety();
        let i0 = cx.types.mk_int(0, true);
        let i1 = cx.types.mk_int(1, true);
        let fid = mk_intrinsic_fn(cx, vec![g, i0], vec![], i1, which, IntrinType::Value, false);
        add_int_grid(cx, scopes, name, fid);
    }
    for &(name, which) in int_un_fns {
        let g = cx.types.mk_typety();
        let g2 = cx.types.mk_typety();
        let fid = mk_intrinsic_fn(cx, vec![g], vec![], g2, which, IntrinType::Value, false);
        add_int_grid(cx, scopes, name, fid);
    }
    {
        let g = cx.types.mk_typety();
        let i1 = cx.types.mk_int(1, true);
        let fid = mk_intrinsic_fn(cx, vec![g], vec![], i1, LogNotInt, IntrinType::Value, false);
        add_int_grid(cx, scopes, "__lognot__", fid);
    }

    let flt_fns: &[(&str, Intrinsic)] = &[
        ("__assn__", AssnFlt),
        ("__add__", AddFlt),
        ("__sub__", SubFlt),
        ("__mul__", MulFlt),
        ("__div__", DivFlt),
        ("__add_assn__", AddAssnFlt),
        ("__sub_assn__", SubAssnFlt),
        ("__mul_assn__", MulAssnFlt),
        ("__div_assn__", DivAssnFlt),
    ];
    let flt_cmp_fns: &[(&str, Intrinsic)] = &[
        ("__logand__", LogAndFlt),
        ("__logor__", LogOrFlt),
        ("__eq__", EqFlt),
        ("__lt__", LtFlt),
        ("__gt__", GtFlt),
        ("__le__", LeFlt),
        ("__ge__", GeFlt),
        ("__ne__", NeFlt),
    ];
    for &(name, which) in flt_fns {
        let g = cx.types.mk_typety();
        let f0 = cx.types.mk_flt(0);
        let g2 = cx.types.mk_typety();
        let fid = mk_intrinsic_fn(cx, vec![g, f0], vec![], g2, which, IntrinType::Value, false);
        add_flt_grid(cx, scopes, name, fid);
    }
    for &(name, which) in flt_cmp_fns {
        let g = cx.types.mk_typety();
        let f0 = cx.types.mk_flt(0);
        let i1 = cx.types.mk_int(1, true);
        let fid = mk_intrinsic_fn(cx, vec![g, f0], vec![], i1, which, IntrinType::Value, false);
        add_flt_grid(cx, scopes, name, fid);
    }
    {
        let g = cx.types.mk_typety();
        let g2 = cx.types.mk_typety();
        let fid = mk_intrinsic_fn(cx, vec![g], vec![], g2, UAddFlt, IntrinType::Value, false);
        add_flt_grid(cx, scopes, "__uadd__", fid);
    }
    {
        let g = cx.types.mk_typety();
        let g2 = cx.types.mk_typety();
        let fid = mk_intrinsic_fn(cx, vec![g], vec![], g2, USubFlt, IntrinType::Value, false);
        add_flt_grid(cx, scopes, "__usub__", fid);
    }
    {
        let g = cx.types.mk_typety();
        let i1 = cx.types.mk_int(1, true);
        let fid = mk_intrinsic_fn(cx, vec![g], vec![], i1, LogNotFlt, IntrinType::Value, false);
        add_flt_grid(cx, scopes, "__lognot__", fid);
    }
}

fn add_int_grid(cx: &mut Context, scopes: &mut ScopeStack, name: &str, fid: crate::values::ValueId) {
    for signed in [true, false] {
        for bits in [1u16, 8, 16, 32, 64] {
            let ty = cx.types.mk_int(bits, signed);
            let id = cx.types.id(ty);
            scopes.add_type_fn_by_id(id, name, fid);
        }
    }
}

fn add_flt_grid(cx: &mut Context, scopes: &mut ScopeStack, name: &str, fid: crate::values::ValueId) {
    for bits in [32u16, 64] {
        let ty = cx.types.mk_flt(bits);
        let id = cx.types.id(ty);
        scopes.add_type_fn_by_id(id, name, fid);
    }
}
