//! The attributed statement tree.
//!
//! Statements live in a single arena owned by the [`Context`]; the tree
//! refers to children by [`StmtId`]. Ids are stable for the whole compile
//! run, and clones are deep (fresh ids, value ids reset so the clone can be
//! re-typed in its new position).

use ahash::{AHashMap, AHashSet};
use bitflags::bitflags;

use crate::{
    context::Context,
    lex::{Lexeme, Tok},
    loc::ModuleLoc,
    types::TypeId,
    values::ValueId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

impl StmtId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Statement modifiers. `Ref`/`Const`/`Comptime` come from expression
    /// position, the rest from variable declarations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StmtMask: u8 {
        const REF      = 1 << 0;
        const CONST    = 1 << 1;
        const COMPTIME = 1 << 2;
        const STATIC   = 1 << 3;
        const VOLATILE = 1 << 4;
        const IN       = 1 << 5;
        const GLOBAL   = 1 << 6;
    }
}

/// One arm of an `if`/`elif`/`else` chain. `cond` is `None` for `else`.
#[derive(Debug, Clone)]
pub struct Conditional {
    pub cond: Option<StmtId>,
    pub blk: StmtId,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block {
        stmts: Vec<StmtId>,
        is_top: bool,
        layering_disabled: bool,
    },
    /// A type expression: pointer count + modifiers around an inner expr.
    Type {
        ptr: u16,
        variadic: bool,
        expr: StmtId,
    },
    /// A single lexeme: literal, identifier, or type keyword.
    Simple {
        lex: Lexeme,
        decl: Option<StmtId>,
        /// Captured receiver when a member function reference was resolved.
        self_of: Option<StmtId>,
        applied_module_id: bool,
    },
    CallInfo {
        args: Vec<StmtId>,
    },
    Expr {
        commas: u16,
        lhs: Option<StmtId>,
        oper: Lexeme,
        rhs: Option<StmtId>,
        /// Fallback block for `expr or name { ... }`.
        or_blk: Option<StmtId>,
        or_blk_var: Option<Lexeme>,
        is_intrinsic: bool,
        called_fn: Option<TypeId>,
    },
    Var {
        name: Lexeme,
        vtype: Option<StmtId>,
        vval: Option<StmtId>,
        applied_module_id: bool,
    },
    FnSig {
        args: Vec<StmtId>,
        ret: StmtId,
        /// Set once the signature is known to need no specialization.
        templates_disabled: bool,
        has_variadic: bool,
    },
    FnDef {
        sig: StmtId,
        blk: Option<StmtId>,
        parent_var: Option<StmtId>,
        used: i64,
    },
    Header {
        names: Lexeme,
        flags: Option<Lexeme>,
    },
    Lib {
        flags: Lexeme,
    },
    Extern {
        name: Lexeme,
        headers: Option<StmtId>,
        libs: Option<StmtId>,
        entity: Option<StmtId>,
        parent_var: Option<StmtId>,
    },
    Enum {
        items: Vec<Lexeme>,
    },
    Struct {
        fields: Vec<StmtId>,
        templates: Vec<Lexeme>,
        externed: bool,
    },
    VarDecl {
        decls: Vec<StmtId>,
    },
    Cond {
        conds: Vec<Conditional>,
        is_inline: bool,
    },
    For {
        init: Option<StmtId>,
        cond: Option<StmtId>,
        incr: Option<StmtId>,
        blk: StmtId,
        is_inline: bool,
    },
    Ret {
        val: Option<StmtId>,
        fn_blk: Option<StmtId>,
    },
    Continue,
    Break,
    /// Parser-internal; hoisted before the tree leaves the parser.
    Defer {
        val: StmtId,
    },
}

impl StmtKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Block { .. } => "block",
            Self::Type { .. } => "type",
            Self::Simple { .. } => "simple",
            Self::CallInfo { .. } => "function call info",
            Self::Expr { .. } => "expression",
            Self::Var { .. } => "variable declaration base",
            Self::FnSig { .. } => "function signature",
            Self::FnDef { .. } => "function definition",
            Self::Header { .. } => "extern header",
            Self::Lib { .. } => "extern library",
            Self::Extern { .. } => "extern",
            Self::Enum { .. } => "enumeration definition",
            Self::Struct { .. } => "structure definition",
            Self::VarDecl { .. } => "variable declaration",
            Self::Cond { .. } => "conditional",
            Self::For { .. } => "for loop",
            Self::Ret { .. } => "return",
            Self::Continue => "continue",
            Self::Break => "break",
            Self::Defer { .. } => "defer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub loc: ModuleLoc,
    pub kind: StmtKind,
    pub value_id: ValueId,
    pub cast_to: Option<TypeId>,
    pub deref_count: u16,
    pub mask: StmtMask,
    pub cast_mask: StmtMask,
    pub attrs: Option<Box<AHashMap<String, String>>>,
}

impl Stmt {
    pub fn is_block(&self) -> bool {
        matches!(self.kind, StmtKind::Block { .. })
    }

    pub fn is_simple(&self) -> bool {
        matches!(self.kind, StmtKind::Simple { .. })
    }

    pub fn is_ret(&self) -> bool {
        matches!(self.kind, StmtKind::Ret { .. })
    }

    pub fn is_fndef(&self) -> bool {
        matches!(self.kind, StmtKind::FnDef { .. })
    }

    pub fn is_fnsig(&self) -> bool {
        matches!(self.kind, StmtKind::FnSig { .. })
    }

    pub fn is_extern(&self) -> bool {
        matches!(self.kind, StmtKind::Extern { .. })
    }

    pub fn is_comptime(&self) -> bool {
        self.mask.contains(StmtMask::COMPTIME)
    }

    pub fn is_const(&self) -> bool {
        self.mask.contains(StmtMask::CONST)
    }

    pub fn is_ref(&self) -> bool {
        self.mask.contains(StmtMask::REF)
    }

    pub fn is_global(&self) -> bool {
        self.mask.contains(StmtMask::GLOBAL)
    }

    pub fn is_in(&self) -> bool {
        self.mask.contains(StmtMask::IN)
    }

    pub fn is_cast_const(&self) -> bool {
        self.cast_mask.contains(StmtMask::CONST)
    }

    pub fn cast_to(&mut self, ty: TypeId, mask_from: StmtMask) {
        self.cast_to = Some(ty);
        self.cast_mask |= mask_from;
    }
}

/// The statement arena.
#[derive(Default)]
pub struct Stmts {
    nodes: Vec<Stmt>,
}

impl Stmts {
    pub fn alloc(&mut self, loc: ModuleLoc, kind: StmtKind) -> StmtId {
        let id = StmtId(self.nodes.len().try_into().expect("statement arena overflow"));
        self.nodes.push(Stmt {
            loc,
            kind,
            value_id: ValueId::NONE,
            cast_to: None,
            deref_count: 0,
            mask: StmtMask::empty(),
            cast_mask: StmtMask::empty(),
            attrs: None,
        });
        id
    }

    #[inline]
    pub fn get(&self, id: StmtId) -> &Stmt {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.nodes[id.index()]
    }

    pub fn loc(&self, id: StmtId) -> ModuleLoc {
        self.nodes[id.index()].loc
    }

    /// Deep clone. Child subtrees are cloned recursively; value ids reset so
    /// the clone is re-typed when visited in its new position. Casts, masks
    /// and the resolved callee are carried over.
    pub fn clone_deep(&mut self, id: StmtId) -> StmtId {
        let src = self.nodes[id.index()].clone();
        let kind = match src.kind {
            StmtKind::Block {
                ref stmts,
                is_top,
                layering_disabled,
            } => {
                let stmts = stmts.iter().map(|&s| self.clone_deep(s)).collect();
                StmtKind::Block {
                    stmts,
                    is_top,
                    layering_disabled,
                }
            }
            StmtKind::Type { ptr, variadic, expr } => StmtKind::Type {
                ptr,
                variadic,
                expr: self.clone_deep(expr),
            },
            StmtKind::Simple {
                ref lex,
                self_of,
                applied_module_id,
                ..
            } => StmtKind::Simple {
                lex: lex.clone(),
                decl: None,
                self_of: self_of.map(|s| self.clone_deep(s)),
                applied_module_id,
            },
            StmtKind::CallInfo { ref args } => StmtKind::CallInfo {
                args: args.iter().map(|&a| self.clone_deep(a)).collect(),
            },
            StmtKind::Expr {
                commas,
                lhs,
                ref oper,
                rhs,
                or_blk,
                ref or_blk_var,
                is_intrinsic,
                called_fn,
            } => StmtKind::Expr {
                commas,
                lhs: lhs.map(|s| self.clone_deep(s)),
                oper: oper.clone(),
                rhs: rhs.map(|s| self.clone_deep(s)),
                or_blk: or_blk.map(|s| self.clone_deep(s)),
                or_blk_var: or_blk_var.clone(),
                is_intrinsic,
                called_fn,
            },
            StmtKind::Var {
                ref name,
                vtype,
                vval,
                applied_module_id,
            } => StmtKind::Var {
                name: name.clone(),
                vtype: vtype.map(|s| self.clone_deep(s)),
                vval: vval.map(|s| self.clone_deep(s)),
                applied_module_id,
            },
            StmtKind::FnSig {
                ref args,
                ret,
                templates_disabled,
                has_variadic,
            } => StmtKind::FnSig {
                args: args.iter().map(|&a| self.clone_deep(a)).collect(),
                ret: self.clone_deep(ret),
                templates_disabled,
                has_variadic,
            },
            StmtKind::FnDef { sig, blk, .. } => StmtKind::FnDef {
                sig: self.clone_deep(sig),
                blk: blk.map(|b| self.clone_deep(b)),
                parent_var: None,
                used: 0,
            },
            StmtKind::Header { ref names, ref flags } => StmtKind::Header {
                names: names.clone(),
                flags: flags.clone(),
            },
            StmtKind::Lib { ref flags } => StmtKind::Lib { flags: flags.clone() },
            StmtKind::Extern {
                ref name,
                headers,
                libs,
                entity,
                ..
            } => StmtKind::Extern {
                name: name.clone(),
                headers: headers.map(|s| self.clone_deep(s)),
                libs: libs.map(|s| self.clone_deep(s)),
                entity: entity.map(|s| self.clone_deep(s)),
                parent_var: None,
            },
            StmtKind::Enum { ref items } => StmtKind::Enum { items: items.clone() },
            StmtKind::Struct {
                ref fields,
                ref templates,
                externed,
            } => StmtKind::Struct {
                fields: fields.iter().map(|&f| self.clone_deep(f)).collect(),
                templates: templates.clone(),
                externed,
            },
            StmtKind::VarDecl { ref decls } => StmtKind::VarDecl {
                decls: decls.iter().map(|&d| self.clone_deep(d)).collect(),
            },
            StmtKind::Cond { ref conds, is_inline } => StmtKind::Cond {
                conds: conds
                    .iter()
                    .map(|c| Conditional {
                        cond: c.cond.map(|s| self.clone_deep(s)),
                        blk: self.clone_deep(c.blk),
                    })
                    .collect(),
                is_inline,
            },
            StmtKind::For {
                init,
                cond,
                incr,
                blk,
                is_inline,
            } => StmtKind::For {
                init: init.map(|s| self.clone_deep(s)),
                cond: cond.map(|s| self.clone_deep(s)),
                incr: incr.map(|s| self.clone_deep(s)),
                blk: self.clone_deep(blk),
                is_inline,
            },
            StmtKind::Ret { val, .. } => StmtKind::Ret {
                val: val.map(|s| self.clone_deep(s)),
                fn_blk: None,
            },
            StmtKind::Continue => StmtKind::Continue,
            StmtKind::Break => StmtKind::Break,
            StmtKind::Defer { val } => StmtKind::Defer {
                val: self.clone_deep(val),
            },
        };
        let id = self.alloc(src.loc, kind);
        let node = &mut self.nodes[id.index()];
        node.cast_to = src.cast_to;
        node.cast_mask = src.cast_mask;
        node.mask = src.mask;
        node.deref_count = src.deref_count;
        node.attrs = src.attrs.clone();
        id
    }
}

/// Bumps the use count of a function definition (and the definitions its
/// value resolves through). Cleanup erases definitions left at zero.
pub(crate) fn inc_used(cx: &mut Context, fndef: StmtId) {
    if let StmtKind::FnDef { used, .. } = &mut cx.stmts.get_mut(fndef).kind {
        *used += 1;
    }
}

pub(crate) fn is_used(cx: &Context, fndef: StmtId) -> bool {
    matches!(&cx.stmts.get(fndef).kind, StmtKind::FnDef { used, .. } if *used > 0)
}

/// Whether the subtree still needs template specialization before it can be
/// lowered. For function signatures this latches: a signature found concrete
/// has its `templates_disabled` flag set so later queries short-circuit.
pub(crate) fn requires_template_init(cx: &mut Context, id: StmtId) -> bool {
    let kind = cx.stmts.get(id).kind.clone();
    match kind {
        StmtKind::Block { stmts, .. } => stmts.iter().any(|&s| requires_template_init(cx, s)),
        StmtKind::Type { expr, .. } => requires_template_init(cx, expr),
        StmtKind::Simple { lex, .. } => matches!(lex.tok, Tok::Any | Tok::Type),
        StmtKind::CallInfo { args } => args.iter().any(|&a| requires_template_init(cx, a)),
        StmtKind::Expr { lhs, rhs, or_blk, .. } => {
            lhs.is_some_and(|s| requires_template_init(cx, s))
                || rhs.is_some_and(|s| requires_template_init(cx, s))
                || or_blk.is_some_and(|s| requires_template_init(cx, s))
        }
        StmtKind::Var { vtype, vval, .. } => {
            vtype.is_some_and(|s| requires_template_init(cx, s))
                || vval.is_some_and(|s| requires_template_init(cx, s))
        }
        StmtKind::FnSig {
            args,
            ret,
            templates_disabled,
            has_variadic,
        } => {
            if templates_disabled {
                return false;
            }
            if has_variadic {
                return true;
            }
            for &arg in &args {
                if cx.stmts.get(arg).is_comptime() {
                    return true;
                }
                if sig_slot_is_template(cx, arg) {
                    return true;
                }
            }
            if sig_slot_is_template(cx, ret) {
                return true;
            }
            if let StmtKind::FnSig { templates_disabled, .. } = &mut cx.stmts.get_mut(id).kind {
                *templates_disabled = true;
            }
            false
        }
        StmtKind::FnDef { sig, blk, .. } => {
            requires_template_init(cx, sig) || blk.is_some_and(|b| requires_template_init(cx, b))
        }
        StmtKind::Header { .. } | StmtKind::Lib { .. } => false,
        StmtKind::Extern { entity, .. } => entity.is_some_and(|e| requires_template_init(cx, e)),
        StmtKind::Enum { .. } => false,
        StmtKind::Struct { fields, .. } => fields
            .iter()
            .any(|&f| requires_template_init(cx, f) || cx.stmts.get(f).is_comptime()),
        StmtKind::VarDecl { decls } => decls.iter().any(|&d| requires_template_init(cx, d)),
        StmtKind::Cond { conds, .. } => conds.iter().any(|c| {
            c.cond.is_some_and(|s| requires_template_init(cx, s)) || requires_template_init(cx, c.blk)
        }),
        StmtKind::For { blk, .. } => requires_template_init(cx, blk),
        StmtKind::Ret { val, .. } => val.is_some_and(|s| requires_template_init(cx, s)),
        StmtKind::Continue | StmtKind::Break => false,
        StmtKind::Defer { val } => requires_template_init(cx, val),
    }
}

/// A signature slot needs templating when its assigned type is a template,
/// or is `any` behind any number of pointers.
fn sig_slot_is_template(cx: &Context, slot: StmtId) -> bool {
    let Some(ty) = cx.stmt_value_ty(slot, false) else {
        return false;
    };
    if cx.types.is_template(ty, 0) {
        return true;
    }
    let mut t = ty;
    while let Some(to) = cx.types.ptr_to(t) {
        t = to;
    }
    cx.types.is_any(t)
}

/// Clears comptime-computed data below `id` so a function body can be
/// re-evaluated on its next call. Perma data survives.
pub(crate) fn clear_values(cx: &mut Context, id: StmtId) {
    let mut seen = AHashSet::new();
    clear_values_inner(cx, id, &mut seen);
}

fn clear_values_inner(cx: &mut Context, id: StmtId, seen: &mut AHashSet<StmtId>) {
    if !seen.insert(id) {
        return;
    }
    let vid = cx.stmts.get(id).value_id;
    if vid != ValueId::NONE {
        let obj = cx.values.obj_of(vid);
        cx.values.clear_has_data(obj);
    }
    let kind = cx.stmts.get(id).kind.clone();
    match kind {
        StmtKind::Block { stmts, .. } => {
            for s in stmts {
                clear_values_inner(cx, s, seen);
            }
        }
        StmtKind::Type { expr, .. } => clear_values_inner(cx, expr, seen),
        StmtKind::Simple { self_of, .. } => {
            if let Some(s) = self_of {
                clear_values_inner(cx, s, seen);
            }
        }
        StmtKind::CallInfo { args } => {
            for a in args {
                clear_values_inner(cx, a, seen);
            }
        }
        StmtKind::Expr { lhs, rhs, or_blk, .. } => {
            for s in [lhs, rhs, or_blk].into_iter().flatten() {
                clear_values_inner(cx, s, seen);
            }
        }
        StmtKind::Var { vtype, vval, .. } => {
            for s in [vtype, vval].into_iter().flatten() {
                clear_values_inner(cx, s, seen);
            }
        }
        StmtKind::FnSig { args, ret, .. } => {
            for a in args {
                clear_values_inner(cx, a, seen);
            }
            clear_values_inner(cx, ret, seen);
        }
        StmtKind::FnDef { sig, blk, .. } => {
            clear_values_inner(cx, sig, seen);
            if let Some(b) = blk {
                clear_values_inner(cx, b, seen);
            }
        }
        StmtKind::Extern { entity, .. } => {
            if let Some(e) = entity {
                clear_values_inner(cx, e, seen);
            }
        }
        StmtKind::VarDecl { decls } => {
            for d in decls {
                clear_values_inner(cx, d, seen);
            }
        }
        StmtKind::Cond { conds, .. } => {
            for c in conds {
                if let Some(s) = c.cond {
                    clear_values_inner(cx, s, seen);
                }
                clear_values_inner(cx, c.blk, seen);
            }
        }
        StmtKind::For {
            init,
            cond,
            incr,
            blk,
            ..
        } => {
            for s in [init, cond, incr].into_iter().flatten() {
                clear_values_inner(cx, s, seen);
            }
            clear_values_inner(cx, blk, seen);
        }
        StmtKind::Ret { val, .. } => {
            if let Some(v) = val {
                clear_values_inner(cx, v, seen);
            }
        }
        StmtKind::Defer { val } => clear_values_inner(cx, val, seen),
        StmtKind::Header { .. }
        | StmtKind::Lib { .. }
        | StmtKind::Enum { .. }
        | StmtKind::Struct { .. }
        | StmtKind::Continue
        | StmtKind::Break => {}
    }
}
