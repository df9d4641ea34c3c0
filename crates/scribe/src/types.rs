//! The type graph.
//!
//! Types live in an arena and are referred to by [`TypeId`]. Identity is
//! structural: [`Types::id`] folds the base kind with bit widths, element
//! ids and function uniq-ids, so two separately allocated `i32` nodes carry
//! the same id. Template holes ([`TypeKind::TypeTy`]) own a slot in the
//! context-wide contained-types map; filling and clearing those slots is how
//! template deduction works. Self-referential structs are broken by weak
//! pointer edges, and every structural operation stops recursing at
//! [`MAX_WEAK_DEPTH`], treating the pointee as opaque beyond that.

use bitflags::bitflags;

use ahash::AHashMap;

use crate::{
    ast::StmtId,
    context::Context,
    diag::Halted,
    intrinsics::{IntrinType, Intrinsic},
    loc::ModuleLoc,
    values::{ContainsData, Value, ValueKind, ValueRef},
};

/// Recursion budget through weak pointer edges.
pub const MAX_WEAK_DEPTH: usize = 7;

// Base ids of the builtin kinds. Dynamic ids (structs, functions) are
// allocated past `FIRST_DYNAMIC_ID`.
const TVOID: u32 = 0;
const TTYPE: u32 = 1;
const TANY: u32 = 2;
const TINT: u32 = 3;
const TFLT: u32 = 4;
pub(crate) const TPTR: u32 = 5;
const TFUNC: u32 = 6;
const TVARIADIC: u32 = 8;
// dynamic ids sit above every computed primitive id (ints fold in their
// width and signedness, floats their width) so the member-function tables
// never key a struct onto a primitive's slot
const FIRST_DYNAMIC_ID: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Qualifier bits carried by a type independent of its identity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeInfo: u8 {
        const REF      = 1 << 0;
        const STATIC   = 1 << 1;
        const CONST    = 1 << 2;
        const VOLATILE = 1 << 3;
        const COMPTIME = 1 << 4;
        const VARIADIC = 1 << 5;
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StructTy {
    pub base_id: u32,
    pub field_names: Vec<String>,
    pub fields: Vec<TypeId>,
    pub template_names: Vec<String>,
    /// TypeTy nodes backing the template parameters.
    pub templates: Vec<TypeId>,
    pub has_template: bool,
    pub externed: bool,
}

impl StructTy {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|f| f == name)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FuncTy {
    pub base_id: u32,
    /// The `let` declaration whose value is this function's definition.
    pub var: Option<StmtId>,
    /// The typed signature statement, for parameter masks.
    pub sig: Option<StmtId>,
    pub args: Vec<TypeId>,
    pub arg_comptime: Vec<bool>,
    pub ret: TypeId,
    pub intrin: Option<Intrinsic>,
    pub inty: IntrinType,
    /// Fresh per specialization; 0 for externs.
    pub uniq_id: u32,
    pub externed: bool,
}

impl FuncTy {
    pub fn is_arg_comptime(&self, idx: usize) -> bool {
        self.arg_comptime.get(idx).copied().unwrap_or(false)
    }

    pub fn is_intrinsic(&self) -> bool {
        self.intrin.is_some()
    }

    pub fn is_parse_intrinsic(&self) -> bool {
        self.inty == IntrinType::Parse
    }
}

#[derive(Debug, Clone)]
pub(crate) enum TypeKind {
    Void,
    Any,
    Int { bits: u16, signed: bool },
    Flt { bits: u16 },
    /// A metatype hole (or, once its slot is filled, a resolved metatype).
    TypeTy { slot: u32 },
    Ptr { to: TypeId, count: u16, weak: bool },
    Struct(Box<StructTy>),
    Func(Box<FuncTy>),
    Variadic { args: Vec<TypeId> },
}

#[derive(Debug, Clone)]
pub(crate) struct Type {
    pub kind: TypeKind,
    pub info: TypeInfo,
}

/// The type arena plus the process-wide template slot map.
#[derive(Default)]
pub struct Types {
    nodes: Vec<Type>,
    /// Filled template slots: slot id -> contained type.
    contained: AHashMap<u32, TypeId>,
    next_slot: u32,
    next_base_id: u32,
    next_fn_uniq: u32,
}

impl Types {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            contained: AHashMap::new(),
            next_slot: 0,
            next_base_id: FIRST_DYNAMIC_ID,
            next_fn_uniq: 1,
        }
    }

    fn alloc(&mut self, kind: TypeKind, info: TypeInfo) -> TypeId {
        let id = TypeId(self.nodes.len().try_into().expect("type arena overflow"));
        self.nodes.push(Type { kind, info });
        id
    }

    #[inline]
    pub(crate) fn get(&self, id: TypeId) -> &Type {
        &self.nodes[id.index()]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.nodes[id.index()]
    }

    pub(crate) fn info(&self, id: TypeId) -> TypeInfo {
        self.nodes[id.index()].info
    }

    pub(crate) fn set_info(&mut self, id: TypeId, info: TypeInfo) {
        self.nodes[id.index()].info = info;
    }

    pub(crate) fn append_info(&mut self, id: TypeId, info: TypeInfo) {
        self.nodes[id.index()].info |= info;
    }

    pub(crate) fn gen_base_id(&mut self) -> u32 {
        let id = self.next_base_id;
        self.next_base_id += 1;
        id
    }

    pub(crate) fn gen_fn_uniq_id(&mut self) -> u32 {
        let id = self.next_fn_uniq;
        self.next_fn_uniq += 1;
        id
    }

    // ------------------------------------------------------------------
    // constructors
    // ------------------------------------------------------------------

    pub(crate) fn mk_void(&mut self) -> TypeId {
        self.alloc(TypeKind::Void, TypeInfo::empty())
    }

    pub(crate) fn mk_any(&mut self) -> TypeId {
        self.alloc(TypeKind::Any, TypeInfo::empty())
    }

    pub(crate) fn mk_int(&mut self, bits: u16, signed: bool) -> TypeId {
        self.alloc(TypeKind::Int { bits, signed }, TypeInfo::empty())
    }

    pub(crate) fn mk_flt(&mut self, bits: u16) -> TypeId {
        self.alloc(TypeKind::Flt { bits }, TypeInfo::empty())
    }

    /// A fresh metatype hole with its own slot.
    pub(crate) fn mk_typety(&mut self) -> TypeId {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.alloc(TypeKind::TypeTy { slot }, TypeInfo::empty())
    }

    pub(crate) fn mk_ptr(&mut self, to: TypeId, count: u16, weak: bool) -> TypeId {
        self.alloc(TypeKind::Ptr { to, count, weak }, TypeInfo::empty())
    }

    /// `*const i8`, the type of string literals.
    pub(crate) fn mk_str(&mut self) -> TypeId {
        let i8 = self.mk_int(8, true);
        let ptr = self.mk_ptr(i8, 0, false);
        self.append_info(ptr, TypeInfo::CONST);
        ptr
    }

    pub(crate) fn mk_struct(&mut self, st: StructTy) -> TypeId {
        self.alloc(TypeKind::Struct(Box::new(st)), TypeInfo::empty())
    }

    pub(crate) fn mk_func(
        &mut self,
        var: Option<StmtId>,
        args: Vec<TypeId>,
        arg_comptime: Vec<bool>,
        ret: TypeId,
        intrin: Option<Intrinsic>,
        inty: IntrinType,
        externed: bool,
    ) -> TypeId {
        let base_id = self.gen_base_id();
        let uniq_id = if externed { 0 } else { self.gen_fn_uniq_id() };
        self.alloc(
            TypeKind::Func(Box::new(FuncTy {
                base_id,
                var,
                sig: None,
                args,
                arg_comptime,
                ret,
                intrin,
                inty,
                uniq_id,
                externed,
            })),
            TypeInfo::empty(),
        )
    }

    pub(crate) fn mk_variadic(&mut self, args: Vec<TypeId>) -> TypeId {
        self.alloc(TypeKind::Variadic { args }, TypeInfo::empty())
    }

    // ------------------------------------------------------------------
    // predicates and accessors
    // ------------------------------------------------------------------

    pub(crate) fn is_void(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Void)
    }

    pub(crate) fn is_any(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Any)
    }

    pub(crate) fn is_int(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Int { .. })
    }

    pub(crate) fn is_flt(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Flt { .. })
    }

    pub(crate) fn is_typety(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::TypeTy { .. })
    }

    pub(crate) fn is_ptr(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Ptr { .. })
    }

    pub(crate) fn is_struct(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Struct(_))
    }

    pub(crate) fn is_func(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Func(_))
    }

    pub(crate) fn is_variadic(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Variadic { .. })
    }

    pub(crate) fn is_primitive(&self, id: TypeId) -> bool {
        self.is_int(id) || self.is_flt(id)
    }

    pub(crate) fn is_primitive_or_ptr(&self, id: TypeId) -> bool {
        self.is_primitive(id) || self.is_ptr(id)
    }

    pub(crate) fn ptr_to(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id).kind {
            TypeKind::Ptr { to, .. } => Some(to),
            _ => None,
        }
    }

    pub(crate) fn ptr_is_weak(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Ptr { weak: true, .. })
    }

    pub(crate) fn as_struct(&self, id: TypeId) -> Option<&StructTy> {
        match &self.get(id).kind {
            TypeKind::Struct(st) => Some(st),
            _ => None,
        }
    }

    pub(crate) fn as_struct_mut(&mut self, id: TypeId) -> Option<&mut StructTy> {
        match &mut self.get_mut(id).kind {
            TypeKind::Struct(st) => Some(st),
            _ => None,
        }
    }

    pub(crate) fn as_func(&self, id: TypeId) -> Option<&FuncTy> {
        match &self.get(id).kind {
            TypeKind::Func(f) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn as_func_mut(&mut self, id: TypeId) -> Option<&mut FuncTy> {
        match &mut self.get_mut(id).kind {
            TypeKind::Func(f) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn variadic_args(&self, id: TypeId) -> Option<&[TypeId]> {
        match &self.get(id).kind {
            TypeKind::Variadic { args } => Some(args),
            _ => None,
        }
    }

    /// The filled contents of a metatype slot, if any.
    pub(crate) fn contained(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id).kind {
            TypeKind::TypeTy { slot } => self.contained.get(&slot).copied(),
            _ => None,
        }
    }

    /// Fills a metatype slot. Filled slots are never overwritten; a hole on
    /// the right-hand side is a no-op.
    pub(crate) fn set_contained(&mut self, id: TypeId, ty: TypeId) {
        let TypeKind::TypeTy { slot } = self.get(id).kind else {
            return;
        };
        if self.contained.contains_key(&slot) {
            return;
        }
        if let TypeKind::TypeTy { slot: rslot } = self.get(ty).kind {
            if let Some(&inner) = self.contained.get(&rslot) {
                self.contained.insert(slot, inner);
            }
            return;
        }
        self.contained.insert(slot, ty);
    }

    pub(crate) fn clear_contained(&mut self, id: TypeId) {
        if let TypeKind::TypeTy { slot } = self.get(id).kind {
            self.contained.remove(&slot);
        }
    }

    pub(crate) fn int_bits(&self, id: TypeId) -> u16 {
        match self.get(id).kind {
            TypeKind::Int { bits, .. } => bits,
            _ => 0,
        }
    }

    pub(crate) fn int_signed(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Int { signed: true, .. })
    }

    pub(crate) fn flt_bits(&self, id: TypeId) -> u16 {
        match self.get(id).kind {
            TypeKind::Flt { bits } => bits,
            _ => 0,
        }
    }

    /// Number of pointer hops down to a non-pointer type.
    pub(crate) fn pointer_count(&self, id: TypeId) -> usize {
        let mut n = 0;
        let mut t = id;
        while let Some(to) = self.ptr_to(t) {
            n += 1;
            t = to;
        }
        n
    }

    pub(crate) fn apply_pointer_count(&mut self, mut ty: TypeId, count: usize) -> TypeId {
        for _ in 0..count {
            ty = self.mk_ptr(ty, 0, false);
        }
        ty
    }

    // ------------------------------------------------------------------
    // identity
    // ------------------------------------------------------------------

    /// Structural identity. Stable across clones of the same shape.
    pub(crate) fn id(&self, id: TypeId) -> u32 {
        match &self.get(id).kind {
            TypeKind::Void => TVOID,
            TypeKind::Any => TANY,
            TypeKind::Int { bits, signed } => TINT + u32::from(*bits) + u32::from(*signed) * 2,
            TypeKind::Flt { bits } => TFLT + u32::from(*bits) * 3,
            TypeKind::TypeTy { .. } => TTYPE,
            TypeKind::Ptr { .. } => TPTR,
            TypeKind::Struct(st) => st.base_id,
            TypeKind::Func(f) => {
                let mut res = TFUNC + f.base_id + f.uniq_id;
                for &a in &f.args {
                    res = res.wrapping_add(self.id(a));
                }
                res.wrapping_add(self.id(f.ret)).wrapping_mul(7)
            }
            TypeKind::Variadic { .. } => TVARIADIC,
        }
    }

    /// Identity modulo unresolved metatype slots and weak edges: resolves
    /// filled `TypeTy` holes and skips through non-weak pointers.
    pub(crate) fn uniq_id(&self, id: TypeId) -> u32 {
        match &self.get(id).kind {
            TypeKind::TypeTy { .. } => match self.contained(id) {
                Some(inner) => self.uniq_id(inner),
                None => self.id(id),
            },
            TypeKind::Ptr { to, weak, .. } => {
                if *weak {
                    self.id(id)
                } else {
                    self.uniq_id(*to)
                }
            }
            TypeKind::Struct(st) => {
                let mut res = self.id(id);
                for &f in &st.fields {
                    res = res.wrapping_add(self.uniq_id(f));
                }
                res
            }
            _ => self.id(id),
        }
    }

    /// Signature identity of a function: parameters and return only, no
    /// uniq id. Used for function-to-function compatibility (callbacks).
    pub(crate) fn signature_id(&self, id: TypeId) -> u32 {
        let Some(f) = self.as_func(id) else {
            return self.id(id);
        };
        let mut res = TFUNC;
        for &a in &f.args {
            res = res.wrapping_add(self.id(a));
        }
        res.wrapping_add(self.id(f.ret)).wrapping_mul(7)
    }

    /// Identity shared by all specializations of one function template.
    pub(crate) fn non_uniq_id(&self, id: TypeId) -> u32 {
        let Some(f) = self.as_func(id) else {
            return self.id(id);
        };
        let mut res = f.base_id;
        for &a in &f.args {
            res = res.wrapping_add(self.id(a));
        }
        res.wrapping_add(self.id(f.ret)).wrapping_mul(7)
    }

    // ------------------------------------------------------------------
    // templates
    // ------------------------------------------------------------------

    /// True while any reachable metatype slot is unfilled. Recursion through
    /// weak pointers is bounded; beyond the budget the pointee is opaque.
    pub(crate) fn is_template(&self, id: TypeId, weak_depth: usize) -> bool {
        match &self.get(id).kind {
            TypeKind::TypeTy { .. } => self.contained(id).is_none(),
            TypeKind::Ptr { to, weak, .. } => {
                if weak_depth >= MAX_WEAK_DEPTH {
                    false
                } else {
                    self.is_template(*to, weak_depth + usize::from(*weak))
                }
            }
            TypeKind::Struct(st) => st.fields.iter().any(|&f| self.is_template(f, weak_depth)),
            TypeKind::Func(f) => {
                f.args.iter().any(|&a| self.is_template(a, weak_depth))
                    || self.is_template(f.ret, weak_depth)
            }
            TypeKind::Variadic { args } => args.iter().any(|&a| self.is_template(a, weak_depth)),
            _ => false,
        }
    }

    /// Fills metatype slots on `self`'s side from the shape of `rhs`.
    /// Returns true when at least one slot was involved.
    pub(crate) fn merge_templates_from(&mut self, id: TypeId, rhs: TypeId, weak_depth: usize) -> bool {
        match self.get(id).kind.clone() {
            TypeKind::TypeTy { .. } => {
                if self.contained(id).is_some() {
                    return true;
                }
                self.set_contained(id, rhs);
                true
            }
            TypeKind::Ptr { to, weak, .. } => {
                if weak_depth >= MAX_WEAK_DEPTH {
                    return false;
                }
                let Some(rto) = self.ptr_to(rhs) else {
                    return false;
                };
                self.merge_templates_from(to, rto, weak_depth + usize::from(weak))
            }
            TypeKind::Struct(st) => {
                let Some(rst) = self.as_struct(rhs) else {
                    return false;
                };
                if st.fields.len() != rst.fields.len() {
                    return false;
                }
                let pairs: Vec<(TypeId, TypeId)> =
                    st.fields.iter().copied().zip(rst.fields.iter().copied()).collect();
                let mut merged = false;
                for (l, r) in pairs {
                    merged |= self.merge_templates_from(l, r, weak_depth);
                }
                merged
            }
            TypeKind::Func(f) => {
                let Some(rf) = self.as_func(rhs) else {
                    return false;
                };
                if f.args.len() != rf.args.len() {
                    return false;
                }
                let pairs: Vec<(TypeId, TypeId)> =
                    f.args.iter().copied().zip(rf.args.iter().copied()).collect();
                let rret = rf.ret;
                let mut merged = false;
                for (l, r) in pairs {
                    merged |= self.merge_templates_from(l, r, weak_depth);
                }
                merged |= self.merge_templates_from(f.ret, rret, weak_depth);
                merged
            }
            TypeKind::Variadic { args } => {
                let Some(rargs) = self.variadic_args(rhs) else {
                    return false;
                };
                if args.len() != rargs.len() {
                    return false;
                }
                let pairs: Vec<(TypeId, TypeId)> =
                    args.iter().copied().zip(rargs.iter().copied()).collect();
                let mut merged = false;
                for (l, r) in pairs {
                    merged |= self.merge_templates_from(l, r, weak_depth);
                }
                merged
            }
            _ => false,
        }
    }

    /// Clears every metatype slot reachable from `id`.
    pub(crate) fn unmerge_templates(&mut self, id: TypeId, weak_depth: usize) {
        match self.get(id).kind.clone() {
            TypeKind::TypeTy { .. } => self.clear_contained(id),
            TypeKind::Ptr { to, weak, .. } => {
                if weak_depth < MAX_WEAK_DEPTH {
                    self.unmerge_templates(to, weak_depth + usize::from(weak));
                }
            }
            TypeKind::Struct(st) => {
                for f in st.fields {
                    self.unmerge_templates(f, weak_depth);
                }
            }
            TypeKind::Func(f) => {
                for a in f.args {
                    self.unmerge_templates(a, weak_depth);
                }
                self.unmerge_templates(f.ret, weak_depth);
            }
            TypeKind::Variadic { args } => {
                for a in args {
                    self.unmerge_templates(a, weak_depth);
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // cloning
    // ------------------------------------------------------------------

    /// Deep structural clone. With `as_is` false a filled metatype hole
    /// unwraps to (a clone of) its contents, which is how specialization
    /// turns deduced holes into concrete parameter types.
    pub(crate) fn clone_ty(&mut self, id: TypeId, as_is: bool, weak_depth: usize) -> TypeId {
        let info = self.info(id);
        match self.get(id).kind.clone() {
            TypeKind::Void => self.alloc(TypeKind::Void, info),
            TypeKind::Any => self.alloc(TypeKind::Any, info),
            TypeKind::Int { bits, signed } => self.alloc(TypeKind::Int { bits, signed }, info),
            TypeKind::Flt { bits } => self.alloc(TypeKind::Flt { bits }, info),
            TypeKind::TypeTy { slot } => {
                if !as_is && let Some(inner) = self.contained(id) {
                    let res = self.clone_ty(inner, as_is, weak_depth);
                    self.append_info(res, info);
                    return res;
                }
                self.alloc(TypeKind::TypeTy { slot }, info)
            }
            TypeKind::Ptr { to, count, weak } => {
                let to = if weak_depth < MAX_WEAK_DEPTH {
                    self.clone_ty(to, as_is, weak_depth + usize::from(weak))
                } else {
                    to
                };
                self.alloc(TypeKind::Ptr { to, count, weak }, info)
            }
            TypeKind::Struct(st) => {
                let fields = st
                    .fields
                    .iter()
                    .map(|&f| self.clone_ty(f, as_is, weak_depth))
                    .collect();
                let templates = st
                    .templates
                    .iter()
                    .map(|&t| self.clone_ty(t, as_is, weak_depth))
                    .collect();
                self.alloc(
                    TypeKind::Struct(Box::new(StructTy {
                        base_id: st.base_id,
                        field_names: st.field_names.clone(),
                        fields,
                        template_names: st.template_names.clone(),
                        templates,
                        has_template: st.has_template,
                        externed: st.externed,
                    })),
                    info,
                )
            }
            TypeKind::Func(f) => {
                let args = f
                    .args
                    .iter()
                    .map(|&a| self.clone_ty(a, as_is, weak_depth))
                    .collect();
                let ret = self.clone_ty(f.ret, as_is, weak_depth);
                self.alloc(
                    TypeKind::Func(Box::new(FuncTy {
                        base_id: f.base_id,
                        var: f.var,
                        sig: f.sig,
                        args,
                        arg_comptime: f.arg_comptime.clone(),
                        ret,
                        intrin: f.intrin,
                        inty: f.inty,
                        uniq_id: f.uniq_id,
                        externed: f.externed,
                    })),
                    info,
                )
            }
            TypeKind::Variadic { args } => {
                let args = args
                    .iter()
                    .map(|&a| self.clone_ty(a, as_is, weak_depth))
                    .collect();
                self.alloc(TypeKind::Variadic { args }, info)
            }
        }
    }

    /// Clone that resolves satisfied metatype holes.
    pub(crate) fn specialize(&mut self, id: TypeId) -> TypeId {
        self.clone_ty(id, false, 0)
    }

    // ------------------------------------------------------------------
    // casts
    // ------------------------------------------------------------------

    /// Whether assigning `other` into `self` needs an explicit cast node:
    /// primitives differing in width/signedness, or pointers differing in
    /// constness.
    pub(crate) fn requires_cast(&self, id: TypeId, other: TypeId) -> bool {
        if !self.is_primitive_or_ptr(id) || !self.is_primitive_or_ptr(other) {
            return false;
        }
        if self.is_ptr(id) && self.is_ptr(other) {
            if self.info(id).contains(TypeInfo::CONST) != self.info(other).contains(TypeInfo::CONST) {
                return true;
            }
            return self.requires_cast(self.ptr_to(id).unwrap(), self.ptr_to(other).unwrap());
        }
        if !self.is_primitive(id) || !self.is_primitive(other) {
            return self.id(id) != self.id(other);
        }
        if self.id(id) != self.id(other) {
            return true;
        }
        if self.is_int(id) && self.is_int(other) {
            if self.int_bits(id) == 0 {
                return false;
            }
            return self.int_bits(id) != self.int_bits(other)
                || self.int_signed(id) != self.int_signed(other);
        }
        if self.is_flt(id) && self.is_flt(other) {
            if self.flt_bits(id) == 0 {
                return false;
            }
            return self.flt_bits(id) != self.flt_bits(other);
        }
        false
    }

    // ------------------------------------------------------------------
    // display
    // ------------------------------------------------------------------

    fn info_str(&self, id: TypeId) -> String {
        let info = self.info(id);
        let mut res = String::new();
        if info.contains(TypeInfo::REF) {
            res.push('&');
        }
        if info.contains(TypeInfo::STATIC) {
            res.push_str("static ");
        }
        if info.contains(TypeInfo::CONST) {
            res.push_str("const ");
        }
        if info.contains(TypeInfo::VOLATILE) {
            res.push_str("volatile ");
        }
        if info.contains(TypeInfo::COMPTIME) {
            res.push_str("comptime ");
        }
        if info.contains(TypeInfo::VARIADIC) {
            res.push_str("...");
        }
        res
    }

    pub(crate) fn to_str(&self, id: TypeId) -> String {
        self.to_str_depth(id, 0)
    }

    fn to_str_depth(&self, id: TypeId, weak_depth: usize) -> String {
        let pre = self.info_str(id);
        match &self.get(id).kind {
            TypeKind::Void => format!("{pre}void"),
            TypeKind::Any => format!("{pre}any"),
            TypeKind::Int { bits, signed } => {
                format!("{pre}{}{bits}", if *signed { "i" } else { "u" })
            }
            TypeKind::Flt { bits } => format!("{pre}f{bits}"),
            TypeKind::TypeTy { slot } => match self.contained(id) {
                Some(inner) => format!("{pre}typety<{}>", self.to_str_depth(inner, weak_depth)),
                None => format!("{pre}typety<(none:{slot})>"),
            },
            TypeKind::Ptr { to, count, weak } => {
                let extra = if *count > 0 { format!("[{count}] ") } else { String::new() };
                if weak_depth >= MAX_WEAK_DEPTH {
                    format!("*{extra}{pre}weak<{}>", self.id(*to))
                } else {
                    format!(
                        "*{extra}{pre}{}",
                        self.to_str_depth(*to, weak_depth + usize::from(*weak))
                    )
                }
            }
            TypeKind::Struct(st) => {
                let fields: Vec<String> = st
                    .fields
                    .iter()
                    .map(|&f| self.to_str_depth(f, weak_depth))
                    .collect();
                format!("{pre}struct<{}>{{{}}}", self.id(id), fields.join(", "))
            }
            TypeKind::Func(f) => {
                let args: Vec<String> = f
                    .args
                    .iter()
                    .map(|&a| self.to_str_depth(a, weak_depth))
                    .collect();
                let mut tags = String::new();
                if f.intrin.is_some() {
                    tags.push_str(", intrinsic");
                }
                if f.externed {
                    tags.push_str(", extern");
                }
                format!(
                    "{pre}function<{}{tags}>({}): {}",
                    self.id(id),
                    args.join(", "),
                    self.to_str_depth(f.ret, weak_depth)
                )
            }
            TypeKind::Variadic { args } => {
                let args: Vec<String> =
                    args.iter().map(|&a| self.to_str_depth(a, weak_depth)).collect();
                format!("{pre}variadic<{}>", args.join(", "))
            }
        }
    }
}

// ----------------------------------------------------------------------
// operations that cross into diagnostics and values
// ----------------------------------------------------------------------

/// Compatibility of `rhs` against `lhs` for assignment/argument positions.
/// Incompatibilities are reported into the diagnostics sink.
pub(crate) fn is_compatible(cx: &mut Context, lhs: TypeId, rhs: TypeId, loc: ModuleLoc) -> bool {
    if !base_compatible(cx, lhs, rhs, loc) {
        return false;
    }
    let t = &cx.types;
    if t.is_struct(lhs) && t.is_struct(rhs) {
        let lf = t.as_struct(lhs).unwrap().fields.clone();
        let rf = t.as_struct(rhs).unwrap().fields.clone();
        if lf.len() != rf.len() {
            cx.diags.error(
                Some(loc),
                format!(
                    "struct type mismatch (LHS fields: {}, RHS fields: {})",
                    lf.len(),
                    rf.len()
                ),
            );
            return false;
        }
        for (i, (&l, &r)) in lf.iter().zip(rf.iter()).enumerate() {
            if is_compatible(cx, l, r, loc) {
                continue;
            }
            let (ls, rs) = (cx.types.to_str(l), cx.types.to_str(r));
            cx.diags.error(
                Some(loc),
                format!("LHS struct field {ls} at index {i} is incompatible with RHS field {rs}"),
            );
            return false;
        }
        return true;
    }
    if t.is_variadic(lhs) && t.is_variadic(rhs) {
        let la = t.variadic_args(lhs).unwrap().to_vec();
        let ra = t.variadic_args(rhs).unwrap().to_vec();
        if la.len() != ra.len() {
            return false;
        }
        for (&l, &r) in la.iter().zip(ra.iter()) {
            if !is_compatible(cx, l, r, loc) {
                return false;
            }
        }
        return true;
    }
    true
}

fn base_compatible(cx: &mut Context, lhs: TypeId, rhs: TypeId, loc: ModuleLoc) -> bool {
    let t = &cx.types;
    if t.is_any(lhs) {
        return true;
    }
    if t.is_func(lhs) && t.is_func(rhs) {
        return t.signature_id(lhs) == t.signature_id(rhs);
    }
    if t.is_ptr(lhs) && t.is_ptr(rhs) {
        if t.ptr_is_weak(lhs) || t.ptr_is_weak(rhs) {
            let mut lto = t.ptr_to(lhs).unwrap();
            let rto = t.ptr_to(rhs).unwrap();
            while t.is_typety(lto) {
                match t.contained(lto) {
                    Some(inner) => lto = inner,
                    None => break,
                }
            }
            return t.id(lto) == t.id(rto);
        }
        let (lto, rto) = (t.ptr_to(lhs).unwrap(), t.ptr_to(rhs).unwrap());
        return is_compatible(cx, lto, rto, loc);
    }
    if t.is_typety(lhs) && t.is_typety(rhs) && t.contained(lhs).is_none() && t.contained(rhs).is_none()
    {
        cx.diags
            .error(Some(loc), "both metatypes contain no type - currently unsupported");
        return false;
    }
    if t.is_typety(rhs) {
        return match t.contained(rhs) {
            Some(inner) => is_compatible(cx, lhs, inner, loc),
            None => false,
        };
    }
    if t.is_typety(lhs) {
        return match t.contained(lhs) {
            Some(inner) => is_compatible(cx, inner, rhs, loc),
            None => true,
        };
    }
    let t = &cx.types;
    let lhs_prim = t.is_primitive(lhs);
    let rhs_prim = t.is_primitive(rhs);
    let lhs_ptr = t.pointer_count(lhs);
    let rhs_ptr = t.pointer_count(rhs);
    let num_to_num = lhs_ptr == 0 && rhs_ptr == 0 && lhs_prim && rhs_prim;
    if !num_to_num && !(lhs_ptr > 0 && rhs_prim) && t.id(lhs) != t.id(rhs) {
        let (ls, rs) = (t.to_str(lhs), t.to_str(rhs));
        cx.diags.error(
            Some(loc),
            format!("different type ids (LHS: {ls}, RHS: {rs}) not compatible"),
        );
        return false;
    }
    if lhs_ptr == 0 && rhs_ptr > 0 {
        let (ls, rs) = (t.to_str(lhs), t.to_str(rhs));
        cx.diags.error(
            Some(loc),
            format!("cannot use a pointer type (RHS: {rs}) against non pointer (LHS: {ls})"),
        );
        return false;
    }
    if rhs_ptr == 0 && lhs_ptr > 0 && !rhs_prim {
        let (ls, rs) = (t.to_str(lhs), t.to_str(rhs));
        cx.diags.error(
            Some(loc),
            format!("non pointer type (RHS: {rs}) cannot be assigned to pointer type (LHS: {ls})"),
        );
        return false;
    }
    if rhs_ptr != lhs_ptr && !rhs_prim {
        let (ls, rs) = (t.to_str(lhs), t.to_str(rhs));
        cx.diags.error(
            Some(loc),
            format!("unequal pointer depth here (LHS: {ls}, RHS: {rs})"),
        );
        return false;
    }
    let lhs_info = t.info(lhs);
    let rhs_info = t.info(rhs);
    if rhs_info.contains(TypeInfo::CONST)
        && !lhs_info.contains(TypeInfo::CONST)
        && (t.is_ptr(lhs) || lhs_info.contains(TypeInfo::REF))
    {
        let (ls, rs) = (t.to_str(lhs), t.to_str(rhs));
        cx.diags.error(
            Some(loc),
            format!("losing constness here, cannot continue (LHS: {ls}, RHS: {rs})"),
        );
        return false;
    }
    if rhs_info.contains(TypeInfo::VARIADIC) && !lhs_info.contains(TypeInfo::VARIADIC) {
        let (ls, rs) = (t.to_str(lhs), t.to_str(rhs));
        cx.diags.error(
            Some(loc),
            format!("cannot assign variadic type to non variadic (LHS: {ls}, RHS: {rs})"),
        );
        return false;
    }
    true
}

/// Binds a struct's template parameters to `actuals` and returns a deep,
/// non-template clone.
pub(crate) fn apply_templates(
    cx: &mut Context,
    st: TypeId,
    loc: ModuleLoc,
    actuals: &[TypeId],
) -> Result<TypeId, Halted> {
    let templates = cx.types.as_struct(st).expect("apply_templates on non-struct").templates.clone();
    if templates.len() != actuals.len() {
        return Err(cx.diags.error(
            Some(loc),
            format!(
                "expected templates for struct: {}, found: {}",
                templates.len(),
                actuals.len()
            ),
        ));
    }
    for (&tmpl, &actual) in templates.iter().zip(actuals.iter()) {
        cx.types.set_contained(tmpl, actual);
    }
    let res = cx.types.clone_ty(st, false, 0);
    for &tmpl in &templates {
        cx.types.clear_contained(tmpl);
    }
    if let Some(stm) = cx.types.as_struct_mut(res) {
        stm.has_template = false;
    }
    Ok(res)
}

/// Checks call arguments field-by-field against a non-template struct and
/// returns a fresh clone for the instantiated value's type.
pub(crate) fn instantiate_struct(
    cx: &mut Context,
    st: TypeId,
    loc: ModuleLoc,
    callargs: &[StmtId],
) -> Result<TypeId, Halted> {
    let fields = cx.types.as_struct(st).expect("instantiate on non-struct").fields.clone();
    if fields.len() != callargs.len() {
        return Err(cx.diags.error(
            Some(loc),
            format!(
                "struct has {} fields but instantiation has {} arguments",
                fields.len(),
                callargs.len()
            ),
        ));
    }
    if cx.types.is_template(st, 0) {
        return Err(cx
            .diags
            .error(Some(loc), "a struct with unresolved templates cannot be instantiated"));
    }
    for (i, &field) in fields.iter().enumerate() {
        let Some(argty) = cx.stmt_value_ty(callargs[i], false) else {
            return Err(cx.diags.error(Some(loc), "struct instantiation argument has no type"));
        };
        if !is_compatible(cx, field, argty, loc) {
            return Err(Halted);
        }
    }
    Ok(cx.types.clone_ty(st, false, 0))
}

/// Specializes a function type against a call site: deduces template slots
/// from argument types, collapses a trailing variadic parameter, turns `any`
/// parameters concrete, and stamps a fresh uniq id when anything changed.
/// Returns `None` (silently) when arity or compatibility fails.
pub(crate) fn create_call(
    cx: &mut Context,
    fnty: TypeId,
    loc: ModuleLoc,
    callargs: &[StmtId],
) -> Option<TypeId> {
    let f = cx.types.as_func(fnty)?.clone();
    let has_va = f
        .args
        .last()
        .is_some_and(|&a| cx.types.info(a).contains(TypeInfo::VARIADIC));
    if f.args.len() - usize::from(has_va) > callargs.len() {
        return None;
    }
    if f.args.len() != callargs.len() && !has_va {
        return None;
    }

    let mut argtys = Vec::with_capacity(callargs.len());
    for &a in callargs {
        argtys.push(cx.stmt_value_ty(a, false)?);
    }

    let mut has_templ = false;
    for (i, &aty) in argtys.iter().enumerate() {
        if i >= f.args.len() {
            break;
        }
        has_templ |= cx.types.merge_templates_from(f.args[i], aty, 0);
    }

    // compatibility walk; a trailing variadic parameter matches the rest
    let mut variadics = Vec::new();
    let mut compatible = true;
    {
        let mut i = 0usize;
        let mut j = 0usize;
        while i < f.args.len() && j < callargs.len() {
            let sa = f.args[i];
            let variadic = cx.types.info(sa).contains(TypeInfo::VARIADIC);
            if !is_compatible(cx, sa, argtys[j], loc) {
                compatible = false;
                break;
            }
            if variadic {
                variadics.push(argtys[j]);
            } else {
                i += 1;
            }
            j += 1;
        }
    }
    if !compatible {
        cx.types.unmerge_templates(fnty, 0);
        return None;
    }

    let mut res = fnty;
    if has_va {
        res = cx.types.clone_ty(fnty, true, 0);
        let vabase = cx.types.as_func(res).unwrap().args.last().copied().unwrap();
        cx.types.as_func_mut(res).unwrap().args.pop();
        let base_info = cx.types.info(vabase) & !TypeInfo::VARIADIC;
        let ptrcount = cx.types.pointer_count(vabase);
        let mut va_args = Vec::with_capacity(variadics.len());
        for vt in variadics {
            let mut v = cx.types.clone_ty(vt, false, 0);
            v = cx.types.apply_pointer_count(v, ptrcount);
            cx.types.append_info(v, base_info);
            va_args.push(v);
        }
        let va = cx.types.mk_variadic(va_args);
        cx.types.as_func_mut(res).unwrap().args.push(va);
        has_templ = true;
    }
    let res = cx.types.clone_ty(res, false, 0);
    if has_templ {
        cx.types.unmerge_templates(fnty, 0);
        let uniq = cx.types.gen_fn_uniq_id();
        cx.types.as_func_mut(res).unwrap().uniq_id = uniq;
    }
    // `any` parameters take the concrete argument type
    let res_args = cx.types.as_func(res).unwrap().args.clone();
    for (i, &arg) in res_args.iter().enumerate() {
        if cx.types.is_any(arg) && i < argtys.len() {
            let info = cx.types.info(arg);
            let concrete = cx.types.clone_ty(argtys[i], false, 0);
            cx.types.append_info(concrete, info);
            cx.types.as_func_mut(res).unwrap().args[i] = concrete;
        }
    }
    Some(res)
}

/// Produces a freshly shaped value of this type: zero ints/floats, empty
/// field-defaulted structs, element-defaulted array pointers. Weak edges
/// past the depth budget degrade to a pointer-sized integer.
pub(crate) fn to_default_value(
    cx: &mut Context,
    ty: TypeId,
    loc: ModuleLoc,
    cd: ContainsData,
    weak_depth: usize,
) -> Result<ValueRef, Halted> {
    match cx.types.get(ty).kind.clone() {
        TypeKind::Void => Ok(cx.values.alloc(Value {
            ty,
            has_data: ContainsData::True,
            kind: ValueKind::Void,
        })),
        TypeKind::Any | TypeKind::TypeTy { .. } => {
            if let Some(inner) = cx.types.contained(ty) {
                return to_default_value(cx, inner, loc, cd, weak_depth);
            }
            Ok(cx.values.alloc(Value {
                ty,
                has_data: ContainsData::Perma,
                kind: ValueKind::Type,
            }))
        }
        TypeKind::Int { .. } => Ok(cx.values.alloc(Value {
            ty,
            has_data: cd,
            kind: ValueKind::Int(0),
        })),
        TypeKind::Flt { .. } => Ok(cx.values.alloc(Value {
            ty,
            has_data: cd,
            kind: ValueKind::Flt(0.0),
        })),
        TypeKind::Ptr { to, count, weak } => {
            let elem = if weak_depth >= MAX_WEAK_DEPTH {
                let ity = cx.types.mk_int(64, false);
                cx.values.alloc(Value {
                    ty: ity,
                    has_data: cd,
                    kind: ValueKind::Int(0),
                })
            } else {
                to_default_value(cx, to, loc, cd, weak_depth + usize::from(weak))?
            };
            let mut vec = vec![elem];
            for _ in 1..count {
                let cloned = cx.values.clone_obj(elem);
                vec.push(cloned);
            }
            Ok(cx.values.alloc(Value {
                ty,
                has_data: cd,
                kind: ValueKind::Vec(vec),
            }))
        }
        TypeKind::Struct(st) => {
            let mut fields = indexmap::IndexMap::new();
            for (name, &fty) in st.field_names.iter().zip(st.fields.iter()) {
                let v = to_default_value(cx, fty, loc, cd, weak_depth)?;
                fields.insert(name.clone(), v);
            }
            for (name, &tmpl) in st.template_names.iter().zip(st.templates.iter()) {
                let v = cx.values.alloc(Value {
                    ty: tmpl,
                    has_data: ContainsData::Perma,
                    kind: ValueKind::Type,
                });
                fields.insert(name.clone(), v);
            }
            Ok(cx.values.alloc(Value {
                ty,
                has_data: cd,
                kind: ValueKind::Struct(fields),
            }))
        }
        TypeKind::Func(_) => Ok(cx.values.alloc(Value {
            ty,
            has_data: ContainsData::True,
            kind: ValueKind::Func,
        })),
        TypeKind::Variadic { args } => {
            let mut vec = Vec::with_capacity(args.len());
            for a in args {
                vec.push(to_default_value(cx, a, loc, cd, weak_depth)?);
            }
            Ok(cx.values.alloc(Value {
                ty,
                has_data: cd,
                kind: ValueKind::Vec(vec),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn clone_preserves_id() {
        let mut cx = Context::for_tests();
        let i32t = cx.types.mk_int(32, true);
        let ptr = cx.types.mk_ptr(i32t, 0, false);
        let f64t = cx.types.mk_flt(64);
        for ty in [i32t, ptr, f64t] {
            let c = cx.types.clone_ty(ty, true, 0);
            assert_eq!(cx.types.id(ty), cx.types.id(c));
            assert_eq!(cx.types.uniq_id(ty), cx.types.uniq_id(c));
        }
    }

    #[test]
    fn int_ids_distinguish_width_and_sign() {
        let mut cx = Context::for_tests();
        let i32t = cx.types.mk_int(32, true);
        let u32t = cx.types.mk_int(32, false);
        let i64t = cx.types.mk_int(64, true);
        assert_ne!(cx.types.id(i32t), cx.types.id(u32t));
        assert_ne!(cx.types.id(i32t), cx.types.id(i64t));
        let i32b = cx.types.mk_int(32, true);
        assert_eq!(cx.types.id(i32t), cx.types.id(i32b));
    }

    #[test]
    fn compatibility_is_reflexive() {
        let mut cx = Context::for_tests();
        let i32t = cx.types.mk_int(32, true);
        let f32t = cx.types.mk_flt(32);
        let ptr = cx.types.mk_ptr(i32t, 0, false);
        let loc = cx.test_loc();
        for ty in [i32t, f32t, ptr] {
            assert!(is_compatible(&mut cx, ty, ty, loc));
        }
    }

    #[test]
    fn losing_constness_is_rejected() {
        let mut cx = Context::for_tests();
        let i8a = cx.types.mk_int(8, true);
        let cptr = cx.types.mk_ptr(i8a, 0, false);
        cx.types.append_info(cptr, TypeInfo::CONST);
        let i8b = cx.types.mk_int(8, true);
        let mptr = cx.types.mk_ptr(i8b, 0, false);
        let loc = cx.test_loc();
        assert!(!is_compatible(&mut cx, mptr, cptr, loc));
        assert!(cx.diags.has_errors());
    }

    #[test]
    fn template_hole_fills_and_clears() {
        let mut cx = Context::for_tests();
        let hole = cx.types.mk_typety();
        assert!(cx.types.is_template(hole, 0));
        let i32t = cx.types.mk_int(32, true);
        cx.types.merge_templates_from(hole, i32t, 0);
        assert!(!cx.types.is_template(hole, 0));
        assert_eq!(cx.types.contained(hole), Some(i32t));
        // resolving clone unwraps the hole
        let resolved = cx.types.clone_ty(hole, false, 0);
        assert!(cx.types.is_int(resolved));
        cx.types.unmerge_templates(hole, 0);
        assert!(cx.types.is_template(hole, 0));
    }

    #[test]
    fn weak_pointer_breaks_template_recursion() {
        let mut cx = Context::for_tests();
        // struct S { next: *weak S } built by patching the pointee
        let base_id = cx.types.gen_base_id();
        let st = cx.types.mk_struct(StructTy {
            base_id,
            field_names: vec!["next".into()],
            fields: vec![],
            template_names: vec![],
            templates: vec![],
            has_template: false,
            externed: false,
        });
        let ptr = cx.types.mk_ptr(st, 0, true);
        cx.types.as_struct_mut(st).unwrap().fields.push(ptr);
        assert!(!cx.types.is_template(st, 0));
        let id_before = cx.types.id(st);
        let cloned = cx.types.clone_ty(st, true, 0);
        assert_eq!(id_before, cx.types.id(cloned));
        // display terminates
        let _ = cx.types.to_str(st);
    }
}
