//! Interned comptime values.
//!
//! The registry is two-level: a [`ValueId`] (the handle statements carry;
//! 0 means "no value") maps to a [`ValueRef`], the actual object. Two ids
//! may point at the same object, which is how field access and reference
//! parameters alias storage: rebinding an id changes what every statement
//! sharing that id sees, while in-place updates through any alias are
//! visible through all of them.

use indexmap::IndexMap;

use crate::types::{TypeId, Types};

/// Statement-facing value handle. `NONE` (0) marks "no value assigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(u64);

impl ValueId {
    pub const NONE: Self = Self(0);

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a value object in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueRef(u32);

impl ValueRef {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Whether a value currently holds usable data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainsData {
    /// No runtime value known.
    False,
    /// A value is present.
    True,
    /// A value is present and is an immutable compile-time literal.
    Perma,
}

impl ContainsData {
    pub fn has_data(self) -> bool {
        matches!(self, Self::True | Self::Perma)
    }

    /// Clones demote permanent literals to plain data.
    fn demoted(self) -> Self {
        match self {
            Self::Perma => Self::True,
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ValueKind {
    Void,
    Int(i64),
    Flt(f64),
    /// Arrays, pointers, strings and variadic packs.
    Vec(Vec<ValueRef>),
    Struct(IndexMap<String, ValueRef>),
    /// The function is carried by `ty`.
    Func,
    /// The type is carried by `ty`.
    Type,
    /// An imported module, tagged by its module-id string.
    Namespace(String),
    /// Alias of another value (reference parameters).
    Ref(ValueRef),
}

#[derive(Debug, Clone)]
pub(crate) struct Value {
    pub ty: TypeId,
    pub has_data: ContainsData,
    pub kind: ValueKind,
}

/// The process-wide value registry.
pub struct Values {
    ids: Vec<ValueRef>,
    objs: Vec<Value>,
}

impl Values {
    pub(crate) fn new(types: &mut Types) -> Self {
        // object 0 backs the reserved null id
        let void_ty = types.mk_void();
        Self {
            ids: vec![ValueRef(0)],
            objs: vec![Value {
                ty: void_ty,
                has_data: ContainsData::False,
                kind: ValueKind::Void,
            }],
        }
    }

    pub(crate) fn alloc(&mut self, v: Value) -> ValueRef {
        let r = ValueRef(self.objs.len().try_into().expect("value store overflow"));
        self.objs.push(v);
        r
    }

    /// Issues a fresh id bound to an existing object.
    pub(crate) fn register(&mut self, obj: ValueRef) -> ValueId {
        let id = ValueId(self.ids.len() as u64);
        self.ids.push(obj);
        id
    }

    pub(crate) fn create_id(&mut self, v: Value) -> ValueId {
        let obj = self.alloc(v);
        self.register(obj)
    }

    #[inline]
    pub(crate) fn obj_of(&self, id: ValueId) -> ValueRef {
        self.ids[id.index()]
    }

    /// Rebinds an id to a different object. Every statement sharing the id
    /// observes the new object.
    pub(crate) fn rebind(&mut self, id: ValueId, obj: ValueRef) {
        self.ids[id.index()] = obj;
    }

    #[inline]
    pub(crate) fn get(&self, r: ValueRef) -> &Value {
        &self.objs[r.index()]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, r: ValueRef) -> &mut Value {
        &mut self.objs[r.index()]
    }

    /// Follows reference aliases down to the storage object.
    pub(crate) fn deref(&self, mut r: ValueRef) -> ValueRef {
        while let ValueKind::Ref(to) = self.get(r).kind {
            r = to;
        }
        r
    }

    pub(crate) fn ty(&self, r: ValueRef) -> TypeId {
        self.get(r).ty
    }

    pub(crate) fn is_namespace(&self, r: ValueRef) -> bool {
        matches!(self.get(r).kind, ValueKind::Namespace(_))
    }

    pub(crate) fn is_type(&self, r: ValueRef) -> bool {
        matches!(self.get(r).kind, ValueKind::Type)
    }

    pub(crate) fn is_func(&self, r: ValueRef) -> bool {
        matches!(self.get(r).kind, ValueKind::Func)
    }

    pub(crate) fn is_int(&self, r: ValueRef) -> bool {
        matches!(self.get(r).kind, ValueKind::Int(_))
    }

    pub(crate) fn is_flt(&self, r: ValueRef) -> bool {
        matches!(self.get(r).kind, ValueKind::Flt(_))
    }

    pub(crate) fn is_vec(&self, r: ValueRef) -> bool {
        matches!(self.get(r).kind, ValueKind::Vec(_))
    }

    pub(crate) fn is_struct(&self, r: ValueRef) -> bool {
        matches!(self.get(r).kind, ValueKind::Struct(_))
    }

    pub(crate) fn as_int(&self, r: ValueRef) -> i64 {
        match self.get(r).kind {
            ValueKind::Int(i) => i,
            _ => 0,
        }
    }

    pub(crate) fn as_flt(&self, r: ValueRef) -> f64 {
        match self.get(r).kind {
            ValueKind::Flt(f) => f,
            _ => 0.0,
        }
    }

    /// Truthiness for conditions: nonzero int or nonzero float.
    pub(crate) fn is_truthy(&self, r: ValueRef) -> bool {
        match self.get(r).kind {
            ValueKind::Int(i) => i != 0,
            ValueKind::Flt(f) => f != 0.0,
            _ => false,
        }
    }

    pub(crate) fn struct_field(&self, r: ValueRef, name: &str) -> Option<ValueRef> {
        match &self.get(r).kind {
            ValueKind::Struct(fields) => fields.get(name).copied(),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // data-presence tracking (reference values forward to their pointee)
    // ------------------------------------------------------------------

    pub(crate) fn has_data(&self, r: ValueRef) -> bool {
        self.get(self.deref(r)).has_data.has_data()
    }

    pub(crate) fn has_perma_data(&self, r: ValueRef) -> bool {
        self.get(self.deref(r)).has_data == ContainsData::Perma
    }

    pub(crate) fn set_has_data(&mut self, r: ValueRef, cd: ContainsData) {
        let r = self.deref(r);
        let v = self.get_mut(r);
        if v.has_data == ContainsData::Perma {
            return;
        }
        v.has_data = cd;
    }

    pub(crate) fn set_contains_data(&mut self, r: ValueRef) {
        self.set_has_data(r, ContainsData::True);
    }

    pub(crate) fn clear_has_data(&mut self, r: ValueRef) {
        let r = self.deref(r);
        let v = self.get_mut(r);
        if v.has_data == ContainsData::Perma {
            return;
        }
        v.has_data = ContainsData::False;
    }

    // ------------------------------------------------------------------
    // cloning and updating
    // ------------------------------------------------------------------

    /// Deep clone of an object graph. Perma data demotes to True so the
    /// clone is mutable.
    pub(crate) fn clone_obj(&mut self, r: ValueRef) -> ValueRef {
        let v = self.get(r).clone();
        match v.kind {
            ValueKind::Void => r,
            ValueKind::Int(i) => self.alloc(Value {
                ty: v.ty,
                has_data: v.has_data.demoted(),
                kind: ValueKind::Int(i),
            }),
            ValueKind::Flt(f) => self.alloc(Value {
                ty: v.ty,
                has_data: v.has_data.demoted(),
                kind: ValueKind::Flt(f),
            }),
            ValueKind::Vec(elems) => {
                let elems = elems.iter().map(|&e| self.clone_obj(e)).collect();
                self.alloc(Value {
                    ty: v.ty,
                    has_data: v.has_data.demoted(),
                    kind: ValueKind::Vec(elems),
                })
            }
            ValueKind::Struct(fields) => {
                let fields = fields
                    .iter()
                    .map(|(name, &f)| (name.clone(), self.clone_obj(f)))
                    .collect();
                self.alloc(Value {
                    ty: v.ty,
                    has_data: v.has_data.demoted(),
                    kind: ValueKind::Struct(fields),
                })
            }
            ValueKind::Func => self.alloc(Value {
                ty: v.ty,
                has_data: ContainsData::True,
                kind: ValueKind::Func,
            }),
            ValueKind::Type => self.alloc(Value {
                ty: v.ty,
                has_data: ContainsData::Perma,
                kind: ValueKind::Type,
            }),
            ValueKind::Namespace(ns) => self.alloc(Value {
                ty: v.ty,
                has_data: v.has_data.demoted(),
                kind: ValueKind::Namespace(ns),
            }),
            ValueKind::Ref(to) => {
                let to = self.clone_obj(to);
                self.alloc(Value {
                    ty: v.ty,
                    has_data: ContainsData::True,
                    kind: ValueKind::Ref(to),
                })
            }
        }
    }

    /// In-place update of `dst` from `src`, preserving object identity so
    /// aliases observe the change. Kinds must match (a reference on the
    /// destination side writes through to its pointee). Returns false on a
    /// shape mismatch.
    pub(crate) fn update_obj(&mut self, types: &Types, dst: ValueRef, src: ValueRef) -> bool {
        let dst = self.deref(dst);
        let src_v = self.get(self.deref(src)).clone();
        let new_cd = if src_v.has_data.has_data() {
            ContainsData::True
        } else {
            ContainsData::False
        };
        let dst_kind = self.get(dst).kind.clone();
        match (&dst_kind, &src_v.kind) {
            (ValueKind::Void, ValueKind::Void) => true,
            (ValueKind::Int(_), ValueKind::Int(i)) => {
                let v = self.get_mut(dst);
                v.kind = ValueKind::Int(*i);
                v.has_data = new_cd;
                true
            }
            (ValueKind::Flt(_), ValueKind::Flt(f)) => {
                let v = self.get_mut(dst);
                v.kind = ValueKind::Flt(*f);
                v.has_data = new_cd;
                true
            }
            (ValueKind::Vec(delems), ValueKind::Vec(selems)) => {
                let dst_ty = self.get(dst).ty;
                let unsized_ptr =
                    matches!(&types.get(dst_ty).kind, crate::types::TypeKind::Ptr { count: 0, .. });
                if unsized_ptr {
                    // only pointers of unknown extent may change length
                    let elems: Vec<ValueRef> = selems.iter().map(|&e| self.clone_obj(e)).collect();
                    let v = self.get_mut(dst);
                    v.kind = ValueKind::Vec(elems);
                    v.has_data = new_cd;
                    return true;
                }
                if delems.len() != selems.len() {
                    return false;
                }
                let pairs: Vec<(ValueRef, ValueRef)> =
                    delems.iter().copied().zip(selems.iter().copied()).collect();
                for (d, s) in pairs {
                    if !self.update_obj(types, d, s) {
                        return false;
                    }
                }
                self.get_mut(dst).has_data = new_cd;
                true
            }
            (ValueKind::Struct(dfields), ValueKind::Struct(sfields)) => {
                if dfields.len() != sfields.len() {
                    return false;
                }
                let pairs: Vec<(ValueRef, ValueRef)> = dfields
                    .iter()
                    .filter_map(|(name, &d)| sfields.get(name).map(|&s| (d, s)))
                    .collect();
                if pairs.len() != dfields.len() {
                    return false;
                }
                for (d, s) in pairs {
                    if !self.update_obj(types, d, s) {
                        return false;
                    }
                }
                self.get_mut(dst).has_data = new_cd;
                true
            }
            (ValueKind::Func, _) | (ValueKind::Type, _) => true,
            (ValueKind::Namespace(_), ValueKind::Namespace(ns)) => {
                let v = self.get_mut(dst);
                v.kind = ValueKind::Namespace(ns.clone());
                v.has_data = new_cd;
                true
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // string views
    // ------------------------------------------------------------------

    /// True for `*const i8` vectors, the shape of string literals.
    pub(crate) fn is_str_literal(&self, types: &Types, r: ValueRef) -> bool {
        let r = self.deref(r);
        let ty = self.get(r).ty;
        let Some(inner) = types.ptr_to(ty) else {
            return false;
        };
        types.is_int(inner) && types.int_bits(inner) == 8 && types.int_signed(inner)
    }

    /// Reassembles a string literal value into a Rust string.
    pub(crate) fn vec_as_string(&self, r: ValueRef) -> Option<String> {
        let r = self.deref(r);
        let ValueKind::Vec(elems) = &self.get(r).kind else {
            return None;
        };
        let mut res = String::new();
        for &e in elems {
            match self.get(e).kind {
                ValueKind::Int(i) => res.push((i as u8) as char),
                _ => return None,
            }
        }
        Some(res)
    }

    /// Builds a string literal value (`*const i8` of char codes).
    pub(crate) fn mk_str(&mut self, types: &mut Types, s: &str, cd: ContainsData) -> ValueRef {
        let i8ty = types.mk_int(8, true);
        let chars: Vec<ValueRef> = s
            .bytes()
            .map(|b| {
                self.alloc(Value {
                    ty: i8ty,
                    has_data: cd,
                    kind: ValueKind::Int(i64::from(b)),
                })
            })
            .collect();
        let pty = types.mk_ptr(i8ty, 0, false);
        types.append_info(pty, crate::types::TypeInfo::CONST);
        self.alloc(Value {
            ty: pty,
            has_data: cd,
            kind: ValueKind::Vec(chars),
        })
    }

    /// Human-readable rendering, used by diagnostics and tree dumps.
    pub(crate) fn display(&self, types: &Types, r: ValueRef) -> String {
        match &self.get(r).kind {
            ValueKind::Void => "<void>".into(),
            ValueKind::Int(i) => i.to_string(),
            ValueKind::Flt(f) => format!("{f:?}"),
            ValueKind::Vec(elems) => {
                if self.is_str_literal(types, r)
                    && let Some(s) = self.vec_as_string(r)
                {
                    return format!("{s:?}");
                }
                let parts: Vec<String> = elems.iter().map(|&e| self.display(types, e)).collect();
                format!("[{}]", parts.join(", "))
            }
            ValueKind::Struct(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(name, &f)| format!("{name}: {}", self.display(types, f)))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            ValueKind::Func => format!("func<{}>", types.to_str(self.get(r).ty)),
            ValueKind::Type => format!("typeval<{}>", types.to_str(self.get(r).ty)),
            ValueKind::Namespace(ns) => format!("namespace<{ns}>"),
            ValueKind::Ref(to) => format!("ref<{}>", self.display(types, *to)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn clone_demotes_perma() {
        let mut cx = Context::for_tests();
        let ity = cx.types.mk_int(32, true);
        let v = cx.values.alloc(Value {
            ty: ity,
            has_data: ContainsData::Perma,
            kind: ValueKind::Int(7),
        });
        let c = cx.values.clone_obj(v);
        assert!(cx.values.has_data(c));
        assert!(!cx.values.has_perma_data(c));
        assert!(cx.values.has_perma_data(v));
    }

    #[test]
    fn id_rebinding_aliases_statements() {
        let mut cx = Context::for_tests();
        let ity = cx.types.mk_int(32, true);
        let a = cx.values.alloc(Value {
            ty: ity,
            has_data: ContainsData::True,
            kind: ValueKind::Int(1),
        });
        let b = cx.values.alloc(Value {
            ty: ity,
            has_data: ContainsData::True,
            kind: ValueKind::Int(2),
        });
        let id = cx.values.register(a);
        assert_eq!(cx.values.as_int(cx.values.obj_of(id)), 1);
        cx.values.rebind(id, b);
        assert_eq!(cx.values.as_int(cx.values.obj_of(id)), 2);
    }

    #[test]
    fn ref_updates_write_through() {
        let mut cx = Context::for_tests();
        let ity = cx.types.mk_int(32, true);
        let storage = cx.values.alloc(Value {
            ty: ity,
            has_data: ContainsData::True,
            kind: ValueKind::Int(5),
        });
        let rf = cx.values.alloc(Value {
            ty: ity,
            has_data: ContainsData::True,
            kind: ValueKind::Ref(storage),
        });
        let src = cx.values.alloc(Value {
            ty: ity,
            has_data: ContainsData::True,
            kind: ValueKind::Int(9),
        });
        assert!(cx.values.update_obj(&cx.types, rf, src));
        assert_eq!(cx.values.as_int(storage), 9);
    }
}
