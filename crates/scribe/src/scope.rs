//! Lexical scopes and the per-type member-function tables.
//!
//! Scopes layer three ways: a stack of plain layers for module-level code,
//! an isolated layer stack per function frame (names outside a function are
//! not visible from inside it), and a flat globals map consulted last.
//! Member functions registered with `let name in Type = fn ...` live in
//! `typefns`, keyed by the owning type's structural id.

use ahash::AHashMap;

use crate::{ast::StmtId, types::TypeId, types::Types, values::ValueId};

#[derive(Debug, Clone, Copy)]
pub(crate) struct VarEntry {
    pub value_id: ValueId,
    pub decl: Option<StmtId>,
}

#[derive(Default)]
struct Layer {
    items: AHashMap<String, VarEntry>,
}

#[derive(Default)]
struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    fn push(&mut self) {
        self.layers.push(Layer::default());
    }

    fn pop(&mut self) {
        self.layers.pop();
    }

    fn len(&self) -> usize {
        self.layers.len()
    }

    fn add(&mut self, name: &str, entry: VarEntry) -> bool {
        let Some(top) = self.layers.last_mut() else {
            return false;
        };
        if top.items.contains_key(name) {
            return false;
        }
        top.items.insert(name.to_owned(), entry);
        true
    }

    fn find(&self, name: &str, top_only: bool) -> Option<VarEntry> {
        for layer in self.layers.iter().rev() {
            if let Some(e) = layer.items.get(name) {
                return Some(*e);
            }
            if top_only {
                break;
            }
        }
        None
    }
}

struct FuncFrame {
    stack: LayerStack,
    fty: Option<TypeId>,
}

/// Scope and symbol manager for the semantic passes.
#[derive(Default)]
pub(crate) struct ScopeStack {
    /// Member functions per type id.
    typefns: AHashMap<u32, AHashMap<String, ValueId>>,
    globals: AHashMap<String, VarEntry>,
    /// Module-level layers, outside any function.
    layers: LayerStack,
    funcs: Vec<FuncFrame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        let mut s = Self::default();
        s.layers.push(); // module-level bottom layer
        s
    }

    pub fn push_layer(&mut self) {
        match self.funcs.last_mut() {
            Some(f) => f.stack.push(),
            None => self.layers.push(),
        }
    }

    pub fn pop_layer(&mut self) {
        match self.funcs.last_mut() {
            Some(f) => f.stack.pop(),
            None => self.layers.pop(),
        }
    }

    pub fn push_func(&mut self, fty: Option<TypeId>) {
        self.funcs.push(FuncFrame {
            stack: LayerStack::default(),
            fty,
        });
    }

    pub fn pop_func(&mut self) {
        self.funcs.pop();
    }

    pub fn has_func(&self) -> bool {
        !self.funcs.is_empty()
    }

    pub fn set_top_func_ty(&mut self, fty: TypeId) {
        if let Some(f) = self.funcs.last_mut() {
            f.fty = Some(fty);
        }
    }

    pub fn top_func_ty(&self) -> Option<TypeId> {
        self.funcs.last().and_then(|f| f.fty)
    }

    /// True at module level with no nested layers: the place where imports
    /// may splice without scoping.
    pub fn is_top(&self) -> bool {
        self.funcs.is_empty() && self.layers.len() == 1
    }

    pub fn add_var(&mut self, name: &str, value_id: ValueId, decl: Option<StmtId>, global: bool) -> bool {
        let entry = VarEntry { value_id, decl };
        if global {
            if self.globals.contains_key(name) {
                return false;
            }
            self.globals.insert(name.to_owned(), entry);
            return true;
        }
        match self.funcs.last_mut() {
            Some(f) => f.stack.add(name, entry),
            None => self.layers.add(name, entry),
        }
    }

    pub fn exists(&self, name: &str, top_only: bool, include_globals: bool) -> bool {
        self.find(name, top_only, include_globals).is_some()
    }

    pub fn get_var(&self, name: &str, top_only: bool, include_globals: bool) -> ValueId {
        self.find(name, top_only, include_globals)
            .map_or(ValueId::NONE, |e| e.value_id)
    }

    pub fn get_decl(&self, name: &str, top_only: bool, include_globals: bool) -> Option<StmtId> {
        self.find(name, top_only, include_globals).and_then(|e| e.decl)
    }

    fn find(&self, name: &str, top_only: bool, include_globals: bool) -> Option<VarEntry> {
        if let Some(f) = self.funcs.last() {
            let res = f.stack.find(name, top_only);
            if res.is_some() || top_only {
                return res;
            }
        }
        let res = self.layers.find(name, top_only);
        if res.is_some() || top_only || !include_globals {
            return res;
        }
        self.globals.get(name).copied()
    }

    // ------------------------------------------------------------------
    // per-type member functions
    // ------------------------------------------------------------------

    pub fn add_type_fn_by_id(&mut self, type_id: u32, name: &str, fval: ValueId) -> bool {
        let map = self.typefns.entry(type_id).or_default();
        if map.contains_key(name) {
            return false;
        }
        map.insert(name.to_owned(), fval);
        true
    }

    pub fn add_type_fn(&mut self, types: &Types, ty: TypeId, name: &str, fval: ValueId) -> bool {
        self.add_type_fn_by_id(types.id(ty), name, fval)
    }

    pub fn has_type_fn(&self, types: &Types, ty: TypeId, name: &str) -> bool {
        self.typefns
            .get(&types.id(ty))
            .is_some_and(|m| m.contains_key(name))
    }

    pub fn get_type_fn(&self, types: &Types, ty: TypeId, name: &str) -> ValueId {
        self.typefns
            .get(&types.id(ty))
            .and_then(|m| m.get(name))
            .copied()
            .unwrap_or(ValueId::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vid(values: &mut crate::values::Values, types: &mut Types, n: i64) -> ValueId {
        let ty = types.mk_int(32, true);
        values.create_id(crate::values::Value {
            ty,
            has_data: crate::values::ContainsData::True,
            kind: crate::values::ValueKind::Int(n),
        })
    }

    #[test]
    fn function_frames_isolate_outer_locals() {
        let mut types = Types::new();
        let mut values = crate::values::Values::new(&mut types);
        let mut scopes = ScopeStack::new();
        let outer = vid(&mut values, &mut types, 1);
        assert!(scopes.add_var("x", outer, None, false));

        scopes.push_func(None);
        scopes.push_layer();
        // module-level `x` is not visible from inside the function
        assert_eq!(scopes.get_var("x", false, true), ValueId::NONE);
        let inner = vid(&mut values, &mut types, 2);
        assert!(scopes.add_var("x", inner, None, false));
        assert_eq!(scopes.get_var("x", false, true), inner);
        scopes.pop_layer();
        scopes.pop_func();

        assert_eq!(scopes.get_var("x", false, true), outer);
    }

    #[test]
    fn globals_are_checked_last() {
        let mut types = Types::new();
        let mut values = crate::values::Values::new(&mut types);
        let mut scopes = ScopeStack::new();
        let g = vid(&mut values, &mut types, 1);
        assert!(scopes.add_var("g", g, None, true));
        assert!(!scopes.add_var("g", g, None, true), "duplicate global");

        scopes.push_func(None);
        scopes.push_layer();
        assert_eq!(scopes.get_var("g", false, true), g);
        assert_eq!(scopes.get_var("g", false, false), ValueId::NONE);
        scopes.pop_layer();
        scopes.pop_func();
    }

    #[test]
    fn duplicate_in_same_layer_is_rejected() {
        let mut types = Types::new();
        let mut values = crate::values::Values::new(&mut types);
        let mut scopes = ScopeStack::new();
        let a = vid(&mut values, &mut types, 1);
        assert!(scopes.add_var("a", a, None, false));
        assert!(!scopes.add_var("a", a, None, false));
        scopes.push_layer();
        assert!(scopes.add_var("a", a, None, false), "shadowing in a new layer");
        scopes.pop_layer();
    }
}
