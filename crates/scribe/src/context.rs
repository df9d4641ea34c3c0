//! The compilation context: single owner of every arena and capability.
//!
//! All passes take `&mut Context`; nothing in the core shares mutable state
//! any other way. The context lives for exactly one compile run.

use crate::{
    ast::{StmtId, Stmts},
    diag::{Diagnostics, Halted},
    io::{Env, SourceLoader},
    loc::{ModuleLoc, SourceMap},
    module::ModuleRegistry,
    trace::{TraceLevel, Tracer},
    types::{TypeId, Types},
    values::{ValueId, ValueRef, Values},
};

pub(crate) struct Context {
    pub stmts: Stmts,
    pub types: Types,
    pub values: Values,
    pub srcmap: SourceMap,
    pub diags: Diagnostics,
    pub modules: ModuleRegistry,
    pub loader: Box<dyn SourceLoader>,
    pub env: Env,
    pub tracer: Box<dyn Tracer>,
    /// Capture a parse-tree dump per module before type assignment.
    pub want_ast_dump: bool,
}

impl Context {
    pub fn new(loader: Box<dyn SourceLoader>, env: Env, tracer: Box<dyn Tracer>) -> Self {
        let mut types = Types::new();
        let values = Values::new(&mut types);
        Self {
            stmts: Stmts::default(),
            types,
            values,
            srcmap: SourceMap::default(),
            diags: Diagnostics::default(),
            modules: ModuleRegistry::default(),
            loader,
            env,
            tracer,
            want_ast_dump: false,
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        let mut cx = Self::new(
            Box::new(crate::io::MapLoader::default()),
            Env::default(),
            Box::new(crate::trace::NoopTracer),
        );
        cx.srcmap.add("<test>", "");
        cx
    }

    #[cfg(test)]
    pub fn test_loc(&self) -> ModuleLoc {
        ModuleLoc::new(crate::loc::ModuleId::new(0), 0)
    }

    // ------------------------------------------------------------------
    // statement/value plumbing
    // ------------------------------------------------------------------

    /// The value object of a statement. Unless `exact`, reference aliases
    /// are followed down to their storage and pending pointer dereferences
    /// (`deref_count`) walk into the pointed-at element.
    pub fn stmt_value_ref(&self, id: StmtId, exact: bool) -> Option<ValueRef> {
        let s = self.stmts.get(id);
        if s.value_id == ValueId::NONE {
            return None;
        }
        let obj = self.values.obj_of(s.value_id);
        if exact {
            return Some(obj);
        }
        let mut obj = self.values.deref(obj);
        for _ in 0..s.deref_count {
            match &self.values.get(obj).kind {
                crate::values::ValueKind::Vec(elems) => obj = *elems.first()?,
                _ => break,
            }
        }
        Some(self.values.deref(obj))
    }

    /// The effective type of a statement: its value's type, overridden by a
    /// pending cast and adjusted for pending dereferences (unless `exact`).
    pub fn stmt_value_ty(&self, id: StmtId, exact: bool) -> Option<TypeId> {
        let s = self.stmts.get(id);
        if s.value_id == ValueId::NONE {
            return None;
        }
        let base = self.values.ty(self.values.obj_of(s.value_id));
        if exact {
            return Some(base);
        }
        if let Some(cast) = s.cast_to {
            return Some(cast);
        }
        let mut t = base;
        for _ in 0..s.deref_count {
            t = self.types.ptr_to(t)?;
        }
        Some(t)
    }

    /// Issues a fresh value id bound to `obj` and attaches it to the
    /// statement.
    pub fn set_stmt_value(&mut self, id: StmtId, obj: ValueRef) -> ValueId {
        let vid = self.values.register(obj);
        self.stmts.get_mut(id).value_id = vid;
        vid
    }

    /// Makes `dst` share `src`'s value id (and thus its object bindings).
    pub fn share_stmt_value(&mut self, dst: StmtId, src: StmtId) {
        let vid = self.stmts.get(src).value_id;
        self.stmts.get_mut(dst).value_id = vid;
    }

    /// Updates the statement's value object in place from `src`; creates a
    /// fresh binding when the statement has none yet.
    pub fn update_stmt_value(&mut self, id: StmtId, src: ValueRef) -> bool {
        let vid = self.stmts.get(id).value_id;
        if vid == ValueId::NONE {
            let obj = self.values.clone_obj(src);
            self.set_stmt_value(id, obj);
            return true;
        }
        let dst = self.values.obj_of(vid);
        self.values.update_obj(&self.types, dst, src)
    }

    /// Rebinds the statement's existing value id to a different object.
    pub fn rebind_stmt_value(&mut self, id: StmtId, obj: ValueRef) {
        let vid = self.stmts.get(id).value_id;
        debug_assert!(vid != ValueId::NONE, "rebind on a statement without a value");
        self.values.rebind(vid, obj);
    }

    // ------------------------------------------------------------------
    // diagnostics and tracing
    // ------------------------------------------------------------------

    pub fn err(&mut self, at: StmtId, msg: impl Into<String>) -> Halted {
        let loc = self.stmts.loc(at);
        self.diags.error(Some(loc), msg)
    }

    pub fn err_loc(&mut self, loc: ModuleLoc, msg: impl Into<String>) -> Halted {
        self.diags.error(Some(loc), msg)
    }

    pub fn verbose(&mut self, msg: impl FnOnce() -> String) {
        if self.tracer.level() >= TraceLevel::Verbose {
            let m = msg();
            self.tracer.event(TraceLevel::Verbose, &m);
        }
    }

    pub fn trace(&mut self, msg: impl FnOnce() -> String) {
        if self.tracer.level() >= TraceLevel::Trace {
            let m = msg();
            self.tracer.event(TraceLevel::Trace, &m);
        }
    }
}
