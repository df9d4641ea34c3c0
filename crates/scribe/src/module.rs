//! Module loading and ordering.
//!
//! Modules are loaded lazily: the main module first, every other one on
//! demand when an `@import` resolves during type assignment. Each module
//! runs lex -> parse -> type-assign on its own; after the main module
//! finishes, every imported module's top block is spliced ahead of the main
//! module's statements in import order and the combined passes run once.

use ahash::AHashMap;

use crate::{
    ast::{StmtId, StmtKind},
    context::Context,
    diag::{Halted, SemResult},
    lex::{Lexeme, Lexer},
    loc::ModuleId,
    typeassign::{self, Sema},
};

pub(crate) struct Module {
    pub id: ModuleId,
    pub path: String,
    /// Directory relative imports resolve against.
    pub dir: String,
    pub tokens: Vec<Lexeme>,
    pub tree: Option<StmtId>,
    pub ast_dump: Option<String>,
    pub is_main: bool,
}

#[derive(Default)]
pub(crate) struct ModuleRegistry {
    by_path: AHashMap<String, ModuleId>,
    mods: Vec<Module>,
    /// Import order; excludes the main module.
    pub order: Vec<ModuleId>,
    /// Parse stack: front is the main module, top is the one being parsed.
    pub stack: Vec<ModuleId>,
}

impl ModuleRegistry {
    pub fn find(&self, path: &str) -> Option<ModuleId> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, id: ModuleId) -> Option<&Module> {
        self.mods.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.mods.iter_mut().find(|m| m.id == id)
    }

    pub fn is_main(&self, id: ModuleId) -> bool {
        self.get(id).is_some_and(|m| m.is_main)
    }

    fn add(&mut self, module: Module) {
        self.by_path.insert(module.path.clone(), module.id);
        self.mods.push(module);
    }
}

/// Lexically normalizes a path: collapses `.` and resolves `..` segments.
fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|&p| p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_owned()
    } else {
        joined
    }
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_owned(),
        Some(i) => path[..i].to_owned(),
        None => ".".to_owned(),
    }
}

/// Resolves an import spec against the importing module's directory, the
/// user's home (`~` prefix), or the install lib directory (bare names).
/// The `.sc` suffix is appended when missing. Returns the resolved path
/// only when the loader can see it.
pub(crate) fn resolve_import(cx: &Context, from: ModuleId, spec: &str) -> Option<String> {
    let mut candidate = if let Some(rest) = spec.strip_prefix('~') {
        let home = cx.env.home.as_deref()?;
        format!("{home}{rest}")
    } else if spec.starts_with('/') {
        spec.to_owned()
    } else if spec.starts_with('.') {
        let dir = cx
            .modules
            .get(from)
            .map_or_else(|| ".".to_owned(), |m| m.dir.clone());
        format!("{dir}/{spec}")
    } else {
        let lib = cx.env.lib_dir.as_deref()?;
        format!("{lib}/{spec}")
    };
    if !candidate.ends_with(".sc") {
        candidate.push_str(".sc");
    }
    let candidate = normalize_path(&candidate);
    cx.loader.exists(&candidate).then_some(candidate)
}

/// Loads, lexes, parses and type-assigns one module. Returns the existing
/// module when the path was already loaded.
pub(crate) fn parse_module(
    cx: &mut Context,
    sema: &mut Sema,
    path: &str,
    is_main: bool,
) -> SemResult<ModuleId> {
    if let Some(existing) = cx.modules.find(path) {
        return Ok(existing);
    }
    let code = match cx.loader.read(path) {
        Ok(code) => code,
        Err(e) => return Err(cx.diags.error(None, e)),
    };
    let id = cx.srcmap.add(path, &code);
    cx.modules.add(Module {
        id,
        path: path.to_owned(),
        dir: parent_dir(path),
        tokens: Vec::new(),
        tree: None,
        ast_dump: None,
        is_main,
    });
    cx.modules.stack.push(id);
    cx.verbose(|| format!("parsing module {path}"));

    let mut tokens = Vec::new();
    if !Lexer::new(cx, id).tokenize(&code, &mut tokens) {
        return Err(Halted);
    }
    if let Some(m) = cx.modules.get_mut(id) {
        m.tokens = tokens.clone();
    }

    let tree = crate::parser::parse(cx, id, tokens, code.len())?;
    if let Some(m) = cx.modules.get_mut(id) {
        m.tree = Some(tree);
    }
    if cx.want_ast_dump {
        let dump = crate::dump::dump_tree(cx, tree);
        if let Some(m) = cx.modules.get_mut(id) {
            m.ast_dump = Some(dump);
        }
    }

    cx.verbose(|| format!("type-assigning module {path}"));
    typeassign::run(cx, sema, tree)?;
    if !is_main {
        cx.modules.order.push(id);
    }
    Ok(id)
}

/// Splices every imported module's top-level statements ahead of the main
/// module's, in import order. Imported trees are left empty.
pub(crate) fn combine_modules(cx: &mut Context, main: ModuleId) {
    if cx.modules.order.is_empty() {
        return;
    }
    let mut all: Vec<StmtId> = Vec::new();
    for id in cx.modules.order.clone() {
        let Some(tree) = cx.modules.get(id).and_then(|m| m.tree) else {
            continue;
        };
        if let StmtKind::Block { stmts, .. } = &mut cx.stmts.get_mut(tree).kind {
            all.append(stmts);
        }
    }
    let Some(main_tree) = cx.modules.get(main).and_then(|m| m.tree) else {
        return;
    };
    if let StmtKind::Block { stmts, .. } = &mut cx.stmts.get_mut(main_tree).kind {
        all.append(stmts);
        *stmts = all;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_normalization() {
        assert_eq!(normalize_path("a/./b/../c"), "a/c");
        assert_eq!(normalize_path("/x/y/../../z"), "/z");
        assert_eq!(normalize_path("./lib/io"), "lib/io");
        assert_eq!(normalize_path("../up"), "../up");
    }

    #[test]
    fn parent_dirs() {
        assert_eq!(parent_dir("/a/b/c.sc"), "/a/b");
        assert_eq!(parent_dir("main.sc"), ".");
        assert_eq!(parent_dir("/main.sc"), "/");
    }
}
