//! Public entry points.
//!
//! A [`Compiler`] owns the injected capabilities and drives one compile
//! run: lex -> parse -> type-assign per module (imports recurse), then
//! combine, simplify and cleanup. On success the [`Output`] carries the
//! requested dumps plus any warnings; on failure the [`CompileError`]
//! carries every rendered diagnostic.

use std::fmt;

use crate::{
    cleanup,
    context::Context,
    diag::DEFAULT_MAX_ERRORS,
    io::{Env, FsLoader, MapLoader, SourceLoader},
    module,
    simplify,
    trace::{NoopTracer, StderrTracer, TraceLevel, Tracer},
    typeassign::Sema,
};

#[derive(Debug, Clone)]
pub struct Options {
    pub max_errors: usize,
    pub dump_tokens: bool,
    pub dump_ast: bool,
    pub dump_sst: bool,
    /// Override for the bare-import search directory.
    pub lib_dir: Option<String>,
    pub trace: TraceLevel,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
            dump_tokens: false,
            dump_ast: false,
            dump_sst: false,
            lib_dir: None,
            trace: TraceLevel::Off,
        }
    }
}

/// The result of a successful compile.
#[derive(Debug, Default)]
pub struct Output {
    pub tokens_dump: Option<String>,
    pub ast_dump: Option<String>,
    pub sst_dump: Option<String>,
    /// Rendered warnings (success never carries errors).
    pub diagnostics: String,
}

/// A failed compile: every diagnostic, rendered one per line.
#[derive(Debug)]
pub struct CompileError {
    pub rendered: String,
    pub error_count: usize,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rendered.trim_end())
    }
}

impl std::error::Error for CompileError {}

/// A source file overlaid on top of another loader, for
/// [`Compiler::compile_source`].
struct OverlayLoader {
    path: String,
    code: String,
    fallback: Box<dyn SourceLoader>,
}

impl SourceLoader for OverlayLoader {
    fn exists(&self, path: &str) -> bool {
        path == self.path || self.fallback.exists(path)
    }

    fn read(&self, path: &str) -> Result<String, String> {
        if path == self.path {
            return Ok(self.code.clone());
        }
        self.fallback.read(path)
    }
}

pub struct Compiler {
    opts: Options,
    loader: Box<dyn SourceLoader>,
    env: Env,
}

impl Compiler {
    /// A compiler over the real filesystem and process environment.
    pub fn new(opts: Options) -> Self {
        Self {
            opts,
            loader: Box::new(FsLoader),
            env: Env::from_process(),
        }
    }

    /// A compiler over an injected loader (tests, embedding). The
    /// environment starts empty; set `lib_dir` via [`Options`].
    pub fn with_loader(opts: Options, loader: impl SourceLoader + 'static) -> Self {
        Self {
            opts,
            loader: Box::new(loader),
            env: Env::default(),
        }
    }

    /// Convenience constructor over in-memory sources.
    pub fn with_sources<I, K, V>(opts: Options, files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::with_loader(opts, MapLoader::new(files))
    }

    pub fn compile_file(self, path: &str) -> Result<Output, CompileError> {
        self.compile(path.to_owned())
    }

    /// Compiles a single in-memory source as the main module, with imports
    /// still resolved through the configured loader.
    pub fn compile_source(
        self,
        name: impl Into<String>,
        code: impl Into<String>,
    ) -> Result<Output, CompileError> {
        let name = name.into();
        let overlay = OverlayLoader {
            path: name.clone(),
            code: code.into(),
            fallback: self.loader,
        };
        let this = Self {
            opts: self.opts,
            loader: Box::new(overlay),
            env: self.env,
        };
        this.compile(name)
    }

    fn compile(self, path: String) -> Result<Output, CompileError> {
        let tracer: Box<dyn Tracer> = match self.opts.trace {
            TraceLevel::Off => Box::new(NoopTracer),
            level => Box::new(StderrTracer::new(level)),
        };
        let mut env = self.env;
        if let Some(lib) = &self.opts.lib_dir {
            env.lib_dir = Some(lib.clone());
        }
        let mut cx = Context::new(self.loader, env, tracer);
        cx.diags.set_max_errors(self.opts.max_errors);
        cx.want_ast_dump = self.opts.dump_ast;

        let mut sema = Sema::new(&mut cx);
        let result = module::parse_module(&mut cx, &mut sema, &path, true).and_then(|main| {
            module::combine_modules(&mut cx, main);
            let tree = cx.modules.get(main).and_then(|m| m.tree);
            if let Some(tree) = tree {
                cx.verbose(|| "running combined passes".to_owned());
                simplify::run(&mut cx, tree)?;
                cleanup::run(&mut cx, tree)?;
            }
            Ok(main)
        });

        match result {
            Ok(main) => {
                let mut out = Output {
                    diagnostics: cx.diags.render(&cx.srcmap),
                    ..Output::default()
                };
                if self.opts.dump_tokens {
                    let mut dump = String::new();
                    for id in cx.modules.stack.iter().rev() {
                        dump.push_str(&crate::dump::dump_tokens(&cx, *id));
                        dump.push('\n');
                    }
                    out.tokens_dump = Some(dump);
                }
                if self.opts.dump_ast {
                    let mut dump = String::new();
                    for id in cx.modules.stack.iter().rev() {
                        if let Some(d) = cx.modules.get(*id).and_then(|m| m.ast_dump.as_deref()) {
                            dump.push_str(d);
                            dump.push('\n');
                        }
                    }
                    out.ast_dump = Some(dump);
                }
                if self.opts.dump_sst
                    && let Some(tree) = cx.modules.get(main).and_then(|m| m.tree)
                {
                    out.sst_dump = Some(crate::dump::dump_tree(&cx, tree));
                }
                Ok(out)
            }
            Err(_) => Err(CompileError {
                rendered: cx.diags.render(&cx.srcmap),
                error_count: cx.diags.error_count(),
            }),
        }
    }
}
