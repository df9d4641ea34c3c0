//! Semantic front end for the Scribe systems language.
//!
//! The pipeline per module is lex -> parse -> type-assign (which runs the
//! comptime value pass on demand and recursively loads `@import`ed
//! modules); once every module is in, the imported top blocks splice into
//! the main module and the simplify/cleanup passes run over the combined
//! tree. The result is a fully typed, value-propagated, template-expanded
//! statement tree ready for a backend.
//!
//! Filesystem access and environment lookup are injected capabilities
//! ([`SourceLoader`], [`Env`]), so whole multi-module programs compile
//! from memory; see [`Compiler::with_sources`].

mod ast;
mod cleanup;
mod context;
mod diag;
mod dump;
mod intrinsics;
mod io;
mod lex;
mod loc;
mod module;
mod parser;
mod run;
mod scope;
mod simplify;
mod trace;
mod typeassign;
mod types;
mod valueassign;
mod values;

pub use crate::{
    diag::{DEFAULT_MAX_ERRORS, Diag, Diagnostics, Severity},
    io::{Env, FsLoader, MapLoader, SourceLoader},
    loc::{ModuleId, ModuleLoc, SourceMap},
    run::{CompileError, Compiler, Options, Output},
    trace::{NoopTracer, StderrTracer, TraceLevel, Tracer},
};
