//! Command-line front end for the Scribe compiler core.
//!
//! Backend-facing flags (`-i`, `-O`, `--std`, `--llir`) are accepted and
//! recorded so driver scripts keep working, but the core-only build has no
//! code generator to hand them to.

use std::{env, process::ExitCode};

use scribe::{Compiler, Options, TraceLevel};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Default)]
struct Args {
    file: Option<String>,
    version: bool,
    tokens: bool,
    ast: bool,
    sst: bool,
    ir: bool,
    nofile: bool,
    opt_level: Option<String>,
    std_ver: Option<String>,
    llir: bool,
    verbose: bool,
    trace: bool,
}

fn print_help() {
    println!(
        "usage: scribe [options] <file | build | run>\n\
         \n\
         options:\n\
         \x20 -v, --version     print program version\n\
         \x20 -t, --tokens      show lexical tokens\n\
         \x20 -a, --ast         show the parse tree\n\
         \x20 -s, --sst         show the semantic tree\n\
         \x20 -i, --ir          show codegen IR (backend builds only)\n\
         \x20 -n, --nofile      disable output to a file\n\
         \x20 -O, --opt=LEVEL   set optimization level (backend builds only)\n\
         \x20     --std=VER     set C standard (backend builds only)\n\
         \x20     --llir        emit LLVM IR (backend builds only)\n\
         \x20 -V, --verbose     verbose logging\n\
         \x20 -T, --trace       trace logging"
    );
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-v" | "--version" => args.version = true,
            "-t" | "--tokens" => args.tokens = true,
            "-a" | "--ast" => args.ast = true,
            "-s" | "--sst" => args.sst = true,
            "-i" | "--ir" => args.ir = true,
            "-n" | "--nofile" => args.nofile = true,
            "--llir" => args.llir = true,
            "-V" | "--verbose" => args.verbose = true,
            "-T" | "--trace" => args.trace = true,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                if let Some(level) = other.strip_prefix("--opt=") {
                    args.opt_level = Some(level.to_owned());
                } else if let Some(level) = other.strip_prefix("-O") {
                    args.opt_level = Some(level.to_owned());
                } else if let Some(ver) = other.strip_prefix("--std=") {
                    args.std_ver = Some(ver.to_owned());
                } else if other.starts_with('-') {
                    return Err(format!("unknown option: {other}"));
                } else if args.file.is_none() {
                    args.file = Some(other.to_owned());
                } else {
                    return Err(format!("unexpected positional argument: {other}"));
                }
            }
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.version {
        println!("scribe compiler {VERSION}");
        return ExitCode::SUCCESS;
    }
    let Some(file) = args.file.clone() else {
        eprintln!("error: no source provided to read from");
        return ExitCode::FAILURE;
    };
    if file == "build" || file == "run" {
        eprintln!("error: build-definition projects are not supported by the core-only build");
        return ExitCode::FAILURE;
    }
    if !std::path::Path::new(&file).exists() {
        eprintln!("error: file {file} does not exist");
        return ExitCode::FAILURE;
    }

    let opts = Options {
        dump_tokens: args.tokens,
        dump_ast: args.ast,
        dump_sst: args.sst,
        trace: if args.trace {
            TraceLevel::Trace
        } else if args.verbose {
            TraceLevel::Verbose
        } else {
            TraceLevel::Off
        },
        ..Options::default()
    };
    let compiler = Compiler::new(opts);
    match compiler.compile_file(&file) {
        Ok(out) => {
            if let Some(d) = &out.tokens_dump {
                println!(
                    "-------------------------------- Token(s) --------------------------------"
                );
                print!("{d}");
            }
            if let Some(d) = &out.ast_dump {
                println!(
                    "------------------------------ Parse Tree(s) -----------------------------"
                );
                print!("{d}");
            }
            if let Some(d) = &out.sst_dump {
                println!(
                    "----------------------------- Semantic Tree(s) ---------------------------"
                );
                print!("{d}");
            }
            if !out.diagnostics.is_empty() {
                eprint!("{}", out.diagnostics);
            }
            if args.ir || args.llir || args.opt_level.is_some() || args.std_ver.is_some() {
                eprintln!("note: backend flags ignored; this build stops after semantic analysis");
            }
            let _ = args.nofile;
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
