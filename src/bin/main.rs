use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, ValueEnum};
use colored::Colorize;
use horse::{
    compiler::{self, Compilation, Options},
    diagnostics::Severity,
    language::Language,
    session::Session,
    source::FsLoader,
    util::fmt::{tree, Show},
};
use tracing_subscriber::EnvFilter;

/// Front end of the HorseLang shader compiler.
#[derive(Parser, Debug)]
#[command(name = "horsec", version)]
struct Args {
    /// Source file to compile.
    file: PathBuf,

    /// Directory searched for `#include <...>` files. May be repeated.
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Print an intermediate result to stdout.
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Log the progress of every stage.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    Tokens,
    Ast,
    Symbols,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default = if args.verbose { "horse=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("HORSE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let lang = Language::default();
    let mut session = Session::new(&lang);
    let options = Options {
        include_dirs: args.include_dirs.clone(),
    };
    let result = compiler::compile(&mut session, &FsLoader, &args.file, &options);

    let ctx = session.fmt_context();
    for diagnostic in session.diagnostics.iter() {
        let line = format!("{:#}", diagnostic.display(&ctx));
        match diagnostic.severity {
            Severity::Error => eprintln!("{}", line.red()),
            Severity::Warning => eprintln!("{}", line.yellow()),
        }
    }

    match result {
        Ok(compilation) => {
            if let Some(emit) = args.emit {
                if let Err(error) = emit_to_stdout(emit, &compilation, &session) {
                    eprintln!("{} {error}", "error:".red().bold());
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn emit_to_stdout(emit: Emit, compilation: &Compilation, session: &Session<'_>) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let Compilation {
        tokens,
        ast,
        symbols,
        ..
    } = compilation;
    match emit {
        Emit::Tokens => {
            let ctx = session.fmt_context();
            for token in tokens {
                writeln!(out, "{} {:?} {:?}", token.loc.display(&ctx), token.kind, token.text)?;
            }
        }
        Emit::Ast => tree::print_ast(&mut out, tokens, ast)?,
        Emit::Symbols => tree::print_symbols(&mut out, tokens, ast, symbols)?,
    }
    out.flush()
}
