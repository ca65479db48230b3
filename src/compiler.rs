use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    ast::Ast,
    lexer, parser, preprocessor, semantic,
    session::Session,
    source::SourceLoader,
    symbols::SymbolTable,
    token::Token,
    types::TypeTable,
};

#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Searched in order for `#include` targets not found next to the
    /// including file.
    pub include_dirs: Vec<PathBuf>,
}

/// Everything the front end produces for one compilation unit.
#[derive(Debug)]
pub struct Compilation {
    pub tokens: Vec<Token>,
    pub ast: Ast,
    pub types: TypeTable,
    pub symbols: SymbolTable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Lexer,
    Preprocessor,
    Parser,
    Semantic,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Lexer => "lexing",
            Stage::Preprocessor => "preprocessing",
            Stage::Parser => "parsing",
            Stage::Semantic => "semantic analysis",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The stage reported at least one error; details are in the session's
    /// diagnostics.
    #[error("compilation aborted during {0}")]
    Aborted(Stage),
    #[error("cannot read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Loads the file at `path` through `loader` and compiles it.
pub fn compile(
    session: &mut Session<'_>,
    loader: &dyn SourceLoader,
    path: &Path,
    options: &Options,
) -> Result<Compilation, Error> {
    let src = loader.load(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    compile_source(session, loader, path, &src, options)
}

/// Compiles `src` as if it were the contents of `path`. Includes are still
/// resolved through `loader`.
pub fn compile_source(
    session: &mut Session<'_>,
    loader: &dyn SourceLoader,
    path: &Path,
    src: &str,
    options: &Options,
) -> Result<Compilation, Error> {
    let file = session.file(&path.to_string_lossy());
    let tokens = lexer::lex_in_new(session, file, src);
    tracing::debug!(count = tokens.len(), "lexed");
    if session.diagnostics.has_errors() {
        return Err(Error::Aborted(Stage::Lexer));
    }

    let tokens = preprocessor::preprocess(session, loader, &options.include_dirs, path, tokens)
        .map_err(|_| Error::Aborted(Stage::Preprocessor))?;
    tracing::debug!(count = tokens.len(), "preprocessed");
    if session.diagnostics.has_errors() {
        return Err(Error::Aborted(Stage::Preprocessor));
    }

    let ast = parser::parse(session, &tokens).map_err(|_| Error::Aborted(Stage::Parser))?;
    tracing::debug!(nodes = ast.len(), "parsed");

    let mut types = TypeTable::new();
    let mut symbols = SymbolTable::new();
    semantic::analyze(session, &tokens, &ast, &mut types, &mut symbols)
        .map_err(|_| Error::Aborted(Stage::Semantic))?;
    tracing::debug!(types = types.len(), symbols = symbols.len(), "analyzed");

    Ok(Compilation {
        tokens,
        ast,
        types,
        symbols,
    })
}
