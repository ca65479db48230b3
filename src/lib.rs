/// The language table: keywords, primitives, punctuation, operators and
/// escapes. Every later stage reads its vocabulary from here.
pub mod language;

/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The preprocessor expands includes, macros and conditionals over the token
/// stream.
pub mod preprocessor;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The semantic pass resolves declared types and builds the symbol table.
pub mod semantic;

/// Runs every stage over one file.
pub mod compiler;

pub mod ast;
pub mod diagnostics;
pub mod session;
pub mod source;
pub mod symbols;
pub mod token;
pub mod types;

pub mod util {
    pub mod fmt;
    pub mod intern;
    #[cfg(test)]
    pub(crate) mod test_utils;
}
