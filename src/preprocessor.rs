use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    diagnostics::{self, Coded, Severity},
    language::{Language, Punct},
    lexer,
    session::Session,
    source::{self, SourceLoader},
    token::{LiteralKind, Located, Location, Token, TokenKind},
};

type Result<T, E = Located<Error>> = std::result::Result<T, E>;

/// Runs the preprocessor over the tokens of the file at `path`.
///
/// Comments are stripped, macros expanded, includes resolved and conditional
/// blocks reduced to their taken branch. Most problems are reported to the
/// session and skipped; only `#error` stops the run.
pub fn preprocess(
    session: &mut Session<'_>,
    loader: &dyn SourceLoader,
    include_dirs: &[PathBuf],
    path: &Path,
    tokens: Vec<Token>,
) -> Result<Vec<Token>> {
    Preprocessor::new(session, loader, include_dirs).run(path, tokens)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Directive {
    Include,
    Pragma,
    Define,
    If,
    Ifdef,
    Ifndef,
    Elif,
    Else,
    Endif,
    Error,
}

static DIRECTIVES: phf::Map<&'static str, Directive> = phf::phf_map! {
    "include" => Directive::Include,
    "pragma" => Directive::Pragma,
    "define" => Directive::Define,
    "if" => Directive::If,
    "ifdef" => Directive::Ifdef,
    "ifndef" => Directive::Ifndef,
    "elif" => Directive::Elif,
    "else" => Directive::Else,
    "endif" => Directive::Endif,
    "error" => Directive::Error,
};

/// Which files are currently open, as a tree rooted at the main file. Walking
/// a node's ancestors finds include cycles.
#[derive(Debug, Default)]
struct IncludeTree {
    nodes: Vec<IncludeNode>,
}

#[derive(Debug)]
struct IncludeNode {
    path: PathBuf,
    parent: Option<usize>,
}

impl IncludeTree {
    fn add(&mut self, path: PathBuf, parent: Option<usize>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(IncludeNode { path, parent });
        id
    }

    fn is_open(&self, mut node: usize, path: &Path) -> bool {
        loop {
            let current = &self.nodes[node];
            if current.path == path {
                return true;
            }
            match current.parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }
}

/// The branches of one `#if` ... `#endif` block, as token indices.
struct Conditional {
    /// Each `#elif` or `#else`, with the index of its `#`.
    arms: Vec<(Directive, usize)>,
    endif: usize,
}

pub struct Preprocessor<'a, 'lang> {
    session: &'a mut Session<'lang>,
    loader: &'a dyn SourceLoader,
    include_dirs: &'a [PathBuf],
    defines: HashMap<String, Vec<Token>>,
    /// Files that carry `#pragma once`.
    once: HashSet<PathBuf>,
    tree: IncludeTree,
}

impl<'a, 'lang> Preprocessor<'a, 'lang> {
    pub fn new(
        session: &'a mut Session<'lang>,
        loader: &'a dyn SourceLoader,
        include_dirs: &'a [PathBuf],
    ) -> Self {
        Preprocessor {
            session,
            loader,
            include_dirs,
            defines: HashMap::new(),
            once: HashSet::new(),
            tree: IncludeTree::default(),
        }
    }

    pub fn run(mut self, path: &Path, tokens: Vec<Token>) -> Result<Vec<Token>> {
        let root = self.tree.add(source::normalize(path), None);
        let tokens = strip_comments(self.session.lang, tokens);
        let mut out = Vec::with_capacity(tokens.len());
        self.process(&tokens, root, &mut out)?;
        Ok(out)
    }

    fn process(&mut self, tokens: &[Token], node: usize, out: &mut Vec<Token>) -> Result<()> {
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            if token.is_string {
                out.push(token.clone());
                i += 1;
                continue;
            }
            if let Some(body) = self.defines.get(&token.text) {
                // The expansion is not rescanned for further macros.
                out.extend(expand(body, token));
                i += 1;
                continue;
            }
            if !token.is_punct(Punct::Hash) {
                out.push(token.clone());
                i += 1;
                continue;
            }
            i = self.directive(tokens, i, node, out)?;
        }
        Ok(())
    }

    /// Handles the directive whose `#` is at `i` and returns the index of the
    /// first token after it.
    fn directive(
        &mut self,
        tokens: &[Token],
        i: usize,
        node: usize,
        out: &mut Vec<Token>,
    ) -> Result<usize> {
        let hash = &tokens[i];
        let end = line_end(tokens, i);
        let Some(name) = tokens.get(i + 1).filter(|_| i + 1 < end) else {
            self.report(hash.loc, &Error::NoDirective);
            return Ok(end);
        };
        let Some(&directive) = DIRECTIVES.get(name.text.as_str()) else {
            self.report(name.loc, &Error::UnknownDirective(name.text.clone()));
            return Ok(end);
        };
        let args = &tokens[i + 2..end];

        match directive {
            Directive::Include => {
                self.include(name.loc, args, node, out)?;
                Ok(end)
            }
            Directive::Pragma => {
                self.pragma(name.loc, args, node);
                Ok(end)
            }
            Directive::Define => {
                self.define(name.loc, args);
                Ok(end)
            }
            Directive::If | Directive::Ifdef | Directive::Ifndef => {
                self.conditional(tokens, i, directive, node, out)
            }
            Directive::Elif | Directive::Else | Directive::Endif => {
                let error = Error::UnmatchedConditional(name.text.clone());
                self.report(name.loc, &error);
                Ok(end)
            }
            Directive::Error => {
                let error = Error::ErrorDirective(merge_text(args));
                self.report(name.loc, &error);
                Err(name.loc.wrap(error))
            }
        }
    }

    fn include(
        &mut self,
        loc: Location,
        args: &[Token],
        node: usize,
        out: &mut Vec<Token>,
    ) -> Result<()> {
        let Some(arg) = args.first() else {
            self.report(loc, &Error::IncludeMissingFile);
            return Ok(());
        };
        let local = match arg.kind {
            TokenKind::Literal(LiteralKind::String) => true,
            TokenKind::HeaderName => false,
            _ => {
                self.report(arg.loc, &Error::IncludeUnknownSymbol(arg.text.clone()));
                return Ok(());
            }
        };

        let Some(path) = self.resolve(&arg.text, local, node) else {
            self.report(arg.loc, &Error::IncludeFileNotFound(arg.text.clone()));
            return Ok(());
        };
        if self.tree.is_open(node, &path) {
            let error = Error::IncludeRecursion(path.display().to_string());
            self.report(arg.loc, &error);
            return Ok(());
        }
        if self.once.contains(&path) {
            tracing::debug!(path = %path.display(), "ignoring file already included");
            return Ok(());
        }

        let src = match self.loader.load(&path) {
            Ok(src) => src,
            Err(e) => {
                let error = Error::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                };
                self.report(arg.loc, &error);
                return Ok(());
            }
        };
        tracing::debug!(path = %path.display(), "including");

        let file = self.session.file(&path.to_string_lossy());
        let tokens = lexer::lex_in_new(self.session, file, &src);
        let tokens = strip_comments(self.session.lang, tokens);
        let child = self.tree.add(path, Some(node));
        self.process(&tokens, child, out)
    }

    /// Looks next to the including file first (quoted form only), then
    /// through the include directories in order.
    fn resolve(&self, name: &str, local: bool, node: usize) -> Option<PathBuf> {
        let here = self.tree.nodes[node]
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let local = local.then_some(here);
        local
            .into_iter()
            .chain(self.include_dirs.iter().cloned())
            .map(|dir| source::normalize(&dir.join(name)))
            .find(|candidate| self.loader.exists(candidate))
    }

    fn pragma(&mut self, loc: Location, args: &[Token], node: usize) {
        match args.first() {
            Some(arg) if arg.text == "once" => {
                let path = self.tree.nodes[node].path.clone();
                self.once.insert(path);
            }
            Some(arg) => {
                let error = Error::UnknownPragma(arg.text.clone());
                self.report(arg.loc, &error);
            }
            None => self.report(loc, &Error::UnknownPragma(String::new())),
        }
    }

    fn define(&mut self, loc: Location, args: &[Token]) {
        let Some((name, body)) = args.split_first().filter(|(name, _)| is_macro_name(name)) else {
            self.report(loc, &Error::MissingMacroName);
            return;
        };
        tracing::debug!(name = %name.text, body = %merge_text(body), "define");
        if self.defines.insert(name.text.clone(), body.to_vec()).is_some() {
            self.report(name.loc, &Error::MacroRedefined(name.text.clone()));
        }
    }

    /// Emits the taken branch of the conditional starting at `i` and returns
    /// the index after its `#endif`.
    fn conditional(
        &mut self,
        tokens: &[Token],
        i: usize,
        kind: Directive,
        node: usize,
        out: &mut Vec<Token>,
    ) -> Result<usize> {
        let header_end = line_end(tokens, i);
        let Some(block) = find_conditional(tokens, header_end) else {
            self.report(tokens[i].loc, &Error::UnterminatedConditional);
            return Ok(tokens.len());
        };

        // Each arm: where its condition line starts, and where its body ends.
        let mut bounds = Vec::with_capacity(block.arms.len() + 1);
        bounds.push((kind, i));
        bounds.extend(block.arms.iter().copied());
        let body_ends = block
            .arms
            .iter()
            .map(|&(_, at)| at)
            .chain(std::iter::once(block.endif));

        let mut taken = None;
        for (&(kind, at), body_end) in bounds.iter().zip(body_ends) {
            let line = line_end(tokens, at);
            if self.is_taken(kind, &tokens[at..line]) {
                taken = Some((line, body_end));
                break;
            }
        }

        if let Some((lo, hi)) = taken {
            self.process(&tokens[lo..hi], node, out)?;
        }
        Ok(line_end(tokens, block.endif))
    }

    /// Evaluates one arm's directive line, `#` included.
    fn is_taken(&mut self, kind: Directive, line: &[Token]) -> bool {
        let condition = line.get(2..).unwrap_or_default();
        match kind {
            Directive::Ifdef | Directive::Ifndef => {
                let Some(name) = condition.first() else {
                    self.report(line[1].loc, &Error::MissingMacroName);
                    return false;
                };
                self.defines.contains_key(&name.text) == (kind == Directive::Ifdef)
            }
            Directive::Else => true,
            _ => self.evaluate_condition(line[1].loc, condition),
        }
    }

    /// Evaluates an `#if` or `#elif` expression. Not implemented yet: reports a
    /// warning and takes the branch as false.
    fn evaluate_condition(&mut self, loc: Location, condition: &[Token]) -> bool {
        tracing::debug!(condition = %merge_text(condition), "skipping #if condition");
        self.report(loc, &Error::ConditionNotImplemented);
        false
    }

    fn report(&mut self, loc: Location, error: &Error) {
        self.session.diagnostics.report(loc, error);
    }
}

/// Clones a macro body for use at `site`, moving it to the use location so
/// that line-based checks further down keep working.
fn expand<'t>(body: &'t [Token], site: &'t Token) -> impl Iterator<Item = Token> + 't {
    let last = body.len().saturating_sub(1);
    body.iter().enumerate().map(move |(n, token)| Token {
        loc: site.loc,
        trailing_space: if n == last {
            site.trailing_space
        } else {
            token.trailing_space
        },
        ..token.clone()
    })
}

fn is_macro_name(token: &Token) -> bool {
    !token.is_string
        && token.text.starts_with(|c: char| c == '_' || c.is_alphabetic())
}

/// Index of the first token that is not on the same line as `tokens[i]`.
fn line_end(tokens: &[Token], i: usize) -> usize {
    let loc = tokens[i].loc;
    tokens[i..]
        .iter()
        .position(|t| !t.loc.same_line(loc))
        .map_or(tokens.len(), |n| i + n)
}

/// The directive name if a directive starts at `i`.
fn directive_at(tokens: &[Token], i: usize) -> Option<Directive> {
    let hash = &tokens[i];
    if hash.is_string || !hash.is_punct(Punct::Hash) {
        return None;
    }
    let name = tokens.get(i + 1).filter(|name| name.loc.same_line(hash.loc))?;
    DIRECTIVES.get(name.text.as_str()).copied()
}

/// Finds the `#elif`/`#else` arms and the `#endif` of the conditional whose
/// body starts at `start`, skipping nested conditionals.
fn find_conditional(tokens: &[Token], start: usize) -> Option<Conditional> {
    let mut depth = 0_usize;
    let mut arms = Vec::new();
    for i in start..tokens.len() {
        match directive_at(tokens, i) {
            Some(Directive::If | Directive::Ifdef | Directive::Ifndef) => depth += 1,
            Some(Directive::Endif) if depth == 0 => return Some(Conditional { arms, endif: i }),
            Some(Directive::Endif) => depth -= 1,
            Some(arm @ (Directive::Elif | Directive::Else)) if depth == 0 => arms.push((arm, i)),
            _ => {}
        }
    }
    None
}

/// Joins token text back into a line, honoring the spacing flags.
fn merge_text(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push_str(&token.text);
        if token.trailing_space {
            out.push(' ');
        }
    }
    out.truncate(out.trim_end().len());
    out
}

/// Removes line and block comments. Markers are matched against runs of
/// adjacent tokens, since the lexer splits `//` into two `/`.
fn strip_comments(lang: &Language, tokens: Vec<Token>) -> Vec<Token> {
    let line = lang.line_comment();
    let (block_start, block_end) = lang.block_comment();

    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if marker_at(&tokens, i, line).is_some() {
            i = line_end(&tokens, i);
        } else if let Some(len) = marker_at(&tokens, i, block_start) {
            let mut j = i + len;
            i = loop {
                if j >= tokens.len() {
                    break tokens.len();
                }
                if let Some(len) = marker_at(&tokens, j, block_end) {
                    break j + len;
                }
                j += 1;
            };
        } else {
            out.push(tokens[i].clone());
            i += 1;
        }
    }
    out
}

/// Whether the adjacent tokens starting at `i` spell `marker`. Returns how
/// many tokens the marker touches.
fn marker_at(tokens: &[Token], i: usize, marker: &str) -> Option<usize> {
    if marker.is_empty() {
        return None;
    }
    let mut rest = marker;
    for (n, token) in tokens[i..].iter().enumerate() {
        if token.is_string || (n > 0 && !tokens[i + n - 1].is_adjacent_to(token)) {
            return None;
        }
        if rest.len() <= token.text.len() {
            return token.text.starts_with(rest).then_some(n + 1);
        }
        rest = rest.strip_prefix(token.text.as_str())?;
    }
    None
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("`#` is not followed by a directive")]
    NoDirective,
    #[error("unknown directive `{0}`")]
    UnknownDirective(String),
    #[error("cannot find include file `{0}`")]
    IncludeFileNotFound(String),
    #[error("expected a file name after `#include`, found `{0}`")]
    IncludeUnknownSymbol(String),
    #[error("`#include` is missing its file name")]
    IncludeMissingFile,
    #[error("`{0}` includes itself")]
    IncludeRecursion(String),
    #[error("{0}")]
    ErrorDirective(String),
    #[error("unknown pragma `{0}`")]
    UnknownPragma(String),
    #[error("macro `{0}` redefined")]
    MacroRedefined(String),
    #[error("expected a macro name")]
    MissingMacroName,
    #[error("`#{0}` without a matching `#if`")]
    UnmatchedConditional(String),
    #[error("missing `#endif`")]
    UnterminatedConditional,
    #[error("`#if` conditions are not evaluated yet, taking the branch as false")]
    ConditionNotImplemented,
    #[error("cannot read `{path}`: {message}")]
    Io { path: String, message: String },
}

impl Coded for Error {
    fn code(&self) -> u32 {
        diagnostics::PREPROCESSOR
            | match self {
                Error::NoDirective => 1,
                Error::UnknownDirective(_) => 2,
                Error::IncludeFileNotFound(_) => 3,
                Error::IncludeUnknownSymbol(_) => 4,
                Error::IncludeMissingFile => 5,
                Error::IncludeRecursion(_) => 6,
                Error::ErrorDirective(_) => 7,
                Error::UnknownPragma(_) => 8,
                Error::MacroRedefined(_) => 9,
                Error::MissingMacroName => 10,
                Error::UnmatchedConditional(_) => 11,
                Error::UnterminatedConditional => 12,
                Error::ConditionNotImplemented => 13,
                Error::Io { .. } => 14,
            }
    }

    fn severity(&self) -> Severity {
        match self {
            Error::UnknownPragma(_) | Error::MacroRedefined(_) | Error::ConditionNotImplemented => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryLoader;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    struct Run {
        output: std::result::Result<String, String>,
        codes: Vec<u32>,
    }

    fn run(loader: &MemoryLoader, include_dirs: &[&str], main: &str) -> Run {
        let lang = Language::default();
        let mut session = Session::new(&lang);
        let file = session.file(main);
        let src = loader.load(Path::new(main)).unwrap();
        let tokens = lexer::lex_in_new(&mut session, file, &src);
        let dirs: Vec<PathBuf> = include_dirs.iter().map(PathBuf::from).collect();

        let output = preprocess(&mut session, loader, &dirs, Path::new(main), tokens)
            .map(|tokens| {
                tokens
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .map_err(|e| e.inner.to_string());
        let codes = session.diagnostics.iter().map(|d| d.code).collect();
        Run { output, codes }
    }

    fn run_main(src: &str) -> Run {
        run(&MemoryLoader::new().with("main.horse", src), &[], "main.horse")
    }

    const P: u32 = diagnostics::PREPROCESSOR;

    #[test]
    fn comments_are_stripped() {
        let run = run_main(indoc! {"
            int a; // trailing / comment
            /* spans
               lines */ int b;
            int c = 4 / 2;
        "});
        assert_eq!(run.output.unwrap(), "int a ; int b ; int c = 4 / 2 ;");
        assert!(run.codes.is_empty(), "{:?}", run.codes);
    }

    #[test]
    fn defines_expand_once() {
        let run = run_main(indoc! {"
            #define N 4
            #define M N
            int x = M;
            int y = N;
        "});
        assert_eq!(run.output.unwrap(), "int x = N ; int y = 4 ;");
    }

    #[test]
    fn macro_inside_string_is_kept() {
        let run = run_main("#define N 4\nx = \"N\";");
        assert_eq!(run.output.unwrap(), "x = N ;");
    }

    #[test]
    fn redefinition_warns_and_replaces() {
        let run = run_main("#define N 1\n#define N 2\nint x = N;");
        assert_eq!(run.output.unwrap(), "int x = 2 ;");
        assert_eq!(run.codes, [P | 9]);
    }

    #[test]
    fn ifdef_else_endif() {
        let run = run_main(indoc! {"
            #define A
            #ifdef A
            int a;
            #else
            int b;
            #endif
            #ifndef A
            int c;
            #endif
        "});
        assert_eq!(run.output.unwrap(), "int a ;");
        assert!(run.codes.is_empty(), "{:?}", run.codes);
    }

    #[test]
    fn nested_conditionals() {
        let run = run_main(indoc! {"
            #ifdef X
            #ifdef Y
            int a;
            #endif
            int b;
            #else
            #ifndef Y
            int c;
            #endif
            #endif
            int d;
        "});
        assert_eq!(run.output.unwrap(), "int c ; int d ;");
    }

    #[test]
    fn if_conditions_take_the_else_branch() {
        let run = run_main(indoc! {"
            #if 1
            int a;
            #elif 2
            int b;
            #else
            int c;
            #endif
        "});
        assert_eq!(run.output.unwrap(), "int c ;");
        assert_eq!(run.codes, [P | 13, P | 13]);
    }

    #[test]
    fn stray_and_unterminated_conditionals() {
        let run = run_main("int a;\n#endif\nint b;");
        assert_eq!(run.output.unwrap(), "int a ; int b ;");
        assert_eq!(run.codes, [P | 11]);

        let run = run_main("#ifdef A\nint a;");
        assert_eq!(run.output.unwrap(), "");
        assert_eq!(run.codes, [P | 12]);
    }

    #[test]
    fn error_directive_is_fatal() {
        let run = run_main("int a;\n#error stop here\nint b;");
        assert_eq!(run.output.unwrap_err(), "stop here");
        assert_eq!(run.codes, [P | 7]);
    }

    #[test]
    fn unknown_directive_and_pragma() {
        let run = run_main("#frobnicate\n#pragma optimize\n#\nint a;");
        assert_eq!(run.output.unwrap(), "int a ;");
        assert_eq!(run.codes, [P | 2, P | 8, P | 1]);
    }

    #[test]
    fn include_local_and_from_dirs() {
        let loader = MemoryLoader::new()
            .with("shaders/main.horse", "#include \"common.h\"\n#include <lib.h>\nint m;")
            .with("shaders/common.h", "int common;")
            .with("inc/lib.h", "int lib;");
        let run = run(&loader, &["inc"], "shaders/main.horse");
        assert_eq!(run.output.unwrap(), "int common ; int lib ; int m ;");
        assert!(run.codes.is_empty(), "{:?}", run.codes);
    }

    #[test]
    fn include_not_found_continues() {
        let run = run_main("#include \"nope.h\"\nint a;");
        assert_eq!(run.output.unwrap(), "int a ;");
        assert_eq!(run.codes, [P | 3]);
    }

    #[test]
    fn include_cycle_is_reported() {
        let loader = MemoryLoader::new()
            .with("main.horse", "#include \"a.h\"\nint m;")
            .with("a.h", "#include \"b.h\"\nint a;")
            .with("b.h", "#include \"a.h\"\nint b;");
        let run = run(&loader, &[], "main.horse");
        assert_eq!(run.output.unwrap(), "int b ; int a ; int m ;");
        assert_eq!(run.codes, [P | 6]);
    }

    #[test]
    fn pragma_once_skips_second_include() {
        let loader = MemoryLoader::new()
            .with("main.horse", "#include \"a.h\"\n#include \"./a.h\"\nint m;")
            .with("a.h", "#pragma once\nint a;");
        let run = run(&loader, &[], "main.horse");
        assert_eq!(run.output.unwrap(), "int a ; int m ;");
        assert!(run.codes.is_empty(), "{:?}", run.codes);
    }

    #[test]
    fn defines_cross_includes() {
        let loader = MemoryLoader::new()
            .with("main.horse", "#include \"defs.h\"\nint x = SIZE;")
            .with("defs.h", "#define SIZE 16");
        let run = run(&loader, &[], "main.horse");
        assert_eq!(run.output.unwrap(), "int x = 16 ;");
    }
}
