use thiserror::Error;

use crate::{
    diagnostics::{self, Coded, Severity},
    language::{Escape, Language, OperatorId},
    session::Session,
    token::{FileId, LiteralKind, Location, Token, TokenKind},
};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 8_192;

/// Lexes the provided string, producing the tokens into the provided buffer.
///
/// Lexical errors are reported to the session and never stop the lexer.
pub fn lex(session: &mut Session<'_>, file: FileId, src: &str, tokens: &mut Vec<Token>) {
    assert_eq!(tokens.len(), 0, "must pass clean tokens buffer");
    let pieces = Splitter::new(session, file, src).split();
    merge_spans(session, pieces, tokens);
    classify(session.lang, tokens);
}

/// A convenience function that allocates a new buffer per lexed input and
/// returns it.
pub fn lex_in_new(session: &mut Session<'_>, file: FileId, src: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    lex(session, file, src, &mut tokens);
    tokens
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Idle,
    String,
    Char,
    Include,
    LineComment,
    BlockComment,
}

impl State {
    fn is_quoted(self) -> bool {
        matches!(self, State::String | State::Char | State::Include)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mark {
    Text,
    Open(State),
    Close,
}

/// A raw piece of text between two boundaries, or a boundary character.
#[derive(Debug)]
struct Piece {
    text: String,
    loc: Location,
    trailing_space: bool,
    mark: Mark,
}

/// First pass: splits the source on delimiters and newlines, tracking quoted
/// spans so that their contents survive untouched.
struct Splitter<'s, 'lang, 'src> {
    session: &'s mut Session<'lang>,
    file: FileId,
    src: &'src str,
    state: State,
    /// Index of the piece that opened the current quoted span.
    span_opener: usize,
    /// Set right after `# include`, so `<` opens a header name.
    include_armed: bool,
    /// The previous character was an unescaped escape character.
    escaping: bool,
    /// Where the current block comment's opening marker ends.
    comment_body: usize,
    line: u32,
    line_start: usize,
    pieces: Vec<Piece>,
}

impl<'s, 'lang, 'src> Splitter<'s, 'lang, 'src> {
    fn new(session: &'s mut Session<'lang>, file: FileId, src: &'src str) -> Self {
        Splitter {
            session,
            file,
            src,
            state: State::Idle,
            span_opener: 0,
            include_armed: false,
            escaping: false,
            comment_body: 0,
            line: 1,
            line_start: 0,
            pieces: Vec::with_capacity(src.len() / 3),
        }
    }

    fn split(mut self) -> Vec<Piece> {
        let lang = self.session.lang;
        let mut last = 0;
        for (i, c) in self.src.char_indices() {
            let escaped = self.escaping;
            self.escaping = self.state.is_quoted() && c == lang.escape_char() && !escaped;

            self.track_comments(i, c);

            if c != '\n' && !lang.is_delimiter(c) {
                continue;
            }
            self.text(last, i);
            last = i + c.len_utf8();

            if c == '\n' {
                self.newline(i);
            } else {
                self.boundary(i, c, escaped);
            }
        }
        self.text(last, self.src.len());
        self.finish();
        self.pieces
    }

    fn track_comments(&mut self, i: usize, c: char) {
        let lang = self.session.lang;
        let rest = &self.src[i..];
        match self.state {
            State::Idle => {
                let (block_start, _) = lang.block_comment();
                if rest.starts_with(lang.line_comment()) {
                    self.state = State::LineComment;
                } else if rest.starts_with(block_start) {
                    self.state = State::BlockComment;
                    self.span_opener = self.pieces.len();
                    self.comment_body = i + block_start.len();
                }
            }
            State::BlockComment => {
                let (_, block_end) = lang.block_comment();
                let end = i + c.len_utf8();
                if end >= self.comment_body + block_end.len()
                    && self.src[..end].ends_with(block_end)
                {
                    self.state = State::Idle;
                }
            }
            _ => {}
        }
    }

    fn location(&self, offset: usize) -> Location {
        let column = u32::try_from(offset - self.line_start + 1).unwrap_or(u32::MAX);
        Location::new(self.file, self.line, column)
    }

    /// Emits the text strictly between two boundaries, without tabs.
    fn text(&mut self, lo: usize, hi: usize) {
        if lo >= hi {
            return;
        }
        let raw = &self.src[lo..hi];
        let text: String = raw.chars().filter(|&c| c != '\t' && c != '\r').collect();
        if text.is_empty() {
            return;
        }
        let leading = raw.len() - raw.trim_start_matches(['\t', '\r']).len();
        let loc = self.location(lo + leading);
        self.push(text, loc, Mark::Text);
    }

    fn boundary(&mut self, i: usize, c: char, escaped: bool) {
        let lang = self.session.lang;
        let (string_start, string_end) = lang.string_quotes();
        let (char_start, char_end) = lang.char_quotes();
        let (include_start, include_end) = lang.include_brackets();

        let mark = match self.state {
            State::Idle if c == string_start => Mark::Open(State::String),
            State::Idle if c == char_start => Mark::Open(State::Char),
            State::Idle if c == include_start && self.include_armed => Mark::Open(State::Include),
            State::String if c == string_end && !escaped => Mark::Close,
            State::Char if c == char_end && !escaped => Mark::Close,
            State::Include if c == include_end => Mark::Close,
            _ => Mark::Text,
        };

        let loc = self.location(i);
        match mark {
            Mark::Open(state) => {
                self.state = state;
                self.span_opener = self.pieces.len();
            }
            Mark::Close => self.state = State::Idle,
            Mark::Text if c == ' ' && !self.state.is_quoted() => {
                // Spaces only survive as the previous token's flag.
                if let Some(last) = self.pieces.last_mut() {
                    if last.loc.same_line(loc) {
                        last.trailing_space = true;
                    }
                }
                return;
            }
            Mark::Text => {}
        }
        self.push(c.to_string(), loc, mark);
    }

    fn push(&mut self, text: String, loc: Location, mark: Mark) {
        self.include_armed = text == "include"
            && mark == Mark::Text
            && self.state == State::Idle
            && self
                .pieces
                .last()
                .is_some_and(|prev| prev.text == "#" && prev.loc.same_line(loc));
        self.pieces.push(Piece {
            text,
            loc,
            trailing_space: false,
            mark,
        });
    }

    fn newline(&mut self, i: usize) {
        match self.state {
            State::LineComment => self.state = State::Idle,
            state if state.is_quoted() => self.abandon_span(),
            _ => {}
        }
        self.include_armed = false;
        self.escaping = false;
        self.line += 1;
        self.line_start = i + 1;
    }

    fn finish(&mut self) {
        match self.state {
            state if state.is_quoted() => self.abandon_span(),
            State::BlockComment => {
                let loc = self
                    .pieces
                    .get(self.span_opener)
                    .map_or_else(|| self.location(self.src.len()), |p| p.loc);
                self.session
                    .diagnostics
                    .report(loc, &Error::UnterminatedComment);
            }
            _ => {}
        }
    }

    /// Reports an unclosed quoted span and turns its pieces back into plain
    /// text so lexing goes on.
    fn abandon_span(&mut self) {
        let Some(opener) = self.pieces.get_mut(self.span_opener) else {
            return;
        };
        let quote = opener.text.chars().next().unwrap_or_default();
        opener.mark = Mark::Text;
        let loc = opener.loc;
        self.session
            .diagnostics
            .report(loc, &Error::MissingClosingDelimiter(quote));
        self.state = State::Idle;
    }
}

/// Second pass: collapses each quoted span into a single literal token and
/// decodes its escape sequences.
fn merge_spans(session: &mut Session<'_>, pieces: Vec<Piece>, tokens: &mut Vec<Token>) {
    let mut pieces = pieces.into_iter();
    while let Some(piece) = pieces.next() {
        let Mark::Open(state) = piece.mark else {
            tokens.push(Token {
                kind: TokenKind::Unknown,
                text: piece.text,
                loc: piece.loc,
                trailing_space: piece.trailing_space,
                is_string: false,
            });
            continue;
        };

        let mut body = String::new();
        let mut trailing_space = false;
        for inner in pieces.by_ref() {
            if inner.mark == Mark::Close {
                trailing_space = inner.trailing_space;
                break;
            }
            body.push_str(&inner.text);
        }

        let loc = piece.loc;
        let (kind, text) = match state {
            State::String => (TokenKind::Literal(LiteralKind::String), unescape(session, &body, loc)),
            State::Char => {
                let text = unescape(session, &body, loc);
                let count = text.chars().count();
                if count > 1 {
                    session
                        .diagnostics
                        .report(loc, &Error::CharLiteralTooLong(count));
                }
                (TokenKind::Literal(LiteralKind::Char), text)
            }
            _ => (TokenKind::HeaderName, body),
        };
        tokens.push(Token {
            kind,
            text,
            loc,
            trailing_space,
            is_string: true,
        });
    }
}

fn unescape(session: &mut Session<'_>, body: &str, loc: Location) -> String {
    let lang = session.lang;
    let escape_char = lang.escape_char();
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != escape_char {
            out.push(c);
            continue;
        }
        let Some(signature) = chars.next() else {
            out.push(c);
            break;
        };
        match lang.escape(signature) {
            Some(Escape::Byte(byte)) => out.push(char::from(byte)),
            Some(Escape::Numeric { radix }) => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while let Some(digit) = chars.peek().and_then(|d| d.to_digit(radix)) {
                    chars.next();
                    digits += 1;
                    value = value.saturating_mul(radix).saturating_add(digit);
                }
                if digits == 0 {
                    let error = Error::EscapeWithoutDigits(signature);
                    session.diagnostics.report(loc, &error);
                    out.push(escape_char);
                    out.push(signature);
                } else if let Ok(byte) = u8::try_from(value) {
                    out.push(char::from(byte));
                } else {
                    session
                        .diagnostics
                        .report(loc, &Error::IntLiteralTooBig(value));
                    out.push(char::REPLACEMENT_CHARACTER);
                }
            }
            None => {
                session
                    .diagnostics
                    .report(loc, &Error::UnknownEscape(signature));
                out.push(escape_char);
                out.push(signature);
            }
        }
    }
    out
}

/// Classification passes, in order: punctuation, literal vs identifier,
/// keywords, primitives, operators (with compound fusion), float literals.
fn classify(lang: &Language, tokens: &mut Vec<Token>) {
    let merged = classify_punctuation(lang, std::mem::take(tokens));
    *tokens = merged;

    for token in tokens.iter_mut().filter(|t| t.kind == TokenKind::Unknown) {
        token.kind = if token.text.starts_with(|c: char| c.is_ascii_digit()) {
            TokenKind::Literal(LiteralKind::Int)
        } else {
            TokenKind::Identifier
        };
    }

    for token in tokens.iter_mut().filter(|t| t.kind == TokenKind::Identifier) {
        if let Some(keyword) = lang.keyword(&token.text) {
            token.kind = TokenKind::Keyword(keyword);
        } else if let Some(primitive) = lang.primitive(&token.text) {
            token.kind = TokenKind::Primitive(primitive);
        }
    }

    let fused = classify_operators(lang, std::mem::take(tokens));
    *tokens = merge_floats(fused);
}

fn classify_punctuation(lang: &Language, tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    'tokens: while i < tokens.len() {
        if tokens[i].kind == TokenKind::Unknown {
            for (spelling, punct) in lang.punctuation() {
                let Some(len) = match_spelling(&tokens[i..], spelling) else {
                    continue;
                };
                let mut token = tokens[i].clone();
                token.kind = TokenKind::Punct(*punct);
                if len > 1 {
                    token.text = spelling.to_string();
                    token.trailing_space = tokens[i + len - 1].trailing_space;
                }
                out.push(token);
                i += len;
                continue 'tokens;
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

/// Matches `spelling` either as a whole token or as a run of adjacent
/// single-character tokens. Returns how many tokens it spans.
fn match_spelling(tokens: &[Token], spelling: &str) -> Option<usize> {
    let first = tokens.first()?;
    if first.text == spelling {
        return Some(1);
    }
    let len = spelling.chars().count();
    if len < 2 || tokens.len() < len {
        return None;
    }
    let run = &tokens[..len];
    let chars_match = run.iter().zip(spelling.chars()).all(|(t, c)| {
        t.kind == TokenKind::Unknown && t.text.len() == c.len_utf8() && t.text.starts_with(c)
    });
    let adjacent = run.windows(2).all(|w| w[0].is_adjacent_to(&w[1]));
    (chars_match && adjacent).then_some(len)
}

/// Classifies operators, fusing an operator with the next one into a compound
/// operator when the first has no trailing space and the concatenated spelling
/// is itself an operator (`+` `+` is `++`, `+` `=` is `+=`).
fn classify_operators(lang: &Language, tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    // Whether the last pushed token came out of a fusion, so `+++` lexes as
    // `++` followed by `+`.
    let mut last_fused = false;

    for mut token in tokens {
        if token.kind != TokenKind::Identifier {
            out.push(token);
            last_fused = false;
            continue;
        }
        let Some(def) = lang.operator_by_spelling(&token.text) else {
            out.push(token);
            last_fused = false;
            continue;
        };
        token.kind = TokenKind::Operator(def.id);

        if !last_fused {
            if let Some(prev) = out.last_mut() {
                let compound = format!("{}{}", prev.text, token.text);
                let fusable = prev.operator().is_some() && prev.is_adjacent_to(&token);
                if let Some(fused) = lang.operator_by_spelling(&compound).filter(|_| fusable) {
                    prev.kind = TokenKind::Operator(fused.id);
                    prev.text = compound;
                    prev.trailing_space = token.trailing_space;
                    last_fused = true;
                    continue;
                }
            }
        }
        out.push(token);
        last_fused = false;
    }
    out
}

/// Merges `1` `.` `5` (or `1` `.` `f`) into a single float literal.
fn merge_floats(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();

    while let Some(mut token) = iter.next() {
        if token.kind != TokenKind::Literal(LiteralKind::Int) {
            out.push(token);
            continue;
        }
        let is_dot = |t: &Token| t.operator() == Some(OperatorId::Dot);
        let Some(dot) = iter.next_if(|dot| is_dot(dot) && token.is_adjacent_to(dot)) else {
            out.push(token);
            continue;
        };
        let fraction = iter.next_if(|t| {
            dot.is_adjacent_to(t)
                && (t.kind == TokenKind::Literal(LiteralKind::Int)
                    || (t.kind == TokenKind::Identifier && t.text == "f"))
        });
        match fraction {
            Some(fraction) => {
                token.text.push_str(&dot.text);
                token.text.push_str(&fraction.text);
                token.kind = TokenKind::Literal(LiteralKind::Float);
                token.trailing_space = fraction.trailing_space;
                out.push(token);
            }
            None => {
                out.push(token);
                out.push(dot);
            }
        }
    }
    out
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("missing closing `{0}`")]
    MissingClosingDelimiter(char),
    #[error("unknown escape sequence `\\{0}`")]
    UnknownEscape(char),
    #[error("escape sequence `\\{0}` has no digits")]
    EscapeWithoutDigits(char),
    #[error("escaped value {0} does not fit in a byte")]
    IntLiteralTooBig(u32),
    #[error("character literal holds {0} characters")]
    CharLiteralTooLong(usize),
    #[error("unterminated block comment")]
    UnterminatedComment,
}

impl Coded for Error {
    fn code(&self) -> u32 {
        diagnostics::LEXER
            | match self {
                Error::MissingClosingDelimiter(_) => 1,
                Error::UnknownEscape(_) => 2,
                Error::EscapeWithoutDigits(_) => 3,
                Error::IntLiteralTooBig(_) => 4,
                Error::CharLiteralTooLong(_) => 5,
                Error::UnterminatedComment => 6,
            }
    }

    fn severity(&self) -> Severity {
        match self {
            Error::UnknownEscape(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{Keyword, Primitive, Punct};
    use pretty_assertions::assert_eq;

    fn lex_str(lang: &Language, src: &str) -> (Vec<Token>, Vec<(u32, String)>) {
        let mut session = Session::new(lang);
        let file = session.file("test.horse");
        let tokens = lex_in_new(&mut session, file, src);
        let diagnostics = session
            .diagnostics
            .iter()
            .map(|d| (d.code, d.message.clone()))
            .collect();
        (tokens, diagnostics)
    }

    fn kinds(tokens: &[Token]) -> Vec<(TokenKind, &str)> {
        tokens.iter().map(|t| (t.kind, t.text.as_str())).collect()
    }

    /// Rebuilds the source from the tokens' raw text and spacing flags.
    fn rejoin(tokens: &[Token]) -> String {
        let mut out = String::new();
        let mut line = 1;
        for token in tokens {
            while line < token.loc.line {
                out.push('\n');
                line += 1;
            }
            out.push_str(&token.text);
            if token.trailing_space {
                out.push(' ');
            }
        }
        out
    }

    macro_rules! cases {
        ($($src:expr => [$(($kind:expr, $text:expr)),* $(,)?]),* $(,)?) => {{
            &[$(($src, vec![$(($kind, $text)),*])),*]
        }};
    }

    #[test]
    fn tests_with_kinds() {
        use LiteralKind as L;
        use OperatorId as O;
        use TokenKind as K;

        let lang = Language::default();
        let cases: &[(&str, Vec<(TokenKind, &str)>)] = cases! {
            "int x = 1 + 2;" => [
                (K::Primitive(Primitive::Int), "int"),
                (K::Identifier, "x"),
                (K::Operator(O::Assign), "="),
                (K::Literal(L::Int), "1"),
                (K::Operator(O::Add), "+"),
                (K::Literal(L::Int), "2"),
                (K::Punct(Punct::Semicolon), ";"),
            ],
            "a++b" => [
                (K::Identifier, "a"),
                (K::Operator(O::PostIncrement), "++"),
                (K::Identifier, "b"),
            ],
            "a+ +b" => [
                (K::Identifier, "a"),
                (K::Operator(O::Add), "+"),
                (K::Operator(O::Add), "+"),
                (K::Identifier, "b"),
            ],
            "x+=1" => [
                (K::Identifier, "x"),
                (K::Operator(O::AddAssign), "+="),
                (K::Literal(L::Int), "1"),
            ],
            "x+ =1" => [
                (K::Identifier, "x"),
                (K::Operator(O::Add), "+"),
                (K::Operator(O::Assign), "="),
                (K::Literal(L::Int), "1"),
            ],
            "a+++b" => [
                (K::Identifier, "a"),
                (K::Operator(O::PostIncrement), "++"),
                (K::Operator(O::Add), "+"),
                (K::Identifier, "b"),
            ],
            "i<=j==k" => [
                (K::Identifier, "i"),
                (K::Operator(O::LessEqual), "<="),
                (K::Identifier, "j"),
                (K::Operator(O::Equal), "=="),
                (K::Identifier, "k"),
            ],
            "1.5 2.f 3. x.y" => [
                (K::Literal(L::Float), "1.5"),
                (K::Literal(L::Float), "2.f"),
                (K::Literal(L::Int), "3"),
                (K::Operator(O::Dot), "."),
                (K::Identifier, "x"),
                (K::Operator(O::Dot), "."),
                (K::Identifier, "y"),
            ],
            "layout(location=0) in vec3 pos;" => [
                (K::Keyword(Keyword::Layout), "layout"),
                (K::Punct(Punct::LParen), "("),
                (K::Identifier, "location"),
                (K::Operator(O::Assign), "="),
                (K::Literal(L::Int), "0"),
                (K::Punct(Punct::RParen), ")"),
                (K::Keyword(Keyword::In), "in"),
                (K::Primitive(Primitive::Vec3), "vec3"),
                (K::Identifier, "pos"),
                (K::Punct(Punct::Semicolon), ";"),
            ],
        };

        for (src, expected) in cases {
            let (tokens, diagnostics) = lex_str(&lang, src);
            assert_eq!(&kinds(&tokens), expected, "for {src:?}");
            assert!(diagnostics.is_empty(), "for {src:?}: {diagnostics:?}");
        }
    }

    #[test]
    fn every_compound_operator_fuses_only_without_space() {
        let lang = Language::default();
        let compounds = lang
            .operators()
            .iter()
            .filter(|def| def.spelling.chars().count() == 2)
            .filter(|def| def.spelling.chars().all(|c| lang.is_delimiter(c)));

        for def in compounds {
            let mut chars = def.spelling.chars();
            let (first, second) = (chars.next().unwrap(), chars.next().unwrap());

            let (tokens, _) = lex_str(&lang, &format!("a {first}{second} b"));
            assert_eq!(tokens.len(), 3, "{} should fuse", def.spelling);
            assert_eq!(tokens[1].text, &*def.spelling);

            let (tokens, _) = lex_str(&lang, &format!("a {first} {second} b"));
            assert_eq!(tokens.len(), 4, "{} should not fuse", def.spelling);
        }
    }

    #[test]
    fn string_and_char_literals() {
        let lang = Language::default();
        let (tokens, diagnostics) = lex_str(&lang, r#"s = "a\nb" + "\x41 \"q\"" + 'c' + '\n';"#);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let literals: Vec<_> = tokens
            .iter()
            .filter(|t| t.is_string)
            .map(|t| (t.kind, t.text.as_str()))
            .collect();
        assert_eq!(
            literals,
            [
                (TokenKind::Literal(LiteralKind::String), "a\nb"),
                (TokenKind::Literal(LiteralKind::String), "A \"q\""),
                (TokenKind::Literal(LiteralKind::Char), "c"),
                (TokenKind::Literal(LiteralKind::Char), "\n"),
            ]
        );
    }

    #[test]
    fn string_keeps_delimiters_and_spaces() {
        let lang = Language::default();
        let (tokens, _) = lex_str(&lang, r#""a + b;  (c)""#);
        assert_eq!(kinds(&tokens), [(TokenKind::Literal(LiteralKind::String), "a + b;  (c)")]);
    }

    #[test]
    fn escape_errors() {
        let lang = Language::default();

        let (_, diagnostics) = lex_str(&lang, r#""\x141""#);
        assert_eq!(
            diagnostics,
            [(diagnostics::LEXER | 4, "escaped value 321 does not fit in a byte".to_owned())]
        );

        let (tokens, diagnostics) = lex_str(&lang, r#""\xzz""#);
        assert_eq!(tokens[0].text, "\\xzz");
        assert_eq!(
            diagnostics,
            [(diagnostics::LEXER | 3, "escape sequence `\\x` has no digits".to_owned())]
        );

        let (tokens, diagnostics) = lex_str(&lang, r#""\q""#);
        assert_eq!(tokens[0].text, "\\q");
        assert_eq!(diagnostics[0].0, diagnostics::LEXER | 2);
    }

    #[test]
    fn char_literal_too_long() {
        let lang = Language::default();
        let (tokens, diagnostics) = lex_str(&lang, "'ab'");
        assert_eq!(tokens.len(), 1);
        assert_eq!(
            diagnostics,
            [(diagnostics::LEXER | 5, "character literal holds 2 characters".to_owned())]
        );
    }

    #[test]
    fn unterminated_string_reports_at_start_and_continues() {
        let lang = Language::default();
        let (tokens, diagnostics) = lex_str(&lang, "x = \"abc;\nint y;");
        assert_eq!(
            diagnostics,
            [(diagnostics::LEXER | 1, "missing closing `\"`".to_owned())]
        );
        let last: Vec<_> = kinds(&tokens).into_iter().rev().take(3).collect();
        assert_eq!(
            last,
            [
                (TokenKind::Punct(Punct::Semicolon), ";"),
                (TokenKind::Identifier, "y"),
                (TokenKind::Primitive(Primitive::Int), "int"),
            ]
        );
        assert_eq!(tokens.last().unwrap().loc.line, 2);
    }

    #[test]
    fn include_header_name() {
        let lang = Language::default();
        let (tokens, diagnostics) = lex_str(&lang, "#include <lib/common.h>\nbool a = b < c;");
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(
            &kinds(&tokens)[..3],
            [
                (TokenKind::Punct(Punct::Hash), "#"),
                (TokenKind::Identifier, "include"),
                (TokenKind::HeaderName, "lib/common.h"),
            ]
        );
        assert!(tokens.iter().any(|t| t.operator() == Some(OperatorId::Less)));
    }

    #[test]
    fn quotes_inside_comments_do_not_open_literals() {
        let lang = Language::default();
        let (tokens, diagnostics) = lex_str(&lang, "// don't\nint x; /* it's */ int y;");
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert!(tokens.iter().all(|t| !t.is_string));
        assert!(tokens.iter().any(|t| t.text == "y"));
    }

    #[test]
    fn unterminated_block_comment() {
        let lang = Language::default();
        let (_, diagnostics) = lex_str(&lang, "int x; /* never closed");
        assert_eq!(
            diagnostics,
            [(diagnostics::LEXER | 6, "unterminated block comment".to_owned())]
        );
    }

    #[test]
    fn locations_are_one_based() {
        let lang = Language::default();
        let (tokens, _) = lex_str(&lang, "int x;\n\tfloat y;");
        let locs: Vec<_> = tokens.iter().map(|t| (t.loc.line, t.loc.column)).collect();
        assert_eq!(locs, [(1, 1), (1, 5), (1, 6), (2, 2), (2, 8), (2, 9)]);
    }

    #[test]
    fn keywords_and_primitives() {
        let lang = Language::default();
        let (tokens, _) = lex_str(&lang, "typedef unsigned int uint;");
        assert_eq!(
            kinds(&tokens),
            [
                (TokenKind::Keyword(Keyword::Typedef), "typedef"),
                (TokenKind::Primitive(Primitive::Unsigned), "unsigned"),
                (TokenKind::Primitive(Primitive::Int), "int"),
                (TokenKind::Identifier, "uint"),
                (TokenKind::Punct(Punct::Semicolon), ";"),
            ]
        );
    }

    #[test]
    fn multi_character_punctuation() {
        let lang = Language::builder()
            .delimiters(" :;")
            .punct(":", Punct::Colon)
            .punct("::", Punct::Colon)
            .punct(";", Punct::Semicolon)
            .build()
            .unwrap();
        let (tokens, _) = lex_str(&lang, "a::b : :c;");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["a", "::", "b", ":", ":", "c", ";"]);
    }

    #[test]
    fn round_trip() {
        let lang = Language::default();
        let src = "int x = 1+2;\nvec3 v = vec3(1.0, 2.5f, x);\n// a comment here\nx++;";
        let (tokens, _) = lex_str(&lang, src);
        assert_eq!(rejoin(&tokens), src);

        let (tokens, _) = lex_str(&lang, "float\ty\t=\t1;");
        assert_eq!(rejoin(&tokens), "floaty=1;");
    }
}
