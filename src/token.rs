use std::fmt;

use crate::{
    language::{Keyword, OperatorId, Primitive, Punct},
    util::intern::Interned,
};

/// Interned path of a source file.
pub type FileId = Interned<str>;

#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw spelling. For string and char literals this is the decoded body,
    /// without quotes.
    pub text: String,
    pub loc: Location,
    /// Set when the token was followed by a space, which is what keeps `+ +`
    /// from fusing into `++`.
    pub trailing_space: bool,
    /// Set for tokens produced from a quoted span (string, char or include
    /// header name).
    pub is_string: bool,
}

impl Token {
    pub fn is_punct(&self, punct: Punct) -> bool {
        self.kind == TokenKind::Punct(punct)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn operator(&self) -> Option<OperatorId> {
        match self.kind {
            TokenKind::Operator(id) => Some(id),
            _ => None,
        }
    }

    /// Whether `next` directly follows `self` on the same line, with no space
    /// in between.
    pub fn is_adjacent_to(&self, next: &Token) -> bool {
        !self.trailing_space && self.loc.same_line(next.loc)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {:?}, {})", self.kind, self.text, self.loc)?;
        if self.trailing_space {
            write!(f, " +space")?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Not classified yet. No token leaves the lexer with this kind.
    Unknown,
    Punct(Punct),
    Keyword(Keyword),
    Primitive(Primitive),
    Operator(OperatorId),
    Identifier,
    Literal(LiteralKind),
    /// The `file.h` of `#include <file.h>`.
    HeaderName,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    Int,
    Float,
    /// Typed as a byte.
    Char,
    String,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: FileId,
    /// 1-based.
    pub line: u32,
    /// 1-based, in bytes.
    pub column: u32,
}

impl Location {
    pub fn new(file: FileId, line: u32, column: u32) -> Location {
        Location { file, line, column }
    }

    pub fn same_line(self, other: Location) -> bool {
        self.file == other.file && self.line == other.line
    }

    pub fn wrap<T>(self, inner: T) -> Located<T> {
        Located { loc: self, inner }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({self})")
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Located<T> {
    pub loc: Location,
    pub inner: T,
}

impl<T> Located<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Located<U> {
        Located {
            loc: self.loc,
            inner: f(self.inner),
        }
    }
}
