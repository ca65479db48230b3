use std::{collections::HashMap, fmt};

use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    Typedef,
    If,
    Else,
    For,
    While,
    Switch,
    Return,
    Struct,
    Extern,
    Layout,
    In,
    Out,
    UniformBuffer,
    Sampler1D,
    Sampler2D,
    Sampler3D,
}

/// Primitive type spellings. Qualifiers (`const`, `signed`, `unsigned`) live in
/// the same table since they may appear anywhere in a type declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Void,
    Byte,
    Short,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Const,
    Signed,
    Unsigned,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Punct {
    Comma,
    Semicolon,
    Colon,
    Question,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Hash,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperatorId {
    Dot,
    PostIncrement,
    PostDecrement,
    PreIncrement,
    PreDecrement,
    Negate,
    Positive,
    BitNot,
    Not,
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    ShiftLeft,
    ShiftRight,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
}

impl OperatorId {
    pub fn is_assignment(self) -> bool {
        use OperatorId::*;
        matches!(
            self,
            Assign | AddAssign | SubtractAssign | MultiplyAssign | DivideAssign
        )
    }

    pub fn is_increment_or_decrement(self) -> bool {
        use OperatorId::*;
        matches!(
            self,
            PostIncrement | PostDecrement | PreIncrement | PreDecrement
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Associativity {
    LeftToRight,
    RightToLeft,
}

/// Whether an operator requires an operand on a given side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperandKind {
    None,
    Any,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorDef {
    pub id: OperatorId,
    pub spelling: Box<str>,
    pub associativity: Associativity,
    /// Lower binds tighter.
    pub precedence: u8,
    pub left: OperandKind,
    pub right: OperandKind,
}

impl OperatorDef {
    pub fn needs_left(&self) -> bool {
        self.left == OperandKind::Any
    }

    pub fn needs_right(&self) -> bool {
        self.right == OperandKind::Any
    }

    /// Whether `self` reduces before `other` when both compete for the same
    /// operand.
    pub fn binds_before(&self, other: &OperatorDef) -> bool {
        self.precedence < other.precedence
            || (self.precedence == other.precedence
                && other.associativity == Associativity::LeftToRight)
    }
}

impl fmt::Display for OperatorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spelling)
    }
}

/// What an escape signature (the character after the escape character) turns
/// into.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Escape {
    /// Replaced by a fixed byte, such as `\n`.
    Byte(u8),
    /// Followed by digits in the given radix, such as `\x41`.
    Numeric { radix: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LanguageError {
    #[error("empty spelling in the {table} table")]
    EmptySpelling { table: &'static str },
    #[error("duplicate spelling `{spelling}` in the {table} table")]
    DuplicateSpelling {
        table: &'static str,
        spelling: Box<str>,
    },
    #[error("operator `{0}` takes no operands")]
    OperatorWithoutOperands(Box<str>),
    #[error("duplicate escape signature `{0}`")]
    DuplicateEscape(char),
}

/// The lexical and grammatical surface of the language. Immutable once built,
/// so a single instance may be shared by any number of compilations.
#[derive(Debug)]
pub struct Language {
    delimiters: Box<[char]>,
    string_quotes: (char, char),
    char_quotes: (char, char),
    include_brackets: (char, char),
    escape_char: char,
    line_comment: Box<str>,
    block_comment: (Box<str>, Box<str>),
    escapes: HashMap<char, Escape>,
    /// Longest spelling first.
    punctuation: Vec<(Box<str>, Punct)>,
    keywords: HashMap<Box<str>, Keyword>,
    primitives: HashMap<Box<str>, Primitive>,
    operators: Vec<OperatorDef>,
}

impl Language {
    pub fn builder() -> LanguageBuilder {
        LanguageBuilder::default()
    }

    pub fn is_delimiter(&self, c: char) -> bool {
        self.delimiters.contains(&c)
    }

    pub fn string_quotes(&self) -> (char, char) {
        self.string_quotes
    }

    pub fn char_quotes(&self) -> (char, char) {
        self.char_quotes
    }

    pub fn include_brackets(&self) -> (char, char) {
        self.include_brackets
    }

    pub fn escape_char(&self) -> char {
        self.escape_char
    }

    pub fn line_comment(&self) -> &str {
        &self.line_comment
    }

    pub fn block_comment(&self) -> (&str, &str) {
        (&self.block_comment.0, &self.block_comment.1)
    }

    pub fn escape(&self, signature: char) -> Option<Escape> {
        self.escapes.get(&signature).copied()
    }

    pub fn punctuation(&self) -> &[(Box<str>, Punct)] {
        &self.punctuation
    }

    pub fn keyword(&self, spelling: &str) -> Option<Keyword> {
        self.keywords.get(spelling).copied()
    }

    pub fn primitive(&self, spelling: &str) -> Option<Primitive> {
        self.primitives.get(spelling).copied()
    }

    pub fn operators(&self) -> &[OperatorDef] {
        &self.operators
    }

    pub fn operator(&self, id: OperatorId) -> Option<&OperatorDef> {
        self.operators.iter().find(|def| def.id == id)
    }

    /// Returns the entry with the given spelling, preferring the form that
    /// takes a left operand (`-` is a subtraction until context says
    /// otherwise).
    pub fn operator_by_spelling(&self, spelling: &str) -> Option<&OperatorDef> {
        self.resolve_operator(spelling, true)
            .or_else(|| self.operators.iter().find(|def| &*def.spelling == spelling))
    }

    /// Picks the entry for `spelling` given whether an operand precedes it.
    /// This is how `-a` becomes a negation and `a++` a post-increment.
    pub fn resolve_operator(&self, spelling: &str, has_left: bool) -> Option<&OperatorDef> {
        self.operators
            .iter()
            .filter(|def| &*def.spelling == spelling)
            .find(|def| def.needs_left() == has_left)
    }
}

impl Default for Language {
    fn default() -> Self {
        let mut b = Language::builder()
            .delimiters(DEFAULT_DELIMITERS)
            .string_quotes('"', '"')
            .char_quotes('\'', '\'')
            .include_brackets('<', '>')
            .escape_char('\\')
            .comments("//", "/*", "*/");
        for (&signature, &escape) in &DEFAULT_ESCAPES {
            b = b.escape(signature, escape);
        }
        for (spelling, &punct) in &DEFAULT_PUNCTUATION {
            b = b.punct(spelling, punct);
        }
        for (spelling, &keyword) in &DEFAULT_KEYWORDS {
            b = b.keyword(spelling, keyword);
        }
        for (spelling, &primitive) in &DEFAULT_PRIMITIVES {
            b = b.primitive(spelling, primitive);
        }
        for &(id, spelling, associativity, precedence, left, right) in DEFAULT_OPERATORS {
            b = b.operator(OperatorDef {
                id,
                spelling: spelling.into(),
                associativity,
                precedence,
                left,
                right,
            });
        }
        b.build().expect("default language table must be valid")
    }
}

pub struct LanguageBuilder {
    delimiters: Vec<char>,
    string_quotes: (char, char),
    char_quotes: (char, char),
    include_brackets: (char, char),
    escape_char: char,
    line_comment: Box<str>,
    block_comment: (Box<str>, Box<str>),
    escapes: Vec<(char, Escape)>,
    punctuation: Vec<(Box<str>, Punct)>,
    keywords: Vec<(Box<str>, Keyword)>,
    primitives: Vec<(Box<str>, Primitive)>,
    operators: Vec<OperatorDef>,
}

impl Default for LanguageBuilder {
    fn default() -> Self {
        LanguageBuilder {
            delimiters: Vec::new(),
            string_quotes: ('"', '"'),
            char_quotes: ('\'', '\''),
            include_brackets: ('<', '>'),
            escape_char: '\\',
            line_comment: "//".into(),
            block_comment: ("/*".into(), "*/".into()),
            escapes: Vec::new(),
            punctuation: Vec::new(),
            keywords: Vec::new(),
            primitives: Vec::new(),
            operators: Vec::new(),
        }
    }
}

impl LanguageBuilder {
    #[must_use]
    pub fn delimiters(mut self, delimiters: &str) -> Self {
        self.delimiters = delimiters.chars().collect();
        self
    }

    #[must_use]
    pub fn string_quotes(mut self, start: char, end: char) -> Self {
        self.string_quotes = (start, end);
        self
    }

    #[must_use]
    pub fn char_quotes(mut self, start: char, end: char) -> Self {
        self.char_quotes = (start, end);
        self
    }

    #[must_use]
    pub fn include_brackets(mut self, start: char, end: char) -> Self {
        self.include_brackets = (start, end);
        self
    }

    #[must_use]
    pub fn escape_char(mut self, c: char) -> Self {
        self.escape_char = c;
        self
    }

    #[must_use]
    pub fn comments(mut self, line: &str, block_start: &str, block_end: &str) -> Self {
        self.line_comment = line.into();
        self.block_comment = (block_start.into(), block_end.into());
        self
    }

    #[must_use]
    pub fn escape(mut self, signature: char, escape: Escape) -> Self {
        self.escapes.push((signature, escape));
        self
    }

    #[must_use]
    pub fn punct(mut self, spelling: &str, punct: Punct) -> Self {
        self.punctuation.push((spelling.into(), punct));
        self
    }

    #[must_use]
    pub fn keyword(mut self, spelling: &str, keyword: Keyword) -> Self {
        self.keywords.push((spelling.into(), keyword));
        self
    }

    #[must_use]
    pub fn primitive(mut self, spelling: &str, primitive: Primitive) -> Self {
        self.primitives.push((spelling.into(), primitive));
        self
    }

    #[must_use]
    pub fn operator(mut self, def: OperatorDef) -> Self {
        self.operators.push(def);
        self
    }

    pub fn build(self) -> Result<Language, LanguageError> {
        let mut escapes = HashMap::with_capacity(self.escapes.len());
        for (signature, escape) in self.escapes {
            if escapes.insert(signature, escape).is_some() {
                return Err(LanguageError::DuplicateEscape(signature));
            }
        }

        check_unique("punctuation", self.punctuation.iter().map(|(s, _)| s))?;
        check_unique("keyword", self.keywords.iter().map(|(s, _)| s))?;
        check_unique("primitive", self.primitives.iter().map(|(s, _)| s))?;

        let mut seen = Vec::with_capacity(self.operators.len());
        for def in &self.operators {
            if def.spelling.is_empty() {
                return Err(LanguageError::EmptySpelling { table: "operator" });
            }
            if !def.needs_left() && !def.needs_right() {
                return Err(LanguageError::OperatorWithoutOperands(def.spelling.clone()));
            }
            let key = (&def.spelling, def.left, def.right);
            if seen.contains(&key) {
                return Err(LanguageError::DuplicateSpelling {
                    table: "operator",
                    spelling: def.spelling.clone(),
                });
            }
            seen.push(key);
        }

        let mut punctuation = self.punctuation;
        punctuation.sort_by_key(|(spelling, _)| std::cmp::Reverse(spelling.chars().count()));

        Ok(Language {
            delimiters: self.delimiters.into(),
            string_quotes: self.string_quotes,
            char_quotes: self.char_quotes,
            include_brackets: self.include_brackets,
            escape_char: self.escape_char,
            line_comment: self.line_comment,
            block_comment: self.block_comment,
            escapes,
            punctuation,
            keywords: self.keywords.into_iter().collect(),
            primitives: self.primitives.into_iter().collect(),
            operators: self.operators,
        })
    }
}

fn check_unique<'a>(
    table: &'static str,
    spellings: impl Iterator<Item = &'a Box<str>>,
) -> Result<(), LanguageError> {
    let mut seen: Vec<&str> = Vec::new();
    for spelling in spellings {
        if spelling.is_empty() {
            return Err(LanguageError::EmptySpelling { table });
        }
        if seen.contains(&&**spelling) {
            return Err(LanguageError::DuplicateSpelling {
                table,
                spelling: spelling.clone(),
            });
        }
        seen.push(&**spelling);
    }
    Ok(())
}

pub const DEFAULT_DELIMITERS: &str = " #=+-*/<>.,^&|(){}[]%\"'!?:;~";

static DEFAULT_ESCAPES: phf::OrderedMap<char, Escape> = phf::phf_ordered_map! {
    'n' => Escape::Byte(b'\n'),
    't' => Escape::Byte(b'\t'),
    'r' => Escape::Byte(b'\r'),
    '0' => Escape::Byte(0),
    '\\' => Escape::Byte(b'\\'),
    '"' => Escape::Byte(b'"'),
    '\'' => Escape::Byte(b'\''),
    'x' => Escape::Numeric { radix: 16 },
};

static DEFAULT_PUNCTUATION: phf::OrderedMap<&'static str, Punct> = phf::phf_ordered_map! {
    "," => Punct::Comma,
    ";" => Punct::Semicolon,
    ":" => Punct::Colon,
    "?" => Punct::Question,
    "(" => Punct::LParen,
    ")" => Punct::RParen,
    "{" => Punct::LBrace,
    "}" => Punct::RBrace,
    "[" => Punct::LBracket,
    "]" => Punct::RBracket,
    "#" => Punct::Hash,
};

static DEFAULT_KEYWORDS: phf::OrderedMap<&'static str, Keyword> = phf::phf_ordered_map! {
    "typedef" => Keyword::Typedef,
    "if" => Keyword::If,
    "else" => Keyword::Else,
    "for" => Keyword::For,
    "while" => Keyword::While,
    "switch" => Keyword::Switch,
    "return" => Keyword::Return,
    "struct" => Keyword::Struct,
    "extern" => Keyword::Extern,
    "layout" => Keyword::Layout,
    "in" => Keyword::In,
    "out" => Keyword::Out,
    "UniformBuffer" => Keyword::UniformBuffer,
    "Sampler1D" => Keyword::Sampler1D,
    "Sampler2D" => Keyword::Sampler2D,
    "Sampler3D" => Keyword::Sampler3D,
};

static DEFAULT_PRIMITIVES: phf::OrderedMap<&'static str, Primitive> = phf::phf_ordered_map! {
    "void" => Primitive::Void,
    "byte" => Primitive::Byte,
    "short" => Primitive::Short,
    "int" => Primitive::Int,
    "float" => Primitive::Float,
    "vec2" => Primitive::Vec2,
    "vec3" => Primitive::Vec3,
    "vec4" => Primitive::Vec4,
    "mat4" => Primitive::Mat4,
    "const" => Primitive::Const,
    "signed" => Primitive::Signed,
    "unsigned" => Primitive::Unsigned,
};

type OperatorRow = (
    OperatorId,
    &'static str,
    Associativity,
    u8,
    OperandKind,
    OperandKind,
);

#[rustfmt::skip]
static DEFAULT_OPERATORS: &[OperatorRow] = {
    use Associativity::{LeftToRight as Ltr, RightToLeft as Rtl};
    use OperandKind::{Any, None};
    use OperatorId::*;
    &[
        (Dot, ".", Ltr, 1, Any, Any),
        (PostIncrement, "++", Ltr, 1, Any, None),
        (PostDecrement, "--", Ltr, 1, Any, None),
        (PreIncrement, "++", Rtl, 2, None, Any),
        (PreDecrement, "--", Rtl, 2, None, Any),
        (Negate, "-", Rtl, 2, None, Any),
        (Positive, "+", Rtl, 2, None, Any),
        (BitNot, "~", Rtl, 2, None, Any),
        (Not, "!", Rtl, 2, None, Any),
        (Multiply, "*", Ltr, 3, Any, Any),
        (Divide, "/", Ltr, 3, Any, Any),
        (Modulo, "%", Ltr, 3, Any, Any),
        (Add, "+", Ltr, 4, Any, Any),
        (Subtract, "-", Ltr, 4, Any, Any),
        (ShiftLeft, "<<", Ltr, 5, Any, Any),
        (ShiftRight, ">>", Ltr, 5, Any, Any),
        (Less, "<", Ltr, 6, Any, Any),
        (Greater, ">", Ltr, 6, Any, Any),
        (LessEqual, "<=", Ltr, 6, Any, Any),
        (GreaterEqual, ">=", Ltr, 6, Any, Any),
        (Equal, "==", Ltr, 7, Any, Any),
        (NotEqual, "!=", Ltr, 7, Any, Any),
        (BitAnd, "&", Ltr, 8, Any, Any),
        (BitXor, "^", Ltr, 9, Any, Any),
        (BitOr, "|", Ltr, 10, Any, Any),
        (And, "&&", Ltr, 11, Any, Any),
        (Or, "||", Ltr, 12, Any, Any),
        (Assign, "=", Rtl, 14, Any, Any),
        (AddAssign, "+=", Rtl, 14, Any, Any),
        (SubtractAssign, "-=", Rtl, 14, Any, Any),
        (MultiplyAssign, "*=", Rtl, 14, Any, Any),
        (DivideAssign, "/=", Rtl, 14, Any, Any),
    ]
};

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_table_resolves_by_context() {
        let lang = Language::default();
        let resolve = |s, left| lang.resolve_operator(s, left).map(|def| def.id);

        assert_eq!(resolve("-", true), Some(OperatorId::Subtract));
        assert_eq!(resolve("-", false), Some(OperatorId::Negate));
        assert_eq!(resolve("++", true), Some(OperatorId::PostIncrement));
        assert_eq!(resolve("++", false), Some(OperatorId::PreIncrement));
        assert_eq!(resolve("!", true), None);
        assert_eq!(resolve("*", false), None);
    }

    #[test]
    fn default_table_lookups() {
        let lang = Language::default();
        assert_eq!(lang.keyword("UniformBuffer"), Some(Keyword::UniformBuffer));
        assert_eq!(lang.keyword("uniformbuffer"), None);
        assert_eq!(lang.primitive("vec3"), Some(Primitive::Vec3));
        assert_eq!(lang.escape('x'), Some(Escape::Numeric { radix: 16 }));
        assert!(lang.is_delimiter('#'));
        assert!(!lang.is_delimiter('\t'));
    }

    #[test]
    fn punctuation_is_sorted_longest_first() {
        let lang = Language::builder()
            .punct(":", Punct::Colon)
            .punct("::", Punct::Colon)
            .build()
            .unwrap();
        let spellings: Vec<_> = lang.punctuation().iter().map(|(s, _)| &**s).collect();
        assert_eq!(spellings, ["::", ":"]);
    }

    #[test]
    fn duplicate_spellings_are_rejected() {
        let err = Language::builder()
            .keyword("if", Keyword::If)
            .keyword("if", Keyword::Else)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            LanguageError::DuplicateSpelling {
                table: "keyword",
                spelling: "if".into(),
            }
        );
    }

    #[test]
    fn same_operator_spelling_needs_distinct_operands() {
        let def = |id| OperatorDef {
            id,
            spelling: "-".into(),
            associativity: Associativity::LeftToRight,
            precedence: 4,
            left: OperandKind::Any,
            right: OperandKind::Any,
        };
        let result = Language::builder()
            .operator(def(OperatorId::Subtract))
            .operator(def(OperatorId::Negate))
            .build();
        assert!(matches!(
            result,
            Err(LanguageError::DuplicateSpelling { table: "operator", .. })
        ));
    }

    #[test]
    fn binds_before_follows_precedence_then_associativity() {
        let lang = Language::default();
        let op = |id| lang.operator(id).unwrap();
        assert!(op(OperatorId::Multiply).binds_before(op(OperatorId::Add)));
        assert!(!op(OperatorId::Add).binds_before(op(OperatorId::Multiply)));
        assert!(op(OperatorId::Dot).binds_before(op(OperatorId::PostIncrement)));
        assert!(!op(OperatorId::Assign).binds_before(op(OperatorId::Assign)));
    }
}
