//! Numeric diagnostic codes and the sink every stage reports into.
//!
//! Codes are namespaced by stage: `COMPILER | STAGE | n`.

use std::fmt;

use crate::token::{Located, Location};

pub const COMPILER: u32 = 0x10000;
pub const PREPROCESSOR: u32 = COMPILER;
pub const SYNTAX: u32 = COMPILER | 0x100;
pub const LEXER: u32 = COMPILER | 0x200;
pub const SEMANTIC: u32 = COMPILER | 0x300;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("Warning"),
            Severity::Error => f.write_str("Error"),
        }
    }
}

/// An error type with a stable numeric code.
pub trait Coded: fmt::Display {
    fn code(&self) -> u32;

    fn severity(&self) -> Severity {
        Severity::Error
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: u32,
    pub loc: Location,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    /// Records `error` at `loc` and mirrors it to the log.
    pub fn report<E: Coded>(&mut self, loc: Location, error: &E) {
        let diagnostic = Diagnostic {
            severity: error.severity(),
            code: error.code(),
            loc,
            message: error.to_string(),
        };
        match diagnostic.severity {
            Severity::Warning => tracing::warn!(
                code = diagnostic.code,
                at = %loc,
                "{}",
                diagnostic.message
            ),
            Severity::Error => tracing::error!(
                code = diagnostic.code,
                at = %loc,
                "{}",
                diagnostic.message
            ),
        }
        self.entries.push(diagnostic);
    }

    pub fn report_located<E: Coded>(&mut self, error: &Located<E>) {
        self.report(error.loc, &error.inner);
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
