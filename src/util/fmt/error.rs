use std::fmt;

use crate::{
    diagnostics::{Coded, Diagnostic},
    token::{Located, Location},
    util::fmt::Show,
};

impl Show for Location {
    fn show(&self, f: &mut fmt::Formatter<'_>, ctx: &super::Context<'_>) -> fmt::Result {
        let file = ctx.files.get(self.file);
        write!(f, "{file} -> {}:{}", self.line, self.column)
    }
}

/// The alternate form (`{:#}`) prefixes the location.
impl Show for Diagnostic {
    fn show(&self, f: &mut fmt::Formatter<'_>, ctx: &super::Context<'_>) -> fmt::Result {
        let Diagnostic {
            severity,
            code,
            loc,
            message,
        } = self;

        if f.alternate() {
            write!(f, "{} ", loc.display(ctx))?;
        }
        write!(f, "{severity} ({code:#x}): {message}")
    }
}

impl<E: Coded> Show for Located<E> {
    fn show(&self, f: &mut fmt::Formatter<'_>, ctx: &super::Context<'_>) -> fmt::Result {
        let Located { loc, inner: error } = self;

        if f.alternate() {
            write!(f, "{} ", loc.display(ctx))?;
        }
        write!(f, "{} ({:#x}): {error}", error.severity(), error.code())
    }
}
