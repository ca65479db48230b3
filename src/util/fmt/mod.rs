use crate::util::intern::Interner;

pub mod error;
pub mod tree;

/// What a [`Show`] implementation may need beyond the value itself. Locations
/// only carry interned file ids, so printing them needs the file names.
#[derive(Clone, Copy)]
pub struct Context<'files> {
    pub files: &'files Interner<str>,
}

impl<'files> Context<'files> {
    pub fn new(files: &'files Interner<str>) -> Self {
        Context { files }
    }
}

/// Like [`std::fmt::Display`], but with access to a [`Context`].
///
/// The alternate flag (`{:#}`) is passed through, which diagnostics use to
/// prefix their location.
pub trait Show {
    fn show(&self, f: &mut std::fmt::Formatter<'_>, ctx: &Context<'_>) -> std::fmt::Result;

    fn display<'a>(&'a self, ctx: &'a Context<'a>) -> impl std::fmt::Display + 'a
    where
        Self: Sized,
    {
        Shown { value: self, ctx }
    }
}

struct Shown<'a, T> {
    value: &'a T,
    ctx: &'a Context<'a>,
}

impl<T: Show> std::fmt::Display for Shown<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value.show(f, self.ctx)
    }
}
