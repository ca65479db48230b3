use crate::{
    diagnostics::Diagnostics,
    language::Language,
    token::FileId,
    util::{fmt, intern::Interner},
};

/// State shared by every stage of one compilation.
///
/// The [`Language`] is borrowed so that independent compilations can share a
/// single table.
pub struct Session<'lang> {
    pub lang: &'lang Language,
    pub files: Interner<str>,
    pub diagnostics: Diagnostics,
}

impl<'lang> Session<'lang> {
    pub fn new(lang: &'lang Language) -> Session<'lang> {
        Session {
            lang,
            files: Interner::with_capacity(16),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn file(&mut self, path: &str) -> FileId {
        self.files.intern(path)
    }

    pub fn file_name(&self, file: FileId) -> &str {
        self.files.get(file)
    }

    pub fn fmt_context(&self) -> fmt::Context<'_> {
        fmt::Context::new(&self.files)
    }
}
