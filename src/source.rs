//! Where source text comes from.

use std::{
    collections::HashMap,
    io,
    path::{Component, Path, PathBuf},
};

/// Read access to source files. The preprocessor resolves includes through
/// this, so tests and embedders can compile without touching the disk.
pub trait SourceLoader {
    fn exists(&self, path: &Path) -> bool;

    fn load(&self, path: &Path) -> io::Result<String>;
}

/// Reads from the OS file system.
#[derive(Copy, Clone, Debug, Default)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn load(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Serves files from memory, keyed by their normalized path.
#[derive(Clone, Debug, Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> MemoryLoader {
        MemoryLoader::default()
    }

    #[must_use]
    pub fn with(mut self, path: impl AsRef<Path>, src: impl Into<String>) -> Self {
        self.insert(path, src);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, src: impl Into<String>) {
        self.files.insert(normalize(path.as_ref()), src.into());
    }
}

impl SourceLoader for MemoryLoader {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn load(&self, path: &Path) -> io::Result<String> {
        self.files.get(&normalize(path)).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }
}

/// Lexically resolves `.` and `..` components and unifies separators, without
/// consulting the file system.
pub fn normalize(path: &Path) -> PathBuf {
    let path = PathBuf::from(path.to_string_lossy().replace('\\', "/"));
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}
