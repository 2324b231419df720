//! Filesystem abstraction for dependency injection.
//!
//! Every filesystem effect of the engine goes through the [`Fs`] trait so the
//! pipeline can run against the real disk ([`SystemFs`]) or an in-memory tree
//! ([`MemoryFs`]) with identical symlink semantics.

mod memory;
mod system;

pub use memory::MemoryFs;
pub use system::SystemFs;

use std::io;
use std::path::{Path, PathBuf};

/// Kind of a filesystem entry as seen by `lstat`/`stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link (only ever returned by [`Fs::symlink_metadata`]).
    Symlink,
}

/// Minimal metadata needed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// Entry kind.
    pub kind: FileKind,
    /// Size in bytes (zero for directories and links).
    pub len: u64,
}

impl FileMeta {
    /// `true` for directories.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    /// `true` for symbolic links.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// Abstraction over the filesystem primitives the engine needs.
///
/// Implementations must honour symbolic-link semantics: [`Fs::metadata`]
/// follows links (stat), [`Fs::symlink_metadata`] does not (lstat).
pub trait Fs: Send + Sync + std::fmt::Debug {
    /// `stat`: metadata of the final target after following links.
    ///
    /// # Errors
    ///
    /// `NotFound` if the path or any link target along the way is absent.
    fn metadata(&self, path: &Path) -> io::Result<FileMeta>;

    /// `lstat`: metadata of the entry itself.
    ///
    /// # Errors
    ///
    /// `NotFound` if no entry exists at `path`.
    fn symlink_metadata(&self, path: &Path) -> io::Result<FileMeta>;

    /// Read the target of the symbolic link at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is absent or is not a symlink.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Create a symbolic link at `link` pointing at `target`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if an entry is present at `link`.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Read a whole file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is absent or unreadable.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate `path` and write `contents`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory does not exist or the write fails.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Create `path` with `contents`, failing if it already exists.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if an entry is present at `path`.
    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Create a directory and all missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns an error if a component exists and is not a directory.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a file or symlink (never follows the link).
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is absent or is a directory.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory and everything beneath it.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is absent or not a directory.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Atomically move `from` to `to`, replacing any file at `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` is absent.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Immediate children of the directory at `path`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be read as a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// `true` if something exists at `path` after following links.
    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }

    /// `true` if an entry (including a dangling symlink) exists at `path`.
    fn entry_exists(&self, path: &Path) -> bool {
        self.symlink_metadata(path).is_ok()
    }
}

/// Resolve a link target read from `link` into an absolute path.
///
/// Relative targets are interpreted against the link's parent directory.
#[must_use]
pub fn absolutize_link_target(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.parent()
            .map_or_else(|| target.to_path_buf(), |p| p.join(target))
    }
}

/// Lexically normalise a path: drop `.` components and fold `..`.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Compare two link targets after lexical normalisation.
#[must_use]
pub fn same_path(a: &Path, b: &Path) -> bool {
    normalize(a) == normalize(b)
}
