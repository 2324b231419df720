//! In-memory [`Fs`] implementation with full symlink semantics.
//!
//! Used by unit and integration tests to exercise the pipeline without
//! touching the disk. Paths must be absolute.
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{FileKind, FileMeta, Fs};

/// Maximum number of links followed while resolving one path.
const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    File(Vec<u8>),
    Dir,
    Symlink(PathBuf),
}

/// A map from absolute path to node, guarded by a mutex.
///
/// The root directory `/` always exists.
#[derive(Debug)]
pub struct MemoryFs {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::Dir);
        Self {
            nodes: Mutex::new(nodes),
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

fn exists_err(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("file exists: {}", path.display()),
    )
}

fn other(msg: String) -> io::Error {
    io::Error::other(msg)
}

/// Split a path into its normal components, keeping `..` as a marker.
fn components(path: &Path) -> Vec<OsString> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect()
}

impl MemoryFs {
    /// Create an empty filesystem containing only `/`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a regular file (creating parent directories).
    #[must_use]
    pub fn with_file(self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            let _ = self.create_dir_all(parent);
        }
        let _ = self.write(path, contents.as_ref());
        self
    }

    /// Add a directory (and its ancestors).
    #[must_use]
    pub fn with_dir(self, path: impl AsRef<Path>) -> Self {
        let _ = self.create_dir_all(path.as_ref());
        self
    }

    /// Add a symbolic link `link -> target` (creating the link's parents).
    #[must_use]
    pub fn with_symlink(self, link: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        let link = link.as_ref();
        if let Some(parent) = link.parent() {
            let _ = self.create_dir_all(parent);
        }
        let _ = self.symlink(target.as_ref(), link);
        self
    }

    /// Render every entry below `prefix` as `(path, description)` pairs.
    ///
    /// File contents are rendered lossily; used to assert that a run left a
    /// tree byte-for-byte unchanged.
    #[must_use]
    pub fn snapshot(&self, prefix: &Path) -> BTreeMap<PathBuf, String> {
        self.lock()
            .iter()
            .filter(|(p, _)| p.starts_with(prefix))
            .map(|(p, n)| {
                let desc = match n {
                    Node::File(bytes) => format!("file:{}", String::from_utf8_lossy(bytes)),
                    Node::Dir => "dir".to_string(),
                    Node::Symlink(t) => format!("link:{}", t.display()),
                };
                (p.clone(), desc)
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Node>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve `path` to the location of its real entry.
    ///
    /// Intermediate symlinks are always followed; the last component is
    /// followed only when `follow_last` is set. A missing last component is
    /// allowed (the returned path names where it would live).
    fn resolve(
        nodes: &BTreeMap<PathBuf, Node>,
        path: &Path,
        follow_last: bool,
    ) -> io::Result<PathBuf> {
        if !path.is_absolute() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("memory fs requires absolute paths: {}", path.display()),
            ));
        }
        let mut pending: Vec<OsString> = components(path);
        pending.reverse();
        let mut cur = PathBuf::from("/");
        let mut hops = 0usize;

        while let Some(comp) = pending.pop() {
            if comp == ".." {
                cur.pop();
                continue;
            }
            let next = cur.join(&comp);
            let is_last = pending.is_empty();
            match nodes.get(&next) {
                Some(Node::Symlink(target)) if !is_last || follow_last => {
                    hops += 1;
                    if hops > MAX_LINK_HOPS {
                        return Err(other(format!(
                            "too many levels of symbolic links: {}",
                            path.display()
                        )));
                    }
                    let absolute = if target.is_absolute() {
                        target.clone()
                    } else {
                        cur.join(target)
                    };
                    let mut expanded = components(&absolute);
                    expanded.reverse();
                    pending.extend(expanded);
                    cur = PathBuf::from("/");
                }
                Some(Node::File(_)) if !is_last => {
                    return Err(other(format!("not a directory: {}", next.display())));
                }
                Some(_) => cur = next,
                None if is_last => cur = next,
                None => return Err(not_found(&next)),
            }
        }
        Ok(cur)
    }

    fn parent_is_dir(nodes: &BTreeMap<PathBuf, Node>, real: &Path) -> io::Result<()> {
        match real.parent() {
            None => Ok(()),
            Some(parent) => match nodes.get(parent) {
                Some(Node::Dir) => Ok(()),
                Some(_) => Err(other(format!("not a directory: {}", parent.display()))),
                None => Err(not_found(parent)),
            },
        }
    }
}

impl Fs for MemoryFs {
    fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
        let nodes = self.lock();
        let real = Self::resolve(&nodes, path, true)?;
        match nodes.get(&real) {
            None => Err(not_found(path)),
            Some(Node::Dir) => Ok(FileMeta {
                kind: FileKind::Dir,
                len: 0,
            }),
            Some(Node::File(bytes)) => Ok(FileMeta {
                kind: FileKind::File,
                len: bytes.len() as u64,
            }),
            Some(Node::Symlink(_)) => Ok(FileMeta {
                kind: FileKind::Symlink,
                len: 0,
            }),
        }
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<FileMeta> {
        let nodes = self.lock();
        let real = Self::resolve(&nodes, path, false)?;
        match nodes.get(&real) {
            None => Err(not_found(path)),
            Some(Node::Dir) => Ok(FileMeta {
                kind: FileKind::Dir,
                len: 0,
            }),
            Some(Node::File(bytes)) => Ok(FileMeta {
                kind: FileKind::File,
                len: bytes.len() as u64,
            }),
            Some(Node::Symlink(_)) => Ok(FileMeta {
                kind: FileKind::Symlink,
                len: 0,
            }),
        }
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let nodes = self.lock();
        let real = Self::resolve(&nodes, path, false)?;
        match nodes.get(&real) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a symlink: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let mut nodes = self.lock();
        let real = Self::resolve(&nodes, link, false)?;
        if nodes.contains_key(&real) {
            return Err(exists_err(link));
        }
        Self::parent_is_dir(&nodes, &real)?;
        nodes.insert(real, Node::Symlink(target.to_path_buf()));
        Ok(())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let nodes = self.lock();
        let real = Self::resolve(&nodes, path, true)?;
        match nodes.get(&real) {
            Some(Node::File(bytes)) => Ok(bytes.clone()),
            Some(_) => Err(other(format!("is a directory: {}", path.display()))),
            None => Err(not_found(path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut nodes = self.lock();
        let real = Self::resolve(&nodes, path, true)?;
        if matches!(nodes.get(&real), Some(Node::Dir)) {
            return Err(other(format!("is a directory: {}", path.display())));
        }
        Self::parent_is_dir(&nodes, &real)?;
        nodes.insert(real, Node::File(contents.to_vec()));
        Ok(())
    }

    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut nodes = self.lock();
        let real = Self::resolve(&nodes, path, false)?;
        if nodes.contains_key(&real) {
            return Err(exists_err(path));
        }
        Self::parent_is_dir(&nodes, &real)?;
        nodes.insert(real, Node::File(contents.to_vec()));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.lock();
        let mut prefix = PathBuf::from("/");
        for comp in components(path) {
            prefix.push(comp);
            let real = Self::resolve(&nodes, &prefix, true)?;
            match nodes.get(&real) {
                Some(Node::Dir) => {}
                Some(_) => return Err(exists_err(&prefix)),
                None => {
                    nodes.insert(real, Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.lock();
        let real = Self::resolve(&nodes, path, false)?;
        match nodes.get(&real) {
            Some(Node::File(_) | Node::Symlink(_)) => {
                nodes.remove(&real);
                Ok(())
            }
            Some(Node::Dir) => Err(other(format!("is a directory: {}", path.display()))),
            None => Err(not_found(path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.lock();
        let real = Self::resolve(&nodes, path, false)?;
        match nodes.get(&real) {
            Some(Node::Dir) => {
                nodes.retain(|p, _| !p.starts_with(&real));
                Ok(())
            }
            Some(_) => Err(other(format!("not a directory: {}", path.display()))),
            None => Err(not_found(path)),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut nodes = self.lock();
        let src = Self::resolve(&nodes, from, false)?;
        let dst = Self::resolve(&nodes, to, false)?;
        if !nodes.contains_key(&src) {
            return Err(not_found(from));
        }
        Self::parent_is_dir(&nodes, &dst)?;
        if matches!(nodes.get(&dst), Some(Node::Dir)) && dst != src {
            return Err(other(format!("is a directory: {}", to.display())));
        }
        let moved: Vec<(PathBuf, Node)> = nodes
            .iter()
            .filter(|(p, _)| p.starts_with(&src))
            .map(|(p, n)| (p.clone(), n.clone()))
            .collect();
        nodes.retain(|p, _| !p.starts_with(&src));
        for (p, n) in moved {
            let rel = p.strip_prefix(&src).map(Path::to_path_buf).unwrap_or_default();
            let target = if rel.as_os_str().is_empty() {
                dst.clone()
            } else {
                dst.join(rel)
            };
            nodes.insert(target, n);
        }
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let nodes = self.lock();
        let real = Self::resolve(&nodes, path, true)?;
        match nodes.get(&real) {
            Some(Node::Dir) => {}
            Some(_) => return Err(other(format!("not a directory: {}", path.display()))),
            None => return Err(not_found(path)),
        }
        Ok(nodes
            .keys()
            .filter(|p| p.parent() == Some(real.as_path()))
            .filter_map(|p| p.file_name().map(|name| path.join(name)))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stat_follows_chain_of_links() {
        let fs = MemoryFs::new()
            .with_file("/dots/vim/vimrc", "set nu")
            .with_symlink("/data/packs/vim/symlinks/vimrc", "/dots/vim/vimrc")
            .with_symlink("/h/.vimrc", "/data/packs/vim/symlinks/vimrc");

        let meta = fs.metadata(Path::new("/h/.vimrc")).unwrap();
        assert_eq!(meta.kind, FileKind::File);
        assert_eq!(meta.len, 6);
        assert!(fs.symlink_metadata(Path::new("/h/.vimrc")).unwrap().is_symlink());
        assert_eq!(
            fs.read_link(Path::new("/h/.vimrc")).unwrap(),
            PathBuf::from("/data/packs/vim/symlinks/vimrc")
        );
        assert_eq!(fs.read(Path::new("/h/.vimrc")).unwrap(), b"set nu");
    }

    #[test]
    fn relative_link_resolves_against_parent() {
        let fs = MemoryFs::new()
            .with_file("/a/target", "x")
            .with_symlink("/a/b/link", "../target");
        assert_eq!(fs.metadata(Path::new("/a/b/link")).unwrap().kind, FileKind::File);
    }

    #[test]
    fn dangling_link_is_entry_but_not_existing() {
        let fs = MemoryFs::new().with_symlink("/h/.rc", "/nowhere");
        assert!(fs.entry_exists(Path::new("/h/.rc")));
        assert!(!fs.exists(Path::new("/h/.rc")));
    }

    #[test]
    fn symlink_loop_is_an_error() {
        let fs = MemoryFs::new()
            .with_dir("/x")
            .with_symlink("/x/a", "/x/b")
            .with_symlink("/x/b", "/x/a");
        assert!(fs.metadata(Path::new("/x/a")).is_err());
    }

    #[test]
    fn directory_through_link_is_listable() {
        let fs = MemoryFs::new()
            .with_file("/dots/tools/bin/tool", "")
            .with_symlink("/data/bin", "/dots/tools/bin");
        let entries = fs.read_dir(Path::new("/data/bin")).unwrap();
        assert_eq!(entries, vec![PathBuf::from("/data/bin/tool")]);
    }

    #[test]
    fn symlink_refuses_existing_entry() {
        let fs = MemoryFs::new().with_file("/h/.rc", "mine");
        let err = fs
            .symlink(Path::new("/x"), Path::new("/h/.rc"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn write_requires_parent() {
        let fs = MemoryFs::new();
        let err = fs.write(Path::new("/missing/file"), b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn remove_file_does_not_follow_link() {
        let fs = MemoryFs::new()
            .with_file("/a/file", "x")
            .with_symlink("/a/link", "/a/file");
        fs.remove_file(Path::new("/a/link")).unwrap();
        assert!(fs.exists(Path::new("/a/file")));
        assert!(!fs.entry_exists(Path::new("/a/link")));
    }

    #[test]
    fn remove_dir_all_is_scoped() {
        let fs = MemoryFs::new()
            .with_file("/d/p/install/a.sentinel", "x")
            .with_file("/d/p/installer/keep", "y");
        fs.remove_dir_all(Path::new("/d/p/install")).unwrap();
        assert!(!fs.entry_exists(Path::new("/d/p/install")));
        assert!(fs.exists(Path::new("/d/p/installer/keep")));
    }

    #[test]
    fn rename_replaces_file() {
        let fs = MemoryFs::new()
            .with_file("/d/a.tmp", "new")
            .with_file("/d/a", "old");
        fs.rename(Path::new("/d/a.tmp"), Path::new("/d/a")).unwrap();
        assert_eq!(fs.read(Path::new("/d/a")).unwrap(), b"new");
        assert!(!fs.entry_exists(Path::new("/d/a.tmp")));
    }

    #[test]
    fn snapshot_lists_prefix_only() {
        let fs = MemoryFs::new()
            .with_file("/h/.a", "1")
            .with_file("/other/b", "2");
        let snap = fs.snapshot(Path::new("/h"));
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get(Path::new("/h/.a")).map(String::as_str), Some("file:1"));
    }
}
