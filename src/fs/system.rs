//! OS-backed [`Fs`] implementation.
use std::io;
use std::path::{Path, PathBuf};

use super::{FileKind, FileMeta, Fs};

/// Production [`Fs`] implementation that delegates to [`std::fs`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFs;

fn to_meta(meta: &std::fs::Metadata) -> FileMeta {
    let ft = meta.file_type();
    let kind = if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_dir() {
        FileKind::Dir
    } else {
        FileKind::File
    };
    FileMeta {
        kind,
        len: if kind == FileKind::File { meta.len() } else { 0 },
    }
}

impl Fs for SystemFs {
    fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
        std::fs::metadata(path).map(|m| to_meta(&m))
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<FileMeta> {
        std::fs::symlink_metadata(path).map(|m| to_meta(&m))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link)
        }

        #[cfg(windows)]
        {
            if target.is_dir() {
                std::os::windows::fs::symlink_dir(target, link)
            } else {
                std::os::windows::fs::symlink_file(target, link)
            }
        }
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        use std::io::Write as _;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(contents)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        // Windows directory symlinks must be removed with remove_dir.
        #[cfg(windows)]
        {
            if std::fs::symlink_metadata(path)?.is_dir() {
                return std::fs::remove_dir(path);
            }
        }
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = std::fs::read_dir(path)?
            .map(|e| e.map(|entry| entry.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn lstat_and_stat_differ_on_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        let link = dir.path().join("link");
        std::fs::write(&file, "abc").unwrap();
        SystemFs.symlink(&file, &link).unwrap();

        assert!(SystemFs.symlink_metadata(&link).unwrap().is_symlink());
        let meta = SystemFs.metadata(&link).unwrap();
        assert_eq!(meta.kind, FileKind::File);
        assert_eq!(meta.len, 3);
        assert_eq!(SystemFs.read_link(&link).unwrap(), file);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_exists_as_entry_only() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        SystemFs.symlink(Path::new("/nonexistent/target"), &link).unwrap();
        assert!(!SystemFs.exists(&link));
        assert!(SystemFs.entry_exists(&link));
        SystemFs.remove_file(&link).unwrap();
        assert!(!SystemFs.entry_exists(&link));
    }

    #[test]
    fn create_new_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        SystemFs.create_new(&path, b"1").unwrap();
        let err = SystemFs.create_new(&path, b"2").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn read_dir_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c", "a", "b"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let names: Vec<String> = SystemFs
            .read_dir(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
