//! The private data directory: staged intermediates, sentinels, the lock,
//! and the generated shell init script.
//!
//! Every user-visible link goes through an intermediate link owned by the
//! store:
//!
//! ```text
//! ~/.vimrc  ->  <data>/packs/vim/symlinks/vimrc  ->  <root>/vim/vimrc
//! ```
//!
//! Removing the intermediate is therefore enough to deactivate a file without
//! touching the user path, and status can tell "ours" from "foreign" by
//! checking where a user link points.
mod sentinel;
mod status;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use sentinel::{SENTINEL_SUFFIX, Sentinel, file_checksum, sentinel_name};
pub use status::{Status, StatusError, StatusState};

use crate::error::{DodotError, Result};
use crate::fs::{Fs, absolutize_link_target, same_path};
use crate::paths::Paths;

/// What a link operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The link was absent and has been created.
    Created,
    /// A stale link was replaced.
    Replaced,
    /// The link already pointed at the right place.
    Unchanged,
}

/// State-directory name for a handler.
#[must_use]
pub fn state_dir(handler: &str) -> &str {
    match handler {
        "symlink" => "symlinks",
        other => other,
    }
}

/// Hidden file in a handler's state dir listing the user links made through
/// it, one absolute path per line.
const USER_LINKS: &str = ".user-links";

fn basename(path: &Path) -> &std::ffi::OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}

/// Exclusive hold on the data directory; released on drop.
#[derive(Debug)]
pub struct DataLock {
    fs: Arc<dyn Fs>,
    path: PathBuf,
}

impl Drop for DataLock {
    fn drop(&mut self) {
        if let Err(e) = self.fs.remove_file(&self.path) {
            tracing::warn!("failed to release lock {}: {e}", self.path.display());
        }
    }
}

/// Storage abstraction over the data directory.
#[derive(Debug, Clone)]
pub struct DataStore {
    fs: Arc<dyn Fs>,
    paths: Paths,
}

impl DataStore {
    /// Create a store rooted at `paths.data_dir()`.
    #[must_use]
    pub fn new(fs: Arc<dyn Fs>, paths: Paths) -> Self {
        Self { fs, paths }
    }

    /// The filesystem the store writes through.
    #[must_use]
    pub fn fs(&self) -> &dyn Fs {
        self.fs.as_ref()
    }

    /// Resolved locations.
    #[must_use]
    pub const fn paths(&self) -> &Paths {
        &self.paths
    }

    /// `<data>/packs/<pack>/<state_dir>`.
    #[must_use]
    pub fn handler_dir(&self, pack: &str, handler: &str) -> PathBuf {
        self.paths.handler_dir(pack, state_dir(handler))
    }

    /// Where the intermediate link for `source` lives.
    #[must_use]
    pub fn intermediate_path(&self, pack: &str, handler: &str, source: &Path) -> PathBuf {
        self.handler_dir(pack, handler).join(basename(source))
    }

    fn mkdir(&self, dir: &Path) -> Result<()> {
        self.fs
            .create_dir_all(dir)
            .map_err(|e| DodotError::fs("create_dir_all", dir, e))
    }

    fn remove_entry(&self, path: &Path) -> Result<bool> {
        let meta = match self.fs.symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(DodotError::fs("lstat", path, e)),
        };
        let removed = if meta.is_dir() {
            self.fs.remove_dir_all(path)
        } else {
            self.fs.remove_file(path)
        };
        removed.map_err(|e| DodotError::fs("remove", path, e))?;
        Ok(true)
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        self.fs
            .read_link(path)
            .map_err(|e| DodotError::fs("read_link", path, e))
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        self.fs
            .symlink(target, link)
            .map_err(|e| DodotError::fs("symlink", link, e))
    }

    /// Resolve a link at `link` to an absolute, normalised target, or `None`
    /// if nothing or a non-link is there.
    fn link_target(&self, link: &Path) -> Result<Option<PathBuf>> {
        match self.fs.symlink_metadata(link) {
            Ok(meta) if meta.is_symlink() => {
                let raw = self.read_link(link)?;
                Ok(Some(absolutize_link_target(link, &raw)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DodotError::fs("lstat", link, e)),
        }
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    /// Stage `source` as `<data>/packs/<pack>/<state_dir>/<basename>`.
    ///
    /// An existing entry pointing elsewhere is replaced.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the link cannot be created.
    pub fn link_data(
        &self,
        pack: &str,
        handler: &str,
        source: &Path,
    ) -> Result<(PathBuf, LinkOutcome)> {
        let intermediate = self.intermediate_path(pack, handler, source);
        let outcome = match self.fs.symlink_metadata(&intermediate) {
            Ok(meta) if meta.is_symlink() => {
                if self.read_link(&intermediate)? == source {
                    return Ok((intermediate, LinkOutcome::Unchanged));
                }
                self.remove_entry(&intermediate)?;
                LinkOutcome::Replaced
            }
            Ok(_) => {
                self.remove_entry(&intermediate)?;
                LinkOutcome::Replaced
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.mkdir(&self.handler_dir(pack, handler))?;
                LinkOutcome::Created
            }
            Err(e) => return Err(DodotError::fs("lstat", &intermediate, e)),
        };
        self.symlink(source, &intermediate)?;
        Ok((intermediate, outcome))
    }

    /// Point `user` at `intermediate` and note `user` in the handler's
    /// user-link ledger.
    ///
    /// Only creates the link when `user` is absent, and only replaces it when
    /// it already resolves to `intermediate`.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if `user` is a regular file, a directory,
    /// or a link to anything else; a filesystem error if linking fails.
    pub fn link_user(&self, intermediate: &Path, user: &Path) -> Result<LinkOutcome> {
        let outcome = self.place_user_link(intermediate, user)?;
        if let Some(dir) = intermediate.parent() {
            self.note_user_link(dir, user)?;
        }
        Ok(outcome)
    }

    fn place_user_link(&self, intermediate: &Path, user: &Path) -> Result<LinkOutcome> {
        match self.fs.symlink_metadata(user) {
            Ok(meta) if meta.is_symlink() => {
                let raw = self.read_link(user)?;
                if raw == intermediate {
                    return Ok(LinkOutcome::Unchanged);
                }
                if !same_path(&absolutize_link_target(user, &raw), intermediate) {
                    return Err(DodotError::consistency(
                        user,
                        format!("already a link to {}", raw.display()),
                    ));
                }
                self.remove_entry(user)?;
                self.symlink(intermediate, user)?;
                Ok(LinkOutcome::Replaced)
            }
            Ok(meta) if meta.is_dir() => {
                Err(DodotError::consistency(user, "a directory is in the way"))
            }
            Ok(_) => Err(DodotError::consistency(user, "a regular file is in the way")),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(parent) = user.parent() {
                    self.mkdir(parent)?;
                }
                self.symlink(intermediate, user)?;
                Ok(LinkOutcome::Created)
            }
            Err(e) => Err(DodotError::fs("lstat", user, e)),
        }
    }

    /// Remove the intermediate for `source`. Returns `false` if it was
    /// already absent.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if removal fails.
    pub fn unlink_data(&self, pack: &str, handler: &str, source: &Path) -> Result<bool> {
        self.remove_entry(&self.intermediate_path(pack, handler, source))
    }

    /// Remove `user` if, and only if, it is a link resolving to
    /// `intermediate`. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if inspection or removal fails.
    pub fn unlink_user(&self, user: &Path, intermediate: &Path) -> Result<bool> {
        match self.link_target(user)? {
            Some(target) if same_path(&target, intermediate) => self.remove_entry(user),
            _ => Ok(false),
        }
    }

    /// `true` if `user` is a link that resolves to `intermediate`.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the link cannot be inspected.
    pub fn is_user_link(&self, user: &Path, intermediate: &Path) -> Result<bool> {
        Ok(self
            .link_target(user)?
            .is_some_and(|t| same_path(&t, intermediate)))
    }

    fn read_user_links(&self, ledger: &Path) -> Result<Vec<PathBuf>> {
        match self.fs.read(ledger) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes)
                .lines()
                .filter(|l| !l.is_empty())
                .map(PathBuf::from)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(DodotError::fs("read", ledger, e)),
        }
    }

    fn note_user_link(&self, dir: &Path, user: &Path) -> Result<()> {
        self.mkdir(dir)?;
        let ledger = dir.join(USER_LINKS);
        let mut links = self.read_user_links(&ledger)?;
        if links.iter().any(|l| l == user) {
            return Ok(());
        }
        links.push(user.to_path_buf());
        links.sort();
        let mut contents = String::new();
        for link in &links {
            contents.push_str(&link.to_string_lossy());
            contents.push('\n');
        }
        self.write_atomic(&ledger, contents.as_bytes())
    }

    /// User paths ever linked through a handler's intermediates, sorted.
    ///
    /// The ledger outlives the rules that produced the links, so a link whose
    /// target option has since been removed can still be found.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the ledger exists but cannot be read.
    pub fn recorded_user_links(&self, pack: &str, handler: &str) -> Result<Vec<PathBuf>> {
        self.read_user_links(&self.handler_dir(pack, handler).join(USER_LINKS))
    }

    /// Drop a handler's user-link ledger. Returns `false` if absent.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if removal fails.
    pub fn forget_user_links(&self, pack: &str, handler: &str) -> Result<bool> {
        self.remove_entry(&self.handler_dir(pack, handler).join(USER_LINKS))
    }

    /// Non-hidden entries under a handler's state dir, sorted.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the directory exists but cannot be read.
    pub fn list_entries(&self, pack: &str, handler: &str) -> Result<Vec<PathBuf>> {
        let dir = self.handler_dir(pack, handler);
        match self.fs.read_dir(&dir) {
            Ok(entries) => Ok(entries
                .into_iter()
                .filter(|p| !basename(p).to_string_lossy().starts_with('.'))
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(DodotError::fs("read_dir", dir, e)),
        }
    }

    /// Remove a handler's whole state dir. Returns `false` if absent.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if removal fails.
    pub fn remove_state(&self, pack: &str, handler: &str) -> Result<bool> {
        self.remove_entry(&self.handler_dir(pack, handler))
    }

    // ------------------------------------------------------------------
    // Sentinels
    // ------------------------------------------------------------------

    /// Full path of a sentinel.
    #[must_use]
    pub fn sentinel_path(&self, pack: &str, handler: &str, sentinel: &str) -> PathBuf {
        self.handler_dir(pack, handler).join(sentinel)
    }

    /// Read a sentinel record, if present.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the file exists but cannot be read.
    pub fn read_sentinel(
        &self,
        pack: &str,
        handler: &str,
        sentinel: &str,
    ) -> Result<Option<Sentinel>> {
        let path = self.sentinel_path(pack, handler, sentinel);
        match self.fs.read(&path) {
            Ok(bytes) => Ok(Some(Sentinel::parse(&String::from_utf8_lossy(&bytes)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DodotError::fs("read", path, e)),
        }
    }

    /// `true` unless a sentinel with exactly `checksum` exists.
    ///
    /// # Errors
    ///
    /// See [`DataStore::read_sentinel`].
    pub fn needs_run(
        &self,
        pack: &str,
        handler: &str,
        sentinel: &str,
        checksum: &str,
    ) -> Result<bool> {
        Ok(self
            .read_sentinel(pack, handler, sentinel)?
            .is_none_or(|s| s.checksum != checksum))
    }

    /// Write `<checksum>|<now>` to the sentinel, atomically.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the record cannot be written.
    pub fn record_run(
        &self,
        pack: &str,
        handler: &str,
        sentinel: &str,
        checksum: &str,
    ) -> Result<PathBuf> {
        let dir = self.handler_dir(pack, handler);
        self.mkdir(&dir)?;
        let path = dir.join(sentinel);
        let record = format!("{}\n", Sentinel::now(checksum));
        self.write_atomic(&path, record.as_bytes())?;
        Ok(path)
    }

    /// Sentinel files under a handler's state dir.
    ///
    /// # Errors
    ///
    /// See [`DataStore::list_entries`].
    pub fn list_sentinels(&self, pack: &str, handler: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .list_entries(pack, handler)?
            .into_iter()
            .filter(|p| basename(p).to_string_lossy().ends_with(SENTINEL_SUFFIX))
            .collect())
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = path.with_file_name(format!(".{}.tmp", basename(path).to_string_lossy()));
        self.fs
            .write(&tmp, contents)
            .map_err(|e| DodotError::fs("write", &tmp, e))?;
        self.fs
            .rename(&tmp, path)
            .map_err(|e| DodotError::fs("rename", path, e))
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Status of the intermediate link for `source`.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the link cannot be inspected.
    pub fn link_status(&self, pack: &str, handler: &str, source: &Path) -> Result<Status> {
        let intermediate = self.intermediate_path(pack, handler, source);
        match self.fs.symlink_metadata(&intermediate) {
            Ok(meta) if meta.is_symlink() => {
                let target = absolutize_link_target(&intermediate, &self.read_link(&intermediate)?);
                if !same_path(&target, source) {
                    Ok(Status::error(
                        StatusError::WrongTarget,
                        format!("staged link points to {}", target.display()),
                    ))
                } else if !self.fs.exists(source) {
                    Ok(Status::error(
                        StatusError::MissingSource,
                        format!("{} no longer exists", source.display()),
                    ))
                } else {
                    Ok(Status::ready("staged"))
                }
            }
            Ok(_) => Ok(Status::error(
                StatusError::NotALink,
                format!("{} is not a link", intermediate.display()),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Status::missing("not staged")),
            Err(e) => Err(DodotError::fs("lstat", intermediate, e)),
        }
    }

    /// Status of a two-hop symlink: the intermediate plus, when given, the
    /// user-facing link.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if a link cannot be inspected.
    pub fn symlink_status(
        &self,
        pack: &str,
        handler: &str,
        source: &Path,
        user: Option<&Path>,
    ) -> Result<Status> {
        let staged = self.link_status(pack, handler, source)?;
        let Some(user) = user else {
            return Ok(staged);
        };
        if staged.state != StatusState::Ready {
            return Ok(staged);
        }
        let intermediate = self.intermediate_path(pack, handler, source);
        match self.fs.symlink_metadata(user) {
            Ok(meta) if meta.is_symlink() => {
                if self.is_user_link(user, &intermediate)? {
                    Ok(Status::ready(format!("linked at {}", user.display())))
                } else {
                    Ok(Status::error(
                        StatusError::ForeignLink,
                        format!("{} links elsewhere", user.display()),
                    ))
                }
            }
            Ok(_) => Ok(Status::error(
                StatusError::NotALink,
                format!("{} is occupied", user.display()),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Status::pending(format!(
                "staged, but {} is not linked",
                user.display()
            ))),
            Err(e) => Err(DodotError::fs("lstat", user, e)),
        }
    }

    /// Status of a run-once input from its sentinel.
    ///
    /// # Errors
    ///
    /// See [`DataStore::read_sentinel`].
    pub fn sentinel_status(
        &self,
        pack: &str,
        handler: &str,
        sentinel: &str,
        checksum: &str,
    ) -> Result<Status> {
        Ok(match self.read_sentinel(pack, handler, sentinel)? {
            None => Status::missing("never run"),
            Some(record) if record.checksum == checksum => {
                Status::ready("provisioned").at(record.timestamp)
            }
            Some(record) => Status::pending("changed since last run").at(record.timestamp),
        })
    }

    // ------------------------------------------------------------------
    // Lock and shell init
    // ------------------------------------------------------------------

    /// Take the data-directory lock.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if another run holds the lock, or a
    /// filesystem error if the lock file cannot be created.
    pub fn lock(&self) -> Result<DataLock> {
        let path = self.paths.lock_file();
        self.mkdir(self.paths.data_dir())?;
        match self
            .fs
            .create_new(&path, std::process::id().to_string().as_bytes())
        {
            Ok(()) => Ok(DataLock {
                fs: Arc::clone(&self.fs),
                path,
            }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(DodotError::config(
                format!(
                    "data directory is locked by another run (remove {} if stale)",
                    path.display()
                ),
                Some(path),
            )),
            Err(e) => Err(DodotError::fs("create", path, e)),
        }
    }

    /// Write the shell init script when its content differs. Returns whether
    /// the file was written.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the script cannot be written.
    pub fn write_init_script(&self, content: &str) -> Result<bool> {
        let path = self.paths.init_script();
        if self
            .fs
            .read(&path)
            .is_ok_and(|existing| existing == content.as_bytes())
        {
            return Ok(false);
        }
        self.mkdir(&self.paths.shell_dir())?;
        self.write_atomic(&path, content.as_bytes())?;
        Ok(true)
    }
}
