//! Path resolution: dotfiles root, data directory, and per-pack state dirs.
//!
//! The process environment is read exactly once into an [`Environment`]
//! snapshot; everything below the command layer works from that snapshot.
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{DodotError, Result};

/// Environment variable naming the dotfiles root.
pub const DOTFILES_ROOT_ENV: &str = "DOTFILES_ROOT";
/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DODOT_DATA_DIR";

/// Name of the directory under the platform data dir.
const APP_DIR: &str = "dodot";

/// Snapshot of the environment inputs the engine depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// Value of `DOTFILES_ROOT`, if set.
    pub dotfiles_root: Option<PathBuf>,
    /// Value of `DODOT_DATA_DIR`, if set.
    pub data_dir: Option<PathBuf>,
    /// Platform user data directory (e.g. `$XDG_DATA_HOME`).
    pub platform_data_dir: Option<PathBuf>,
    /// The user's home directory.
    pub home: Option<PathBuf>,
    /// Current working directory.
    pub cwd: Option<PathBuf>,
}

impl Environment {
    /// Read the process environment.
    #[must_use]
    pub fn capture() -> Self {
        let non_empty = |key: &str| {
            std::env::var_os(key)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            dotfiles_root: non_empty(DOTFILES_ROOT_ENV),
            data_dir: non_empty(DATA_DIR_ENV),
            platform_data_dir: dirs::data_dir(),
            home: dirs::home_dir(),
            cwd: std::env::current_dir().ok(),
        }
    }
}

/// Where the dotfiles root came from, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSource {
    /// `--dotfiles-root` on the command line (or set programmatically).
    Explicit,
    /// The `DOTFILES_ROOT` environment variable.
    Env,
    /// The nearest enclosing git repository of the working directory.
    GitRepository,
    /// The current working directory, used as a last resort.
    Fallback,
}

impl fmt::Display for RootSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => f.write_str("explicit --dotfiles-root"),
            Self::Env => write!(f, "{DOTFILES_ROOT_ENV} environment variable"),
            Self::GitRepository => f.write_str("enclosing git repository"),
            Self::Fallback => f.write_str("current directory (fallback)"),
        }
    }
}

/// Resolve the dotfiles root: explicit, env var, git repository, cwd.
///
/// # Errors
///
/// Returns a configuration error if no candidate can be determined.
pub fn resolve_dotfiles_root(
    explicit: Option<&Path>,
    env: &Environment,
) -> Result<(PathBuf, RootSource)> {
    if let Some(root) = explicit {
        return Ok((root.to_path_buf(), RootSource::Explicit));
    }
    if let Some(root) = &env.dotfiles_root {
        return Ok((root.clone(), RootSource::Env));
    }
    let cwd = env.cwd.clone().ok_or_else(|| {
        DodotError::config(
            format!("cannot determine dotfiles root: use --dotfiles-root or set {DOTFILES_ROOT_ENV}"),
            None,
        )
    })?;
    if let Ok(repo) = git2::Repository::discover(&cwd)
        && let Some(workdir) = repo.workdir()
    {
        return Ok((workdir.to_path_buf(), RootSource::GitRepository));
    }
    Ok((cwd, RootSource::Fallback))
}

/// Canonical locations derived from the dotfiles root, data dir, and home.
///
/// Pure: constructing or querying a `Paths` never touches the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    dotfiles_root: PathBuf,
    root_source: RootSource,
    data_dir: PathBuf,
    home: PathBuf,
}

impl Paths {
    /// Build from explicit locations.
    #[must_use]
    pub fn new(
        dotfiles_root: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        home: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dotfiles_root: dotfiles_root.into(),
            root_source: RootSource::Explicit,
            data_dir: data_dir.into(),
            home: home.into(),
        }
    }

    /// Resolve all locations from the environment snapshot.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the dotfiles root, the data directory,
    /// or the home directory cannot be determined.
    pub fn from_environment(explicit_root: Option<&Path>, env: &Environment) -> Result<Self> {
        let (root, root_source) = resolve_dotfiles_root(explicit_root, env)?;
        let root = dunce::canonicalize(&root).unwrap_or(root);

        let data_dir = env
            .data_dir
            .clone()
            .or_else(|| env.platform_data_dir.as_ref().map(|d| d.join(APP_DIR)))
            .ok_or_else(|| {
                DodotError::config(
                    format!("cannot determine data directory: set {DATA_DIR_ENV}"),
                    None,
                )
            })?;
        let home = env
            .home
            .clone()
            .ok_or_else(|| DodotError::config("cannot determine home directory", None))?;

        Ok(Self {
            dotfiles_root: root,
            root_source,
            data_dir,
            home,
        })
    }

    /// Directory holding the packs.
    #[must_use]
    pub fn dotfiles_root(&self) -> &Path {
        &self.dotfiles_root
    }

    /// How the dotfiles root was determined.
    #[must_use]
    pub const fn root_source(&self) -> RootSource {
        self.root_source
    }

    /// Private engine-owned data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The user's home directory.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `<data>/packs`.
    #[must_use]
    pub fn packs_state_dir(&self) -> PathBuf {
        self.data_dir.join("packs")
    }

    /// `<data>/packs/<pack>`.
    #[must_use]
    pub fn pack_state_dir(&self, pack: &str) -> PathBuf {
        self.packs_state_dir().join(pack)
    }

    /// `<data>/packs/<pack>/<state_dir>`, the per-handler state directory.
    #[must_use]
    pub fn handler_dir(&self, pack: &str, state_dir: &str) -> PathBuf {
        self.pack_state_dir(pack).join(state_dir)
    }

    /// `<data>/shell`.
    #[must_use]
    pub fn shell_dir(&self) -> PathBuf {
        self.data_dir.join("shell")
    }

    /// Generated shell init script.
    #[must_use]
    pub fn init_script(&self) -> PathBuf {
        self.shell_dir().join("dodot-init.sh")
    }

    /// Data-directory lock file.
    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join(".lock")
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn env_with(root: Option<&str>) -> Environment {
        Environment {
            dotfiles_root: root.map(PathBuf::from),
            data_dir: Some(PathBuf::from("/data")),
            platform_data_dir: Some(PathBuf::from("/xdg")),
            home: Some(PathBuf::from("/h")),
            cwd: Some(PathBuf::from("/")),
        }
    }

    #[test]
    fn explicit_root_wins_over_env() {
        let env = env_with(Some("/from-env"));
        let (root, source) = resolve_dotfiles_root(Some(Path::new("/explicit")), &env).unwrap();
        assert_eq!(root, PathBuf::from("/explicit"));
        assert_eq!(source, RootSource::Explicit);
    }

    #[test]
    fn env_root_used_when_no_explicit() {
        let env = env_with(Some("/from-env"));
        let (root, source) = resolve_dotfiles_root(None, &env).unwrap();
        assert_eq!(root, PathBuf::from("/from-env"));
        assert_eq!(source, RootSource::Env);
    }

    #[test]
    fn git_repository_root_discovered_from_subdir() {
        let dir = tempfile::tempdir().unwrap();
        git2::Repository::init(dir.path()).unwrap();
        let sub = dir.path().join("vim");
        std::fs::create_dir(&sub).unwrap();
        let env = Environment {
            cwd: Some(sub),
            ..Environment::default()
        };
        let (root, source) = resolve_dotfiles_root(None, &env).unwrap();
        assert_eq!(source, RootSource::GitRepository);
        assert_eq!(
            dunce::canonicalize(root).unwrap(),
            dunce::canonicalize(dir.path()).unwrap()
        );
    }

    #[test]
    fn missing_cwd_is_config_error() {
        let env = Environment::default();
        let err = resolve_dotfiles_root(None, &env).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn data_dir_prefers_override() {
        let paths = Paths::from_environment(Some(Path::new("/dots")), &env_with(None)).unwrap();
        assert_eq!(paths.data_dir(), Path::new("/data"));
        assert_eq!(paths.home(), Path::new("/h"));
    }

    #[test]
    fn data_dir_falls_back_to_platform_dir() {
        let env = Environment {
            data_dir: None,
            ..env_with(None)
        };
        let paths = Paths::from_environment(Some(Path::new("/dots")), &env).unwrap();
        assert_eq!(paths.data_dir(), Path::new("/xdg/dodot"));
    }

    #[test]
    fn missing_home_is_config_error() {
        let env = Environment {
            home: None,
            ..env_with(None)
        };
        assert!(Paths::from_environment(Some(Path::new("/dots")), &env).is_err());
    }

    #[test]
    fn state_layout() {
        let paths = Paths::new("/dots", "/data", "/h");
        assert_eq!(
            paths.handler_dir("vim", "symlinks"),
            PathBuf::from("/data/packs/vim/symlinks")
        );
        assert_eq!(paths.lock_file(), PathBuf::from("/data/.lock"));
        assert_eq!(
            paths.init_script(),
            PathBuf::from("/data/shell/dodot-init.sh")
        );
    }
}
