//! Core data model: packs, run modes, command intents, actions, operations.
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::PackConfig;
use crate::error::{ActionError, DodotError};
use crate::exec::CommandSpec;

/// Whether a handler manages links (repeatable) or runs commands (once).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Idempotent, repeatable link maintenance.
    Linking,
    /// Sentinel-guarded, run-once provisioning.
    Provisioning,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linking => f.write_str("linking"),
            Self::Provisioning => f.write_str("provisioning"),
        }
    }
}

/// What the user asked the pipeline to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandIntent {
    /// Linking handlers only.
    Link,
    /// Provisioning handlers only.
    Provision,
    /// Both categories.
    All,
    /// Inverse of linking.
    Unlink,
    /// Inverse of provisioning.
    Deprovision,
}

impl CommandIntent {
    /// `true` if handlers of `mode` take part in this intent.
    #[must_use]
    pub const fn includes(self, mode: RunMode) -> bool {
        matches!(
            (self, mode),
            (Self::All, _)
                | (Self::Link | Self::Unlink, RunMode::Linking)
                | (Self::Provision | Self::Deprovision, RunMode::Provisioning)
        )
    }

    /// `true` for the clearing intents.
    #[must_use]
    pub const fn is_inverse(self) -> bool {
        matches!(self, Self::Unlink | Self::Deprovision)
    }

    /// Command name used in logs and the execution context.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Provision => "provision",
            Self::All => "deploy",
            Self::Unlink => "unlink",
            Self::Deprovision => "deprovision",
        }
    }
}

impl fmt::Display for CommandIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A top-level directory of the dotfiles root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pack {
    /// Directory name; unique within the root.
    pub name: String,
    /// Absolute path to the pack directory.
    pub path: PathBuf,
    /// Parsed pack configuration.
    pub config: PackConfig,
}

impl Pack {
    /// Build a pack with the given configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, config: PackConfig) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            config,
        }
    }
}

/// The concrete effect an [`Operation`] has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Stage the source under the handler's state dir.
    LinkData,
    /// Point the user-facing path (`destination`) at the intermediate
    /// (`source`).
    LinkUser,
    /// Stage a directory for `PATH` inclusion.
    AddToPath,
    /// Stage a script for sourcing by the shell init script.
    RegisterShell,
    /// Run a command once per input checksum and record a sentinel.
    RunOnce {
        /// Sentinel file name under the handler state dir.
        sentinel: String,
        /// Checksum of the input file.
        checksum: String,
        /// Command to run.
        command: CommandSpec,
    },
}

impl OperationKind {
    /// `true` for operations that create an intermediate in the data dir.
    #[must_use]
    pub const fn is_staging(&self) -> bool {
        matches!(self, Self::LinkData | Self::AddToPath | Self::RegisterShell)
    }
}

/// A primitive step of an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Owning pack.
    pub pack: String,
    /// Handler that produced the operation.
    pub handler: String,
    /// Input path (a pack file, or an intermediate for [`OperationKind::LinkUser`]).
    pub source: PathBuf,
    /// Path the operation creates or records.
    pub destination: PathBuf,
    /// What to do.
    pub kind: OperationKind,
}

impl Operation {
    /// Short verb for logs.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self.kind {
            OperationKind::LinkData => "stage",
            OperationKind::LinkUser => "link",
            OperationKind::AddToPath => "add to PATH",
            OperationKind::RegisterShell => "register",
            OperationKind::RunOnce { .. } => "run",
        }
    }
}

/// A unit of intended change produced by a handler from one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Owning pack.
    pub pack: String,
    /// Handler that produced the action.
    pub handler: String,
    /// Absolute source path inside the pack.
    pub source: PathBuf,
    /// Source path relative to the pack directory.
    pub relative: PathBuf,
    /// User-facing path, when the action creates one.
    pub target: Option<PathBuf>,
    /// Checksum of the source, for provisioning actions.
    pub checksum: Option<String>,
    /// Sentinel name, for provisioning actions.
    pub sentinel: Option<String>,
    /// Human-readable description.
    pub description: String,
    /// Primitive steps, executed in order.
    pub operations: Vec<Operation>,
}

impl Action {
    /// Relative source path as displayed in results.
    #[must_use]
    pub fn file(&self) -> String {
        display_relative(&self.relative)
    }
}

/// A match its handler declined to turn into an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    /// Owning pack.
    pub pack: String,
    /// Handler that refused.
    pub handler: String,
    /// Pack-relative path of the match.
    pub file: String,
    /// Why the match was refused.
    pub error: ActionError,
}

impl Refusal {
    /// Refusal of the match at `relative`.
    #[must_use]
    pub fn new(pack: &str, handler: &str, relative: &Path, err: &DodotError) -> Self {
        Self {
            pack: pack.to_string(),
            handler: handler.to_string(),
            file: display_relative(relative),
            error: ActionError::from(err),
        }
    }
}

/// Planning outcome of one match.
pub type Planned = Result<Action, Refusal>;

/// Render a pack-relative path with forward slashes.
#[must_use]
pub fn display_relative(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
