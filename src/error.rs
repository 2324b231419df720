//! Domain-specific error types for the deployment engine.
//!
//! Library modules return [`DodotError`] (via the [`Result`] alias) while the
//! command layer at the CLI boundary converts to [`anyhow::Error`] with the
//! standard `?` operator.
//!
//! # Error taxonomy
//!
//! ```text
//! DodotError
//! ├── Config              dotfiles root, config files, data-dir lock
//! ├── NotFound            requested packs absent
//! ├── Rule                malformed pattern, unknown handler
//! ├── ActionGeneration    handler refused a match
//! ├── Fs                  filesystem primitive failed
//! ├── Execution           external command failed
//! ├── Consistency         link points somewhere unexpected
//! ├── Cancelled           cooperative cancel (carries partial context)
//! ├── ActionsFailed       aggregate per-action failure (carries context)
//! └── Internal            invariant violation
//! ```

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::context::ExecutionContext;

/// Convenience alias used throughout the library.
pub type Result<T, E = DodotError> = std::result::Result<T, E>;

/// Closed classification of [`DodotError`] variants.
///
/// Used for exit codes and for per-action error records, which must be
/// cloneable and therefore cannot hold the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing dotfiles root, unreadable configuration.
    Config,
    /// Requested pack not present.
    NotFound,
    /// Malformed pattern or unknown handler name.
    Rule,
    /// A handler refused a match.
    ActionGeneration,
    /// Underlying filesystem operation failed.
    Fs,
    /// External command returned non-zero or could not be launched.
    Execution,
    /// Intermediate or user link points somewhere unexpected.
    Consistency,
    /// Cooperatively cancelled.
    Cancelled,
    /// Invariant violation.
    Internal,
}

impl ErrorKind {
    /// Process exit code for a failure of this kind.
    ///
    /// `2` for configuration and discovery problems, `3` for cancellation,
    /// `1` for everything that happened while executing.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Config | Self::NotFound | Self::Rule => 2,
            Self::Cancelled => 3,
            Self::ActionGeneration
            | Self::Fs
            | Self::Execution
            | Self::Consistency
            | Self::Internal => 1,
        }
    }

    /// Short machine-friendly tag (e.g. `"consistency"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "configuration",
            Self::NotFound => "not-found",
            Self::Rule => "rule-evaluation",
            Self::ActionGeneration => "action-generation",
            Self::Fs => "fs",
            Self::Execution => "execution",
            Self::Consistency => "consistency",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for the deployment engine.
#[derive(Error, Debug)]
pub enum DodotError {
    /// Bad or missing dotfiles root, unreadable config, lock held elsewhere.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description.
        message: String,
        /// File or directory involved, when known.
        path: Option<PathBuf>,
    },

    /// One or more requested packs could not be found.
    #[error("pack(s) not found: {} (searched {root}, resolved from {source_desc})", .packs.join(", "))]
    NotFound {
        /// Names that did not resolve.
        packs: Vec<String>,
        /// Dotfiles root that was searched.
        root: String,
        /// Where the root came from (explicit, env, git, fallback cwd).
        source_desc: String,
    },

    /// A rule could not be evaluated.
    #[error("rule error for pattern '{pattern}': {message}")]
    Rule {
        /// Pattern as written in the config.
        pattern: String,
        /// What went wrong.
        message: String,
    },

    /// A handler refused a match.
    #[error("handler '{handler}' refused {}: {reason}", .path.display())]
    ActionGeneration {
        /// Handler name.
        handler: String,
        /// Source path of the refused match.
        path: PathBuf,
        /// Reason given by the handler.
        reason: String,
    },

    /// A filesystem primitive failed.
    #[error("{op} {}: {source}", .path.display())]
    Fs {
        /// Operation name (e.g. `"symlink"`).
        op: &'static str,
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An external command failed.
    #[error("command '{command}' failed{}: {stderr}", .code.map_or_else(String::new, |c| format!(" (exit {c})")))]
    Execution {
        /// Rendered command line.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Trimmed stderr, or a launch/timeout description.
        stderr: String,
    },

    /// A path is not in the state the engine expects and will not be touched.
    #[error("refusing to modify {}: {message}", .path.display())]
    Consistency {
        /// The path that is in an unexpected state.
        path: PathBuf,
        /// Description of the unexpected state.
        message: String,
    },

    /// The run was cancelled; `context` holds everything finished before.
    #[error("cancelled")]
    Cancelled {
        /// Partial results.
        context: Box<ExecutionContext>,
    },

    /// Some actions failed; `context` holds the full result set.
    #[error("{failed} action(s) failed")]
    ActionsFailed {
        /// Number of failed actions.
        failed: usize,
        /// Populated results, including successes.
        context: Box<ExecutionContext>,
    },

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DodotError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Rule { .. } => ErrorKind::Rule,
            Self::ActionGeneration { .. } => ErrorKind::ActionGeneration,
            Self::Fs { .. } => ErrorKind::Fs,
            Self::Execution { .. } | Self::ActionsFailed { .. } => ErrorKind::Execution,
            Self::Consistency { .. } => ErrorKind::Consistency,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The execution context attached to aggregate errors, if any.
    #[must_use]
    pub fn context(&self) -> Option<&ExecutionContext> {
        match self {
            Self::Cancelled { context } | Self::ActionsFailed { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Config {
            message: message.into(),
            path,
        }
    }

    /// Shorthand for a filesystem error.
    pub fn fs(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Fs {
            op,
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a consistency error.
    pub fn consistency(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Consistency {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Cloneable record of a per-action failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionError {
    /// Category of the failure.
    pub kind: ErrorKind,
    /// Rendered error message.
    pub message: String,
}

impl From<&DodotError> for ActionError {
    fn from(err: &DodotError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<DodotError> for ActionError {
    fn from(err: DodotError) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}
