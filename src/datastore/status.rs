//! Deployment status values reported by handlers and the executor.
use std::fmt;

use chrono::{DateTime, Utc};

/// Lifecycle state of a deployable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusState {
    /// Never deployed.
    Missing,
    /// Partly deployed or stale; a run would change it.
    Pending,
    /// Deployed and consistent.
    Ready,
    /// Present but inconsistent, or the operation failed.
    Error,
    /// Nothing to do.
    Skipped,
}

impl StatusState {
    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item is in the [`StatusState::Error`] state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusError {
    /// The intermediate link points somewhere other than the source.
    WrongTarget,
    /// The intermediate exists but the source it points at is gone.
    MissingSource,
    /// Something that is not a link occupies a link location.
    NotALink,
    /// The user path is a link to something other than our intermediate.
    ForeignLink,
    /// The item cannot be deployed as configured.
    Invalid,
}

impl StatusError {
    /// Short tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WrongTarget => "wrong-target",
            Self::MissingSource => "missing-source",
            Self::NotALink => "not-a-link",
            Self::ForeignLink => "foreign-link",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status answer with optional detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// State.
    pub state: StatusState,
    /// Human-readable explanation.
    pub message: String,
    /// When the item was last provisioned, for sentinel-backed items.
    pub timestamp: Option<DateTime<Utc>>,
    /// Error classification when `state` is [`StatusState::Error`].
    pub error: Option<StatusError>,
}

impl Status {
    fn with(state: StatusState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            timestamp: None,
            error: None,
        }
    }

    /// Never deployed.
    #[must_use]
    pub fn missing(message: impl Into<String>) -> Self {
        Self::with(StatusState::Missing, message)
    }

    /// Stale.
    #[must_use]
    pub fn pending(message: impl Into<String>) -> Self {
        Self::with(StatusState::Pending, message)
    }

    /// Deployed.
    #[must_use]
    pub fn ready(message: impl Into<String>) -> Self {
        Self::with(StatusState::Ready, message)
    }

    /// Inconsistent.
    #[must_use]
    pub fn error(kind: StatusError, message: impl Into<String>) -> Self {
        Self {
            error: Some(kind),
            ..Self::with(StatusState::Error, message)
        }
    }

    /// Attach a timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error {
            Some(kind) => write!(f, "{} ({kind}): {}", self.state, self.message),
            None => write!(f, "{}: {}", self.state, self.message),
        }
    }
}
