//! Message kinds and the [`Log`] trait shared by direct and buffered loggers.

/// tracing target for stage headers.
pub(super) const STAGE_TARGET: &str = "dodot::stage";
/// tracing target for dry-run notices.
pub(super) const DRY_RUN_TARGET: &str = "dodot::dry_run";

/// What a logged line represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Section header, e.g. one per pack.
    Stage,
    /// Normal progress output.
    Info,
    /// Detail shown only with `--verbose` (always kept in the log file).
    Debug,
    /// Something the user should look at.
    Warn,
    /// A failure.
    Error,
    /// What a dry run would have done.
    DryRun,
}

impl LogKind {
    /// Send `msg` through tracing with the level and target for this kind.
    pub(super) fn emit(self, msg: &str) {
        match self {
            Self::Stage => tracing::info!(target: STAGE_TARGET, "{msg}"),
            Self::Info => tracing::info!("{msg}"),
            Self::Debug => tracing::debug!("{msg}"),
            Self::Warn => tracing::warn!("{msg}"),
            Self::Error => tracing::error!("{msg}"),
            Self::DryRun => tracing::info!(target: DRY_RUN_TARGET, "{msg}"),
        }
    }

    /// Recover the kind of a tracing event.
    pub(super) fn classify(level: tracing::Level, target: &str) -> Self {
        match level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::INFO => match target {
                STAGE_TARGET => Self::Stage,
                DRY_RUN_TARGET => Self::DryRun,
                _ => Self::Info,
            },
            _ => Self::Debug,
        }
    }
}

/// Sink for pipeline output.
///
/// [`Logger`](super::Logger) writes immediately; [`BufferedLog`](super::BufferedLog)
/// holds a pack's lines until the pack finishes so parallel packs never
/// interleave. Code that logs only sees this trait.
pub trait Log: Send + Sync {
    /// Record one message.
    fn record(&self, kind: LogKind, msg: &str);

    /// Section header.
    fn stage(&self, msg: &str) {
        self.record(LogKind::Stage, msg);
    }

    /// Progress message.
    fn info(&self, msg: &str) {
        self.record(LogKind::Info, msg);
    }

    /// Verbose-only detail.
    fn debug(&self, msg: &str) {
        self.record(LogKind::Debug, msg);
    }

    /// Warning.
    fn warn(&self, msg: &str) {
        self.record(LogKind::Warn, msg);
    }

    /// Error.
    fn error(&self, msg: &str) {
        self.record(LogKind::Error, msg);
    }

    /// Dry-run notice.
    fn dry_run(&self, msg: &str) {
        self.record(LogKind::DryRun, msg);
    }
}
