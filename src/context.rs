//! Aggregated results of one pipeline run.
//!
//! An [`ExecutionContext`] collects per-pack, per-handler results as the
//! pipeline runs and derives pack and overall status from them. Once
//! [`ExecutionContext::complete`] has been called it is frozen.
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::datastore::StatusState;
use crate::error::{ActionError, DodotError, Result};

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    /// Owning pack.
    pub pack: String,
    /// Handler that produced the action.
    pub handler: String,
    /// Pack-relative source path.
    pub file: String,
    /// Description of what was (or would be) done.
    pub description: String,
    /// `Ready`, `Skipped`, or `Error`.
    pub status: StatusState,
    /// Short explanation.
    pub message: String,
    /// Failure detail when `status` is `Error`.
    pub error: Option<ActionError>,
}

impl ActionResult {
    /// Whether this action failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.status == StatusState::Error
    }
}

/// Kind of item removed by a clear operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearedKind {
    /// A user-facing link into the data dir.
    UserLink,
    /// A staged intermediate link.
    Intermediate,
    /// A run-once sentinel.
    Sentinel,
    /// A whole handler state directory.
    StateDir,
}

impl fmt::Display for ClearedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserLink => "user link",
            Self::Intermediate => "intermediate",
            Self::Sentinel => "sentinel",
            Self::StateDir => "state dir",
        })
    }
}

/// One item a clear operation removed (or would remove in dry-run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearedItem {
    /// What kind of item.
    pub kind: ClearedKind,
    /// Path of the item.
    pub path: PathBuf,
    /// Whether removal succeeded (always `true` in dry-run).
    pub success: bool,
    /// Failure detail.
    pub error: Option<String>,
}

impl ClearedItem {
    /// Final path component, or the whole path when it has none.
    #[must_use]
    pub fn name(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }
}

/// Result of running one handler over one pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResult {
    /// Handler name.
    pub handler: String,
    /// Pack-relative files the handler processed.
    pub files: Vec<String>,
    /// Terminal status: `Ready`, `Skipped`, or `Error`.
    pub status: StatusState,
    /// Handler-level failure (e.g. refused matches).
    pub error: Option<ActionError>,
    /// Per-action outcomes.
    pub actions: Vec<ActionResult>,
    /// Items removed by a clear operation.
    pub cleared: Vec<ClearedItem>,
}

impl HandlerResult {
    /// Derive a handler result from its action results.
    ///
    /// Any failed action fails the handler; a handler whose actions were all
    /// skipped is skipped.
    #[must_use]
    pub fn from_actions(handler: impl Into<String>, actions: Vec<ActionResult>) -> Self {
        let status = if actions.iter().any(ActionResult::failed) {
            StatusState::Error
        } else if actions.iter().all(|a| a.status == StatusState::Skipped) {
            StatusState::Skipped
        } else {
            StatusState::Ready
        };
        let error = actions.iter().find_map(|a| a.error.clone());
        Self {
            handler: handler.into(),
            files: actions.iter().map(|a| a.file.clone()).collect(),
            status,
            error,
            actions,
            cleared: Vec::new(),
        }
    }

    /// A handler that failed before producing actions.
    #[must_use]
    pub fn failed(handler: impl Into<String>, files: Vec<String>, error: ActionError) -> Self {
        Self {
            handler: handler.into(),
            files,
            status: StatusState::Error,
            error: Some(error),
            actions: Vec::new(),
            cleared: Vec::new(),
        }
    }

    /// Derive a handler result from clear output.
    ///
    /// `files` holds entry names, like the action-based results; full paths
    /// stay on the cleared items.
    #[must_use]
    pub fn from_cleared(handler: impl Into<String>, cleared: Vec<ClearedItem>) -> Self {
        let failure = cleared.iter().find(|c| !c.success);
        let status = if failure.is_some() {
            StatusState::Error
        } else if cleared.is_empty() {
            StatusState::Skipped
        } else {
            StatusState::Ready
        };
        let error = failure.map(|c| ActionError {
            kind: crate::error::ErrorKind::Fs,
            message: c.error.clone().unwrap_or_default(),
        });
        Self {
            handler: handler.into(),
            files: cleared.iter().map(ClearedItem::name).collect(),
            status,
            error,
            actions: Vec::new(),
            cleared,
        }
    }

    /// Failed units: failed actions or cleared items, or `1` for a handler
    /// that failed before producing either.
    #[must_use]
    pub fn failures(&self) -> usize {
        let units = self.actions.iter().filter(|a| a.failed()).count()
            + self.cleared.iter().filter(|c| !c.success).count();
        if units == 0 && self.status == StatusState::Error {
            1
        } else {
            units
        }
    }
}

/// Status of a pack after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackStatus {
    /// Every handler completed.
    Success,
    /// Some handlers failed, others did not.
    Partial,
    /// Every handler failed.
    Error,
    /// Every handler was skipped (or there were none).
    Skipped,
}

impl fmt::Display for PackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
            Self::Skipped => "skipped",
        })
    }
}

/// Results for one pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackExecutionResult {
    /// Pack name.
    pub pack: String,
    handlers: Vec<HandlerResult>,
    completed: usize,
    failed: usize,
    skipped: usize,
    status: PackStatus,
}

impl PackExecutionResult {
    fn new(pack: &str) -> Self {
        Self {
            pack: pack.to_string(),
            handlers: Vec::new(),
            completed: 0,
            failed: 0,
            skipped: 0,
            status: PackStatus::Skipped,
        }
    }

    fn add(&mut self, result: HandlerResult) {
        match result.status {
            StatusState::Error => self.failed += 1,
            StatusState::Skipped => self.skipped += 1,
            _ => {}
        }
        if result.status != StatusState::Error {
            self.completed += 1;
        }
        self.handlers.push(result);
        self.status = self.derive_status();
    }

    fn derive_status(&self) -> PackStatus {
        let total = self.handlers.len();
        if total == 0 || self.skipped == total {
            PackStatus::Skipped
        } else if self.failed == 0 {
            PackStatus::Success
        } else if self.failed == total {
            PackStatus::Error
        } else {
            PackStatus::Partial
        }
    }

    /// Handler results in execution order.
    #[must_use]
    pub fn handlers(&self) -> &[HandlerResult] {
        &self.handlers
    }

    /// Number of handler results.
    #[must_use]
    pub fn total(&self) -> usize {
        self.handlers.len()
    }

    /// Handlers that did not fail (ready or skipped).
    #[must_use]
    pub const fn completed(&self) -> usize {
        self.completed
    }

    /// Handlers that failed.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.failed
    }

    /// Handlers that were skipped.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// Derived pack status.
    #[must_use]
    pub const fn status(&self) -> PackStatus {
        self.status
    }

    /// Every action result across handlers.
    pub fn actions(&self) -> impl Iterator<Item = &ActionResult> {
        self.handlers.iter().flat_map(|h| h.actions.iter())
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Not yet completed.
    Running,
    /// No failures.
    Success,
    /// Some packs failed, others did not.
    Partial,
    /// Every pack with results failed.
    Error,
    /// Stopped by cancellation.
    Cancelled,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    command: String,
    dry_run: bool,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    packs: BTreeMap<String, PackExecutionResult>,
    status: ExecutionStatus,
}

impl ExecutionContext {
    /// Start a new context for `command`.
    #[must_use]
    pub fn new(command: impl Into<String>, dry_run: bool) -> Self {
        Self {
            command: command.into(),
            dry_run,
            started_at: Utc::now(),
            ended_at: None,
            packs: BTreeMap::new(),
            status: ExecutionStatus::Running,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.ended_at.is_some() {
            return Err(DodotError::Internal(format!(
                "execution context for '{}' is already complete",
                self.command
            )));
        }
        Ok(())
    }

    /// Register a pack that may end up with no handler results.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the context is already complete.
    pub fn add_pack(&mut self, pack: &str) -> Result<()> {
        self.ensure_open()?;
        self.packs
            .entry(pack.to_string())
            .or_insert_with(|| PackExecutionResult::new(pack));
        Ok(())
    }

    /// Record a handler result for `pack`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the context is already complete.
    pub fn add_handler_result(&mut self, pack: &str, result: HandlerResult) -> Result<()> {
        self.ensure_open()?;
        self.packs
            .entry(pack.to_string())
            .or_insert_with(|| PackExecutionResult::new(pack))
            .add(result);
        Ok(())
    }

    /// Freeze the context and derive the overall status.
    ///
    /// # Errors
    ///
    /// Returns an internal error if called twice.
    pub fn complete(&mut self) -> Result<()> {
        self.ensure_open()?;
        let with_results: Vec<_> = self.packs.values().filter(|p| p.total() > 0).collect();
        let failing = with_results.iter().filter(|p| p.failed() > 0).count();
        self.status = if failing == 0 {
            ExecutionStatus::Success
        } else if with_results
            .iter()
            .all(|p| p.status() == PackStatus::Error)
        {
            ExecutionStatus::Error
        } else {
            ExecutionStatus::Partial
        };
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Freeze the context as cancelled.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the context is already complete.
    pub fn complete_cancelled(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.status = ExecutionStatus::Cancelled;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Command name (`link`, `deploy`, ...).
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whether the run was a dry run.
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// When the run started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the run completed, if it has.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Overall status.
    #[must_use]
    pub const fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Per-pack results in alphabetical order.
    pub fn packs(&self) -> impl Iterator<Item = &PackExecutionResult> {
        self.packs.values()
    }

    /// Results for one pack.
    #[must_use]
    pub fn pack(&self, name: &str) -> Option<&PackExecutionResult> {
        self.packs.get(name)
    }

    /// Every action result, packs in alphabetical order.
    pub fn actions(&self) -> impl Iterator<Item = &ActionResult> {
        self.packs.values().flat_map(PackExecutionResult::actions)
    }

    /// Number of failed units across packs; see [`HandlerResult::failures`].
    #[must_use]
    pub fn failures(&self) -> usize {
        self.packs
            .values()
            .flat_map(PackExecutionResult::handlers)
            .map(HandlerResult::failures)
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn action(status: StatusState) -> ActionResult {
        ActionResult {
            pack: "p".to_string(),
            handler: "symlink".to_string(),
            file: "f".to_string(),
            description: "d".to_string(),
            status,
            message: String::new(),
            error: (status == StatusState::Error).then(|| ActionError {
                kind: ErrorKind::Consistency,
                message: "boom".to_string(),
            }),
        }
    }

    fn handler(status: StatusState) -> HandlerResult {
        HandlerResult::from_actions("symlink", vec![action(status)])
    }

    // ------------------------------------------------------------------
    // HandlerResult
    // ------------------------------------------------------------------

    #[test]
    fn handler_status_from_actions() {
        let mixed = HandlerResult::from_actions(
            "symlink",
            vec![action(StatusState::Ready), action(StatusState::Error)],
        );
        assert_eq!(mixed.status, StatusState::Error);
        assert_eq!(mixed.error.unwrap().kind, ErrorKind::Consistency);

        let skipped = HandlerResult::from_actions(
            "symlink",
            vec![action(StatusState::Skipped), action(StatusState::Skipped)],
        );
        assert_eq!(skipped.status, StatusState::Skipped);

        let some = HandlerResult::from_actions(
            "symlink",
            vec![action(StatusState::Skipped), action(StatusState::Ready)],
        );
        assert_eq!(some.status, StatusState::Ready);
    }

    #[test]
    fn cleared_status() {
        let ok = HandlerResult::from_cleared(
            "symlink",
            vec![ClearedItem {
                kind: ClearedKind::Intermediate,
                path: PathBuf::from("/data/x"),
                success: true,
                error: None,
            }],
        );
        assert_eq!(ok.status, StatusState::Ready);
        assert_eq!(ok.files, vec!["x"]);
        assert_eq!(ok.cleared[0].path, PathBuf::from("/data/x"));
        assert_eq!(
            HandlerResult::from_cleared("install", Vec::new()).status,
            StatusState::Skipped
        );
    }

    // ------------------------------------------------------------------
    // Pack status
    // ------------------------------------------------------------------

    #[test]
    fn pack_status_rules() {
        let mut ctx = ExecutionContext::new("link", false);
        ctx.add_handler_result("ok", handler(StatusState::Ready)).unwrap();
        ctx.add_handler_result("ok", handler(StatusState::Skipped)).unwrap();
        ctx.add_handler_result("mixed", handler(StatusState::Ready)).unwrap();
        ctx.add_handler_result("mixed", handler(StatusState::Error)).unwrap();
        ctx.add_handler_result("bad", handler(StatusState::Error)).unwrap();
        ctx.add_handler_result("idle", handler(StatusState::Skipped)).unwrap();
        ctx.add_pack("empty").unwrap();

        assert_eq!(ctx.pack("ok").unwrap().status(), PackStatus::Success);
        assert_eq!(ctx.pack("ok").unwrap().completed(), 2);
        assert_eq!(ctx.pack("mixed").unwrap().status(), PackStatus::Partial);
        assert_eq!(ctx.pack("bad").unwrap().status(), PackStatus::Error);
        assert_eq!(ctx.pack("idle").unwrap().status(), PackStatus::Skipped);
        assert_eq!(ctx.pack("empty").unwrap().status(), PackStatus::Skipped);
    }

    // ------------------------------------------------------------------
    // Overall status and immutability
    // ------------------------------------------------------------------

    #[test]
    fn overall_success() {
        let mut ctx = ExecutionContext::new("link", false);
        ctx.add_handler_result("a", handler(StatusState::Ready)).unwrap();
        ctx.complete().unwrap();
        assert_eq!(ctx.status(), ExecutionStatus::Success);
        assert!(ctx.ended_at().is_some());
    }

    #[test]
    fn overall_partial_when_one_pack_fails() {
        let mut ctx = ExecutionContext::new("link", false);
        ctx.add_handler_result("a", handler(StatusState::Ready)).unwrap();
        ctx.add_handler_result("b", handler(StatusState::Error)).unwrap();
        ctx.complete().unwrap();
        assert_eq!(ctx.status(), ExecutionStatus::Partial);
        assert_eq!(ctx.failures(), 1);
    }

    #[test]
    fn overall_error_when_all_fail() {
        let mut ctx = ExecutionContext::new("link", false);
        ctx.add_handler_result("b", handler(StatusState::Error)).unwrap();
        ctx.complete().unwrap();
        assert_eq!(ctx.status(), ExecutionStatus::Error);
    }

    #[test]
    fn completed_context_is_frozen() {
        let mut ctx = ExecutionContext::new("link", false);
        ctx.complete().unwrap();
        let err = ctx
            .add_handler_result("a", handler(StatusState::Ready))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(ctx.complete().is_err());
        assert!(ctx.pack("a").is_none());
    }

    #[test]
    fn failures_count_actions_items_and_refusals() {
        let mut ctx = ExecutionContext::new("link", false);
        ctx.add_handler_result(
            "a",
            HandlerResult::from_actions(
                "symlink",
                vec![action(StatusState::Error), action(StatusState::Error)],
            ),
        )
        .unwrap();
        ctx.add_handler_result(
            "b",
            HandlerResult::failed(
                "path",
                vec!["bin".to_string()],
                ActionError {
                    kind: ErrorKind::ActionGeneration,
                    message: "expected a directory".to_string(),
                },
            ),
        )
        .unwrap();
        assert_eq!(ctx.failures(), 3);
    }

    #[test]
    fn cancelled_context() {
        let mut ctx = ExecutionContext::new("provision", false);
        ctx.complete_cancelled().unwrap();
        assert_eq!(ctx.status(), ExecutionStatus::Cancelled);
    }

    #[test]
    fn packs_are_alphabetical() {
        let mut ctx = ExecutionContext::new("link", true);
        ctx.add_pack("zsh").unwrap();
        ctx.add_pack("git").unwrap();
        let names: Vec<_> = ctx.packs().map(|p| p.pack.as_str()).collect();
        assert_eq!(names, vec!["git", "zsh"]);
        assert!(ctx.dry_run());
    }
}
