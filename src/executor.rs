//! Action executor: applies operations through the data store.
//!
//! Every planned match yields exactly one [`ActionResult`]: a refused match
//! or a failing action never aborts the rest of the batch. Cancellation is
//! checked between actions.
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::ActionResult;
use crate::datastore::{DataStore, LinkOutcome, StatusState};
use crate::error::{ActionError, DodotError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use crate::fs::normalize;
use crate::logging::Log;
use crate::types::{Action, Operation, OperationKind, Planned, Refusal};

/// Shared cancellation flag, tripped from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Identity of an action within a run.
type ActionKey = (String, String, PathBuf);

fn action_key(action: &Action) -> ActionKey {
    (
        action.pack.clone(),
        action.handler.clone(),
        action.source.clone(),
    )
}

/// First-come ownership of user-visible paths across a run.
///
/// Actions are offered in pack order; the first action naming a target owns
/// it and every later action naming the same target is refused.
#[derive(Debug, Clone, Default)]
pub struct TargetClaims {
    owners: HashMap<PathBuf, ActionKey>,
}

impl TargetClaims {
    /// Build claims from actions in execution order.
    pub fn from_actions<'b>(actions: impl IntoIterator<Item = &'b Action>) -> Self {
        let mut owners = HashMap::new();
        for action in actions {
            if let Some(target) = &action.target {
                owners
                    .entry(normalize(target))
                    .or_insert_with(|| action_key(action));
            }
        }
        Self { owners }
    }

    /// The consistency error for `action` if another action owns its target.
    #[must_use]
    pub fn conflict(&self, action: &Action) -> Option<DodotError> {
        let target = action.target.as_ref()?;
        let (pack, handler, source) = self.owners.get(&normalize(target))?;
        if (pack, handler, source) == (&action.pack, &action.handler, &action.source) {
            return None;
        }
        let file = source
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        Some(DodotError::consistency(
            target,
            format!("already claimed by {pack}/{file} ({handler})"),
        ))
    }

    /// Number of claimed targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// `true` if nothing is claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Whether an operation changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// A link that did not exist before.
    Created,
    Changed,
    Unchanged,
}

/// Applies actions against a [`DataStore`].
pub struct Executor<'a> {
    store: &'a DataStore,
    runner: &'a dyn CommandRunner,
    log: &'a dyn Log,
    cancel: Option<&'a CancelToken>,
    claims: Option<&'a TargetClaims>,
    dry_run: bool,
    force: bool,
}

impl fmt::Debug for Executor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("store", self.store)
            .field("dry_run", &self.dry_run)
            .field("force", &self.force)
            .finish_non_exhaustive()
    }
}

impl<'a> Executor<'a> {
    /// Create an executor.
    #[must_use]
    pub fn new(store: &'a DataStore, runner: &'a dyn CommandRunner, log: &'a dyn Log) -> Self {
        Self {
            store,
            runner,
            log,
            cancel: None,
            claims: None,
            dry_run: false,
            force: false,
        }
    }

    /// Only report what would happen.
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Re-run provisioning actions whose sentinel is current.
    #[must_use]
    pub const fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Stop dispatching once `token` is cancelled.
    #[must_use]
    pub const fn cancel_on(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Refuse actions whose target is owned by another action.
    #[must_use]
    pub const fn with_claims(mut self, claims: &'a TargetClaims) -> Self {
        self.claims = Some(claims);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    /// Execute planned matches in order.
    ///
    /// A refused match yields a failed result in its place. Returns one
    /// result per item dispatched; if cancellation is requested the remaining
    /// items are not started and have no result.
    #[must_use]
    pub fn execute(&self, planned: &[Planned]) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(planned.len());
        for (done, item) in planned.iter().enumerate() {
            if self.cancelled() {
                self.log.debug(&format!(
                    "cancelled with {} of {} not started",
                    planned.len().saturating_sub(done),
                    planned.len()
                ));
                break;
            }
            results.push(match item {
                Ok(action) => self.execute_one(action),
                Err(refusal) => self.refused(refusal),
            });
        }
        results
    }

    fn refused(&self, refusal: &Refusal) -> ActionResult {
        self.log.warn(&format!(
            "{}/{} refused by {}: {}",
            refusal.pack, refusal.file, refusal.handler, refusal.error.message
        ));
        ActionResult {
            pack: refusal.pack.clone(),
            handler: refusal.handler.clone(),
            file: refusal.file.clone(),
            description: format!("{} {}", refusal.handler, refusal.file),
            status: StatusState::Error,
            message: refusal.error.message.clone(),
            error: Some(refusal.error.clone()),
        }
    }

    /// Execute one action and capture its outcome.
    #[must_use]
    pub fn execute_one(&self, action: &Action) -> ActionResult {
        let conflict = self.claims.and_then(|c| c.conflict(action));
        let outcome = if let Some(err) = conflict {
            Err(err)
        } else if self.dry_run {
            self.plan(action)
        } else {
            self.apply(action)
        };
        match outcome {
            Ok(Step::Changed | Step::Created) if self.dry_run => {
                self.log.dry_run(&format!("would {}", action.description));
                result(action, StatusState::Ready, format!("would {}", action.description), None)
            }
            Ok(Step::Changed | Step::Created) => {
                self.log.debug(&format!("{}: {}", action.pack, action.description));
                result(action, StatusState::Ready, action.description.clone(), None)
            }
            Ok(Step::Unchanged) => {
                self.log.debug(&format!("ok: {}", action.description));
                result(action, StatusState::Skipped, "already up to date".to_string(), None)
            }
            Err(e) => {
                self.log
                    .warn(&format!("failed to {}: {e}", action.description));
                result(
                    action,
                    StatusState::Error,
                    e.to_string(),
                    Some(ActionError::from(&e)),
                )
            }
        }
    }

    /// Dry-run: everything would change except provisioning whose sentinel
    /// is current.
    fn plan(&self, action: &Action) -> Result<Step> {
        for op in &action.operations {
            if let OperationKind::RunOnce {
                sentinel, checksum, ..
            } = &op.kind
                && !self.force
                && !self
                    .store
                    .needs_run(&op.pack, &op.handler, sentinel, checksum)?
            {
                return Ok(Step::Unchanged);
            }
        }
        Ok(Step::Changed)
    }

    /// Apply operations in order. When one fails, intermediates staged by
    /// earlier operations of the same action are removed again.
    fn apply(&self, action: &Action) -> Result<Step> {
        let mut step = Step::Unchanged;
        let mut staged = Vec::new();
        for op in &action.operations {
            match self.apply_operation(op) {
                Ok(Step::Unchanged) => {}
                Ok(done) => {
                    self.log
                        .debug(&format!("{} {}", op.verb(), op.destination.display()));
                    if done == Step::Created && op.kind.is_staging() {
                        staged.push(op);
                    }
                    step = Step::Changed;
                }
                Err(e) => {
                    self.roll_back(&staged);
                    return Err(e);
                }
            }
        }
        Ok(step)
    }

    fn roll_back(&self, staged: &[&Operation]) {
        for op in staged {
            match self.store.unlink_data(&op.pack, &op.handler, &op.source) {
                Ok(_) => self
                    .log
                    .debug(&format!("rolled back staged link for {}", op.source.display())),
                Err(e) => self.log.warn(&format!(
                    "could not roll back staged link for {}: {e}",
                    op.source.display()
                )),
            }
        }
    }

    fn apply_operation(&self, op: &Operation) -> Result<Step> {
        match &op.kind {
            OperationKind::LinkData | OperationKind::AddToPath | OperationKind::RegisterShell => {
                let (_, outcome) = self.store.link_data(&op.pack, &op.handler, &op.source)?;
                Ok(step_of(outcome))
            }
            OperationKind::LinkUser => {
                let outcome = self.store.link_user(&op.source, &op.destination)?;
                Ok(step_of(outcome))
            }
            OperationKind::RunOnce {
                sentinel,
                checksum,
                command,
            } => {
                if !self.force
                    && !self
                        .store
                        .needs_run(&op.pack, &op.handler, sentinel, checksum)?
                {
                    return Ok(Step::Unchanged);
                }
                self.run_command(command)?;
                self.store
                    .record_run(&op.pack, &op.handler, sentinel, checksum)?;
                Ok(Step::Changed)
            }
        }
    }

    fn run_command(&self, command: &CommandSpec) -> Result<()> {
        if !self.runner.which(&command.program) {
            return Err(DodotError::Execution {
                command: command.display(),
                code: None,
                stderr: format!("{} not found on PATH", command.program),
            });
        }
        self.log.debug(&format!("running {}", command.display()));
        let output = self.runner.run(command)?.check(command)?;
        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            self.log.debug(line);
        }
        Ok(())
    }
}

const fn step_of(outcome: LinkOutcome) -> Step {
    match outcome {
        LinkOutcome::Created => Step::Created,
        LinkOutcome::Replaced => Step::Changed,
        LinkOutcome::Unchanged => Step::Unchanged,
    }
}

fn result(
    action: &Action,
    status: StatusState,
    message: String,
    error: Option<ActionError>,
) -> ActionResult {
    ActionResult {
        pack: action.pack.clone(),
        handler: action.handler.clone(),
        file: action.file(),
        description: action.description.clone(),
        status,
        message,
        error,
    }
}

/// Format a per-handler summary (e.g. "2 changed, 1 already ok, 1 failed").
#[must_use]
pub fn summarize(results: &[ActionResult], dry_run: bool) -> String {
    let changed = results
        .iter()
        .filter(|r| r.status == StatusState::Ready)
        .count();
    let unchanged = results
        .iter()
        .filter(|r| r.status == StatusState::Skipped)
        .count();
    let failed = results.iter().filter(|r| r.failed()).count();
    let verb = if dry_run { "would change" } else { "changed" };
    if failed > 0 {
        format!("{changed} {verb}, {unchanged} already ok, {failed} failed")
    } else {
        format!("{changed} {verb}, {unchanged} already ok")
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::exec::{ExecResult, MockCommandRunner};
    use crate::fs::{Fs, MemoryFs};
    use crate::handlers::test_support::{matched, pack, store};
    use crate::handlers::{Handler, HandlerContext, install, symlink};
    use crate::logging::test_log::RecordingLog;
    use std::path::Path;

    fn actions_for(
        handler: &dyn Handler,
        store: &DataStore,
        pack_name: &str,
        files: &[&str],
    ) -> Vec<Action> {
        let pack = pack(pack_name);
        let ctx = HandlerContext {
            pack: &pack,
            store,
            enable_home_symlinks: true,
            command_timeout: None,
        };
        files
            .iter()
            .map(|f| {
                handler
                    .to_action(&ctx, &matched(pack_name, f, handler.name(), false))
                    .unwrap()
            })
            .collect()
    }

    fn planned(actions: &[Action]) -> Vec<Planned> {
        actions.iter().cloned().map(Ok).collect()
    }

    fn ok_runner(times: usize) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner.expect_which().return_const(true);
        runner.expect_run().times(times).returning(|_| {
            Ok(ExecResult {
                success: true,
                code: Some(0),
                ..ExecResult::default()
            })
        });
        runner
    }

    #[test]
    fn symlink_created_then_skipped() {
        let (fs, store) = store(MemoryFs::new().with_file("/dots/vim/vimrc", "set nu"));
        let actions = actions_for(&symlink::SymlinkHandler, &store, "vim", &["vimrc"]);
        let runner = ok_runner(0);
        let log = RecordingLog::default();
        let exec = Executor::new(&store, &runner, &log);

        let first = exec.execute(&planned(&actions));
        assert_eq!(first[0].status, StatusState::Ready);
        assert_eq!(
            fs.read_link(Path::new("/h/.vimrc")).unwrap(),
            Path::new("/data/packs/vim/symlinks/vimrc")
        );

        let second = exec.execute(&planned(&actions));
        assert_eq!(second[0].status, StatusState::Skipped);
        assert_eq!(summarize(&second, false), "0 changed, 1 already ok");
    }

    #[test]
    fn failure_does_not_abort_batch() {
        let (fs, store) = store(
            MemoryFs::new()
                .with_file("/dots/vim/vimrc", "")
                .with_file("/dots/vim/gvimrc", "")
                .with_file("/h/.vimrc", "mine"),
        );
        let actions = actions_for(&symlink::SymlinkHandler, &store, "vim", &["vimrc", "gvimrc"]);
        let runner = ok_runner(0);
        let log = RecordingLog::default();
        let results = Executor::new(&store, &runner, &log).execute(&planned(&actions));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, StatusState::Error);
        assert_eq!(
            results[0].error.as_ref().map(|e| e.kind),
            Some(ErrorKind::Consistency)
        );
        assert_eq!(results[1].status, StatusState::Ready);
        assert!(log.contains("failed to link ~/.vimrc"));
        assert!(!fs.entry_exists(Path::new("/data/packs/vim/symlinks/vimrc")));
        assert!(fs.entry_exists(Path::new("/data/packs/vim/symlinks/gvimrc")));
        assert!(log.contains("rolled back staged link"));
    }

    #[test]
    fn run_once_records_sentinel_and_skips_rerun() {
        let (fs, store) = store(MemoryFs::new().with_file("/dots/dev/install.sh", "echo hi"));
        let actions = actions_for(&install::InstallHandler, &store, "dev", &["install.sh"]);
        let runner = ok_runner(1);
        let log = RecordingLog::default();
        let exec = Executor::new(&store, &runner, &log);

        assert_eq!(exec.execute(&planned(&actions))[0].status, StatusState::Ready);
        let record = fs
            .read(Path::new("/data/packs/dev/install/install.sh.sentinel"))
            .unwrap();
        let checksum = actions[0].checksum.clone().unwrap();
        assert!(String::from_utf8(record).unwrap().starts_with(&format!("{checksum}|")));

        assert_eq!(exec.execute(&planned(&actions))[0].status, StatusState::Skipped);
    }

    #[test]
    fn force_reruns_current_sentinel() {
        let (_, store) = store(MemoryFs::new().with_file("/dots/dev/install.sh", "echo hi"));
        let actions = actions_for(&install::InstallHandler, &store, "dev", &["install.sh"]);
        let runner = ok_runner(2);
        let log = RecordingLog::default();
        let exec = Executor::new(&store, &runner, &log).force(true);
        assert_eq!(exec.execute(&planned(&actions))[0].status, StatusState::Ready);
        assert_eq!(exec.execute(&planned(&actions))[0].status, StatusState::Ready);
    }

    #[test]
    fn failing_command_leaves_no_sentinel() {
        let (fs, store) = store(MemoryFs::new().with_file("/dots/dev/install.sh", "exit 1"));
        let actions = actions_for(&install::InstallHandler, &store, "dev", &["install.sh"]);
        let mut runner = MockCommandRunner::new();
        runner.expect_which().return_const(true);
        runner.expect_run().returning(|_| {
            Ok(ExecResult {
                stderr: "boom\n".to_string(),
                success: false,
                code: Some(1),
                ..ExecResult::default()
            })
        });
        let log = RecordingLog::default();
        let result = Executor::new(&store, &runner, &log).execute_one(&actions[0]);

        assert_eq!(result.status, StatusState::Error);
        let err = result.error.unwrap();
        assert_eq!(err.kind, ErrorKind::Execution);
        assert!(err.message.contains("boom"), "{}", err.message);
        assert!(!fs.entry_exists(Path::new("/data/packs/dev/install/install.sh.sentinel")));
    }

    #[test]
    fn missing_program_is_execution_error() {
        let (_, store) = store(MemoryFs::new().with_file("/dots/dev/install.sh", ""));
        let actions = actions_for(&install::InstallHandler, &store, "dev", &["install.sh"]);
        let mut runner = MockCommandRunner::new();
        runner.expect_which().return_const(false);
        runner.expect_run().never();
        let log = RecordingLog::default();
        let result = Executor::new(&store, &runner, &log).execute_one(&actions[0]);
        let err = result.error.unwrap();
        assert_eq!(err.kind, ErrorKind::Execution);
        assert!(err.message.contains("bash not found on PATH"), "{}", err.message);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let (fs, store) = store(
            MemoryFs::new()
                .with_file("/dots/vim/vimrc", "")
                .with_file("/dots/dev/install.sh", ""),
        );
        let mut actions = actions_for(&symlink::SymlinkHandler, &store, "vim", &["vimrc"]);
        actions.extend(actions_for(&install::InstallHandler, &store, "dev", &["install.sh"]));
        let before = fs.snapshot(Path::new("/"));
        let runner = ok_runner(0);
        let log = RecordingLog::default();
        let results = Executor::new(&store, &runner, &log)
            .dry_run(true)
            .execute(&planned(&actions));

        assert!(results.iter().all(|r| r.status == StatusState::Ready));
        assert!(results[0].message.starts_with("would link"));
        assert_eq!(fs.snapshot(Path::new("/")), before);
        assert_eq!(summarize(&results, true), "2 would change, 0 already ok");
    }

    #[test]
    fn dry_run_reports_current_sentinel_as_skipped() {
        let (_, store) = store(MemoryFs::new().with_file("/dots/dev/install.sh", ""));
        let actions = actions_for(&install::InstallHandler, &store, "dev", &["install.sh"]);
        store
            .record_run("dev", "install", "install.sh.sentinel", actions[0].checksum.as_deref().unwrap())
            .unwrap();
        let runner = ok_runner(0);
        let log = RecordingLog::default();
        let exec = Executor::new(&store, &runner, &log).dry_run(true);
        assert_eq!(exec.execute_one(&actions[0]).status, StatusState::Skipped);
        assert_eq!(exec.force(true).execute_one(&actions[0]).status, StatusState::Ready);
    }

    #[test]
    fn claims_refuse_second_owner() {
        let (fs, store) = store(
            MemoryFs::new()
                .with_file("/dots/a/rc", "")
                .with_file("/dots/b/rc", ""),
        );
        let mut actions = actions_for(&symlink::SymlinkHandler, &store, "a", &["rc"]);
        actions.extend(actions_for(&symlink::SymlinkHandler, &store, "b", &["rc"]));
        let claims = TargetClaims::from_actions(&actions);
        assert_eq!(claims.len(), 1);

        let runner = ok_runner(0);
        let log = RecordingLog::default();
        let results = Executor::new(&store, &runner, &log)
            .with_claims(&claims)
            .execute(&planned(&actions));

        assert_eq!(results[0].status, StatusState::Ready);
        assert_eq!(results[1].status, StatusState::Error);
        let err = results[1].error.as_ref().unwrap();
        assert_eq!(err.kind, ErrorKind::Consistency);
        assert!(err.message.contains("already claimed by a/rc"), "{}", err.message);
        assert!(!fs.entry_exists(Path::new("/data/packs/b/symlinks/rc")));
    }

    #[test]
    fn refusal_fails_in_place() {
        let (fs, store) = store(
            MemoryFs::new()
                .with_file("/dots/vim/gvimrc", "")
                .with_file("/dots/vim/vimrc", ""),
        );
        let actions = actions_for(&symlink::SymlinkHandler, &store, "vim", &["gvimrc", "vimrc"]);
        let err = DodotError::ActionGeneration {
            handler: "symlink".to_string(),
            path: PathBuf::from("/dots/vim/nvim"),
            reason: "target escapes the home directory".to_string(),
        };
        let items = vec![
            Ok(actions[0].clone()),
            Err(Refusal::new("vim", "symlink", Path::new("nvim"), &err)),
            Ok(actions[1].clone()),
        ];
        let runner = ok_runner(0);
        let log = RecordingLog::default();
        let results = Executor::new(&store, &runner, &log).execute(&items);

        let files: Vec<_> = results.iter().map(|r| (r.file.as_str(), r.status)).collect();
        assert_eq!(
            files,
            vec![
                ("gvimrc", StatusState::Ready),
                ("nvim", StatusState::Error),
                ("vimrc", StatusState::Ready),
            ]
        );
        assert_eq!(
            results[1].error.as_ref().map(|e| e.kind),
            Some(ErrorKind::ActionGeneration)
        );
        assert!(log.contains("vim/nvim refused by symlink"));
        assert!(fs.entry_exists(Path::new("/h/.vimrc")));
        assert!(log.contains("stage /data/packs/vim/symlinks/vimrc"));
        assert!(log.contains("link /h/.vimrc"));
    }

    #[test]
    fn cancellation_stops_dispatch() {
        let (_, store) = store(
            MemoryFs::new()
                .with_file("/dots/vim/vimrc", "")
                .with_file("/dots/vim/gvimrc", ""),
        );
        let actions = actions_for(&symlink::SymlinkHandler, &store, "vim", &["vimrc", "gvimrc"]);
        let runner = ok_runner(0);
        let log = RecordingLog::default();
        let token = CancelToken::new();
        token.cancel();
        let results = Executor::new(&store, &runner, &log)
            .cancel_on(&token)
            .execute(&planned(&actions));
        assert!(results.is_empty());
    }
}
