//! The deployment pipeline: packs → matches → actions → execution.
//!
//! One [`Pipeline::run`] call discovers packs, applies rules, lets each
//! handler turn its matches into actions, refuses actions whose user path is
//! already claimed by an earlier pack, and executes the rest. Clearing
//! intents (`unlink`, `deprovision`) call each handler's clear operation
//! instead of generating actions.
//!
//! Packs are processed in alphabetical order, or concurrently with
//! [`Options::parallel`]; results are keyed by pack either way.
mod discover;
mod plan;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

pub use discover::{discover_packs, normalize_pack_names};
pub use plan::{HandlerGroup, HandlerPlan, PackPlan, group_matches, plan_actions};

pub use crate::executor::CancelToken;

use crate::config::RootConfig;
use crate::context::{ExecutionContext, HandlerResult};
use crate::datastore::{DataStore, Status, StatusError};
use crate::error::{ActionError, DodotError, Result};
use crate::exec::CommandRunner;
use crate::executor::{Executor, TargetClaims, summarize};
use crate::handlers::{HandlerContext, HandlerRegistry, path, shell};
use crate::logging::{BufferedLog, Log, Logger};
use crate::rules::{Rule, default_rules};
use crate::shell_init;
use crate::types::{CommandIntent, Pack, RunMode, display_relative};

/// Options for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct Options {
    /// Packs to process; empty means every discovered pack.
    pub packs: Vec<String>,
    /// Report what would happen without touching anything.
    pub dry_run: bool,
    /// Which handler category runs, and in which direction.
    pub intent: CommandIntent,
    /// Re-run provisioning whose sentinel is current.
    pub force: bool,
    /// Create user-visible links in the home directory.
    pub enable_home_symlinks: bool,
    /// Process packs concurrently.
    pub parallel: bool,
    /// Deadline for each provisioning command.
    pub command_timeout: Option<Duration>,
}

impl Options {
    /// Defaults for `intent`: all packs, home links enabled, sequential.
    #[must_use]
    pub const fn new(intent: CommandIntent) -> Self {
        Self {
            packs: Vec::new(),
            dry_run: false,
            intent,
            force: false,
            enable_home_symlinks: true,
            parallel: false,
            command_timeout: None,
        }
    }
}

/// Deployment status of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Owning pack.
    pub pack: String,
    /// Handler that manages the item.
    pub handler: String,
    /// Pack-relative source.
    pub file: String,
    /// User-visible path, for items that have one.
    pub target: Option<PathBuf>,
    /// Current status.
    pub status: Status,
}

/// Results of one pack, keyed by pack name.
type PackOutcome = (String, Vec<HandlerResult>);

/// Runs the deployment pipeline against one data store.
pub struct Pipeline {
    store: DataStore,
    registry: HandlerRegistry,
    runner: Arc<dyn CommandRunner>,
    log: Arc<Logger>,
    cancel: CancelToken,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline over `store` dispatching to `registry`'s handlers.
    #[must_use]
    pub fn new(
        store: DataStore,
        registry: HandlerRegistry,
        runner: Arc<dyn CommandRunner>,
        log: Arc<Logger>,
    ) -> Self {
        Self {
            store,
            registry,
            runner,
            log,
            cancel: CancelToken::new(),
        }
    }

    /// Share an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The data store the pipeline writes to.
    #[must_use]
    pub const fn store(&self) -> &DataStore {
        &self.store
    }

    fn root_config(&self) -> Result<RootConfig> {
        let config = RootConfig::load(self.store.fs(), self.store.paths().dotfiles_root())?;
        for warning in &config.warnings {
            self.log.warn(&warning.to_string());
        }
        Ok(config)
    }

    fn handler_context<'a>(&'a self, pack: &'a Pack, opts: &Options) -> HandlerContext<'a> {
        HandlerContext {
            pack,
            store: &self.store,
            enable_home_symlinks: opts.enable_home_symlinks,
            command_timeout: opts.command_timeout,
        }
    }

    /// Discovered packs, honouring the pack filter.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unreadable root or pack config,
    /// or a not-found error for requested packs that do not exist.
    pub fn list(&self, opts: &Options) -> Result<Vec<Pack>> {
        let root = self.root_config()?;
        let requested = normalize_pack_names(&opts.packs);
        discover_packs(
            self.store.fs(),
            self.store.paths(),
            &root,
            &requested,
            &*self.log,
        )
    }

    /// Run the pipeline and return the populated execution context.
    ///
    /// # Errors
    ///
    /// Discovery, configuration, and rule errors are returned before anything
    /// runs. If any action fails the context is returned inside
    /// [`DodotError::ActionsFailed`]; if the run is cancelled it is returned
    /// inside [`DodotError::Cancelled`].
    pub fn run(&self, opts: &Options) -> Result<ExecutionContext> {
        let root = self.root_config()?;
        let requested = normalize_pack_names(&opts.packs);
        let packs = discover_packs(
            self.store.fs(),
            self.store.paths(),
            &root,
            &requested,
            &*self.log,
        )?;
        self.log.debug(&format!(
            "{} pack(s) under {} ({})",
            packs.len(),
            self.store.paths().dotfiles_root().display(),
            self.store.paths().root_source()
        ));

        let _lock = (!opts.dry_run).then(|| self.store.lock()).transpose()?;

        let outcomes = if opts.intent.is_inverse() {
            self.clear_packs(&packs, &root.rules, opts)?
        } else {
            self.deploy_packs(&packs, &root.rules, opts)?
        };

        let mut ctx = ExecutionContext::new(opts.intent.as_str(), opts.dry_run);
        for (pack, results) in outcomes {
            ctx.add_pack(&pack)?;
            for result in results {
                ctx.add_handler_result(&pack, result)?;
            }
        }

        if self.cancel.is_cancelled() {
            ctx.complete_cancelled()?;
            self.log.warn("cancelled; remaining actions were not started");
            return Err(DodotError::Cancelled {
                context: Box::new(ctx),
            });
        }

        ctx.complete()?;
        let failed = ctx.failures();
        if failed > 0 {
            return Err(DodotError::ActionsFailed {
                failed,
                context: Box::new(ctx),
            });
        }
        Ok(ctx)
    }

    /// Report the status of every item in the selected packs.
    ///
    /// Read-only: takes no lock and writes nothing.
    ///
    /// # Errors
    ///
    /// Returns discovery, configuration, and rule errors, or a filesystem
    /// error if state cannot be inspected.
    pub fn status(&self, opts: &Options) -> Result<Vec<StatusEntry>> {
        let root = self.root_config()?;
        let packs = discover_packs(
            self.store.fs(),
            self.store.paths(),
            &root,
            &normalize_pack_names(&opts.packs),
            &*self.log,
        )?;
        let defaults = default_rules();

        let mut entries = Vec::new();
        for pack in &packs {
            let groups = group_matches(
                self.store.fs(),
                &self.registry,
                &defaults,
                &root.rules,
                pack,
                CommandIntent::All,
                false,
            )?;
            let hctx = self.handler_context(pack, opts);
            for group in groups {
                let handler = group.entry.create();
                for m in &group.matches {
                    let entry = match handler.to_action(&hctx, m) {
                        Ok(action) => StatusEntry {
                            pack: pack.name.clone(),
                            handler: group.entry.name.to_string(),
                            file: action.file(),
                            target: action.target.clone(),
                            status: handler.status(&action, &self.store)?,
                        },
                        Err(e) => StatusEntry {
                            pack: pack.name.clone(),
                            handler: group.entry.name.to_string(),
                            file: display_relative(&m.relative),
                            target: None,
                            status: Status::error(StatusError::Invalid, e.to_string()),
                        },
                    };
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    /// Plan every pack, resolve target conflicts, and execute.
    fn deploy_packs(
        &self,
        packs: &[Pack],
        root_rules: &[Rule],
        opts: &Options,
    ) -> Result<Vec<PackOutcome>> {
        let defaults = default_rules();
        let mut plans = Vec::with_capacity(packs.len());
        for pack in packs {
            let groups = group_matches(
                self.store.fs(),
                &self.registry,
                &defaults,
                root_rules,
                pack,
                opts.intent,
                false,
            )?;
            let handlers = plan_actions(&self.handler_context(pack, opts), groups, opts.intent);
            plans.push(PackPlan {
                pack: pack.clone(),
                handlers,
            });
        }

        let claims = TargetClaims::from_actions(plans.iter().flat_map(PackPlan::actions));
        if opts.dry_run {
            for action in plans.iter().flat_map(PackPlan::actions) {
                if let Some(err) = claims.conflict(action) {
                    self.log
                        .warn(&format!("{}/{}: {err}", action.pack, action.file()));
                }
            }
        }
        let claims = (!opts.dry_run).then_some(&claims);

        let outcomes = self.for_each_pack(
            &plans,
            |plan| plan.pack.name.as_str(),
            opts.parallel,
            |plan, log| self.execute_plan(plan, claims, opts, log),
        );

        if !opts.dry_run && opts.intent.includes(RunMode::Linking) {
            let shell_facing = plans
                .iter()
                .flat_map(PackPlan::actions)
                .any(|a| a.handler == path::NAME || a.handler == shell::NAME);
            if shell_facing {
                self.refresh_init_script();
            }
        }
        Ok(outcomes)
    }

    fn execute_plan(
        &self,
        plan: &PackPlan,
        claims: Option<&TargetClaims>,
        opts: &Options,
        log: &dyn Log,
    ) -> Vec<HandlerResult> {
        log.stage(&plan.pack.name);
        let mut exec = Executor::new(&self.store, &*self.runner, log)
            .dry_run(opts.dry_run)
            .force(opts.force)
            .cancel_on(&self.cancel);
        if let Some(claims) = claims {
            exec = exec.with_claims(claims);
        }

        let mut results = Vec::new();
        for handler in &plan.handlers {
            if self.cancel.is_cancelled() {
                break;
            }
            if handler.actions.is_empty() {
                continue;
            }
            let name = handler.group.entry.name;
            let done = exec.execute(&handler.actions);
            if done.is_empty() {
                continue;
            }
            log.info(&format!("{name}: {}", summarize(&done, opts.dry_run)));
            results.push(HandlerResult::from_actions(name, done));
        }
        results
    }

    /// Call each participating handler's clear operation for every pack.
    fn clear_packs(
        &self,
        packs: &[Pack],
        root_rules: &[Rule],
        opts: &Options,
    ) -> Result<Vec<PackOutcome>> {
        let defaults = default_rules();
        let mut planned = Vec::with_capacity(packs.len());
        for pack in packs {
            let groups = group_matches(
                self.store.fs(),
                &self.registry,
                &defaults,
                root_rules,
                pack,
                opts.intent,
                true,
            )?;
            planned.push((pack, groups));
        }

        Ok(self.for_each_pack(
            &planned,
            |(pack, _)| pack.name.as_str(),
            opts.parallel,
            |(pack, groups), log| self.clear_pack(pack, groups, opts, log),
        ))
    }

    fn clear_pack(
        &self,
        pack: &Pack,
        groups: &[HandlerGroup],
        opts: &Options,
        log: &dyn Log,
    ) -> Vec<HandlerResult> {
        log.stage(&pack.name);
        let hctx = self.handler_context(pack, opts);
        let mut results = Vec::new();
        for group in groups {
            if self.cancel.is_cancelled() {
                break;
            }
            let name = group.entry.name;
            match group.entry.create().clear(&hctx, &group.matches, opts.dry_run) {
                Ok(items) if items.is_empty() => log.debug(&format!("{name}: nothing to remove")),
                Ok(items) => {
                    for item in &items {
                        if opts.dry_run {
                            log.dry_run(&format!("would remove {} {}", item.kind, item.path.display()));
                        } else if let Some(err) = &item.error {
                            log.warn(&format!("failed to remove {}: {err}", item.path.display()));
                        } else {
                            log.debug(&format!("removed {} {}", item.kind, item.path.display()));
                        }
                    }
                    log.info(&format!("{name}: {} removed", items.len()));
                    results.push(HandlerResult::from_cleared(name, items));
                }
                Err(e) => {
                    log.error(&format!("{name}: {e}"));
                    results.push(HandlerResult::failed(
                        name,
                        group.files(),
                        ActionError::from(&e),
                    ));
                }
            }
        }
        results
    }

    /// Run `work` for each item, sequentially or on the rayon pool.
    ///
    /// In parallel mode each pack logs into a [`BufferedLog`] that is
    /// replayed when the pack finishes, so output never interleaves.
    fn for_each_pack<T, N, W>(
        &self,
        items: &[T],
        name: N,
        parallel: bool,
        work: W,
    ) -> Vec<PackOutcome>
    where
        T: Sync,
        N: Fn(&T) -> &str + Sync,
        W: Fn(&T, &dyn Log) -> Vec<HandlerResult> + Sync,
    {
        if parallel && items.len() > 1 {
            return items
                .par_iter()
                .map(|item| {
                    let pack = name(item);
                    if self.cancel.is_cancelled() {
                        return (pack.to_string(), Vec::new());
                    }
                    self.log.notify_pack_start(pack);
                    let buf = BufferedLog::new(Arc::clone(&self.log));
                    let results = work(item, &buf);
                    buf.flush_and_complete(pack);
                    (pack.to_string(), results)
                })
                .collect();
        }
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let pack = name(item).to_string();
            if self.cancel.is_cancelled() {
                outcomes.push((pack, Vec::new()));
                continue;
            }
            let results = work(item, &*self.log);
            outcomes.push((pack, results));
        }
        outcomes
    }

    fn refresh_init_script(&self) {
        let script = shell_init::render(self.store.paths().data_dir());
        match self.store.write_init_script(&script) {
            Ok(true) => self.log.info(&format!(
                "wrote shell init script {}",
                self.store.paths().init_script().display()
            )),
            Ok(false) => self.log.debug("shell init script unchanged"),
            Err(e) => self.log.warn(&format!("cannot write shell init script: {e}")),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::context::ExecutionStatus;
    use crate::datastore::StatusState;
    use crate::error::ErrorKind;
    use crate::exec::{ExecResult, MockCommandRunner};
    use crate::fs::{Fs, MemoryFs};
    use crate::paths::Paths;
    use std::path::Path;

    fn runner(runs: usize) -> Arc<MockCommandRunner> {
        let mut runner = MockCommandRunner::new();
        runner.expect_which().return_const(true);
        runner.expect_run().times(runs).returning(|_| {
            Ok(ExecResult {
                success: true,
                code: Some(0),
                ..ExecResult::default()
            })
        });
        Arc::new(runner)
    }

    fn pipeline(fs: MemoryFs, runs: usize) -> (Arc<MemoryFs>, Pipeline) {
        let fs = Arc::new(fs);
        let store = DataStore::new(fs.clone(), Paths::new("/dots", "/data", "/h"));
        let pipeline = Pipeline::new(
            store,
            HandlerRegistry::builtin(),
            runner(runs),
            Arc::new(Logger::new("test")),
        );
        (fs, pipeline)
    }

    fn opts(intent: CommandIntent) -> Options {
        Options::new(intent)
    }

    fn context_of(err: DodotError) -> ExecutionContext {
        match err {
            DodotError::ActionsFailed { context, .. } | DodotError::Cancelled { context } => {
                *context
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn link_then_relink_is_all_skipped() {
        let (fs, pipeline) = pipeline(MemoryFs::new().with_file("/dots/vim/vimrc", "set nu"), 0);
        let ctx = pipeline.run(&opts(CommandIntent::Link)).unwrap();
        assert_eq!(ctx.status(), ExecutionStatus::Success);
        assert_eq!(
            fs.read_link(Path::new("/h/.vimrc")).unwrap(),
            Path::new("/data/packs/vim/symlinks/vimrc")
        );
        assert_eq!(
            fs.read_link(Path::new("/data/packs/vim/symlinks/vimrc")).unwrap(),
            Path::new("/dots/vim/vimrc")
        );

        let before = fs.snapshot(Path::new("/"));
        let again = pipeline.run(&opts(CommandIntent::Link)).unwrap();
        assert!(again.actions().all(|a| a.status == StatusState::Skipped));
        assert_eq!(fs.snapshot(Path::new("/")), before);
    }

    #[test]
    fn lock_is_released_after_run() {
        let (fs, pipeline) = pipeline(MemoryFs::new().with_file("/dots/vim/vimrc", ""), 0);
        pipeline.run(&opts(CommandIntent::Link)).unwrap();
        assert!(!fs.entry_exists(Path::new("/data/.lock")));
    }

    #[test]
    fn held_lock_is_config_error() {
        let (_, pipeline) = pipeline(
            MemoryFs::new()
                .with_file("/dots/vim/vimrc", "")
                .with_file("/data/.lock", "1"),
            0,
        );
        let err = pipeline.run(&opts(CommandIntent::Link)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn conflicting_targets_fail_later_pack() {
        let (fs, pipeline) = pipeline(
            MemoryFs::new()
                .with_file("/dots/a/rc", "a")
                .with_file("/dots/b/rc", "b"),
            0,
        );
        let err = pipeline.run(&opts(CommandIntent::Link)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        let ctx = context_of(err);
        assert_eq!(ctx.status(), ExecutionStatus::Partial);
        let b = ctx.pack("b").unwrap();
        let action = b.actions().next().unwrap();
        assert_eq!(action.error.as_ref().unwrap().kind, ErrorKind::Consistency);
        assert_eq!(
            fs.read_link(Path::new("/h/.rc")).unwrap(),
            Path::new("/data/packs/a/symlinks/rc")
        );
        assert!(!fs.entry_exists(Path::new("/data/packs/b/symlinks/rc")));
    }

    #[test]
    fn provision_runs_once_per_checksum() {
        let (fs, pipeline) = pipeline(MemoryFs::new().with_file("/dots/dev/install.sh", "echo 1"), 2);
        let provision = opts(CommandIntent::Provision);

        let first = pipeline.run(&provision).unwrap();
        assert_eq!(first.actions().next().unwrap().status, StatusState::Ready);
        let sentinel = Path::new("/data/packs/dev/install/install.sh.sentinel");
        let recorded = fs.read(sentinel).unwrap();

        let second = pipeline.run(&provision).unwrap();
        assert_eq!(second.actions().next().unwrap().status, StatusState::Skipped);
        assert_eq!(fs.read(sentinel).unwrap(), recorded);

        fs.write(Path::new("/dots/dev/install.sh"), b"echo 2").unwrap();
        let third = pipeline.run(&provision).unwrap();
        assert_eq!(third.actions().next().unwrap().status, StatusState::Ready);
        assert_ne!(fs.read(sentinel).unwrap(), recorded);
    }

    #[test]
    fn link_intent_ignores_provisioning_files() {
        let (fs, pipeline) = pipeline(
            MemoryFs::new()
                .with_file("/dots/dev/install.sh", "")
                .with_file("/dots/dev/Brewfile", ""),
            0,
        );
        let ctx = pipeline.run(&opts(CommandIntent::Link)).unwrap();
        assert!(ctx.pack("dev").unwrap().handlers().is_empty());
        assert!(!fs.entry_exists(Path::new("/data/packs/dev")));
    }

    #[test]
    fn dry_run_changes_nothing() {
        let (fs, pipeline) = pipeline(
            MemoryFs::new()
                .with_file("/dots/vim/vimrc", "")
                .with_file("/dots/a/rc", "")
                .with_file("/dots/b/rc", "")
                .with_file("/dots/dev/install.sh", "")
                .with_file("/dots/tools/bin/t", ""),
            0,
        );
        let before = fs.snapshot(Path::new("/"));
        let mut all = opts(CommandIntent::All);
        all.dry_run = true;
        let ctx = pipeline.run(&all).unwrap();
        assert!(ctx.dry_run());
        assert!(ctx.actions().all(|a| a.status == StatusState::Ready));
        assert_eq!(fs.snapshot(Path::new("/")), before);
    }

    #[test]
    fn unlink_round_trip_restores_home() {
        let (fs, pipeline) = pipeline(
            MemoryFs::new()
                .with_file("/dots/vim/vimrc", "")
                .with_file("/dots/vim/aliases.sh", "")
                .with_file("/h/.profile", "mine"),
            0,
        );
        let home_before = fs.snapshot(Path::new("/h"));
        pipeline.run(&opts(CommandIntent::Link)).unwrap();
        let ctx = pipeline.run(&opts(CommandIntent::Unlink)).unwrap();
        let vim = ctx.pack("vim").unwrap();
        let handlers: Vec<_> = vim.handlers().iter().map(|h| h.handler.as_str()).collect();
        assert_eq!(handlers, vec!["symlink", "shell"]);
        assert_eq!(fs.snapshot(Path::new("/h")), home_before);
        assert!(!fs.entry_exists(Path::new("/data/packs/vim/symlinks/vimrc")));
    }

    #[test]
    fn unlink_finds_link_after_target_rule_removed() {
        let (fs, pipeline) = pipeline(
            MemoryFs::new().with_file("/dots/vim/nvim", "").with_file(
                "/dots/vim/.dodot.toml",
                "[[rule]]\nmatch = \"nvim\"\nhandler = \"symlink\"\noptions = { target = \".config/nvim\" }\n",
            ),
            0,
        );
        pipeline.run(&opts(CommandIntent::Link)).unwrap();
        assert!(fs.entry_exists(Path::new("/h/.config/nvim")));

        fs.write(Path::new("/dots/vim/.dodot.toml"), b"").unwrap();
        let ctx = pipeline.run(&opts(CommandIntent::Unlink)).unwrap();
        assert!(!fs.entry_exists(Path::new("/h/.config/nvim")));
        assert!(!fs.entry_exists(Path::new("/data/packs/vim/symlinks/nvim")));
        let symlink = &ctx.pack("vim").unwrap().handlers()[0];
        assert_eq!(symlink.files, vec!["nvim", "nvim"]);
    }

    #[test]
    fn unlink_leaves_foreign_link() {
        let (fs, pipeline) = pipeline(MemoryFs::new().with_file("/dots/vim/vimrc", ""), 0);
        pipeline.run(&opts(CommandIntent::Link)).unwrap();
        fs.remove_file(Path::new("/h/.vimrc")).unwrap();
        fs.symlink(Path::new("/tmp/other"), Path::new("/h/.vimrc")).unwrap();

        pipeline.run(&opts(CommandIntent::Unlink)).unwrap();
        assert_eq!(
            fs.read_link(Path::new("/h/.vimrc")).unwrap(),
            Path::new("/tmp/other")
        );
        assert!(!fs.entry_exists(Path::new("/data/packs/vim/symlinks/vimrc")));
    }

    #[test]
    fn unlink_of_provision_only_pack_has_nothing_to_do() {
        let (fs, pipeline) = pipeline(MemoryFs::new().with_file("/dots/brew-only/Brewfile", ""), 1);
        pipeline.run(&opts(CommandIntent::Provision)).unwrap();
        let ctx = pipeline.run(&opts(CommandIntent::Unlink)).unwrap();
        let pack = ctx.pack("brew-only").unwrap();
        assert!(pack.handlers().is_empty());
        assert!(fs.entry_exists(Path::new("/data/packs/brew-only/homebrew")));
    }

    #[test]
    fn deprovision_removes_sentinels() {
        let (fs, pipeline) = pipeline(MemoryFs::new().with_file("/dots/dev/install.sh", ""), 1);
        pipeline.run(&opts(CommandIntent::Provision)).unwrap();
        let ctx = pipeline.run(&opts(CommandIntent::Deprovision)).unwrap();
        let cleared = &ctx.pack("dev").unwrap().handlers()[0].cleared;
        assert_eq!(cleared.len(), 2, "sentinel and state dir: {cleared:?}");
        assert!(!fs.entry_exists(Path::new("/data/packs/dev/install")));
    }

    #[test]
    fn cancelled_run_returns_partial_context() {
        let (fs, pipeline) = pipeline(MemoryFs::new().with_file("/dots/vim/vimrc", ""), 0);
        let cancel = CancelToken::new();
        cancel.cancel();
        let pipeline = pipeline.with_cancel(cancel);
        let err = pipeline.run(&opts(CommandIntent::Link)).unwrap_err();
        assert_eq!(err.kind().exit_code(), 3);
        let ctx = context_of(err);
        assert_eq!(ctx.status(), ExecutionStatus::Cancelled);
        assert!(!fs.entry_exists(Path::new("/h/.vimrc")));
    }

    #[test]
    fn parallel_matches_sequential() {
        let fixture = || {
            MemoryFs::new()
                .with_file("/dots/a/arc", "")
                .with_file("/dots/b/brc", "")
                .with_file("/dots/c/crc", "")
        };
        let (_, sequential) = pipeline(fixture(), 0);
        let (_, parallel) = pipeline(fixture(), 0);
        let mut par = opts(CommandIntent::Link);
        par.parallel = true;

        let seq_ctx = sequential.run(&opts(CommandIntent::Link)).unwrap();
        let par_ctx = parallel.run(&par).unwrap();
        let files = |ctx: &ExecutionContext| {
            ctx.actions()
                .map(|a| (a.pack.clone(), a.file.clone(), a.status))
                .collect::<Vec<_>>()
        };
        assert_eq!(files(&seq_ctx), files(&par_ctx));
    }

    #[test]
    fn init_script_written_for_shell_files() {
        let (fs, pipeline) = pipeline(MemoryFs::new().with_file("/dots/zsh/aliases.sh", ""), 0);
        pipeline.run(&opts(CommandIntent::Link)).unwrap();
        let script = fs.read(&pipeline.store().paths().init_script()).unwrap();
        assert!(String::from_utf8(script).unwrap().contains("dodot_data='/data'"));
    }

    #[test]
    fn refused_match_does_not_block_siblings() {
        let (fs, pipeline) = pipeline(
            MemoryFs::new()
                .with_file("/dots/tools/bin/hello", "")
                .with_file("/dots/tools/tool", "")
                .with_file("/dots/tools/.dodot.toml", "[path]\npatterns = [\"tool\"]\n"),
            0,
        );
        let err = pipeline.run(&opts(CommandIntent::Link)).unwrap_err();
        let ctx = context_of(err);
        assert_eq!(ctx.failures(), 1);
        let handler = &ctx.pack("tools").unwrap().handlers()[0];
        assert_eq!(handler.handler, "path");
        assert_eq!(handler.error.as_ref().unwrap().kind, ErrorKind::ActionGeneration);
        let files: Vec<_> = handler
            .actions
            .iter()
            .map(|a| (a.file.as_str(), a.status))
            .collect();
        assert_eq!(
            files,
            vec![("bin", StatusState::Ready), ("tool", StatusState::Error)]
        );
        assert_eq!(
            fs.read_link(Path::new("/data/packs/tools/path/bin")).unwrap(),
            Path::new("/dots/tools/bin")
        );
    }

    #[test]
    fn status_reports_each_item() {
        let (_, pipeline) = pipeline(
            MemoryFs::new()
                .with_file("/dots/vim/vimrc", "")
                .with_file("/dots/dev/install.sh", ""),
            0,
        );
        let mut link = opts(CommandIntent::Link);
        link.packs = vec!["vim".to_string()];
        pipeline.run(&link).unwrap();

        let entries = pipeline.status(&opts(CommandIntent::All)).unwrap();
        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.pack.as_str(), e.handler.as_str(), e.file.as_str(), e.status.state))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("dev", "install", "install.sh", StatusState::Missing),
                ("vim", "symlink", "vimrc", StatusState::Ready),
            ]
        );
        assert_eq!(entries[1].target.as_deref(), Some(Path::new("/h/.vimrc")));
    }

    #[test]
    fn unknown_pack_is_not_found() {
        let (_, pipeline) = pipeline(MemoryFs::new().with_file("/dots/vim/vimrc", ""), 0);
        let mut link = opts(CommandIntent::Link);
        link.packs = vec!["emacs/".to_string()];
        let err = pipeline.run(&link).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.kind().exit_code(), 2);
    }
}
