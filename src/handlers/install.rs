//! Run-once install scripts.
use super::{Handler, HandlerContext, clear_state_dir, refuse};
use crate::context::ClearedItem;
use crate::datastore::{DataStore, Status, file_checksum, sentinel_name};
use crate::error::Result;
use crate::exec::CommandSpec;
use crate::paths::DOTFILES_ROOT_ENV;
use crate::rules::Match;
use crate::types::{Action, Operation, OperationKind, RunMode, display_relative};

/// Registered name.
pub const NAME: &str = "install";

/// Environment variable naming the pack for provisioning commands.
pub const PACK_ENV: &str = "DODOT_PACK";

/// Runs `bash <script>` in the pack directory once per script checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallHandler;

/// Build a sentinel-guarded action running `command` for `m`.
pub(super) fn run_once_action(
    handler: &str,
    ctx: &HandlerContext<'_>,
    m: &Match,
    command: CommandSpec,
    verb: &str,
) -> Result<Action> {
    if m.is_dir {
        return Err(refuse(handler, m, "expected a file"));
    }
    let checksum = file_checksum(ctx.store.fs(), &m.source)?;
    let sentinel = sentinel_name(&m.source);
    let command = command
        .current_dir(&ctx.pack.path)
        .env(PACK_ENV, &m.pack)
        .env(
            DOTFILES_ROOT_ENV,
            ctx.store.paths().dotfiles_root().display().to_string(),
        )
        .timeout(ctx.command_timeout);
    Ok(Action {
        pack: m.pack.clone(),
        handler: handler.to_string(),
        source: m.source.clone(),
        relative: m.relative.clone(),
        target: None,
        checksum: Some(checksum.clone()),
        sentinel: Some(sentinel.clone()),
        description: format!("{verb} {}/{}", m.pack, display_relative(&m.relative)),
        operations: vec![Operation {
            pack: m.pack.clone(),
            handler: handler.to_string(),
            source: m.source.clone(),
            destination: ctx.store.sentinel_path(&m.pack, handler, &sentinel),
            kind: OperationKind::RunOnce {
                sentinel,
                checksum,
                command,
            },
        }],
    })
}

/// Status of a run-once action from its sentinel.
pub(super) fn run_once_status(handler: &str, action: &Action, store: &DataStore) -> Result<Status> {
    let sentinel = action
        .sentinel
        .clone()
        .unwrap_or_else(|| sentinel_name(&action.source));
    let checksum = action.checksum.as_deref().unwrap_or_default();
    store.sentinel_status(&action.pack, handler, &sentinel, checksum)
}

impl Handler for InstallHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run_mode(&self) -> RunMode {
        RunMode::Provisioning
    }

    fn to_action(&self, ctx: &HandlerContext<'_>, m: &Match) -> Result<Action> {
        let command = CommandSpec::new("bash", [m.source.display().to_string()]);
        run_once_action(NAME, ctx, m, command, "run")
    }

    fn status(&self, action: &Action, store: &DataStore) -> Result<Status> {
        run_once_status(NAME, action, store)
    }

    fn clear(
        &self,
        ctx: &HandlerContext<'_>,
        _matches: &[Match],
        dry_run: bool,
    ) -> Result<Vec<ClearedItem>> {
        clear_state_dir(NAME, ctx, dry_run)
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
    use super::super::test_support::{matched, pack, store};
    use super::*;
    use crate::context::ClearedKind;
    use crate::datastore::StatusState;
    use crate::fs::{Fs, MemoryFs};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn fixture() -> (std::sync::Arc<MemoryFs>, DataStore) {
        store(MemoryFs::new().with_file("/dots/dev/install.sh", "echo hi"))
    }

    #[test]
    fn action_runs_bash_in_pack_dir() {
        let (_, store) = fixture();
        let pack = pack("dev");
        let ctx = HandlerContext {
            pack: &pack,
            store: &store,
            enable_home_symlinks: true,
            command_timeout: Some(Duration::from_secs(30)),
        };
        let action = InstallHandler
            .to_action(&ctx, &matched("dev", "install.sh", NAME, false))
            .unwrap();
        assert_eq!(action.sentinel.as_deref(), Some("install.sh.sentinel"));
        assert_eq!(action.checksum.as_ref().map(String::len), Some(64));
        assert_eq!(action.description, "run dev/install.sh");

        let op = &action.operations[0];
        assert_eq!(
            op.destination,
            PathBuf::from("/data/packs/dev/install/install.sh.sentinel")
        );
        let OperationKind::RunOnce { command, .. } = &op.kind else {
            panic!("expected RunOnce, got {:?}", op.kind);
        };
        assert_eq!(command.program, "bash");
        assert_eq!(command.args, vec!["/dots/dev/install.sh"]);
        assert_eq!(command.cwd.as_deref(), Some(Path::new("/dots/dev")));
        assert!(command.env.contains(&(PACK_ENV.to_string(), "dev".to_string())));
        assert_eq!(command.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn status_tracks_sentinel() {
        let (_, store) = fixture();
        let pack = pack("dev");
        let ctx = HandlerContext {
            pack: &pack,
            store: &store,
            enable_home_symlinks: true,
            command_timeout: None,
        };
        let action = InstallHandler
            .to_action(&ctx, &matched("dev", "install.sh", NAME, false))
            .unwrap();
        assert_eq!(
            InstallHandler.status(&action, &store).unwrap().state,
            StatusState::Missing
        );
        store
            .record_run("dev", NAME, "install.sh.sentinel", action.checksum.as_deref().unwrap())
            .unwrap();
        assert_eq!(
            InstallHandler.status(&action, &store).unwrap().state,
            StatusState::Ready
        );
    }

    #[test]
    fn clear_removes_state_dir() {
        let (fs, store) = fixture();
        store.record_run("dev", NAME, "install.sh.sentinel", "c").unwrap();
        let pack = pack("dev");
        let ctx = HandlerContext {
            pack: &pack,
            store: &store,
            enable_home_symlinks: true,
            command_timeout: None,
        };
        let items = InstallHandler.clear(&ctx, &[], false).unwrap();
        let kinds: Vec<_> = items.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![ClearedKind::Sentinel, ClearedKind::StateDir]);
        assert!(!fs.entry_exists(Path::new("/data/packs/dev/install")));
        assert!(InstallHandler.clear(&ctx, &[], false).unwrap().is_empty());
    }
}
