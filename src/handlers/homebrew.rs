//! Run-once `brew bundle` for Brewfiles.
use super::install::{run_once_action, run_once_status};
use super::{Handler, HandlerContext, clear_state_dir};
use crate::context::ClearedItem;
use crate::datastore::{DataStore, Status};
use crate::error::Result;
use crate::exec::CommandSpec;
use crate::rules::Match;
use crate::types::{Action, RunMode};

/// Registered name.
pub const NAME: &str = "homebrew";

/// Runs `brew bundle --file <Brewfile>` once per Brewfile checksum.
///
/// Deprovisioning forgets the sentinel; installed formulae are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomebrewHandler;

impl Handler for HomebrewHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run_mode(&self) -> RunMode {
        RunMode::Provisioning
    }

    fn to_action(&self, ctx: &HandlerContext<'_>, m: &Match) -> Result<Action> {
        let command = CommandSpec::new(
            "brew",
            ["bundle".to_string(), "--file".to_string(), m.source.display().to_string()],
        );
        run_once_action(NAME, ctx, m, command, "brew bundle")
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
    use crate::fs::MemoryFs;
    use crate::types::OperationKind;

    #[test]
    fn brewfile_becomes_brew_bundle() {
        let (_, store) = store(MemoryFs::new().with_file("/dots/brew/Brewfile", "brew \"jq\""));
        let pack = pack("brew");
        let ctx = HandlerContext {
            pack: &pack,
            store: &store,
            enable_home_symlinks: true,
            command_timeout: None,
        };
        let action = HomebrewHandler
            .to_action(&ctx, &matched("brew", "Brewfile", NAME, false))
            .unwrap();
        assert_eq!(action.sentinel.as_deref(), Some("Brewfile.sentinel"));
        assert_eq!(action.description, "brew bundle brew/Brewfile");
        let OperationKind::RunOnce { command, .. } = &action.operations[0].kind else {
            panic!("expected RunOnce");
        };
        assert_eq!(command.display(), "brew bundle --file /dots/brew/Brewfile");
    }

    #[test]
    fn missing_brewfile_is_error() {
        let (_, store) = store(MemoryFs::new());
        let pack = pack("brew");
        let ctx = HandlerContext {
            pack: &pack,
            store: &store,
            enable_home_symlinks: true,
            command_timeout: None,
        };
        let err = HomebrewHandler
            .to_action(&ctx, &matched("brew", "Brewfile", NAME, false))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Fs);
    }
}
