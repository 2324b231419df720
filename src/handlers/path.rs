//! Directories added to `PATH` by the shell init script.
use super::{Handler, HandlerContext, clear_links, refuse};
use crate::context::ClearedItem;
use crate::datastore::{DataStore, Status};
use crate::error::Result;
use crate::rules::Match;
use crate::types::{Action, Operation, OperationKind, RunMode, display_relative};

/// Registered name.
pub const NAME: &str = "path";

/// Stages directories under `<data>/packs/<pack>/path/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathHandler;

impl Handler for PathHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run_mode(&self) -> RunMode {
        RunMode::Linking
    }

    fn to_action(&self, ctx: &HandlerContext<'_>, m: &Match) -> Result<Action> {
        if !m.is_dir {
            return Err(refuse(NAME, m, "only directories can be added to PATH"));
        }
        let intermediate = ctx.store.intermediate_path(&m.pack, NAME, &m.source);
        Ok(Action {
            pack: m.pack.clone(),
            handler: NAME.to_string(),
            source: m.source.clone(),
            relative: m.relative.clone(),
            target: None,
            checksum: None,
            sentinel: None,
            description: format!("add {}/{} to PATH", m.pack, display_relative(&m.relative)),
            operations: vec![Operation {
                pack: m.pack.clone(),
                handler: NAME.to_string(),
                source: m.source.clone(),
                destination: intermediate,
                kind: OperationKind::AddToPath,
            }],
        })
    }

    fn status(&self, action: &Action, store: &DataStore) -> Result<Status> {
        store.link_status(&action.pack, NAME, &action.source)
    }

    fn clear(
        &self,
        ctx: &HandlerContext<'_>,
        _matches: &[Match],
        dry_run: bool,
    ) -> Result<Vec<ClearedItem>> {
        clear_links(NAME, ctx, &[], dry_run)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::super::test_support::{matched, pack, store};
    use super::*;
    use crate::datastore::StatusState;
    use crate::fs::MemoryFs;
    use std::path::PathBuf;

    #[test]
    fn directory_becomes_add_to_path() {
        let (_, store) = store(MemoryFs::new());
        let pack = pack("tools");
        let ctx = HandlerContext {
            pack: &pack,
            store: &store,
            enable_home_symlinks: true,
            command_timeout: None,
        };
        let action = PathHandler
            .to_action(&ctx, &matched("tools", "bin", NAME, true))
            .unwrap();
        assert_eq!(action.description, "add tools/bin to PATH");
        assert_eq!(action.operations[0].kind, OperationKind::AddToPath);
        assert_eq!(
            action.operations[0].destination,
            PathBuf::from("/data/packs/tools/path/bin")
        );
    }

    #[test]
    fn file_is_refused() {
        let (_, store) = store(MemoryFs::new());
        let pack = pack("tools");
        let ctx = HandlerContext {
            pack: &pack,
            store: &store,
            enable_home_symlinks: true,
            command_timeout: None,
        };
        let err = PathHandler
            .to_action(&ctx, &matched("tools", "bin", NAME, false))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ActionGeneration);
    }

    #[test]
    fn status_follows_intermediate() {
        let (_, store) = store(MemoryFs::new().with_dir("/dots/tools/bin"));
        let pack = pack("tools");
        let ctx = HandlerContext {
            pack: &pack,
            store: &store,
            enable_home_symlinks: true,
            command_timeout: None,
        };
        let action = PathHandler
            .to_action(&ctx, &matched("tools", "bin", NAME, true))
            .unwrap();
        assert_eq!(
            PathHandler.status(&action, &store).unwrap().state,
            StatusState::Missing
        );
        store
            .link_data("tools", NAME, &action.source)
            .unwrap();
        assert_eq!(
            PathHandler.status(&action, &store).unwrap().state,
            StatusState::Ready
        );
    }
}
