//! Scripts sourced by the shell init script.
use super::{Handler, HandlerContext, clear_links, refuse};
use crate::context::ClearedItem;
use crate::datastore::{DataStore, Status};
use crate::error::Result;
use crate::rules::Match;
use crate::types::{Action, Operation, OperationKind, RunMode, display_relative};

/// Registered name.
pub const NAME: &str = "shell";

/// Stages files under `<data>/packs/<pack>/shell/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellHandler;

impl Handler for ShellHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run_mode(&self) -> RunMode {
        RunMode::Linking
    }

    fn to_action(&self, ctx: &HandlerContext<'_>, m: &Match) -> Result<Action> {
        if m.is_dir {
            return Err(refuse(NAME, m, "directories cannot be sourced"));
        }
        Ok(Action {
            pack: m.pack.clone(),
            handler: NAME.to_string(),
            source: m.source.clone(),
            relative: m.relative.clone(),
            target: None,
            checksum: None,
            sentinel: None,
            description: format!("source {}/{}", m.pack, display_relative(&m.relative)),
            operations: vec![Operation {
                pack: m.pack.clone(),
                handler: NAME.to_string(),
                source: m.source.clone(),
                destination: ctx.store.intermediate_path(&m.pack, NAME, &m.source),
                kind: OperationKind::RegisterShell,
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
