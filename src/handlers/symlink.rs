//! Two-hop symlinks from the home directory into a pack.
use std::path::{Component, Path, PathBuf};

use super::{Handler, HandlerContext, clear_links, refuse, tilde};
use crate::context::ClearedItem;
use crate::datastore::{DataStore, Status};
use crate::error::Result;
use crate::rules::Match;
use crate::types::{Action, Operation, OperationKind, RunMode, display_relative};

/// Registered name.
pub const NAME: &str = "symlink";

/// Rule option overriding the user-facing path.
pub const TARGET_OPTION: &str = "target";

/// Links `~/.<name>` (or the `target` option) to the pack file through an
/// intermediate in the data dir.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymlinkHandler;

/// User-facing path for a match.
///
/// Defaults to `~/.<basename>` (no extra dot when the name already starts
/// with one). A `target` option is taken as absolute, `~/`-prefixed, or
/// relative to home.
///
/// # Errors
///
/// Returns an action-generation error for relative targets that climb out
/// of the home directory.
pub fn user_path(home: &Path, m: &Match) -> Result<PathBuf> {
    if let Some(target) = m.options.get(TARGET_OPTION) {
        let target = target.strip_prefix("~/").unwrap_or(target);
        let target = Path::new(target);
        if target.is_absolute() {
            return Ok(target.to_path_buf());
        }
        if target.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(refuse(
                NAME,
                m,
                format!("target '{}' escapes the home directory", target.display()),
            ));
        }
        return Ok(home.join(target));
    }
    let name = m
        .source
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    if name.starts_with('.') {
        Ok(home.join(name))
    } else {
        Ok(home.join(format!(".{name}")))
    }
}

impl Handler for SymlinkHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run_mode(&self) -> RunMode {
        RunMode::Linking
    }

    fn to_action(&self, ctx: &HandlerContext<'_>, m: &Match) -> Result<Action> {
        let user = user_path(ctx.home(), m)?;
        let intermediate = ctx.store.intermediate_path(&m.pack, NAME, &m.source);
        let mut operations = vec![Operation {
            pack: m.pack.clone(),
            handler: NAME.to_string(),
            source: m.source.clone(),
            destination: intermediate.clone(),
            kind: OperationKind::LinkData,
        }];
        let file = format!("{}/{}", m.pack, display_relative(&m.relative));
        let (target, description) = if ctx.enable_home_symlinks {
            operations.push(Operation {
                pack: m.pack.clone(),
                handler: NAME.to_string(),
                source: intermediate,
                destination: user.clone(),
                kind: OperationKind::LinkUser,
            });
            let description = format!("link {} -> {file}", tilde(ctx.home(), &user));
            (Some(user), description)
        } else {
            (None, format!("stage {file}"))
        };
        Ok(Action {
            pack: m.pack.clone(),
            handler: NAME.to_string(),
            source: m.source.clone(),
            relative: m.relative.clone(),
            target,
            checksum: None,
            sentinel: None,
            description,
            operations,
        })
    }

    fn status(&self, action: &Action, store: &DataStore) -> Result<Status> {
        store.symlink_status(&action.pack, NAME, &action.source, action.target.as_deref())
    }

    fn clear(
        &self,
        ctx: &HandlerContext<'_>,
        matches: &[Match],
        dry_run: bool,
    ) -> Result<Vec<ClearedItem>> {
        // Current targets, every link recorded at link time (covers rules and
        // files since removed), then top-level home entries for links made
        // before the ledger existed.
        let mut candidates: Vec<PathBuf> = matches
            .iter()
            .filter_map(|m| user_path(ctx.home(), m).ok())
            .collect();
        candidates.extend(ctx.store.recorded_user_links(&ctx.pack.name, NAME)?);
        if let Ok(entries) = ctx.store.fs().read_dir(ctx.home()) {
            candidates.extend(entries);
        }
        candidates.sort();
        candidates.dedup();
        clear_links(NAME, ctx, &candidates, dry_run)
    }
}
