//! Handlers turn matches into actions, report status, and clear state.
//!
//! Linking handlers ([`symlink`], [`path`], [`shell`]) stage intermediates
//! and may run any number of times. Provisioning handlers ([`install`],
//! [`homebrew`]) run a command once per input checksum.
pub mod homebrew;
pub mod install;
pub mod path;
pub mod registry;
pub mod shell;
pub mod symlink;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use registry::{HandlerEntry, HandlerRegistry};

use crate::context::{ClearedItem, ClearedKind};
use crate::datastore::{DataStore, Status};
use crate::error::{DodotError, Result};
use crate::rules::Match;
use crate::types::{Action, Pack, RunMode};

/// Inputs shared by every handler call for one pack.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    /// Pack being processed.
    pub pack: &'a Pack,
    /// Data store, for paths and read-only queries.
    pub store: &'a DataStore,
    /// When `false`, only intermediates are staged.
    pub enable_home_symlinks: bool,
    /// Timeout applied to provisioning commands.
    pub command_timeout: Option<Duration>,
}

impl HandlerContext<'_> {
    /// The user's home directory.
    #[must_use]
    pub fn home(&self) -> &Path {
        self.store.paths().home()
    }
}

/// A named component that processes matches of one category.
pub trait Handler: Send + Sync + fmt::Debug {
    /// Registered handler name.
    fn name(&self) -> &'static str;

    /// Category this handler belongs to.
    fn run_mode(&self) -> RunMode;

    /// Produce the action for one match.
    ///
    /// Each match is planned on its own; refusing one leaves the handler's
    /// other matches unaffected.
    ///
    /// # Errors
    ///
    /// Returns an action-generation error if the match cannot be handled, or
    /// a filesystem error if its input cannot be read.
    fn to_action(&self, ctx: &HandlerContext<'_>, m: &Match) -> Result<Action>;

    /// Report the current deployment status of an action's item.
    ///
    /// Read-only.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if state cannot be inspected.
    fn status(&self, action: &Action, store: &DataStore) -> Result<Status>;

    /// Remove this handler's state for a pack and list what was removed.
    ///
    /// In dry-run nothing is removed and every item is reported as success.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the state dir cannot be listed.
    fn clear(
        &self,
        ctx: &HandlerContext<'_>,
        matches: &[Match],
        dry_run: bool,
    ) -> Result<Vec<ClearedItem>>;
}

/// Build an action-generation error for a refused match.
pub(crate) fn refuse(handler: &str, m: &Match, reason: impl Into<String>) -> DodotError {
    DodotError::ActionGeneration {
        handler: handler.to_string(),
        path: m.source.clone(),
        reason: reason.into(),
    }
}

/// Render `path` with the home directory collapsed to `~`.
#[must_use]
pub fn tilde(home: &Path, path: &Path) -> String {
    path.strip_prefix(home).map_or_else(
        |_| path.display().to_string(),
        |rest| format!("~/{}", rest.display()),
    )
}

fn cleared(kind: ClearedKind, path: PathBuf, outcome: Result<bool>) -> ClearedItem {
    match outcome {
        Ok(_) => ClearedItem {
            kind,
            path,
            success: true,
            error: None,
        },
        Err(e) => ClearedItem {
            kind,
            path,
            success: false,
            error: Some(e.to_string()),
        },
    }
}

/// Clear a linking handler: user links that resolve to one of its
/// intermediates, then the intermediates themselves.
///
/// `user_candidates` are the user paths worth checking; anything that is not
/// a link into this handler's state dir is left alone. The user-link ledger
/// is dropped once everything is gone, and kept after a failure so a retry
/// still finds the leftovers.
pub(crate) fn clear_links(
    handler: &str,
    ctx: &HandlerContext<'_>,
    user_candidates: &[PathBuf],
    dry_run: bool,
) -> Result<Vec<ClearedItem>> {
    let store = ctx.store;
    let pack = ctx.pack.name.as_str();
    let mut items = Vec::new();

    for intermediate in store.list_entries(pack, handler)? {
        for user in user_candidates {
            if !store.is_user_link(user, &intermediate)? {
                continue;
            }
            let outcome = if dry_run {
                Ok(true)
            } else {
                store.unlink_user(user, &intermediate)
            };
            items.push(cleared(ClearedKind::UserLink, user.clone(), outcome));
        }
        let outcome = if dry_run {
            Ok(true)
        } else {
            store.unlink_data(pack, handler, &intermediate)
        };
        items.push(cleared(ClearedKind::Intermediate, intermediate, outcome));
    }
    if !dry_run && items.iter().all(|i| i.success) {
        store.forget_user_links(pack, handler)?;
    }
    Ok(items)
}

/// Clear a provisioning handler: every sentinel, then the state dir.
pub(crate) fn clear_state_dir(
    handler: &str,
    ctx: &HandlerContext<'_>,
    dry_run: bool,
) -> Result<Vec<ClearedItem>> {
    let store = ctx.store;
    let pack = ctx.pack.name.as_str();
    let dir = store.handler_dir(pack, handler);
    if !store.fs().entry_exists(&dir) {
        return Ok(Vec::new());
    }

    let mut items: Vec<ClearedItem> = store
        .list_sentinels(pack, handler)?
        .into_iter()
        .map(|s| cleared(ClearedKind::Sentinel, s, Ok(true)))
        .collect();
    let outcome = if dry_run {
        Ok(true)
    } else {
        store.remove_state(pack, handler)
    };
    let dir_item = cleared(ClearedKind::StateDir, dir, outcome);
    if !dir_item.success {
        for item in &mut items {
            item.success = false;
            item.error.clone_from(&dir_item.error);
        }
    }
    items.push(dir_item);
    Ok(items)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for handler unit tests.
    use std::sync::Arc;

    use crate::config::PackConfig;
    use crate::datastore::DataStore;
    use crate::fs::MemoryFs;
    use crate::paths::Paths;
    use crate::rules::Match;
    use crate::types::Pack;

    pub fn store(fs: MemoryFs) -> (Arc<MemoryFs>, DataStore) {
        let fs = Arc::new(fs);
        let store = DataStore::new(fs.clone(), Paths::new("/dots", "/data", "/h"));
        (fs, store)
    }

    pub fn pack(name: &str) -> Pack {
        Pack::new(name, format!("/dots/{name}"), PackConfig::default())
    }

    pub fn matched(pack: &str, name: &str, handler: &str, is_dir: bool) -> Match {
        Match {
            pack: pack.to_string(),
            source: format!("/dots/{pack}/{name}").into(),
            relative: name.into(),
            is_dir,
            handler: handler.to_string(),
            options: std::collections::BTreeMap::new(),
        }
    }
}
