//! Top-level subcommand orchestration.
//!
//! Each subcommand builds a [`Session`] from the global options, hands the
//! work to the [`Pipeline`], and renders the result. Errors cross into
//! [`anyhow`] here; [`exit_code`] recovers the classification for the
//! process exit status.
pub mod completions;
pub mod deploy;
pub mod list;
pub mod shell_init;
pub mod status;
pub mod version;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::cli::{GlobalOpts, PackArgs};
use crate::datastore::DataStore;
use crate::error::DodotError;
use crate::exec::SystemRunner;
use crate::fs::SystemFs;
use crate::handlers::registry;
use crate::logging::{Log as _, Logger};
use crate::paths::{Environment, Paths};
use crate::pipeline::{CancelToken, Options, Pipeline};
use crate::types::CommandIntent;

/// Shared state produced by the common command setup sequence.
///
/// Captures the environment once, resolves every location, and wires the
/// pipeline to the real filesystem and process runner.
#[derive(Debug)]
pub struct Session {
    /// Pipeline over the real filesystem.
    pub pipeline: Pipeline,
    /// Logger shared with the pipeline.
    pub log: Arc<Logger>,
}

impl Session {
    /// Resolve paths from the global options and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the dotfiles root, data directory, or home
    /// directory cannot be determined.
    pub fn init(global: &GlobalOpts, log: Arc<Logger>, cancel: CancelToken) -> Result<Self> {
        let env = Environment::capture();
        let paths = Paths::from_environment(global.dotfiles_root.as_deref(), &env)?;
        log.debug(&format!(
            "dotfiles root: {} ({})",
            paths.dotfiles_root().display(),
            paths.root_source()
        ));
        log.debug(&format!("data dir: {}", paths.data_dir().display()));

        let store = DataStore::new(Arc::new(SystemFs), paths);
        let pipeline = Pipeline::new(
            store,
            registry::global().clone(),
            Arc::new(SystemRunner),
            Arc::clone(&log),
        )
        .with_cancel(cancel);
        Ok(Self { pipeline, log })
    }

    /// Resolved locations.
    #[must_use]
    pub const fn paths(&self) -> &Paths {
        self.pipeline.store().paths()
    }
}

/// Build pipeline options from the command line.
#[must_use]
pub fn options(global: &GlobalOpts, intent: CommandIntent, packs: &PackArgs, force: bool) -> Options {
    Options {
        packs: packs.packs.clone(),
        dry_run: global.dry_run,
        intent,
        force,
        enable_home_symlinks: global.enable_home_symlinks,
        parallel: global.parallel,
        command_timeout: global.timeout.map(Duration::from_secs),
    }
}

/// Process exit status for a command error.
///
/// Library errors keep their classification; anything else is a generic
/// failure.
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<DodotError>()
        .map_or(1, |e| e.kind().exit_code())
}
