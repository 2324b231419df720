//! Commands: `link`, `provision`, `deploy`, `unlink`, `deprovision`.
use anyhow::Result;

use super::{Session, version};
use crate::cli::{GlobalOpts, PackArgs};
use crate::logging::Log as _;
use crate::types::CommandIntent;

/// Run the pipeline for `intent` and print the summary.
///
/// The summary is printed for failed and cancelled runs too, from the
/// partial context carried by the error.
///
/// # Errors
///
/// Returns an error if discovery fails, any action fails, or the run is
/// cancelled.
pub fn run(
    session: &Session,
    global: &GlobalOpts,
    intent: CommandIntent,
    packs: &PackArgs,
    force: bool,
) -> Result<()> {
    let log = &session.log;
    log.info(&format!("dodot {}", version::version()));
    if global.dry_run {
        log.dry_run("no changes will be made");
    }

    log.stage(&format!("Running {intent}"));
    let opts = super::options(global, intent, packs, force);
    match session.pipeline.run(&opts) {
        Ok(ctx) => {
            log.print_summary(&ctx);
            Ok(())
        }
        Err(err) => {
            if let Some(ctx) = err.context() {
                log.print_summary(ctx);
            }
            Err(err.into())
        }
    }
}
