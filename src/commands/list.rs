//! Command: list discovered packs.
use anyhow::Result;

use super::Session;
use crate::cli::{GlobalOpts, PackArgs};
use crate::types::CommandIntent;

/// Print one pack name per line.
///
/// # Errors
///
/// Returns an error if the dotfiles root cannot be read.
#[allow(clippy::print_stdout)]
pub fn run(session: &Session, global: &GlobalOpts) -> Result<()> {
    let opts = super::options(global, CommandIntent::All, &PackArgs::default(), false);
    for pack in session.pipeline.list(&opts)? {
        println!("{}", pack.name);
    }
    Ok(())
}
