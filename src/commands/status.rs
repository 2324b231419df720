//! Command: show the deployment status of each pack.
use anyhow::Result;

use super::Session;
use crate::cli::{GlobalOpts, PackArgs};
use crate::datastore::StatusState;
use crate::handlers::tilde;
use crate::pipeline::StatusEntry;
use crate::types::CommandIntent;

/// Icon and colour for a status state.
const fn badge(state: StatusState) -> (&'static str, &'static str) {
    match state {
        StatusState::Ready => ("✓", "\x1b[32m"),
        StatusState::Pending => ("~", "\x1b[33m"),
        StatusState::Missing => ("·", "\x1b[2m"),
        StatusState::Error => ("✗", "\x1b[31m"),
        StatusState::Skipped => ("○", "\x1b[2m"),
    }
}

/// Render one status line (without trailing newline).
fn render_line(entry: &StatusEntry, home: &std::path::Path) -> String {
    let (icon, color) = badge(entry.status.state);
    let target = entry
        .target
        .as_deref()
        .map_or_else(String::new, |t| format!(" -> {}", tilde(home, t)));
    let when = entry
        .status
        .timestamp
        .map_or_else(String::new, |t| format!(" [{}]", t.format("%Y-%m-%d %H:%M")));
    format!(
        "  {color}{icon} {:<8} {}{target}\x1b[0m  \x1b[2m{}{when}\x1b[0m",
        entry.handler, entry.file, entry.status.message
    )
}

/// Print per-pack status lines.
///
/// # Errors
///
/// Returns an error if discovery fails or state cannot be inspected.
#[allow(clippy::print_stdout)]
pub fn run(session: &Session, global: &GlobalOpts, packs: &PackArgs) -> Result<()> {
    let opts = super::options(global, CommandIntent::All, packs, false);
    let entries = session.pipeline.status(&opts)?;
    let home = session.paths().home();

    let mut current: Option<&str> = None;
    for entry in &entries {
        if current != Some(entry.pack.as_str()) {
            println!("{}", entry.pack);
            current = Some(entry.pack.as_str());
        }
        println!("{}", render_line(entry, home));
    }
    if entries.is_empty() {
        println!("no deployable files found");
    }
    Ok(())
}
