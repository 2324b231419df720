//! The process-wide logger: immediate output, run summaries, and the
//! progress line shown while packs run in parallel.
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::{Log, LogKind};
use super::utils::{console_width, log_file_path};
use crate::context::{ExecutionContext, HandlerResult};
use crate::datastore::StatusState;

/// Packs running in parallel and whether their progress line is on screen.
#[derive(Debug, Default)]
struct Progress {
    running: Vec<String>,
    visible: bool,
}

/// Logger writing through the global tracing subscriber.
///
/// Everything also lands in `$XDG_CACHE_HOME/dodot/<command>.log` (ANSI
/// stripped, debug included) once [`init_subscriber`](super::init_subscriber)
/// has run. Constructing a `Logger` has no side effects.
#[derive(Debug)]
pub struct Logger {
    log_file: Option<PathBuf>,
    console: Mutex<()>,
    progress: Mutex<Progress>,
}

impl Logger {
    /// Logger for `command`, which names the log file.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            log_file: log_file_path(command),
            console: Mutex::new(()),
            progress: Mutex::new(Progress::default()),
        }
    }

    /// Path of the log file, when a cache directory exists.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive use of the console while a pack's buffered output replays.
    pub(super) fn hold_console(&self) -> MutexGuard<'_, ()> {
        self.console.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn progress_visible(&self) -> bool {
        self.progress().visible
    }

    #[cfg(test)]
    pub(crate) fn running_packs(&self) -> Vec<String> {
        self.progress().running.clone()
    }

    /// Print the per-pack, per-handler outcome of a run.
    pub fn print_summary(&self, ctx: &ExecutionContext) {
        if ctx.packs().next().is_none() {
            self.info("no packs processed");
            return;
        }

        self.stage("Summary");

        let (mut ok, mut skipped, mut failed) = (0usize, 0usize, 0usize);
        for pack in ctx.packs() {
            if pack.handlers().is_empty() {
                skipped += 1;
                self.info(&format!("\x1b[2m· {} (nothing to do)\x1b[0m", pack.pack));
                continue;
            }
            for handler in pack.handlers() {
                let (icon, color) = match handler.status {
                    StatusState::Error => {
                        failed += 1;
                        ("✗", "\x1b[31m")
                    }
                    StatusState::Skipped => {
                        skipped += 1;
                        ("○", "\x1b[33m")
                    }
                    _ if ctx.dry_run() => {
                        ok += 1;
                        ("~", "\x1b[37m")
                    }
                    _ => {
                        ok += 1;
                        ("✓", "\x1b[32m")
                    }
                };
                self.info(&format!(
                    "{color}{icon} {}: {}{}\x1b[0m",
                    pack.pack,
                    handler.handler,
                    summary_suffix(handler)
                ));
            }
        }

        let mode = if ctx.dry_run() { " (dry run)" } else { "" };
        let elapsed = ctx
            .ended_at()
            .map(|end| format!(" in {}ms", (end - ctx.started_at()).num_milliseconds()))
            .unwrap_or_default();
        self.info(&format!(
            "{} handlers{mode}: \x1b[32m{ok} ok\x1b[0m, \x1b[33m{skipped} skipped\x1b[0m, \x1b[31m{failed} failed\x1b[0m ({}){elapsed}",
            ok + skipped + failed,
            ctx.status()
        ));
        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }

    /// Erase the progress line, if shown. Call with the console held.
    #[allow(clippy::print_stdout)]
    pub(super) fn clear_progress(&self) {
        let mut progress = self.progress();
        if progress.visible {
            print!("\r\x1b[K");
            std::io::stdout().flush().ok();
            progress.visible = false;
        }
    }

    /// Show `names` on a single progress row, truncated to the console
    /// width. Call with the console held.
    #[allow(clippy::print_stdout)]
    pub(super) fn draw_progress(&self, names: &str) {
        let room = console_width().saturating_sub(4);
        let shown = if names.chars().count() > room {
            let mut cut: String = names.chars().take(room.saturating_sub(1)).collect();
            cut.push('…');
            cut
        } else {
            names.to_string()
        };
        print!("  \x1b[2m▹ {shown}\x1b[0m");
        std::io::stdout().flush().ok();
        self.progress().visible = true;
    }

    /// Add `pack` to the running set and redraw the progress line.
    pub fn notify_pack_start(&self, pack: &str) {
        let _console = self.hold_console();
        self.clear_progress();
        let names = {
            let mut progress = self.progress();
            progress.running.push(pack.to_string());
            progress.running.join(", ")
        };
        self.draw_progress(&names);
    }

    /// Remove `pack` from the running set; the remaining names, if any.
    pub(super) fn finish_pack(&self, pack: &str) -> Option<String> {
        let mut progress = self.progress();
        progress.running.retain(|p| p != pack);
        (!progress.running.is_empty()).then(|| progress.running.join(", "))
    }
}

/// Trailing detail for one summary line.
fn summary_suffix(handler: &HandlerResult) -> String {
    if let Some(err) = &handler.error {
        return format!(" ({})", err.message);
    }
    if !handler.cleared.is_empty() {
        let removed = handler.cleared.len();
        return format!(" ({removed} removed)");
    }
    match handler.files.len() {
        0 => String::new(),
        1 => " (1 file)".to_string(),
        n => format!(" ({n} files)"),
    }
}

impl Log for Logger {
    fn record(&self, kind: LogKind, msg: &str) {
        kind.emit(msg);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::context::{ActionResult, ClearedItem, ClearedKind};
    use crate::error::{ActionError, ErrorKind};
    use crate::logging::isolated_logger;
    use std::fs;

    fn read_log(log: &Logger) -> String {
        fs::read_to_string(log.log_path().expect("log path")).unwrap()
    }

    fn action(pack: &str, file: &str, status: StatusState) -> ActionResult {
        ActionResult {
            pack: pack.to_string(),
            handler: "symlink".to_string(),
            file: file.to_string(),
            description: format!("link {file}"),
            status,
            message: String::new(),
            error: None,
        }
    }

    #[test]
    fn log_file_is_created() {
        let (log, _tmp, _guard) = isolated_logger();
        let path = log.log_path().expect("log path should exist");
        assert!(path.exists(), "log file should be created by the file layer");
        assert!(read_log(&log).contains("dodot"));
    }

    #[test]
    fn debug_always_written_to_file() {
        let (log, _tmp, _guard) = isolated_logger();
        let marker = format!("debug-marker-{}", std::process::id());
        log.debug(&marker);
        assert!(
            read_log(&log).contains(&marker),
            "debug messages should always appear in the log file"
        );
    }

    #[test]
    fn levels_are_tagged_in_file() {
        let (log, _tmp, _guard) = isolated_logger();
        log.warn("warn-marker");
        log.error("error-marker");
        log.stage("stage-marker");
        log.dry_run("dryrun-marker");
        let contents = read_log(&log);
        assert!(contents.contains("[warn] warn-marker"));
        assert!(contents.contains("[error] error-marker"));
        assert!(contents.contains("==> stage-marker"));
        assert!(contents.contains("[dry run] dryrun-marker"));
    }

    #[test]
    fn summary_lists_each_handler() {
        let (log, _tmp, _guard) = isolated_logger();
        let mut ctx = ExecutionContext::new("link", false);
        ctx.add_handler_result(
            "vim",
            HandlerResult::from_actions("symlink", vec![action("vim", "vimrc", StatusState::Ready)]),
        )
        .unwrap();
        ctx.add_handler_result(
            "dev",
            HandlerResult::failed(
                "install",
                vec!["install.sh".to_string()],
                ActionError {
                    kind: ErrorKind::Execution,
                    message: "bash exited with 1".to_string(),
                },
            ),
        )
        .unwrap();
        ctx.add_handler_result(
            "zsh",
            HandlerResult::from_cleared(
                "shell",
                vec![ClearedItem {
                    kind: ClearedKind::Intermediate,
                    path: PathBuf::from("/data/packs/zsh/shell/aliases.sh"),
                    success: true,
                    error: None,
                }],
            ),
        )
        .unwrap();
        ctx.complete().unwrap();

        log.print_summary(&ctx);
        let contents = read_log(&log);
        assert!(contents.contains("==> Summary"));
        assert!(contents.contains("✓ vim: symlink (1 file)"));
        assert!(contents.contains("✗ dev: install (bash exited with 1)"));
        assert!(contents.contains("✓ zsh: shell (1 removed)"));
        assert!(contents.contains("3 handlers: 2 ok, 0 skipped, 1 failed (partial) in "));
    }

    #[test]
    fn summary_of_empty_run() {
        let (log, _tmp, _guard) = isolated_logger();
        let mut ctx = ExecutionContext::new("link", true);
        ctx.complete().unwrap();
        log.print_summary(&ctx);
        assert!(read_log(&log).contains("no packs processed"));
    }

    #[test]
    fn progress_tracks_running_packs() {
        let (log, _tmp, _guard) = isolated_logger();
        assert!(!log.progress_visible());
        log.notify_pack_start("vim");
        log.notify_pack_start("zsh");
        assert!(log.progress_visible());
        assert_eq!(log.running_packs(), vec!["vim".to_string(), "zsh".to_string()]);
        assert_eq!(log.finish_pack("vim"), Some("zsh".to_string()));
        assert_eq!(log.finish_pack("zsh"), None);
    }

    #[test]
    fn clearing_hides_progress() {
        let (log, _tmp, _guard) = isolated_logger();
        log.draw_progress(&"pack".repeat(100));
        assert!(log.progress_visible());
        log.clear_progress();
        assert!(!log.progress_visible());
    }
}
