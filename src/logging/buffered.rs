//! Per-pack output buffer for parallel runs.
use std::sync::{Arc, Mutex, PoisonError};

use super::logger::Logger;
use super::types::{Log, LogKind};

/// Holds one pack's output until the pack finishes.
///
/// Lines are replayed through the shared [`Logger`] in the order they were
/// recorded, under its console lock, so two packs finishing at once still
/// print as two contiguous blocks.
#[derive(Debug)]
pub struct BufferedLog {
    inner: Arc<Logger>,
    pending: Mutex<Vec<(LogKind, String)>>,
}

impl BufferedLog {
    /// Buffer that will replay through `inner`.
    #[must_use]
    pub const fn new(inner: Arc<Logger>) -> Self {
        Self {
            inner,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn take(&self) -> Vec<(LogKind, String)> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replay buffered lines without touching the progress line.
    #[cfg(test)]
    pub fn flush(&self) {
        for (kind, msg) in self.take() {
            kind.emit(&msg);
        }
    }

    /// Replay buffered lines, mark `pack` finished, and redraw the progress
    /// line for packs still running.
    pub fn flush_and_complete(&self, pack: &str) {
        let _console = self.inner.hold_console();
        self.inner.clear_progress();
        for (kind, msg) in self.take() {
            kind.emit(&msg);
        }
        if let Some(running) = self.inner.finish_pack(pack) {
            self.inner.draw_progress(&running);
        }
    }
}

impl Log for BufferedLog {
    fn record(&self, kind: LogKind, msg: &str) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, msg.to_string()));
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::isolated_logger;
    use std::fs;

    #[test]
    fn nothing_reaches_file_before_flush() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let buf = BufferedLog::new(Arc::clone(&log));
        buf.info("held-back");
        let path = log.log_path().expect("log path");
        assert!(!fs::read_to_string(path).unwrap().contains("held-back"));
        buf.flush();
        assert!(fs::read_to_string(path).unwrap().contains("held-back"));
    }

    #[test]
    fn replays_in_recorded_order() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let buf = BufferedLog::new(Arc::clone(&log));
        buf.stage("vim");
        buf.dry_run("would link vimrc");
        buf.warn("gvimrc skipped");
        buf.info("symlink: 1 linked");
        buf.flush();
        let contents = fs::read_to_string(log.log_path().expect("log path")).unwrap();
        let order: Vec<usize> = ["==> vim", "[dry run] would link", "[warn] gvimrc", "symlink: 1"]
            .iter()
            .map(|m| contents.find(m).expect("line in log"))
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{order:?}");
    }

    #[test]
    fn flush_is_not_repeated() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        let buf = BufferedLog::new(Arc::clone(&log));
        buf.info("once-only");
        buf.flush();
        buf.flush();
        let contents = fs::read_to_string(log.log_path().expect("log path")).unwrap();
        assert_eq!(contents.matches("once-only").count(), 1);
    }

    #[test]
    fn completing_last_pack_hides_progress() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        log.notify_pack_start("vim");
        BufferedLog::new(Arc::clone(&log)).flush_and_complete("vim");
        assert!(!log.progress_visible());
    }

    #[test]
    fn completing_one_pack_keeps_others_running() {
        let (log, _tmp, _guard) = isolated_logger();
        let log = Arc::new(log);
        log.notify_pack_start("vim");
        log.notify_pack_start("zsh");
        BufferedLog::new(Arc::clone(&log)).flush_and_complete("vim");
        assert_eq!(log.running_packs(), vec!["zsh".to_string()]);
        assert!(log.progress_visible());
    }
}
