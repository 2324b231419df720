//! Log file location, ANSI stripping, and timestamps.
use std::path::PathBuf;

/// Remove ANSI escape sequences.
///
/// CSI sequences (`ESC [ ... final`) are dropped through their final byte in
/// `@..=~`; any other escape drops the single character after `ESC`.
pub fn strip_ansi(s: &str) -> String {
    let mut segments = s.split('\x1b');
    let mut out = segments.next().unwrap_or_default().to_string();
    for segment in segments {
        let mut chars = segment.chars();
        match chars.next() {
            Some('[') => {
                let rest = chars.as_str();
                if let Some(end) = rest.find(|c: char| ('@'..='~').contains(&c)) {
                    out.push_str(rest.get(end + 1..).unwrap_or_default());
                }
            }
            Some(_) => out.push_str(chars.as_str()),
            None => {}
        }
    }
    out
}

/// Console width from `COLUMNS`, or 80.
pub(super) fn console_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(80)
}

/// Directory for log files: `$XDG_CACHE_HOME/dodot`, else the platform
/// cache dir. Not created here.
pub(super) fn cache_dir() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CACHE_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::cache_dir()?,
    };
    Some(base.join("dodot"))
}

/// `<cache dir>/<command>.log`.
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join(format!("{command}.log")))
}

/// Current UTC time rendered with a `chrono` format string.
pub(super) fn utc_now(format: &str) -> String {
    chrono::Utc::now().format(format).to_string()
}
