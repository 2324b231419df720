//! Pack discovery: top-level directories of the dotfiles root.
use crate::config::{IGNORE_MARKER, PackConfig, RootConfig};
use crate::error::{DodotError, Result};
use crate::fs::Fs;
use crate::logging::Log;
use crate::paths::Paths;
use crate::types::Pack;

/// `true` if `name` is listed (literally or by glob) in the root ignore list.
fn is_ignored(ignore: &[String], name: &str) -> bool {
    ignore.iter().any(|pattern| {
        pattern == name
            || glob::Pattern::new(pattern).is_ok_and(|p| p.matches(name))
    })
}

/// Discover packs under the dotfiles root in alphabetical order.
///
/// When `requested` is non-empty only those packs are loaded, and every
/// requested name must resolve to a discovered pack.
///
/// # Errors
///
/// Returns a configuration error if the root or a pack configuration cannot
/// be read, and a not-found error naming every requested pack that is absent.
pub fn discover_packs(
    fs: &dyn Fs,
    paths: &Paths,
    root_config: &RootConfig,
    requested: &[String],
    log: &dyn Log,
) -> Result<Vec<Pack>> {
    let root = paths.dotfiles_root();
    let entries = fs.read_dir(root).map_err(|e| {
        DodotError::config(
            format!("cannot read dotfiles root: {e}"),
            Some(root.to_path_buf()),
        )
    })?;

    let mut candidates: Vec<(String, std::path::PathBuf)> = Vec::new();
    for entry in entries {
        let Some(name) = entry.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if is_ignored(&root_config.ignore, &name) {
            log.debug(&format!("skipping {name}: ignored by root config"));
            continue;
        }
        if !fs.metadata(&entry).is_ok_and(|m| m.is_dir()) {
            continue;
        }
        if fs.entry_exists(&entry.join(IGNORE_MARKER)) {
            log.debug(&format!("skipping {name}: {IGNORE_MARKER} present"));
            continue;
        }
        candidates.push((name, entry));
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    if !requested.is_empty() {
        let missing: Vec<String> = requested
            .iter()
            .filter(|name| !candidates.iter().any(|(n, _)| n == *name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(DodotError::NotFound {
                packs: missing,
                root: root.display().to_string(),
                source_desc: paths.root_source().to_string(),
            });
        }
        candidates.retain(|(n, _)| requested.contains(n));
    }

    let mut packs = Vec::with_capacity(candidates.len());
    for (name, dir) in candidates {
        let config = PackConfig::load(fs, &dir)?;
        for warning in &config.warnings {
            log.warn(&format!("{name}: {warning}"));
        }
        packs.push(Pack::new(name, dir, config));
    }
    Ok(packs)
}

/// Normalize user-supplied pack names: trailing separators are dropped
/// (shell completion adds them) and duplicates removed.
#[must_use]
pub fn normalize_pack_names(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let trimmed = name.trim_end_matches(['/', '\\']).to_string();
        if !trimmed.is_empty() && !out.contains(&trimmed) {
            out.push(trimmed);
        }
    }
    out
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fs::MemoryFs;
    use crate::logging::test_log::RecordingLog;
    use std::path::Path;

    fn names(packs: &[Pack]) -> Vec<&str> {
        packs.iter().map(|p| p.name.as_str()).collect()
    }

    fn paths() -> Paths {
        Paths::new("/dots", "/data", "/h")
    }

    fn fixture() -> MemoryFs {
        MemoryFs::new()
            .with_file("/dots/zsh/zshrc", "")
            .with_file("/dots/vim/vimrc", "")
            .with_file("/dots/.git/HEAD", "")
            .with_file("/dots/README.md", "")
            .with_file("/dots/scratch/notes", "")
            .with_file("/dots/old/.dodotignore", "")
    }

    #[test]
    fn skips_hidden_files_and_marked_packs() {
        let fs = fixture();
        let log = RecordingLog::default();
        let packs = discover_packs(&fs, &paths(), &RootConfig::default(), &[], &log).unwrap();
        assert_eq!(names(&packs), vec!["scratch", "vim", "zsh"]);
        assert_eq!(packs[1].path, Path::new("/dots/vim"));
    }

    #[test]
    fn root_ignore_accepts_globs() {
        let fs = fixture();
        let config = RootConfig {
            ignore: vec!["scr*".to_string()],
            ..RootConfig::default()
        };
        let log = RecordingLog::default();
        let packs = discover_packs(&fs, &paths(), &config, &[], &log).unwrap();
        assert_eq!(names(&packs), vec!["vim", "zsh"]);
    }

    #[test]
    fn filter_keeps_requested_only() {
        let fs = fixture();
        let log = RecordingLog::default();
        let packs = discover_packs(
            &fs,
            &paths(),
            &RootConfig::default(),
            &["zsh".to_string()],
            &log,
        )
        .unwrap();
        assert_eq!(names(&packs), vec!["zsh"]);
    }

    #[test]
    fn missing_requested_pack_is_not_found() {
        let fs = fixture();
        let log = RecordingLog::default();
        let err = discover_packs(
            &fs,
            &paths(),
            &RootConfig::default(),
            &["vim".to_string(), "emacs".to_string(), "old".to_string()],
            &log,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let DodotError::NotFound { packs, root, .. } = err else {
            panic!("expected a not-found error");
        };
        assert_eq!(packs, vec!["emacs".to_string(), "old".to_string()]);
        assert_eq!(root, "/dots");
    }

    #[test]
    fn unreadable_root_is_config_error() {
        let fs = MemoryFs::new();
        let log = RecordingLog::default();
        let err = discover_packs(&fs, &paths(), &RootConfig::default(), &[], &log).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn pack_config_warnings_are_logged() {
        let fs = MemoryFs::new()
            .with_file("/dots/vim/vimrc", "")
            .with_file("/dots/vim/.dodot.toml", "colour = \"blue\"\n");
        let log = RecordingLog::default();
        discover_packs(&fs, &paths(), &RootConfig::default(), &[], &log).unwrap();
        assert!(log.contains("warn: vim:"), "{:?}", log.lines());
    }

    #[test]
    fn pack_names_are_normalized() {
        let names = normalize_pack_names(&[
            "vim/".to_string(),
            "zsh".to_string(),
            "vim".to_string(),
        ]);
        assert_eq!(names, vec!["vim".to_string(), "zsh".to_string()]);
    }
}
