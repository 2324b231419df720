//! POSIX shell init script that activates path and shell deployments.
//!
//! The script globs the data directory at shell start-up, so it only needs
//! rewriting when the data directory itself moves.
use std::path::Path;

use crate::datastore::state_dir;
use crate::handlers::{path, shell};

/// Quote `s` for a POSIX shell single-quoted string.
fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r#"'\''"#))
}

/// Render the init script for `data_dir`.
#[must_use]
pub fn render(data_dir: &Path) -> String {
    let data = sh_quote(&data_dir.display().to_string());
    let path_dir = state_dir(path::NAME);
    let shell_dir = state_dir(shell::NAME);
    format!(
        r#"# Generated by dodot. Do not edit; re-run `dodot link` instead.
# Source this file from your shell profile:
#   . "$(dodot shell-init --path)"
dodot_data={data}

for dodot_entry in "$dodot_data"/packs/*/{path_dir}/*; do
    [ -d "$dodot_entry" ] || continue
    case ":$PATH:" in
        *":$dodot_entry:"*) ;;
        *) PATH="$dodot_entry:$PATH" ;;
    esac
done
export PATH

for dodot_entry in "$dodot_data"/packs/*/{shell_dir}/*; do
    [ -f "$dodot_entry" ] && . "$dodot_entry"
done

unset dodot_data dodot_entry
"#
    )
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn script_globs_path_and_shell_dirs() {
        let script = render(Path::new("/home/me/.local/share/dodot"));
        assert!(script.contains("dodot_data='/home/me/.local/share/dodot'"));
        assert!(script.contains(r#""$dodot_data"/packs/*/path/*"#));
        assert!(script.contains(r#""$dodot_data"/packs/*/shell/*"#));
        assert!(script.contains("export PATH"));
    }

    #[test]
    fn quotes_awkward_data_dirs() {
        assert_eq!(sh_quote("/it's here"), r#"'/it'\''s here'"#);
    }

    #[test]
    fn render_is_deterministic() {
        assert_eq!(render(Path::new("/data")), render(Path::new("/data")));
    }

    #[test]
    fn script_runs_under_sh() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("packs/tools/path/bin");
        std::fs::create_dir_all(&bin).unwrap();
        let shell_dir = tmp.path().join("packs/zsh/shell");
        std::fs::create_dir_all(&shell_dir).unwrap();
        std::fs::write(shell_dir.join("aliases.sh"), "DODOT_TEST_SOURCED=yes\n").unwrap();
        let script = tmp.path().join("init.sh");
        std::fs::write(&script, render(tmp.path())).unwrap();

        let Ok(out) = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!(
                ". '{}'; echo \"$PATH\"; echo \"$DODOT_TEST_SOURCED\"",
                script.display()
            ))
            .output()
        else {
            return;
        };
        let stdout = String::from_utf8_lossy(&out.stdout);
        let mut lines = stdout.lines();
        assert!(lines.next().unwrap().starts_with(&bin.display().to_string()));
        assert_eq!(lines.next(), Some("yes"));
    }
}
