//! Root and per-pack `.dodot.toml` configuration.
//!
//! Both files are optional. The root file may ignore packs and add rules that
//! apply to every pack; a pack file may ignore entries, add per-handler
//! pattern tables and add full `[[rule]]` entries.
//!
//! ```toml
//! # <root>/.dodot.toml
//! [packs]
//! ignore = ["scratch"]
//!
//! [[rule]]
//! match = "*.zsh"
//! handler = "shell"
//! ```
//!
//! ```toml
//! # <root>/vim/.dodot.toml
//! [pack]
//! ignore = ["*.md"]
//!
//! [path]
//! patterns = ["scripts/"]
//!
//! [[rule]]
//! match = "nvim"
//! handler = "symlink"
//! options = { target = ".config/nvim" }
//! ```
pub mod loader;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

pub use loader::{ConfigWarning, load_config, parse_config};

use crate::error::Result;
use crate::fs::Fs;
use crate::rules::Rule;

/// Name of the configuration file at the root and in each pack.
pub const CONFIG_FILE: &str = ".dodot.toml";

/// Marker file whose presence excludes a pack from discovery.
pub const IGNORE_MARKER: &str = ".dodotignore";

/// Handler names that may carry a `[<handler>] patterns = [...]` table.
const HANDLER_TABLES: &[&str] = &["symlink", "path", "shell", "install", "homebrew"];

/// A `[[rule]]` entry as written in TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuleEntry {
    /// Glob pattern; trailing `/` matches directories only, leading `!`
    /// excludes.
    #[serde(rename = "match")]
    pub pattern: String,
    /// Handler that claims matching entries.
    pub handler: String,
    /// Handler-specific options.
    pub options: BTreeMap<String, String>,
}

impl From<RuleEntry> for Rule {
    fn from(entry: RuleEntry) -> Self {
        Self {
            pattern: entry.pattern,
            handler: entry.handler,
            options: entry.options,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PacksSection {
    ignore: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRootConfig {
    packs: PacksSection,
    #[serde(rename = "rule")]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PatternTable {
    patterns: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPackConfig {
    pack: PacksSection,
    symlink: Option<PatternTable>,
    path: Option<PatternTable>,
    shell: Option<PatternTable>,
    install: Option<PatternTable>,
    homebrew: Option<PatternTable>,
    #[serde(rename = "rule")]
    rules: Vec<RuleEntry>,
}

impl RawPackConfig {
    fn table(&self, handler: &str) -> Option<&PatternTable> {
        match handler {
            "symlink" => self.symlink.as_ref(),
            "path" => self.path.as_ref(),
            "shell" => self.shell.as_ref(),
            "install" => self.install.as_ref(),
            "homebrew" => self.homebrew.as_ref(),
            _ => None,
        }
    }
}

/// Parsed `<root>/.dodot.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootConfig {
    /// Pack names excluded from discovery.
    pub ignore: Vec<String>,
    /// Rules applied to every pack, in file order.
    pub rules: Vec<Rule>,
    /// Unknown keys encountered while parsing.
    pub warnings: Vec<ConfigWarning>,
}

impl RootConfig {
    /// Load from the dotfiles root; a missing file yields the empty config.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file is unreadable or malformed.
    pub fn load(fs: &dyn Fs, root: &Path) -> Result<Self> {
        let (raw, warnings): (RawRootConfig, _) = load_config(fs, &root.join(CONFIG_FILE))?;
        Ok(Self {
            ignore: raw.packs.ignore,
            rules: raw.rules.into_iter().map(Rule::from).collect(),
            warnings,
        })
    }
}

/// Parsed `<pack>/.dodot.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackConfig {
    /// Entry patterns to skip, evaluated like `!pattern` rules.
    pub ignore: Vec<String>,
    /// Pack rules in file order: handler tables first (in handler
    /// precedence), then `[[rule]]` entries.
    pub rules: Vec<Rule>,
    /// Unknown keys encountered while parsing.
    pub warnings: Vec<ConfigWarning>,
}

impl PackConfig {
    /// Load from a pack directory; a missing file yields the empty config.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file is unreadable or malformed.
    pub fn load(fs: &dyn Fs, pack_dir: &Path) -> Result<Self> {
        let (raw, warnings): (RawPackConfig, _) = load_config(fs, &pack_dir.join(CONFIG_FILE))?;

        let mut rules = Vec::new();
        for handler in HANDLER_TABLES {
            if let Some(table) = raw.table(handler) {
                rules.extend(
                    table
                        .patterns
                        .iter()
                        .map(|pattern| Rule::new(pattern.clone(), *handler)),
                );
            }
        }
        rules.extend(raw.rules.into_iter().map(Rule::from));

        Ok(Self {
            ignore: raw.pack.ignore,
            rules,
            warnings,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    #[test]
    fn root_config_defaults_when_absent() {
        let fs = MemoryFs::new().with_dir("/dots");
        let cfg = RootConfig::load(&fs, Path::new("/dots")).unwrap();
        assert_eq!(cfg, RootConfig::default());
    }

    #[test]
    fn root_config_reads_ignores_and_rules() {
        let fs = MemoryFs::new().with_file(
            "/dots/.dodot.toml",
            "[packs]\nignore = [\"scratch\"]\n\n[[rule]]\nmatch = \"*.zsh\"\nhandler = \"shell\"\n",
        );
        let cfg = RootConfig::load(&fs, Path::new("/dots")).unwrap();
        assert_eq!(cfg.ignore, vec!["scratch"]);
        assert_eq!(cfg.rules, vec![Rule::new("*.zsh", "shell")]);
        assert!(cfg.warnings.is_empty());
    }

    #[test]
    fn pack_config_orders_tables_before_rules() {
        let fs = MemoryFs::new().with_file(
            "/dots/vim/.dodot.toml",
            r#"
[pack]
ignore = ["*.md"]

[shell]
patterns = ["env.sh"]

[path]
patterns = ["scripts/"]

[[rule]]
match = "nvim"
handler = "symlink"
options = { target = ".config/nvim" }
"#,
        );
        let cfg = PackConfig::load(&fs, Path::new("/dots/vim")).unwrap();
        assert_eq!(cfg.ignore, vec!["*.md"]);
        assert_eq!(cfg.rules.len(), 3);
        assert_eq!(cfg.rules[0], Rule::new("scripts/", "path"));
        assert_eq!(cfg.rules[1], Rule::new("env.sh", "shell"));
        assert_eq!(
            cfg.rules[2],
            Rule::new("nvim", "symlink").with_option("target", ".config/nvim")
        );
    }

    #[test]
    fn pack_config_warns_on_unknown_keys() {
        let fs = MemoryFs::new().with_file("/dots/vim/.dodot.toml", "[pack]\nignroe = []\n");
        let cfg = PackConfig::load(&fs, Path::new("/dots/vim")).unwrap();
        assert_eq!(cfg.warnings.len(), 1);
        assert_eq!(cfg.warnings[0].key, "pack.ignroe");
    }

    #[test]
    fn pack_config_rejects_malformed_file() {
        let fs = MemoryFs::new().with_file("/dots/vim/.dodot.toml", "[[rule]\n");
        let err = PackConfig::load(&fs, Path::new("/dots/vim")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
