//! Rule evaluation: map pack entries to handlers.
//!
//! Rules are glob patterns on an entry's basename. A trailing `/` restricts a
//! rule to directories and a leading `!` turns it into an exclusion. For each
//! entry the highest-priority matching rule claims it; an exclusion anywhere in
//! the set wins over every inclusion.
//!
//! Priority, highest first: pack rules (later entries before earlier ones),
//! root rules (same), then [`default_rules`]. A pattern already claimed by a
//! higher layer shadows the same pattern further down.
mod defaults;

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

pub use defaults::default_rules;

use crate::config::{CONFIG_FILE, IGNORE_MARKER};
use crate::error::{DodotError, Result};
use crate::fs::Fs;
use crate::types::Pack;

/// A pattern-to-handler mapping with handler-specific options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Glob pattern as written.
    pub pattern: String,
    /// Name of the handler that claims matches.
    pub handler: String,
    /// Handler options (e.g. `target` for the symlink handler).
    pub options: BTreeMap<String, String>,
}

impl Rule {
    /// Rule without options.
    #[must_use]
    pub fn new(pattern: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            handler: handler.into(),
            options: BTreeMap::new(),
        }
    }

    /// Add an option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// `true` for `!pattern` rules.
    #[must_use]
    pub fn is_exclusion(&self) -> bool {
        self.pattern.starts_with('!')
    }
}

/// A pack entry claimed by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Owning pack name.
    pub pack: String,
    /// Absolute path of the entry.
    pub source: PathBuf,
    /// Path relative to the pack directory.
    pub relative: PathBuf,
    /// Whether the entry is a directory (following links).
    pub is_dir: bool,
    /// Claiming handler.
    pub handler: String,
    /// Options copied from the claiming rule.
    pub options: BTreeMap<String, String>,
}

#[derive(Debug)]
struct CompiledRule {
    rule: Rule,
    glob: glob::Pattern,
    dir_only: bool,
}

impl CompiledRule {
    fn compile(rule: Rule) -> Result<Self> {
        let body = rule.pattern.strip_prefix('!').unwrap_or(&rule.pattern);
        let (body, dir_only) = body
            .strip_suffix('/')
            .map_or((body, false), |stripped| (stripped, true));
        if body.is_empty() {
            return Err(DodotError::Rule {
                pattern: rule.pattern.clone(),
                message: "empty pattern".to_string(),
            });
        }
        let glob = glob::Pattern::new(body).map_err(|e| DodotError::Rule {
            pattern: rule.pattern.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            rule,
            glob,
            dir_only,
        })
    }

    fn matches(&self, name: &str, is_dir: bool) -> bool {
        (!self.dir_only || is_dir) && self.glob.matches(name)
    }
}

/// A compiled, priority-ordered rule list.
#[derive(Debug)]
pub struct RuleSet {
    exclusions: Vec<CompiledRule>,
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile rules given highest priority first.
    ///
    /// # Errors
    ///
    /// Returns a rule error for malformed patterns or when `is_known` rejects
    /// an inclusion rule's handler name.
    pub fn compile(
        rules: impl IntoIterator<Item = Rule>,
        is_known: impl Fn(&str) -> bool,
    ) -> Result<Self> {
        let mut exclusions = Vec::new();
        let mut compiled = Vec::new();
        for rule in rules {
            if rule.is_exclusion() {
                exclusions.push(CompiledRule::compile(rule)?);
                continue;
            }
            if !is_known(&rule.handler) {
                return Err(DodotError::Rule {
                    pattern: rule.pattern,
                    message: format!("unknown handler '{}'", rule.handler),
                });
            }
            compiled.push(CompiledRule::compile(rule)?);
        }
        Ok(Self {
            exclusions,
            rules: compiled,
        })
    }

    /// Merge the rule layers for one pack and compile them.
    ///
    /// `pack_ignore` entries become exclusions.
    ///
    /// # Errors
    ///
    /// See [`RuleSet::compile`].
    pub fn for_pack(
        defaults: &[Rule],
        root_rules: &[Rule],
        pack_rules: &[Rule],
        pack_ignore: &[String],
        is_known: impl Fn(&str) -> bool,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let layers = pack_rules
            .iter()
            .rev()
            .chain(root_rules.iter().rev())
            .chain(defaults.iter());
        for rule in layers {
            if seen.insert(rule.pattern.as_str()) {
                ordered.push(rule.clone());
            }
        }
        ordered.extend(
            pack_ignore
                .iter()
                .map(|pattern| Rule::new(format!("!{pattern}"), "")),
        );
        Self::compile(ordered, is_known)
    }

    /// The rule that claims an entry, or `None` if excluded or unmatched.
    #[must_use]
    pub fn claim(&self, name: &str, is_dir: bool) -> Option<&Rule> {
        if self.exclusions.iter().any(|r| r.matches(name, is_dir)) {
            return None;
        }
        self.rules
            .iter()
            .find(|r| r.matches(name, is_dir))
            .map(|r| &r.rule)
    }

    /// Inclusion rules in priority order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|r| &r.rule)
    }
}

/// `true` for entries never offered to the rules.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    name == CONFIG_FILE || name == IGNORE_MARKER || name.starts_with('.')
}

/// Enumerate a pack's top-level entries and produce one match per claimed
/// entry, sorted by name.
///
/// # Errors
///
/// Returns a filesystem error if the pack directory cannot be listed.
pub fn match_pack(fs: &dyn Fs, pack: &Pack, rules: &RuleSet) -> Result<Vec<Match>> {
    let entries = fs
        .read_dir(&pack.path)
        .map_err(|e| DodotError::fs("read_dir", &pack.path, e))?;

    let mut matches = Vec::new();
    for entry in entries {
        let Some(name) = entry.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if is_reserved(&name) {
            continue;
        }
        let is_dir = fs.metadata(&entry).is_ok_and(|m| m.is_dir());
        if let Some(rule) = rules.claim(&name, is_dir) {
            matches.push(Match {
                pack: pack.name.clone(),
                relative: PathBuf::from(&name),
                source: entry,
                is_dir,
                handler: rule.handler.clone(),
                options: rule.options.clone(),
            });
        }
    }
    Ok(matches)
}
