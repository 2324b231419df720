//! Built-in rules, lowest priority.
use super::Rule;

/// The default rule table, highest priority first.
///
/// The catch-all `*` sends everything unclaimed to the symlink handler.
#[must_use]
pub fn default_rules() -> Vec<Rule> {
    [
        ("install.sh", "install"),
        ("Brewfile", "homebrew"),
        ("bin/", "path"),
        ("aliases.sh", "shell"),
        ("profile.sh", "shell"),
        ("login.sh", "shell"),
        ("*.profile.sh", "shell"),
        ("*", "symlink"),
    ]
    .into_iter()
    .map(|(pattern, handler)| Rule::new(pattern, handler))
    .collect()
}
