//! Name-to-handler lookup with run modes and execution precedence.
use std::sync::OnceLock;

use super::{Handler, homebrew, install, path, shell, symlink};
use crate::types::RunMode;

/// Constructor for a handler instance.
pub type HandlerFactory = fn() -> Box<dyn Handler>;

/// A registered handler.
#[derive(Debug, Clone, Copy)]
pub struct HandlerEntry {
    /// Handler name used in rules.
    pub name: &'static str,
    /// Category.
    pub run_mode: RunMode,
    /// Lower runs first within a pack.
    pub precedence: u8,
    /// Creates the handler.
    pub factory: HandlerFactory,
}

impl HandlerEntry {
    /// Instantiate the handler.
    #[must_use]
    pub fn create(&self) -> Box<dyn Handler> {
        (self.factory)()
    }
}

/// Handlers known to the pipeline, kept in precedence order.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    entries: Vec<HandlerEntry>,
}

impl HandlerRegistry {
    /// The built-in handlers: symlink, path, shell, install, homebrew.
    #[must_use]
    pub fn builtin() -> Self {
        let entries = vec![
            HandlerEntry {
                name: symlink::NAME,
                run_mode: RunMode::Linking,
                precedence: 10,
                factory: || Box::new(symlink::SymlinkHandler),
            },
            HandlerEntry {
                name: path::NAME,
                run_mode: RunMode::Linking,
                precedence: 20,
                factory: || Box::new(path::PathHandler),
            },
            HandlerEntry {
                name: shell::NAME,
                run_mode: RunMode::Linking,
                precedence: 30,
                factory: || Box::new(shell::ShellHandler),
            },
            HandlerEntry {
                name: install::NAME,
                run_mode: RunMode::Provisioning,
                precedence: 40,
                factory: || Box::new(install::InstallHandler),
            },
            HandlerEntry {
                name: homebrew::NAME,
                run_mode: RunMode::Provisioning,
                precedence: 50,
                factory: || Box::new(homebrew::HomebrewHandler),
            },
        ];
        Self { entries }
    }

    /// Look up a handler by name.
    fn get(&self, name: &str) -> Option<&HandlerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Entries in execution order.
    #[must_use]
    pub fn entries(&self) -> &[HandlerEntry] {
        &self.entries
    }
}

/// Process-wide registry of the built-in handlers.
pub fn global() -> &'static HandlerRegistry {
    static REGISTRY: OnceLock<HandlerRegistry> = OnceLock::new();
    REGISTRY.get_or_init(HandlerRegistry::builtin)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_order_and_modes() {
        let reg = HandlerRegistry::builtin();
        let names: Vec<_> = reg.entries().iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["symlink", "path", "shell", "install", "homebrew"]);
        assert_eq!(reg.get("shell").map(|e| e.run_mode), Some(RunMode::Linking));
        assert_eq!(reg.get("homebrew").map(|e| e.run_mode), Some(RunMode::Provisioning));
        assert!(!reg.contains("nope"));
    }

    #[test]
    fn precedence_is_strictly_increasing() {
        let reg = HandlerRegistry::builtin();
        assert!(reg.entries().windows(2)
            .all(|w| matches!(w, [a, b] if a.precedence < b.precedence)));
    }

    #[test]
    fn created_handlers_report_their_name() {
        for entry in HandlerRegistry::builtin().entries() {
            let handler = entry.create();
            assert_eq!(handler.name(), entry.name);
            assert_eq!(handler.run_mode(), entry.run_mode);
        }
    }

    #[test]
    fn global_is_builtin() {
        assert!(global().contains("path"));
    }
}
