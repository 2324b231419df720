//! Pack-based dotfiles deployment engine.
//!
//! A dotfiles root holds one directory per *pack*. Rules route each pack
//! entry to a handler: linking handlers (symlink, path, shell) maintain
//! two-hop links through the data directory and may run any number of
//! times; provisioning handlers (install, homebrew) run a command once per
//! input checksum and record a sentinel.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]** and **[`rules`]**: parse `.dodot.toml` and map entries to handlers
//! - **[`datastore`]**: owns the data directory (links, sentinels, status)
//! - **[`handlers`]**: turn matches into actions, report status, clear state
//! - **[`executor`]** and **[`pipeline`]**: plan and run actions, collect an [`context::ExecutionContext`]
//! - **[`commands`]**: top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod datastore;
pub mod error;
pub mod exec;
pub mod executor;
pub mod fs;
pub mod handlers;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod rules;
pub mod shell_init;
pub mod types;
