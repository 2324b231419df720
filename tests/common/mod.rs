// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed dotfiles root, data directory, and
// home directory plus a fluent builder, so each integration test can set up
// an isolated environment without repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dodot::context::ExecutionContext;
use dodot::datastore::DataStore;
use dodot::error::{DodotError, Result};
use dodot::exec::{CommandRunner, CommandSpec, ExecResult};
use dodot::fs::SystemFs;
use dodot::handlers::registry;
use dodot::logging::Logger;
use dodot::paths::Paths;
use dodot::pipeline::{Options, Pipeline};
use dodot::types::CommandIntent;

/// Command runner that records invocations and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
}

impl RecordingRunner {
    /// Rendered command lines, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ExecResult> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(spec.display());
        Ok(ExecResult {
            success: true,
            code: Some(0),
            ..ExecResult::default()
        })
    }

    fn which(&self, _program: &str) -> bool {
        true
    }
}

/// An isolated dotfiles root, data directory, and home directory backed by
/// a single [`tempfile::TempDir`].
pub struct TestEnv {
    tmp: tempfile::TempDir,
    runner: Arc<dyn CommandRunner>,
}

impl TestEnv {
    /// Dotfiles root.
    pub fn root(&self) -> PathBuf {
        self.tmp.path().join("dotfiles")
    }

    /// Data directory.
    pub fn data(&self) -> PathBuf {
        self.tmp.path().join("data")
    }

    /// Home directory.
    pub fn home(&self) -> PathBuf {
        self.tmp.path().join("home")
    }

    /// Resolved paths for this environment.
    pub fn paths(&self) -> Paths {
        Paths::new(self.root(), self.data(), self.home())
    }

    /// A pipeline over the real filesystem.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.store(),
            registry::global().clone(),
            Arc::clone(&self.runner),
            Arc::new(Logger::new("test")),
        )
    }

    /// Run `intent` over all packs.
    pub fn run(&self, intent: CommandIntent) -> Result<ExecutionContext> {
        self.pipeline().run(&Options::new(intent))
    }

    /// Run `intent` over the named packs.
    pub fn run_packs(
        &self,
        intent: CommandIntent,
        packs: &[&str],
    ) -> Result<ExecutionContext> {
        let mut opts = Options::new(intent);
        opts.packs = packs.iter().map(ToString::to_string).collect();
        self.pipeline().run(&opts)
    }

    /// Write a file below the dotfiles root.
    pub fn write(&self, relative: &str, content: &str) {
        write_file(&self.root().join(relative), content);
    }

    /// Store over this environment's paths.
    pub fn store(&self) -> DataStore {
        DataStore::new(Arc::new(SystemFs), self.paths())
    }
}

/// Target of the symlink at `path`.
pub fn link_target(path: &Path) -> PathBuf {
    std::fs::read_link(path).expect("read link")
}

/// Every entry under `dir` as `relative path -> description`, with symlinks
/// described by their target and files by their content.
pub fn tree(dir: &Path) -> BTreeMap<PathBuf, String> {
    let mut out = BTreeMap::new();
    walk(dir, dir, &mut out);
    out
}

/// The execution context carried by a failed or cancelled run.
#[allow(clippy::panic)]
pub fn context_of(err: DodotError) -> ExecutionContext {
    match err {
        DodotError::ActionsFailed { context, .. } | DodotError::Cancelled { context } => *context,
        other => panic!("unexpected error: {other}"),
    }
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content).expect("write file");
}

fn walk(base: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let rel = path.strip_prefix(base).unwrap_or(&path).to_path_buf();
        let meta = std::fs::symlink_metadata(&path).expect("lstat");
        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&path).expect("read link");
            out.insert(rel, format!("-> {}", target.display()));
        } else if meta.is_dir() {
            out.insert(rel, "dir".to_string());
            walk(base, &path, out);
        } else {
            let content = std::fs::read(&path).expect("read file");
            out.insert(rel, String::from_utf8_lossy(&content).into_owned());
        }
    }
}

/// Fluent builder for [`TestEnv`].
pub struct TestEnvBuilder {
    env: TestEnv,
}

impl Default for TestEnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnvBuilder {
    /// Begin with empty dotfiles root and home directories, and a runner
    /// that records commands without running them.
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("create temp dir");
        let env = TestEnv {
            tmp,
            runner: Arc::new(RecordingRunner::default()),
        };
        std::fs::create_dir_all(env.root()).expect("create dotfiles root");
        std::fs::create_dir_all(env.home()).expect("create home");
        Self { env }
    }

    /// Add a pack file (`pack/relative/path`) with `content`.
    pub fn with_file(self, relative: &str, content: &str) -> Self {
        self.env.write(relative, content);
        self
    }

    /// Write `<pack>/.dodot.toml`.
    pub fn with_pack_config(self, pack: &str, content: &str) -> Self {
        self.env.write(&format!("{pack}/.dodot.toml"), content);
        self
    }

    /// Add a file to the home directory.
    pub fn with_home_file(self, relative: &str, content: &str) -> Self {
        write_file(&self.env.home().join(relative), content);
        self
    }

    /// Use `runner` for provisioning commands.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.env.runner = runner;
        self
    }

    /// Finish building and return the environment.
    pub fn build(self) -> TestEnv {
        self.env
    }
}
