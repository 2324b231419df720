//! External command execution behind a mockable trait.
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{DodotError, Result};

/// Poll interval while waiting on a child with a deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output readers may lag behind the child's exit.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// A fully described command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Kill the process if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Command with arguments and nothing else.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Render as a shell-like command line for messages.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// `true` if the process exited with status zero.
    pub success: bool,
    /// Exit code, absent when killed by a signal.
    pub code: Option<i32>,
}

impl ExecResult {
    /// Convert a non-zero exit into an execution error.
    ///
    /// # Errors
    ///
    /// Returns [`DodotError::Execution`] when `success` is false.
    pub fn check(self, spec: &CommandSpec) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(DodotError::Execution {
                command: spec.display(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external commands on behalf of provisioning handlers.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit is reported through [`ExecResult::success`], not as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the process cannot be launched or
    /// exceeds its timeout.
    fn run(&self, spec: &CommandSpec) -> Result<ExecResult>;

    /// Check if a program is available on PATH.
    fn which(&self, program: &str) -> bool;
}

/// Production implementation backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

fn launch_error(spec: &CommandSpec, message: impl Into<String>) -> DodotError {
    DodotError::Execution {
        command: spec.display(),
        code: None,
        stderr: message.into(),
    }
}

/// Output of one pipe, filled by a background reader.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl Drain {
    fn spawn<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&buf);
        std::thread::spawn(move || {
            if let Some(mut pipe) = pipe {
                let mut chunk = [0u8; 4096];
                while let Ok(n @ 1..) = pipe.read(&mut chunk) {
                    sink.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(chunk.get(..n).unwrap_or_default());
                }
            }
            let _ = tx.send(());
        });
        Self { buf, done }
    }

    /// Output read so far, waiting until `until` for end of file.
    ///
    /// A background process that inherited the pipe keeps the reader
    /// blocked past the child's exit; that reader is left behind and ends
    /// when the process closes its end.
    fn collect(&self, until: Instant) -> String {
        let _ = self
            .done
            .recv_timeout(until.saturating_duration_since(Instant::now()));
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ExecResult> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| launch_error(spec, format!("failed to execute: {e}")))?;
        // Drain both pipes concurrently so a chatty child never blocks on a
        // full pipe while we wait on it.
        let stdout = Drain::spawn(child.stdout.take());
        let stderr = Drain::spawn(child.stderr.take());

        let status = match spec.timeout {
            None => child
                .wait()
                .map_err(|e| launch_error(spec, format!("failed to wait: {e}")))?,
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    match child.try_wait() {
                        Ok(Some(status)) => break status,
                        Ok(None) if Instant::now() >= deadline => {
                            let _ = child.kill();
                            let _ = child.wait();
                            let output = stderr.collect(Instant::now() + DRAIN_GRACE);
                            let mut message = format!("timed out after {}s", limit.as_secs());
                            if !output.trim().is_empty() {
                                message = format!("{message}: {}", output.trim());
                            }
                            return Err(launch_error(spec, message));
                        }
                        Ok(None) => std::thread::sleep(POLL_INTERVAL),
                        Err(e) => return Err(launch_error(spec, format!("failed to wait: {e}"))),
                    }
                }
            }
        };

        let until = Instant::now() + DRAIN_GRACE;
        Ok(ExecResult {
            stdout: stdout.collect(until),
            stderr: stderr.collect(until),
            success: status.success(),
            code: status.code(),
        })
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
