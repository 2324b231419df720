//! Global tracing subscriber: styled console output plus a plain-text log
//! file that always records debug detail.
use std::fs;
use std::io::Write as _;
use std::sync::Mutex;

use tracing::field::{Field, Visit};

use super::types::LogKind;
use super::utils::{cache_dir, log_file_path, strip_ansi, utc_now};

/// The `message` field of an event.
fn event_message(event: &tracing::Event<'_>) -> String {
    struct Message(String);

    impl Visit for Message {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "message" {
                value.clone_into(&mut self.0);
            }
        }

        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    let mut message = Message(String::new());
    event.record(&mut message);
    message.0
}

fn event_kind(event: &tracing::Event<'_>) -> LogKind {
    let meta = event.metadata();
    LogKind::classify(*meta.level(), meta.target())
}

/// Line written to the log file.
fn file_line(kind: LogKind, time: &str, msg: &str) -> String {
    let tag = match kind {
        LogKind::Stage => return format!("[{time}] ==> {msg}"),
        LogKind::Info => return format!("[{time}]     {msg}"),
        LogKind::Debug => "debug",
        LogKind::Warn => "warn",
        LogKind::Error => "error",
        LogKind::DryRun => "dry run",
    };
    format!("[{time}]     [{tag}] {msg}")
}

/// Line written to the console.
fn console_line(kind: LogKind, msg: &str) -> String {
    match kind {
        LogKind::Stage => format!("\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m"),
        LogKind::Info => format!("  {msg}"),
        LogKind::Debug => format!("  \x1b[2m{msg}\x1b[0m"),
        LogKind::Warn => format!("\x1b[33mwarning:\x1b[0m {msg}"),
        LogKind::Error => format!("\x1b[31merror:\x1b[0m {msg}"),
        LogKind::DryRun => format!("  \x1b[33m[DRY RUN]\x1b[0m {msg}"),
    }
}

/// Layer appending every event to `<cache>/dodot/<command>.log`.
#[derive(Debug)]
pub(super) struct LogFile {
    file: Mutex<fs::File>,
}

impl LogFile {
    /// Truncate the command's log file and write a run header.
    ///
    /// `None` when the cache directory or the file is unavailable; logging
    /// then continues on the console only.
    pub(super) fn open(command: &str) -> Option<Self> {
        fs::create_dir_all(cache_dir()?).ok()?;
        let path = log_file_path(command)?;
        let version =
            option_env!("DODOT_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let mut file = fs::File::create(&path).ok()?;
        writeln!(
            file,
            "# dodot {version} {command} started {} UTC",
            utc_now("%Y-%m-%d %H:%M:%S")
        )
        .ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for LogFile {
    fn on_event(&self, event: &tracing::Event<'_>, _: tracing_subscriber::layer::Context<'_, S>) {
        let line = file_line(
            event_kind(event),
            &utc_now("%H:%M:%S"),
            &strip_ansi(&event_message(event)),
        );
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        writeln!(file, "{line}").ok();
    }
}

/// Console event format.
struct Console;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for Console
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        writeln!(
            writer,
            "{}",
            console_line(event_kind(event), &event_message(event))
        )
    }
}

/// Install the global subscriber. Call once, before anything logs.
///
/// Warnings and errors go to stderr, everything else to stdout. The console
/// shows `info` and above (`debug` with `verbose`, or whatever `RUST_LOG`
/// asks for); the log file always receives `debug` and above.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt};

    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .or_else(std::io::stdout);
    let console = fmt::layer()
        .event_format(Console)
        .with_writer(writer)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        );
    let file = LogFile::open(command).map(|layer| layer.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry().with(console).with(file).init();
}
