//! Command: print version information.

/// The build version: `DODOT_VERSION` when set at build time, otherwise the
/// crate version.
#[must_use]
pub fn version() -> &'static str {
    option_env!("DODOT_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the dodot version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("dodot {}", version());
}
