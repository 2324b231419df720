//! Command: print the shell init script or its location.
use super::Session;
use crate::cli::ShellInitOpts;
use crate::shell_init;

/// Print the script, or with `--path` where `link` writes it.
#[allow(clippy::print_stdout)]
pub fn run(session: &Session, opts: &ShellInitOpts) {
    let paths = session.paths();
    if opts.path {
        println!("{}", paths.init_script().display());
    } else {
        print!("{}", shell_init::render(paths.data_dir()));
    }
}
