//! `dodot` command-line entry point.
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use dodot::cli::{Cli, Command};
use dodot::commands::{self, Session};
use dodot::logging::{self, Log as _, Logger};
use dodot::pipeline::CancelToken;
use dodot::types::CommandIntent;

fn run(args: &Cli, log: &Arc<Logger>, cancel: CancelToken) -> Result<()> {
    let global = &args.global;
    match &args.command {
        Command::Version => {
            commands::version::run();
            return Ok(());
        }
        Command::Completions(opts) => {
            commands::completions::run(opts);
            return Ok(());
        }
        _ => {}
    }

    let session = Session::init(global, Arc::clone(log), cancel)?;
    match &args.command {
        Command::Link(packs) => {
            commands::deploy::run(&session, global, CommandIntent::Link, packs, false)
        }
        Command::Provision(opts) => commands::deploy::run(
            &session,
            global,
            CommandIntent::Provision,
            &opts.packs,
            opts.force,
        ),
        Command::Deploy(opts) => {
            commands::deploy::run(&session, global, CommandIntent::All, &opts.packs, opts.force)
        }
        Command::Unlink(packs) => {
            commands::deploy::run(&session, global, CommandIntent::Unlink, packs, false)
        }
        Command::Deprovision(packs) => {
            commands::deploy::run(&session, global, CommandIntent::Deprovision, packs, false)
        }
        Command::Status(packs) => commands::status::run(&session, global, packs),
        Command::List => commands::list::run(&session, global),
        Command::ShellInit(opts) => {
            commands::shell_init::run(&session, opts);
            Ok(())
        }
        Command::Completions(_) | Command::Version => Ok(()),
    }
}

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    let command = args.command.name();
    logging::init_subscriber(args.verbose, command);
    let log = Arc::new(Logger::new(command));

    let cancel = CancelToken::new();
    let token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        log.debug(&format!("cannot install interrupt handler: {e}"));
    }

    match run(&args, &log, cancel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log.error(&format!("{err:#}"));
            ExitCode::from(commands::exit_code(&err))
        }
    }
}
