//! Command-line definitions (clap derive).
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Top-level CLI entry point for the dodot deployment engine.
#[derive(Parser, Debug)]
#[command(
    name = "dodot",
    about = "Pack-based dotfiles deployment engine",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Override the dotfiles root directory
    #[arg(long, global = true, value_name = "DIR")]
    pub dotfiles_root: Option<PathBuf>,

    /// Preview changes without applying
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Create links in the home directory (false stages links in the data dir only)
    #[arg(
        long,
        global = true,
        default_value_t = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = clap::ArgAction::Set,
        value_name = "BOOL"
    )]
    pub enable_home_symlinks: bool,

    /// Process packs in parallel
    #[arg(long, global = true)]
    pub parallel: bool,

    /// Deadline in seconds for each provisioning command
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Pack selection shared by the pipeline subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct PackArgs {
    /// Packs to process (default: all)
    #[arg(value_name = "PACK")]
    pub packs: Vec<String>,
}

/// Pack selection plus `--force`.
#[derive(Args, Debug, Clone, Default)]
pub struct ProvisionArgs {
    /// Packs to process.
    #[command(flatten)]
    pub packs: PackArgs,

    /// Re-run provisioning even when its input is unchanged
    #[arg(short, long)]
    pub force: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Link packs into the home directory
    Link(PackArgs),
    /// Run provisioning scripts and bundles
    Provision(ProvisionArgs),
    /// Link and provision
    Deploy(ProvisionArgs),
    /// Remove links created by `link`
    Unlink(PackArgs),
    /// Forget provisioning records so the next run repeats them
    Deprovision(PackArgs),
    /// Show the deployment status of each pack
    Status(PackArgs),
    /// List discovered packs
    List,
    /// Print the shell init script
    ShellInit(ShellInitOpts),
    /// Generate shell completions
    Completions(CompletionsOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Link(_) => "link",
            Self::Provision(_) => "provision",
            Self::Deploy(_) => "deploy",
            Self::Unlink(_) => "unlink",
            Self::Deprovision(_) => "deprovision",
            Self::Status(_) => "status",
            Self::List => "list",
            Self::ShellInit(_) => "shell-init",
            Self::Completions(_) => "completions",
            Self::Version => "version",
        }
    }
}

/// Options for the `shell-init` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ShellInitOpts {
    /// Print the path of the generated script instead of its contents
    #[arg(long)]
    pub path: bool,
}

/// Options for the `completions` subcommand.
#[derive(Args, Debug, Clone)]
pub struct CompletionsOpts {
    /// Target shell
    pub shell: Shell,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_link_with_packs() {
        let cli = Cli::parse_from(["dodot", "link", "vim", "zsh"]);
        assert!(matches!(
            &cli.command,
            Command::Link(PackArgs { packs }) if packs == &["vim", "zsh"]
        ));
    }

    #[test]
    fn parse_provision_force() {
        let cli = Cli::parse_from(["dodot", "provision", "--force", "dev"]);
        assert!(matches!(
            &cli.command,
            Command::Provision(ProvisionArgs { force: true, .. })
        ));
    }

    #[test]
    fn parse_deploy_short_force() {
        let cli = Cli::parse_from(["dodot", "deploy", "-f"]);
        assert!(matches!(
            &cli.command,
            Command::Deploy(ProvisionArgs { force: true, .. })
        ));
    }

    #[test]
    fn parse_dry_run() {
        let cli = Cli::parse_from(["dodot", "--dry-run", "link"]);
        assert!(cli.global.dry_run);
        let cli = Cli::parse_from(["dodot", "unlink", "-n"]);
        assert!(cli.global.dry_run);
    }

    #[test]
    fn home_symlinks_enabled_by_default() {
        let cli = Cli::parse_from(["dodot", "link"]);
        assert!(cli.global.enable_home_symlinks);
    }

    #[test]
    fn home_symlinks_accept_explicit_value() {
        let cli = Cli::parse_from(["dodot", "--enable-home-symlinks=false", "link"]);
        assert!(!cli.global.enable_home_symlinks);
        let cli = Cli::parse_from(["dodot", "--enable-home-symlinks", "link", "vim"]);
        assert!(cli.global.enable_home_symlinks);
        assert!(matches!(&cli.command, Command::Link(PackArgs { packs }) if packs == &["vim"]));
    }

    #[test]
    fn parse_root_override() {
        let cli = Cli::parse_from(["dodot", "--dotfiles-root", "/tmp/dots", "status"]);
        assert_eq!(cli.global.dotfiles_root, Some(PathBuf::from("/tmp/dots")));
    }

    #[test]
    fn parse_parallel_and_timeout() {
        let cli = Cli::parse_from(["dodot", "--parallel", "--timeout", "30", "provision"]);
        assert!(cli.global.parallel);
        assert_eq!(cli.global.timeout, Some(30));
    }

    #[test]
    fn parse_shell_init_path() {
        let cli = Cli::parse_from(["dodot", "shell-init", "--path"]);
        assert!(matches!(cli.command, Command::ShellInit(ShellInitOpts { path: true })));
    }

    #[test]
    fn parse_completions() {
        let cli = Cli::parse_from(["dodot", "completions", "zsh"]);
        assert!(matches!(
            cli.command,
            Command::Completions(CompletionsOpts { shell: Shell::Zsh })
        ));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::parse_from(["dodot", "-v", "list"]);
        assert!(cli.verbose);
        assert_eq!(cli.command.name(), "list");
    }
}
