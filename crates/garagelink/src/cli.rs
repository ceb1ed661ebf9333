//! Clap derive structures for the `garagelink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// garagelink -- bridge networked garage-door controllers to a smart-home hub
#[derive(Debug, Parser)]
#[command(
    name = "garagelink",
    version,
    about = "Bridge networked garage-door controllers to a smart-home hub",
    long_about = "Keeps a persistent link to each configured garage-door controller,\n\
        reconciles what the device reports with what the hub requested, and\n\
        issues open/close commands on demand.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "GARAGELINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bridge every configured accessory until interrupted
    Run,

    /// Show the current and target state of one door
    #[command(alias = "st")]
    Status(DoorArgs),

    /// Request the door to open
    Open(MoveArgs),

    /// Request the door to close
    Close(MoveArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct DoorArgs {
    /// Accessory name from the config
    pub name: String,

    /// Seconds to wait for the device to report its state
    #[arg(long, default_value = "10")]
    pub timeout: u64,
}

#[derive(Debug, Args)]
pub struct MoveArgs {
    #[command(flatten)]
    pub door: DoorArgs,

    /// Wait until the door reports it has finished moving
    #[arg(long, short = 'w')]
    pub wait: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Validate every accessory entry
    Check,

    /// Print the effective config with secrets masked
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
