//! Command handlers, one module per subcommand group.

pub mod config_cmd;
pub mod door;
pub mod run;

use std::path::PathBuf;

use clap::CommandFactory;

use garagelink_config::{Config, config_path, load_config};
use garagelink_core::DoorState;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

/// Load the config named by `--config`, or the platform default.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(load_config(global.config.as_deref())?)
}

pub fn effective_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Dispatch a parsed command.
pub async fn dispatch(cmd: Command, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    match cmd {
        // Config and completions never touch a device.
        Command::Config(args) => config_cmd::handle(&args, global, color),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "garagelink", &mut std::io::stdout());
            Ok(())
        }

        Command::Run => run::handle(&load(global)?, &effective_path(global), color).await,
        Command::Status(args) => door::status(args, &load(global)?, color).await,
        Command::Open(args) => door::move_door(args, DoorState::Open, &load(global)?, color).await,
        Command::Close(args) => {
            door::move_door(args, DoorState::Closed, &load(global)?, color).await
        }
    }
}
