//! Config subcommand handlers.

use std::path::Path;

use garagelink_config::{Config, redacted_toml, resolve_accessories};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", super::effective_path(global).display());
            Ok(())
        }

        ConfigCommand::Check => {
            let cfg = super::load(global)?;
            check(&cfg, &super::effective_path(global), color)
        }

        ConfigCommand::Show => {
            let cfg = super::load(global)?;
            print!("{}", redacted_toml(&cfg)?);
            Ok(())
        }
    }
}

fn check(cfg: &Config, path: &Path, color: bool) -> Result<(), CliError> {
    if cfg.accessories.is_empty() {
        return Err(CliError::NoAccessories {
            path: path.display().to_string(),
        });
    }

    let mut failed = 0;
    for (index, (entry, result)) in cfg
        .accessories
        .iter()
        .zip(resolve_accessories(cfg))
        .enumerate()
    {
        let label = entry.label(index);
        match result {
            Ok(device) => println!(
                "{}",
                output::check_line(true, &label, &device.address, color)
            ),
            Err(e) => {
                failed += 1;
                println!("{}", output::check_line(false, &label, &e.to_string(), color));
            }
        }
    }

    if failed > 0 {
        return Err(CliError::InvalidEntries { count: failed });
    }
    Ok(())
}
