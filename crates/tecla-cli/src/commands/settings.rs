//! Settings file tools.

use anyhow::Context;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use tecla_config::{Settings, validate};

#[derive(Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    command: SettingsCommand,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print a settings file (or the defaults) as TOML
    Show {
        /// Settings file; defaults are printed when omitted
        path: Option<PathBuf>,
    },

    /// Write a default settings file
    Init {
        /// Destination path
        path: PathBuf,
    },

    /// Validate a settings file and report every clamp it needed
    Check {
        /// Settings file to check
        path: PathBuf,
    },
}

pub fn run(args: SettingsArgs) -> anyhow::Result<()> {
    match args.command {
        SettingsCommand::Show { path } => {
            let settings = match path {
                Some(path) => Settings::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => Settings::default(),
            };
            print!("{}", settings.to_toml()?);
        }
        SettingsCommand::Init { path } => {
            Settings::default().save(&path)?;
            println!("wrote {}", path.display());
        }
        SettingsCommand::Check { path } => {
            let mut settings =
                Settings::load(&path).with_context(|| format!("loading {}", path.display()))?;
            let adjustments = validate(&mut settings)?;
            if adjustments.is_empty() {
                println!("{}: ok", path.display());
            } else {
                println!("{}: {} adjustment(s)", path.display(), adjustments.len());
                for adjustment in adjustments {
                    println!("  {}: {}", adjustment.field, adjustment.message);
                }
            }
        }
    }
    Ok(())
}
