//! `fsa config`: inspect and create configuration files.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use fsa_config::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config file locations
    Path,

    /// Write a default config file
    Init {
        /// Write the global file instead of the project file
        #[arg(long)]
        global: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(command: &ConfigCommands, explicit: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = match explicit {
                Some(path) => Config::load_from(path)?,
                None => Config::load()?,
            };
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(path) => println!("Global:  {} {}", path.display(), presence(&path)),
                None => println!("Global:  (no home directory)"),
            }
            let project = Config::project_config_path();
            println!("Project: {} {}", project.display(), presence(&project));
            if let Some(path) = explicit {
                println!("Explicit: {} {}", path.display(), presence(path));
            }
            Ok(())
        }
        ConfigCommands::Init { global, force } => {
            let path = if *global {
                Config::global_config_path().context("No home directory for global config")?
            } else {
                Config::project_config_path()
            };
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, Config::default_toml()?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn presence(path: &Path) -> &'static str {
    if path.exists() {
        "(exists)"
    } else {
        "(not found)"
    }
}
