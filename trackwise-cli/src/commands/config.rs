//! Configuration management CLI commands.
//!
//! Provides `config show`, `config check`, `config init`, and `config path`
//! for inspecting and creating the engine configuration file.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use trackwise::config::config_file_path;
use trackwise::EngineConfig;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as INI
    Show {
        /// Read this file instead of the default location
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Parse and validate a configuration file
    Check {
        /// Validate this file instead of the default location
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Write a configuration file with every default value
    Init {
        /// Write to this file instead of the default location
        #[arg(long)]
        file: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { file } => run_show(file.as_deref()),
        ConfigCommands::Check { file } => run_check(file.as_deref()),
        ConfigCommands::Init { file, force } => run_init(file.as_deref(), force),
        ConfigCommands::Path => run_path(),
    }
}

/// Load from `file`, or from the default location falling back to defaults.
pub fn load(file: Option<&Path>) -> Result<EngineConfig, CliError> {
    match file {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::load_or_default()?),
    }
}

fn resolve(file: Option<&Path>) -> Result<PathBuf, CliError> {
    match file {
        Some(path) => Ok(path.to_path_buf()),
        None => config_file_path().ok_or_else(|| {
            CliError::Config("No configuration directory on this platform; use --file".to_string())
        }),
    }
}

fn run_show(file: Option<&Path>) -> Result<(), CliError> {
    let config = load(file)?;
    print!("{}", config.to_ini_string());
    Ok(())
}

fn run_check(file: Option<&Path>) -> Result<(), CliError> {
    let path = resolve(file)?;
    if !path.exists() {
        return Err(CliError::Config(format!(
            "{} does not exist. Use 'trackwise config init' to create it.",
            path.display()
        )));
    }

    EngineConfig::load(&path)?;
    println!("{}: OK", path.display());
    Ok(())
}

fn run_init(file: Option<&Path>, force: bool) -> Result<(), CliError> {
    let path = resolve(file)?;
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        )));
    }

    EngineConfig::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    let path = resolve(None)?;
    println!("{}", path.display());
    Ok(())
}
