//! Trackwise CLI - Command-line interface
//!
//! Inspects engine configuration and replays recorded scenarios through the
//! tracking engine.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use trackwise::logging::{self, LoggingConfig};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "trackwise", version, about = "Adaptive location tracking engine")]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write a daily log file to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// View and create configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Replay a scenario file through the engine
    Simulate(SimulateArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging_config = LoggingConfig {
        directory: cli.log_dir.clone(),
        ..LoggingConfig::default()
    };
    if cli.verbose {
        logging_config.filter = "trackwise=debug".to_string();
    }
    // Dropping the guard flushes the file writer
    let _guard = match logging::init(&logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging unavailable: {}", e);
            None
        }
    };

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Config(command) => commands::config::run(command),
        Commands::Simulate(args) => commands::simulate::run(args),
    }
}
