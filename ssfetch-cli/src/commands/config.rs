//! Configuration CLI commands.

use std::path::Path;

use clap::Subcommand;
use ssfetch::config::config_file_path;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, explicit: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(explicit),
    }
}

/// Show the configuration file path.
fn run_path(explicit: Option<&Path>) -> Result<(), CliError> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);
    println!("{}", path.display());
    if !path.is_file() {
        eprintln!("(file does not exist yet)");
    }
    Ok(())
}
