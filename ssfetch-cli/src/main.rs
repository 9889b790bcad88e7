//! ssfetch CLI - Command-line interface
//!
//! Fetches SendSafely packages referenced by ticket links: downloads the
//! encrypted parts, decrypts them with gpg and reassembles the files.

mod commands;
mod error;
mod progress;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use console::style;

use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "ssfetch", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: ./ssfetch.ini, then ~/.support/ssfetch.ini)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download, decrypt and reassemble packages
    Fetch(FetchArgs),

    /// Print the package links found in a text file
    Links {
        /// Text file to scan, or '-' for stdin
        file: PathBuf,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Fetch(args) => {
            let config = commands::common::load_config(cli.config.as_deref())?;
            let _guard = commands::common::init_logging(cli.verbose, &config)?;
            commands::fetch::run(args, &config)
        }
        Commands::Links { file } => {
            ssfetch::logging::init(cli.verbose, None)?;
            commands::links::run(&file)
        }
        Commands::Config { command } => commands::config::run(command, cli.config.as_deref()),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from([
            "ssfetch",
            "fetch",
            "--force",
            "--parallel",
            "8",
            "-v",
            "https://x/receive/?thread=a&packageCode=b#keyCode=c",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Fetch(args) => {
                assert!(args.force);
                assert_eq!(args.parallel, Some(8));
                assert_eq!(args.links.len(), 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_path_with_global_config() {
        let cli = Cli::try_parse_from(["ssfetch", "config", "path", "--config", "/etc/ss.ini"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/ss.ini")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Path
            }
        ));
    }

    #[test]
    fn test_links_requires_file() {
        assert!(Cli::try_parse_from(["ssfetch", "links"]).is_err());
    }
}
