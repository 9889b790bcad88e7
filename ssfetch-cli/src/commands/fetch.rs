//! `fetch` command: download, decrypt and reassemble packages.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use console::style;
use ssfetch::api::{ApiClient, ReqwestTransport};
use ssfetch::config::ConfigFile;
use ssfetch::retrieval::FileOutcome;
use ssfetch::{extract_links, PackageReport, PackageRetriever, RetrievalError};
use tracing::info;

use super::links::read_text;
use crate::error::CliError;
use crate::progress::ProgressReporter;

/// Arguments for `ssfetch fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Package links
    pub links: Vec<String>,

    /// Also fetch every link found in this text file ('-' for stdin)
    #[arg(long, value_name = "FILE")]
    pub from_file: Option<PathBuf>,

    /// Download and decrypt again even if staged parts exist
    #[arg(short, long)]
    pub force: bool,

    /// Parts processed concurrently (overrides config)
    #[arg(short = 'j', long)]
    pub parallel: Option<usize>,

    /// Staging directory for encrypted and decrypted parts (overrides config)
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Directory for assembled files (overrides config)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

/// Links from the arguments followed by those found in `--from-file`,
/// duplicates removed.
fn collect_links(args: &FetchArgs) -> Result<Vec<String>, CliError> {
    let mut links = args.links.clone();
    if let Some(path) = &args.from_file {
        links.extend(extract_links(&read_text(path)?));
    }
    let mut seen = HashSet::new();
    links.retain(|link| seen.insert(link.clone()));
    if links.is_empty() {
        return Err(CliError::NoLinks);
    }
    Ok(links)
}

/// Apply command-line overrides on top of the configuration file.
fn apply_overrides(args: &FetchArgs, config: &ConfigFile) -> ConfigFile {
    let mut config = config.clone();
    if let Some(parallel) = args.parallel {
        config = config.with_parallel(parallel);
    }
    if let Some(dir) = &args.staging_dir {
        config = config.with_staging_dir(dir);
    }
    if let Some(dir) = &args.output_dir {
        config = config.with_output_dir(dir);
    }
    config
}

/// Run the fetch command.
pub fn run(args: FetchArgs, config: &ConfigFile) -> Result<(), CliError> {
    let links = collect_links(&args)?;
    let config = apply_overrides(&args, config);
    let (url, credentials) = config.sendsafely.require()?;

    let transport = Arc::new(ReqwestTransport::with_timeout(config.download.timeout)?);
    let client = ApiClient::new(url, credentials, transport);
    let options = config.retrieval_options().with_force(args.force);

    info!(
        packages = links.len(),
        parallel = options.parallel_downloads,
        force = options.force,
        "Starting retrieval"
    );

    let reporter = ProgressReporter::new();
    let retriever = PackageRetriever::new(client, Arc::new(config.decryptor()), options)
        .with_progress(reporter.callback());

    let results = retriever.retrieve_all(&links);
    println!();

    let mut failed = 0;
    for (index, result) in results.iter().enumerate() {
        if !print_result(index + 1, result) {
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(CliError::PackagesFailed {
            failed,
            total: results.len(),
        });
    }
    Ok(())
}

/// Print one package result. Returns whether it fully succeeded.
///
/// Packages are named by `thread/package`, never by the full link, so the
/// key code stays out of the terminal scrollback.
fn print_result(number: usize, result: &Result<PackageReport, RetrievalError>) -> bool {
    match result {
        Ok(report) => {
            let label = if report.is_success() {
                style("ok").green().bold()
            } else {
                style("incomplete").yellow().bold()
            };
            println!("Package {} ({}): {}", number, report.package, label);
            if report.files.is_empty() {
                println!("  (no files)");
            }
            for file in &report.files {
                match &file.outcome {
                    FileOutcome::Assembled(path) => println!(
                        "  {} {} -> {} ({} downloaded, {} reused)",
                        style("✓").green(),
                        file.file_name,
                        path.display(),
                        file.tally.downloaded,
                        file.tally.skipped
                    ),
                    FileOutcome::Failed(e) => {
                        println!("  {} {}: {}", style("✗").red(), file.file_name, e)
                    }
                }
            }
            report.is_success()
        }
        Err(e) => {
            println!("Package {}: {} {}", number, style("failed").red().bold(), e);
            false
        }
    }
}
