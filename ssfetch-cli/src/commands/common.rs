//! Helpers shared across CLI commands.

use std::path::Path;

use ssfetch::config::ConfigFile;
use ssfetch::logging::{self, WorkerGuard};
use tracing::debug;

use crate::error::CliError;

/// Load the configuration from `path`, or from the search path if none was
/// given.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Install logging according to the verbosity flag and the config file.
///
/// Keep the returned guard alive until exit so the log file is flushed.
pub fn init_logging(
    verbose: bool,
    config: &ConfigFile,
) -> Result<Option<WorkerGuard>, CliError> {
    let guard = logging::init(verbose, config.logging.file.as_deref())?;
    if let Some(ref file) = config.logging.file {
        debug!(path = %file.display(), "Logging to file");
    }
    Ok(guard)
}
