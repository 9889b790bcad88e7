//! CLI error type.

use std::fmt;
use std::io;
use std::path::PathBuf;

use ssfetch::api::TransportError;
use ssfetch::config::ConfigError;
use ssfetch::logging::LoggingError;
use ssfetch::RetrievalError;

/// Errors surfaced to the user by the CLI.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or incomplete configuration.
    Config(String),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// The HTTP client could not be created.
    Transport(TransportError),
    /// A package could not be retrieved at all.
    Retrieval(RetrievalError),
    /// An input file could not be read.
    ReadInput { path: PathBuf, source: io::Error },
    /// No package links were given or found.
    NoLinks,
    /// Some packages or files failed; details were already reported.
    PackagesFailed { failed: usize, total: usize },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Transport(e) => write!(f, "HTTP client error: {}", e),
            CliError::Retrieval(e) => write!(f, "{}", e),
            CliError::ReadInput { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            CliError::NoLinks => write!(
                f,
                "No package links given. Pass links as arguments or use --from-file"
            ),
            CliError::PackagesFailed { failed, total } => {
                write!(f, "{} of {} package(s) did not complete", failed, total)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Transport(e) => Some(e),
            CliError::Retrieval(e) => Some(e),
            CliError::ReadInput { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<TransportError> for CliError {
    fn from(e: TransportError) -> Self {
        CliError::Transport(e)
    }
}

impl From<RetrievalError> for CliError {
    fn from(e: RetrievalError) -> Self {
        CliError::Retrieval(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_conversion() {
        let err: CliError = ConfigError::Missing {
            section: "sendsafely",
            key: "url",
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Configuration error: missing required setting sendsafely.url"
        );
    }

    #[test]
    fn test_packages_failed_display() {
        let err = CliError::PackagesFailed {
            failed: 1,
            total: 3,
        };
        assert_eq!(err.to_string(), "1 of 3 package(s) did not complete");
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;

        let err = CliError::ReadInput {
            path: PathBuf::from("comments.txt"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
        assert!(CliError::NoLinks.source().is_none());
    }
}
