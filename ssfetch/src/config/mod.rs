//! Configuration file handling.
//!
//! Settings live in an INI file, looked up in order:
//!
//! 1. `./ssfetch.ini`
//! 2. `~/.support/ssfetch.ini`
//!
//! ```ini
//! [sendsafely]
//! url = https://secure.example.com
//! key_id = ...
//! key_secret = ...
//!
//! [download]
//! parallel = 4
//! timeout = 300
//! staging_dir = parts
//! output_dir = .
//!
//! [decrypt]
//! program = gpg
//! timeout = 120
//!
//! [logging]
//! file = /var/log/ssfetch.log
//! ```
//!
//! Every setting is optional in the file; credentials are only checked when
//! a retrieval actually needs them.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{Credentials, DEFAULT_TIMEOUT_SECS};
use crate::retrieval::{
    GpgDecryptor, RetrievalOptions, DEFAULT_DECRYPT_PROGRAM, DEFAULT_DECRYPT_TIMEOUT_SECS,
    DEFAULT_PARALLEL_DOWNLOADS, DEFAULT_STAGING_DIR,
};

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "ssfetch.ini";

/// Directory under the home directory holding the user configuration.
pub const CONFIG_DIR_NAME: &str = ".support";

const SECTION_SENDSAFELY: &str = "sendsafely";
const SECTION_DOWNLOAD: &str = "download";
const SECTION_DECRYPT: &str = "decrypt";
const SECTION_LOGGING: &str = "logging";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("invalid value {value:?} for {section}.{key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("missing required setting {section}.{key}")]
    Missing {
        section: &'static str,
        key: &'static str,
    },
}

/// Candidate configuration paths, in lookup order.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    paths
}

/// The configuration file that [`ConfigFile::load`] reads.
///
/// Falls back to the user-level location when no file exists yet.
pub fn config_file_path() -> PathBuf {
    let paths = config_search_paths();
    paths
        .iter()
        .find(|p| p.is_file())
        .or_else(|| paths.last())
        .cloned()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// `[sendsafely]` section.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SendSafelyConfig {
    pub url: Option<String>,
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
}

impl fmt::Debug for SendSafelyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendSafelyConfig")
            .field("url", &self.url)
            .field("key_id", &self.key_id)
            .field("key_secret", &self.key_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl SendSafelyConfig {
    /// Service URL and API credentials, all three required.
    pub fn require(&self) -> Result<(&str, Credentials), ConfigError> {
        let url = required(&self.url, "url")?;
        let key_id = required(&self.key_id, "key_id")?;
        let key_secret = required(&self.key_secret, "key_secret")?;
        Ok((url, Credentials::new(key_id, key_secret)))
    }
}

fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, ConfigError> {
    value.as_deref().ok_or(ConfigError::Missing {
        section: SECTION_SENDSAFELY,
        key,
    })
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    pub parallel: usize,
    /// HTTP request timeout.
    pub timeout: Duration,
    pub staging_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            parallel: DEFAULT_PARALLEL_DOWNLOADS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            output_dir: PathBuf::from("."),
        }
    }
}

/// `[decrypt]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptConfig {
    pub program: PathBuf,
    pub timeout: Duration,
}

impl Default for DecryptConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_DECRYPT_PROGRAM),
            timeout: Duration::from_secs(DEFAULT_DECRYPT_TIMEOUT_SECS),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub file: Option<PathBuf>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub sendsafely: SendSafelyConfig,
    pub download: DownloadConfig,
    pub decrypt: DecryptConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Load from the first file on the search path, or defaults if none
    /// exists.
    pub fn load() -> Result<Self, ConfigError> {
        match config_search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) => ConfigError::Read {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(e) => ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;
        debug!(path = %path.display(), "Loaded configuration");
        Self::from_ini(&ini)
    }

    /// Parse configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let get = |section: &str, key: &str| -> Option<String> {
            ini.section(Some(section))
                .and_then(|s| s.get(key))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut config = Self::default();

        config.sendsafely.url = get(SECTION_SENDSAFELY, "url");
        config.sendsafely.key_id = get(SECTION_SENDSAFELY, "key_id");
        config.sendsafely.key_secret = get(SECTION_SENDSAFELY, "key_secret");

        // Older files kept the key pair outside any section.
        let general = ini.general_section();
        for (key, slot) in [
            ("key_id", &mut config.sendsafely.key_id),
            ("key_secret", &mut config.sendsafely.key_secret),
        ] {
            if let Some(value) = general.get(key).map(str::trim).filter(|v| !v.is_empty()) {
                warn!(
                    key,
                    "Top-level '{}' is deprecated, move it to the [sendsafely] section", key
                );
                if slot.is_none() {
                    *slot = Some(value.to_string());
                }
            }
        }

        if let Some(v) = get(SECTION_DOWNLOAD, "parallel") {
            config.download.parallel = parse_positive(SECTION_DOWNLOAD, "parallel", &v)? as usize;
        }
        if let Some(v) = get(SECTION_DOWNLOAD, "timeout") {
            config.download.timeout =
                Duration::from_secs(parse_positive(SECTION_DOWNLOAD, "timeout", &v)?);
        }
        if let Some(v) = get(SECTION_DOWNLOAD, "staging_dir") {
            config.download.staging_dir = expand_home(&v);
        }
        if let Some(v) = get(SECTION_DOWNLOAD, "output_dir") {
            config.download.output_dir = expand_home(&v);
        }

        if let Some(v) = get(SECTION_DECRYPT, "program") {
            config.decrypt.program = expand_home(&v);
        }
        if let Some(v) = get(SECTION_DECRYPT, "timeout") {
            config.decrypt.timeout =
                Duration::from_secs(parse_positive(SECTION_DECRYPT, "timeout", &v)?);
        }

        config.logging.file = get(SECTION_LOGGING, "file").map(|v| expand_home(&v));

        Ok(config)
    }

    /// Retrieval settings derived from the file.
    pub fn retrieval_options(&self) -> RetrievalOptions {
        RetrievalOptions::new()
            .with_parallel_downloads(self.download.parallel)
            .with_staging_dir(&self.download.staging_dir)
            .with_output_dir(&self.download.output_dir)
            .with_decrypt_timeout(self.decrypt.timeout)
    }

    /// Decryptor running the configured program.
    pub fn decryptor(&self) -> GpgDecryptor {
        GpgDecryptor::new(&self.decrypt.program)
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.download.parallel = parallel.max(1);
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download.staging_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download.output_dir = dir.into();
        self
    }

    pub fn with_log_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.logging.file = Some(file.into());
        self
    }
}

fn parse_positive(section: &'static str, key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::InvalidValue {
            section,
            key,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidValue {
            section,
            key,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(value),
    }
}
