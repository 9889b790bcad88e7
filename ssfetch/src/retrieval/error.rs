//! Error types for package retrieval.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Errors that can occur while retrieving a package.
///
/// Link, metadata and manifest errors abort the whole package. Segment and
/// missing-part errors abort one file. Download, decryption and expiry
/// errors are recorded per part.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The link does not carry `thread`, `packageCode` and `keyCode`.
    #[error("invalid package link {link}: expected thread=<id>&packageCode=<code>#keyCode=<code>")]
    LinkParse { link: String },

    /// The metadata request failed or was rejected.
    #[error("failed to fetch package {thread_id}{}: {body}", fmt_status(.status))]
    MetadataFetch {
        thread_id: String,
        status: Option<u16>,
        body: String,
    },

    /// The metadata response could not be parsed into a manifest.
    #[error("failed to parse package {thread_id} manifest: {reason}")]
    ManifestParse { thread_id: String, reason: String },

    /// Download URLs for a window of parts could not be obtained.
    #[error("failed to fetch download URLs for file {file_id} parts {start}-{end}{}: {reason}", fmt_status(.status))]
    SegmentFetch {
        file_id: String,
        start: u32,
        end: u32,
        status: Option<u16>,
        reason: String,
    },

    /// A part download returned a non-200 status or failed in transport.
    #[error("failed to download file {file_id} part {part}{}: {reason}", fmt_status(.status))]
    PartDownload {
        file_id: String,
        part: u32,
        status: Option<u16>,
        reason: String,
    },

    /// The download URL for a part outlived its validity window.
    #[error("download URL for file {file_id} part {part} expired before use")]
    SegmentExpired { file_id: String, part: u32 },

    /// Decryption exited non-zero, could not start, or timed out.
    #[error("failed to decrypt file {file_id} part {part}{}: {reason}", fmt_exit(.exit_code))]
    Decryption {
        file_id: String,
        part: u32,
        exit_code: Option<i32>,
        reason: String,
        stdout: String,
        stderr: String,
    },

    /// Decrypted parts are missing at assembly time.
    #[error("cannot assemble file {file_id}: missing decrypted parts {missing:?} of {parts}")]
    MissingParts {
        file_id: String,
        parts: u32,
        missing: Vec<u32>,
    },

    /// The manifest file name has no usable final component.
    #[error("invalid output file name {0:?}")]
    InvalidFileName(String),

    /// Local filesystem failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

fn fmt_exit(exit_code: &Option<i32>) -> String {
    exit_code
        .map(|c| format!(" (exit code {})", c))
        .unwrap_or_default()
}

impl RetrievalError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that abort the whole package.
    pub fn is_package_fatal(&self) -> bool {
        matches!(
            self,
            Self::LinkParse { .. } | Self::MetadataFetch { .. } | Self::ManifestParse { .. }
        )
    }
}
