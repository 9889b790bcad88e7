//! Staging directory layout and state queries.
//!
//! Encrypted parts are stored as `<dir>/<file_id>-<part>` and their
//! decrypted siblings as `<dir>/<file_id>-<part>.decrypted`. The directory
//! is the only record of progress, which makes repeated runs resumable.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::{RetrievalError, RetrievalResult};

/// Suffix of decrypted part artifacts.
pub const DECRYPTED_SUFFIX: &str = "decrypted";

/// Default staging directory name, relative to the working directory.
pub const DEFAULT_STAGING_DIR: &str = "parts";

/// How far a part has progressed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartState {
    /// Nothing staged.
    Absent,
    /// Encrypted blob present, no decrypted artifact.
    Encrypted,
    /// Decrypted artifact present.
    Decrypted,
}

/// The staging directory for one or more packages.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if it does not exist.
    pub fn ensure(&self) -> RetrievalResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| RetrievalError::io(&self.dir, e))
    }

    /// Base name shared by a part's staged and decrypted artifacts.
    pub fn part_name(file_id: &str, part: u32) -> String {
        format!("{}-{}", file_id, part)
    }

    /// Path of the encrypted blob.
    pub fn encrypted_path(&self, file_id: &str, part: u32) -> PathBuf {
        self.dir.join(Self::part_name(file_id, part))
    }

    /// Path of the decrypted artifact.
    pub fn decrypted_path(&self, file_id: &str, part: u32) -> PathBuf {
        self.dir.join(format!(
            "{}.{}",
            Self::part_name(file_id, part),
            DECRYPTED_SUFFIX
        ))
    }

    /// Scratch path a decryption writes to before it is renamed onto
    /// [`decrypted_path`](Self::decrypted_path).
    pub fn partial_decrypted_path(&self, file_id: &str, part: u32) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.partial",
            Self::part_name(file_id, part),
            DECRYPTED_SUFFIX
        ))
    }

    /// Current on-disk state of a part.
    ///
    /// A decrypted artifact counts even if the encrypted blob was removed.
    pub fn state(&self, file_id: &str, part: u32) -> PartState {
        if self.decrypted_path(file_id, part).is_file() {
            PartState::Decrypted
        } else if self.encrypted_path(file_id, part).is_file() {
            PartState::Encrypted
        } else {
            PartState::Absent
        }
    }

    /// Parts in `1..=parts` lacking a decrypted artifact.
    pub fn missing_decrypted(&self, file_id: &str, parts: u32) -> Vec<u32> {
        (1..=parts)
            .filter(|&n| !self.decrypted_path(file_id, n).is_file())
            .collect()
    }
}

impl Default for StagingArea {
    fn default() -> Self {
        Self::new(DEFAULT_STAGING_DIR)
    }
}
