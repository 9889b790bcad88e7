//! Run reports and progress events.
//!
//! A [`PackageReport`] is what [`retrieve`](super::PackageRetriever::retrieve)
//! hands back once every file has been attempted. [`RetrievalEvent`]s are
//! emitted while the run is in flight, from worker threads, for callers that
//! want live progress.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::RetrievalError;
use crate::api::FileEntry;
use crate::link::PackageLink;

/// Progress callback for package retrieval.
///
/// Invoked from pool threads, so it must be `Send + Sync`.
pub type ProgressCallback = Arc<dyn Fn(&RetrievalEvent<'_>) + Send + Sync>;

/// A notable step of a retrieval run.
#[derive(Debug, Clone, Copy)]
pub enum RetrievalEvent<'a> {
    /// The manifest was fetched.
    PackageStarted { link: &'a PackageLink, files: usize },
    /// Work on a file is beginning.
    FileStarted { file: &'a FileEntry },
    /// A part is ready for assembly.
    PartCompleted { file_id: &'a str, part: PartOutcome },
    /// A part could not be downloaded or decrypted.
    PartFailed {
        file_id: &'a str,
        part: u32,
        error: &'a RetrievalError,
    },
    /// The file was written to its final location.
    FileAssembled { file: &'a FileEntry, path: &'a Path },
    /// The file could not be produced.
    FileFailed {
        file: &'a FileEntry,
        error: &'a RetrievalError,
    },
}

/// What happened to a part that made it to a decrypted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartOutcome {
    pub part: u32,
    /// Bytes fetched, `None` if the staged blob was reused.
    pub downloaded: Option<u64>,
    /// Whether decryption ran during this run.
    pub decrypted: bool,
}

/// A part that failed, with the reason.
#[derive(Debug)]
pub struct PartFailure {
    pub part: u32,
    pub error: RetrievalError,
}

/// Per-part counters for one file.
#[derive(Debug, Default)]
pub struct PartTally {
    pub downloaded: u32,
    pub skipped: u32,
    pub decrypted: u32,
    pub bytes_downloaded: u64,
    pub failures: Vec<PartFailure>,
}

impl PartTally {
    pub fn record_success(&mut self, outcome: &PartOutcome) {
        match outcome.downloaded {
            Some(bytes) => {
                self.downloaded += 1;
                self.bytes_downloaded += bytes;
            }
            None => self.skipped += 1,
        }
        if outcome.decrypted {
            self.decrypted += 1;
        }
    }

    pub fn record_failure(&mut self, part: u32, error: RetrievalError) {
        self.failures.push(PartFailure { part, error });
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Failed part numbers in ascending order.
    pub fn failed_parts(&self) -> Vec<u32> {
        let mut parts: Vec<u32> = self.failures.iter().map(|f| f.part).collect();
        parts.sort_unstable();
        parts.dedup();
        parts
    }
}

/// Final state of a file.
#[derive(Debug)]
pub enum FileOutcome {
    Assembled(PathBuf),
    Failed(RetrievalError),
}

/// Result of retrieving one file of a package.
#[derive(Debug)]
pub struct FileReport {
    pub file_id: String,
    pub file_name: String,
    pub parts: u32,
    pub tally: PartTally,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn new(file: &FileEntry, tally: PartTally, outcome: FileOutcome) -> Self {
        Self {
            file_id: file.file_id.clone(),
            file_name: file.file_name.clone(),
            parts: file.parts,
            tally,
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FileOutcome::Assembled(_))
    }

    pub fn assembled_path(&self) -> Option<&Path> {
        match &self.outcome {
            FileOutcome::Assembled(path) => Some(path),
            FileOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&RetrievalError> {
        match &self.outcome {
            FileOutcome::Assembled(_) => None,
            FileOutcome::Failed(e) => Some(e),
        }
    }
}

/// Result of retrieving a whole package.
#[derive(Debug)]
pub struct PackageReport {
    /// `thread/package` identifier of the link.
    pub package: String,
    pub files: Vec<FileReport>,
}

impl PackageReport {
    /// True when every file was assembled. An empty package counts.
    pub fn is_success(&self) -> bool {
        self.files.iter().all(FileReport::is_success)
    }

    pub fn assembled(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().filter_map(FileReport::assembled_path)
    }

    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|f| !f.is_success()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> FileEntry {
        FileEntry {
            file_id: "f".to_string(),
            file_name: "out.bin".to_string(),
            parts: 3,
        }
    }

    #[test]
    fn test_tally_counts() {
        let mut tally = PartTally::default();
        tally.record_success(&PartOutcome {
            part: 1,
            downloaded: Some(100),
            decrypted: true,
        });
        tally.record_success(&PartOutcome {
            part: 2,
            downloaded: None,
            decrypted: true,
        });
        tally.record_success(&PartOutcome {
            part: 3,
            downloaded: None,
            decrypted: false,
        });

        assert_eq!(tally.downloaded, 1);
        assert_eq!(tally.skipped, 2);
        assert_eq!(tally.decrypted, 2);
        assert_eq!(tally.bytes_downloaded, 100);
        assert!(!tally.has_failures());
    }

    #[test]
    fn test_failed_parts_sorted() {
        let mut tally = PartTally::default();
        for part in [7, 2, 7] {
            tally.record_failure(
                part,
                RetrievalError::SegmentExpired {
                    file_id: "f".to_string(),
                    part,
                },
            );
        }
        assert_eq!(tally.failed_parts(), vec![2, 7]);
    }

    #[test]
    fn test_package_report_success() {
        let ok = FileReport::new(
            &entry(),
            PartTally::default(),
            FileOutcome::Assembled(PathBuf::from("out.bin")),
        );
        let failed = FileReport::new(
            &entry(),
            PartTally::default(),
            FileOutcome::Failed(RetrievalError::InvalidFileName("..".to_string())),
        );

        assert!(ok.is_success());
        assert_eq!(ok.assembled_path(), Some(Path::new("out.bin")));
        assert!(failed.error().is_some());

        let report = PackageReport {
            package: "t/p".to_string(),
            files: vec![ok, failed],
        };
        assert!(!report.is_success());
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.assembled().count(), 1);

        let empty = PackageReport {
            package: "t/p".to_string(),
            files: Vec::new(),
        };
        assert!(empty.is_success());
    }
}
