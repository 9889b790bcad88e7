//! Encrypted part downloader.
//!
//! Download URLs are pre-signed by the storage backend, so part requests are
//! plain GETs without API headers. Each part is written to a temporary file
//! in the staging directory and renamed into place, so a staged part is
//! either complete or absent.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::error::{RetrievalError, RetrievalResult};
use super::staging::StagingArea;
use crate::api::{HttpRequest, HttpTransport, SegmentUrl};

/// Outcome of a part download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The part was fetched and staged.
    Downloaded { path: PathBuf, bytes: u64 },
    /// The part was already staged and force-overwrite was off.
    Skipped { path: PathBuf },
}

impl DownloadOutcome {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Downloaded { path, .. } | Self::Skipped { path } => path,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Downloads encrypted parts into a staging area.
pub struct PartDownloader {
    transport: Arc<dyn HttpTransport>,
    staging: StagingArea,
    force: bool,
}

impl PartDownloader {
    /// Create a downloader.
    ///
    /// # Arguments
    ///
    /// * `transport` - HTTP transport for the unauthenticated GETs
    /// * `staging` - Where encrypted parts are written
    /// * `force` - Re-download parts that are already staged
    pub fn new(transport: Arc<dyn HttpTransport>, staging: StagingArea, force: bool) -> Self {
        Self {
            transport,
            staging,
            force,
        }
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Download one part.
    ///
    /// Returns `Skipped` without any network I/O when the destination exists
    /// and force-overwrite is off.
    pub fn download(&self, file_id: &str, segment: &SegmentUrl) -> RetrievalResult<DownloadOutcome> {
        let part = segment.part;
        let dest = self.staging.encrypted_path(file_id, part);

        if dest.exists() {
            if !self.force {
                debug!(file_id, part, "Skipping part, already staged");
                return Ok(DownloadOutcome::Skipped { path: dest });
            }
            debug!(file_id, part, "Overwriting staged part");
        }

        self.staging.ensure()?;

        let response = self
            .transport
            .execute(&HttpRequest::get(&segment.url))
            .map_err(|e| RetrievalError::PartDownload {
                file_id: file_id.to_string(),
                part,
                status: None,
                reason: e.to_string(),
            })?;

        if response.status != 200 {
            warn!(file_id, part, status = response.status, "Part download rejected");
            return Err(RetrievalError::PartDownload {
                file_id: file_id.to_string(),
                part,
                status: Some(response.status),
                reason: format!("GET request failed with status {}", response.status),
            });
        }

        let mut temp = NamedTempFile::new_in(self.staging.dir())
            .map_err(|e| RetrievalError::io(self.staging.dir(), e))?;
        temp.write_all(&response.body)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| RetrievalError::io(temp.path(), e))?;
        temp.persist(&dest)
            .map_err(|e| RetrievalError::io(&dest, e.error))?;

        let bytes = response.body.len() as u64;
        debug!(file_id, part, bytes, "Part downloaded");
        Ok(DownloadOutcome::Downloaded { path: dest, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::tests::MockTransport;
    use crate::api::TransportError;
    use std::fs;
    use tempfile::TempDir;

    fn segment(part: u32) -> SegmentUrl {
        SegmentUrl {
            part,
            url: format!("https://storage.example.com/f/{}", part),
        }
    }

    fn downloader(mock: &Arc<MockTransport>, dir: &TempDir, force: bool) -> PartDownloader {
        PartDownloader::new(
            Arc::clone(mock) as Arc<dyn HttpTransport>,
            StagingArea::new(dir.path().join("parts")),
            force,
        )
    }

    #[test]
    fn test_download_writes_part() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockTransport::default());
        mock.respond("https://storage.example.com/f/1", 200, b"encrypted-1".to_vec());

        let outcome = downloader(&mock, &temp, false)
            .download("f", &segment(1))
            .unwrap();

        let expected = temp.path().join("parts/f-1");
        assert_eq!(
            outcome,
            DownloadOutcome::Downloaded {
                path: expected.clone(),
                bytes: 11
            }
        );
        assert_eq!(fs::read(expected).unwrap(), b"encrypted-1");
    }

    #[test]
    fn test_second_download_is_skipped_without_network() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockTransport::default());
        mock.respond("https://storage.example.com/f/1", 200, b"first".to_vec());
        mock.respond("https://storage.example.com/f/1", 200, b"second".to_vec());
        let downloader = downloader(&mock, &temp, false);

        downloader.download("f", &segment(1)).unwrap();
        let second = downloader.download("f", &segment(1)).unwrap();

        assert!(second.is_skipped());
        assert_eq!(mock.requests_to("https://storage.example.com/f/1").len(), 1);
        assert_eq!(fs::read(second.path()).unwrap(), b"first");
    }

    #[test]
    fn test_force_overwrites() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockTransport::default());
        mock.respond("https://storage.example.com/f/1", 200, b"fresh".to_vec());

        let staged = temp.path().join("parts/f-1");
        fs::create_dir_all(staged.parent().unwrap()).unwrap();
        fs::write(&staged, b"stale").unwrap();

        let outcome = downloader(&mock, &temp, true)
            .download("f", &segment(1))
            .unwrap();

        assert!(!outcome.is_skipped());
        assert_eq!(fs::read(staged).unwrap(), b"fresh");
    }

    #[test]
    fn test_non_200_is_reported_and_nothing_staged() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockTransport::default());
        mock.respond("https://storage.example.com/f/2", 403, b"AccessDenied".to_vec());

        let err = downloader(&mock, &temp, false)
            .download("f", &segment(2))
            .unwrap_err();

        match err {
            RetrievalError::PartDownload {
                file_id,
                part,
                status,
                ..
            } => {
                assert_eq!(file_id, "f");
                assert_eq!(part, 2);
                assert_eq!(status, Some(403));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!temp.path().join("parts/f-2").exists());
    }

    #[test]
    fn test_transport_failure() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockTransport::default());
        mock.fail(
            "https://storage.example.com/f/1",
            TransportError::Request {
                url: "https://storage.example.com/f/1".to_string(),
                reason: "connection reset".to_string(),
            },
        );

        let err = downloader(&mock, &temp, false)
            .download("f", &segment(1))
            .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::PartDownload { status: None, .. }
        ));
    }

    #[test]
    fn test_download_requests_are_unsigned() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockTransport::default());
        mock.respond("https://storage.example.com/f/1", 200, b"x".to_vec());

        downloader(&mock, &temp, false)
            .download("f", &segment(1))
            .unwrap();

        let request = &mock.requests_to("https://storage.example.com/f/1")[0];
        assert!(request.headers.is_empty());
    }
}
