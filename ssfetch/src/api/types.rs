//! Typed records for API payloads.
//!
//! Wire structs mirror the JSON exactly and are validated into the domain
//! types ([`PackageManifest`], [`FileEntry`], [`SegmentBatch`]) at the parse
//! boundary. Unknown JSON fields are ignored; missing or invalid ones are
//! errors.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Maximum number of download URLs the server issues per request.
pub const MAX_SEGMENT_WINDOW: u32 = 25;

/// How long a download URL stays valid after issuance.
pub const SEGMENT_URL_VALIDITY: Duration = Duration::from_secs(60 * 60);

/// Value of the `response` field on success.
pub const RESPONSE_SUCCESS: &str = "SUCCESS";

/// One file of a package.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileEntry {
    #[serde(rename = "fileId")]
    pub file_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    /// Number of encrypted parts, always at least 1.
    pub parts: u32,
}

/// Package information returned by the metadata endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct PackageManifest {
    #[serde(rename = "serverSecret")]
    pub server_secret: String,
    pub files: Vec<FileEntry>,
}

impl fmt::Debug for PackageManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageManifest")
            .field("server_secret", &"<redacted>")
            .field("files", &self.files)
            .finish()
    }
}

/// Raw metadata response. `response` is optional on this endpoint.
#[derive(Deserialize)]
struct ManifestEnvelope {
    response: Option<String>,
    message: Option<String>,
    #[serde(flatten)]
    manifest: PackageManifest,
}

impl PackageManifest {
    /// Parse and validate a metadata response body.
    ///
    /// Returns a human-readable reason on failure.
    pub fn from_json(body: &[u8]) -> Result<Self, String> {
        let envelope: ManifestEnvelope =
            serde_json::from_slice(body).map_err(|e| e.to_string())?;

        if let Some(response) = envelope.response {
            if response != RESPONSE_SUCCESS {
                return Err(format!(
                    "server responded {}: {}",
                    response,
                    envelope.message.unwrap_or_default()
                ));
            }
        }

        let manifest = envelope.manifest;
        if manifest.server_secret.is_empty() {
            return Err("serverSecret is empty".to_string());
        }
        if let Some(file) = manifest.files.iter().find(|f| f.parts == 0) {
            return Err(format!("file {} declares zero parts", file.file_id));
        }
        if let Some(file) = manifest.files.iter().find(|f| !is_safe_file_id(&f.file_id)) {
            return Err(format!(
                "file {:?} has an unusable fileId {:?}",
                file.file_name, file.file_id
            ));
        }

        Ok(manifest)
    }
}

/// File ids name staged artifacts, so they must be a single path component.
fn is_safe_file_id(file_id: &str) -> bool {
    !file_id.is_empty()
        && file_id != "."
        && file_id != ".."
        && !file_id.contains(['/', '\\', '\0'])
}

/// Request body for the download-urls endpoint.
///
/// Field order is the serialization order; the serialized string is signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentRequest<'a> {
    pub checksum: &'a str,
    #[serde(rename = "startSegment")]
    pub start_segment: u32,
    #[serde(rename = "endSegment")]
    pub end_segment: u32,
}

#[derive(Deserialize)]
struct SegmentResponse {
    response: String,
    message: Option<String>,
    #[serde(rename = "downloadUrls", default)]
    download_urls: Vec<SegmentUrl>,
}

/// A signed, time-limited URL for one part.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SegmentUrl {
    pub part: u32,
    pub url: String,
}

impl fmt::Debug for SegmentUrl {
    // The URL embeds an access token.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentUrl")
            .field("part", &self.part)
            .finish_non_exhaustive()
    }
}

/// A page of download URLs for one file.
#[derive(Debug, Clone)]
pub struct SegmentBatch {
    pub file_id: String,
    pub start: u32,
    pub end: u32,
    pub urls: Vec<SegmentUrl>,
    issued_at: Instant,
}

impl SegmentBatch {
    pub fn new(file_id: impl Into<String>, start: u32, end: u32, urls: Vec<SegmentUrl>) -> Self {
        Self {
            file_id: file_id.into(),
            start,
            end,
            urls,
            issued_at: Instant::now(),
        }
    }

    /// Parse and validate a download-urls response body.
    pub fn from_json(file_id: &str, start: u32, end: u32, body: &[u8]) -> Result<Self, String> {
        let response: SegmentResponse =
            serde_json::from_slice(body).map_err(|e| e.to_string())?;

        if response.response != RESPONSE_SUCCESS {
            return Err(format!(
                "server responded {}: {}",
                response.response,
                response.message.unwrap_or_default()
            ));
        }

        if let Some(url) = response
            .download_urls
            .iter()
            .find(|u| u.part < start || u.part > end)
        {
            return Err(format!(
                "part {} outside requested window {}-{}",
                url.part, start, end
            ));
        }

        let mut seen = HashSet::new();
        if let Some(url) = response.download_urls.iter().find(|u| !seen.insert(u.part)) {
            return Err(format!("part {} listed more than once", url.part));
        }

        Ok(Self::new(file_id, start, end, response.download_urls))
    }

    /// Time at which the URLs stop being valid.
    pub fn expires_at(&self) -> Instant {
        self.issued_at + SEGMENT_URL_VALIDITY
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at()
    }

    /// Pretend the batch was issued `age` ago.
    #[cfg(test)]
    pub(crate) fn backdated(mut self, age: Duration) -> Self {
        if let Some(issued_at) = self.issued_at.checked_sub(age) {
            self.issued_at = issued_at;
        }
        self
    }
}

/// Inclusive part windows covering `1..=parts`, at most 25 parts each.
#[derive(Debug, Clone)]
pub struct SegmentWindows {
    next: u32,
    parts: u32,
    size: u32,
}

impl SegmentWindows {
    pub fn new(parts: u32) -> Self {
        Self::with_size(parts, MAX_SEGMENT_WINDOW)
    }

    /// Windows of `size` parts; the size is clamped to `1..=25`.
    pub fn with_size(parts: u32, size: u32) -> Self {
        Self {
            next: 1,
            parts,
            size: size.clamp(1, MAX_SEGMENT_WINDOW),
        }
    }
}

impl Iterator for SegmentWindows {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.parts {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.size - 1).min(self.parts);
        self.next = end.saturating_add(1);
        if end == u32::MAX {
            // Stop after the final window instead of wrapping.
            self.parts = 0;
        }
        Some((start, end))
    }
}
