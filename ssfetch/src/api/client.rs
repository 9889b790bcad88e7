//! SendSafely REST API client.
//!
//! [`ApiClient`] is constructed explicitly from a base URL, credentials and a
//! transport, and passed by reference to whatever needs it. It implements
//! the two calls the retrieval pipeline makes: package metadata and segment
//! download URLs.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::checksum::derive_checksum;
use super::signer::RequestSigner;
use super::transport::{HttpRequest, HttpTransport};
use super::types::{PackageManifest, SegmentBatch, SegmentRequest, MAX_SEGMENT_WINDOW};
use crate::link::PackageLink;
use crate::retrieval::{RetrievalError, RetrievalResult};

/// API version prefix shared by every endpoint.
pub const API_PREFIX: &str = "/api/v2.0";

/// Path of the package metadata endpoint.
pub fn package_path(thread_id: &str) -> String {
    format!("{}/package/{}", API_PREFIX, thread_id)
}

/// Path of the segment download-urls endpoint.
pub fn download_urls_path(thread_id: &str, file_id: &str) -> String {
    format!(
        "{}/package/{}/file/{}/download-urls/",
        API_PREFIX, thread_id, file_id
    )
}

/// API key pair used to sign requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key_id: String,
    pub key_secret: String,
}

impl Credentials {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

/// Client for the package endpoints.
pub struct ApiClient {
    base_url: String,
    signer: RequestSigner,
    transport: Arc<dyn HttpTransport>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Service root, e.g. `https://secure.example.com`
    /// * `credentials` - API key pair
    /// * `transport` - HTTP transport shared with the part downloader
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            signer: RequestSigner::new(credentials.key_id, credentials.key_secret),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The transport this client sends through.
    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch the package manifest for a link.
    ///
    /// Issues one signed GET; never retries.
    pub fn fetch_manifest(&self, link: &PackageLink) -> RetrievalResult<PackageManifest> {
        let path = package_path(link.thread_id());
        let url = self.url_for(&path);
        let headers = self.signer.sign_request(&path, "");

        let mut request = HttpRequest::get(&url);
        for (name, value) in headers.pairs() {
            request = request.with_header(name, value);
        }

        debug!(thread = link.thread_id(), "Fetching package information");
        let response = self
            .transport
            .execute(&request)
            .map_err(|e| RetrievalError::MetadataFetch {
                thread_id: link.thread_id().to_string(),
                status: None,
                body: e.to_string(),
            })?;

        if !response.is_success() {
            warn!(
                thread = link.thread_id(),
                status = response.status,
                "Package information request rejected"
            );
            return Err(RetrievalError::MetadataFetch {
                thread_id: link.thread_id().to_string(),
                status: Some(response.status),
                body: response.text(),
            });
        }

        PackageManifest::from_json(&response.body).map_err(|reason| {
            RetrievalError::ManifestParse {
                thread_id: link.thread_id().to_string(),
                reason,
            }
        })
    }

    /// Fetch download URLs for parts `start..=end` of a file.
    ///
    /// The request body is serialized once; that exact string is signed and
    /// sent.
    pub fn fetch_segment(
        &self,
        link: &PackageLink,
        file_id: &str,
        start: u32,
        end: u32,
    ) -> RetrievalResult<SegmentBatch> {
        let segment_error = |reason: String| RetrievalError::SegmentFetch {
            file_id: file_id.to_string(),
            start,
            end,
            status: None,
            reason,
        };

        if start == 0 || end < start || end - start + 1 > MAX_SEGMENT_WINDOW {
            return Err(segment_error(format!(
                "invalid window, at most {} parts starting from 1",
                MAX_SEGMENT_WINDOW
            )));
        }

        let checksum = derive_checksum(link.key_code(), link.package_code());
        let body = serde_json::to_string(&SegmentRequest {
            checksum: &checksum,
            start_segment: start,
            end_segment: end,
        })
        .map_err(|e| segment_error(e.to_string()))?;

        let path = download_urls_path(link.thread_id(), file_id);
        let headers = self.signer.sign_request(&path, &body);

        let mut request =
            HttpRequest::post(self.url_for(&path), body).with_header("Content-Type", "application/json");
        for (name, value) in headers.pairs() {
            request = request.with_header(name, value);
        }

        debug!(file_id, start, end, "Requesting download URLs");
        let response = self
            .transport
            .execute(&request)
            .map_err(|e| segment_error(e.to_string()))?;

        if !response.is_success() {
            return Err(RetrievalError::SegmentFetch {
                file_id: file_id.to_string(),
                start,
                end,
                status: Some(response.status),
                reason: response.text(),
            });
        }

        let batch = SegmentBatch::from_json(file_id, start, end, &response.body)
            .map_err(segment_error)?;
        debug!(file_id, start, end, urls = batch.urls.len(), "Received download URLs");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::signer::{
        canonical_string, sign, HEADER_API_KEY, HEADER_SIGNATURE, HEADER_TIMESTAMP,
    };
    use crate::api::transport::tests::MockTransport;
    use crate::api::transport::{Method, TransportError};

    const BASE: &str = "https://secure.example.com";
    const LINK: &str = "https://secure.example.com/receive/?thread=abc&packageCode=xyz#keyCode=def";

    fn client(mock: &Arc<MockTransport>) -> ApiClient {
        ApiClient::new(
            format!("{}/", BASE),
            Credentials::new("KEYID", "KEYSECRET"),
            Arc::clone(mock) as Arc<dyn HttpTransport>,
        )
    }

    fn link() -> PackageLink {
        PackageLink::parse(LINK).unwrap()
    }

    #[test]
    fn test_paths() {
        assert_eq!(package_path("t"), "/api/v2.0/package/t");
        assert_eq!(
            download_urls_path("t", "f"),
            "/api/v2.0/package/t/file/f/download-urls/"
        );
    }

    #[test]
    fn test_fetch_manifest_signed_get() {
        let mock = Arc::new(MockTransport::default());
        let url = format!("{}/api/v2.0/package/abc", BASE);
        mock.respond(
            &url,
            200,
            r#"{"serverSecret":"SS","files":[{"fileId":"f","fileName":"a.txt","parts":1}]}"#,
        );

        let manifest = client(&mock).fetch_manifest(&link()).unwrap();
        assert_eq!(manifest.server_secret, "SS");

        let requests = mock.requests_to(&url);
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.body, None);
        assert_eq!(request.header(HEADER_API_KEY), Some("KEYID"));

        let timestamp = request.header(HEADER_TIMESTAMP).unwrap();
        assert!(timestamp.ends_with("+0000"));
        let expected = sign(
            "KEYSECRET",
            &canonical_string("KEYID", "/api/v2.0/package/abc", timestamp, ""),
        );
        assert_eq!(request.header(HEADER_SIGNATURE), Some(expected.as_str()));
    }

    #[test]
    fn test_fetch_manifest_http_error() {
        let mock = Arc::new(MockTransport::default());
        mock.respond(&format!("{}/api/v2.0/package/abc", BASE), 403, "forbidden");

        let err = client(&mock).fetch_manifest(&link()).unwrap_err();
        match err {
            RetrievalError::MetadataFetch { status, body, .. } => {
                assert_eq!(status, Some(403));
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fetch_manifest_transport_error() {
        let mock = Arc::new(MockTransport::default());
        let url = format!("{}/api/v2.0/package/abc", BASE);
        mock.fail(
            &url,
            TransportError::Timeout {
                url: url.clone(),
                timeout_secs: 5,
            },
        );

        let err = client(&mock).fetch_manifest(&link()).unwrap_err();
        assert!(matches!(err, RetrievalError::MetadataFetch { status: None, .. }));
    }

    #[test]
    fn test_fetch_manifest_malformed_json() {
        let mock = Arc::new(MockTransport::default());
        mock.respond(&format!("{}/api/v2.0/package/abc", BASE), 200, "{oops");

        let err = client(&mock).fetch_manifest(&link()).unwrap_err();
        assert!(matches!(err, RetrievalError::ManifestParse { .. }));
    }

    #[test]
    fn test_fetch_segment_signs_exact_body() {
        let mock = Arc::new(MockTransport::default());
        let url = format!("{}/api/v2.0/package/abc/file/f-1/download-urls/", BASE);
        mock.respond(
            &url,
            200,
            r#"{"response":"SUCCESS","downloadUrls":[{"part":26,"url":"https://s3/26"}]}"#,
        );

        let batch = client(&mock).fetch_segment(&link(), "f-1", 26, 40).unwrap();
        assert_eq!(batch.urls.len(), 1);

        let request = &mock.requests_to(&url)[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.header("Content-Type"), Some("application/json"));

        let body = request.body.clone().unwrap();
        let checksum = derive_checksum("def", "xyz");
        assert_eq!(
            body,
            format!(
                r#"{{"checksum":"{}","startSegment":26,"endSegment":40}}"#,
                checksum
            )
        );

        let timestamp = request.header(HEADER_TIMESTAMP).unwrap();
        let expected = sign(
            "KEYSECRET",
            &canonical_string(
                "KEYID",
                "/api/v2.0/package/abc/file/f-1/download-urls/",
                timestamp,
                &body,
            ),
        );
        assert_eq!(request.header(HEADER_SIGNATURE), Some(expected.as_str()));
    }

    #[test]
    fn test_fetch_segment_rejects_oversized_window() {
        let mock = Arc::new(MockTransport::default());
        let api = client(&mock);

        for (start, end) in [(1, 26), (0, 10), (10, 9)] {
            let err = api.fetch_segment(&link(), "f", start, end).unwrap_err();
            assert!(matches!(err, RetrievalError::SegmentFetch { .. }));
        }
        assert!(mock.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fetch_segment_failure_response() {
        let mock = Arc::new(MockTransport::default());
        let url = format!("{}/api/v2.0/package/abc/file/f/download-urls/", BASE);
        mock.respond(&url, 200, r#"{"response":"FAIL","message":"expired"}"#);

        let err = client(&mock).fetch_segment(&link(), "f", 1, 25).unwrap_err();
        match err {
            RetrievalError::SegmentFetch {
                file_id,
                start,
                end,
                reason,
                ..
            } => {
                assert_eq!(file_id, "f");
                assert_eq!((start, end), (1, 25));
                assert!(reason.contains("expired"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_debug_hides_secret() {
        let mock = Arc::new(MockTransport::default());
        assert!(!format!("{:?}", client(&mock)).contains("KEYSECRET"));
        assert!(!format!("{:?}", Credentials::new("a", "KEYSECRET")).contains("KEYSECRET"));
    }
}
