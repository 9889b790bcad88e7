//! SendSafely REST API access.
//!
//! This module provides everything needed to talk to the secure-transfer
//! service:
//! - Request signing with HMAC-SHA256 (`signer`)
//! - Package checksum derivation with PBKDF2 (`checksum`)
//! - Typed request/response records and segment paging (`types`)
//! - The HTTP transport seam (`transport`)
//! - The API client itself (`client`)
//!
//! # Architecture
//!
//! ```text
//! ApiClient
//!     │
//!     ├── RequestSigner (every call)
//!     ├── derive_checksum (download-urls calls)
//!     └── HttpTransport (trait)
//!             └── ReqwestTransport
//! ```

mod checksum;
mod client;
pub mod signer;
pub(crate) mod transport;
mod types;

pub use checksum::{derive_checksum, CHECKSUM_ITERATIONS, CHECKSUM_LENGTH};
pub use client::{download_urls_path, package_path, ApiClient, Credentials, API_PREFIX};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError,
    DEFAULT_TIMEOUT_SECS,
};
pub use types::{
    FileEntry, PackageManifest, SegmentBatch, SegmentRequest, SegmentUrl, SegmentWindows,
    MAX_SEGMENT_WINDOW, SEGMENT_URL_VALIDITY,
};
