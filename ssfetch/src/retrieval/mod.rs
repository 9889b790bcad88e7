//! Package retrieval pipeline.
//!
//! Turns a package link into assembled plaintext files:
//!
//! 1. **Download** - fetch encrypted parts into the staging directory
//! 2. **Decrypt** - turn each part into a `.decrypted` sibling
//! 3. **Assemble** - concatenate decrypted parts in part order
//!
//! [`PackageRetriever`] drives the stages; the staging directory is the only
//! state kept between runs, so an interrupted run resumes where it stopped.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ssfetch::api::{ApiClient, Credentials, ReqwestTransport};
//! use ssfetch::retrieval::{GpgDecryptor, PackageRetriever, RetrievalOptions};
//!
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let client = ApiClient::new(url, Credentials::new(key_id, key_secret), transport);
//! let retriever = PackageRetriever::new(
//!     client,
//!     Arc::new(GpgDecryptor::default()),
//!     RetrievalOptions::default(),
//! );
//! let report = retriever.retrieve(link)?;
//! ```

mod assemble;
mod decrypt;
mod download;
mod error;
mod orchestrator;
mod report;
mod staging;

pub use assemble::FileAssembler;
pub use decrypt::{
    CipherAlgorithm, CompressionAlgorithm, DecryptFailure, DecryptOptions, GpgDecryptor,
    HashAlgorithm, LiteralMode, PartDecryptor, Passphrase, DEFAULT_DECRYPT_PROGRAM,
    DEFAULT_DECRYPT_TIMEOUT_SECS, DEFAULT_S2K_COUNT,
};
pub use download::{DownloadOutcome, PartDownloader};
pub use error::{RetrievalError, RetrievalResult};
pub use orchestrator::{PackageRetriever, RetrievalOptions, DEFAULT_PARALLEL_DOWNLOADS};
pub use report::{
    FileOutcome, FileReport, PackageReport, PartFailure, PartOutcome, PartTally,
    ProgressCallback, RetrievalEvent,
};
pub use staging::{PartState, StagingArea, DECRYPTED_SUFFIX, DEFAULT_STAGING_DIR};
