//! ssfetch - Secure package retrieval for support engineers
//!
//! This library downloads encrypted file packages shared through the
//! SendSafely secure-transfer service, decrypts their parts and reassembles
//! the original files.
//!
//! - [`link`] parses package links and finds them in ticket comment text
//! - [`api`] signs and sends the REST calls
//! - [`retrieval`] downloads, decrypts and assembles
//! - [`config`] and [`logging`] provide the ambient setup for binaries

pub mod api;
pub mod config;
pub mod link;
pub mod logging;
pub mod retrieval;

pub use link::{extract_links, PackageLink};
pub use retrieval::{PackageReport, PackageRetriever, RetrievalError, RetrievalOptions};

/// Library version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
