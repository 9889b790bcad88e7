//! Package link parsing.
//!
//! A package link is a shareable URL whose query and fragment carry the
//! thread id, the package code and the key code:
//!
//! ```text
//! https://secure.example.com/receive/?thread=AB12-CD34&packageCode=xyz#keyCode=def
//! ```
//!
//! The key code lives in the fragment so it never reaches the server in a
//! browser; here it is only ever used locally (checksum and passphrase).

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::retrieval::RetrievalError;

/// Pattern for the three link components, in this order.
///
/// Every component, the package code included, may contain `-` as well as
/// word characters. Package codes issued by the service are URL-safe base64
/// and can carry a dash.
const TRIPLE_PATTERN: &str = r"thread=([\w-]+)&packageCode=([\w-]+)#keyCode=([\w-]+)";

/// Pattern for candidate links inside free text.
const URL_PATTERN: &str = r#"https://[^\s"'<>()\[\]]+"#;

/// Path segment that marks a package receive URL.
const RECEIVE_MARKER: &str = "/receive";

fn triple_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TRIPLE_PATTERN).expect("link pattern is valid"))
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(URL_PATTERN).expect("url pattern is valid"))
}

/// The identifiers carried by a package link.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PackageLink {
    thread_id: String,
    package_code: String,
    key_code: String,
}

impl PackageLink {
    /// Extract the triple from a link.
    ///
    /// The first match wins; anything around it is ignored.
    pub fn parse(link: &str) -> Result<Self, RetrievalError> {
        let caps = triple_regex()
            .captures(link)
            .ok_or_else(|| RetrievalError::LinkParse {
                link: redact(link),
            })?;

        Ok(Self {
            thread_id: caps[1].to_string(),
            package_code: caps[2].to_string(),
            key_code: caps[3].to_string(),
        })
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn package_code(&self) -> &str {
        &self.package_code
    }

    /// The client secret. Never log this.
    pub fn key_code(&self) -> &str {
        &self.key_code
    }
}

impl FromStr for PackageLink {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for PackageLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageLink")
            .field("thread_id", &self.thread_id)
            .field("package_code", &self.package_code)
            .field("key_code", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for PackageLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.thread_id, self.package_code)
    }
}

/// Strip the fragment (which holds the key code) from a link for messages.
fn redact(link: &str) -> String {
    match link.find('#') {
        Some(idx) => format!("{}#…", &link[..idx]),
        None => link.to_string(),
    }
}

/// Find every distinct package link in a block of text.
///
/// Only `https` URLs pointing at a receive page and carrying a complete
/// triple are returned, in first-seen order.
pub fn extract_links(text: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for m in url_regex().find_iter(text) {
        let candidate = m.as_str().trim_end_matches(['.', ',', ';', ':']);
        if !candidate.contains(RECEIVE_MARKER) || !triple_regex().is_match(candidate) {
            continue;
        }
        if !links.iter().any(|l| l == candidate) {
            links.push(candidate.to_string());
        }
    }
    links
}
