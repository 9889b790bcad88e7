//! Request signing for the SendSafely REST API.
//!
//! Every API call carries three headers: the API key id, a UTC timestamp and
//! an HMAC-SHA256 signature over `key_id ‖ path ‖ timestamp ‖ body`. The
//! server recomputes the signature, so the timestamp and body must be the
//! exact strings that are sent.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the API key id.
pub const HEADER_API_KEY: &str = "ss-api-key";
/// Header carrying the request timestamp.
pub const HEADER_TIMESTAMP: &str = "ss-request-timestamp";
/// Header carrying the request signature.
pub const HEADER_SIGNATURE: &str = "ss-request-signature";

/// Timestamp layout expected by the server. The offset is always `+0000`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+0000";

type HmacSha256 = Hmac<Sha256>;

/// Format an instant the way the server expects it.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Build the canonical string a signature is computed over.
pub fn canonical_string(key_id: &str, path: &str, timestamp: &str, body: &str) -> String {
    let mut canonical =
        String::with_capacity(key_id.len() + path.len() + timestamp.len() + body.len());
    canonical.push_str(key_id);
    canonical.push_str(path);
    canonical.push_str(timestamp);
    canonical.push_str(body);
    canonical
}

/// HMAC-SHA256 of `canonical` keyed with `secret`, lowercase hex.
pub fn sign(secret: &str, canonical: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Headers produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub api_key: String,
    pub timestamp: String,
    pub signature: String,
}

impl SignedHeaders {
    /// Header name/value pairs in send order.
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            (HEADER_API_KEY, self.api_key.as_str()),
            (HEADER_TIMESTAMP, self.timestamp.as_str()),
            (HEADER_SIGNATURE, self.signature.as_str()),
        ]
    }
}

/// Signs requests with one API key pair.
#[derive(Clone)]
pub struct RequestSigner {
    key_id: String,
    key_secret: String,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

impl RequestSigner {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign `path` and `body` with a fresh timestamp.
    ///
    /// Call once per request attempt; the signature binds the timestamp.
    pub fn sign_request(&self, path: &str, body: &str) -> SignedHeaders {
        self.sign_at(Utc::now(), path, body)
    }

    /// Sign with an explicit instant.
    pub fn sign_at(&self, instant: DateTime<Utc>, path: &str, body: &str) -> SignedHeaders {
        let timestamp = format_timestamp(instant);
        let canonical = canonical_string(&self.key_id, path, &timestamp, body);
        SignedHeaders {
            api_key: self.key_id.clone(),
            signature: sign(&self.key_secret, &canonical),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap()
    }

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            sign("Jefe", "what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(fixed_instant()), "2024-03-07T09:05:02+0000");
    }

    #[test]
    fn test_canonical_string_order() {
        assert_eq!(
            canonical_string("KEY", "/api/v2.0/package/t1", "TS", ""),
            "KEY/api/v2.0/package/t1TS"
        );
        assert_eq!(canonical_string("K", "/p", "T", "{\"a\":1}"), "K/pT{\"a\":1}");
    }

    #[test]
    fn test_signature_reproducible() {
        let signer = RequestSigner::new("key", "secret");
        let a = signer.sign_at(fixed_instant(), "/api/v2.0/package/t", "");
        let b = signer.sign_at(fixed_instant(), "/api/v2.0/package/t", "");
        assert_eq!(a, b);
        assert_eq!(a.signature.len(), 64);
        assert_eq!(
            a.signature,
            sign("secret", "key/api/v2.0/package/t2024-03-07T09:05:02+0000")
        );
    }

    #[test]
    fn test_signature_changes_with_each_input() {
        let base = sign("secret", &canonical_string("key", "/p", "T1", "body"));

        let variants = [
            sign("other", &canonical_string("key", "/p", "T1", "body")),
            sign("secret", &canonical_string("kez", "/p", "T1", "body")),
            sign("secret", &canonical_string("key", "/q", "T1", "body")),
            sign("secret", &canonical_string("key", "/p", "T2", "body")),
            sign("secret", &canonical_string("key", "/p", "T1", "bodz")),
        ];

        for variant in variants {
            assert_ne!(variant, base);
        }
    }

    #[test]
    fn test_signed_headers_pairs() {
        let headers = RequestSigner::new("id", "s").sign_at(fixed_instant(), "/p", "");
        let pairs = headers.pairs();
        assert_eq!(pairs[0], (HEADER_API_KEY, "id"));
        assert_eq!(pairs[1], (HEADER_TIMESTAMP, "2024-03-07T09:05:02+0000"));
        assert_eq!(pairs[2].0, HEADER_SIGNATURE);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let signer = RequestSigner::new("id", "very-secret");
        let debug = format!("{:?}", signer);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("id"));
    }
}
