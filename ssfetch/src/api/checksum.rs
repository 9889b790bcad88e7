//! Package checksum derivation.
//!
//! The segment URL endpoint only issues download URLs to callers that prove
//! possession of the key code. The proof is a PBKDF2-HMAC-SHA256 digest of
//! the key code salted with the package code, which the server recomputes.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

/// PBKDF2 iteration count required by the server.
pub const CHECKSUM_ITERATIONS: u32 = 1024;

/// Derived key length in bytes.
pub const CHECKSUM_LENGTH: usize = 32;

/// Derive the package checksum.
///
/// # Arguments
///
/// * `key_code` - The client secret from the package link (PBKDF2 password)
/// * `package_code` - The package code from the package link (PBKDF2 salt)
///
/// # Returns
///
/// The lowercase hexadecimal 32-byte digest.
pub fn derive_checksum(key_code: &str, package_code: &str) -> String {
    derive_with_iterations(key_code, package_code, CHECKSUM_ITERATIONS)
}

fn derive_with_iterations(key_code: &str, package_code: &str, iterations: u32) -> String {
    let mut out = [0u8; CHECKSUM_LENGTH];
    pbkdf2_hmac::<Sha256>(
        key_code.as_bytes(),
        package_code.as_bytes(),
        iterations,
        &mut out,
    );
    hex::encode(out)
}
