//! Webhook signing and key comparison.
//!
//! Alert webhooks carry an `x-tollgate-signature: sha256=<hex>` header, the
//! HMAC-SHA256 of the raw JSON body under the shared webhook secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-tollgate-signature";

/// Compute HMAC-SHA256 of `body` and return it hex-encoded.
///
/// # Panics
///
/// Never in practice: HMAC-SHA256 accepts keys of any size (RFC 2104).
#[must_use]
pub fn hmac_sha256_hex(secret: &str, body: &[u8]) -> String {
    // INVARIANT: `new_from_slice` only fails for fixed-size-key MACs.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Value of the signature header for `body`.
#[must_use]
pub fn signature_header_value(secret: &str, body: &[u8]) -> String {
    format!("sha256={}", hmac_sha256_hex(secret, body))
}

/// Check a received signature header against `body`.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    header
        .strip_prefix("sha256=")
        .is_some_and(|sig| constant_time_eq(sig, &hmac_sha256_hex(secret, body)))
}

/// Constant-time string comparison, for API keys and signatures.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
