//! SHA-256 digests and HMAC signing for outbound deliveries.
//!
//! Used by the `audit` hash chain and by the webhook sender when a
//! subscription carries a signing secret.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the `X-Signature` header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute the hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn hmac_sha256_hex(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Build the `X-Signature` header value for a delivery body.
pub fn delivery_signature(secret: &str, body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", hmac_sha256_hex(secret, body))
}

/// Check a received `X-Signature` header against the expected secret.
///
/// Comparison runs over every byte regardless of where the first mismatch is.
pub fn verify_delivery_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let expected = delivery_signature(secret, body);
    if expected.len() != header.len() {
        return false;
    }
    expected
        .bytes()
        .zip(header.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
