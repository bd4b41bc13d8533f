use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `message` under `secret`.
pub fn hmac_sha256_hex(secret: &str, message: &[u8]) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Compare two hex signatures without leaking where they differ.
pub fn constant_time_eq(expected: &str, provided: &str) -> bool {
    let expected = expected.trim().to_ascii_lowercase();
    let provided = provided.trim().to_ascii_lowercase();
    if expected.is_empty() || expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Verify `signature` as the hex HMAC-SHA256 of `message` under `secret`.
pub fn verify_hmac_sha256(secret: &str, message: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    constant_time_eq(&hmac_sha256_hex(secret, message), signature)
}
