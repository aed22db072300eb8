//! HMAC-SHA-256 tagging and constant-time verification

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA-256 of `data` under `key`.
pub fn hmac256(data: &[u8], key: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time HMAC verification.
///
/// The length check short-circuits, which is fine: tag length is not secret.
pub fn verify_hmac(data: &[u8], tag: &[u8], key: &[u8]) -> bool {
    if tag.len() != 32 {
        return false;
    }
    let expected = hmac256(data, key);
    expected.ct_eq(tag).into()
}
