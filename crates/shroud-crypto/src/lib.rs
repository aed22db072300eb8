//! shroud-crypto: passphrase-keyed envelope encryption
//!
//! Envelope format (binary):
//! ```text
//! [1 byte: mode][32 bytes: salt][nonce][AEAD ciphertext + tag]
//! mode 0x01 = AES-256-GCM (12-byte nonce)
//! mode 0x02 = XChaCha20-Poly1305 over an inner AES-256-GCM envelope
//!             (24-byte outer nonce, second key = SHA-512(key)[0..32])
//! ```
//!
//! Key derivation is Argon2id in two profiles: the strong profile guards
//! every data envelope; the fast profile exists only for session-storage
//! keys and the per-chunk MAC key, never for bulk data.

pub mod envelope;
pub mod kdf;
pub mod mac;

pub use envelope::{open, seal, EnvelopeOptions, MODE_DOUBLE, MODE_SINGLE};
pub use kdf::{derive_key, derive_key_fast, KdfParams, KeyMaterial};
pub use mac::{hmac256, verify_hmac};

use thiserror::Error;

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-envelope salt
pub const SALT_SIZE: usize = 32;

/// AES-256-GCM nonce size
pub const GCM_NONCE_SIZE: usize = 12;

/// XChaCha20-Poly1305 nonce size
pub const XCHACHA_NONCE_SIZE: usize = 24;

/// Poly1305 / GCM authentication tag size
pub const TAG_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD open failed. Deliberately opaque: the caller cannot tell a wrong
    /// passphrase from tampered ciphertext, and must not try to.
    #[error("decryption failed")]
    DecryptFailed,

    /// Envelope too short or carries an unknown mode byte.
    #[error("invalid envelope")]
    InvalidEnvelope,

    #[error("encryption failed")]
    SealFailed,

    #[error("key derivation failed: {0}")]
    Kdf(String),
}
