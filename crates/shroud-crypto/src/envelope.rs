//! Mode-tagged, salted AEAD envelopes
//!
//! `seal` emits `[mode][salt32][nonce][ciphertext+tag]`. Single mode is
//! AES-256-GCM. Double mode seals the whole single-mode ciphertext again with
//! XChaCha20-Poly1305 under a second key derived as `SHA-512(key)[0..32]`, so
//! an attacker must break both ciphers (or the KDF) to reach the plaintext.
//!
//! `open` reads the mode byte from the data itself; callers never choose the
//! decryption path. Every tag failure surfaces as the same opaque
//! `DecryptFailed` to avoid a corruption-vs-wrong-password oracle.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use secrecy::SecretString;
use sha2::{Digest, Sha512};

use crate::kdf::{derive_key, KdfParams, KeyMaterial};
use crate::{CryptoError, GCM_NONCE_SIZE, KEY_SIZE, SALT_SIZE, XCHACHA_NONCE_SIZE};

/// Mode byte: single AES-256-GCM layer
pub const MODE_SINGLE: u8 = 0x01;

/// Mode byte: XChaCha20-Poly1305 over AES-256-GCM
pub const MODE_DOUBLE: u8 = 0x02;

#[derive(Debug, Clone)]
pub struct EnvelopeOptions {
    /// Add the outer XChaCha20-Poly1305 layer
    pub double: bool,
    /// Argon2id profile for the data key
    pub kdf: KdfParams,
}

impl Default for EnvelopeOptions {
    fn default() -> Self {
        Self {
            double: true,
            kdf: KdfParams::strong(),
        }
    }
}

/// Encrypt `plaintext` under `passphrase` with a fresh salt and nonce(s).
pub fn seal(
    plaintext: &[u8],
    passphrase: &SecretString,
    opts: &EnvelopeOptions,
) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);

    let key = derive_key(passphrase, &salt, &opts.kdf)?;

    let (mode, body) = if opts.double {
        let inner = seal_aes_gcm(plaintext, &key)?;
        let outer_key = second_key(&key);
        (MODE_DOUBLE, seal_xchacha(&inner, &outer_key)?)
    } else {
        (MODE_SINGLE, seal_aes_gcm(plaintext, &key)?)
    };

    let mut envelope = Vec::with_capacity(1 + SALT_SIZE + body.len());
    envelope.push(mode);
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&body);
    Ok(envelope)
}

/// Decrypt an envelope produced by `seal`, reading the mode from the data.
pub fn open(
    envelope: &[u8],
    passphrase: &SecretString,
    kdf: &KdfParams,
) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < 1 + SALT_SIZE {
        return Err(CryptoError::InvalidEnvelope);
    }

    let mode = envelope[0];
    let salt = &envelope[1..1 + SALT_SIZE];
    let body = &envelope[1 + SALT_SIZE..];

    let key = derive_key(passphrase, salt, kdf)?;

    match mode {
        MODE_SINGLE => open_aes_gcm(body, &key),
        MODE_DOUBLE => {
            let outer_key = second_key(&key);
            let inner = open_xchacha(body, &outer_key)?;
            open_aes_gcm(&inner, &key)
        }
        _ => Err(CryptoError::InvalidEnvelope),
    }
}

/// Seal bytes under a caller-supplied key with AES-256-GCM.
///
/// Output is `[12-byte nonce][ciphertext+tag]` with no mode byte or salt —
/// the session store derives its key out of band and has no envelope to
/// bootstrap from.
pub fn seal_raw(plaintext: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    seal_aes_gcm(plaintext, key)
}

/// Open bytes sealed by `seal_raw`.
pub fn open_raw(data: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    open_aes_gcm(data, key)
}

/// Second-layer key: `SHA-512(key)[0..32]`.
fn second_key(key: &KeyMaterial) -> KeyMaterial {
    let digest = Sha512::digest(key.as_bytes());
    let mut out = [0u8; KEY_SIZE];
    out.copy_from_slice(&digest[..KEY_SIZE]);
    KeyMaterial::from_bytes(out)
}

fn seal_aes_gcm(plaintext: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; GCM_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::SealFailed)?;

    let mut out = Vec::with_capacity(GCM_NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open_aes_gcm(data: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    if data.len() < GCM_NONCE_SIZE {
        return Err(CryptoError::InvalidEnvelope);
    }
    let (nonce_bytes, ciphertext) = data.split_at(GCM_NONCE_SIZE);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)
}

fn seal_xchacha(plaintext: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; XCHACHA_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::SealFailed)?;

    let mut out = Vec::with_capacity(XCHACHA_NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open_xchacha(data: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    if data.len() < XCHACHA_NONCE_SIZE {
        return Err(CryptoError::InvalidEnvelope);
    }
    let (nonce_bytes, ciphertext) = data.split_at(XCHACHA_NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)
}
