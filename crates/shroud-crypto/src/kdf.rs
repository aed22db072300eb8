//! Key derivation: Argon2id passphrase → 256-bit key

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::{CryptoError, KEY_SIZE};

/// A 256-bit key derived from a passphrase via Argon2id.
///
/// Zeroized on drop so key bytes do not linger in memory.
#[derive(Clone)]
pub struct KeyMaterial {
    bytes: [u8; KEY_SIZE],
}

impl KeyMaterial {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost_kib: u32,
    /// Time cost / iterations
    pub time_cost: u32,
    /// Parallelism lanes
    pub parallelism: u32,
}

impl KdfParams {
    /// The data-encryption profile: 1 GiB, 4 iterations, 8 lanes.
    pub fn strong() -> Self {
        Self {
            mem_cost_kib: 1024 * 1024,
            time_cost: 4,
            parallelism: 8,
        }
    }

    /// The session/MAC-key profile: 64 MiB, 1 iteration, 4 lanes.
    ///
    /// Never used for bulk data. It exists so that session cache operations
    /// and per-chunk MAC keying stay interactive.
    pub fn fast() -> Self {
        Self {
            mem_cost_kib: 64 * 1024,
            time_cost: 1,
            parallelism: 4,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::strong()
    }
}

/// Derive a 256-bit key from a passphrase and salt using Argon2id.
pub fn derive_key(
    passphrase: &SecretString,
    salt: &[u8],
    params: &KdfParams,
) -> Result<KeyMaterial, CryptoError> {
    derive_raw(passphrase.expose_secret().as_bytes(), salt, params)
}

/// Derive a 256-bit key under the fixed fast profile.
///
/// Takes raw secret bytes because its two callers key from constructed
/// material (passphrase with a domain suffix, the machine key) rather than a
/// user passphrase.
pub fn derive_key_fast(secret: &[u8], salt: &[u8]) -> Result<KeyMaterial, CryptoError> {
    derive_raw(secret, salt, &KdfParams::fast())
}

fn derive_raw(secret: &[u8], salt: &[u8], params: &KdfParams) -> Result<KeyMaterial, CryptoError> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::Kdf(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(secret, salt, &mut key)
        .map_err(|e| CryptoError::Kdf(format!("Argon2id failed: {e}")))?;

    Ok(KeyMaterial::from_bytes(key))
}
