//! Ciphertext chunking under camouflage names
//!
//! The envelope is split into variably-sized fragments whose names mimic the
//! temp and system files that litter real drives (`~$3af1…d2.tmp`,
//! `._88c1….bak`, …). Fragment sizes jitter uniformly around the target so no
//! regular size signature appears. Concatenating the fragments in manifest
//! order yields exactly the envelope; order is the manifest's, never a sort
//! by name.
//!
//! Each fragment is HMAC-SHA-256 tagged under a key derived from the
//! passphrase with the fast profile. Tampering is detected per chunk from
//! the manifest alone, without trial decryption of the whole vault.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zeroize::Zeroize;

use shroud_core::{ProgressFn, VaultError, VaultResult};
use shroud_crypto::kdf::{derive_key_fast, KeyMaterial};
use shroud_crypto::mac::{hmac256, verify_hmac};

use crate::manifest::ChunkRecord;

/// Default chunk-size clamp window.
pub const MIN_CHUNK_SIZE: usize = 1024 * 1024;
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Name fragments drawn from the litter found on real drives.
const NAME_PREFIXES: &[&str] = &["~$", ".", "._", "~", "$", ".~"];

const NAME_EXTENSIONS: &[&str] = &[
    ".tmp", ".bak", ".old", ".log", ".dat", ".bin", ".cache", ".db", ".idx", ".swp", ".temp", "~",
    ".part", ".download", ".crdownload", ".partial", ".!ut", ".bc!", ".aria2",
];

#[derive(Debug, Clone)]
pub struct ChunkPolicy {
    /// Target fragment size in bytes, clamped to `[min_size, max_size]`
    pub target_size: usize,
    /// Uniform jitter around the target, as a percentage (0–100)
    pub variance_percent: u32,
    pub min_size: usize,
    pub max_size: usize,
}

impl ChunkPolicy {
    pub fn new(target_size: usize, variance_percent: u32) -> Self {
        Self {
            target_size,
            variance_percent,
            min_size: MIN_CHUNK_SIZE,
            max_size: MAX_CHUNK_SIZE,
        }
    }

    fn clamped_target(&self) -> usize {
        self.target_size.clamp(self.min_size, self.max_size).max(1)
    }

    /// Draw the next fragment size: uniform in `[target·(1−v), target·(1+v)]`.
    fn draw_size<R: Rng>(&self, rng: &mut R) -> usize {
        let target = self.clamped_target();
        let variance = self.variance_percent.min(100) as usize;
        let spread = target * variance / 100;
        if spread == 0 {
            return target;
        }
        rng.gen_range(target - spread..=target + spread).max(1)
    }
}

/// Derive the per-chunk MAC key from the vault passphrase.
///
/// Fast profile over `passphrase ‖ "_hmac"` with the fixed domain salt; the
/// suffixed copy is zeroized before returning.
pub fn chunk_mac_key(passphrase: &SecretString) -> VaultResult<KeyMaterial> {
    let mut secret = format!("{}_hmac", passphrase.expose_secret()).into_bytes();
    let key =
        derive_key_fast(&secret, b"chunk_integrity").map_err(|e| VaultError::Crypto(e.to_string()));
    secret.zeroize();
    key
}

/// Generate a camouflage filename not present in `taken` or on disk under
/// `root`. Collisions are resolved by regeneration.
pub fn camouflage_name(root: &Path, taken: &HashSet<String>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let prefix = NAME_PREFIXES.choose(&mut rng).expect("non-empty prefix set");
        let ext = NAME_EXTENSIONS
            .choose(&mut rng)
            .expect("non-empty extension set");

        let middle = match rng.gen_range(0..4) {
            0 => random_hex(&mut rng, 8),
            1 => random_hex(&mut rng, 12),
            2 => random_hex(&mut rng, 16),
            _ => format!("{:06}", timestamp_tail()),
        };

        let name = format!("{prefix}{middle}{ext}");
        if !taken.contains(&name) && !root.join(&name).exists() {
            return name;
        }
    }
}

fn random_hex<R: RngCore>(rng: &mut R, bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Last six digits of the nanosecond clock, the way editors stamp temp files.
fn timestamp_tail() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        % 1_000_000
}

/// Split `blob` into camouflage-named fragments on `root`, tagging each with
/// HMAC-SHA-256 under `mac_key`. Returns the chunk table in write order.
///
/// On cancellation the already-written fragments are removed before the error
/// is returned, so no orphaned ciphertext survives without a manifest.
pub fn write_chunks(
    root: &Path,
    blob: &[u8],
    policy: &ChunkPolicy,
    mac_key: &KeyMaterial,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
) -> VaultResult<Vec<ChunkRecord>> {
    let mut rng = rand::thread_rng();
    let mut records: Vec<ChunkRecord> = Vec::new();
    let mut taken = HashSet::new();
    let mut offset = 0usize;

    while offset < blob.len() {
        if cancel.is_cancelled() {
            remove_written(root, &records);
            return Err(VaultError::Cancelled);
        }

        let size = policy.draw_size(&mut rng).min(blob.len() - offset);
        let name = camouflage_name(root, &taken);
        let data = &blob[offset..offset + size];

        if let Err(e) = std::fs::write(root.join(&name), data) {
            remove_written(root, &records);
            return Err(e.into());
        }

        let tag = hmac256(data, mac_key.as_bytes());
        records.push(ChunkRecord::new(name.clone(), size as u64, &tag));
        taken.insert(name);
        offset += size;

        if let Some(cb) = progress {
            cb(offset as u64, blob.len() as u64, "encrypting");
        }
    }

    debug!(chunks = records.len(), bytes = blob.len(), "wrote chunks");
    Ok(records)
}

fn remove_written(root: &Path, records: &[ChunkRecord]) {
    for record in records {
        let _ = std::fs::remove_file(root.join(&record.name));
    }
}

/// Reassemble the envelope from the chunk table, verifying every MAC before
/// returning a single byte. Any mismatch aborts the whole read.
pub fn read_chunks(
    root: &Path,
    records: &[ChunkRecord],
    mac_key: &KeyMaterial,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
) -> VaultResult<Vec<u8>> {
    let total: u64 = records.iter().map(|r| r.size).sum();
    let mut blob = Vec::with_capacity(total as usize);

    for record in records {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }

        let data = read_chunk_file(root, &record.name)?;
        if data.len() as u64 != record.size {
            return Err(VaultError::IntegrityFailure(record.name.clone()));
        }
        let tag = record.mac_bytes()?;
        if !verify_hmac(&data, &tag, mac_key.as_bytes()) {
            return Err(VaultError::IntegrityFailure(record.name.clone()));
        }
        blob.extend_from_slice(&data);

        if let Some(cb) = progress {
            cb(blob.len() as u64, total, "reading_chunks");
        }
    }
    Ok(blob)
}

/// Reassemble a legacy vault that carries no per-chunk MACs. The caller is
/// responsible for having warned that this path is unauthenticated.
pub fn read_chunks_unverified(
    root: &Path,
    names: &[String],
    cancel: &CancellationToken,
) -> VaultResult<Vec<u8>> {
    let mut blob = Vec::new();
    for name in names {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }
        blob.extend_from_slice(&read_chunk_file(root, name)?);
    }
    Ok(blob)
}

fn read_chunk_file(root: &Path, name: &str) -> VaultResult<Vec<u8>> {
    match std::fs::read(root.join(name)) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(VaultError::CorruptVault(format!("missing chunk: {name}")))
        }
        Err(e) => Err(e.into()),
    }
}
