//! Vault manifest: the single bootstrap anchor of an encrypted drive
//!
//! Serialized as JSON with single-character keys so the encrypted manifest
//! stays in the same size class as the decoy files around it. The manifest is
//! never written raw — the pipeline wraps the encoding in a standard envelope
//! and stores it under the fixed hidden name `.sys`. Everything else on the
//! drive is discoverable only by decrypting this object.
//!
//! Legacy manifests carried two parallel arrays (`cn` names, `cs` sizes) with
//! no per-chunk MACs. They are still accepted on read, flagged as
//! unauthenticated, and never produced.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use shroud_core::{VaultError, VaultResult};

/// Fixed hidden manifest filename on the drive root.
pub const MANIFEST_FILE: &str = ".sys";

/// Reserved key in the files mapping naming the single-blob vault file.
pub const SINGLE_BLOB_KEY: &str = "__vault__";

/// One chunk: camouflage name, byte length, HMAC-SHA-256 tag (base64).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "s")]
    pub size: u64,
    #[serde(rename = "h")]
    pub mac: String,
}

impl ChunkRecord {
    pub fn new(name: String, size: u64, mac: &[u8; 32]) -> Self {
        Self {
            name,
            size,
            mac: BASE64.encode(mac),
        }
    }

    /// Decode the stored MAC tag.
    pub fn mac_bytes(&self) -> VaultResult<Vec<u8>> {
        BASE64
            .decode(&self.mac)
            .map_err(|e| VaultError::CorruptVault(format!("chunk mac encoding: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultManifest {
    #[serde(rename = "v")]
    pub version: String,
    /// Creation time, seconds since the Unix epoch
    #[serde(rename = "c")]
    pub created_at: u64,
    #[serde(rename = "m")]
    pub modified_at: u64,
    /// Total plaintext bytes before archiving
    #[serde(rename = "os")]
    pub original_size: u64,
    #[serde(rename = "fc")]
    pub file_count: usize,
    /// Reserved names → on-disk identifiers (currently only `__vault__`)
    #[serde(rename = "f", default)]
    pub files: BTreeMap<String, String>,
    /// Base64 of a 32-byte salt recorded at manifest build time
    #[serde(rename = "s")]
    pub salt: String,
    #[serde(rename = "d", default)]
    pub has_decoys: bool,
    #[serde(rename = "de", default)]
    pub double_encrypted: bool,
    #[serde(rename = "uc", default)]
    pub use_chunks: bool,
    #[serde(rename = "cks", default)]
    pub chunks: Vec<ChunkRecord>,
    #[serde(rename = "tc", default)]
    pub total_chunks: usize,
    /// Legacy unauthenticated layout: chunk names only
    #[serde(rename = "cn", default, skip_serializing_if = "Option::is_none")]
    pub legacy_chunk_names: Option<Vec<String>>,
    /// Legacy unauthenticated layout: chunk sizes only
    #[serde(rename = "cs", default, skip_serializing_if = "Option::is_none")]
    pub legacy_chunk_sizes: Option<Vec<u64>>,
}

impl VaultManifest {
    pub fn encode(&self) -> VaultResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| VaultError::CorruptVault(format!("manifest encode: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> VaultResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VaultError::CorruptVault(format!("manifest decode: {e}")))
    }

    /// True when this manifest predates per-chunk MACs. Such vaults decrypt
    /// without integrity verification and callers must treat them as
    /// unauthenticated.
    pub fn is_legacy_unauthenticated(&self) -> bool {
        self.use_chunks
            && self.chunks.is_empty()
            && self
                .legacy_chunk_names
                .as_ref()
                .is_some_and(|names| !names.is_empty())
    }

    /// Name of the single-blob vault file (without its leading dot), if any.
    pub fn single_blob_name(&self) -> Option<&str> {
        self.files.get(SINGLE_BLOB_KEY).map(String::as_str)
    }
}
