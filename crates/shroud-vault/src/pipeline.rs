//! The vault pipeline: lock, unlock, and erase whole drives
//!
//! Encryption: scan → tar+gzip to a hidden temp file → envelope-seal the
//! archive → write chunks (or one hidden blob) → scatter decoys → write the
//! encrypted manifest → wipe originals → clear the session. The manifest is
//! written only after every chunk exists; wiping originals starts only after
//! the manifest is durable. Cancellation before the manifest leaves the drive
//! plain with all temporaries removed; after the manifest the operation runs
//! to completion.
//!
//! Decryption: decrypt manifest → verify every chunk MAC → reassemble →
//! envelope-open → extract → remove chunks, manifest, and decoys → install
//! the session. No plaintext touches the drive before all MACs verify.

use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shroud_core::{unix_now, ProgressFn, ShroudConfig, VaultError, VaultResult, VaultState};
use shroud_crypto::envelope::{self, EnvelopeOptions};
use shroud_crypto::kdf::KdfParams;
use shroud_crypto::CryptoError;

use crate::archive;
use crate::chunker::{self, ChunkPolicy};
use crate::decoy;
use crate::exclude::ExclusionSet;
use crate::manifest::{VaultManifest, MANIFEST_FILE, SINGLE_BLOB_KEY};
use crate::session::SessionStore;
use crate::wipe;

/// Everything the pipeline needs to know about one operation, resolved from
/// the config by the shell. The engine itself never touches global state.
#[derive(Debug, Clone)]
pub struct VaultOptions {
    pub double_encrypt: bool,
    pub secure_wipe: bool,
    pub use_chunks: bool,
    pub chunk_size_mb: usize,
    pub chunk_variance_percent: u32,
    pub generate_decoys: bool,
    pub decoy_count: usize,
    /// Argon2id profile for data envelopes. Part of the on-disk contract:
    /// nothing in the envelope or manifest records the costs, so decryption
    /// must re-derive under the exact profile that sealed the vault. The
    /// config never varies this; only tests substitute a cheaper profile on
    /// both sides of a round-trip.
    pub kdf: KdfParams,
    pub exclusions: Vec<String>,
}

impl VaultOptions {
    pub fn from_config(cfg: &ShroudConfig) -> Self {
        Self {
            double_encrypt: cfg.double_encrypt,
            secure_wipe: cfg.secure_wipe,
            use_chunks: cfg.use_chunks,
            chunk_size_mb: cfg.chunk_size_mb,
            chunk_variance_percent: cfg.chunk_variance_percent,
            generate_decoys: cfg.generate_decoys,
            decoy_count: cfg.decoy_count,
            kdf: KdfParams::strong(),
            exclusions: cfg.exclusions.clone(),
        }
    }

    fn envelope_options(&self) -> EnvelopeOptions {
        EnvelopeOptions {
            double: self.double_encrypt,
            kdf: self.kdf.clone(),
        }
    }

    fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy::new(self.chunk_size_mb * 1024 * 1024, self.chunk_variance_percent)
    }
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self::from_config(&ShroudConfig::default())
    }
}

/// Whether the drive root currently holds a vault manifest.
pub fn is_vault_present(root: &Path) -> bool {
    root.join(MANIFEST_FILE).exists()
}

/// Classify a drive: Locked when a manifest exists, Open when only a session
/// does, Plain otherwise.
pub fn vault_state(root: &Path, drive_id: &str, sessions: &SessionStore) -> VaultState {
    if is_vault_present(root) {
        VaultState::Locked
    } else if sessions.has(drive_id) {
        VaultState::Open
    } else {
        VaultState::Plain
    }
}

/// Transform every plaintext file under `root` into the camouflaged vault
/// form. On success the drive is Locked and the drive's session is cleared.
pub fn encrypt_drive(
    root: &Path,
    drive_id: &str,
    passphrase: &SecretString,
    opts: &VaultOptions,
    sessions: &SessionStore,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
) -> VaultResult<()> {
    check_passphrase(passphrase)?;
    if is_vault_present(root) {
        return Err(VaultError::CorruptVault(
            "drive already holds a vault manifest".into(),
        ));
    }

    let exclusions = ExclusionSet::load(root, &opts.exclusions);
    let files = archive::scan(root, &exclusions, cancel)?;
    if files.is_empty() {
        return Err(VaultError::NothingToEncrypt);
    }
    let total_size: u64 = files.iter().map(|f| f.size).sum();
    debug!(files = files.len(), bytes = total_size, "scan complete");

    report(progress, 0, total_size, "archiving");
    let temp = TempFile::new(root);
    archive::create_archive(root, &files, temp.path(), cancel, progress, total_size)?;

    let mut plaintext = std::fs::read(temp.path())?;
    drop(temp);
    if cancel.is_cancelled() {
        wipe::wipe_buffer(&mut plaintext);
        return Err(VaultError::Cancelled);
    }

    report(progress, total_size / 2, total_size, "encrypting");
    let sealed = envelope::seal(&plaintext, passphrase, &opts.envelope_options());
    wipe::wipe_buffer(&mut plaintext);
    let sealed = sealed.map_err(crypto_to_vault)?;

    let mut manifest = VaultManifest {
        version: env!("CARGO_PKG_VERSION").to_string(),
        created_at: unix_now(),
        modified_at: unix_now(),
        original_size: total_size,
        file_count: files.len(),
        files: Default::default(),
        salt: random_salt_b64(),
        has_decoys: false,
        double_encrypted: opts.double_encrypt,
        use_chunks: opts.use_chunks,
        chunks: Vec::new(),
        total_chunks: 0,
        legacy_chunk_names: None,
        legacy_chunk_sizes: None,
    };

    // Everything written before the manifest is tracked so a failure or
    // cancellation can put the drive back to Plain.
    let mut artifacts: Vec<PathBuf> = Vec::new();
    let written = write_vault_files(
        root, &sealed, passphrase, opts, cancel, progress, &mut manifest, &mut artifacts,
    );
    if let Err(e) = written {
        for path in &artifacts {
            let _ = std::fs::remove_file(path);
        }
        return Err(e);
    }

    // The manifest is durable: from here the operation must complete, so the
    // wipe loop gets a token nobody can cancel.
    report(progress, total_size * 3 / 4, total_size, "wiping");
    let no_cancel = CancellationToken::new();
    for file in &files {
        let path = root.join(&file.rel_path);
        let result = if opts.secure_wipe {
            wipe::secure_delete(&path, &no_cancel)
        } else {
            wipe::plain_delete(&path)
        };
        if let Err(e) = result {
            warn!(path = %path.display(), "failed to remove original: {e}");
        }
    }
    remove_empty_dirs(root);

    sessions.clear(drive_id)?;
    report(progress, total_size, total_size, "done");
    info!(
        drive_id,
        files = files.len(),
        bytes = total_size,
        chunks = manifest.total_chunks,
        "drive encrypted"
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_vault_files(
    root: &Path,
    sealed: &[u8],
    passphrase: &SecretString,
    opts: &VaultOptions,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
    manifest: &mut VaultManifest,
    artifacts: &mut Vec<PathBuf>,
) -> VaultResult<()> {
    if opts.use_chunks {
        let mac_key = chunker::chunk_mac_key(passphrase)?;
        let records = chunker::write_chunks(
            root,
            sealed,
            &opts.chunk_policy(),
            &mac_key,
            cancel,
            progress,
        )?;
        artifacts.extend(records.iter().map(|r| root.join(&r.name)));
        manifest.total_chunks = records.len();
        manifest.chunks = records;
    } else {
        let mut name_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut name_bytes);
        let name = hex::encode(name_bytes);

        let path = root.join(format!(".{name}"));
        std::fs::write(&path, sealed)?;
        artifacts.push(path);
        manifest.files.insert(SINGLE_BLOB_KEY.to_string(), name);
    }

    if opts.generate_decoys && opts.decoy_count > 0 {
        let names = decoy::write_decoys(root, opts.decoy_count, cancel)?;
        artifacts.extend(names.iter().map(|n| root.join(format!(".{n}"))));
        manifest.has_decoys = true;
    }

    if cancel.is_cancelled() {
        return Err(VaultError::Cancelled);
    }

    let encoded = manifest.encode()?;
    let sealed_manifest = envelope::seal(&encoded, passphrase, &opts.envelope_options())
        .map_err(crypto_to_vault)?;
    std::fs::write(root.join(MANIFEST_FILE), sealed_manifest)?;
    Ok(())
}

/// Restore the plaintext tree from a Locked drive. On success the drive is
/// Open: vault artifacts are gone and the session is installed.
pub fn decrypt_drive(
    root: &Path,
    drive_id: &str,
    passphrase: &SecretString,
    opts: &VaultOptions,
    sessions: &SessionStore,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
) -> VaultResult<()> {
    let manifest = load_manifest(root, passphrase, &opts.kdf)?;
    let total = manifest.original_size.max(1);

    let has_chunk_table = !manifest.chunks.is_empty()
        || manifest
            .legacy_chunk_names
            .as_ref()
            .is_some_and(|n| !n.is_empty());

    let sealed = if manifest.use_chunks && has_chunk_table {
        report(progress, 0, total, "reading_chunks");
        if manifest.is_legacy_unauthenticated() {
            warn!(drive_id, "legacy vault without chunk MACs: integrity is not verified");
            let names = manifest.legacy_chunk_names.clone().unwrap_or_default();
            chunker::read_chunks_unverified(root, &names, cancel)?
        } else {
            let mac_key = chunker::chunk_mac_key(passphrase)?;
            chunker::read_chunks(root, &manifest.chunks, &mac_key, cancel, progress)?
        }
    } else {
        let name = manifest
            .single_blob_name()
            .ok_or_else(|| VaultError::CorruptVault("vault file not recorded".into()))?;
        match std::fs::read(root.join(format!(".{name}"))) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::CorruptVault("vault file missing".into()))
            }
            Err(e) => return Err(e.into()),
        }
    };

    report(progress, 0, total, "decrypting");
    let mut plaintext =
        envelope::open(&sealed, passphrase, &opts.kdf).map_err(crypto_to_vault)?;

    report(progress, total / 2, total, "extracting");
    let temp = TempFile::new(root);
    let written = std::fs::write(temp.path(), &plaintext);
    wipe::wipe_buffer(&mut plaintext);
    written?;
    archive::extract_archive(temp.path(), root, cancel)?;
    drop(temp);

    // All plaintext restored: the ciphertext, manifest, and decoys go away.
    if manifest.use_chunks && has_chunk_table {
        for record in &manifest.chunks {
            let _ = std::fs::remove_file(root.join(&record.name));
        }
        for name in manifest.legacy_chunk_names.iter().flatten() {
            let _ = std::fs::remove_file(root.join(name));
        }
    } else if let Some(name) = manifest.single_blob_name() {
        let _ = std::fs::remove_file(root.join(format!(".{name}")));
    }
    std::fs::remove_file(root.join(MANIFEST_FILE))?;
    decoy::remove_hidden_artifacts(root, false, cancel)?;

    sessions.set(drive_id, root, passphrase)?;
    report(progress, total, total, "done");
    info!(drive_id, files = manifest.file_count, "drive decrypted");
    Ok(())
}

/// Re-lock an Open drive using its cached session passphrase.
pub fn quick_encrypt(
    root: &Path,
    drive_id: &str,
    opts: &VaultOptions,
    sessions: &SessionStore,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
) -> VaultResult<()> {
    let passphrase = sessions.get(drive_id).ok_or(VaultError::NoSession)?;
    encrypt_drive(root, drive_id, &passphrase, opts, sessions, cancel, progress)
}

/// Bind a new passphrase to an Open drive's session. The next encryption
/// seals under the new passphrase; there is no in-place re-encryption of an
/// already-locked vault.
pub fn change_password(
    root: &Path,
    drive_id: &str,
    old: &SecretString,
    new: &SecretString,
    sessions: &SessionStore,
) -> VaultResult<()> {
    check_passphrase(new)?;

    let current = sessions.get(drive_id).ok_or(VaultError::NoSession)?;
    if current.expose_secret() != old.expose_secret() {
        return Err(VaultError::WrongPassword);
    }

    sessions.set(drive_id, root, new)?;
    info!(drive_id, "session passphrase changed");
    Ok(())
}

/// Remove every hidden-prefixed file from the drive root and forget the
/// session. Plaintext user files are untouched; the drive ends Plain.
pub fn erase_vault(
    root: &Path,
    drive_id: &str,
    secure: bool,
    sessions: &SessionStore,
    cancel: &CancellationToken,
) -> VaultResult<()> {
    for entry in std::fs::read_dir(root)? {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !archive::is_hidden_name(name) {
            continue;
        }

        let path = entry.path();
        let result = if secure {
            wipe::secure_delete(&path, cancel)
        } else {
            wipe::plain_delete(&path)
        };
        match result {
            Ok(()) => {}
            Err(VaultError::Cancelled) => return Err(VaultError::Cancelled),
            Err(e) => warn!(path = %path.display(), "erase: failed to remove: {e}"),
        }
    }

    sessions.clear(drive_id)?;
    info!(drive_id, "vault erased");
    Ok(())
}

/// Decrypt and return the manifest without touching the drive contents.
pub fn vault_info(root: &Path, passphrase: &SecretString, kdf: &KdfParams) -> VaultResult<VaultManifest> {
    load_manifest(root, passphrase, kdf)
}

fn load_manifest(root: &Path, passphrase: &SecretString, kdf: &KdfParams) -> VaultResult<VaultManifest> {
    let sealed = match std::fs::read(root.join(MANIFEST_FILE)) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VaultError::CorruptVault("no vault manifest on drive".into()))
        }
        Err(e) => return Err(e.into()),
    };

    let encoded = envelope::open(&sealed, passphrase, kdf).map_err(crypto_to_vault)?;
    VaultManifest::decode(&encoded)
}

/// AEAD failures are deliberately indistinguishable from a wrong passphrase.
fn crypto_to_vault(e: CryptoError) -> VaultError {
    match e {
        CryptoError::DecryptFailed | CryptoError::InvalidEnvelope => VaultError::WrongPassword,
        other => VaultError::Crypto(other.to_string()),
    }
}

fn check_passphrase(passphrase: &SecretString) -> VaultResult<()> {
    if passphrase.expose_secret().chars().count() < 8 {
        return Err(VaultError::Crypto(
            "passphrase must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

fn report(progress: Option<&ProgressFn>, current: u64, total: u64, stage: &str) {
    if let Some(cb) = progress {
        cb(current, total, stage);
    }
}

fn random_salt_b64() -> String {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    let mut salt = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut salt);
    BASE64.encode(salt)
}

/// Hidden scratch file removed on drop, success or failure.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(root: &Path) -> Self {
        let mut suffix = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut suffix);
        Self {
            path: root.join(format!(".tmp_{}", hex::encode(suffix))),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Depth-first removal of directories left empty after originals are wiped.
fn remove_empty_dirs(root: &Path) {
    fn sweep(dir: &Path) -> bool {
        let mut empty = true;
        let Ok(entries) = std::fs::read_dir(dir) else {
            return false;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if !(sweep(&path) && std::fs::remove_dir(&path).is_ok()) {
                    empty = false;
                }
            } else {
                empty = false;
            }
        }
        empty
    }
    sweep(root);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dir_sweep_preserves_populated_branches() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("a/b/c")).unwrap();
        std::fs::create_dir_all(tmp.path().join("keep/sub")).unwrap();
        std::fs::write(tmp.path().join("keep/sub/file.txt"), b"data").unwrap();

        remove_empty_dirs(tmp.path());

        assert!(!tmp.path().join("a").exists(), "empty tree removed");
        assert!(tmp.path().join("keep/sub/file.txt").exists());
    }

    #[test]
    fn short_passphrase_rejected() {
        let err = check_passphrase(&SecretString::from("seven77".to_string())).unwrap_err();
        assert!(matches!(err, VaultError::Crypto(_)));
        check_passphrase(&SecretString::from("eight888".to_string())).unwrap();
    }

    #[test]
    fn temp_file_removed_on_drop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = {
            let temp = TempFile::new(tmp.path());
            std::fs::write(temp.path(), b"scratch").unwrap();
            temp.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
