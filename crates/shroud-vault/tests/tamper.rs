//! Negative-path tests: tampering, wrong passphrases, missing chunks, and
//! the freshness of salts, names, and nonces across repeated encryptions.

use rand::RngCore;
use secrecy::SecretString;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use shroud_core::{ConfigStore, VaultError};
use shroud_crypto::kdf::KdfParams;
use shroud_vault::pipeline::{decrypt_drive, encrypt_drive, vault_info, VaultOptions};
use shroud_vault::session::SessionStore;

fn fast_kdf() -> KdfParams {
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

fn chunked_opts() -> VaultOptions {
    VaultOptions {
        double_encrypt: false,
        secure_wipe: false,
        use_chunks: true,
        chunk_size_mb: 1,
        chunk_variance_percent: 40,
        generate_decoys: false,
        decoy_count: 0,
        kdf: fast_kdf(),
        exclusions: Vec::new(),
    }
}

fn sessions(tmp: &TempDir) -> SessionStore {
    let config = Arc::new(ConfigStore::open(tmp.path().join("shroud.toml")).unwrap());
    SessionStore::new(config)
}

fn pw(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

fn token() -> CancellationToken {
    CancellationToken::new()
}

fn lock_sample_drive(drive: &Path, store: &SessionStore, opts: &VaultOptions) -> Vec<u8> {
    let mut payload = vec![0u8; 5 * 1024 * 1024];
    rand::thread_rng().fill_bytes(&mut payload);
    std::fs::write(drive.join("blob.bin"), &payload).unwrap();

    encrypt_drive(drive, "dt", &pw("password123"), opts, store, &token(), None).unwrap();
    payload
}

#[test]
fn flipped_byte_in_third_chunk_refuses_decryption() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);
    let opts = chunked_opts();

    lock_sample_drive(drive.path(), &store, &opts);

    let manifest = vault_info(drive.path(), &pw("password123"), &opts.kdf).unwrap();
    assert!(manifest.total_chunks >= 3, "need a third chunk to tamper with");

    let victim = &manifest.chunks[2];
    let path = drive.path().join(&victim.name);
    let mut data = std::fs::read(&path).unwrap();
    let mid = data.len() / 2;
    data[mid] ^= 0x01;
    std::fs::write(&path, data).unwrap();

    let err = decrypt_drive(
        drive.path(),
        "dt",
        &pw("password123"),
        &opts,
        &store,
        &token(),
        None,
    )
    .unwrap_err();

    assert!(matches!(err, VaultError::IntegrityFailure(_)));
    assert!(
        err.presents_as_wrong_password(),
        "UI must not distinguish tampering from a bad passphrase"
    );

    // nothing restored, nothing deleted
    assert!(!drive.path().join("blob.bin").exists());
    for record in &manifest.chunks {
        assert!(drive.path().join(&record.name).exists(), "chunks left in place");
    }
    assert!(drive.path().join(".sys").exists());
}

#[test]
fn edge_byte_flips_are_caught_in_first_and_last_chunks() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);
    let opts = chunked_opts();

    lock_sample_drive(drive.path(), &store, &opts);
    let manifest = vault_info(drive.path(), &pw("password123"), &opts.kdf).unwrap();

    let first = drive.path().join(&manifest.chunks[0].name);
    let last = drive
        .path()
        .join(&manifest.chunks[manifest.chunks.len() - 1].name);

    for (path, at_end) in [(first, false), (last, true)] {
        let mut data = std::fs::read(&path).unwrap();
        let idx = if at_end { data.len() - 1 } else { 0 };
        data[idx] ^= 0x80;
        std::fs::write(&path, &data).unwrap();

        let err = decrypt_drive(
            drive.path(),
            "dt",
            &pw("password123"),
            &opts,
            &store,
            &token(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, VaultError::IntegrityFailure(_)));

        // restore the byte for the next round
        data[idx] ^= 0x80;
        std::fs::write(&path, &data).unwrap();
    }
}

#[test]
fn wrong_passphrase_leaves_disk_untouched() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);

    let mut opts = chunked_opts();
    opts.use_chunks = false;

    std::fs::write(drive.path().join("a.txt"), b"hello").unwrap();
    encrypt_drive(drive.path(), "dw", &pw("password123"), &opts, &store, &token(), None).unwrap();

    let before: HashSet<String> = std::fs::read_dir(drive.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .collect();

    let err = decrypt_drive(
        drive.path(),
        "dw",
        &pw("password124"),
        &opts,
        &store,
        &token(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, VaultError::WrongPassword));
    assert!(!store.has("dw"), "no session on failed decryption");

    let after: HashSet<String> = std::fs::read_dir(drive.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .collect();
    assert_eq!(before, after, "failed decryption must not change the drive");
    assert!(!drive.path().join("a.txt").exists());
}

#[test]
fn missing_chunk_refuses_before_any_plaintext() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);
    let opts = chunked_opts();

    lock_sample_drive(drive.path(), &store, &opts);
    let manifest = vault_info(drive.path(), &pw("password123"), &opts.kdf).unwrap();

    std::fs::remove_file(drive.path().join(&manifest.chunks[1].name)).unwrap();

    let err = decrypt_drive(
        drive.path(),
        "dt",
        &pw("password123"),
        &opts,
        &store,
        &token(),
        None,
    )
    .unwrap_err();

    assert!(matches!(err, VaultError::CorruptVault(_)));
    assert!(!drive.path().join("blob.bin").exists(), "no plaintext written");
    assert!(drive.path().join(".sys").exists());
}

#[test]
fn repeated_encryption_is_never_deterministic() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);
    let opts = chunked_opts();

    std::fs::write(drive.path().join("fixed.bin"), vec![0xABu8; 3 * 1024 * 1024]).unwrap();
    encrypt_drive(drive.path(), "dr", &pw("password123"), &opts, &store, &token(), None).unwrap();

    let manifest_a = vault_info(drive.path(), &pw("password123"), &opts.kdf).unwrap();
    let sealed_manifest_a = std::fs::read(drive.path().join(".sys")).unwrap();
    let names_a: HashSet<String> = manifest_a.chunks.iter().map(|c| c.name.clone()).collect();

    decrypt_drive(drive.path(), "dr", &pw("password123"), &opts, &store, &token(), None).unwrap();
    encrypt_drive(drive.path(), "dr", &pw("password123"), &opts, &store, &token(), None).unwrap();

    let manifest_b = vault_info(drive.path(), &pw("password123"), &opts.kdf).unwrap();
    let sealed_manifest_b = std::fs::read(drive.path().join(".sys")).unwrap();
    let names_b: HashSet<String> = manifest_b.chunks.iter().map(|c| c.name.clone()).collect();

    assert_ne!(manifest_a.salt, manifest_b.salt, "manifest salts must differ");
    assert_ne!(
        sealed_manifest_a[1..33],
        sealed_manifest_b[1..33],
        "envelope salts must differ"
    );
    assert!(
        names_a.is_disjoint(&names_b),
        "chunk names must be freshly drawn: {names_a:?} vs {names_b:?}"
    );
}

#[test]
fn truncated_manifest_is_wrong_password_shaped() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);

    let mut opts = chunked_opts();
    opts.use_chunks = false;
    std::fs::write(drive.path().join("a.txt"), b"hello").unwrap();
    encrypt_drive(drive.path(), "dm", &pw("password123"), &opts, &store, &token(), None).unwrap();

    let sealed = std::fs::read(drive.path().join(".sys")).unwrap();
    std::fs::write(drive.path().join(".sys"), &sealed[..sealed.len() / 2]).unwrap();

    let err = decrypt_drive(
        drive.path(),
        "dm",
        &pw("password123"),
        &opts,
        &store,
        &token(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, VaultError::WrongPassword));
}

#[test]
fn encrypting_a_locked_drive_is_refused() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);
    let mut opts = chunked_opts();
    opts.use_chunks = false;

    std::fs::write(drive.path().join("a.txt"), b"hello").unwrap();
    encrypt_drive(drive.path(), "dl", &pw("password123"), &opts, &store, &token(), None).unwrap();

    std::fs::write(drive.path().join("late.txt"), b"appeared later").unwrap();
    let err = encrypt_drive(
        drive.path(),
        "dl",
        &pw("password123"),
        &opts,
        &store,
        &token(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, VaultError::CorruptVault(_)));
}
