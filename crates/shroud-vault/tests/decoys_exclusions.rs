//! Decoy generation, exclusion handling, and vault erasure end to end.

use secrecy::SecretString;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use shroud_core::{ConfigStore, VaultState};
use shroud_crypto::kdf::KdfParams;
use shroud_vault::pipeline::{
    decrypt_drive, encrypt_drive, erase_vault, vault_info, vault_state, VaultOptions,
};
use shroud_vault::session::SessionStore;

fn fast_kdf() -> KdfParams {
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
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

fn hidden_count(root: &Path) -> usize {
    std::fs::read_dir(root)
        .unwrap()
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|n| n.starts_with('.') || n.starts_with('~') || n.starts_with('$'))
        .count()
}

#[test]
fn decoys_scattered_and_exclusions_honored() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);

    std::fs::create_dir_all(drive.path().join("secret")).unwrap();
    std::fs::create_dir_all(drive.path().join("tmp")).unwrap();
    std::fs::write(drive.path().join("a.txt"), b"covered").unwrap();
    std::fs::write(drive.path().join("secret/b.txt"), b"stays put").unwrap();
    std::fs::write(drive.path().join("tmp/c.log"), b"log line").unwrap();

    let opts = VaultOptions {
        double_encrypt: false,
        secure_wipe: false,
        use_chunks: true,
        chunk_size_mb: 1,
        chunk_variance_percent: 20,
        generate_decoys: true,
        decoy_count: 10,
        kdf: fast_kdf(),
        exclusions: vec!["*.log".to_string(), "secret/".to_string()],
    };

    encrypt_drive(drive.path(), "d6", &pw("password123"), &opts, &store, &token(), None).unwrap();

    let manifest = vault_info(drive.path(), &pw("password123"), &opts.kdf).unwrap();
    assert_eq!(manifest.file_count, 1, "scan must select only a.txt");
    assert!(manifest.has_decoys);

    // decoys + chunks + manifest are all present and hidden
    assert!(hidden_count(drive.path()) >= 10 + manifest.total_chunks + 1);
    assert!(!drive.path().join("a.txt").exists());
    assert_eq!(
        std::fs::read(drive.path().join("secret/b.txt")).unwrap(),
        b"stays put",
        "excluded files are not wiped"
    );
    assert_eq!(std::fs::read(drive.path().join("tmp/c.log")).unwrap(), b"log line");

    decrypt_drive(drive.path(), "d6", &pw("password123"), &opts, &store, &token(), None).unwrap();

    assert_eq!(std::fs::read(drive.path().join("a.txt")).unwrap(), b"covered");
    assert_eq!(
        std::fs::read(drive.path().join("secret/b.txt")).unwrap(),
        b"stays put"
    );
    assert_eq!(std::fs::read(drive.path().join("tmp/c.log")).unwrap(), b"log line");
    assert_eq!(hidden_count(drive.path()), 0, "decoys removed with the vault");
}

#[test]
fn drive_local_exclusion_file_is_honored() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);

    std::fs::write(drive.path().join("keep.iso"), vec![5u8; 2048]).unwrap();
    std::fs::write(drive.path().join("take.txt"), b"vaulted").unwrap();
    shroud_vault::exclude::write_exclude_template(drive.path(), &["*.iso".to_string()]).unwrap();

    let opts = VaultOptions {
        double_encrypt: false,
        secure_wipe: false,
        use_chunks: false,
        chunk_size_mb: 1,
        chunk_variance_percent: 0,
        generate_decoys: false,
        decoy_count: 0,
        kdf: fast_kdf(),
        exclusions: Vec::new(),
    };

    encrypt_drive(drive.path(), "dx", &pw("password123"), &opts, &store, &token(), None).unwrap();

    assert!(drive.path().join("keep.iso").exists());
    assert!(!drive.path().join("take.txt").exists());

    let manifest = vault_info(drive.path(), &pw("password123"), &opts.kdf).unwrap();
    assert_eq!(manifest.file_count, 1);

    decrypt_drive(drive.path(), "dx", &pw("password123"), &opts, &store, &token(), None).unwrap();
    assert_eq!(std::fs::read(drive.path().join("take.txt")).unwrap(), b"vaulted");
    assert!(
        drive.path().join(".shroud.exclude").exists(),
        "user exclusion file survives decryption"
    );
}

#[test]
fn empty_scan_refuses_to_encrypt() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);

    // only hidden litter on the drive
    std::fs::write(drive.path().join(".DS_Store"), b"junk").unwrap();

    let opts = VaultOptions {
        double_encrypt: false,
        secure_wipe: false,
        use_chunks: false,
        chunk_size_mb: 1,
        chunk_variance_percent: 0,
        generate_decoys: false,
        decoy_count: 0,
        kdf: fast_kdf(),
        exclusions: Vec::new(),
    };

    let err = encrypt_drive(
        drive.path(),
        "de",
        &pw("password123"),
        &opts,
        &store,
        &token(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, shroud_core::VaultError::NothingToEncrypt));
}

#[test]
fn erase_removes_all_hidden_files_and_session() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);

    std::fs::write(drive.path().join("a.txt"), b"plaintext").unwrap();
    std::fs::write(drive.path().join("visible.md"), b"also plaintext").unwrap();

    let opts = VaultOptions {
        double_encrypt: false,
        secure_wipe: false,
        use_chunks: true,
        chunk_size_mb: 1,
        chunk_variance_percent: 20,
        generate_decoys: true,
        decoy_count: 5,
        kdf: fast_kdf(),
        exclusions: Vec::new(),
    };

    encrypt_drive(drive.path(), "dz", &pw("password123"), &opts, &store, &token(), None).unwrap();
    decrypt_drive(drive.path(), "dz", &pw("password123"), &opts, &store, &token(), None).unwrap();
    assert!(store.has("dz"));

    // re-lock, then blow the vault away without the passphrase
    encrypt_drive(drive.path(), "dz", &pw("password123"), &opts, &store, &token(), None).unwrap();
    assert!(hidden_count(drive.path()) > 0);

    erase_vault(drive.path(), "dz", true, &store, &token()).unwrap();

    assert_eq!(hidden_count(drive.path()), 0, "no hidden files after erase");
    assert!(!store.has("dz"));
    assert_eq!(vault_state(drive.path(), "dz", &store), VaultState::Plain);
}

#[test]
fn erase_on_plain_drive_is_harmless() {
    let drive = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    let store = sessions(&cfg);

    std::fs::write(drive.path().join("untouched.txt"), b"still here").unwrap();

    erase_vault(drive.path(), "dp", false, &store, &token()).unwrap();

    assert_eq!(
        std::fs::read(drive.path().join("untouched.txt")).unwrap(),
        b"still here"
    );
    assert_eq!(vault_state(drive.path(), "dp", &store), VaultState::Plain);
}
