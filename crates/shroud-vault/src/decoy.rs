//! Decoy files: camouflage noise around the real chunks
//!
//! Decoys are hidden files full of uniformly random bytes, named from a
//! vocabulary of plausible system litter. They are never referenced from the
//! manifest; their only purpose is to raise the ratio of unrelated hidden
//! files to real fragments.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::collections::HashSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use shroud_core::{VaultError, VaultResult};

use crate::exclude::EXCLUDE_FILE;
use crate::manifest::MANIFEST_FILE;
use crate::wipe;

/// Decoy body size bounds (inclusive lower, exclusive upper).
pub const MIN_DECOY_SIZE: usize = 1024;
pub const MAX_DECOY_SIZE: usize = 1024 * 1024;

const DECOY_PREFIXES: &[&str] = &[
    "sys", "tmp", "cache", "data", "log", "db", "idx", "bak", "cfg", "inf", "dat", "bin", "lib",
    "obj", "res", "pkg", "mod", "ref", "lnk", "ptr", "buf", "stk", "heap", "mem", "reg", "vol",
    "sec", "key", "sig", "crt", "pub", "prv", "enc", "dec", "hash", "chk", "sum", "crc", "md5",
    "sha", "aes", "rsa", "dsa", "ecdsa", "hmac", "kdf", "pbkdf", "init", "boot", "kern", "drv",
    "svc", "proc", "thrd", "sock", "pipe", "fifo", "shm", "sem", "mtx", "evt",
];

const DECOY_EXTENSIONS: &[&str] = &[
    "", "dat", "bin", "sys", "tmp", "bak", "old", "new", "0", "1", "2", "db", "idx", "log", "cache",
];

/// Generate `count` unique decoy names (without the leading dot they get on
/// disk).
pub fn generate_decoy_names(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut names = HashSet::with_capacity(count);

    while names.len() < count {
        let prefix = DECOY_PREFIXES.choose(&mut rng).expect("non-empty prefixes");
        let ext = DECOY_EXTENSIONS
            .choose(&mut rng)
            .expect("non-empty extensions");

        let hex_len = rng.gen_range(4..12usize);
        let mut buf = vec![0u8; hex_len];
        rng.fill_bytes(&mut buf);
        let middle = hex::encode(buf);

        let name = if ext.is_empty() {
            format!("{prefix}_{middle}")
        } else {
            format!("{prefix}_{middle}.{ext}")
        };
        names.insert(name);
    }

    names.into_iter().collect()
}

/// Write `count` decoy files onto the drive root as hidden files with random
/// contents of 1 KiB – 1 MiB. Returns the names actually written.
pub fn write_decoys(
    root: &Path,
    count: usize,
    cancel: &CancellationToken,
) -> VaultResult<Vec<String>> {
    let mut rng = rand::thread_rng();
    let mut written = Vec::with_capacity(count);

    for name in generate_decoy_names(count) {
        if cancel.is_cancelled() {
            for prior in &written {
                let _ = std::fs::remove_file(root.join(format!(".{prior}")));
            }
            return Err(VaultError::Cancelled);
        }

        let size = rng.gen_range(MIN_DECOY_SIZE..MAX_DECOY_SIZE);
        let mut body = vec![0u8; size];
        rng.fill_bytes(&mut body);

        std::fs::write(root.join(format!(".{name}")), &body)?;
        written.push(name);
    }

    debug!(count = written.len(), "wrote decoys");
    Ok(written)
}

/// Remove every dot-hidden file on the drive root except the manifest and the
/// user-maintained exclusion file. Decoys and the single-blob vault file all
/// live behind a leading dot, so this is the cleanup half of decryption.
pub fn remove_hidden_artifacts(
    root: &Path,
    secure: bool,
    cancel: &CancellationToken,
) -> VaultResult<()> {
    for entry in std::fs::read_dir(root)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        if name == MANIFEST_FILE || name == EXCLUDE_FILE {
            continue;
        }
        if !name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        if secure {
            wipe::secure_delete(&path, cancel)?;
        } else {
            wipe::plain_delete(&path)?;
        }
    }
    Ok(())
}

/// Count hidden files that are not the manifest (decoys plus vault files).
pub fn count_decoy_files(root: &Path) -> usize {
    std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| {
                    e.file_name()
                        .to_str()
                        .is_some_and(|n| n.starts_with('.') && n != MANIFEST_FILE)
                })
                .count()
        })
        .unwrap_or(0)
}
