//! Overwrite-then-unlink deletion
//!
//! Three passes of fresh random data, a final zero-fill, a rename to a random
//! sibling name, then unlink. Each pass is flushed to the device before the
//! next begins. On journaled or copy-on-write filesystems (ext4 in
//! data=journal mode, btrfs, APFS) prior content may survive in the journal
//! or in old extents; the overwrite is a best effort against casual recovery
//! tools, not a forensic guarantee.

use rand::RngCore;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zeroize::Zeroize;

use shroud_core::{VaultError, VaultResult};

/// Overwrite passes with random data before the zero pass.
pub const WIPE_PASSES: usize = 3;

const WIPE_BLOCK: usize = 1024 * 1024;

/// Securely delete a file or directory tree.
///
/// A missing path is a silent success. If the file cannot be opened for
/// writing (read-only media, permission oddities) the overwrite is skipped
/// and the file is plainly unlinked; this fallback is logged but does not
/// raise an error. Cancellation is observed between passes.
pub fn secure_delete(path: &Path, cancel: &CancellationToken) -> VaultResult<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if meta.is_dir() {
        return secure_delete_dir(path, cancel);
    }

    let len = meta.len();

    let mut file = match OpenOptions::new().write(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), "cannot open for overwrite, unlinking plainly: {e}");
            return plain_delete(path);
        }
    };

    let mut buf = vec![0u8; WIPE_BLOCK];
    for _pass in 0..WIPE_PASSES {
        if cancel.is_cancelled() {
            buf.zeroize();
            return Err(VaultError::Cancelled);
        }
        overwrite_once(&mut file, len, &mut buf, true)?;
    }
    overwrite_once(&mut file, len, &mut buf, false)?;
    buf.zeroize();
    drop(file);

    // Scrub the name from the directory entry as well.
    let mut suffix = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut suffix);
    let scrambled = path.with_file_name(format!(".{}", hex::encode(suffix)));
    let target = match std::fs::rename(path, &scrambled) {
        Ok(()) => scrambled,
        Err(_) => path.to_path_buf(),
    };
    std::fs::remove_file(&target)?;

    debug!(path = %path.display(), bytes = len, "wiped");
    Ok(())
}

fn overwrite_once(
    file: &mut std::fs::File,
    len: u64,
    buf: &mut [u8],
    random: bool,
) -> VaultResult<()> {
    file.seek(SeekFrom::Start(0))?;

    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(buf.len() as u64) as usize;
        if random {
            rand::thread_rng().fill_bytes(&mut buf[..n]);
        } else {
            buf[..n].fill(0);
        }
        file.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    file.sync_all()?;
    Ok(())
}

fn secure_delete_dir(path: &Path, cancel: &CancellationToken) -> VaultResult<()> {
    for entry in std::fs::read_dir(path)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %path.display(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        secure_delete(&entry.path(), cancel)?;
    }
    std::fs::remove_dir(path)?;
    Ok(())
}

/// Unlink without overwriting. A missing path is a silent success.
pub fn plain_delete(path: &Path) -> VaultResult<()> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Zero a buffer in place.
pub fn wipe_buffer(buf: &mut [u8]) {
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn deletes_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("victim.bin");
        std::fs::write(&path, vec![0xAA; 4096]).unwrap();

        secure_delete(&path, &token()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_silent_success() {
        let tmp = tempfile::TempDir::new().unwrap();
        secure_delete(&tmp.path().join("never-existed"), &token()).unwrap();
    }

    #[test]
    fn empty_file_deleted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        secure_delete(&path, &token()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn recurses_into_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("nest");
        std::fs::create_dir_all(dir.join("deeper")).unwrap();
        std::fs::write(dir.join("a.txt"), b"one").unwrap();
        std::fs::write(dir.join("deeper/b.txt"), b"two").unwrap();

        secure_delete(&dir, &token()).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn cancelled_token_aborts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("victim.bin");
        std::fs::write(&path, vec![0x55; 1024]).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = secure_delete(&path, &cancel).unwrap_err();
        assert!(matches!(err, VaultError::Cancelled));
        assert!(path.exists(), "cancelled wipe must not unlink");
    }

    #[test]
    fn wipe_buffer_zeroes() {
        let mut buf = vec![0xFFu8; 64];
        wipe_buffer(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
