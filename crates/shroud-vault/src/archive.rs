//! Plaintext scan and tar+gzip packing
//!
//! `scan` walks the drive root and selects the files a vault operation will
//! cover: anything not hidden (names starting with `.`, `~`, or `$`) and not
//! excluded. `create_archive` packs the selection into one gzip-compressed
//! tar stream with root-relative entry names; `extract_archive` reverses it.
//! Neither step encrypts — that is the pipeline's job.
//!
//! Bad individual entries are skipped with a warning rather than failing the
//! whole operation; a removable drive with one unreadable file should still
//! lock.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use shroud_core::{ProgressFn, VaultError, VaultResult};

use crate::exclude::ExclusionSet;

/// One file selected by `scan`, addressed relative to the drive root.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: PathBuf,
    pub size: u64,
}

/// Names the vault machinery treats as hidden (and therefore never archives).
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('~') || name.starts_with('$')
}

/// Walk `root` and collect every non-hidden, non-excluded regular file.
///
/// Hidden or excluded directories are skipped whole. Cancellation is observed
/// per directory entry.
pub fn scan(
    root: &Path,
    exclusions: &ExclusionSet,
    cancel: &CancellationToken,
) -> VaultResult<Vec<ScannedFile>> {
    let mut files = Vec::new();
    scan_dir(root, root, exclusions, cancel, &mut files)?;
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn scan_dir(
    root: &Path,
    dir: &Path,
    exclusions: &ExclusionSet,
    cancel: &CancellationToken,
    out: &mut Vec<ScannedFile>,
) -> VaultResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(dir = %dir.display(), "skipping unreadable directory: {e}");
            return Ok(());
        }
    };

    for entry in entries {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }

        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), "skipping unreadable entry: {e}");
                continue;
            }
        };

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            warn!(dir = %dir.display(), "skipping non-UTF-8 name");
            continue;
        };
        if is_hidden_name(name) {
            continue;
        }

        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let rel_str = rel.to_string_lossy().replace('\\', "/");

        if exclusions.matches(&rel_str, name) {
            debug!(path = %rel_str, "excluded");
            continue;
        }

        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %rel_str, "skipping unstattable entry: {e}");
                continue;
            }
        };

        if meta.is_dir() {
            scan_dir(root, &path, exclusions, cancel, out)?;
        } else if meta.is_file() {
            out.push(ScannedFile {
                rel_path: rel,
                size: meta.len(),
            });
        }
    }
    Ok(())
}

/// Pack `files` into a gzip-compressed tar stream at `archive_path`.
pub fn create_archive(
    root: &Path,
    files: &[ScannedFile],
    archive_path: &Path,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
    total_size: u64,
) -> VaultResult<()> {
    let out = File::create(archive_path)?;
    let encoder = GzEncoder::new(out, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut processed = 0u64;
    for file in files {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }

        let full = root.join(&file.rel_path);
        if let Err(e) = builder.append_path_with_name(&full, &file.rel_path) {
            warn!(path = %file.rel_path.display(), "skipping unarchivable file: {e}");
            continue;
        }

        processed += file.size;
        if let Some(cb) = progress {
            cb(processed, total_size, "archiving");
        }
    }

    let encoder = builder.into_inner()?;
    let file = encoder.finish()?;
    file.sync_all()?;
    Ok(())
}

/// Unpack a gzip-compressed tar stream into `dest`, creating parent
/// directories as needed. Entries that would escape `dest` are refused by the
/// tar layer; other bad entries are skipped.
pub fn extract_archive(
    archive_path: &Path,
    dest: &Path,
    cancel: &CancellationToken,
) -> VaultResult<()> {
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries()? {
        if cancel.is_cancelled() {
            return Err(VaultError::Cancelled);
        }

        let mut entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(archive = %archive_path.display(), "skipping bad tar entry: {e}");
                continue;
            }
        };

        if let Err(e) = entry.unpack_in(dest) {
            let path = entry.path().map(|p| p.display().to_string());
            warn!(entry = ?path, "skipping unextractable entry: {e}");
        }
    }
    Ok(())
}
