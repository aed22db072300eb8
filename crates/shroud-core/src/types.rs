use std::time::{SystemTime, UNIX_EPOCH};

/// Progress callback type (units done, units total, stage token).
///
/// Stage tokens are short untranslated strings ("archiving", "encrypting",
/// "reading_chunks", "decrypting", "extracting", "wiping", "done"); rendering
/// and translation are the shell's job.
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Where a drive sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No manifest on the drive root
    Plain,
    /// Manifest present — contents are ciphertext
    Locked,
    /// No manifest, but a cached session exists for the drive
    Open,
}

/// Seconds since the Unix epoch, saturating at zero on clock skew.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
