//! Per-user configuration (loaded from shroud.toml)
//!
//! The config file lives in the user config directory and carries everything
//! the engine needs between runs: encryption knobs, decoy and chunking policy,
//! the persisted session map (drive id → at-rest ciphertext), and the
//! process-wide exclusion list. All fields default sensibly so a missing or
//! partial file still parses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShroudConfig {
    /// UI language tag (consumed by the shell, not the engine)
    pub language: String,
    /// UI theme tag (consumed by the shell, not the engine)
    pub theme: String,
    /// Auto-lock timeout in minutes (0 disables)
    pub auto_lock_minutes: u64,
    /// Overwrite originals before unlinking
    pub secure_wipe: bool,
    /// Layer XChaCha20-Poly1305 over AES-256-GCM
    pub double_encrypt: bool,
    /// Panic hotkey spec (consumed by the shell's hotkey listener)
    pub panic_hotkey: String,
    pub panic_enabled: bool,
    /// Scatter random-content decoy files alongside chunks
    pub generate_decoys: bool,
    pub decoy_count: usize,
    /// Split the ciphertext into camouflage-named fragments
    pub use_chunks: bool,
    pub chunk_size_mb: usize,
    /// Chunk size jitter as a percentage of the target size
    pub chunk_variance_percent: u32,
    /// Ask before destructive operations (shell concern)
    pub confirm_actions: bool,
    /// Mountpoint of the drive last operated on
    pub last_drive: String,
    /// drive id → base64 at-rest session ciphertext
    pub sessions: BTreeMap<String, String>,
    /// Process-wide exclusion patterns, unioned with the drive-local file
    pub exclusions: Vec<String>,
}

impl Default for ShroudConfig {
    fn default() -> Self {
        Self {
            language: "en".into(),
            theme: "default".into(),
            auto_lock_minutes: 5,
            secure_wipe: true,
            double_encrypt: true,
            panic_hotkey: "Ctrl+Shift+F12".into(),
            panic_enabled: true,
            generate_decoys: true,
            decoy_count: 100,
            use_chunks: true,
            chunk_size_mb: 16,
            chunk_variance_percent: 20,
            confirm_actions: true,
            last_drive: String::new(),
            sessions: BTreeMap::new(),
            exclusions: Vec::new(),
        }
    }
}

/// The user config directory (`$XDG_CONFIG_HOME/shroud`, falling back to
/// `$HOME/.config/shroud`).
pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            PathBuf::from(home).join(".config")
        })
        .join("shroud")
}

/// Default config file path.
pub fn default_config_path() -> PathBuf {
    config_dir().join("shroud.toml")
}

/// A configuration object coupled to its on-disk file.
///
/// Mutation and persistence go through one lock so concurrent writers cannot
/// interleave a save with a half-applied update. Readers take a cheap
/// snapshot; nobody holds the lock across file I/O except `update`, which is
/// exactly the serialization the session map needs.
pub struct ConfigStore {
    path: PathBuf,
    inner: RwLock<ShroudConfig>,
}

impl ConfigStore {
    /// Open the store at `path`, creating the file with defaults if absent.
    pub fn open(path: impl Into<PathBuf>) -> VaultResult<Self> {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)
                .map_err(|e| VaultError::Other(anyhow::anyhow!("config parse: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = ShroudConfig::default();
                write_config(&path, &config)?;
                config
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            inner: RwLock::new(config),
        })
    }

    /// Open the store at the default per-user location.
    pub fn open_default() -> VaultResult<Self> {
        Self::open(default_config_path())
    }

    /// In-memory store for tests and ephemeral shells; `update` still
    /// persists to the given path.
    pub fn with_config(path: impl Into<PathBuf>, config: ShroudConfig) -> Self {
        Self {
            path: path.into(),
            inner: RwLock::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone of the current configuration.
    pub fn snapshot(&self) -> ShroudConfig {
        self.inner.read().expect("config lock poisoned").clone()
    }

    /// Apply `f` to the configuration and persist the result under the same
    /// lock acquisition.
    pub fn update<F>(&self, f: F) -> VaultResult<()>
    where
        F: FnOnce(&mut ShroudConfig),
    {
        let mut guard = self.inner.write().expect("config lock poisoned");
        f(&mut guard);
        write_config(&self.path, &guard)
    }

    /// Add an exclusion pattern if it is not already present.
    pub fn add_exclusion(&self, pattern: &str) -> VaultResult<()> {
        self.update(|cfg| {
            if !cfg.exclusions.iter().any(|e| e == pattern) {
                cfg.exclusions.push(pattern.to_string());
            }
        })
    }

    /// Remove an exclusion pattern.
    pub fn remove_exclusion(&self, pattern: &str) -> VaultResult<()> {
        self.update(|cfg| cfg.exclusions.retain(|e| e != pattern))
    }
}

fn write_config(path: &Path, config: &ShroudConfig) -> VaultResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(config)
        .map_err(|e| VaultError::Other(anyhow::anyhow!("config serialize: {e}")))?;
    std::fs::write(path, text)?;
    // The session map is sensitive at rest even though it is encrypted.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}
