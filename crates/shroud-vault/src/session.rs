//! Passphrase sessions keyed by drive identity
//!
//! A session is created on successful decryption and cleared on successful
//! encryption, so re-locking a drive needs either the passphrase or a live
//! session. In memory the passphrase lives in a `SecretString` (zeroized on
//! drop). At rest it is sealed with AES-256-GCM under a key derived from the
//! machine key — an HMAC of hostname and config directory under a fixed
//! label. That binds persisted sessions to this machine: the config file is
//! useless when copied elsewhere.
//!
//! The machine key itself is a process-lifetime constant and is intentionally
//! not zeroized; destroying it would break every later session operation in
//! the same process. The per-operation AES key derived from it is zeroized by
//! drop.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::SystemTime;
use tracing::{debug, warn};
use zeroize::Zeroize;

use shroud_core::{ConfigStore, VaultError, VaultResult};
use shroud_crypto::envelope::{open_raw, seal_raw};
use shroud_crypto::kdf::{derive_key_fast, KeyMaterial};
use shroud_crypto::mac::hmac256;

const MACHINE_KEY_LABEL: &[u8] = b"shroud-machine-v1";
const SESSION_KEY_SECRET: &[u8] = b"shroud-session-v1";
const AT_REST_SALT_LEN: usize = 16;

/// Derive the 16-character drive identity from stable mount attributes.
///
/// Not a secret and never mixed into data keys; it is only the map key under
/// which a session is cached.
pub fn drive_identity(mountpoint: &str, device: &str) -> String {
    let tag = hmac256(format!("{mountpoint}{device}").as_bytes(), b"drive_id");
    hex::encode(tag)[..16].to_string()
}

fn machine_key() -> &'static [u8; 32] {
    static KEY: OnceLock<[u8; 32]> = OnceLock::new();
    KEY.get_or_init(|| {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "local".into());
        let entropy = format!("{host}{}", shroud_core::config_dir().display());
        hmac256(entropy.as_bytes(), MACHINE_KEY_LABEL)
    })
}

fn session_key() -> VaultResult<KeyMaterial> {
    derive_key_fast(SESSION_KEY_SECRET, machine_key())
        .map_err(|e| VaultError::Crypto(e.to_string()))
}

fn encrypt_session_passphrase(passphrase: &SecretString) -> VaultResult<String> {
    let key = session_key()?;

    let mut salt = [0u8; AT_REST_SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut plaintext = Vec::with_capacity(AT_REST_SALT_LEN + passphrase.expose_secret().len());
    plaintext.extend_from_slice(&salt);
    plaintext.extend_from_slice(passphrase.expose_secret().as_bytes());

    let sealed = seal_raw(&plaintext, &key).map_err(|e| VaultError::Crypto(e.to_string()));
    plaintext.zeroize();

    Ok(BASE64.encode(sealed?))
}

fn decrypt_session_passphrase(at_rest: &str) -> VaultResult<SecretString> {
    let data = BASE64
        .decode(at_rest)
        .map_err(|e| VaultError::Crypto(format!("session ciphertext encoding: {e}")))?;

    let key = session_key()?;
    let mut plaintext = open_raw(&data, &key).map_err(|_| VaultError::Crypto("session ciphertext rejected".into()))?;

    if plaintext.len() < AT_REST_SALT_LEN {
        plaintext.zeroize();
        return Err(VaultError::Crypto("session ciphertext too short".into()));
    }

    let pw = String::from_utf8(plaintext[AT_REST_SALT_LEN..].to_vec())
        .map_err(|_| VaultError::Crypto("session passphrase not UTF-8".into()));
    plaintext.zeroize();

    Ok(SecretString::from(pw?))
}

fn copy_secret(s: &SecretString) -> SecretString {
    SecretString::from(s.expose_secret().to_string())
}

struct Session {
    passphrase: SecretString,
    drive_path: PathBuf,
    at_rest: String,
    created_at: SystemTime,
    last_used: SystemTime,
}

/// Snapshot of one cached session for shell display.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub drive_id: String,
    pub drive_path: PathBuf,
    pub created_at: SystemTime,
    pub last_used: SystemTime,
}

/// The in-memory session map plus its persisted mirror in the config file.
///
/// All mutation paths — including the `last_used` refresh on a hit — take the
/// writer lock directly rather than upgrading a read lock, and no path holds
/// the lock across the KDF or file I/O.
pub struct SessionStore {
    config: Arc<ConfigStore>,
    inner: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Cache a passphrase for a drive and persist its at-rest form.
    pub fn set(&self, drive_id: &str, drive_path: &Path, passphrase: &SecretString) -> VaultResult<()> {
        let at_rest = encrypt_session_passphrase(passphrase)?;
        let now = SystemTime::now();

        {
            let mut map = self.inner.write().expect("session lock poisoned");
            map.insert(
                drive_id.to_string(),
                Session {
                    passphrase: copy_secret(passphrase),
                    drive_path: drive_path.to_path_buf(),
                    at_rest: at_rest.clone(),
                    created_at: now,
                    last_used: now,
                },
            );
        }

        self.config.update(|cfg| {
            cfg.sessions.insert(drive_id.to_string(), at_rest);
        })?;

        debug!(drive_id, "session installed");
        Ok(())
    }

    /// Fetch the cached passphrase, refreshing `last_used` on a hit. A miss
    /// falls back to the persisted map; decrypting that happens outside the
    /// session lock, with a re-check before insertion.
    pub fn get(&self, drive_id: &str) -> Option<SecretString> {
        {
            let mut map = self.inner.write().expect("session lock poisoned");
            if let Some(session) = map.get_mut(drive_id) {
                session.last_used = SystemTime::now();
                return Some(copy_secret(&session.passphrase));
            }
        }

        let at_rest = self.config.snapshot().sessions.get(drive_id).cloned()?;
        let passphrase = match decrypt_session_passphrase(&at_rest) {
            Ok(pw) => pw,
            Err(e) => {
                warn!(drive_id, "persisted session unusable: {e}");
                return None;
            }
        };

        let mut map = self.inner.write().expect("session lock poisoned");
        let session = map.entry(drive_id.to_string()).or_insert_with(|| Session {
            passphrase,
            drive_path: PathBuf::new(),
            at_rest,
            created_at: SystemTime::now(),
            last_used: SystemTime::now(),
        });
        session.last_used = SystemTime::now();
        Some(copy_secret(&session.passphrase))
    }

    pub fn has(&self, drive_id: &str) -> bool {
        if self
            .inner
            .read()
            .expect("session lock poisoned")
            .contains_key(drive_id)
        {
            return true;
        }
        self.config.snapshot().sessions.contains_key(drive_id)
    }

    /// Drop a drive's session from memory and from the persisted map.
    pub fn clear(&self, drive_id: &str) -> VaultResult<()> {
        self.inner
            .write()
            .expect("session lock poisoned")
            .remove(drive_id);
        self.config.update(|cfg| {
            cfg.sessions.remove(drive_id);
        })
    }

    pub fn clear_all(&self) -> VaultResult<()> {
        self.inner.write().expect("session lock poisoned").clear();
        self.config.update(|cfg| cfg.sessions.clear())
    }

    /// Decrypt every persisted session into memory. Entries sealed on another
    /// machine fail to open and are skipped.
    pub fn load_from_config(&self) -> usize {
        let persisted = self.config.snapshot().sessions;
        let mut loaded = 0;

        for (drive_id, at_rest) in persisted {
            let Ok(passphrase) = decrypt_session_passphrase(&at_rest) else {
                warn!(drive_id, "skipping foreign or corrupt persisted session");
                continue;
            };
            let mut map = self.inner.write().expect("session lock poisoned");
            map.entry(drive_id).or_insert_with(|| Session {
                passphrase,
                drive_path: PathBuf::new(),
                at_rest,
                created_at: SystemTime::now(),
                last_used: SystemTime::now(),
            });
            loaded += 1;
        }
        loaded
    }

    pub fn infos(&self) -> Vec<SessionInfo> {
        self.inner
            .read()
            .expect("session lock poisoned")
            .iter()
            .map(|(id, s)| SessionInfo {
                drive_id: id.clone(),
                drive_path: s.drive_path.clone(),
                created_at: s.created_at,
                last_used: s.last_used,
            })
            .collect()
    }

    /// The at-rest map (drive id → ciphertext) for backup tooling.
    pub fn export(&self) -> BTreeMap<String, String> {
        self.inner
            .read()
            .expect("session lock poisoned")
            .iter()
            .map(|(id, s)| (id.clone(), s.at_rest.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Arc::new(ConfigStore::open(tmp.path().join("shroud.toml")).unwrap());
        (tmp, SessionStore::new(config))
    }

    fn pw(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn drive_identity_is_16_hex_and_stable() {
        let a = drive_identity("/media/usb0", "/dev/sdb1");
        let b = drive_identity("/media/usb0", "/dev/sdb1");
        let c = drive_identity("/media/usb1", "/dev/sdc1");

        assert_eq!(a.len(), 16);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn at_rest_roundtrip() {
        let sealed = encrypt_session_passphrase(&pw("correct horse battery staple")).unwrap();
        let opened = decrypt_session_passphrase(&sealed).unwrap();
        assert_eq!(opened.expose_secret(), "correct horse battery staple");
    }

    #[test]
    fn at_rest_ciphertexts_are_salted() {
        let a = encrypt_session_passphrase(&pw("password123")).unwrap();
        let b = encrypt_session_passphrase(&pw("password123")).unwrap();
        assert_ne!(a, b, "fresh salt and nonce per encryption");
    }

    #[test]
    fn tampered_at_rest_rejected() {
        let sealed = encrypt_session_passphrase(&pw("password123")).unwrap();
        let mut raw = BASE64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 1;

        assert!(decrypt_session_passphrase(&BASE64.encode(raw)).is_err());
    }

    #[test]
    fn set_get_clear_lifecycle() {
        let (_tmp, store) = store();

        assert!(store.get("drive01").is_none());
        assert!(!store.has("drive01"));

        store
            .set("drive01", Path::new("/media/usb0"), &pw("password123"))
            .unwrap();

        assert!(store.has("drive01"));
        let fetched = store.get("drive01").unwrap();
        assert_eq!(fetched.expose_secret(), "password123");

        store.clear("drive01").unwrap();
        assert!(!store.has("drive01"));
        assert!(store.get("drive01").is_none());
    }

    #[test]
    fn sessions_survive_store_restart() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config_path = tmp.path().join("shroud.toml");

        {
            let config = Arc::new(ConfigStore::open(&config_path).unwrap());
            let store = SessionStore::new(config);
            store
                .set("drive01", Path::new("/media/usb0"), &pw("password123"))
                .unwrap();
        }

        let config = Arc::new(ConfigStore::open(&config_path).unwrap());
        let store = SessionStore::new(config);

        // cold map, warm persisted mirror
        let fetched = store.get("drive01").expect("persisted session should load");
        assert_eq!(fetched.expose_secret(), "password123");
    }

    #[test]
    fn load_from_config_populates_map() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config_path = tmp.path().join("shroud.toml");

        {
            let config = Arc::new(ConfigStore::open(&config_path).unwrap());
            let store = SessionStore::new(config);
            store.set("a", Path::new("/m/a"), &pw("passphrase-a")).unwrap();
            store.set("b", Path::new("/m/b"), &pw("passphrase-b")).unwrap();
        }

        let config = Arc::new(ConfigStore::open(&config_path).unwrap());
        let store = SessionStore::new(config);
        assert_eq!(store.load_from_config(), 2);
        assert_eq!(store.infos().len(), 2);
    }

    #[test]
    fn clear_all_empties_memory_and_config() {
        let (_tmp, store) = store();
        store.set("a", Path::new("/m/a"), &pw("passphrase-a")).unwrap();
        store.set("b", Path::new("/m/b"), &pw("passphrase-b")).unwrap();

        store.clear_all().unwrap();

        assert!(!store.has("a"));
        assert!(!store.has("b"));
        assert!(store.export().is_empty());
        assert!(store.config.snapshot().sessions.is_empty());
    }
}
