//! shroud-vault: the deceptive-vault engine
//!
//! Forward pipeline: scan → tar+gzip → envelope-encrypt → chunk under
//! camouflage names → decoys → encrypted manifest → wipe originals.
//! Inverse pipeline: decrypt manifest → verify every chunk MAC → reassemble →
//! decrypt → extract → remove vault artifacts → install session.
//!
//! The drive state machine this engine drives:
//! ```text
//! Plain  --encrypt_drive-->  Locked
//! Locked --decrypt_drive-->  Open      (session installed)
//! Open   --encrypt_drive / quick_encrypt--> Locked (session cleared)
//! any    --erase_vault-->    Plain
//! ```

pub mod archive;
pub mod autolock;
pub mod chunker;
pub mod decoy;
pub mod exclude;
pub mod manifest;
pub mod panic;
pub mod pipeline;
pub mod session;
pub mod wipe;

pub use archive::{create_archive, extract_archive, scan, ScannedFile};
pub use autolock::AutoLock;
pub use chunker::{chunk_mac_key, read_chunks, write_chunks, ChunkPolicy};
pub use exclude::{ExclusionSet, EXCLUDE_FILE};
pub use manifest::{ChunkRecord, VaultManifest, MANIFEST_FILE};
pub use panic::{panic_encrypt_all, OpenDrive, PanicLatch};
pub use pipeline::{
    change_password, decrypt_drive, encrypt_drive, erase_vault, is_vault_present, quick_encrypt,
    vault_info, vault_state, VaultOptions,
};
pub use session::{drive_identity, SessionInfo, SessionStore};
pub use wipe::{secure_delete, wipe_buffer};
