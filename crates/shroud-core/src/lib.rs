pub mod config;
pub mod error;
pub mod types;

pub use config::{config_dir, default_config_path, ConfigStore, ShroudConfig};
pub use error::{VaultError, VaultResult};
pub use types::{unix_now, ProgressFn, VaultState};
