use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("wrong password")]
    WrongPassword,

    #[error("chunk integrity check failed: {0}")]
    IntegrityFailure(String),

    #[error("corrupt vault: {0}")]
    CorruptVault(String),

    #[error("no files to encrypt")]
    NothingToEncrypt,

    #[error("no active session for drive")]
    NoSession,

    #[error("operation cancelled")]
    Cancelled,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    /// Whether a UI should render this as a wrong-password failure.
    ///
    /// A chunk MAC mismatch is reported to the user identically to a bad
    /// passphrase so that tampering with a single chunk never confirms the
    /// passphrase was correct. Callers that need the real cause for
    /// out-of-band logging should match on the variant instead.
    pub fn presents_as_wrong_password(&self) -> bool {
        matches!(
            self,
            VaultError::WrongPassword | VaultError::IntegrityFailure(_)
        )
    }
}
