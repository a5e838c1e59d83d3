//! Vault error types.

use evalvault_crypto::CryptoError;
use evalvault_storage::StorageError;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("password too short (min {0} characters)")]
    PasswordTooShort(usize),
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("vault already provisioned")]
    AlreadyProvisioned,
    #[error("vault not provisioned")]
    NotProvisioned,
    #[error("invalid password")]
    InvalidPassword,
    #[error("no security questions configured")]
    RecoveryNotConfigured,
    #[error("security answers did not match")]
    RecoveryFailed,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
