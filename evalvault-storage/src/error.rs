//! Dataset storage error types.

use evalvault_crypto::EncryptorError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from the dataset store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("encryption error: {0}")]
    Encryptor(#[from] EncryptorError),

    /// The file is not valid base64 text.
    #[error("encoding error: {0}")]
    Encoding(String),
}
