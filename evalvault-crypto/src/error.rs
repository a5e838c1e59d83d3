//! Cipher engine error types.

use thiserror::Error;

/// Result type for cipher engine operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in the cipher engine.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Malformed input: empty password, bad salt, zero iterations.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Wrong key, corrupted ciphertext, bad padding or empty result.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The canonical decrypt and every fallback strategy failed.
    #[error("all decryption strategies failed")]
    RecoveryExhausted,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Base64 or UTF-8 decoding of a persisted value failed.
    #[error("encoding error: {0}")]
    Encoding(String),
}
