//! Abstract encryption interface between dataset stores and the master key.
//!
//! Dataset stores depend on `Arc<dyn DataEncryptor>` and never see raw keys.
//! The vault's `KeyProvider` implements this trait; tests use
//! `PassthroughEncryptor` when no key is needed.

use thiserror::Error;

/// Errors from the encryption seam.
#[derive(Debug, Error)]
pub enum EncryptorError {
    /// No key is available.
    #[error("encryptor unavailable (no master key)")]
    Unavailable,
    /// Underlying cipher failure.
    #[error("crypto error: {0}")]
    Crypto(String),
}

pub type EncryptorResult<T> = Result<T, EncryptorError>;

impl From<crate::CryptoError> for EncryptorError {
    fn from(err: crate::CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}

/// Encrypts and decrypts opaque byte slices with a key the caller never sees.
pub trait DataEncryptor: Send + Sync {
    /// Encrypt `data`, returning a raw `[IV][ciphertext]` blob.
    fn encrypt_bytes(&self, data: &[u8]) -> EncryptorResult<Vec<u8>>;

    /// Decrypt a blob produced by `encrypt_bytes` (canonical path only).
    fn decrypt_bytes(&self, data: &[u8]) -> EncryptorResult<Vec<u8>>;

    /// Decrypt with the fallback strategies enabled. Defaults to `decrypt_bytes`.
    fn recover_bytes(&self, data: &[u8]) -> EncryptorResult<Vec<u8>> {
        self.decrypt_bytes(data)
    }

    /// Whether a key is loaded.
    fn is_available(&self) -> bool;
}

/// No-op encryptor for tests. Data passes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEncryptor;

impl DataEncryptor for PassthroughEncryptor {
    fn encrypt_bytes(&self, data: &[u8]) -> EncryptorResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decrypt_bytes(&self, data: &[u8]) -> EncryptorResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn is_available(&self) -> bool {
        true
    }
}
