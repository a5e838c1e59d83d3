//! Cipher engine for the EvalVault local secrets vault.
//!
//! Provides the primitives every persisted vault file is built on:
//! - PBKDF2-HMAC-SHA256 for key derivation from passwords
//! - AES-256-CBC with PKCS7 padding and a fresh random IV per call
//! - Best-effort fallback decryption for damaged or legacy ciphertext
//! - Secret buffers that are zeroized on every exit path
//!
//! # Ciphertext layout
//!
//! A [`CipherBlob`] is `[16-byte IV][ciphertext]`. On disk it is always
//! stored base64-encoded. CBC without a MAC is malleable: callers that need
//! authenticity prepend a magic prefix to the plaintext and check it after
//! decryption (see the identity record in `evalvault-vault`).
//!
//! # Fallback decryption
//!
//! [`safe_decrypt`] retries a failed canonical decrypt with alternate
//! padding modes and an ECB attempt, accepting output only when
//! [`looks_like_text`] passes. It is a recovery hatch, not an
//! authenticity check.

mod cipher;
pub mod encryptor;
mod error;
pub mod fallback;
mod key;
pub mod recovery;

pub use cipher::{
    decrypt, decrypt_string, encrypt, encrypt_string, CipherBlob, BLOCK_SIZE, IV_SIZE,
};
pub use encryptor::{DataEncryptor, EncryptorError, EncryptorResult, PassthroughEncryptor};
pub use error::{CryptoError, CryptoResult};
pub use fallback::{
    looks_like_text, safe_decrypt, CipherMode, DecryptStrategy, PaddingMode,
    FALLBACK_STRATEGIES,
};
pub use key::{
    derive_key, derive_key_bytes, generate_random_key, random_bytes, DerivedKey, KdfParams,
    Salt, DEFAULT_ITERATIONS, KEY_SIZE, SALT_SIZE,
};
pub use recovery::AnswerDigest;
