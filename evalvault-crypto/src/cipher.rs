//! AES-256-CBC encryption with PKCS7 padding and a random IV per call.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{random_bytes, DerivedKey};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroizing;

pub(crate) type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
pub(crate) type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// IV size in bytes (one AES block).
pub const IV_SIZE: usize = 16;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// `[16-byte IV][ciphertext]`, as produced by [`encrypt`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CipherBlob(Vec<u8>);

impl CipherBlob {
    /// Wraps raw bytes without validating them.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        BASE64
            .decode(encoded.trim())
            .map(Self)
            .map_err(|e| CryptoError::Encoding(format!("invalid base64 ciphertext: {e}")))
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The IV prefix. Empty if the blob is shorter than one block.
    pub fn iv(&self) -> &[u8] {
        self.0.get(..IV_SIZE).unwrap_or(&[])
    }

    /// Everything after the IV.
    pub fn ciphertext(&self) -> &[u8] {
        self.0.get(IV_SIZE..).unwrap_or(&[])
    }

    /// Checks the layout without a key: a full IV, then a non-empty,
    /// block-aligned ciphertext.
    pub fn validate_structure(&self) -> CryptoResult<()> {
        if self.0.len() < IV_SIZE {
            return Err(CryptoError::Decryption(format!(
                "ciphertext too short: {} bytes, need at least {IV_SIZE}",
                self.0.len()
            )));
        }
        let body = self.0.len() - IV_SIZE;
        if body == 0 {
            return Err(CryptoError::Decryption("ciphertext body is empty".into()));
        }
        if body % BLOCK_SIZE != 0 {
            return Err(CryptoError::Decryption(format!(
                "ciphertext body of {body} bytes is not a multiple of {BLOCK_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Encrypts `plaintext` under `key` with a fresh random IV.
///
/// Encrypting the same plaintext twice never yields the same blob.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<CipherBlob> {
    let iv = random_bytes(IV_SIZE);
    let encryptor = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(CipherBlob(out))
}

/// Decrypts a blob produced by [`encrypt`].
///
/// Fails on truncated or misaligned input, invalid padding, or an empty
/// result. A wrong key usually, but not always, surfaces as a padding
/// failure; callers that need certainty check a magic prefix.
pub fn decrypt(key: &DerivedKey, blob: &CipherBlob) -> CryptoResult<Vec<u8>> {
    blob.validate_structure()?;
    let decryptor = Aes256CbcDec::new_from_slices(key.as_bytes(), blob.iv())
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;
    let plaintext = decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(blob.ciphertext())
        .map_err(|_| CryptoError::Decryption("invalid padding (wrong key or corrupted data)".into()))?;

    if plaintext.is_empty() {
        return Err(CryptoError::Decryption("decrypted payload is empty".into()));
    }
    Ok(plaintext)
}

/// Encrypts UTF-8 text and returns the base64 form of the blob.
pub fn encrypt_string(key: &DerivedKey, plaintext: &str) -> CryptoResult<String> {
    encrypt(key, plaintext.as_bytes()).map(|blob| blob.to_base64())
}

/// Inverse of [`encrypt_string`].
pub fn decrypt_string(key: &DerivedKey, encoded: &str) -> CryptoResult<String> {
    let blob = CipherBlob::from_base64(encoded)?;
    let plaintext = Zeroizing::new(decrypt(key, &blob)?);
    String::from_utf8(plaintext.to_vec())
        .map_err(|e| CryptoError::Encoding(format!("plaintext is not UTF-8: {e}")))
}
