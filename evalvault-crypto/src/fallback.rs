//! Multi-strategy fallback decryption.
//!
//! When the canonical CBC/PKCS7 decrypt fails, [`safe_decrypt`] walks
//! [`FALLBACK_STRATEGIES`] in order and returns the first output that
//! passes [`looks_like_text`]. None of this authenticates anything.

use crate::cipher::{self, Aes256CbcDec, CipherBlob, BLOCK_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use aes::cipher::block_padding::{AnsiX923, Iso10126, NoPadding, Pkcs7, ZeroPadding};
use aes::cipher::{BlockDecryptMut, KeyInit, KeyIvInit};
use tracing::debug;

type Aes256EcbDec = ecb::Decryptor<aes::Aes256>;

/// Minimum share of "plausible" characters for a fallback result to be accepted.
pub const TEXT_RATIO_THRESHOLD: f64 = 0.8;

/// Block padding scheme to strip after decryption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaddingMode {
    Pkcs7,
    Zeros,
    AnsiX923,
    Iso10126,
    None,
}

/// Block cipher mode of operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherMode {
    /// IV taken from the first block of the blob.
    Cbc,
    /// The whole blob, IV included, is treated as ECB ciphertext.
    Ecb,
}

/// One fallback attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecryptStrategy {
    pub padding: PaddingMode,
    pub mode: CipherMode,
}

impl DecryptStrategy {
    pub const fn new(padding: PaddingMode, mode: CipherMode) -> Self {
        Self { padding, mode }
    }

    /// Runs this strategy. `None` means the strategy could not produce output.
    pub fn attempt(&self, key: &DerivedKey, blob: &CipherBlob) -> Option<Vec<u8>> {
        let plaintext = match self.mode {
            CipherMode::Cbc => cbc_decrypt(key, blob, self.padding),
            CipherMode::Ecb => ecb_decrypt(key, blob.as_bytes(), self.padding),
        }?;
        (!plaintext.is_empty()).then_some(plaintext)
    }
}

/// Strategies tried, in order, after the canonical CBC/PKCS7 decrypt fails.
pub const FALLBACK_STRATEGIES: [DecryptStrategy; 5] = [
    DecryptStrategy::new(PaddingMode::Zeros, CipherMode::Cbc),
    DecryptStrategy::new(PaddingMode::AnsiX923, CipherMode::Cbc),
    DecryptStrategy::new(PaddingMode::Iso10126, CipherMode::Cbc),
    DecryptStrategy::new(PaddingMode::None, CipherMode::Cbc),
    DecryptStrategy::new(PaddingMode::Pkcs7, CipherMode::Ecb),
];

/// Decrypts `blob`, optionally falling back to alternate strategies.
///
/// With `allow_fallback == false` this is exactly [`cipher::decrypt`].
pub fn safe_decrypt(
    key: &DerivedKey,
    blob: &CipherBlob,
    allow_fallback: bool,
) -> CryptoResult<Vec<u8>> {
    let primary_err = match cipher::decrypt(key, blob) {
        Ok(plaintext) => return Ok(plaintext),
        Err(e) => e,
    };
    if !allow_fallback {
        return Err(primary_err);
    }

    debug!("canonical decrypt failed ({primary_err}), trying fallback strategies");
    decrypt_with_strategies(key, blob, &FALLBACK_STRATEGIES, looks_like_text)
}

/// Walks `strategies` in order and returns the first output accepted by `is_valid`.
pub fn decrypt_with_strategies<F>(
    key: &DerivedKey,
    blob: &CipherBlob,
    strategies: &[DecryptStrategy],
    is_valid: F,
) -> CryptoResult<Vec<u8>>
where
    F: Fn(&[u8]) -> bool,
{
    for strategy in strategies {
        if let Some(plaintext) = strategy.attempt(key, blob) {
            if is_valid(&plaintext) {
                debug!(?strategy, "fallback decrypt accepted");
                return Ok(plaintext);
            }
        }
    }
    Err(CryptoError::RecoveryExhausted)
}

/// Heuristic validity check for fallback output.
///
/// Decodes lossily as UTF-8 and accepts when at least 80% of the characters
/// are letters, digits, punctuation, whitespace, other printable ASCII, or
/// non-ASCII.
pub fn looks_like_text(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    let mut total = 0usize;
    let mut plausible = 0usize;
    for c in text.chars() {
        total += 1;
        if c.is_alphanumeric()
            || c.is_ascii_punctuation()
            || c.is_whitespace()
            || c.is_ascii_graphic()
            || !c.is_ascii()
        {
            plausible += 1;
        }
    }
    if total == 0 {
        return false;
    }
    plausible as f64 / total as f64 >= TEXT_RATIO_THRESHOLD
}

fn cbc_decrypt(key: &DerivedKey, blob: &CipherBlob, padding: PaddingMode) -> Option<Vec<u8>> {
    blob.validate_structure().ok()?;
    let dec = Aes256CbcDec::new_from_slices(key.as_bytes(), blob.iv()).ok()?;
    let ct = blob.ciphertext();
    match padding {
        PaddingMode::Pkcs7 => dec.decrypt_padded_vec_mut::<Pkcs7>(ct).ok(),
        PaddingMode::Zeros => dec.decrypt_padded_vec_mut::<ZeroPadding>(ct).ok(),
        PaddingMode::AnsiX923 => dec.decrypt_padded_vec_mut::<AnsiX923>(ct).ok(),
        PaddingMode::Iso10126 => dec.decrypt_padded_vec_mut::<Iso10126>(ct).ok(),
        PaddingMode::None => dec.decrypt_padded_vec_mut::<NoPadding>(ct).ok(),
    }
}

fn ecb_decrypt(key: &DerivedKey, data: &[u8], padding: PaddingMode) -> Option<Vec<u8>> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return None;
    }
    let dec = Aes256EcbDec::new_from_slice(key.as_bytes()).ok()?;
    match padding {
        PaddingMode::Pkcs7 => dec.decrypt_padded_vec_mut::<Pkcs7>(data).ok(),
        PaddingMode::Zeros => dec.decrypt_padded_vec_mut::<ZeroPadding>(data).ok(),
        PaddingMode::AnsiX923 => dec.decrypt_padded_vec_mut::<AnsiX923>(data).ok(),
        PaddingMode::Iso10126 => dec.decrypt_padded_vec_mut::<Iso10126>(data).ok(),
        PaddingMode::None => dec.decrypt_padded_vec_mut::<NoPadding>(data).ok(),
    }
}
