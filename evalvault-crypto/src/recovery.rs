//! Security-question answer digests.
//!
//! An answer is never stored. Instead we keep a salt, an iteration count,
//! and the SHA-256 of the key derived from the normalized answer. Checking
//! an answer re-derives and compares.

use crate::error::CryptoResult;
use crate::key::{derive_key, KdfParams, Salt};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Salted, iterated digest of a security answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnswerDigest {
    pub salt: Salt,
    pub iterations: u32,
    pub hash: Vec<u8>,
}

impl AnswerDigest {
    /// Creates a digest for `answer` with a fresh random salt.
    pub fn create(answer: &str, params: &KdfParams) -> CryptoResult<Self> {
        let salt = Salt::random();
        let hash = digest_answer(answer, &salt, params.iterations)?;
        Ok(Self {
            salt,
            iterations: params.iterations,
            hash,
        })
    }

    /// Re-derives from `answer` with the stored salt and iterations and
    /// compares to the stored hash. Any derivation failure counts as a mismatch.
    pub fn verify(&self, answer: &str) -> bool {
        match digest_answer(answer, &self.salt, self.iterations) {
            Ok(hash) => hash == self.hash,
            Err(_) => false,
        }
    }
}

/// Answers are compared case-insensitively with surrounding whitespace ignored.
pub fn normalize_answer(answer: &str) -> Zeroizing<String> {
    Zeroizing::new(answer.trim().to_lowercase())
}

fn digest_answer(answer: &str, salt: &Salt, iterations: u32) -> CryptoResult<Vec<u8>> {
    let normalized = normalize_answer(answer);
    let key = derive_key(&normalized, salt, &KdfParams::with_iterations(iterations))?;
    Ok(Sha256::digest(key.as_bytes()).to_vec())
}
