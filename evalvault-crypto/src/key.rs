//! Key material and password-based key derivation.

use crate::error::{CryptoError, CryptoResult};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of freshly generated salts in bytes.
pub const SALT_SIZE: usize = 32;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// A 256-bit symmetric key. Zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a key from a slice, rejecting anything that is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

impl PartialEq for DerivedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for DerivedKey {}

/// KDF salt. Stored alongside whatever it protects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Generates a fresh random salt of [`SALT_SIZE`] bytes.
    pub fn random() -> Self {
        Self(random_bytes(SALT_SIZE))
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// PBKDF2 parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }
}

/// Derives a 256-bit key from `password` with PBKDF2-HMAC-SHA256.
///
/// The password is copied into a zeroizing buffer that is wiped when this
/// function returns, whether derivation succeeded or not.
pub fn derive_key(password: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<DerivedKey> {
    let bytes = derive_key_bytes(password, salt, KEY_SIZE, params.iterations)?;
    DerivedKey::from_slice(&bytes)
}

/// Derives `key_len` bytes from `password`. The output is zeroized on drop.
pub fn derive_key_bytes(
    password: &str,
    salt: &Salt,
    key_len: usize,
    iterations: u32,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let password_bytes = Zeroizing::new(password.as_bytes().to_vec());

    if password_bytes.is_empty() {
        return Err(CryptoError::Validation("password must not be empty".into()));
    }
    if salt.as_bytes().is_empty() {
        return Err(CryptoError::Validation("salt must not be empty".into()));
    }
    if iterations == 0 {
        return Err(CryptoError::KeyDerivation("iteration count must be positive".into()));
    }
    if key_len == 0 {
        return Err(CryptoError::KeyDerivation("key length must be positive".into()));
    }

    let mut out = Zeroizing::new(vec![0u8; key_len]);
    pbkdf2_hmac::<Sha256>(&password_bytes, salt.as_bytes(), iterations, &mut out);
    Ok(out)
}

/// Generates a random 256-bit key from the OS-seeded thread RNG.
pub fn generate_random_key() -> DerivedKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rng().fill_bytes(&mut bytes);
    let key = DerivedKey::from_bytes(bytes);
    bytes.zeroize();
    key
}

/// Returns `len` random bytes.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    buf
}
