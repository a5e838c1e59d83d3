//! Identity record (`Database1.json`).
//!
//! The record never stores the password or a hash of it. It stores a token:
//! the magic prefix followed by random bytes, encrypted under the key derived
//! from the password. A password is correct iff the token decrypts to
//! something starting with the prefix.

use crate::error::VaultResult;
use evalvault_crypto::{
    decrypt, derive_key, encrypt, random_bytes, CipherBlob, CryptoError, CryptoResult, KdfParams,
    Salt,
};
use evalvault_storage::{with_path_lock, write_atomic};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Fixed plaintext prefix checked after decrypting the token.
pub const MAGIC_PREFIX: &[u8] = b"EVALVAULT-AUTH1|";

/// Random bytes following the prefix.
const TOKEN_ENTROPY_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(rename = "ID1", with = "crate::b64")]
    auth_token: Vec<u8>,
    #[serde(rename = "Salt1", with = "crate::b64")]
    salt: Vec<u8>,
    #[serde(rename = "Iterations")]
    iterations: u32,
}

impl IdentityRecord {
    /// Seals a fresh `prefix ‖ random` token under the key derived from `secret`.
    pub fn seal(secret: &str, salt: Salt, params: &KdfParams) -> CryptoResult<Self> {
        let key = derive_key(secret, &salt, params)?;

        let mut payload = Zeroizing::new(MAGIC_PREFIX.to_vec());
        payload.extend_from_slice(&random_bytes(TOKEN_ENTROPY_LEN));
        let token = encrypt(&key, &payload)?;

        Ok(Self {
            auth_token: token.as_bytes().to_vec(),
            salt: salt.as_bytes().to_vec(),
            iterations: params.iterations,
        })
    }

    /// Whether `secret` decrypts the token to a plaintext carrying the prefix.
    /// Derivation and decryption failures count as a mismatch.
    pub fn opens_with(&self, secret: &str) -> bool {
        let key = match derive_key(secret, &self.salt(), &self.kdf_params()) {
            Ok(key) => key,
            Err(_) => return false,
        };
        match decrypt(&key, &self.auth_token()) {
            Ok(plaintext) => {
                let plaintext = Zeroizing::new(plaintext);
                plaintext.starts_with(MAGIC_PREFIX)
            }
            Err(_) => false,
        }
    }

    pub fn auth_token(&self) -> CipherBlob {
        CipherBlob::from_bytes(self.auth_token.clone())
    }

    pub fn salt(&self) -> Salt {
        Salt::from_bytes(self.salt.clone())
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams::with_iterations(self.iterations)
    }

    /// Key-less sanity check of the stored fields.
    pub fn validate_structure(&self) -> CryptoResult<()> {
        self.auth_token().validate_structure()?;
        if self.salt.is_empty() {
            return Err(CryptoError::Validation("empty salt".to_string()));
        }
        if self.iterations == 0 {
            return Err(CryptoError::Validation("zero iterations".to_string()));
        }
        Ok(())
    }
}

/// Reads and writes the identity file.
#[derive(Clone, Debug)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// `Ok(None)` if the file does not exist.
    pub fn load(&self) -> VaultResult<Option<IdentityRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Like [`load`](Self::load) but treats an unreadable file as absent.
    pub fn load_or_none(&self) -> Option<IdentityRecord> {
        match self.load() {
            Ok(record) => record,
            Err(e) => {
                warn!("identity file unreadable: {e}");
                None
            }
        }
    }

    pub fn save(&self, record: &IdentityRecord) -> VaultResult<()> {
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.path, &json)?;
        debug!("identity record written");
        Ok(())
    }

    pub fn delete(&self) -> VaultResult<()> {
        with_path_lock(&self.path, || match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
    }
}
