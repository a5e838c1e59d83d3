//! Master key management.
//!
//! One random 256-bit master key per base directory, persisted only in
//! wrapped form in `.master_key`. Unwrapping goes through a [`KeyWrapper`];
//! the default wrapper keys off the [`EnvironmentFingerprint`].
//!
//! If the wrapped key cannot be recovered for any reason a new key is
//! generated and persisted without raising. Datasets sealed under the old
//! key then load as empty. This is the intended trade-off for a host rename
//! or user change, and it is logged at `warn`.

use crate::error::VaultResult;
use crate::fingerprint::EnvironmentFingerprint;
use crate::paths::MASTER_KEY_FILE;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use evalvault_crypto::{
    decrypt, encrypt, encrypt_string, generate_random_key, safe_decrypt, CipherBlob, CryptoError,
    CryptoResult, DataEncryptor, DerivedKey, EncryptorResult,
};
use evalvault_storage::write_atomic;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

// ============================================================================
// Key wrapping
// ============================================================================

/// Seals the master key for storage and opens it again.
pub trait KeyWrapper: Send + Sync {
    /// Returns the base64 text persisted in `.master_key`.
    fn wrap_key(&self, master: &DerivedKey) -> CryptoResult<String>;

    /// Inverse of [`wrap_key`](Self::wrap_key). Fails unless exactly 32 key bytes come out.
    fn unwrap_key(&self, wrapped: &str, allow_fallback: bool) -> CryptoResult<DerivedKey>;

    /// Short label for logs and diagnostics.
    fn describe(&self) -> String;
}

/// Wraps under the key derived from the host's environment fingerprint.
///
/// By default the fingerprint is re-captured on every call, so a host
/// rename between runs changes the wrapping key.
#[derive(Clone, Debug, Default)]
pub struct FingerprintKeyWrapper {
    pinned: Option<EnvironmentFingerprint>,
}

impl FingerprintKeyWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always uses `fingerprint` instead of capturing the host.
    pub fn pinned(fingerprint: EnvironmentFingerprint) -> Self {
        Self {
            pinned: Some(fingerprint),
        }
    }

    fn wrapping_key(&self) -> DerivedKey {
        match &self.pinned {
            Some(fp) => fp.derive_key(),
            None => EnvironmentFingerprint::capture().derive_key(),
        }
    }
}

impl KeyWrapper for FingerprintKeyWrapper {
    fn wrap_key(&self, master: &DerivedKey) -> CryptoResult<String> {
        wrap_with(&self.wrapping_key(), master)
    }

    fn unwrap_key(&self, wrapped: &str, allow_fallback: bool) -> CryptoResult<DerivedKey> {
        unwrap_with(&self.wrapping_key(), wrapped, allow_fallback)
    }

    fn describe(&self) -> String {
        match &self.pinned {
            Some(_) => "environment fingerprint (pinned)".to_string(),
            None => "environment fingerprint".to_string(),
        }
    }
}

/// Wraps under a fixed key. Useful where no host binding is wanted.
pub struct StaticKeyWrapper {
    key: DerivedKey,
}

impl StaticKeyWrapper {
    pub fn new(key: DerivedKey) -> Self {
        Self { key }
    }
}

impl KeyWrapper for StaticKeyWrapper {
    fn wrap_key(&self, master: &DerivedKey) -> CryptoResult<String> {
        wrap_with(&self.key, master)
    }

    fn unwrap_key(&self, wrapped: &str, allow_fallback: bool) -> CryptoResult<DerivedKey> {
        unwrap_with(&self.key, wrapped, allow_fallback)
    }

    fn describe(&self) -> String {
        "static key".to_string()
    }
}

/// The wrapped plaintext is the base64 text of the 32 raw key bytes.
fn wrap_with(wrapping_key: &DerivedKey, master: &DerivedKey) -> CryptoResult<String> {
    let encoded = Zeroizing::new(BASE64.encode(master.as_bytes()));
    encrypt_string(wrapping_key, &encoded)
}

fn unwrap_with(
    wrapping_key: &DerivedKey,
    wrapped: &str,
    allow_fallback: bool,
) -> CryptoResult<DerivedKey> {
    let blob = CipherBlob::from_base64(wrapped)?;
    let plaintext = Zeroizing::new(safe_decrypt(wrapping_key, &blob, allow_fallback)?);
    let text = std::str::from_utf8(&plaintext)
        .map_err(|_| CryptoError::Decryption("wrapped key is not text".to_string()))?;
    let raw = Zeroizing::new(
        BASE64
            .decode(text.trim())
            .map_err(|e| CryptoError::Encoding(e.to_string()))?,
    );
    DerivedKey::from_slice(&raw)
}

// ============================================================================
// Key provider
// ============================================================================

/// The unwrapped master key of one base directory.
///
/// Construct once per directory and share it (behind an `Arc`) with every
/// dataset store opened there.
pub struct KeyProvider {
    key: DerivedKey,
    allow_fallback: bool,
}

impl KeyProvider {
    pub fn new(key: DerivedKey, allow_fallback: bool) -> Self {
        Self {
            key,
            allow_fallback,
        }
    }

    /// Non-secret identifier of the key: the first 8 bytes of its SHA-256,
    /// hex encoded. Two providers with the same id hold the same key.
    pub fn key_id(&self) -> String {
        Sha256::digest(self.key.as_bytes())
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProvider")
            .field("key_id", &self.key_id())
            .field("allow_fallback", &self.allow_fallback)
            .finish()
    }
}

impl DataEncryptor for KeyProvider {
    fn encrypt_bytes(&self, data: &[u8]) -> EncryptorResult<Vec<u8>> {
        Ok(encrypt(&self.key, data)?.as_bytes().to_vec())
    }

    fn decrypt_bytes(&self, data: &[u8]) -> EncryptorResult<Vec<u8>> {
        Ok(decrypt(&self.key, &CipherBlob::from_bytes(data))?)
    }

    fn recover_bytes(&self, data: &[u8]) -> EncryptorResult<Vec<u8>> {
        Ok(safe_decrypt(
            &self.key,
            &CipherBlob::from_bytes(data),
            self.allow_fallback,
        )?)
    }

    fn is_available(&self) -> bool {
        true
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Where the key returned by [`MasterKeyManager::get_or_create_master_key`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MasterKeyOrigin {
    /// Unwrapped from an existing `.master_key`.
    Loaded,
    /// No `.master_key` existed; a new key was generated.
    Created,
    /// `.master_key` existed but could not be unwrapped; a new key replaced it.
    Regenerated,
}

pub struct MasterKeyManager;

impl MasterKeyManager {
    /// Loads the master key of `dir`, or mints and persists a new one.
    ///
    /// Never fails. A missing file, an unwrap failure or a wrong key length
    /// all end in a fresh key. If persisting the fresh key fails it is still
    /// returned and used for this process.
    pub fn get_or_create_master_key(
        dir: &Path,
        wrapper: &dyn KeyWrapper,
        allow_fallback: bool,
    ) -> (KeyProvider, MasterKeyOrigin) {
        let path = dir.join(MASTER_KEY_FILE);
        let existed = path.exists();

        if existed {
            match load_wrapped(&path, wrapper, allow_fallback) {
                Ok(key) => {
                    debug!(wrapper = %wrapper.describe(), "master key loaded");
                    return (KeyProvider::new(key, allow_fallback), MasterKeyOrigin::Loaded);
                }
                Err(e) => {
                    warn!(
                        wrapper = %wrapper.describe(),
                        "master key could not be unwrapped, generating a new one: {e}"
                    );
                }
            }
        }

        let key = generate_random_key();
        if let Err(e) = persist(&path, &key, wrapper) {
            warn!("failed to persist master key, using it for this session only: {e}");
        }

        let origin = if existed {
            MasterKeyOrigin::Regenerated
        } else {
            MasterKeyOrigin::Created
        };
        info!(?origin, "new master key generated");
        (KeyProvider::new(key, allow_fallback), origin)
    }
}

fn load_wrapped(
    path: &Path,
    wrapper: &dyn KeyWrapper,
    allow_fallback: bool,
) -> VaultResult<DerivedKey> {
    let text = std::fs::read_to_string(path)?;
    Ok(wrapper.unwrap_key(text.trim(), allow_fallback)?)
}

fn persist(path: &Path, key: &DerivedKey, wrapper: &dyn KeyWrapper) -> VaultResult<()> {
    let wrapped = wrapper.wrap_key(key)?;
    set_hidden(path, false);
    write_atomic(path, wrapped.as_bytes())?;
    set_hidden(path, true);
    Ok(())
}

/// Best effort; failures are logged only. Replacing a hidden file fails on
/// Windows, so the attribute is cleared before each write.
#[cfg(windows)]
fn set_hidden(path: &Path, hidden: bool) {
    if !path.exists() {
        return;
    }
    let flag = if hidden { "+h" } else { "-h" };
    match std::process::Command::new("attrib").arg(flag).arg(path).status() {
        Ok(status) if status.success() => {}
        Ok(status) => debug!(%status, "attrib {flag} failed"),
        Err(e) => debug!("attrib {flag} failed: {e}"),
    }
}

/// The leading dot already hides the file.
#[cfg(not(windows))]
fn set_hidden(_path: &Path, _hidden: bool) {}
