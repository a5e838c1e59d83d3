//! Vault configuration.

use crate::error::{VaultError, VaultResult};
use evalvault_crypto::{KdfParams, DEFAULT_ITERATIONS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name under the platform data dir.
const APP_DIR_NAME: &str = "EvalVault";

/// Minimum password length for provisioning, changes and recovery.
///
/// Also the floor for [`VaultConfig::min_password_len`]: login rotation
/// re-seals the identity record under the device-bound candidate, which only
/// equals the password once the password is at least this long.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Settings for one vault instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding every vault file.
    pub base_dir: PathBuf,
    /// PBKDF2 iterations for new identity records and security answers.
    pub kdf_iterations: u32,
    /// Never below [`MIN_PASSWORD_LEN`]; see [`VaultConfig::validate`].
    pub min_password_len: usize,
    /// Whether dataset loads and master-key unwrap may use fallback decryption.
    pub allow_fallback_decrypt: bool,
    /// Default for the CLI `reset` command.
    pub backup_before_reset: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            kdf_iterations: DEFAULT_ITERATIONS,
            min_password_len: MIN_PASSWORD_LEN,
            allow_fallback_decrypt: true,
            backup_before_reset: true,
        }
    }
}

impl VaultConfig {
    /// Default settings rooted at `base_dir`.
    pub fn for_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> VaultResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings a vault cannot run with.
    pub fn validate(&self) -> VaultResult<()> {
        if self.min_password_len < MIN_PASSWORD_LEN {
            return Err(VaultError::Validation(format!(
                "min_password_len must be at least {MIN_PASSWORD_LEN}, got {}",
                self.min_password_len
            )));
        }
        if self.kdf_iterations == 0 {
            return Err(VaultError::Validation(
                "kdf_iterations must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams::with_iterations(self.kdf_iterations)
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.kdf_iterations, 100_000);
        assert_eq!(config.min_password_len, 8);
        assert!(config.allow_fallback_decrypt);
        assert!(config.base_dir.ends_with("EvalVault"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "base_dir": "/tmp/vault", "kdf_iterations": 5000 }"#).unwrap();

        let config = VaultConfig::load(&path).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/tmp/vault"));
        assert_eq!(config.kdf_iterations, 5000);
        assert_eq!(config.min_password_len, MIN_PASSWORD_LEN);
        assert!(config.backup_before_reset);
    }

    #[test]
    fn min_password_len_below_floor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "min_password_len": 4 }"#).unwrap();

        let err = VaultConfig::load(&path).unwrap_err();
        assert!(matches!(err, crate::VaultError::Validation(_)));

        let mut config = VaultConfig::for_dir(dir.path());
        config.min_password_len = MIN_PASSWORD_LEN + 4;
        assert!(config.validate().is_ok());
        config.kdf_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = VaultConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, crate::VaultError::Io(_)));
    }
}
