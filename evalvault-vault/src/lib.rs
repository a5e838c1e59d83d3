//! Local secrets vault.
//!
//! Ties together the master key, encrypted dataset stores, the identity
//! record with its login flow, and recovery tooling, all rooted in one
//! base directory:
//!
//! | file             | contents                                           |
//! |------------------|----------------------------------------------------|
//! | `.master_key`    | master key wrapped under the environment fingerprint |
//! | `Database1.json` | identity record (`ID1`, `Salt1`, `Iterations`)     |
//! | `pwhint1.ini`    | base64 password hints, one per line                |
//! | `secqa.json`     | security question digests                          |
//! | `<name>.edb`     | one encrypted dataset per collection               |
//!
//! A [`Vault`] owns one [`KeyProvider`] and hands it to every dataset it
//! opens. Datasets are only available after a successful login or
//! provisioning on that same vault instance.

mod auth;
mod b64;
mod config;
mod error;
pub mod fingerprint;
mod hint;
mod identity;
mod maintenance;
mod master_key;
pub mod paths;
mod recovery;

pub use auth::{
    device_bound_candidate, Authenticator, LoginOutcome, Session, VerificationStrategy,
    VERIFICATION_STRATEGIES,
};
pub use config::{VaultConfig, MIN_PASSWORD_LEN};
pub use error::{VaultError, VaultResult};
pub use fingerprint::{environment_diagnostics, EnvironmentFingerprint};
pub use hint::{HintStore, LOGIN_HINT_SLOT};
pub use identity::{IdentityRecord, IdentityStore, MAGIC_PREFIX};
pub use maintenance::{DiagnosticReport, FileCheck, FileStatus, Maintenance, ResetReport};
pub use master_key::{
    FingerprintKeyWrapper, KeyProvider, KeyWrapper, MasterKeyManager, MasterKeyOrigin,
    StaticKeyWrapper,
};
pub use paths::VaultPaths;
pub use recovery::RecoveryStore;

use evalvault_storage::DatasetStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One vault rooted at [`VaultConfig::base_dir`].
pub struct Vault {
    config: VaultConfig,
    paths: VaultPaths,
    keys: Arc<KeyProvider>,
    key_origin: MasterKeyOrigin,
    session: Arc<Session>,
    authenticator: Authenticator,
    recovery: RecoveryStore,
}

impl Vault {
    /// Opens the vault with the host's environment fingerprint as key wrapper.
    pub fn open(config: VaultConfig) -> VaultResult<Self> {
        Self::open_with_wrapper(config, &FingerprintKeyWrapper::new())
    }

    /// Creates the base directory if needed and loads (or mints) the master key.
    ///
    /// Fails with [`VaultError::Validation`] if the config does not pass
    /// [`VaultConfig::validate`].
    pub fn open_with_wrapper(config: VaultConfig, wrapper: &dyn KeyWrapper) -> VaultResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.base_dir)?;
        let paths = VaultPaths::new(&config.base_dir);

        let (keys, key_origin) = MasterKeyManager::get_or_create_master_key(
            paths.base_dir(),
            wrapper,
            config.allow_fallback_decrypt,
        );

        let identity = IdentityStore::new(paths.identity());
        let recovery = RecoveryStore::new(
            paths.security_questions(),
            identity.clone(),
            config.kdf_params(),
            config.min_password_len,
        );
        let session = Arc::new(Session::default());
        let authenticator = Authenticator::new(
            identity,
            HintStore::new(paths.hints()),
            recovery.clone(),
            session.clone(),
            config.kdf_params(),
            config.min_password_len,
        );

        info!(dir = %paths.base_dir().display(), ?key_origin, "vault opened");
        Ok(Self {
            config,
            paths,
            keys: Arc::new(keys),
            key_origin,
            session,
            authenticator,
            recovery,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        self.paths.base_dir()
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn recovery(&self) -> &RecoveryStore {
        &self.recovery
    }

    pub fn maintenance(&self) -> Maintenance {
        Maintenance::new(self.paths.clone())
    }

    /// How the master key was obtained when this vault was opened.
    pub fn key_origin(&self) -> MasterKeyOrigin {
        self.key_origin
    }

    /// The master key provider shared by every dataset of this vault.
    pub fn key_provider(&self) -> Arc<KeyProvider> {
        self.keys.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Opens the `name` collection. Requires an authenticated session.
    pub fn dataset<T>(&self, name: &str) -> VaultResult<DatasetStore<T>>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        if !self.is_authenticated() {
            return Err(VaultError::NotAuthenticated);
        }
        if name.is_empty() || name.contains(['/', '\\', '.']) {
            return Err(VaultError::Validation(format!(
                "invalid dataset name: {name:?}"
            )));
        }
        Ok(DatasetStore::open_with_options(
            self.paths.base_dir(),
            name,
            self.keys.clone(),
            self.config.allow_fallback_decrypt,
        ))
    }
}
