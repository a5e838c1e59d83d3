//! Generic encrypted per-collection file store.

use crate::error::{StorageError, StorageResult};
use crate::fs::{with_path_lock, write_atomic};
use crate::migration::{migrate_legacy, MigrationOutcome};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use evalvault_crypto::DataEncryptor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// File extension of encrypted dataset files.
pub const DATASET_EXTENSION: &str = "edb";

/// One encrypted collection of type `T`, stored as `<dir>/<name>.edb`.
///
/// There should be one logical owner per file path: the store serializes its
/// own writes, but a read-modify-write cycle spanning `load` and `save` is
/// not atomic.
pub struct DatasetStore<T> {
    name: String,
    path: PathBuf,
    encryptor: Arc<dyn DataEncryptor>,
    allow_fallback: bool,
    migration: MigrationOutcome,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for DatasetStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetStore")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("allow_fallback", &self.allow_fallback)
            .field("migration", &self.migration)
            .finish()
    }
}

impl<T> DatasetStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Opens the `name` collection under `dir`, migrating a legacy plaintext
    /// `<name>.json` first if one is present and no `.edb` exists yet.
    ///
    /// Fallback decryption is enabled.
    pub fn open(dir: impl AsRef<Path>, name: &str, encryptor: Arc<dyn DataEncryptor>) -> Self {
        Self::open_with_options(dir, name, encryptor, true)
    }

    pub fn open_with_options(
        dir: impl AsRef<Path>,
        name: &str,
        encryptor: Arc<dyn DataEncryptor>,
        allow_fallback: bool,
    ) -> Self {
        let dir = dir.as_ref();
        let migration = migrate_legacy::<T>(dir, name, encryptor.as_ref());
        Self {
            name: name.to_string(),
            path: dataset_path(dir, name),
            encryptor,
            allow_fallback,
            migration,
            _marker: PhantomData,
        }
    }

    /// Loads the collection, or `T::default()` if the file is missing,
    /// cannot be decrypted, or does not deserialize.
    pub fn load(&self) -> T {
        match self.try_load() {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                warn!(dataset = %self.name, "dataset unreadable, using empty value: {e}");
                T::default()
            }
        }
    }

    /// Like [`load`](Self::load) but reports why nothing was loaded.
    /// `Ok(None)` means the file does not exist.
    pub fn try_load(&self) -> StorageResult<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        let blob = BASE64
            .decode(text.trim())
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        let plaintext = if self.allow_fallback {
            self.encryptor.recover_bytes(&blob)?
        } else {
            self.encryptor.decrypt_bytes(&blob)?
        };
        let value = serde_json::from_slice(&plaintext)?;
        debug!(dataset = %self.name, "dataset loaded");
        Ok(Some(value))
    }

    /// Serializes, encrypts and atomically replaces the file.
    /// Returns `false` (and logs) on failure instead of raising.
    pub fn save(&self, value: &T) -> bool {
        match self.try_save(value) {
            Ok(()) => true,
            Err(e) => {
                warn!(dataset = %self.name, "dataset save failed: {e}");
                false
            }
        }
    }

    pub fn try_save(&self, value: &T) -> StorageResult<()> {
        let plaintext = serde_json::to_vec(value)?;
        let blob = self.encryptor.encrypt_bytes(&plaintext)?;
        write_atomic(&self.path, BASE64.encode(blob).as_bytes())?;
        Ok(())
    }
}

impl<T> DatasetStore<T> {
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Removes the file. Deleting a missing dataset is not an error.
    pub fn delete(&self) -> StorageResult<()> {
        with_path_lock(&self.path, || match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What happened to a legacy plaintext file when this store was opened.
    pub fn migration(&self) -> &MigrationOutcome {
        &self.migration
    }
}

pub(crate) fn dataset_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{DATASET_EXTENSION}"))
}
