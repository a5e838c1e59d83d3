//! One-time migration of legacy plaintext `<name>.json` datasets.

use crate::dataset::dataset_path;
use crate::error::{StorageError, StorageResult};
use crate::fs::{backup_timestamp, with_path_lock, write_atomic};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use evalvault_crypto::DataEncryptor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File extension of legacy plaintext datasets.
pub const LEGACY_EXTENSION: &str = "json";

/// Result of a migration check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy plaintext file exists.
    NotNeeded,
    /// A legacy file exists but the `.edb` already does too; nothing touched.
    AlreadyMigrated,
    /// The legacy file was encrypted into `.edb` and renamed to `backup`.
    Migrated { backup: PathBuf },
    /// Migration was attempted and failed; the legacy file is left in place.
    Failed(String),
}

pub fn legacy_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{LEGACY_EXTENSION}"))
}

/// Migrates `<dir>/<name>.json` into `<dir>/<name>.edb` if the former exists
/// and the latter does not. Idempotent: once `.edb` exists this is a no-op.
pub fn migrate_legacy<T>(dir: &Path, name: &str, encryptor: &dyn DataEncryptor) -> MigrationOutcome
where
    T: Serialize + DeserializeOwned,
{
    let legacy = legacy_path(dir, name);
    if !legacy.exists() {
        return MigrationOutcome::NotNeeded;
    }
    let target = dataset_path(dir, name);
    if target.exists() {
        return MigrationOutcome::AlreadyMigrated;
    }

    match migrate::<T>(&legacy, &target, encryptor) {
        Ok(backup) => {
            info!(dataset = name, backup = %backup.display(), "legacy plaintext dataset migrated");
            MigrationOutcome::Migrated { backup }
        }
        Err(e) => {
            warn!(dataset = name, "legacy dataset migration failed: {e}");
            MigrationOutcome::Failed(e.to_string())
        }
    }
}

fn migrate<T>(legacy: &Path, target: &Path, encryptor: &dyn DataEncryptor) -> StorageResult<PathBuf>
where
    T: Serialize + DeserializeOwned,
{
    let text = std::fs::read_to_string(legacy)?;
    let value: T = serde_json::from_str(&text)?;
    let plaintext = serde_json::to_vec(&value)?;
    let blob = encryptor.encrypt_bytes(&plaintext)?;
    write_atomic(target, BASE64.encode(blob).as_bytes())?;

    let backup = backup_path_for(legacy);
    with_path_lock(legacy, || std::fs::rename(legacy, &backup)).map_err(StorageError::from)?;
    Ok(backup)
}

/// `<file>.backup_<timestamp>`, with a counter appended if that name is taken.
fn backup_path_for(legacy: &Path) -> PathBuf {
    let file_name = legacy
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = format!("{file_name}.backup_{}", backup_timestamp());

    let mut candidate = legacy.with_file_name(&stem);
    let mut n = 1;
    while candidate.exists() {
        candidate = legacy.with_file_name(format!("{stem}_{n}"));
        n += 1;
    }
    candidate
}
