//! Encrypted dataset storage for EvalVault.
//!
//! Every logical collection (students, evaluations, teachers, ...) lives in
//! its own `<name>.edb` file under the vault's base directory. The file holds
//! the base64 form of one cipher blob wrapping the JSON-serialized collection.
//!
//! # Architecture
//!
//! - Stores encrypt through an `Arc<dyn DataEncryptor>` and never see the
//!   master key itself
//! - Loads never fail: missing, undecryptable or unparsable files come back
//!   as `T::default()`, so "no data" may also mean "decrypt failed"
//! - Writes go through [`write_atomic`] (temp file, fsync, rename) under a
//!   per-path in-process lock
//! - Legacy plaintext `<name>.json` files are migrated once on open

mod dataset;
mod error;
mod fs;
mod migration;

pub use dataset::{DatasetStore, DATASET_EXTENSION};
pub use error::{StorageError, StorageResult};
pub use fs::{backup_timestamp, with_path_lock, write_atomic};
pub use migration::{legacy_path, migrate_legacy, MigrationOutcome, LEGACY_EXTENSION};
