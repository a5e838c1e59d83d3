//! File layout of a vault base directory.

use std::path::{Path, PathBuf};

pub const IDENTITY_FILE: &str = "Database1.json";
pub const MASTER_KEY_FILE: &str = ".master_key";
pub const HINT_FILE: &str = "pwhint1.ini";
pub const SECURITY_QUESTIONS_FILE: &str = "secqa.json";
pub const BACKUPS_DIR: &str = "backups";

/// Resolves every well-known file under one base directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaultPaths {
    base_dir: PathBuf,
}

impl VaultPaths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn identity(&self) -> PathBuf {
        self.base_dir.join(IDENTITY_FILE)
    }

    pub fn master_key(&self) -> PathBuf {
        self.base_dir.join(MASTER_KEY_FILE)
    }

    pub fn hints(&self) -> PathBuf {
        self.base_dir.join(HINT_FILE)
    }

    pub fn security_questions(&self) -> PathBuf {
        self.base_dir.join(SECURITY_QUESTIONS_FILE)
    }

    pub fn backups(&self) -> PathBuf {
        self.base_dir.join(BACKUPS_DIR)
    }

    /// The fixed vault files, in diagnostic order. Datasets are not included.
    pub fn well_known(&self) -> [PathBuf; 4] {
        [
            self.master_key(),
            self.identity(),
            self.hints(),
            self.security_questions(),
        ]
    }
}
