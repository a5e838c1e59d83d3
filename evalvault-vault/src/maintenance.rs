//! Diagnostics, backup and reset for a vault directory.
//!
//! Diagnostics work without any key: they only check that each file has
//! the shape it should (parses, decodes, ciphertext is block aligned).
//! `reset` deletes every vault file and cannot be undone.

use crate::error::VaultResult;
use crate::fingerprint;
use crate::hint::HintStore;
use crate::identity::IdentityStore;
use crate::paths::VaultPaths;
use crate::recovery::read_entries;
use evalvault_crypto::CipherBlob;
use evalvault_storage::{backup_timestamp, DATASET_EXTENSION};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SHA256_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileStatus {
    Ok,
    Missing,
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileCheck {
    pub path: PathBuf,
    pub status: FileStatus,
}

impl FileCheck {
    fn new(path: PathBuf, result: Result<(), String>) -> Self {
        let status = if !path.exists() {
            FileStatus::Missing
        } else {
            match result {
                Ok(()) => FileStatus::Ok,
                Err(reason) => FileStatus::Invalid(reason),
            }
        };
        Self { path, status }
    }
}

#[derive(Clone, Debug)]
pub struct DiagnosticReport {
    pub base_dir: PathBuf,
    pub checks: Vec<FileCheck>,
    pub environment: String,
}

impl DiagnosticReport {
    /// No file is invalid. Missing files are fine.
    pub fn is_healthy(&self) -> bool {
        self.invalid().next().is_none()
    }

    pub fn invalid(&self) -> impl Iterator<Item = &FileCheck> {
        self.checks
            .iter()
            .filter(|c| matches!(c.status, FileStatus::Invalid(_)))
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vault directory: {}", self.base_dir.display())?;
        for check in &self.checks {
            let name = check
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| check.path.display().to_string());
            match &check.status {
                FileStatus::Ok => writeln!(f, "  [ok]      {name}")?,
                FileStatus::Missing => writeln!(f, "  [missing] {name}")?,
                FileStatus::Invalid(reason) => writeln!(f, "  [invalid] {name}: {reason}")?,
            }
        }
        writeln!(f)?;
        write!(f, "{}", self.environment)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub backup: Option<PathBuf>,
    pub removed: Vec<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct Maintenance {
    paths: VaultPaths,
}

impl Maintenance {
    pub fn new(paths: VaultPaths) -> Self {
        Self { paths }
    }

    /// Structural check of every vault file. Never fails; problems are
    /// described in the report.
    pub fn diagnose(&self) -> DiagnosticReport {
        let mut checks = vec![
            FileCheck::new(self.paths.master_key(), check_master_key(&self.paths.master_key())),
            FileCheck::new(self.paths.identity(), check_identity(&self.paths.identity())),
            FileCheck::new(self.paths.hints(), check_hints(&self.paths.hints())),
            FileCheck::new(
                self.paths.security_questions(),
                check_security_questions(&self.paths.security_questions()),
            ),
        ];

        match self.datasets() {
            Ok(datasets) => checks.extend(datasets.into_iter().map(|path| {
                let result = check_dataset(&path);
                FileCheck::new(path, result)
            })),
            Err(e) => checks.push(FileCheck {
                path: self.paths.base_dir().to_path_buf(),
                status: FileStatus::Invalid(format!("cannot list directory: {e}")),
            }),
        }

        let report = DiagnosticReport {
            base_dir: self.paths.base_dir().to_path_buf(),
            checks,
            environment: self.environment_diagnostics(),
        };
        if !report.is_healthy() {
            warn!(invalid = report.invalid().count(), "vault diagnostics found problems");
        }
        report
    }

    /// Copies every file in the base directory into
    /// `backups/backup_<timestamp>` and returns that directory.
    pub fn backup(&self) -> VaultResult<PathBuf> {
        let root = self.paths.backups();
        let stem = format!("backup_{}", backup_timestamp());
        let mut target = root.join(&stem);
        let mut n = 1;
        while target.exists() {
            target = root.join(format!("{stem}_{n}"));
            n += 1;
        }
        std::fs::create_dir_all(&target)?;

        let mut copied = 0usize;
        if self.paths.base_dir().exists() {
            for entry in std::fs::read_dir(self.paths.base_dir())? {
                let path = entry?.path();
                if !path.is_file() {
                    continue;
                }
                if let Some(name) = path.file_name() {
                    std::fs::copy(&path, target.join(name))?;
                    copied += 1;
                }
            }
        }
        info!(files = copied, target = %target.display(), "vault backed up");
        Ok(target)
    }

    /// Deletes every vault file: master key, identity, hints, security
    /// questions and encrypted datasets. Backups are kept.
    pub fn reset(&self, backup_first: bool) -> VaultResult<ResetReport> {
        let backup = if backup_first {
            Some(self.backup()?)
        } else {
            None
        };

        let mut targets: Vec<PathBuf> = self.paths.well_known().into_iter().collect();
        if self.paths.base_dir().exists() {
            targets.extend(self.datasets()?);
            targets.extend(self.leftover_temp_files()?);
        }

        let mut removed = Vec::new();
        for path in targets {
            match std::fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        warn!(removed = removed.len(), backed_up = backup.is_some(), "vault reset");
        Ok(ResetReport { backup, removed })
    }

    pub fn environment_diagnostics(&self) -> String {
        fingerprint::environment_diagnostics()
    }

    fn datasets(&self) -> std::io::Result<Vec<PathBuf>> {
        self.files_where(|path| path.extension().is_some_and(|ext| ext == DATASET_EXTENSION))
    }

    fn leftover_temp_files(&self) -> std::io::Result<Vec<PathBuf>> {
        self.files_where(|path| path.extension().is_some_and(|ext| ext == "tmp"))
    }

    fn files_where(&self, keep: impl Fn(&Path) -> bool) -> std::io::Result<Vec<PathBuf>> {
        if !self.paths.base_dir().exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(self.paths.base_dir())? {
            let path = entry?.path();
            if path.is_file() && keep(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn check_blob_text(text: &str) -> Result<(), String> {
    let blob = CipherBlob::from_base64(text).map_err(|e| e.to_string())?;
    blob.validate_structure().map_err(|e| e.to_string())
}

fn check_master_key(path: &Path) -> Result<(), String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    check_blob_text(&text)
}

fn check_dataset(path: &Path) -> Result<(), String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    check_blob_text(&text)
}

fn check_identity(path: &Path) -> Result<(), String> {
    match IdentityStore::new(path).load() {
        Ok(Some(record)) => record.validate_structure().map_err(|e| e.to_string()),
        Ok(None) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

fn check_hints(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    let lines = HintStore::new(path).check_lines().map_err(|e| e.to_string())?;
    match lines.iter().position(Result::is_err) {
        Some(slot) => Err(format!("slot {slot} is not valid base64 text")),
        None => Ok(()),
    }
}

fn check_security_questions(path: &Path) -> Result<(), String> {
    let entries = read_entries(path).map_err(|e| e.to_string())?;
    for entry in &entries {
        if entry.question.trim().is_empty() {
            return Err("blank question".to_string());
        }
        if entry.salt.is_empty() || entry.iterations == 0 {
            return Err(format!("bad parameters for \"{}\"", entry.question));
        }
        if entry.hash.len() != SHA256_LEN {
            return Err(format!("bad hash length for \"{}\"", entry.question));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use tempfile::tempdir;

    #[test]
    fn empty_directory_is_healthy() {
        let dir = tempdir().unwrap();
        let report = Maintenance::new(VaultPaths::new(dir.path())).diagnose();
        assert!(report.is_healthy());
        assert!(report.checks.iter().all(|c| c.status == FileStatus::Missing));
    }

    #[test]
    fn misaligned_dataset_is_invalid() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("students.edb"), BASE64.encode([0u8; 40])).unwrap();

        let report = Maintenance::new(VaultPaths::new(dir.path())).diagnose();
        let bad: Vec<_> = report.invalid().collect();
        assert_eq!(bad.len(), 1);
        assert!(bad[0].path.ends_with("students.edb"));
        assert!(report.to_string().contains("[invalid] students.edb"));
    }

    #[test]
    fn missing_base_dir_reset_is_empty() {
        let dir = tempdir().unwrap();
        let maintenance = Maintenance::new(VaultPaths::new(dir.path().join("nope")));
        let report = maintenance.reset(false).unwrap();
        assert_eq!(report, ResetReport::default());
    }
}
