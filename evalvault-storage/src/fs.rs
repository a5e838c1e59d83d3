//! Locked, atomic file writes.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tracing::debug;

/// One lock per target path, shared by every writer in this process.
static PATH_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Returns the lock for `path`, dropping registry entries nobody holds.
fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = PATH_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    // Handles are only cloned under the registry lock, so a count of one
    // means no writer is using or waiting on that entry.
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    locks.entry(path.to_path_buf()).or_default().clone()
}

/// Runs `f` while holding the in-process write lock for `path`.
///
/// This does not coordinate with other processes.
pub fn with_path_lock<R>(path: &Path, f: impl FnOnce() -> R) -> R {
    let lock = lock_for(path);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
    f()
}

/// Writes `contents` to `path` via a sibling temp file and a rename, so a
/// crash leaves either the old file or the new one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    with_path_lock(path, || {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = tmp_path_for(path);
        let result = (|| {
            let mut file = File::create(&tmp_path)?;
            file.write_all(contents)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp_path, path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        } else {
            debug!(path = %path.display(), bytes = contents.len(), "file written");
        }
        result
    })
}

/// Timestamp suffix used for backup file and directory names.
pub fn backup_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.edb");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join("data.edb.tmp").exists());
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("file.json");
        write_atomic(&path, b"{}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn concurrent_writers_to_one_path_are_serialized() {
        let dir = tempdir().unwrap();
        let path = Arc::new(dir.path().join("shared.edb"));

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || write_atomic(&path, &[i; 64]).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let contents = fs::read(path.as_ref()).unwrap();
        assert_eq!(contents.len(), 64);
        assert!(contents.iter().all(|b| *b == contents[0]));
    }

    #[test]
    fn backup_timestamp_shape() {
        let ts = backup_timestamp();
        assert_eq!(ts.len(), 15);
        assert_eq!(&ts[8..9], "_");
    }
}
