//! Password hints (`pwhint1.ini`).
//!
//! One line per slot: empty, or `base64(utf8(hint))`. The encoding only
//! keeps the hint from being read at a glance; it is not encryption.

use crate::error::VaultResult;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use evalvault_storage::write_atomic;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Slot holding the login password hint.
pub const LOGIN_HINT_SLOT: usize = 0;

#[derive(Clone, Debug)]
pub struct HintStore {
    path: PathBuf,
}

impl HintStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The hint in `slot`, or `None` if the slot is empty, missing or undecodable.
    pub fn load(&self, slot: usize) -> Option<String> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        let line = text.lines().nth(slot)?.trim();
        if line.is_empty() {
            return None;
        }
        match BASE64.decode(line).map(String::from_utf8) {
            Ok(Ok(hint)) => Some(hint),
            _ => {
                warn!(slot, "password hint undecodable");
                None
            }
        }
    }

    /// Writes `hint` into `slot`, keeping other slots. `None` or a blank
    /// hint clears the slot.
    pub fn save(&self, slot: usize, hint: Option<&str>) -> VaultResult<()> {
        let mut lines: Vec<String> = match std::fs::read_to_string(&self.path) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if lines.len() <= slot {
            lines.resize(slot + 1, String::new());
        }
        lines[slot] = match hint.map(str::trim) {
            Some(h) if !h.is_empty() => BASE64.encode(h.as_bytes()),
            _ => String::new(),
        };

        let mut contents = lines.join("\n");
        contents.push('\n');
        write_atomic(&self.path, contents.as_bytes())?;
        Ok(())
    }

    /// Per-slot decodability, for diagnostics.
    pub fn check_lines(&self) -> VaultResult<Vec<Result<(), String>>> {
        let text = std::fs::read_to_string(&self.path)?;
        Ok(text
            .lines()
            .map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return Ok(());
                }
                match BASE64.decode(line).map(String::from_utf8) {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(e) => Err(e.to_string()),
                }
            })
            .collect())
    }
}
