//! Environment fingerprint.
//!
//! A low-entropy key derived from host identifiers (machine name, user
//! name, OS version). It only ever wraps the master key. Any change to the
//! identifiers yields a different key, which makes the wrapped master key
//! unreadable on purpose.

use evalvault_crypto::DerivedKey;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use sysinfo::System;
use zeroize::Zeroizing;

/// Mixed into the fingerprint so other applications on the same host get a
/// different key.
const FINGERPRINT_CONTEXT: &str = "evalvault-environment-key-v1";

const UNKNOWN: &str = "unknown";

/// Host identifiers the environment key is derived from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnvironmentFingerprint {
    pub machine_name: String,
    pub user_name: String,
    pub os_version: String,
}

impl EnvironmentFingerprint {
    /// Reads the identifiers of the current host. Missing values become
    /// `"unknown"` rather than failing.
    pub fn capture() -> Self {
        Self {
            machine_name: machine_name(),
            user_name: user_name(),
            os_version: os_version(),
        }
    }

    pub fn new(
        machine_name: impl Into<String>,
        user_name: impl Into<String>,
        os_version: impl Into<String>,
    ) -> Self {
        Self {
            machine_name: machine_name.into(),
            user_name: user_name.into(),
            os_version: os_version.into(),
        }
    }

    /// SHA-256 over the `|`-joined identifiers and the application context.
    pub fn derive_key(&self) -> DerivedKey {
        let material = Zeroizing::new(format!(
            "{}|{}|{}|{}",
            self.machine_name, self.user_name, self.os_version, FINGERPRINT_CONTEXT
        ));
        let digest: [u8; 32] = Sha256::digest(material.as_bytes()).into();
        DerivedKey::from_bytes(digest)
    }
}

impl fmt::Display for EnvironmentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Machine name: {}", self.machine_name)?;
        writeln!(f, "User name:    {}", self.user_name)?;
        write!(f, "OS version:   {}", self.os_version)
    }
}

/// Human-readable snapshot of the fingerprint inputs for support use.
/// Never fails.
pub fn environment_diagnostics() -> String {
    let fingerprint = EnvironmentFingerprint::capture();
    format!(
        "Environment fingerprint inputs\n{fingerprint}\nTarget:       {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn machine_name() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn os_version() -> String {
    System::long_os_version()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| std::env::consts::OS.to_string())
}
