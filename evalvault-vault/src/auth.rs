//! Provisioning, login and password change.
//!
//! Login runs an ordered list of verification strategies against the stored
//! identity record and succeeds if any of them opens it:
//!
//! 1. `device-bound`: the password extended with the tail of a device tag
//!    that is generated fresh on every attempt.
//! 2. `direct`: the password itself.
//!
//! The device tag is random per attempt and not derived from the host, so
//! the device-bound path cannot bind a record to a machine. Both paths are
//! kept and tried in this order.
//!
//! A successful login re-seals the record with a new random token, keyed by
//! the device-bound candidate under the existing salt and iterations.
//!
//! Failures report only `success = false` plus, on the first failure of an
//! [`Authenticator`], the stored hint. A missing account and a wrong
//! password look the same.

use crate::config::MIN_PASSWORD_LEN;
use crate::error::{VaultError, VaultResult};
use crate::hint::{HintStore, LOGIN_HINT_SLOT};
use crate::identity::{IdentityRecord, IdentityStore};
use crate::recovery::RecoveryStore;
use evalvault_crypto::{KdfParams, Salt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Length of the per-attempt device tag.
const DEVICE_TAG_LEN: usize = 8;

// ============================================================================
// Verification strategies
// ============================================================================

/// One way of turning an attempted password into the secret the identity
/// record is checked against.
pub struct VerificationStrategy {
    pub name: &'static str,
    candidate: fn(&str) -> Zeroizing<String>,
}

impl VerificationStrategy {
    pub fn candidate(&self, password: &str) -> Zeroizing<String> {
        (self.candidate)(password)
    }

    pub fn verify(&self, record: &IdentityRecord, password: &str) -> bool {
        record.opens_with(&self.candidate(password))
    }
}

/// Tried in order; the first match wins.
pub const VERIFICATION_STRATEGIES: [VerificationStrategy; 2] = [
    VerificationStrategy {
        name: "device-bound",
        candidate: device_bound_candidate,
    },
    VerificationStrategy {
        name: "direct",
        candidate: direct_candidate,
    },
];

/// `password` followed by the characters of a new device tag that lie past
/// the password's length.
pub fn device_bound_candidate(password: &str) -> Zeroizing<String> {
    let tag = device_tag();
    let mut candidate = Zeroizing::new(String::with_capacity(password.len() + DEVICE_TAG_LEN));
    candidate.push_str(password);
    candidate.extend(tag.chars().skip(password.chars().count()));
    candidate
}

fn direct_candidate(password: &str) -> Zeroizing<String> {
    Zeroizing::new(password.to_string())
}

fn device_tag() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(DEVICE_TAG_LEN)
        .collect()
}

fn verify_any(record: &IdentityRecord, password: &str) -> bool {
    VERIFICATION_STRATEGIES.iter().any(|strategy| {
        let ok = strategy.verify(record, password);
        if ok {
            debug!(strategy = strategy.name, "identity verified");
        }
        ok
    })
}

/// Length and confirmation checks for a new password.
pub(crate) fn validate_new_password(
    password: &str,
    confirm: &str,
    min_len: usize,
) -> VaultResult<()> {
    // Shorter passwords would not survive login rotation.
    let min_len = min_len.max(MIN_PASSWORD_LEN);
    if password.chars().count() < min_len {
        return Err(VaultError::PasswordTooShort(min_len));
    }
    if password != confirm {
        return Err(VaultError::PasswordMismatch);
    }
    Ok(())
}

// ============================================================================
// Session
// ============================================================================

/// The authenticated flag of one vault instance.
#[derive(Debug, Default)]
pub struct Session {
    authenticated: AtomicBool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub(crate) fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::Release);
    }
}

/// Result of a login attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginOutcome {
    pub success: bool,
    /// The stored hint, on the first failed attempt only.
    pub hint: Option<String>,
}

// ============================================================================
// Authenticator
// ============================================================================

pub struct Authenticator {
    identity: IdentityStore,
    hints: HintStore,
    recovery: RecoveryStore,
    session: Arc<Session>,
    kdf: KdfParams,
    min_password_len: usize,
    hint_shown: AtomicBool,
}

impl Authenticator {
    pub fn new(
        identity: IdentityStore,
        hints: HintStore,
        recovery: RecoveryStore,
        session: Arc<Session>,
        kdf: KdfParams,
        min_password_len: usize,
    ) -> Self {
        Self {
            identity,
            hints,
            recovery,
            session,
            kdf,
            min_password_len,
            hint_shown: AtomicBool::new(false),
        }
    }

    /// Whether a readable identity record exists.
    pub fn is_provisioned(&self) -> bool {
        self.identity.load_or_none().is_some()
    }

    /// First-run setup. Seals a new identity record, stores the optional
    /// hint and security questions, and marks the session authenticated.
    pub fn provision(
        &self,
        password: &str,
        confirm: &str,
        hint: Option<&str>,
        questions: &[(&str, &str)],
    ) -> VaultResult<()> {
        validate_new_password(password, confirm, self.min_password_len)?;
        if self.is_provisioned() {
            return Err(VaultError::AlreadyProvisioned);
        }
        if self.identity.exists() {
            warn!("replacing unreadable identity file");
        }
        // Checked before anything is written.
        if !questions.is_empty() {
            crate::recovery::validate_questions(questions)?;
        }

        let record = IdentityRecord::seal(password, Salt::random(), &self.kdf)?;
        self.identity.save(&record)?;
        self.hints.save(LOGIN_HINT_SLOT, hint)?;
        if !questions.is_empty() {
            self.recovery.configure_questions(questions)?;
        }

        self.session.set_authenticated(true);
        info!(
            with_hint = hint.is_some_and(|h| !h.trim().is_empty()),
            questions = questions.len(),
            "vault provisioned"
        );
        Ok(())
    }

    /// Never errors. On success the record is rotated and the session is
    /// marked authenticated.
    pub fn login(&self, password: &str) -> LoginOutcome {
        let Some(record) = self.identity.load_or_none() else {
            return self.failed();
        };
        if !verify_any(&record, password) {
            return self.failed();
        }

        self.rotate(&record, password);
        self.session.set_authenticated(true);
        info!("login succeeded");
        LoginOutcome {
            success: true,
            hint: None,
        }
    }

    /// Re-verifies `current`, then re-seals under `new_password` with a new salt.
    pub fn change_password(
        &self,
        current: &str,
        new_password: &str,
        confirm: &str,
    ) -> VaultResult<()> {
        validate_new_password(new_password, confirm, self.min_password_len)?;
        let record = self
            .identity
            .load_or_none()
            .ok_or(VaultError::InvalidPassword)?;
        if !verify_any(&record, current) {
            return Err(VaultError::InvalidPassword);
        }

        let record = IdentityRecord::seal(new_password, Salt::random(), &self.kdf)?;
        self.identity.save(&record)?;
        info!("password changed");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn logout(&self) {
        self.session.set_authenticated(false);
        debug!("logged out");
    }

    fn failed(&self) -> LoginOutcome {
        warn!("login failed");
        let hint = if self.hint_shown.swap(true, Ordering::AcqRel) {
            None
        } else {
            self.hints.load(LOGIN_HINT_SLOT)
        };
        LoginOutcome {
            success: false,
            hint,
        }
    }

    fn rotate(&self, record: &IdentityRecord, password: &str) {
        let candidate = device_bound_candidate(password);
        let rotated = match IdentityRecord::seal(&candidate, record.salt(), &record.kdf_params()) {
            Ok(rotated) => rotated,
            Err(e) => {
                warn!("identity rotation failed: {e}");
                return;
            }
        };
        if let Err(e) = self.identity.save(&rotated) {
            warn!("identity rotation not persisted: {e}");
        }
    }
}
