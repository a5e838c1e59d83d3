//! Security-question recovery (`secqa.json`).
//!
//! Each configured question stores a salted digest of its answer. Recovery
//! succeeds only when every configured question is answered correctly; the
//! caller then sets a new password and the identity record is re-sealed
//! under a fresh salt.

use crate::auth::validate_new_password;
use crate::error::{VaultError, VaultResult};
use crate::identity::{IdentityRecord, IdentityStore};
use evalvault_crypto::{AnswerDigest, KdfParams, Salt};
use evalvault_storage::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SecurityQuestionEntry {
    #[serde(rename = "Question")]
    pub question: String,
    #[serde(rename = "Salt", with = "crate::b64")]
    pub salt: Vec<u8>,
    #[serde(rename = "Iterations")]
    pub iterations: u32,
    #[serde(rename = "Hash", with = "crate::b64")]
    pub hash: Vec<u8>,
}

impl SecurityQuestionEntry {
    fn new(question: &str, digest: AnswerDigest) -> Self {
        Self {
            question: question.to_string(),
            salt: digest.salt.as_bytes().to_vec(),
            iterations: digest.iterations,
            hash: digest.hash,
        }
    }

    fn digest(&self) -> AnswerDigest {
        AnswerDigest {
            salt: Salt::from_bytes(self.salt.clone()),
            iterations: self.iterations,
            hash: self.hash.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SecurityQuestionFile {
    #[serde(rename = "Items", default)]
    items: Vec<SecurityQuestionEntry>,
}

/// Security questions plus the recovery-driven password reset.
#[derive(Clone, Debug)]
pub struct RecoveryStore {
    path: PathBuf,
    identity: IdentityStore,
    kdf: KdfParams,
    min_password_len: usize,
}

impl RecoveryStore {
    pub fn new(
        path: impl Into<PathBuf>,
        identity: IdentityStore,
        kdf: KdfParams,
        min_password_len: usize,
    ) -> Self {
        Self {
            path: path.into(),
            identity,
            kdf,
            min_password_len,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the configured questions. Questions and answers must be
    /// non-blank and questions must be distinct.
    pub fn configure_questions(&self, pairs: &[(&str, &str)]) -> VaultResult<()> {
        validate_questions(pairs)?;

        let items = pairs
            .iter()
            .map(|(question, answer)| -> VaultResult<SecurityQuestionEntry> {
                let digest = AnswerDigest::create(answer, &self.kdf)?;
                Ok(SecurityQuestionEntry::new(question.trim(), digest))
            })
            .collect::<VaultResult<Vec<_>>>()?;

        let json = serde_json::to_vec_pretty(&SecurityQuestionFile { items })?;
        write_atomic(&self.path, &json)?;
        info!(count = pairs.len(), "security questions configured");
        Ok(())
    }

    /// Configured question texts, in stored order. Empty if none or unreadable.
    pub fn questions(&self) -> Vec<String> {
        match self.entries() {
            Ok(items) => items.into_iter().map(|e| e.question).collect(),
            Err(e) => {
                warn!("security questions unreadable: {e}");
                Vec::new()
            }
        }
    }

    pub fn has_recovery(&self) -> bool {
        !self.questions().is_empty()
    }

    /// `true` only if every configured question has a correct answer in
    /// `answers`, matched by question text. Order does not matter.
    pub fn verify_answers(&self, answers: &[(&str, &str)]) -> bool {
        let entries = match self.entries() {
            Ok(entries) if !entries.is_empty() => entries,
            _ => return false,
        };
        entries.iter().all(|entry| {
            answers
                .iter()
                .find(|(question, _)| question.trim() == entry.question)
                .is_some_and(|(_, answer)| entry.digest().verify(answer))
        })
    }

    /// Verifies `answers`, then re-seals the identity record with
    /// `new_password` under a fresh salt.
    pub fn reset_password_with_recovery(
        &self,
        answers: &[(&str, &str)],
        new_password: &str,
        confirm: &str,
    ) -> VaultResult<()> {
        if !self.has_recovery() {
            return Err(VaultError::RecoveryNotConfigured);
        }
        validate_new_password(new_password, confirm, self.min_password_len)?;
        if !self.verify_answers(answers) {
            warn!("password recovery rejected");
            return Err(VaultError::RecoveryFailed);
        }

        let record = IdentityRecord::seal(new_password, Salt::random(), &self.kdf)?;
        self.identity.save(&record)?;
        info!("password reset through security questions");
        Ok(())
    }

    fn entries(&self) -> VaultResult<Vec<SecurityQuestionEntry>> {
        read_entries(&self.path)
    }
}

/// Raw entries of a `secqa.json`; `Ok(empty)` if the file does not exist.
pub(crate) fn read_entries(path: &Path) -> VaultResult<Vec<SecurityQuestionEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    let file: SecurityQuestionFile = serde_json::from_str(&text)?;
    Ok(file.items)
}

pub(crate) fn validate_questions(pairs: &[(&str, &str)]) -> VaultResult<()> {
    if pairs.is_empty() {
        return Err(VaultError::Validation(
            "at least one security question is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for (question, answer) in pairs {
        let question = question.trim();
        if question.is_empty() || answer.trim().is_empty() {
            return Err(VaultError::Validation(
                "security questions and answers must not be blank".to_string(),
            ));
        }
        if !seen.insert(question) {
            return Err(VaultError::Validation(format!(
                "duplicate security question: {question}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const Q1: &str = "Name of your primary school?";
    const Q2: &str = "Your mother's maiden name?";

    fn store(dir: &Path) -> RecoveryStore {
        RecoveryStore::new(
            dir.join("secqa.json"),
            IdentityStore::new(dir.join("Database1.json")),
            KdfParams::with_iterations(1_000),
            8,
        )
    }

    #[test]
    fn unconfigured_store() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert!(!store.has_recovery());
        assert!(store.questions().is_empty());
        assert!(!store.verify_answers(&[(Q1, "anything")]));
    }

    #[test]
    fn answers_are_case_and_space_insensitive() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store
            .configure_questions(&[(Q1, "Sunrise Primary"), (Q2, "Li")])
            .unwrap();

        assert_eq!(store.questions(), vec![Q1.to_string(), Q2.to_string()]);
        assert!(store.verify_answers(&[(Q1, "  sunrise primary "), (Q2, "LI")]));
    }

    #[test]
    fn file_never_contains_answers() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.configure_questions(&[(Q1, "Sunrise Primary")]).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"Items\""));
        assert!(raw.contains("\"Hash\""));
        assert!(!raw.to_lowercase().contains("sunrise"));
    }

    #[test]
    fn missing_answer_fails() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.configure_questions(&[(Q1, "a"), (Q2, "b")]).unwrap();
        assert!(!store.verify_answers(&[(Q1, "a")]));
    }

    #[test]
    fn rejects_blank_and_duplicate_questions() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(
            store.configure_questions(&[]),
            Err(VaultError::Validation(_))
        ));
        assert!(matches!(
            store.configure_questions(&[(Q1, "  ")]),
            Err(VaultError::Validation(_))
        ));
        assert!(matches!(
            store.configure_questions(&[(Q1, "a"), (Q1, "b")]),
            Err(VaultError::Validation(_))
        ));
        assert!(!store.path().exists());
    }

    #[test]
    fn reset_requires_configuration() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let err = store
            .reset_password_with_recovery(&[(Q1, "a")], "NewPassw0rd", "NewPassw0rd")
            .unwrap_err();
        assert!(matches!(err, VaultError::RecoveryNotConfigured));
    }
}
