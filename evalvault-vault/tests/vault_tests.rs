use evalvault_vault::{
    EnvironmentFingerprint, FileStatus, FingerprintKeyWrapper, LoginOutcome, MasterKeyOrigin,
    Vault, VaultConfig, VaultError,
};
use evalvault_storage::{legacy_path, MigrationOutcome};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::tempdir;

const PASSWORD: &str = "Passw0rd!";
const HINT: &str = "first pet + year";
const Q1: &str = "Name of your primary school?";
const A1: &str = "Sunrise Primary";
const Q2: &str = "City you were born in?";
const A2: &str = "Hangzhou";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct Student {
    id: u32,
    name: String,
}

fn students() -> Vec<Student> {
    vec![
        Student {
            id: 1,
            name: "Zhang Wei".into(),
        },
        Student {
            id: 2,
            name: "王芳".into(),
        },
    ]
}

fn config(dir: &Path) -> VaultConfig {
    VaultConfig::for_dir(dir).with_iterations(1_000)
}

fn host(name: &str) -> FingerprintKeyWrapper {
    FingerprintKeyWrapper::pinned(EnvironmentFingerprint::new(name, "mr-li", "Windows 10"))
}

fn open(dir: &Path) -> Vault {
    Vault::open_with_wrapper(config(dir), &host("lab-pc")).unwrap()
}

fn provisioned(dir: &Path) -> Vault {
    let vault = open(dir);
    vault
        .authenticator()
        .provision(PASSWORD, PASSWORD, Some(HINT), &[(Q1, A1), (Q2, A2)])
        .unwrap();
    vault
}

fn stored_identity(dir: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(dir.join("Database1.json")).unwrap()).unwrap()
}

// ── Provisioning and login ───────────────────────────────────────

#[test]
fn provision_then_login() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    assert!(vault.is_authenticated());
    assert!(vault.authenticator().is_provisioned());
    drop(vault);

    let vault = open(dir.path());
    assert!(!vault.is_authenticated());
    let outcome = vault.authenticator().login(PASSWORD);
    assert_eq!(
        outcome,
        LoginOutcome {
            success: true,
            hint: None
        }
    );
    assert!(vault.is_authenticated());
}

#[test]
fn wrong_password_surfaces_hint_once() {
    let dir = tempdir().unwrap();
    drop(provisioned(dir.path()));
    let vault = open(dir.path());

    let first = vault.authenticator().login("wrong");
    assert!(!first.success);
    assert_eq!(first.hint.as_deref(), Some(HINT));

    let second = vault.authenticator().login("still wrong");
    assert!(!second.success);
    assert_eq!(second.hint, None);
    assert!(!vault.is_authenticated());

    assert!(vault.authenticator().login(PASSWORD).success);
}

#[test]
fn missing_account_looks_like_wrong_password() {
    let empty = tempdir().unwrap();
    let fresh = open(empty.path());
    let no_account = fresh.authenticator().login(PASSWORD);

    let dir = tempdir().unwrap();
    let vault = open(dir.path());
    vault
        .authenticator()
        .provision(PASSWORD, PASSWORD, None, &[])
        .unwrap();
    let wrong = open(dir.path()).authenticator().login("wrong password");

    assert_eq!(no_account, wrong);
    assert!(!no_account.success);
}

#[test]
fn each_login_rotates_the_token() {
    let dir = tempdir().unwrap();
    drop(provisioned(dir.path()));
    let provisioned_token = stored_identity(dir.path());

    let vault = open(dir.path());
    assert!(vault.authenticator().login(PASSWORD).success);
    let first = stored_identity(dir.path());
    assert!(vault.authenticator().login(PASSWORD).success);
    let second = stored_identity(dir.path());

    assert_ne!(provisioned_token["ID1"], first["ID1"]);
    assert_ne!(first["ID1"], second["ID1"]);
    assert_eq!(first["Salt1"], second["Salt1"]);
    assert_eq!(first["Iterations"], second["Iterations"]);

    assert!(open(dir.path()).authenticator().login(PASSWORD).success);
}

#[test]
fn provisioning_validation() {
    let dir = tempdir().unwrap();
    let vault = open(dir.path());
    let auth = vault.authenticator();

    assert!(matches!(
        auth.provision("short", "short", None, &[]),
        Err(VaultError::PasswordTooShort(8))
    ));
    assert!(matches!(
        auth.provision(PASSWORD, "Passw0rd?", None, &[]),
        Err(VaultError::PasswordMismatch)
    ));
    assert!(matches!(
        auth.provision(PASSWORD, PASSWORD, None, &[(Q1, "")]),
        Err(VaultError::Validation(_))
    ));
    assert!(!auth.is_provisioned());
    assert!(!vault.is_authenticated());

    auth.provision(PASSWORD, PASSWORD, None, &[]).unwrap();
    assert!(matches!(
        auth.provision("Another1!", "Another1!", None, &[]),
        Err(VaultError::AlreadyProvisioned)
    ));
}

#[test]
fn logout_clears_session() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    vault.authenticator().logout();
    assert!(!vault.is_authenticated());
    assert!(matches!(
        vault.dataset::<Vec<Student>>("students"),
        Err(VaultError::NotAuthenticated)
    ));
}

#[test]
fn short_minimum_password_config_is_rejected() {
    let dir = tempdir().unwrap();
    let mut lax = config(dir.path());
    lax.min_password_len = 4;

    assert!(matches!(
        Vault::open_with_wrapper(lax, &host("lab-pc")),
        Err(VaultError::Validation(_))
    ));
    assert!(!dir.path().join(".master_key").exists());
}

#[test]
fn repeated_logins_keep_working() {
    let dir = tempdir().unwrap();
    let vault = open(dir.path());
    assert!(matches!(
        vault.authenticator().provision("abcd1", "abcd1", None, &[]),
        Err(VaultError::PasswordTooShort(8))
    ));
    vault
        .authenticator()
        .provision("abcd1234", "abcd1234", None, &[])
        .unwrap();
    drop(vault);

    for _ in 0..3 {
        assert!(open(dir.path()).authenticator().login("abcd1234").success);
    }
}

// ── Password change ──────────────────────────────────────────────

#[test]
fn change_password_requires_current() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    let salt_before = stored_identity(dir.path())["Salt1"].clone();

    assert!(matches!(
        vault
            .authenticator()
            .change_password("not it", "NewPassw0rd", "NewPassw0rd"),
        Err(VaultError::InvalidPassword)
    ));
    vault
        .authenticator()
        .change_password(PASSWORD, "NewPassw0rd", "NewPassw0rd")
        .unwrap();
    assert_ne!(stored_identity(dir.path())["Salt1"], salt_before);

    let reopened = open(dir.path());
    assert!(!reopened.authenticator().login(PASSWORD).success);
    assert!(reopened.authenticator().login("NewPassw0rd").success);
}

// ── Recovery ─────────────────────────────────────────────────────

#[test]
fn recovery_accepts_answers_in_any_order() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    let recovery = vault.recovery();

    assert!(recovery.has_recovery());
    assert_eq!(recovery.questions(), vec![Q1.to_string(), Q2.to_string()]);
    assert!(recovery.verify_answers(&[(Q1, A1), (Q2, A2)]));
    assert!(recovery.verify_answers(&[(Q2, A2), (Q1, A1)]));
}

#[test]
fn recovery_rejects_partial_and_swapped_answers() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    let recovery = vault.recovery();

    assert!(!recovery.verify_answers(&[(Q1, A1), (Q2, "Shanghai")]));
    assert!(!recovery.verify_answers(&[(Q1, A2), (Q2, A1)]));
    assert!(!recovery.verify_answers(&[]));
}

#[test]
fn recovery_resets_password() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());

    assert!(matches!(
        vault.recovery().reset_password_with_recovery(
            &[(Q1, A1), (Q2, "nope")],
            "Recovered1!",
            "Recovered1!"
        ),
        Err(VaultError::RecoveryFailed)
    ));
    vault
        .recovery()
        .reset_password_with_recovery(&[(Q2, A2), (Q1, A1)], "Recovered1!", "Recovered1!")
        .unwrap();

    let reopened = open(dir.path());
    assert!(!reopened.authenticator().login(PASSWORD).success);
    assert!(reopened.authenticator().login("Recovered1!").success);
}

// ── Datasets and the master key ──────────────────────────────────

#[test]
fn datasets_require_authentication() {
    let dir = tempdir().unwrap();
    drop(provisioned(dir.path()));

    let vault = open(dir.path());
    assert!(matches!(
        vault.dataset::<Vec<Student>>("students"),
        Err(VaultError::NotAuthenticated)
    ));
    assert!(vault.authenticator().login(PASSWORD).success);
    assert!(vault.dataset::<Vec<Student>>("students").is_ok());
    assert!(matches!(
        vault.dataset::<Vec<Student>>("../escape"),
        Err(VaultError::Validation(_))
    ));
}

#[test]
fn dataset_survives_reopen() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    assert_eq!(vault.key_origin(), MasterKeyOrigin::Created);
    assert!(vault.dataset("students").unwrap().save(&students()));
    let key_id = vault.key_provider().key_id();
    drop(vault);

    let vault = open(dir.path());
    assert_eq!(vault.key_origin(), MasterKeyOrigin::Loaded);
    assert_eq!(vault.key_provider().key_id(), key_id);
    assert!(vault.authenticator().login(PASSWORD).success);
    assert_eq!(vault.dataset::<Vec<Student>>("students").unwrap().load(), students());
}

#[test]
fn deleting_master_key_loses_datasets_silently() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    assert!(vault.dataset("students").unwrap().save(&students()));
    let old_key = vault.key_provider().key_id();
    drop(vault);

    std::fs::remove_file(dir.path().join(".master_key")).unwrap();

    let vault = open(dir.path());
    assert_eq!(vault.key_origin(), MasterKeyOrigin::Created);
    assert_ne!(vault.key_provider().key_id(), old_key);

    // The identity record does not depend on the master key.
    assert!(vault.authenticator().login(PASSWORD).success);
    let store = vault.dataset::<Vec<Student>>("students").unwrap();
    assert!(store.exists());
    assert_eq!(store.load(), Vec::new());
}

#[test]
fn host_change_regenerates_master_key() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    assert!(vault.dataset("students").unwrap().save(&students()));
    drop(vault);

    let moved = Vault::open_with_wrapper(config(dir.path()), &host("renamed-pc")).unwrap();
    assert_eq!(moved.key_origin(), MasterKeyOrigin::Regenerated);
    assert!(moved.authenticator().login(PASSWORD).success);
    assert_eq!(
        moved.dataset::<Vec<Student>>("students").unwrap().load(),
        Vec::new()
    );
}

#[test]
fn legacy_dataset_migrates_through_vault() {
    let dir = tempdir().unwrap();
    std::fs::write(
        legacy_path(dir.path(), "students"),
        serde_json::to_string(&students()).unwrap(),
    )
    .unwrap();

    let vault = provisioned(dir.path());
    let store = vault.dataset::<Vec<Student>>("students").unwrap();
    assert!(matches!(store.migration(), MigrationOutcome::Migrated { .. }));
    assert_eq!(store.load(), students());
    drop(vault);

    let vault = open(dir.path());
    assert!(vault.authenticator().login(PASSWORD).success);
    let store = vault.dataset::<Vec<Student>>("students").unwrap();
    assert_eq!(store.migration(), &MigrationOutcome::NotNeeded);
    assert_eq!(store.load(), students());
}

// ── Maintenance ──────────────────────────────────────────────────

#[test]
fn diagnostics_of_healthy_vault() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    assert!(vault.dataset("students").unwrap().save(&students()));

    let report = vault.maintenance().diagnose();
    assert!(report.is_healthy(), "{report}");
    assert_eq!(report.checks.len(), 5);
    assert!(report.checks.iter().all(|c| c.status == FileStatus::Ok));
    assert!(report.environment.contains("Machine name:"));
}

#[test]
fn diagnostics_flag_corrupted_files() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    std::fs::write(dir.path().join("Database1.json"), "{ not json").unwrap();
    std::fs::write(dir.path().join(".master_key"), "AAAA").unwrap();

    let report = vault.maintenance().diagnose();
    assert!(!report.is_healthy());
    let invalid: Vec<_> = report
        .invalid()
        .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(invalid, vec![".master_key".to_string(), "Database1.json".to_string()]);
}

#[test]
fn backup_copies_vault_files() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    assert!(vault.dataset("students").unwrap().save(&students()));

    let backup = vault.maintenance().backup().unwrap();
    assert!(backup.starts_with(dir.path().join("backups")));
    assert!(backup
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("backup_"));
    for name in [".master_key", "Database1.json", "pwhint1.ini", "secqa.json", "students.edb"] {
        assert_eq!(
            std::fs::read(backup.join(name)).unwrap(),
            std::fs::read(dir.path().join(name)).unwrap(),
            "{name}"
        );
    }
}

#[test]
fn reset_wipes_vault_and_keeps_backup() {
    let dir = tempdir().unwrap();
    let vault = provisioned(dir.path());
    assert!(vault.dataset("students").unwrap().save(&students()));

    let report = vault.maintenance().reset(true).unwrap();
    let backup = report.backup.expect("backup requested");
    assert!(backup.join("Database1.json").exists());
    assert_eq!(report.removed.len(), 5);
    for name in [".master_key", "Database1.json", "pwhint1.ini", "secqa.json", "students.edb"] {
        assert!(!dir.path().join(name).exists(), "{name}");
    }
    drop(vault);

    let vault = open(dir.path());
    assert_eq!(vault.key_origin(), MasterKeyOrigin::Created);
    assert!(!vault.authenticator().is_provisioned());
    assert!(!vault.recovery().has_recovery());
}

// ── Errors ───────────────────────────────────────────────────────

#[test]
fn error_messages() {
    assert_eq!(
        VaultError::PasswordTooShort(8).to_string(),
        "password too short (min 8 characters)"
    );
    assert_eq!(VaultError::PasswordMismatch.to_string(), "passwords do not match");
    assert_eq!(VaultError::NotAuthenticated.to_string(), "not authenticated");
    assert_eq!(
        VaultError::RecoveryFailed.to_string(),
        "security answers did not match"
    );
}
