//! Interactive driver for the local secrets vault.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use evalvault_vault::{environment_diagnostics, Maintenance, Vault, VaultConfig, VaultPaths};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Number of security questions captured during setup.
const SETUP_QUESTIONS: usize = 2;

#[derive(Parser)]
#[command(name = "evalvault", version, about = "Local secrets vault")]
struct Cli {
    /// Vault directory (overrides the config file).
    #[arg(long, global = true, env = "EVALVAULT_DIR")]
    dir: Option<PathBuf>,

    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// First-run setup: password, hint and security questions.
    Setup,
    /// Check a password.
    Login,
    /// Change the password.
    ChangePassword,
    /// Reset the password by answering the security questions.
    Recover,
    /// Check every vault file without decrypting anything.
    Diagnose,
    /// Copy the vault files into a timestamped backup directory.
    Backup,
    /// Delete every vault file. Irreversible.
    Reset {
        /// Skip the backup taken before wiping.
        #[arg(long)]
        no_backup: bool,
        /// Confirm the wipe.
        #[arg(long)]
        yes: bool,
    },
    /// Print the host identifiers the master key is bound to.
    Env,
}

fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<VaultConfig> {
    let mut config = match &cli.config {
        Some(path) => VaultConfig::load(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => VaultConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config.base_dir = dir.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Setup => setup(config),
        Command::Login => login(config),
        Command::ChangePassword => change_password(config),
        Command::Recover => recover(config),
        Command::Diagnose => {
            let report = Maintenance::new(VaultPaths::new(&config.base_dir)).diagnose();
            if !report.is_healthy() {
                warn!(invalid = report.invalid().count(), "vault files failed diagnostics");
            }
            println!("{report}");
            Ok(if report.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Backup => {
            let target = Maintenance::new(VaultPaths::new(&config.base_dir)).backup()?;
            info!(target_dir = %target.display(), "backup complete");
            println!("Backup written to {}", target.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Reset { no_backup, yes } => {
            if !yes {
                bail!("reset deletes every vault file; pass --yes to confirm");
            }
            let backup_first = config.backup_before_reset && !no_backup;
            let report = Maintenance::new(VaultPaths::new(&config.base_dir)).reset(backup_first)?;
            warn!(
                removed = report.removed.len(),
                backed_up = report.backup.is_some(),
                "vault reset"
            );
            if let Some(backup) = &report.backup {
                println!("Backup written to {}", backup.display());
            }
            println!("Removed {} file(s). The vault is empty.", report.removed.len());
            Ok(ExitCode::SUCCESS)
        }
        Command::Env => {
            println!("{}", environment_diagnostics());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn setup(config: VaultConfig) -> Result<ExitCode> {
    let vault = Vault::open(config)?;
    if vault.authenticator().is_provisioned() {
        bail!("vault already set up; use change-password or recover");
    }

    println!(
        "Choose a password (at least {} characters).",
        vault.config().min_password_len
    );
    let password = prompt_secret("Password: ")?;
    let confirm = prompt_secret("Confirm password: ")?;
    let hint = prompt_line("Password hint (optional): ")?;

    let mut questions = Vec::with_capacity(SETUP_QUESTIONS);
    for n in 1..=SETUP_QUESTIONS {
        let question = prompt_line(&format!("Security question {n}: "))?;
        let answer = prompt_secret(&format!("Answer {n}: "))?;
        questions.push((question, answer));
    }
    let pairs: Vec<(&str, &str)> = questions
        .iter()
        .map(|(q, a)| (q.as_str(), a.as_str()))
        .collect();

    vault.authenticator().provision(
        &password,
        &confirm,
        Some(hint.as_str()).filter(|h| !h.is_empty()),
        &pairs,
    )?;
    info!(questions = pairs.len(), "vault provisioned");
    println!("Vault ready at {}", vault.base_dir().display());
    Ok(ExitCode::SUCCESS)
}

fn login(config: VaultConfig) -> Result<ExitCode> {
    let vault = Vault::open(config)?;
    let password = prompt_secret("Password: ")?;
    let outcome = vault.authenticator().login(&password);
    if outcome.success {
        println!("Login successful.");
        return Ok(ExitCode::SUCCESS);
    }

    warn!(hint_shown = outcome.hint.is_some(), "login failed");
    println!("Login failed.");
    if let Some(hint) = outcome.hint {
        println!("Hint: {hint}");
    }
    Ok(ExitCode::FAILURE)
}

fn change_password(config: VaultConfig) -> Result<ExitCode> {
    let vault = Vault::open(config)?;
    let current = prompt_secret("Current password: ")?;
    let new_password = prompt_secret("New password: ")?;
    let confirm = prompt_secret("Confirm new password: ")?;
    vault
        .authenticator()
        .change_password(&current, &new_password, &confirm)?;
    info!("password changed");
    println!("Password changed.");
    Ok(ExitCode::SUCCESS)
}

fn recover(config: VaultConfig) -> Result<ExitCode> {
    let vault = Vault::open(config)?;
    let questions = vault.recovery().questions();
    if questions.is_empty() {
        bail!("no security questions configured; the vault can only be reset");
    }

    let mut answers = Vec::with_capacity(questions.len());
    for question in &questions {
        println!("{question}");
        answers.push(prompt_secret("Answer: ")?);
    }
    let pairs: Vec<(&str, &str)> = questions
        .iter()
        .zip(&answers)
        .map(|(q, a)| (q.as_str(), a.as_str()))
        .collect();

    let new_password = prompt_secret("New password: ")?;
    let confirm = prompt_secret("Confirm new password: ")?;
    vault
        .recovery()
        .reset_password_with_recovery(&pairs, &new_password, &confirm)?;
    info!("password reset through recovery");
    println!("Password reset.");
    Ok(ExitCode::SUCCESS)
}

fn prompt_secret(prompt: &str) -> Result<Zeroizing<String>> {
    let value = rpassword::prompt_password(prompt).context("failed to read from terminal")?;
    Ok(Zeroizing::new(value))
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
