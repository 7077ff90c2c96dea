//! Pre-flight sanity checks for runtime environment
//!
//! This module verifies the system environment before any package is touched:
//! - Running with root privileges (EUID 0)
//! - An originating non-root user exists for the AUR helper
//! - Required runtime binaries are present
//!
//! Failures map onto `ArsenalError` variants so `main` can exit with the
//! documented code.

use crate::config_file::RunConfig;
use crate::error::{ArsenalError, Result};

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
    /// Non-root user the AUR helper will run as
    pub invoking_user: Option<String>,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root && self.invoking_user.is_some()
    }

    /// First failed check as an error, in privilege/user/binary order
    pub fn into_result(self) -> Result<String> {
        if !self.is_root {
            return Err(ArsenalError::Privilege(
                "must be run as root (try: sudo arsenal)".to_string(),
            ));
        }
        let Some(user) = self.invoking_user else {
            return Err(ArsenalError::MissingUserContext(
                "cannot determine the invoking user; run through sudo or set aur_user".to_string(),
            ));
        };
        if !self.missing_binaries.is_empty() {
            return Err(ArsenalError::Setup(format!(
                "missing required binaries: {} (install: pacman -S {})",
                self.missing_binaries.join(", "),
                self.missing_binaries.join(" ")
            )));
        }
        Ok(user)
    }
}

/// Required runtime binaries
const REQUIRED_BINARIES: &[&str] = &[
    "pacman", // Package installation
    "sudo",   // Privilege drop for the AUR helper
];

/// Optional binaries (warn if missing but don't fail)
const OPTIONAL_BINARIES: &[&str] = &[
    "curl", // Repository bootstrap
];

/// Check if a binary is available in PATH
fn binary_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Check if running as root (EUID 0)
fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Originating user: configured `aur_user`, else `SUDO_USER`. Root never counts.
pub fn invoking_user(config: &RunConfig) -> Option<String> {
    resolve_user(config.aur_user.as_deref(), std::env::var("SUDO_USER").ok())
}

fn resolve_user(configured: Option<&str>, sudo_user: Option<String>) -> Option<String> {
    configured
        .map(str::to_string)
        .or(sudo_user)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty() && u != "root")
}

/// Perform all sanity checks and return the result
pub fn verify_environment(config: &RunConfig) -> SanityCheckResult {
    let missing: Vec<String> = REQUIRED_BINARIES
        .iter()
        .filter(|b| !binary_exists(b))
        .map(|b| (*b).to_string())
        .collect();

    if !binary_exists(&config.aur_helper) {
        log::warn!(
            "AUR helper {} not found; the secondary pass will be unavailable",
            config.aur_helper
        );
    }

    for binary in OPTIONAL_BINARIES {
        if !binary_exists(binary) {
            log::debug!("Optional binary not found: {}", binary);
        }
    }

    SanityCheckResult {
        missing_binaries: missing,
        is_root: is_running_as_root() || should_skip_root_check(),
        invoking_user: invoking_user(config),
    }
}

/// Verify the environment and return the invoking user
pub fn run_preflight_checks(config: &RunConfig) -> Result<String> {
    log::debug!("Running pre-flight sanity checks...");
    let user = verify_environment(config).into_result()?;
    log::info!("Pre-flight checks passed, AUR helper runs as {}", user);
    Ok(user)
}

/// Skip root check (for development/testing)
/// Set ARSENAL_SKIP_ROOT_CHECK=1 to skip
pub fn should_skip_root_check() -> bool {
    std::env::var("ARSENAL_SKIP_ROOT_CHECK")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}
