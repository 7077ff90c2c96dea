//! Run configuration that can be saved/loaded.
//!
//! Every interactive decision has a field here so unattended runs can be
//! driven entirely from a JSON file plus CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{CleanupAction, PackageSet, RemovalPolicy, SecondaryPass};

/// Default number of install attempts per package
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Decisions and paths for one orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    // Selection
    pub package_set: Option<PackageSet>, // None = ask
    pub sentinel_package: Option<String>,
    pub repository: String,

    // Post-run decisions
    pub cleanup: Option<CleanupAction>, // None = ask
    pub secondary_pass: SecondaryPass,
    pub clean_cache: Option<bool>, // None = ask
    pub assume_yes: bool,

    // Retry bounds
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub removal_policy: RemovalPolicy,

    // Paths
    pub log_dir: PathBuf,
    pub archive_dir: Option<PathBuf>, // None = <log_dir>/archive

    // AUR helper
    pub aur_helper: String,
    pub aur_user: Option<String>, // None = SUDO_USER
    pub helper_dependencies: Vec<String>,

    // Repository bootstrap
    pub bootstrap: bool,
    pub strap_url: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            package_set: None,
            sentinel_package: Some("metasploit".to_string()),
            repository: "blackarch".to_string(),
            cleanup: None,
            secondary_pass: SecondaryPass::Ask,
            clean_cache: None,
            assume_yes: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_secs: 2,
            removal_policy: RemovalPolicy::Heuristic,
            log_dir: PathBuf::from("/var/log/arsenal"),
            archive_dir: None,
            aur_helper: "yay".to_string(),
            aur_user: None,
            helper_dependencies: vec!["python-pip".to_string(), "jdk-openjdk".to_string()],
            bootstrap: true,
            strap_url: "https://blackarch.org/strap.sh".to_string(),
        }
    }
}

impl RunConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }

        if self.repository.trim().is_empty() {
            anyhow::bail!("repository must be specified");
        }

        if self.log_dir.as_os_str().is_empty() {
            anyhow::bail!("log_dir must be specified");
        }

        if let Some(sentinel) = &self.sentinel_package {
            if !is_valid_package_name(sentinel) {
                anyhow::bail!("sentinel_package '{}' is not a valid package name", sentinel);
            }
        }

        for dep in &self.helper_dependencies {
            if !is_valid_package_name(dep) {
                anyhow::bail!("helper dependency '{}' is not a valid package name", dep);
            }
        }

        if self.aur_helper.trim().is_empty() || self.aur_helper.contains('/') {
            anyhow::bail!("aur_helper must be a bare command name");
        }

        if let Some(user) = &self.aur_user {
            if user.trim().is_empty() || user == "root" {
                anyhow::bail!("aur_user must be a non-root user");
            }
        }

        if self.bootstrap && !self.strap_url.starts_with("https://") {
            anyhow::bail!("strap_url must start with https://");
        }

        Ok(())
    }

    /// Delay between install attempts of the same package
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Directory backups are consolidated into by the archive operation
    pub fn archive_root(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.log_dir.join("archive"))
    }
}

/// Package names per makepkg rules: alphanumerics and `@._+-`, not starting
/// with a hyphen or dot.
pub fn is_valid_package_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '+' | '-'))
}
