//! Package manager backends.
//!
//! The orchestrator only ever sees the narrow `PackageBackend` interface:
//! install a package, ask whether it is installed, ask who owns a path,
//! remove a package. Exit status and captured text are the whole contract,
//! so remediation logic can be exercised with scripted outputs.
//!
//! - `Pacman`: the system package manager, run as root
//! - `AurHelper`: yay/paru run as the originating non-root user, attached to
//!   the terminal

use crate::command::{CommandOutput, run_attached, run_captured};
use crate::types::InstallMode;
use anyhow::Result;
use std::ffi::OsStr;
use std::path::Path;

/// Narrow interface to an external installer
pub trait PackageBackend {
    /// Name used in log lines (e.g. "pacman", "yay")
    fn name(&self) -> &str;

    /// Install one package non-interactively
    fn install(&self, package: &str, mode: InstallMode) -> Result<CommandOutput>;

    /// Whether the package is present in the local database
    fn is_installed(&self, package: &str) -> bool;

    /// Package owning `path` in the local database, if any
    fn owner_of(&self, path: &Path) -> Option<String>;

    /// Uninstall a package
    fn remove(&self, package: &str) -> Result<CommandOutput>;
}

/// Pacman invoked as an external process
#[derive(Debug, Clone)]
pub struct Pacman {
    program: String,
}

impl Default for Pacman {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacman {
    pub fn new() -> Self {
        Self {
            program: "pacman".to_string(),
        }
    }

    /// Build the argument list for an install invocation
    pub fn install_args(package: &str, mode: InstallMode) -> Vec<String> {
        let mut args = vec!["-S".to_string(), "--noconfirm".to_string()];
        match mode {
            InstallMode::Standard => {}
            InstallMode::Overwrite => {
                args.push("--overwrite".to_string());
                args.push("*".to_string());
            }
            InstallMode::Needed => args.push("--needed".to_string()),
        }
        args.push(package.to_string());
        args
    }

    /// Package names in a sync repository (`pacman -Slq <repo>`)
    pub fn list_repository(&self, repository: &str) -> Result<Vec<String>> {
        let output = run_captured(&self.program, ["-Slq", repository])?;
        output.ensure_success(&format!("pacman -Slq {}", repository))?;
        Ok(output.lines())
    }

    /// Members of a package group (`pacman -Sgq <group>`)
    pub fn list_group(&self, group: &str) -> Result<Vec<String>> {
        let output = run_captured(&self.program, ["-Sgq", group])?;
        output.ensure_success(&format!("pacman -Sgq {}", group))?;
        Ok(output.lines())
    }

    /// Group names available in the sync databases (`pacman -Sg`)
    pub fn list_groups(&self) -> Result<Vec<String>> {
        let output = run_captured(&self.program, ["-Sg"])?;
        output.ensure_success("pacman -Sg")?;
        let mut groups: Vec<String> = output
            .lines()
            .iter()
            .filter_map(|l| l.split_whitespace().next())
            .map(String::from)
            .collect();
        groups.sort();
        groups.dedup();
        Ok(groups)
    }

    /// Whether `repository` is configured in pacman.conf
    pub fn has_repository(&self, repository: &str) -> bool {
        run_captured(&self.program, ["-Sl", repository])
            .map(|o| o.success)
            .unwrap_or(false)
    }

    /// Refresh sync databases
    pub fn refresh(&self) -> Result<CommandOutput> {
        run_captured(&self.program, ["-Syy", "--noconfirm"])
    }

    /// Drop cached package files no longer installed
    pub fn clean_cache(&self) -> Result<CommandOutput> {
        run_captured(&self.program, ["-Sc", "--noconfirm"])
    }
}

impl PackageBackend for Pacman {
    fn name(&self) -> &str {
        &self.program
    }

    fn install(&self, package: &str, mode: InstallMode) -> Result<CommandOutput> {
        run_captured(&self.program, Self::install_args(package, mode))
    }

    fn is_installed(&self, package: &str) -> bool {
        run_captured(&self.program, ["-Q", package])
            .map(|o| o.success)
            .unwrap_or(false)
    }

    fn owner_of(&self, path: &Path) -> Option<String> {
        let args: [&OsStr; 2] = [OsStr::new("-Qoq"), path.as_os_str()];
        let output = run_captured(&self.program, args).ok()?;
        if !output.success {
            return None;
        }
        output.lines().into_iter().next()
    }

    fn remove(&self, package: &str) -> Result<CommandOutput> {
        // -dd: the package being installed provides what this one did
        run_captured(&self.program, ["-Rdd", "--noconfirm", package])
    }
}

/// AUR helper (yay, paru, ...) run as a non-root user through sudo
#[derive(Debug, Clone)]
pub struct AurHelper {
    helper: String,
    user: String,
}

impl AurHelper {
    pub fn new(helper: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
            user: user.into(),
        }
    }

    /// Whether the helper binary can be found in PATH
    pub fn is_available(&self) -> bool {
        which::which(&self.helper).is_ok()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Build the `sudo -u <user> <helper> ...` argument list
    pub fn install_args(&self, package: &str, mode: InstallMode) -> Vec<String> {
        let mut args = vec![
            "-u".to_string(),
            self.user.clone(),
            self.helper.clone(),
            "-S".to_string(),
            "--noconfirm".to_string(),
        ];
        match mode {
            InstallMode::Standard => {}
            InstallMode::Overwrite => {
                args.push("--overwrite".to_string());
                args.push("*".to_string());
            }
            InstallMode::Needed => args.push("--needed".to_string()),
        }
        args.push(package.to_string());
        args
    }
}

impl PackageBackend for AurHelper {
    fn name(&self) -> &str {
        &self.helper
    }

    fn install(&self, package: &str, mode: InstallMode) -> Result<CommandOutput> {
        // the helper runs its own `sudo pacman`, which may need the terminal
        run_attached("sudo", self.install_args(package, mode))
    }

    fn is_installed(&self, package: &str) -> bool {
        Pacman::new().is_installed(package)
    }

    fn owner_of(&self, path: &Path) -> Option<String> {
        Pacman::new().owner_of(path)
    }

    fn remove(&self, package: &str) -> Result<CommandOutput> {
        Pacman::new().remove(package)
    }
}
