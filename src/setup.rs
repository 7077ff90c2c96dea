//! Environment setup around a batch.
//!
//! Runs before the batch:
//! - Repository bootstrap (download and run the strap script when the
//!   repository is not configured yet)
//! - Sync database refresh
//! - Helper dependency installation through the AUR helper
//!
//! Runs after the batch:
//! - Package cache cleanup
//!
//! # Failure Policy
//!
//! Every step is best-effort. A failed step is logged and reported as
//! `StepResult::Failed`; the caller decides whether to continue. Only a
//! repository that is still missing after bootstrap makes a whole-repository
//! selection impossible, and that surfaces later as a package list error.

use crate::command::run_captured;
use crate::config_file::RunConfig;
use crate::install_log::InstallLog;
use crate::package_manager::{PackageBackend, Pacman};
use crate::types::InstallMode;

use std::fmt;

// ============================================================================
// Step Result
// ============================================================================

/// Outcome of one setup step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Step ran and succeeded
    Done,
    /// Nothing to do (with reason)
    Skipped(String),
    /// Step failed (non-fatal)
    Failed(String),
}

impl StepResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Results of the pre-batch steps
#[derive(Debug, Clone)]
pub struct SetupReport {
    pub bootstrap: StepResult,
    pub refresh: StepResult,
    pub helper_dependencies: StepResult,
}

impl SetupReport {
    pub fn warnings(&self) -> Vec<String> {
        [
            ("bootstrap", &self.bootstrap),
            ("refresh", &self.refresh),
            ("helper dependencies", &self.helper_dependencies),
        ]
        .into_iter()
        .filter(|(_, r)| r.is_failed())
        .map(|(name, r)| format!("{}: {}", name, r))
        .collect()
    }
}

// ============================================================================
// Repository Bootstrap
// ============================================================================

/// Make sure `config.repository` is configured, running the strap script if not.
///
/// The script is downloaded with curl into a temporary file and executed
/// with `sh`; the repository is checked again afterwards.
pub fn bootstrap_repository(pacman: &Pacman, config: &RunConfig, log: &InstallLog) -> StepResult {
    if !config.bootstrap {
        return StepResult::Skipped("bootstrap disabled".to_string());
    }

    if pacman.has_repository(&config.repository) {
        log.info(format!("Repository {} is already configured", config.repository));
        return StepResult::Skipped("repository already configured".to_string());
    }

    if which::which("curl").is_err() {
        let msg = "curl is not installed".to_string();
        log.warn(format!("Cannot bootstrap {}: {}", config.repository, msg));
        return StepResult::Failed(msg);
    }

    log.info(format!(
        "Repository {} not configured, running {}",
        config.repository, config.strap_url
    ));

    let script = match tempfile::Builder::new().prefix("strap").suffix(".sh").tempfile() {
        Ok(file) => file,
        Err(e) => return fail(log, format!("cannot create temporary file: {}", e)),
    };
    let script_path = script.path().to_string_lossy().to_string();

    let download = run_captured(
        "curl",
        ["-fsSL", "-o", script_path.as_str(), config.strap_url.as_str()],
    );
    match download {
        Ok(out) if out.success => {}
        Ok(out) => {
            return fail(
                log,
                format!(
                    "download failed (exit code {}): {}",
                    out.exit_code.unwrap_or(-1),
                    out.stderr.trim()
                ),
            );
        }
        Err(e) => return fail(log, format!("could not run curl: {:#}", e)),
    }

    match run_captured("sh", [script_path.as_str()]) {
        Ok(out) if out.success => {}
        Ok(out) => {
            return fail(
                log,
                format!("strap script exited with code {}", out.exit_code.unwrap_or(-1)),
            );
        }
        Err(e) => return fail(log, format!("could not run strap script: {:#}", e)),
    }

    if !pacman.has_repository(&config.repository) {
        return fail(
            log,
            format!("{} still not configured after bootstrap", config.repository),
        );
    }

    log.success(format!("Repository {} configured", config.repository));
    StepResult::Done
}

fn fail(log: &InstallLog, msg: String) -> StepResult {
    log.warn(format!("Setup step failed: {}", msg));
    StepResult::Failed(msg)
}

// ============================================================================
// Database and Cache
// ============================================================================

/// Force-refresh the sync databases (`pacman -Syy`)
pub fn refresh_databases(pacman: &Pacman, log: &InstallLog) -> StepResult {
    log.info("Refreshing package databases");
    match pacman.refresh() {
        Ok(out) if out.success => StepResult::Done,
        Ok(out) => fail(
            log,
            format!("database refresh exited with code {}", out.exit_code.unwrap_or(-1)),
        ),
        Err(e) => fail(log, format!("could not refresh databases: {:#}", e)),
    }
}

/// Drop cached package files (`pacman -Sc`)
pub fn clean_package_cache(pacman: &Pacman, log: &InstallLog) -> StepResult {
    log.info("Cleaning package cache");
    match pacman.clean_cache() {
        Ok(out) if out.success => {
            log.success("Package cache cleaned");
            StepResult::Done
        }
        Ok(out) => fail(
            log,
            format!("cache cleanup exited with code {}", out.exit_code.unwrap_or(-1)),
        ),
        Err(e) => fail(log, format!("could not clean cache: {:#}", e)),
    }
}

// ============================================================================
// Helper Dependencies
// ============================================================================

/// Install the packages many tools need at runtime (language runtimes, pip).
///
/// Each dependency gets one `--needed` install through `backend`; the step
/// fails if any of them did not install.
pub fn install_helper_dependencies(
    backend: &dyn PackageBackend,
    dependencies: &[String],
    log: &InstallLog,
) -> StepResult {
    if dependencies.is_empty() {
        return StepResult::Skipped("no helper dependencies configured".to_string());
    }

    log.info(format!(
        "Installing helper dependencies with {}: {}",
        backend.name(),
        dependencies.join(", ")
    ));

    let failed: Vec<&str> = dependencies
        .iter()
        .filter(|dep| {
            !matches!(
                backend.install(dep, InstallMode::Needed),
                Ok(out) if out.success
            )
        })
        .map(String::as_str)
        .collect();

    if failed.is_empty() {
        log.success("Helper dependencies installed");
        StepResult::Done
    } else {
        fail(log, format!("could not install {}", failed.join(", ")))
    }
}

// ============================================================================
// Tests
// ============================================================================
