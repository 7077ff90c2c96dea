//! One install run from pre-flight checks to backup disposition.
//!
//! ```text
//! preflight ─▶ bootstrap/refresh ─▶ choose set ─▶ load list ─▶ confirm
//!     ─▶ helper deps ─▶ batch ─▶ persist lists ─▶ secondary pass
//!     ─▶ cache cleanup ─▶ backup disposition
//! ```
//!
//! Decisions come from the configuration when set and from the `Prompter`
//! otherwise. `execute_batch` holds everything after the package list is
//! known and takes its backends as parameters.

use crate::backup::BackupLedger;
use crate::batch::{BatchOrchestrator, BatchReport, PersistedLists};
use crate::classifier::SignatureClassifier;
use crate::config_file::RunConfig;
use crate::error::{ArsenalError, Result};
use crate::install_log::InstallLog;
use crate::package_list::{PackageCatalog, load_package_set};
use crate::package_manager::{AurHelper, PackageBackend, Pacman};
use crate::process_guard::InterruptFlag;
use crate::prompt::Prompter;
use crate::retry::{RetryController, RetryPolicy};
use crate::sanity;
use crate::setup::{self, SetupReport, StepResult};
use crate::types::{CleanupAction, PackageSet, SecondaryPass};

use std::path::PathBuf;
use strum::IntoEnumIterator;

/// Everything a finished (or interrupted) run produced
#[derive(Debug)]
pub struct RunSummary {
    pub report: BatchReport,
    pub lists: PersistedLists,
    pub cleanup: CleanupAction,
    pub setup: Option<SetupReport>,
}

impl RunSummary {
    pub fn interrupted(&self) -> bool {
        self.report.interrupted
    }
}

// ============================================================================
// Decisions
// ============================================================================

fn prompt_error(e: anyhow::Error) -> ArsenalError {
    ArsenalError::InvalidSelection(format!("{:#}", e))
}

/// Package set from config, or ask: whole repository, a group, or a file
pub fn choose_package_set(
    config: &RunConfig,
    prompter: &dyn Prompter,
    catalog: &dyn PackageCatalog,
) -> Result<PackageSet> {
    if let Some(set) = &config.package_set {
        return Ok(set.clone());
    }

    let choices = vec![
        format!("Every package in {}", config.repository),
        "A package group".to_string(),
        "Packages listed in a file".to_string(),
    ];
    let choice = prompter
        .select("What should be installed?", &choices, 0)
        .map_err(prompt_error)?;

    match choice {
        0 => Ok(PackageSet::All),
        1 => {
            let prefix = format!("{}-", config.repository);
            let groups: Vec<String> = catalog
                .groups()
                .unwrap_or_default()
                .into_iter()
                .filter(|g| g == &config.repository || g.starts_with(&prefix))
                .collect();

            if groups.is_empty() {
                let name = prompter.input("Group name").map_err(prompt_error)?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(ArsenalError::InvalidSelection("empty group name".to_string()));
                }
                return Ok(PackageSet::Group(name.to_string()));
            }

            let idx = prompter
                .select("Which group?", &groups, 0)
                .map_err(prompt_error)?;
            groups
                .get(idx)
                .cloned()
                .map(PackageSet::Group)
                .ok_or_else(|| ArsenalError::InvalidSelection(format!("no group #{}", idx)))
        }
        2 => {
            let path = prompter
                .input("Path to package list")
                .map_err(prompt_error)?;
            let path = path.trim();
            if path.is_empty() {
                return Err(ArsenalError::InvalidSelection("empty file path".to_string()));
            }
            Ok(PackageSet::File(PathBuf::from(path)))
        }
        other => Err(ArsenalError::InvalidSelection(format!(
            "no choice #{}",
            other
        ))),
    }
}

/// Whether the failed packages go through the AUR helper
pub fn wants_secondary_pass(
    config: &RunConfig,
    prompter: &dyn Prompter,
    failed: usize,
) -> Result<bool> {
    if failed == 0 {
        return Ok(false);
    }
    match config.secondary_pass {
        SecondaryPass::Always => Ok(true),
        SecondaryPass::Never => Ok(false),
        SecondaryPass::Ask => prompter
            .confirm(
                &format!(
                    "{} package(s) failed. Retry them with {}?",
                    failed, config.aur_helper
                ),
                true,
            )
            .map_err(prompt_error),
    }
}

/// Whether to drop cached package files after the batch
pub fn wants_cache_cleanup(config: &RunConfig, prompter: &dyn Prompter) -> Result<bool> {
    match config.clean_cache {
        Some(clean) => Ok(clean),
        None => prompter
            .confirm("Clean the package cache?", false)
            .map_err(prompt_error),
    }
}

/// Backup disposition from config, or ask when there is anything to dispose of
pub fn choose_cleanup(
    config: &RunConfig,
    prompter: &dyn Prompter,
    ledger: &BackupLedger,
) -> Result<CleanupAction> {
    if let Some(action) = config.cleanup {
        return Ok(action);
    }
    let files = ledger.file_count();
    if files == 0 {
        return Ok(CleanupAction::Keep);
    }

    let actions: Vec<CleanupAction> = CleanupAction::iter().collect();
    let labels: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
    let idx = prompter
        .select(
            &format!(
                "{} backup file(s) in {}. Keep, archive or delete them?",
                files,
                ledger.root().display()
            ),
            &labels,
            0,
        )
        .map_err(prompt_error)?;

    actions
        .get(idx)
        .copied()
        .ok_or_else(|| ArsenalError::InvalidSelection(format!("no cleanup action #{}", idx)))
}

/// Carry out the backup disposition; returns the number of files affected
pub fn apply_cleanup(
    action: CleanupAction,
    ledger: &BackupLedger,
    config: &RunConfig,
    log: &InstallLog,
) -> Result<usize> {
    match action {
        CleanupAction::Keep => {
            let files = ledger.file_count();
            if files > 0 {
                log.info(format!(
                    "Keeping {} backup file(s) in {}",
                    files,
                    ledger.root().display()
                ));
            }
            Ok(0)
        }
        CleanupAction::Archive => {
            let moved = ledger.archive_all(&config.archive_root())?;
            log.info(format!(
                "Archived {} backup file(s) under {}",
                moved,
                config.archive_root().display()
            ));
            Ok(moved)
        }
        CleanupAction::Delete => {
            let removed = ledger.purge_all()?;
            log.info(format!("Deleted {} backup file(s)", removed));
            Ok(removed)
        }
    }
}

// ============================================================================
// Run
// ============================================================================

/// Batch, lists, secondary pass and cleanup for an already-resolved list
pub fn execute_batch(
    packages: &[String],
    primary: &dyn PackageBackend,
    secondary: Option<&dyn PackageBackend>,
    config: &RunConfig,
    prompter: &dyn Prompter,
    log: &InstallLog,
    interrupt: &InterruptFlag,
) -> Result<RunSummary> {
    let ledger = BackupLedger::for_log_dir(&config.log_dir);
    let classifier = SignatureClassifier::pacman();
    let policy = RetryPolicy {
        max_attempts: config.max_attempts,
        delay: config.retry_delay(),
        removal_policy: config.removal_policy,
    };

    let controller = RetryController::new(primary, &classifier, &ledger, log, policy)
        .with_interrupt(interrupt.clone());
    let orchestrator = BatchOrchestrator::new(controller, log).with_interrupt(interrupt.clone());

    let mut report = orchestrator.run(packages);
    let mut lists = orchestrator.persist(&report)?;

    if !report.interrupted && !report.failed.is_empty() {
        match secondary {
            Some(helper) => {
                if wants_secondary_pass(config, prompter, report.failed.len())? {
                    lists = orchestrator.run_secondary_pass(helper, &mut report)?;
                }
            }
            None => log.warn("No AUR helper available, skipping the secondary pass"),
        }
    }

    let cleanup = choose_cleanup(config, prompter, &ledger)?;
    apply_cleanup(cleanup, &ledger, config, log)?;

    log.info(format!("Run finished: {}", report.summary()));
    Ok(RunSummary {
        report,
        lists,
        cleanup,
        setup: None,
    })
}

/// Full install run against the real system.
///
/// Returns `Ok(None)` when the operator declines at the confirmation.
pub fn run_install(
    config: &RunConfig,
    prompter: &dyn Prompter,
    interrupt: &InterruptFlag,
) -> Result<Option<RunSummary>> {
    config
        .validate()
        .map_err(|e| ArsenalError::config(format!("{:#}", e)))?;

    let user = sanity::run_preflight_checks(config)?;
    let log = InstallLog::open(&config.log_dir)?;
    log.info(format!("Logging to {}", log.path().display()));

    let pacman = Pacman::new();
    let helper = AurHelper::new(&config.aur_helper, &user);

    let bootstrap = setup::bootstrap_repository(&pacman, config, &log);
    let refresh = setup::refresh_databases(&pacman, &log);

    let set = choose_package_set(config, prompter, &pacman)?;
    let packages = load_package_set(
        &set,
        &pacman,
        &config.repository,
        config.sentinel_package.as_deref(),
    )?;

    let proceed = prompter
        .confirm(
            &format!(
                "Install {} package(s) from {} (up to {} attempt(s) each)?",
                packages.len(),
                set,
                config.max_attempts
            ),
            true,
        )
        .map_err(prompt_error)?;
    if !proceed {
        log.info("Installation cancelled by operator");
        return Ok(None);
    }

    let helper_available = helper.is_available();
    let helper_dependencies = if helper_available {
        setup::install_helper_dependencies(&helper, &config.helper_dependencies, &log)
    } else {
        StepResult::Skipped(format!("{} not installed", config.aur_helper))
    };

    let setup_report = SetupReport {
        bootstrap,
        refresh,
        helper_dependencies,
    };
    for warning in setup_report.warnings() {
        log.warn(format!("Setup: {}", warning));
    }

    let secondary: Option<&dyn PackageBackend> = if helper_available {
        Some(&helper)
    } else {
        None
    };
    let mut summary = execute_batch(
        &packages,
        &pacman,
        secondary,
        config,
        prompter,
        &log,
        interrupt,
    )?;

    if !summary.interrupted() && wants_cache_cleanup(config, prompter)? {
        setup::clean_package_cache(&pacman, &log);
    }

    summary.setup = Some(setup_report);
    Ok(Some(summary))
}
