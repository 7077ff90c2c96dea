//! Batch orchestration.
//!
//! Walks the package list strictly in order, one package at a time, hands
//! each one to the retry controller, and tallies the outcomes. Once the
//! primary pass is done the failed and skipped lists are persisted next to
//! the install log, and the failed list can be fed to a secondary pass
//! through the AUR helper.

use crate::install_log::InstallLog;
use crate::logic::ConflictRecord;
use crate::package_manager::PackageBackend;
use crate::process_guard::InterruptFlag;
use crate::retry::{Outcome, PackageResult, RetryController, SkipReason};
use crate::types::InstallMode;

use std::fs;
use std::path::{Path, PathBuf};

/// File holding one failed package name per line
pub const FAILED_LIST: &str = "failed_packages.txt";
/// File holding one skipped package per line with the reason inline
pub const SKIPPED_LIST: &str = "skipped_packages.txt";

// ============================================================================
// Report
// ============================================================================

/// Aggregate result of one batch
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Number of packages handed to the batch
    pub total: usize,
    pub installed: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failed: Vec<String>,
    pub conflicts: Vec<ConflictRecord>,
    pub interrupted: bool,
    /// Filled in once a secondary pass ran
    pub secondary: Option<SecondaryReport>,
}

impl BatchReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Fold one package result into the tallies
    pub fn record(&mut self, result: PackageResult) {
        let PackageResult {
            package,
            outcome,
            conflicts,
        } = result;

        match outcome {
            Outcome::Installed { .. } => self.installed.push(package),
            Outcome::Skipped(reason) => self.skipped.push((package, reason)),
            Outcome::Failed { .. } => self.failed.push(package),
        }
        self.conflicts.extend(conflicts);
    }

    /// Installed + skipped + failed; equals `total` once the batch is done
    pub fn accounted(&self) -> usize {
        self.installed.len() + self.skipped.len() + self.failed.len()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|(_, r)| *r == reason).count()
    }

    /// Move packages the secondary pass recovered from failed to installed
    pub fn reconcile(&mut self, secondary: SecondaryReport) {
        self.failed.retain(|pkg| !secondary.recovered.contains(pkg));
        self.installed.extend(secondary.recovered.iter().cloned());
        self.secondary = Some(secondary);
    }

    /// One-line progress/summary string
    pub fn summary(&self) -> String {
        format!(
            "{}/{} processed: {} installed, {} skipped, {} failed",
            self.accounted(),
            self.total,
            self.installed.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }

    /// Write the failed and skipped lists into `dir`, replacing earlier ones
    pub fn persist(&self, dir: &Path) -> std::io::Result<PersistedLists> {
        fs::create_dir_all(dir)?;

        let failed = dir.join(FAILED_LIST);
        fs::write(&failed, render_lines(self.failed.iter().cloned()))?;

        let skipped = dir.join(SKIPPED_LIST);
        fs::write(
            &skipped,
            render_lines(
                self.skipped
                    .iter()
                    .map(|(pkg, reason)| format!("{} ({})", pkg, reason)),
            ),
        )?;

        Ok(PersistedLists { failed, skipped })
    }
}

fn render_lines(lines: impl Iterator<Item = String>) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Where `BatchReport::persist` wrote its lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedLists {
    pub failed: PathBuf,
    pub skipped: PathBuf,
}

/// Read a persisted failed list back (blank lines ignored)
pub fn read_failed_list(dir: &Path) -> std::io::Result<Vec<String>> {
    let content = fs::read_to_string(dir.join(FAILED_LIST))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Outcome of the single-attempt pass through an alternate backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecondaryReport {
    pub recovered: Vec<String>,
    pub still_failed: Vec<String>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Sequential driver over a package list
pub struct BatchOrchestrator<'a> {
    controller: RetryController<'a>,
    log: &'a InstallLog,
    interrupt: InterruptFlag,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(controller: RetryController<'a>, log: &'a InstallLog) -> Self {
        Self {
            controller,
            log,
            interrupt: InterruptFlag::new(),
        }
    }

    /// Stop processing once `flag` is raised; the controller should share it
    pub fn with_interrupt(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = flag;
        self
    }

    /// Process every package in order.
    ///
    /// After an interrupt the remaining packages are recorded as skipped so
    /// the report still accounts for the whole list.
    pub fn run(&self, packages: &[String]) -> BatchReport {
        let mut report = BatchReport::new(packages.len());
        self.log.info(format!(
            "Starting batch of {} package(s) with up to {} attempt(s) each",
            packages.len(),
            self.controller.policy().max_attempts
        ));

        for (index, package) in packages.iter().enumerate() {
            if self.interrupt.is_raised() {
                report.skipped.push((package.clone(), SkipReason::Interrupted));
                continue;
            }

            let span = tracing::info_span!("package", name = %package, index = index + 1);
            let result = span.in_scope(|| self.controller.install(package));
            report.record(result);

            self.log.info(format!(
                "[{}/{}] {} installed, {} skipped, {} failed",
                index + 1,
                packages.len(),
                report.installed.len(),
                report.skipped.len(),
                report.failed.len()
            ));
        }

        report.interrupted = self.interrupt.is_raised();
        if report.interrupted {
            self.log.warn(format!(
                "Batch interrupted, {} package(s) left unprocessed",
                report.skipped_for(SkipReason::Interrupted)
            ));
        }
        self.log.info(format!("Batch finished: {}", report.summary()));
        report
    }

    /// Persist the failed/skipped lists into the log directory
    pub fn persist(&self, report: &BatchReport) -> std::io::Result<PersistedLists> {
        let lists = report.persist(self.log.dir())?;
        if !report.failed.is_empty() {
            self.log.warn(format!(
                "{} failed package(s) listed in {}",
                report.failed.len(),
                lists.failed.display()
            ));
        }
        Ok(lists)
    }

    /// One install attempt per failed package through `backend`, then fold
    /// the result into `report` and rewrite the persisted lists
    pub fn run_secondary_pass(
        &self,
        backend: &dyn PackageBackend,
        report: &mut BatchReport,
    ) -> std::io::Result<PersistedLists> {
        let secondary = secondary_pass(backend, &report.failed, self.log, &self.interrupt);
        report.reconcile(secondary);
        self.persist(report)
    }
}

/// Single-attempt installs of `failed` through `backend`; no remediation
pub fn secondary_pass(
    backend: &dyn PackageBackend,
    failed: &[String],
    log: &InstallLog,
    interrupt: &InterruptFlag,
) -> SecondaryReport {
    let mut report = SecondaryReport::default();
    if failed.is_empty() {
        return report;
    }

    log.info(format!(
        "Retrying {} failed package(s) with {}",
        failed.len(),
        backend.name()
    ));

    for package in failed {
        if interrupt.is_raised() {
            report.still_failed.push(package.clone());
            continue;
        }

        match backend.install(package, InstallMode::Needed) {
            Ok(out) if out.success => {
                log.success(format!("{} installed with {}", package, backend.name()));
                report.recovered.push(package.clone());
            }
            Ok(out) => {
                log.error(format!(
                    "{} failed with {} (exit code {})",
                    package,
                    backend.name(),
                    out.exit_code.unwrap_or(-1)
                ));
                report.still_failed.push(package.clone());
            }
            Err(e) => {
                log.error(format!("{}: could not run {}: {:#}", package, backend.name(), e));
                report.still_failed.push(package.clone());
            }
        }
    }

    log.info(format!(
        "Secondary pass: {} recovered, {} still failed",
        report.recovered.len(),
        report.still_failed.len()
    ));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureKind;
    use tempfile::tempdir;

    fn result(package: &str, outcome: Outcome) -> PackageResult {
        PackageResult {
            package: package.to_string(),
            outcome,
            conflicts: Vec::new(),
        }
    }

    #[test]
    fn test_record_accounts_every_outcome() {
        let mut report = BatchReport::new(3);
        report.record(result("nmap", Outcome::Installed { attempts: 1 }));
        report.record(result("john", Outcome::Skipped(SkipReason::AlreadyInstalled)));
        report.record(result(
            "ghidra",
            Outcome::Failed {
                attempts: 2,
                last_failure: FailureKind::Unknown,
            },
        ));

        assert_eq!(report.accounted(), report.total);
        assert_eq!(report.installed, vec!["nmap"]);
        assert_eq!(report.failed, vec!["ghidra"]);
        assert_eq!(report.skipped_for(SkipReason::AlreadyInstalled), 1);
    }

    #[test]
    fn test_persist_writes_lists() {
        let dir = tempdir().unwrap();
        let mut report = BatchReport::new(3);
        report.failed = vec!["ghidra".to_string(), "burpsuite".to_string()];
        report.skipped = vec![("john".to_string(), SkipReason::AlreadyInstalled)];

        let lists = report.persist(dir.path()).unwrap();
        assert_eq!(
            fs::read_to_string(&lists.failed).unwrap(),
            "ghidra\nburpsuite\n"
        );
        assert_eq!(
            fs::read_to_string(&lists.skipped).unwrap(),
            "john (already installed)\n"
        );
        assert_eq!(
            read_failed_list(dir.path()).unwrap(),
            vec!["ghidra", "burpsuite"]
        );
    }

    #[test]
    fn test_persist_empty_failed_list() {
        let dir = tempdir().unwrap();
        let lists = BatchReport::new(0).persist(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(lists.failed).unwrap(), "");
    }

    #[test]
    fn test_reconcile_moves_recovered_packages() {
        let mut report = BatchReport::new(2);
        report.failed = vec!["a".to_string(), "b".to_string()];

        report.reconcile(SecondaryReport {
            recovered: vec!["b".to_string()],
            still_failed: vec!["a".to_string()],
        });

        assert_eq!(report.failed, vec!["a"]);
        assert_eq!(report.installed, vec!["b"]);
        assert_eq!(report.accounted(), 2);
        assert!(report.secondary.is_some());
    }
}
