//! Retry controller: bounded installation of a single package.
//!
//! ```text
//! already installed? ──yes──▶ Skipped (zero install invocations)
//!        │ no
//!        ▼
//! attempt N ──ok──▶ Installed
//!        │ fail
//!        ▼
//! save output, classify ──▶ remediate (if another attempt follows)
//!        │
//!        ▼
//! N == max? ──yes──▶ Failed
//!        │ no
//!        └──── wait, attempt N+1
//! ```
//!
//! Remediation is a side effect that improves the odds of the next
//! attempt. Its own success never marks the package installed.

use crate::backup::BackupLedger;
use crate::classifier::ErrorClassifier;
use crate::command::CommandOutput;
use crate::install_log::InstallLog;
use crate::install_state::{PackageTracker, TransitionError};
use crate::logic::{ConflictRecord, ConflictResolver, DependencyRepairer};
use crate::package_manager::PackageBackend;
use crate::process_guard::InterruptFlag;
use crate::types::{FailureKind, InstallMode, RemovalPolicy};

use std::fmt;
use std::time::Duration;

// ============================================================================
// Outcomes
// ============================================================================

/// Why a package was never (fully) attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Present in the local database before the batch touched it
    AlreadyInstalled,
    /// The operator interrupted the batch
    Interrupted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInstalled => write!(f, "already installed"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Terminal result for one package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Installed { attempts: u32 },
    Skipped(SkipReason),
    Failed { attempts: u32, last_failure: FailureKind },
}

/// One install invocation, consumed by classification right away
#[derive(Debug, Clone)]
pub struct InstallAttempt {
    pub package: String,
    pub attempt: u32,
    pub exit_code: Option<i32>,
    pub output: String,
}

/// Outcome plus the conflict records produced on the way
#[derive(Debug, Clone)]
pub struct PackageResult {
    pub package: String,
    pub outcome: Outcome,
    pub conflicts: Vec<ConflictRecord>,
}

// ============================================================================
// Controller
// ============================================================================

/// Retry bounds and remediation knobs
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub removal_policy: RemovalPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config_file::DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_secs(2),
            removal_policy: RemovalPolicy::Heuristic,
        }
    }
}

/// Drives the install / classify / remediate loop for one package at a time
pub struct RetryController<'a> {
    backend: &'a dyn PackageBackend,
    classifier: &'a dyn ErrorClassifier,
    ledger: &'a BackupLedger,
    log: &'a InstallLog,
    policy: RetryPolicy,
    interrupt: InterruptFlag,
}

impl<'a> RetryController<'a> {
    pub fn new(
        backend: &'a dyn PackageBackend,
        classifier: &'a dyn ErrorClassifier,
        ledger: &'a BackupLedger,
        log: &'a InstallLog,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            classifier,
            ledger,
            log,
            // every package gets at least one attempt
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
            interrupt: InterruptFlag::new(),
        }
    }

    /// Stop between attempts once `flag` is raised
    pub fn with_interrupt(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Install `package`, retrying and remediating up to the attempt budget
    pub fn install(&self, package: &str) -> PackageResult {
        let mut tracker = PackageTracker::new(package, self.policy.max_attempts);
        let mut conflicts = Vec::new();

        if self.interrupt.is_raised() {
            return self.skip(&mut tracker, SkipReason::Interrupted, conflicts);
        }

        if self.backend.is_installed(package) {
            self.log.info(format!("{} is already installed, skipping", package));
            return self.skip(&mut tracker, SkipReason::AlreadyInstalled, conflicts);
        }

        let mut last_failure = FailureKind::Unknown;

        while let Ok(attempt) = tracker.begin_attempt() {
            self.log.info(format!(
                "Installing {} (attempt {}/{})",
                package, attempt, self.policy.max_attempts
            ));

            let output = self
                .backend
                .install(package, InstallMode::Standard)
                .unwrap_or_else(|e| CommandOutput::failed(-1, format!("{:#}", e)));

            if output.success {
                checked(tracker.mark_installed());
                self.log.success(format!(
                    "{} installed (attempt {})",
                    package, attempt
                ));
                return PackageResult {
                    package: package.to_string(),
                    outcome: Outcome::Installed { attempts: attempt },
                    conflicts,
                };
            }

            if self.interrupt.is_raised() {
                self.log.warn(format!("{}: interrupted during attempt {}", package, attempt));
                return self.skip(&mut tracker, SkipReason::Interrupted, conflicts);
            }

            let failed = InstallAttempt {
                package: package.to_string(),
                attempt,
                exit_code: output.exit_code,
                output: output.combined(),
            };
            last_failure = self.record_failure(&failed);

            if tracker.remaining() > 0 {
                self.remediate(&failed, last_failure, &mut conflicts);

                if !self.policy.delay.is_zero() {
                    std::thread::sleep(self.policy.delay);
                }
                if self.interrupt.is_raised() {
                    return self.skip(&mut tracker, SkipReason::Interrupted, conflicts);
                }
            }
        }

        checked(tracker.mark_failed());
        self.log.error(format!(
            "{} failed after {} attempt(s) ({})",
            package,
            tracker.attempts(),
            last_failure
        ));
        PackageResult {
            package: package.to_string(),
            outcome: Outcome::Failed {
                attempts: tracker.attempts(),
                last_failure,
            },
            conflicts,
        }
    }

    fn skip(
        &self,
        tracker: &mut PackageTracker,
        reason: SkipReason,
        conflicts: Vec<ConflictRecord>,
    ) -> PackageResult {
        checked(tracker.mark_skipped());
        PackageResult {
            package: tracker.package().to_string(),
            outcome: Outcome::Skipped(reason),
            conflicts,
        }
    }

    /// Save the attempt's output, classify it, and log a pointer to the file
    fn record_failure(&self, attempt: &InstallAttempt) -> FailureKind {
        let saved = self
            .log
            .record_attempt_output(&attempt.package, attempt.attempt, &attempt.output);
        let pointer = match &saved {
            Ok(path) => path.display().to_string(),
            Err(e) => {
                log::warn!("Could not save output for {}: {}", attempt.package, e);
                "output not saved".to_string()
            }
        };

        let kind = self.classifier.classify(&attempt.output);
        self.log.error(format!(
            "{}: attempt {} failed with exit code {} [{}] (see {})",
            attempt.package,
            attempt.attempt,
            attempt.exit_code.unwrap_or(-1),
            kind,
            pointer
        ));
        kind
    }

    fn remediate(
        &self,
        attempt: &InstallAttempt,
        kind: FailureKind,
        conflicts: &mut Vec<ConflictRecord>,
    ) {
        let package = attempt.package.as_str();
        match kind {
            FailureKind::FileConflict => {
                let resolver =
                    ConflictResolver::new(self.backend, self.ledger, self.policy.removal_policy);
                match resolver.resolve(package, &attempt.output) {
                    Ok(report) => {
                        for record in &report.records {
                            let line = format!(
                                "{}: {} {}",
                                package,
                                record.path.display(),
                                record.resolution
                            );
                            if record.resolution.is_resolved() {
                                self.log.info(line);
                            } else {
                                self.log.warn(line);
                            }
                        }
                        self.log.info(format!(
                            "{}: resolved {}/{} conflicting path(s)",
                            package,
                            report.resolved_count(),
                            report.records.len()
                        ));
                        conflicts.extend(report.records);
                    }
                    Err(e) => self.log.warn(format!("{}: {}", package, e)),
                }
            }
            FailureKind::DependencyIssue => {
                let report = DependencyRepairer::new(self.backend).repair(package, &attempt.output);
                match report.resolved_by() {
                    Some(step) => self
                        .log
                        .info(format!("{}: dependency repair succeeded via {}", package, step)),
                    None => self.log.warn(format!(
                        "{}: dependency repair failed ({} dependency install(s) failed)",
                        package,
                        report.failed_dependencies.len()
                    )),
                }
            }
            FailureKind::Unknown => {
                log::debug!("{}: no remediation for unknown failure", package);
            }
        }
    }
}

/// The controller drives the tracker along valid edges only; a rejected
/// transition is a bug here, not a package failure.
fn checked(transition: std::result::Result<(), TransitionError>) {
    if let Err(e) = transition {
        log::error!("Invalid package state transition: {}", e);
        debug_assert!(false, "{}", e);
    }
}
