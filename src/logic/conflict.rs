//! Conflict resolution for "exists in filesystem" failures.
//!
//! For every conflicting path pacman reported:
//!
//! 1. Look up the owning package in the local database
//! 2. If the owner is removable under the configured `RemovalPolicy`,
//!    uninstall it
//! 3. Otherwise (no owner, owner is the package itself, removal refused or
//!    failed) snapshot the path into the backup ledger and rename it to
//!    `<path>.backup`
//!
//! The rename only happens after the ledger returned a complete entry, so
//! original content is never lost. Resolution is best-effort per path; the
//! next install attempt reveals anything left over.

use crate::backup::{BackupEntry, BackupLedger};
use crate::classifier::extract_conflicting_paths;
use crate::error::{ArsenalError, Result};
use crate::package_manager::PackageBackend;
use crate::types::RemovalPolicy;

use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffixes marking development or variant builds (`foo-git`, `foo-devel`, ...)
pub const DEV_SUFFIXES: &[&str] = &[
    "-git", "-svn", "-hg", "-bzr", "-dev", "-devel", "-nightly", "-beta",
];

/// Suffix appended to relocated originals
pub const RELOCATION_SUFFIX: &str = ".backup";

// ============================================================================
// Records
// ============================================================================

/// What was done about one conflicting path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    /// The owning package was uninstalled
    RemovedOwner { owner: String },
    /// The path was preserved in the ledger and moved aside
    BackedUpAndMoved {
        backup: Box<BackupEntry>,
        relocated_to: PathBuf,
    },
    /// The path no longer exists (an earlier removal took it)
    AlreadyGone,
    /// Nothing worked for this path
    Unresolved(String),
}

impl ConflictResolution {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved(_))
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemovedOwner { owner } => write!(f, "removed owner {}", owner),
            Self::BackedUpAndMoved { relocated_to, .. } => {
                write!(f, "backed up and moved to {}", relocated_to.display())
            }
            Self::AlreadyGone => write!(f, "already gone"),
            Self::Unresolved(reason) => write!(f, "unresolved: {}", reason),
        }
    }
}

/// One conflicting path and how it was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub package: String,
    pub path: PathBuf,
    pub owner: Option<String>,
    pub resolution: ConflictResolution,
}

/// Result of resolving every path in one failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub records: Vec<ConflictRecord>,
}

impl ConflictReport {
    pub fn resolved_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.resolution.is_resolved())
            .count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.records.len() - self.resolved_count()
    }

    /// At least one path was dealt with
    pub fn any_resolved(&self) -> bool {
        self.resolved_count() > 0
    }

    pub fn fully_resolved(&self) -> bool {
        !self.records.is_empty() && self.unresolved_count() == 0
    }
}

// ============================================================================
// Removal policy
// ============================================================================

/// `owner` looks like a development/variant build of `package`
pub fn is_dev_variant(owner: &str, package: &str) -> bool {
    owner != package
        && owner.contains(package)
        && DEV_SUFFIXES.iter().any(|suffix| owner.ends_with(suffix))
}

/// Whether `owner` may be uninstalled to make room for `package`
pub fn owner_is_removable(owner: &str, package: &str, policy: RemovalPolicy) -> bool {
    match policy {
        RemovalPolicy::Heuristic => is_dev_variant(owner, package) || !owner.contains(package),
        RemovalPolicy::DevVariantOnly => is_dev_variant(owner, package),
        RemovalPolicy::Never => false,
    }
}

/// `<path>.backup`, or `<path>.backup.N` if that is taken
pub fn relocation_target(path: &Path) -> PathBuf {
    let with_suffix = |extra: Option<usize>| {
        let mut name: OsString = path.as_os_str().to_os_string();
        name.push(RELOCATION_SUFFIX);
        if let Some(n) = extra {
            name.push(format!(".{}", n));
        }
        PathBuf::from(name)
    };

    let first = with_suffix(None);
    if fs::symlink_metadata(&first).is_err() {
        return first;
    }
    let mut n = 1;
    loop {
        let candidate = with_suffix(Some(n));
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        n += 1;
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves file conflicts against a backend and a backup ledger
pub struct ConflictResolver<'a> {
    backend: &'a dyn PackageBackend,
    ledger: &'a BackupLedger,
    policy: RemovalPolicy,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(
        backend: &'a dyn PackageBackend,
        ledger: &'a BackupLedger,
        policy: RemovalPolicy,
    ) -> Self {
        Self {
            backend,
            ledger,
            policy,
        }
    }

    /// Resolve every conflict reported in `output` for `package`.
    ///
    /// Fails without touching anything when no path can be extracted.
    pub fn resolve(&self, package: &str, output: &str) -> Result<ConflictReport> {
        let paths = extract_conflicting_paths(output);
        if paths.is_empty() {
            return Err(ArsenalError::remediation(format!(
                "could not identify conflicting files for {}",
                package
            )));
        }

        log::info!("{}: resolving {} conflicting path(s)", package, paths.len());

        let mut removed: HashSet<String> = HashSet::new();
        let records = paths
            .into_iter()
            .map(|path| self.resolve_path(package, path, &mut removed))
            .collect();

        Ok(ConflictReport { records })
    }

    fn resolve_path(
        &self,
        package: &str,
        path: PathBuf,
        removed: &mut HashSet<String>,
    ) -> ConflictRecord {
        let owner = self.backend.owner_of(&path);

        if let Some(owner_name) = &owner {
            if removed.contains(owner_name) {
                return ConflictRecord {
                    package: package.to_string(),
                    path,
                    resolution: ConflictResolution::RemovedOwner {
                        owner: owner_name.clone(),
                    },
                    owner,
                };
            }

            if owner_is_removable(owner_name, package, self.policy) {
                log::info!(
                    "{}: {} is owned by {}, removing it",
                    package,
                    path.display(),
                    owner_name
                );
                match self.backend.remove(owner_name) {
                    Ok(out) if out.success => {
                        removed.insert(owner_name.clone());
                        return ConflictRecord {
                            package: package.to_string(),
                            path,
                            resolution: ConflictResolution::RemovedOwner {
                                owner: owner_name.clone(),
                            },
                            owner,
                        };
                    }
                    Ok(out) => log::warn!(
                        "{}: removing {} failed (exit code {}), backing up {} instead",
                        package,
                        owner_name,
                        out.exit_code.unwrap_or(-1),
                        path.display()
                    ),
                    Err(e) => log::warn!(
                        "{}: could not run removal of {}: {}",
                        package,
                        owner_name,
                        e
                    ),
                }
            }
        }

        let resolution = self.back_up_and_move(package, &path);
        ConflictRecord {
            package: package.to_string(),
            path,
            owner,
            resolution,
        }
    }

    fn back_up_and_move(&self, package: &str, path: &Path) -> ConflictResolution {
        if fs::symlink_metadata(path).is_err() {
            log::info!("{}: {} no longer exists", package, path.display());
            return ConflictResolution::AlreadyGone;
        }

        let target = relocation_target(path);
        let entry = match self.ledger.snapshot(package, path, Some(&target)) {
            Ok(entry) => entry,
            Err(e) => {
                return ConflictResolution::Unresolved(format!(
                    "backup of {} failed: {}",
                    path.display(),
                    e
                ));
            }
        };

        if !entry.is_complete() {
            return ConflictResolution::Unresolved(format!(
                "backup of {} is incomplete, leaving it in place",
                path.display()
            ));
        }

        if let Err(e) = fs::rename(path, &target) {
            return ConflictResolution::Unresolved(format!(
                "could not move {} to {}: {}",
                path.display(),
                target.display(),
                e
            ));
        }

        log::info!(
            "{}: moved {} to {}",
            package,
            path.display(),
            target.display()
        );
        ConflictResolution::BackedUpAndMoved {
            backup: Box::new(entry),
            relocated_to: target,
        }
    }
}
