//! Dependency repair for unsatisfied-dependency failures.
//!
//! Steps run in a fixed order and stop at the first success:
//!
//! 1. `Overwrite`: reinstall with `--overwrite '*'`
//! 2. `Needed`: reinstall with `--needed`
//! 3. `ExplicitDependencies`: install every dependency named in the error
//!    text one by one (individual failures ignored), then retry the package

use crate::classifier::extract_missing_dependencies;
use crate::package_manager::PackageBackend;
use crate::types::InstallMode;

use std::fmt;

/// One dependency repair step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStep {
    Overwrite,
    Needed,
    ExplicitDependencies,
}

impl RepairStep {
    /// All steps in the order they are tried
    pub const ORDER: [RepairStep; 3] = [Self::Overwrite, Self::Needed, Self::ExplicitDependencies];
}

impl fmt::Display for RepairStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overwrite => write!(f, "overwrite reinstall"),
            Self::Needed => write!(f, "needed reinstall"),
            Self::ExplicitDependencies => write!(f, "explicit dependency install"),
        }
    }
}

/// What the repairer tried and what came of it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Each step tried, with whether it succeeded
    pub steps: Vec<(RepairStep, bool)>,
    pub installed_dependencies: Vec<String>,
    pub failed_dependencies: Vec<String>,
}

impl RepairReport {
    /// The step that got the package installed, if any
    pub fn resolved_by(&self) -> Option<RepairStep> {
        self.steps
            .iter()
            .find(|(_, ok)| *ok)
            .map(|(step, _)| *step)
    }

    pub fn succeeded(&self) -> bool {
        self.resolved_by().is_some()
    }
}

/// Runs the repair sequence against a backend
pub struct DependencyRepairer<'a> {
    backend: &'a dyn PackageBackend,
}

impl<'a> DependencyRepairer<'a> {
    pub fn new(backend: &'a dyn PackageBackend) -> Self {
        Self { backend }
    }

    /// Try to get `package` installed given the failure text `output`
    pub fn repair(&self, package: &str, output: &str) -> RepairReport {
        let mut report = RepairReport::default();
        let mut seen_output = output.to_string();

        for (step, mode) in [
            (RepairStep::Overwrite, InstallMode::Overwrite),
            (RepairStep::Needed, InstallMode::Needed),
        ] {
            log::info!("{}: trying {}", package, step);

            match self.backend.install(package, mode) {
                Ok(out) if out.success => {
                    report.steps.push((step, true));
                    return report;
                }
                Ok(out) => {
                    seen_output.push('\n');
                    seen_output.push_str(&out.combined());
                }
                Err(e) => log::warn!("{}: {} could not run: {}", package, step, e),
            }
            report.steps.push((step, false));
        }

        let step = RepairStep::ExplicitDependencies;
        let deps: Vec<String> = extract_missing_dependencies(&seen_output)
            .into_iter()
            .filter(|dep| dep != package)
            .collect();

        if deps.is_empty() {
            log::warn!("{}: no missing dependency named in installer output", package);
            report.steps.push((step, false));
            return report;
        }

        log::info!("{}: installing missing dependencies: {}", package, deps.join(", "));
        for dep in deps {
            match self.backend.install(&dep, InstallMode::Needed) {
                Ok(out) if out.success => report.installed_dependencies.push(dep),
                _ => {
                    log::warn!("{}: dependency {} failed to install", package, dep);
                    report.failed_dependencies.push(dep);
                }
            }
        }

        let ok = matches!(
            self.backend.install(package, InstallMode::Standard),
            Ok(out) if out.success
        );
        report.steps.push((step, ok));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_resolved_by() {
        let report = RepairReport {
            steps: vec![(RepairStep::Overwrite, false), (RepairStep::Needed, true)],
            ..RepairReport::default()
        };
        assert_eq!(report.resolved_by(), Some(RepairStep::Needed));
        assert!(report.succeeded());
        assert!(!RepairReport::default().succeeded());
    }

    #[test]
    fn test_step_order() {
        assert_eq!(
            RepairStep::ORDER,
            [
                RepairStep::Overwrite,
                RepairStep::Needed,
                RepairStep::ExplicitDependencies
            ]
        );
        assert_eq!(RepairStep::Needed.to_string(), "needed reinstall");
    }
}
