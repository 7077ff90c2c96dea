//! Shared test doubles: a scripted package backend and a per-test workspace.

#![allow(dead_code)]

use arsenal::backup::BackupLedger;
use arsenal::classifier::SignatureClassifier;
use arsenal::command::CommandOutput;
use arsenal::install_log::InstallLog;
use arsenal::package_manager::PackageBackend;
use arsenal::process_guard::InterruptFlag;
use arsenal::retry::RetryPolicy;
use arsenal::types::{InstallMode, RemovalPolicy};

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// One interaction with the fake backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Install(String, InstallMode),
    Remove(String),
}

/// Package backend driven by per-package response queues.
///
/// Each install pops the next scripted response for that package. With the
/// queue empty, installing an already-installed package succeeds and
/// anything else fails with "target not found". Successful installs mark
/// the package installed.
pub struct FakeBackend {
    name: String,
    installed: RefCell<HashSet<String>>,
    responses: RefCell<HashMap<String, VecDeque<CommandOutput>>>,
    owners: HashMap<PathBuf, String>,
    failing_removals: HashSet<String>,
    interrupt_on: Option<(String, InterruptFlag)>,
    calls: RefCell<Vec<Call>>,
}

impl FakeBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            installed: RefCell::new(HashSet::new()),
            responses: RefCell::new(HashMap::new()),
            owners: HashMap::new(),
            failing_removals: HashSet::new(),
            interrupt_on: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_installed(self, packages: &[&str]) -> Self {
        self.installed
            .borrow_mut()
            .extend(packages.iter().map(|p| p.to_string()));
        self
    }

    /// Queue install responses for `package`, consumed in order
    pub fn respond(self, package: &str, outputs: Vec<CommandOutput>) -> Self {
        self.responses
            .borrow_mut()
            .entry(package.to_string())
            .or_default()
            .extend(outputs);
        self
    }

    pub fn with_owner(mut self, path: &Path, owner: &str) -> Self {
        self.owners.insert(path.to_path_buf(), owner.to_string());
        self
    }

    pub fn failing_removal(mut self, owner: &str) -> Self {
        self.failing_removals.insert(owner.to_string());
        self
    }

    /// Raise `flag` while `package` is being installed; that install then
    /// reports termination by signal
    pub fn interrupt_during(mut self, package: &str, flag: InterruptFlag) -> Self {
        self.interrupt_on = Some((package.to_string(), flag));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn installs_of(&self, package: &str) -> Vec<InstallMode> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Install(p, mode) if p == package => Some(*mode),
                _ => None,
            })
            .collect()
    }

    pub fn install_count(&self, package: &str) -> usize {
        self.installs_of(package).len()
    }

    pub fn removals(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Remove(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PackageBackend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn install(&self, package: &str, mode: InstallMode) -> anyhow::Result<CommandOutput> {
        self.calls
            .borrow_mut()
            .push(Call::Install(package.to_string(), mode));

        if let Some((target, flag)) = &self.interrupt_on {
            if target == package {
                flag.raise();
                return Ok(killed());
            }
        }

        let scripted = self
            .responses
            .borrow_mut()
            .get_mut(package)
            .and_then(VecDeque::pop_front);
        let output = match scripted {
            Some(output) => output,
            None if self.installed.borrow().contains(package) => {
                CommandOutput::ok(format!("warning: {} is up to date -- reinstalling", package))
            }
            None => not_found(package),
        };

        if output.success {
            self.installed.borrow_mut().insert(package.to_string());
        }
        Ok(output)
    }

    fn is_installed(&self, package: &str) -> bool {
        self.installed.borrow().contains(package)
    }

    fn owner_of(&self, path: &Path) -> Option<String> {
        self.owners.get(path).cloned()
    }

    fn remove(&self, package: &str) -> anyhow::Result<CommandOutput> {
        self.calls.borrow_mut().push(Call::Remove(package.to_string()));
        if self.failing_removals.contains(package) {
            return Ok(CommandOutput::failed(
                1,
                format!("error: failed to prepare transaction (removing {} breaks dependency)", package),
            ));
        }
        self.installed.borrow_mut().remove(package);
        Ok(CommandOutput::ok(""))
    }
}

// ============================================================================
// Canned installer output
// ============================================================================

pub fn ok() -> CommandOutput {
    CommandOutput::ok("")
}

pub fn not_found(package: &str) -> CommandOutput {
    CommandOutput::failed(1, format!("error: target not found: {}", package))
}

pub fn killed() -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: String::new(),
        exit_code: None,
        success: false,
    }
}

pub fn conflict(package: &str, paths: &[&Path]) -> CommandOutput {
    let mut text = String::from(
        "error: failed to commit transaction (conflicting files)\n",
    );
    for path in paths {
        text.push_str(&format!("{}: {} exists in filesystem\n", package, path.display()));
    }
    text.push_str("Errors occurred, no packages were upgraded.\n");
    CommandOutput::failed(1, text)
}

pub fn missing_dependency(package: &str, deps: &[&str]) -> CommandOutput {
    let mut text = String::from(
        "error: failed to prepare transaction (could not satisfy dependencies)\n",
    );
    for dep in deps {
        text.push_str(&format!(
            ":: unable to satisfy dependency '{}' required by {}\n",
            dep, package
        ));
    }
    CommandOutput::failed(1, text)
}

// ============================================================================
// Workspace
// ============================================================================

/// Temporary log directory with the log and ledger a batch needs
pub struct Workspace {
    pub dir: TempDir,
    pub log: InstallLog,
    pub ledger: BackupLedger,
    pub classifier: SignatureClassifier,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = InstallLog::open(dir.path()).expect("open log").quiet();
        let ledger = BackupLedger::for_log_dir(dir.path());
        Self {
            dir,
            log,
            ledger,
            classifier: SignatureClassifier::pacman(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// No delay between attempts
pub fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::ZERO,
        removal_policy: RemovalPolicy::Heuristic,
    }
}

pub fn names(packages: &[&str]) -> Vec<String> {
    packages.iter().map(|p| p.to_string()).collect()
}
