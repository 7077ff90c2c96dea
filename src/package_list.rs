//! Sourcing the ordered package list for a batch.
//!
//! Lists come from the sync database (whole repository or one group) or
//! from an operator file. Whatever the source, the result is trimmed,
//! comment-free, deduplicated in first-seen order, and carries the sentinel
//! package at the end.

use crate::config_file::is_valid_package_name;
use crate::error::{ArsenalError, Result};
use crate::package_manager::Pacman;
use crate::types::PackageSet;

use std::collections::HashSet;
use std::fs;

/// Read-only view of the sync databases
pub trait PackageCatalog {
    fn repository_packages(&self, repository: &str) -> anyhow::Result<Vec<String>>;
    fn group_packages(&self, group: &str) -> anyhow::Result<Vec<String>>;
    fn groups(&self) -> anyhow::Result<Vec<String>>;
}

impl PackageCatalog for Pacman {
    fn repository_packages(&self, repository: &str) -> anyhow::Result<Vec<String>> {
        self.list_repository(repository)
    }

    fn group_packages(&self, group: &str) -> anyhow::Result<Vec<String>> {
        self.list_group(group)
    }

    fn groups(&self) -> anyhow::Result<Vec<String>> {
        self.list_groups()
    }
}

/// Parse newline-delimited package text.
///
/// Blank lines and `#` comments are dropped, only the first token of a
/// line is kept (so `pkg version` lines work), and duplicates are removed
/// keeping the first occurrence. Tokens that are not valid package names
/// are dropped with a warning.
pub fn parse_package_list(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut packages = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(name) = line.split_whitespace().next() else {
            continue;
        };
        if !is_valid_package_name(name) {
            log::warn!("Ignoring invalid package name in list: {}", name);
            continue;
        }
        if seen.insert(name.to_string()) {
            packages.push(name.to_string());
        }
    }

    packages
}

/// Deduplicate `packages` and append `sentinel` unless already present
pub fn finalize(packages: Vec<String>, sentinel: Option<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut list: Vec<String> = packages
        .into_iter()
        .filter(|pkg| seen.insert(pkg.clone()))
        .collect();

    if let Some(sentinel) = sentinel {
        if !seen.contains(sentinel) {
            list.push(sentinel.to_string());
        }
    }
    list
}

/// Resolve `set` to the ordered list of packages to install
pub fn load_package_set(
    set: &PackageSet,
    catalog: &dyn PackageCatalog,
    repository: &str,
    sentinel: Option<&str>,
) -> Result<Vec<String>> {
    let packages = match set {
        PackageSet::All => {
            let packages = catalog.repository_packages(repository).map_err(|e| {
                ArsenalError::package_list(format!(
                    "could not list repository {}: {:#}",
                    repository, e
                ))
            })?;
            if packages.is_empty() {
                return Err(ArsenalError::package_list(format!(
                    "repository {} has no packages (is it configured?)",
                    repository
                )));
            }
            packages
        }
        PackageSet::Group(group) => {
            let packages = catalog.group_packages(group).unwrap_or_default();
            if packages.is_empty() {
                return Err(ArsenalError::InvalidSelection(format!(
                    "group {} does not exist or is empty",
                    group
                )));
            }
            packages
        }
        PackageSet::File(path) => {
            let text = fs::read_to_string(path).map_err(|e| {
                ArsenalError::package_list(format!("cannot read {}: {}", path.display(), e))
            })?;
            let packages = parse_package_list(&text);
            if packages.is_empty() {
                return Err(ArsenalError::package_list(format!(
                    "{} contains no package names",
                    path.display()
                )));
            }
            packages
        }
    };

    let list = finalize(packages, sentinel);
    log::info!("{} resolved to {} package(s)", set, list.len());
    Ok(list)
}
