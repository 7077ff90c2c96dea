//! Type-safe run decisions and classification types.
//!
//! Every choice the interactive flow can ask about is modelled as an enum so
//! a fully automated run can supply it up front from a config file or flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

/// Which packages to install.
///
/// Serialized as `all`, `group:<name>` or `file:<path>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PackageSet {
    /// Every package in the repository
    #[default]
    All,
    /// A named package group (e.g. `blackarch-webapp`)
    Group(String),
    /// An operator-supplied newline-delimited list
    File(PathBuf),
}

impl fmt::Display for PackageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Group(name) => write!(f, "group:{}", name),
            Self::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

impl FromStr for PackageSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if let Some(name) = s.strip_prefix("group:") {
            let name = name.trim();
            if name.is_empty() {
                return Err("group name must not be empty".to_string());
            }
            return Ok(Self::Group(name.to_string()));
        }
        if let Some(path) = s.strip_prefix("file:") {
            let path = path.trim();
            if path.is_empty() {
                return Err("file path must not be empty".to_string());
            }
            return Ok(Self::File(PathBuf::from(path)));
        }
        Err(format!(
            "unrecognized package set '{}' (expected all, group:<name> or file:<path>)",
            s
        ))
    }
}

impl TryFrom<String> for PackageSet {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PackageSet> for String {
    fn from(value: PackageSet) -> Self {
        value.to_string()
    }
}

/// What to do with the backup ledger after a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CleanupAction {
    #[default]
    Keep,
    Archive,
    Delete,
}

/// Whether failed packages get a second pass through the AUR helper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SecondaryPass {
    #[default]
    Ask,
    Always,
    Never,
}

/// When a package that owns a conflicting file may be uninstalled.
///
/// `Heuristic` removes the owner when it looks like a development build of
/// the package being installed, or when its name does not contain the
/// installing package's name at all. The second half of that rule can hit
/// unrelated packages, which is why the stricter policies exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RemovalPolicy {
    #[default]
    Heuristic,
    DevVariantOnly,
    Never,
}

/// Flags passed to the package manager for one install invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum InstallMode {
    /// `-S --noconfirm`
    #[default]
    Standard,
    /// `-S --noconfirm --overwrite '*'`
    Overwrite,
    /// `-S --noconfirm --needed`
    Needed,
}

/// Category assigned to a failed install attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum FailureKind {
    #[strum(serialize = "file-conflict")]
    FileConflict,
    #[strum(serialize = "dependency-issue")]
    DependencyIssue,
    #[strum(serialize = "unknown")]
    Unknown,
}

impl FailureKind {
    /// Whether a remediation component exists for this category
    pub fn is_remediable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_set_parse() {
        assert_eq!("all".parse::<PackageSet>(), Ok(PackageSet::All));
        assert_eq!(
            "group:blackarch-webapp".parse::<PackageSet>(),
            Ok(PackageSet::Group("blackarch-webapp".to_string()))
        );
        assert_eq!(
            "file:/root/tools.txt".parse::<PackageSet>(),
            Ok(PackageSet::File(PathBuf::from("/root/tools.txt")))
        );
        assert!("group:".parse::<PackageSet>().is_err());
        assert!("everything".parse::<PackageSet>().is_err());
    }

    #[test]
    fn test_package_set_serde_as_string() {
        let json = serde_json::to_string(&PackageSet::Group("blackarch-recon".into())).unwrap();
        assert_eq!(json, "\"group:blackarch-recon\"");
        let back: PackageSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PackageSet::Group("blackarch-recon".into()));
    }

    #[test]
    fn test_removal_policy_names() {
        assert_eq!(RemovalPolicy::DevVariantOnly.to_string(), "dev-variant-only");
        assert_eq!(
            "never".parse::<RemovalPolicy>().unwrap(),
            RemovalPolicy::Never
        );
    }

    #[test]
    fn test_unknown_failures_are_not_remediable() {
        assert!(FailureKind::FileConflict.is_remediable());
        assert!(FailureKind::DependencyIssue.is_remediable());
        assert!(!FailureKind::Unknown.is_remediable());
    }
}
