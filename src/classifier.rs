//! Failure classification for install attempts.
//!
//! Pacman's only error channel is free text, so classification is a list of
//! named signature rules checked in order. The first rule that matches wins;
//! nothing matching means `FailureKind::Unknown`.
//!
//! The same module owns the extractors that pull structured data (conflicting
//! paths, missing dependency names) out of that text.

use crate::types::FailureKind;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Assigns a category to the raw output of a failed install
pub trait ErrorClassifier {
    fn classify(&self, output: &str) -> FailureKind;
}

/// A named pattern mapping matching output to a category
#[derive(Debug, Clone)]
pub struct SignatureRule {
    pub name: &'static str,
    pub kind: FailureKind,
    pattern: Regex,
}

impl SignatureRule {
    pub fn new(name: &'static str, kind: FailureKind, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            kind,
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn matches(&self, output: &str) -> bool {
        self.pattern.is_match(output)
    }
}

/// Ordered signature rules; first match wins
#[derive(Debug, Clone)]
pub struct SignatureClassifier {
    rules: Vec<SignatureRule>,
}

impl SignatureClassifier {
    pub fn new(rules: Vec<SignatureRule>) -> Self {
        Self { rules }
    }

    /// Rules for pacman and pacman-wrapping AUR helpers.
    ///
    /// File conflicts are checked first: a failed commit can mention both.
    pub fn pacman() -> Self {
        let rules = [
            (
                "exists-in-filesystem",
                FailureKind::FileConflict,
                r"(?i)exists in filesystem",
            ),
            (
                "conflicting-files",
                FailureKind::FileConflict,
                r"(?i)\(conflicting files\)",
            ),
            (
                "dependency-required",
                FailureKind::DependencyIssue,
                r"(?i)dependency\s+'?\S+'?\s+(?:is\s+)?required",
            ),
            (
                "unsatisfied-dependency",
                FailureKind::DependencyIssue,
                r"(?i)(?:could not|unable to) satisfy dependenc",
            ),
            (
                "breaks-dependency",
                FailureKind::DependencyIssue,
                r"(?i)breaks dependency",
            ),
        ];

        Self::new(
            rules
                .into_iter()
                .filter_map(|(name, kind, pattern)| SignatureRule::new(name, kind, pattern).ok())
                .collect(),
        )
    }

    pub fn rules(&self) -> &[SignatureRule] {
        &self.rules
    }

    /// Name of the first rule matching `output`, for logging
    pub fn matching_rule(&self, output: &str) -> Option<&'static str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(output))
            .map(|rule| rule.name)
    }
}

impl Default for SignatureClassifier {
    fn default() -> Self {
        Self::pacman()
    }
}

impl ErrorClassifier for SignatureClassifier {
    fn classify(&self, output: &str) -> FailureKind {
        self.rules
            .iter()
            .find(|rule| rule.matches(output))
            .map(|rule| rule.kind)
            .unwrap_or(FailureKind::Unknown)
    }
}

fn conflict_line_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // "<pkg>: /usr/bin/foo exists in filesystem" or
    // "/usr/bin/foo exists in filesystem (owned by bar)".
    // Paths are printed raw and may contain spaces.
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:\S+:[ \t]+)?(/.*?)[ \t]+exists in filesystem").ok()
    })
    .as_ref()
}

fn missing_dependency_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // "dependency 'libfoo>=1.2' is required by bar" /
    // "unable to satisfy dependency 'libfoo' required by bar"
    RE.get_or_init(|| {
        Regex::new(r"(?i)dependency\s+'?([A-Za-z0-9@._+-]+)[^'\s]*'?\s+(?:is\s+)?required").ok()
    })
    .as_ref()
}

/// Every conflicting path reported in `output`, in order, without duplicates
pub fn extract_conflicting_paths(output: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let Some(re) = conflict_line_regex() else {
        return paths;
    };
    for caps in re.captures_iter(output) {
        let path = PathBuf::from(&caps[1]);
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// Every named missing dependency in `output`, version constraints stripped
pub fn extract_missing_dependencies(output: &str) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    let Some(re) = missing_dependency_regex() else {
        return deps;
    };
    for caps in re.captures_iter(output) {
        let name = caps[1].to_string();
        if !deps.contains(&name) {
            deps.push(name);
        }
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFLICT_OUTPUT: &str = "\
error: failed to commit transaction (conflicting files)
sqlmap: /usr/bin/sqlmap exists in filesystem
sqlmap: /usr/share/sqlmap/README.md exists in filesystem
Errors occurred, no packages were upgraded.";

    const DEPENDENCY_OUTPUT: &str = "\
error: failed to prepare transaction (could not satisfy dependencies)
:: unable to satisfy dependency 'python-impacket>=0.11' required by crackmapexec
:: unable to satisfy dependency 'python-lsassy' required by crackmapexec";

    #[test]
    fn test_classifies_file_conflict() {
        let classifier = SignatureClassifier::pacman();
        assert_eq!(classifier.classify(CONFLICT_OUTPUT), FailureKind::FileConflict);
        assert_eq!(
            classifier.matching_rule(CONFLICT_OUTPUT),
            Some("exists-in-filesystem")
        );
    }

    #[test]
    fn test_classifies_dependency_issue() {
        let classifier = SignatureClassifier::pacman();
        assert_eq!(
            classifier.classify(DEPENDENCY_OUTPUT),
            FailureKind::DependencyIssue
        );
        assert_eq!(
            classifier.classify("error: dependency libpcap is required by nmap"),
            FailureKind::DependencyIssue
        );
    }

    #[test]
    fn test_unrecognized_output_is_unknown() {
        let classifier = SignatureClassifier::pacman();
        assert_eq!(
            classifier.classify("error: failed retrieving file 'x.pkg.tar.zst' from mirror"),
            FailureKind::Unknown
        );
        assert_eq!(classifier.classify(""), FailureKind::Unknown);
    }

    #[test]
    fn test_conflict_wins_over_dependency() {
        let classifier = SignatureClassifier::pacman();
        let both = format!("{}\n{}", DEPENDENCY_OUTPUT, CONFLICT_OUTPUT);
        assert_eq!(classifier.classify(&both), FailureKind::FileConflict);
    }

    #[test]
    fn test_custom_rules() {
        let rule = SignatureRule::new("lock", FailureKind::Unknown, "unable to lock database")
            .unwrap();
        let classifier = SignatureClassifier::new(vec![rule]);
        assert_eq!(classifier.rules().len(), 1);
        assert_eq!(
            classifier.classify("sqlmap: /usr/bin/sqlmap exists in filesystem"),
            FailureKind::Unknown
        );
    }

    #[test]
    fn test_extract_conflicting_paths() {
        let paths = extract_conflicting_paths(CONFLICT_OUTPUT);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/usr/bin/sqlmap"),
                PathBuf::from("/usr/share/sqlmap/README.md"),
            ]
        );
    }

    #[test]
    fn test_extract_paths_with_owner_suffix_and_duplicates() {
        let output = "/usr/lib/libx.so exists in filesystem (owned by libx-git)\n\
                      foo: /usr/lib/libx.so exists in filesystem";
        assert_eq!(
            extract_conflicting_paths(output),
            vec![PathBuf::from("/usr/lib/libx.so")]
        );
    }

    #[test]
    fn test_extract_paths_with_spaces() {
        let output = "\
error: failed to commit transaction (conflicting files)
seclists: /usr/share/seclists/Fuzzing/big list.txt exists in filesystem
seclists: /usr/share/seclists/README.md exists in filesystem
/opt/My Tools/run me.sh exists in filesystem (owned by old-tools)";
        assert_eq!(
            extract_conflicting_paths(output),
            vec![
                PathBuf::from("/usr/share/seclists/Fuzzing/big list.txt"),
                PathBuf::from("/usr/share/seclists/README.md"),
                PathBuf::from("/opt/My Tools/run me.sh"),
            ]
        );
    }

    #[test]
    fn test_extract_paths_none() {
        assert!(extract_conflicting_paths("error: failed to commit transaction").is_empty());
    }

    #[test]
    fn test_extract_missing_dependencies() {
        assert_eq!(
            extract_missing_dependencies(DEPENDENCY_OUTPUT),
            vec!["python-impacket", "python-lsassy"]
        );
        assert_eq!(
            extract_missing_dependencies("dependency libpcap is required by nmap"),
            vec!["libpcap"]
        );
    }
}
