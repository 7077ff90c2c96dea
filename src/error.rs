//! Error handling module for arsenal
//!
//! Provides the typed error taxonomy used across the library. Per-package
//! install failures are NOT errors: they are recorded as `Outcome::Failed`
//! and never abort a batch. Only startup failures (privilege, user context,
//! selection, package list) are fatal and carry an exit code.

use thiserror::Error;

/// Main error type for arsenal
#[derive(Error, Debug)]
pub enum ArsenalError {
    /// IO errors (log files, backups, package list files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors (loading, parsing)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (config values, user input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not running as root
    #[error("Privilege error: {0}")]
    Privilege(String),

    /// No originating (non-root) user could be determined
    #[error("Missing user context: {0}")]
    MissingUserContext(String),

    /// Operator picked something that does not exist
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Package list could not be sourced
    #[error("Package list error: {0}")]
    PackageList(String),

    /// Repository / keyring / helper dependency setup failed
    #[error("Setup error: {0}")]
    Setup(String),

    /// A remediation step could not complete
    #[error("Remediation failed: {0}")]
    Remediation(String),

    /// External command could not be spawned or waited on
    #[error("Command error: {0}")]
    Command(String),

    /// Package state machine violation
    #[error("State error: {0}")]
    State(String),
}

/// Result type alias for arsenal operations
pub type Result<T> = std::result::Result<T, ArsenalError>;

impl ArsenalError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a package list error
    pub fn package_list(msg: impl Into<String>) -> Self {
        Self::PackageList(msg.into())
    }

    /// Create a setup error
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Create a remediation error
    pub fn remediation(msg: impl Into<String>) -> Self {
        Self::Remediation(msg.into())
    }

    /// Create a command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Process exit code for errors that terminate the program.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Privilege(_) => 1,
            Self::MissingUserContext(_) => 2,
            Self::InvalidSelection(_) => 3,
            Self::PackageList(_) => 4,
            Self::Config(_) | Self::Validation(_) | Self::Json(_) => 5,
            _ => 1,
        }
    }

    /// Whether a failure of this kind should stop the run before any install.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Privilege(_)
                | Self::MissingUserContext(_)
                | Self::InvalidSelection(_)
                | Self::PackageList(_)
                | Self::Config(_)
                | Self::Validation(_)
        )
    }
}
