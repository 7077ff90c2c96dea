//! Arsenal Library
//!
//! Bulk installation of a pacman repository, group or package list with
//! automatic remediation of file conflicts and broken dependencies.

pub mod backup;
pub mod batch;
pub mod classifier;
pub mod cli;
pub mod command;
pub mod config_file;
pub mod error;
pub mod install_log;
pub mod install_state;
pub mod logic;
pub mod package_list;
pub mod package_manager;
pub mod process_guard;
pub mod prompt;
pub mod retry;
pub mod sanity;
pub mod session;
pub mod setup;
pub mod types;

// Re-export main types for convenience
pub use backup::{BackupEntry, BackupLedger, EntryKind, FileSnapshot};
pub use batch::{BatchOrchestrator, BatchReport, PersistedLists, SecondaryReport};
pub use classifier::{ErrorClassifier, SignatureClassifier};
pub use command::{CommandOutput, run_attached, run_captured};
pub use config_file::RunConfig;
pub use error::ArsenalError;
pub use install_log::{InstallLog, LogLevel};
pub use install_state::{PackageStage, PackageTracker, TransitionError};
pub use logic::{
    ConflictRecord, ConflictReport, ConflictResolution, ConflictResolver, DependencyRepairer,
    RepairReport, RepairStep,
};
pub use package_manager::{AurHelper, PackageBackend, Pacman};
pub use process_guard::{ChildRegistry, CommandProcessGroup, InterruptFlag};
pub use prompt::{AssumeYes, Prompter, TerminalPrompter};
pub use retry::{Outcome, PackageResult, RetryController, RetryPolicy, SkipReason};
pub use types::{CleanupAction, FailureKind, InstallMode, PackageSet, RemovalPolicy, SecondaryPass};
