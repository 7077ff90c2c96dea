//! Remediation logic: turns a classified install failure into corrective
//! actions on the system.
//!
//! # Modules
//!
//! - `conflict`: remove a stale owner, or back up and move the file
//! - `dependency`: overwrite, needed, then explicit dependency install
//!
//! Neither component decides whether a package is installed. They only make
//! the next attempt more likely to succeed; the retry controller owns the verdict.

pub mod conflict;
pub mod dependency;

pub use conflict::{ConflictRecord, ConflictReport, ConflictResolution, ConflictResolver};
pub use dependency::{DependencyRepairer, RepairReport, RepairStep};
