//! Per-package install state machine
//!
//! Every package moves through a small, validated set of stages. The tracker
//! is the single source of truth for how many install invocations a package
//! has consumed, so the attempt bound cannot be exceeded by accident.
//!
//! # Stage Flow
//!
//! ```text
//! Pending ──▶ Attempting ──▶ Installed
//!    │            │  ▲
//!    │            └──┘ (next attempt)
//!    │            │
//!    │            ▼
//!    │          Failed
//!    ▼
//! Skipped   (already installed / interrupted)
//! ```
//!
//! Installed, Failed and Skipped are terminal.

use std::fmt;
use thiserror::Error;

/// Stages a package passes through during one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageStage {
    /// Queued, nothing invoked yet
    Pending,
    /// At least one install invocation started
    Attempting,
    /// Install succeeded (terminal)
    Installed,
    /// Attempt budget exhausted (terminal)
    Failed,
    /// Never attempted (terminal)
    Skipped,
}

impl PackageStage {
    /// Returns true for Installed, Failed and Skipped
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Installed | Self::Failed | Self::Skipped)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Attempting => "attempting",
            Self::Installed => "installed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PackageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{package}: cannot move from terminal stage {from}")]
    FromTerminal { package: String, from: PackageStage },

    #[error("{package}: cannot move from {from} to {to}")]
    Invalid {
        package: String,
        from: PackageStage,
        to: PackageStage,
    },

    #[error("{package}: attempt budget of {max} exhausted")]
    BudgetExhausted { package: String, max: u32 },
}

/// Tracks stage and attempt count for one package
#[derive(Debug, Clone)]
pub struct PackageTracker {
    package: String,
    stage: PackageStage,
    attempts: u32,
    max_attempts: u32,
}

impl PackageTracker {
    pub fn new(package: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            package: package.into(),
            stage: PackageStage::Pending,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    #[inline]
    pub fn stage(&self) -> PackageStage {
        self.stage
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts left before the package fails
    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    fn ensure_not_terminal(&self) -> Result<(), TransitionError> {
        if self.stage.is_terminal() {
            return Err(TransitionError::FromTerminal {
                package: self.package.clone(),
                from: self.stage,
            });
        }
        Ok(())
    }

    /// Start the next install invocation (Pending/Attempting -> Attempting).
    /// Returns the 1-based attempt number.
    pub fn begin_attempt(&mut self) -> Result<u32, TransitionError> {
        self.ensure_not_terminal()?;
        if self.attempts >= self.max_attempts {
            return Err(TransitionError::BudgetExhausted {
                package: self.package.clone(),
                max: self.max_attempts,
            });
        }
        self.stage = PackageStage::Attempting;
        self.attempts += 1;
        log::debug!("{}: attempt {}/{}", self.package, self.attempts, self.max_attempts);
        Ok(self.attempts)
    }

    /// Attempting -> Installed
    pub fn mark_installed(&mut self) -> Result<(), TransitionError> {
        self.require_attempting(PackageStage::Installed)?;
        self.stage = PackageStage::Installed;
        Ok(())
    }

    /// Attempting -> Failed
    pub fn mark_failed(&mut self) -> Result<(), TransitionError> {
        self.require_attempting(PackageStage::Failed)?;
        self.stage = PackageStage::Failed;
        Ok(())
    }

    /// Pending/Attempting -> Skipped
    pub fn mark_skipped(&mut self) -> Result<(), TransitionError> {
        self.ensure_not_terminal()?;
        self.stage = PackageStage::Skipped;
        Ok(())
    }

    fn require_attempting(&self, to: PackageStage) -> Result<(), TransitionError> {
        self.ensure_not_terminal()?;
        if self.stage != PackageStage::Attempting {
            return Err(TransitionError::Invalid {
                package: self.package.clone(),
                from: self.stage,
                to,
            });
        }
        Ok(())
    }
}
