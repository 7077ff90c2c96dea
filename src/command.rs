//! Captured external command execution
//!
//! Every pacman and curl invocation goes through `run_captured` so that it:
//!
//! - runs in its own process group with stdin closed (never waits on a prompt)
//! - is registered with the child registry and can be interrupted
//! - hands back exit status plus both output streams
//!
//! AUR helpers go through `run_attached` instead. They escalate with their
//! own `sudo pacman`, which may ask for a password on the terminal, and that
//! only works from the foreground process group.

use crate::process_guard::{ChildGuard, CommandProcessGroup};
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::process::{Command, Stdio};

/// Output from one external command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// Failed output carrying `text` on stderr
    pub fn failed(exit_code: i32, text: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: text.into(),
            exit_code: Some(exit_code),
            success: false,
        }
    }

    /// stdout followed by stderr, the text failure classification reads
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Non-empty stdout lines, trimmed
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }

    /// Convert a failure into an error naming `context`
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            anyhow::bail!(
                "{} failed (exit code {}): {}",
                context,
                self.exit_code.unwrap_or(-1),
                self.combined().trim()
            )
        }
    }
}

/// Run `program` with `args`, wait for it, and capture its output.
///
/// A non-zero exit is NOT an error here: it comes back as
/// `CommandOutput { success: false, .. }`. `Err` means the process could not
/// be spawned or waited on.
pub fn run_captured<I, S>(program: &str, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().collect();
    let args_str: Vec<_> = args.iter().map(|s| s.as_ref().to_string_lossy()).collect();
    log::debug!("run_captured: {} {}", program, args_str.join(" "));

    let mut command = Command::new(program);
    command
        .args(&args)
        .stdin(Stdio::null())
        .in_new_process_group();
    capture(command, program)
}

/// Like `run_captured`, but the child inherits stdin and stays in our
/// process group, so anything it runs may prompt on the terminal.
pub fn run_attached<I, S>(program: &str, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().collect();
    let args_str: Vec<_> = args.iter().map(|s| s.as_ref().to_string_lossy()).collect();
    log::debug!("run_attached: {} {}", program, args_str.join(" "));

    let mut command = Command::new(program);
    command
        .args(&args)
        .stdin(Stdio::inherit())
        .in_foreground_group();
    capture(command, program)
}

fn capture(mut command: Command, program: &str) -> Result<CommandOutput> {
    let child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("LC_ALL", "C")
        .spawn()
        .with_context(|| format!("Failed to run {}", program))?;

    let _guard = ChildGuard::register(child.id());

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed waiting for {}", program))?;

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
        success: output.status.success(),
    };

    if !result.success {
        log::debug!(
            "{} exited with {:?}: {}",
            program,
            result.exit_code,
            result.stderr.trim()
        );
    }

    Ok(result)
}
