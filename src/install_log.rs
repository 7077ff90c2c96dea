//! Durable installation log.
//!
//! One chronological file (`install.log`) with timestamped, leveled entries,
//! plus one file per failed attempt holding the complete installer output.
//! Every entry is also echoed to the terminal with a status glyph unless the
//! log is quiet.

use chrono::Local;
use colored::Colorize;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Severity of an install log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

impl LogLevel {
    fn glyph(&self) -> &'static str {
        match self {
            Self::Info => "➜",
            Self::Success => "✓",
            Self::Warn => "⚠",
            Self::Error => "✗",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

/// Append-only sink for the run's log directory
pub struct InstallLog {
    dir: PathBuf,
    file: Mutex<File>,
    echo: bool,
}

impl InstallLog {
    pub const LOG_FILE: &'static str = "install.log";
    pub const ERRORS_DIR: &'static str = "errors";

    /// Open (or create) `<dir>/install.log` for appending
    pub fn open<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(Self::ERRORS_DIR))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(Self::LOG_FILE))?;
        Ok(Self {
            dir,
            file: Mutex::new(file),
            echo: true,
        })
    }

    /// Stop echoing entries to the terminal
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(Self::LOG_FILE)
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.write(LogLevel::Info, msg.as_ref());
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        self.write(LogLevel::Success, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.write(LogLevel::Warn, msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.write(LogLevel::Error, msg.as_ref());
    }

    /// Append one entry. Write failures are reported through `log` and
    /// otherwise ignored; losing a log line never fails an install.
    pub fn write(&self, level: LogLevel, msg: &str) {
        let line = format!(
            "[{}] [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level,
            msg
        );

        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    log::warn!("Failed to append to {}: {}", self.path().display(), e);
                }
            }
            Err(_) => log::warn!("Install log mutex poisoned, dropping entry: {}", msg),
        }

        if self.echo {
            let glyph = match level {
                LogLevel::Info => level.glyph().cyan(),
                LogLevel::Success => level.glyph().green(),
                LogLevel::Warn => level.glyph().yellow(),
                LogLevel::Error => level.glyph().red(),
            };
            println!("{} {}", glyph, msg);
        }
    }

    /// Save the full output of a failed attempt and return where it went
    pub fn record_attempt_output(
        &self,
        package: &str,
        attempt: u32,
        output: &str,
    ) -> std::io::Result<PathBuf> {
        let path = self
            .dir
            .join(Self::ERRORS_DIR)
            .join(format!("{}.attempt{}.log", package, attempt));
        fs::write(&path, output)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_entries_are_timestamped_and_leveled() {
        let dir = tempdir().unwrap();
        let log = InstallLog::open(dir.path()).unwrap().quiet();

        log.info("starting batch");
        log.error("nmap failed");

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].contains("] [INFO] starting batch"));
        assert!(lines[1].contains("] [ERROR] nmap failed"));
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        InstallLog::open(dir.path()).unwrap().quiet().info("first");
        InstallLog::open(dir.path()).unwrap().quiet().info("second");

        let content = fs::read_to_string(dir.path().join(InstallLog::LOG_FILE)).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_attempt_output_file() {
        let dir = tempdir().unwrap();
        let log = InstallLog::open(dir.path()).unwrap().quiet();

        let path = log
            .record_attempt_output("sqlmap", 2, "error: something broke")
            .unwrap();
        assert_eq!(path, dir.path().join("errors").join("sqlmap.attempt2.log"));
        assert_eq!(fs::read_to_string(path).unwrap(), "error: something broke");
    }
}
