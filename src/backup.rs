//! Backup ledger for filesystem objects touched by conflict resolution.
//!
//! Layout under `<log_dir>/backups/`:
//!
//! ```text
//! ledger.jsonl                          one BackupEntry per line
//! <package>/<stamp>/<original path>     content copy, original layout kept
//! <package>/<stamp>.meta.json           metadata sidecar
//! ```
//!
//! Mirroring the original layout keeps every file name as short as the
//! original's, however deep the path.
//!
//! `snapshot` writes the sidecar, then the copy, then the ledger line. If the
//! copy or the ledger line fails, the partial backup is removed again. A
//! caller only mutates the original after `snapshot` returned and
//! `BackupEntry::is_complete` holds. Nothing here deletes a backup except
//! the operator-invoked `purge_all` (and `archive_all`, which moves them).

use crate::error::{ArsenalError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// What kind of filesystem object was captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink { target: PathBuf },
}

/// Permission/owner metadata captured before mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub kind: EntryKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
}

impl FileSnapshot {
    /// Capture metadata without following a final symlink
    pub fn capture(path: &Path) -> std::io::Result<Self> {
        let meta = fs::symlink_metadata(path)?;
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink {
                target: fs::read_link(path)?,
            }
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        Ok(Self {
            kind,
            mode: meta.mode() & 0o7777,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Local>::from),
        })
    }
}

/// One preserved filesystem object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub package: String,
    pub original_path: PathBuf,
    pub content_copy: PathBuf,
    pub metadata_path: PathBuf,
    /// Where the resolver moved the original, if it did
    pub relocated_to: Option<PathBuf>,
    pub snapshot: FileSnapshot,
    pub timestamp: DateTime<Local>,
}

impl BackupEntry {
    /// Both the sidecar and the content copy exist on disk
    pub fn is_complete(&self) -> bool {
        self.metadata_path.is_file() && fs::symlink_metadata(&self.content_copy).is_ok()
    }
}

/// Append-only ledger of backups, partitioned by package
#[derive(Debug, Clone)]
pub struct BackupLedger {
    root: PathBuf,
}

impl BackupLedger {
    pub const DIR_NAME: &'static str = "backups";
    pub const LEDGER_FILE: &'static str = "ledger.jsonl";

    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Ledger rooted at `<log_dir>/backups`
    pub fn for_log_dir<P: AsRef<Path>>(log_dir: P) -> Self {
        Self::new(log_dir.as_ref().join(Self::DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(Self::LEDGER_FILE)
    }

    /// Preserve `path` on behalf of `package` before it is mutated.
    ///
    /// Writes the metadata sidecar, copies the content to a timestamped
    /// location and appends the ledger line, in that order.
    pub fn snapshot(
        &self,
        package: &str,
        path: &Path,
        relocated_to: Option<&Path>,
    ) -> Result<BackupEntry> {
        let snapshot = FileSnapshot::capture(path)?;
        let timestamp = Local::now();

        let package_dir = self.root.join(package);
        fs::create_dir_all(&package_dir)?;

        let stamp_dir = unique_path(
            &package_dir,
            &timestamp.format("%Y%m%d-%H%M%S%.3f").to_string(),
        );
        let mut metadata_name = stamp_dir.clone().into_os_string();
        metadata_name.push(".meta.json");
        let metadata_path = PathBuf::from(metadata_name);
        let content_copy = stamp_dir.join(mirrored_path(path));

        let entry = BackupEntry {
            package: package.to_string(),
            original_path: path.to_path_buf(),
            content_copy,
            metadata_path,
            relocated_to: relocated_to.map(Path::to_path_buf),
            snapshot,
            timestamp,
        };

        fs::write(&entry.metadata_path, serde_json::to_string_pretty(&entry)?)?;
        let stored = entry
            .content_copy
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| copy_object(path, &entry.content_copy, &entry.snapshot.kind))
            .map_err(ArsenalError::from)
            .and_then(|_| self.append(&entry));
        if let Err(e) = stored {
            discard_partial(&stamp_dir, &entry.metadata_path);
            return Err(e);
        }

        log::debug!(
            "Backed up {} to {}",
            entry.original_path.display(),
            entry.content_copy.display()
        );
        Ok(entry)
    }

    fn append(&self, entry: &BackupEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.ledger_path())?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// All ledger entries in the order they were recorded
    pub fn entries(&self) -> Result<Vec<BackupEntry>> {
        let path = self.ledger_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let mut entries = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<BackupEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!(
                    "Skipping malformed ledger line {} in {}: {}",
                    idx + 1,
                    path.display(),
                    e
                ),
            }
        }
        Ok(entries)
    }

    /// Entries recorded for one package
    pub fn entries_for(&self, package: &str) -> Result<Vec<BackupEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.package == package)
            .collect())
    }

    /// Number of backup files (content copies and sidecars) on disk
    pub fn file_count(&self) -> usize {
        count_files(&self.root, Some(&self.ledger_path()))
    }

    /// Move every backup into `<archive_root>/<timestamp>/` and return the
    /// number of files moved. The ledger moves with them.
    pub fn archive_all(&self, archive_root: &Path) -> Result<usize> {
        let count = self.file_count();
        if !self.root.exists() {
            return Ok(0);
        }

        let dest = archive_root.join(Local::now().format("%Y%m%d-%H%M%S").to_string());
        fs::create_dir_all(&dest)?;

        for item in fs::read_dir(&self.root)? {
            let item = item?;
            move_path(&item.path(), &dest.join(item.file_name()))?;
        }

        log::info!("Archived {} backup file(s) to {}", count, dest.display());
        Ok(count)
    }

    /// Delete every backup and the ledger; returns the number of files removed
    pub fn purge_all(&self) -> Result<usize> {
        let count = self.file_count();
        if !self.root.exists() {
            return Ok(0);
        }

        for item in fs::read_dir(&self.root)? {
            let path = item?.path();
            if fs::symlink_metadata(&path)?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }

        log::info!("Deleted {} backup file(s) from {}", count, self.root.display());
        Ok(count)
    }

    /// Put one backup back at its original path with its original mode and owner
    pub fn restore(&self, entry: &BackupEntry) -> Result<()> {
        if !entry.is_complete() {
            return Err(ArsenalError::remediation(format!(
                "backup of {} is incomplete, refusing to restore",
                entry.original_path.display()
            )));
        }

        if let Some(parent) = entry.original_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Ok(meta) = fs::symlink_metadata(&entry.original_path) {
            if meta.is_dir() {
                fs::remove_dir_all(&entry.original_path)?;
            } else {
                fs::remove_file(&entry.original_path)?;
            }
        }

        copy_object(&entry.content_copy, &entry.original_path, &entry.snapshot.kind)?;

        if !matches!(entry.snapshot.kind, EntryKind::Symlink { .. }) {
            fs::set_permissions(
                &entry.original_path,
                fs::Permissions::from_mode(entry.snapshot.mode),
            )?;
        }
        if let Err(e) = std::os::unix::fs::lchown(
            &entry.original_path,
            Some(entry.snapshot.uid),
            Some(entry.snapshot.gid),
        ) {
            log::warn!(
                "Could not restore owner of {}: {}",
                entry.original_path.display(),
                e
            );
        }

        log::info!("Restored {}", entry.original_path.display());
        Ok(())
    }

    /// Restore every entry (or every entry of `package`); returns the count.
    /// Later entries for the same path win.
    pub fn restore_all(&self, package: Option<&str>) -> Result<usize> {
        let entries = match package {
            Some(name) => self.entries_for(name)?,
            None => self.entries()?,
        };

        let mut restored = 0;
        for entry in &entries {
            self.restore(entry)?;
            restored += 1;
        }
        Ok(restored)
    }
}

/// `/usr/bin/foo` -> `usr/bin/foo`, dropping root and `.`/`..` components
fn mirrored_path(path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    if relative.as_os_str().is_empty() {
        PathBuf::from("root")
    } else {
        relative
    }
}

/// `dir/base`, or `dir/base-N` for the first N where neither the directory
/// nor its sidecar exists yet
fn unique_path(dir: &Path, base: &str) -> PathBuf {
    let taken = |name: &str| {
        fs::symlink_metadata(dir.join(name)).is_ok()
            || fs::symlink_metadata(dir.join(format!("{}.meta.json", name))).is_ok()
    };
    if !taken(base) {
        return dir.join(base);
    }
    let mut n = 1;
    loop {
        let name = format!("{}-{}", base, n);
        if !taken(&name) {
            return dir.join(name);
        }
        n += 1;
    }
}

/// Best-effort removal of a snapshot that never reached the ledger
fn discard_partial(stamp_dir: &Path, metadata_path: &Path) {
    if let Err(e) = fs::remove_file(metadata_path) {
        log::warn!("Could not remove {}: {}", metadata_path.display(), e);
    }
    if stamp_dir.exists() {
        if let Err(e) = fs::remove_dir_all(stamp_dir) {
            log::warn!("Could not remove {}: {}", stamp_dir.display(), e);
        }
    }
}

/// Copy a file, symlink or directory tree without following symlinks
fn copy_object(src: &Path, dest: &Path, kind: &EntryKind) -> std::io::Result<()> {
    match kind {
        EntryKind::File => {
            fs::copy(src, dest)?;
        }
        EntryKind::Symlink { .. } => {
            std::os::unix::fs::symlink(fs::read_link(src)?, dest)?;
        }
        EntryKind::Directory => {
            for item in WalkDir::new(src).follow_links(false) {
                let item = item.map_err(std::io::Error::other)?;
                let rel = item
                    .path()
                    .strip_prefix(src)
                    .map_err(std::io::Error::other)?;
                let target = dest.join(rel);
                let file_type = item.file_type();
                if file_type.is_dir() {
                    fs::create_dir_all(&target)?;
                } else if file_type.is_symlink() {
                    std::os::unix::fs::symlink(fs::read_link(item.path())?, &target)?;
                } else {
                    fs::copy(item.path(), &target)?;
                }
            }
        }
    }
    Ok(())
}

/// Rename, falling back to copy + delete across filesystems
fn move_path(src: &Path, dest: &Path) -> std::io::Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    let meta = fs::symlink_metadata(src)?;
    let kind = if meta.file_type().is_symlink() {
        EntryKind::Symlink {
            target: fs::read_link(src)?,
        }
    } else if meta.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    copy_object(src, dest, &kind)?;

    if meta.is_dir() {
        fs::remove_dir_all(src)
    } else {
        fs::remove_file(src)
    }
}

fn count_files(root: &Path, exclude: Option<&Path>) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .filter(|e| exclude != Some(e.path()))
        .count()
}
