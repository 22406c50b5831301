/// Undo support: the history journal and reverting an organize run.
///
/// Every successful transfer is journaled in `<output root>/.smartorg_history.json`.
/// Undo walks the journal newest-first, moving files back or removing copies.
use crate::executor::{ExecutionReport, FileOps, StdFileOps};
use crate::planner::OperationKind;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// File name of the journal inside an output root.
pub const HISTORY_FILE_NAME: &str = ".smartorg_history.json";

/// Errors while reading or writing the journal, or starting an undo.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("output root {} does not exist", path.display())]
    InvalidOutputRoot { path: PathBuf },

    #[error("no previous organization found to undo in {}", path.display())]
    NoHistory { path: PathBuf },

    #[error("history file {} is not valid: {source}", path.display())]
    InvalidHistory {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read history file {}: {source}", path.display())]
    HistoryReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write history file {}: {source}", path.display())]
    HistoryWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// One executed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub kind: OperationKind,
    pub original_path: PathBuf,
    pub new_path: PathBuf,
    pub rule: String,
}

/// Journal of transfers performed into one output root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLog {
    pub timestamp: DateTime<Local>,
    pub output_root: PathBuf,
    pub operations: Vec<JournalEntry>,
}

impl OperationLog {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            timestamp: Local::now(),
            output_root: output_root.into(),
            operations: Vec::new(),
        }
    }

    /// Builds a journal from the successful operations of `report`.
    pub fn from_report(output_root: impl Into<PathBuf>, report: &ExecutionReport) -> Self {
        let mut log = Self::new(output_root);
        log.record(report);
        log
    }

    /// Appends the successful operations of `report`.
    pub fn record(&mut self, report: &ExecutionReport) {
        self.timestamp = Local::now();
        self.operations.extend(report.succeeded().filter_map(|result| {
            Some(JournalEntry {
                kind: result.kind,
                original_path: result.operation.source.path.clone(),
                new_path: result.final_path.clone()?,
                rule: result.operation.rule.clone(),
            })
        }));
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn history_file_path(output_root: &Path) -> PathBuf {
        output_root.join(HISTORY_FILE_NAME)
    }

    pub fn save(&self) -> OrganizeResult<()> {
        let path = Self::history_file_path(&self.output_root);
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            OrganizeError::HistoryWriteFailed {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, e),
            }
        })?;
        fs::write(&path, json).map_err(|source| OrganizeError::HistoryWriteFailed {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), entries = self.operations.len(), "history saved");
        Ok(())
    }

    /// Loads the journal for `output_root`, or `None` if there is none.
    pub fn load(output_root: &Path) -> OrganizeResult<Option<Self>> {
        let path = Self::history_file_path(output_root);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(OrganizeError::HistoryReadFailed { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| OrganizeError::InvalidHistory { path, source })
    }

    pub fn delete(output_root: &Path) -> OrganizeResult<()> {
        let path = Self::history_file_path(output_root);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(OrganizeError::HistoryWriteFailed { path, source }),
        }
    }
}

/// Outcome of an undo.
#[derive(Debug, Default)]
pub struct UndoReport {
    pub restored_files: usize,
    pub failed_restores: Vec<(PathBuf, String)>,
    pub skipped_files: Vec<(PathBuf, String)>,
}

impl UndoReport {
    pub fn total_processed(&self) -> usize {
        self.restored_files + self.failed_restores.len() + self.skipped_files.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed_restores.is_empty() && self.skipped_files.is_empty()
    }
}

enum Restore {
    Done,
    Skipped(PathBuf, String),
    Failed(PathBuf, String),
}

pub struct UndoManager;

impl UndoManager {
    /// Reverts the journaled run in `output_root`.
    ///
    /// Moved files are moved back to where they came from. If something now
    /// occupies that location it is first renamed to
    /// `<name>.bak.<timestamp>`. Copies are deleted. Folders left empty
    /// under the output root are removed.
    ///
    /// The journal is deleted only when every entry was reverted; otherwise
    /// it is rewritten to hold just the entries that were not.
    ///
    /// # Errors
    ///
    /// Fails when the output root does not exist or the journal is missing or
    /// unreadable. Per-file problems are collected in the [`UndoReport`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use smartorg::undo::UndoManager;
    /// use std::path::Path;
    ///
    /// match UndoManager::undo(Path::new("/photos/Organized")) {
    ///     Ok(report) => println!("Restored {} files", report.restored_files),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo(output_root: &Path) -> OrganizeResult<UndoReport> {
        if !output_root.is_dir() {
            return Err(OrganizeError::InvalidOutputRoot {
                path: output_root.to_path_buf(),
            });
        }

        let log = OperationLog::load(output_root)?.ok_or_else(|| OrganizeError::NoHistory {
            path: output_root.to_path_buf(),
        })?;
        info!(
            output_root = %output_root.display(),
            entries = log.operations.len(),
            "undoing organization"
        );

        let mut report = UndoReport::default();
        let mut remaining = Vec::new();
        for entry in log.operations.iter().rev() {
            let restore = Self::revert(entry);
            if !matches!(restore, Restore::Done) {
                remaining.push(entry.clone());
            }
            match restore {
                Restore::Done => {
                    report.restored_files += 1;
                    if let Some(parent) = entry.new_path.parent() {
                        prune_empty_dirs(parent, output_root);
                    }
                }
                Restore::Skipped(path, reason) => {
                    warn!(path = %path.display(), %reason, "undo skipped");
                    report.skipped_files.push((path, reason));
                }
                Restore::Failed(path, reason) => {
                    warn!(path = %path.display(), %reason, "undo failed");
                    report.failed_restores.push((path, reason));
                }
            }
        }

        if report.is_complete_success() {
            if let Err(e) = OperationLog::delete(output_root) {
                warn!(error = %e, "could not delete history file");
            }
        } else {
            // Keep only what still needs reverting, oldest first.
            remaining.reverse();
            let kept = OperationLog {
                operations: remaining,
                ..log
            };
            if let Err(e) = kept.save() {
                warn!(error = %e, "could not rewrite history file");
            }
        }

        Ok(report)
    }

    fn revert(entry: &JournalEntry) -> Restore {
        if !entry.new_path.is_file() {
            return Restore::Skipped(
                entry.new_path.clone(),
                "file not found at its organized location".to_string(),
            );
        }

        match entry.kind {
            OperationKind::Copy => match fs::remove_file(&entry.new_path) {
                Ok(()) => Restore::Done,
                Err(e) => Restore::Failed(
                    entry.new_path.clone(),
                    format!("failed to remove copy: {}", e),
                ),
            },
            OperationKind::Move => Self::move_back(entry),
        }
    }

    fn move_back(entry: &JournalEntry) -> Restore {
        let original = &entry.original_path;
        let ops = StdFileOps;

        if original.exists() {
            let backup = generate_backup_path(original);
            if let Err(e) = ops.rename(original, &backup) {
                return Restore::Failed(
                    original.clone(),
                    format!("could not back up conflicting file: {}", e),
                );
            }
            info!(backup = %backup.display(), "backed up conflicting file");
        } else if let Some(parent) = original.parent()
            && let Err(e) = ops.create_dir_all(parent)
        {
            return Restore::Failed(
                original.clone(),
                format!("could not recreate {}: {}", parent.display(), e),
            );
        }

        let restored = ops.rename(&entry.new_path, original).or_else(|_| {
            ops.copy(&entry.new_path, original)?;
            ops.remove_file(&entry.new_path)
        });
        match restored {
            Ok(()) => Restore::Done,
            Err(e) => Restore::Failed(
                entry.new_path.clone(),
                format!("failed to restore file: {}", e),
            ),
        }
    }
}

/// `file.txt` becomes `file.txt.bak.20251109-143052`.
fn generate_backup_path(original: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let file_name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    original.with_file_name(format!("{}.bak.{}", file_name, timestamp))
}

/// Removes `dir` and its empty ancestors, stopping at `stop` (exclusive).
fn prune_empty_dirs(dir: &Path, stop: &Path) {
    let mut current = Some(dir);
    while let Some(path) = current {
        if path == stop || !path.starts_with(stop) {
            break;
        }
        if fs::remove_dir(path).is_err() {
            break;
        }
        current = path.parent();
    }
}
