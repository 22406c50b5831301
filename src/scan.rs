//! Metadata extraction and directory scanning.
//!
//! A [`Scanner`] walks a root directory and lazily yields one [`FileRecord`]
//! per candidate file. Files that cannot be read are yielded as
//! [`AccessError`]s so that callers still see every readable file.

use crate::config::CompiledFilters;
use crate::undo::HISTORY_FILE_NAME;
use chrono::{DateTime, Local};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A file (or directory entry) could not be read during a scan.
#[derive(Debug, Error)]
#[error("cannot access {}: {source}", path.display())]
pub struct AccessError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl AccessError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while preparing a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid include pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Snapshot of one file's metadata, taken at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path of the file.
    pub path: PathBuf,
    pub file_name: String,
    /// Lowercased, without the leading dot. Empty when the file has none.
    pub extension: String,
    pub size: u64,
    pub modified: DateTime<Local>,
    /// MIME type sniffed from the file header, when detection was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileRecord {
    /// Builds a record from already-known values.
    ///
    /// `file_name` and `extension` are derived from `path`.
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: DateTime<Local>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self {
            path,
            file_name,
            extension,
            size,
            modified,
            mime_type: None,
        }
    }

    /// Stats a single file.
    ///
    /// # Errors
    ///
    /// Returns an [`AccessError`] if the path cannot be stat'ed, is not a
    /// regular file, or the platform does not report modification times.
    pub fn from_path(path: &Path) -> Result<Self, AccessError> {
        let absolute = std::path::absolute(path).map_err(|e| AccessError::new(path, e))?;
        let metadata = fs::metadata(&absolute).map_err(|e| AccessError::new(&absolute, e))?;
        Self::from_metadata(absolute, &metadata)
    }

    fn from_metadata(path: PathBuf, metadata: &fs::Metadata) -> Result<Self, AccessError> {
        if !metadata.is_file() {
            return Err(AccessError::new(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        let modified = metadata
            .modified()
            .map_err(|e| AccessError::new(&path, e))?;

        Ok(Self::new(path, metadata.len(), DateTime::<Local>::from(modified)))
    }

    /// Attaches a sniffed MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// The file name without its final extension.
    pub fn stem(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() && !self.extension.is_empty() => stem,
            _ => &self.file_name,
        }
    }
}

/// Options controlling which files a scan yields.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Follow symbolic links to files and directories.
    pub follow_links: bool,
    /// Sniff the MIME type of each file from its header bytes.
    pub detect_mime: bool,
    /// Glob patterns matched against the file name; empty accepts everything.
    pub include: Vec<String>,
    /// Exclusion filters applied to the path relative to the scan root.
    pub filters: CompiledFilters,
    /// Directories whose contents are never yielded (e.g. the output root).
    pub skip_dirs: Vec<PathBuf>,
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            follow_links: false,
            detect_mime: false,
            include: Vec::new(),
            filters: CompiledFilters::default(),
            skip_dirs: Vec::new(),
            cancel_flag: None,
        }
    }
}

/// Records and errors gathered by [`Scanner::collect`].
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<FileRecord>,
    pub errors: Vec<AccessError>,
}

/// Walks a root directory and yields [`FileRecord`]s.
#[derive(Debug)]
pub struct Scanner {
    root: PathBuf,
    options: ScanOptions,
    include: Vec<Pattern>,
}

impl Scanner {
    /// Creates a scanner for `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidPattern`] if an include pattern is not a
    /// valid glob.
    pub fn new(root: impl Into<PathBuf>, options: ScanOptions) -> Result<Self, ScanError> {
        let include = options
            .include
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| ScanError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);

        Ok(Self {
            root,
            options,
            include,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a fresh walk. Each call is independent of previous ones.
    pub fn scan(&self) -> ScanIter<'_> {
        let mut walker = WalkDir::new(&self.root)
            .follow_links(self.options.follow_links)
            .sort_by_file_name();
        if !self.options.recursive {
            walker = walker.max_depth(1);
        }

        let skip_dirs = self
            .options
            .skip_dirs
            .iter()
            .filter_map(|dir| fs::canonicalize(dir).ok())
            .collect();

        ScanIter {
            scanner: self,
            walker: walker.into_iter(),
            visited: HashSet::new(),
            skip_dirs,
        }
    }

    /// Runs a full scan, separating readable records from access errors.
    pub fn collect(&self) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        for item in self.scan() {
            match item {
                Ok(record) => outcome.records.push(record),
                Err(error) => outcome.errors.push(error),
            }
        }
        debug!(
            root = %self.root.display(),
            records = outcome.records.len(),
            errors = outcome.errors.len(),
            "scan finished"
        );
        outcome
    }

    fn is_cancelled(&self) -> bool {
        self.options
            .cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().map(|name| name.to_string_lossy()) else {
            return false;
        };
        if file_name == HISTORY_FILE_NAME {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(&file_name)) {
            return false;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.options.filters.should_include(relative)
    }

    fn read_record(&self, entry: &walkdir::DirEntry) -> Result<FileRecord, AccessError> {
        let metadata = entry
            .metadata()
            .map_err(|e| AccessError::new(entry.path(), e.into()))?;
        let record = FileRecord::from_metadata(entry.path().to_path_buf(), &metadata)?;

        if !self.options.detect_mime {
            return Ok(record);
        }
        match infer::get_from_path(entry.path()) {
            Ok(Some(kind)) => Ok(record.with_mime_type(kind.mime_type())),
            Ok(None) => Ok(record),
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "MIME detection failed");
                Ok(record)
            }
        }
    }
}

/// Lazy iterator over one scan. Created by [`Scanner::scan`].
pub struct ScanIter<'a> {
    scanner: &'a Scanner,
    walker: walkdir::IntoIter,
    visited: HashSet<PathBuf>,
    skip_dirs: HashSet<PathBuf>,
}

impl ScanIter<'_> {
    /// Registers a directory, returning false if its contents must be skipped.
    ///
    /// The scan root itself is never skipped, so an output folder equal to
    /// the root still gets its files organized in place.
    fn enter_directory(&mut self, path: &Path, depth: usize) -> bool {
        let canonical = match fs::canonicalize(path) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot resolve directory, skipping");
                return false;
            }
        };
        if depth > 0 && self.skip_dirs.contains(&canonical) {
            debug!(path = %path.display(), "skipping excluded directory");
            return false;
        }
        if !self.visited.insert(canonical) {
            debug!(path = %path.display(), "directory already visited, skipping");
            return false;
        }
        true
    }
}

impl Iterator for ScanIter<'_> {
    type Item = Result<FileRecord, AccessError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.scanner.is_cancelled() {
                debug!("scan cancelled by caller");
                return None;
            }

            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.scanner.root.clone());
                    let error = AccessError::new(path, err.into());
                    warn!("{error}");
                    return Some(Err(error));
                }
            };

            if entry.file_type().is_dir() {
                if !self.enter_directory(entry.path(), entry.depth()) {
                    self.walker.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() || !self.scanner.accepts(entry.path()) {
                continue;
            }

            let record = self.scanner.read_record(&entry);
            if let Err(error) = &record {
                warn!("{error}");
            }
            return Some(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn names(outcome: &ScanOutcome) -> Vec<String> {
        let mut names: Vec<_> = outcome
            .records
            .iter()
            .map(|r| r.file_name.clone())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_record_derives_name_and_extension() {
        let modified = Local.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap();
        let record = FileRecord::new("/tmp/Holiday.Photo.JPG", 42, modified);

        assert_eq!(record.file_name, "Holiday.Photo.JPG");
        assert_eq!(record.extension, "jpg");
        assert_eq!(record.stem(), "Holiday.Photo");
    }

    #[test]
    fn test_record_without_extension() {
        let modified = Local.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap();
        let record = FileRecord::new("/tmp/.bashrc", 1, modified);

        assert_eq!(record.extension, "");
        assert_eq!(record.stem(), ".bashrc");
    }

    #[test]
    fn test_from_path_reports_missing_file() {
        let err = FileRecord::from_path(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_from_path_reads_size() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("notes.TXT");
        fs::write(&path, "hello").expect("Failed to write file");

        let record = FileRecord::from_path(&path).expect("record");
        assert_eq!(record.size, 5);
        assert_eq!(record.extension, "txt");
        assert!(record.path.is_absolute());
    }

    #[test]
    fn test_scan_recursive_and_flat() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::create_dir(root.join("nested")).unwrap();
        fs::write(root.join("nested").join("b.txt"), "b").unwrap();

        let recursive = Scanner::new(root, ScanOptions::default()).unwrap();
        assert_eq!(names(&recursive.collect()), vec!["a.txt", "b.txt"]);

        let flat = Scanner::new(
            root,
            ScanOptions {
                recursive: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(names(&flat.collect()), vec!["a.txt"]);
    }

    #[test]
    fn test_scan_is_restartable() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        fs::write(temp_dir.path().join("b.txt"), "b").unwrap();

        let scanner = Scanner::new(temp_dir.path(), ScanOptions::default()).unwrap();
        let mut first = scanner.scan();
        assert!(first.next().is_some());

        // A second scan starts over instead of resuming the first.
        assert_eq!(scanner.scan().count(), 2);
    }

    #[test]
    fn test_scan_include_patterns() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("a.jpg"), "a").unwrap();
        fs::write(temp_dir.path().join("b.txt"), "b").unwrap();

        let scanner = Scanner::new(
            temp_dir.path(),
            ScanOptions {
                include: vec!["*.jpg".to_string()],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(names(&scanner.collect()), vec!["a.jpg"]);
    }

    #[test]
    fn test_scan_rejects_invalid_include_pattern() {
        let result = Scanner::new(
            "/tmp",
            ScanOptions {
                include: vec!["[oops".to_string()],
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(ScanError::InvalidPattern { .. })));
    }

    #[test]
    fn test_scan_skips_hidden_files_and_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join(".hidden"), "x").unwrap();
        fs::write(temp_dir.path().join(HISTORY_FILE_NAME), "{}").unwrap();
        fs::write(temp_dir.path().join("visible.txt"), "x").unwrap();

        let scanner = Scanner::new(temp_dir.path(), ScanOptions::default()).unwrap();
        assert_eq!(names(&scanner.collect()), vec!["visible.txt"]);
    }

    #[test]
    fn test_scan_skips_output_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let output = temp_dir.path().join("Organized");
        fs::create_dir(&output).unwrap();
        fs::write(output.join("done.txt"), "x").unwrap();
        fs::write(temp_dir.path().join("todo.txt"), "x").unwrap();

        let scanner = Scanner::new(
            temp_dir.path(),
            ScanOptions {
                skip_dirs: vec![output],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(names(&scanner.collect()), vec!["todo.txt"]);
    }

    #[test]
    fn test_scan_detects_mime_type() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(
            temp_dir.path().join("image.bin"),
            [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0],
        )
        .unwrap();

        let scanner = Scanner::new(
            temp_dir.path(),
            ScanOptions {
                detect_mime: true,
                ..Default::default()
            },
        )
        .unwrap();
        let outcome = scanner.collect();
        assert_eq!(outcome.records[0].mime_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_scan_cancelled_before_start() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();

        let scanner = Scanner::new(
            temp_dir.path(),
            ScanOptions {
                cancel_flag: Some(Arc::new(AtomicBool::new(true))),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(scanner.scan().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_survives_symlink_cycle() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir(root.join("inner")).unwrap();
        fs::write(root.join("inner").join("file.txt"), "x").unwrap();
        std::os::unix::fs::symlink(root, root.join("inner").join("loop")).unwrap();

        let scanner = Scanner::new(
            root,
            ScanOptions {
                follow_links: true,
                ..Default::default()
            },
        )
        .unwrap();
        let outcome = scanner.collect();
        assert_eq!(names(&outcome), vec!["file.txt"]);
        assert!(outcome.errors.iter().all(|e| e.path.ends_with("loop")));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entry_does_not_hide_other_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("ok.txt"), "x").unwrap();
        std::os::unix::fs::symlink(root.join("gone.txt"), root.join("dangling.txt")).unwrap();

        let scanner = Scanner::new(
            root,
            ScanOptions {
                follow_links: true,
                ..Default::default()
            },
        )
        .unwrap();
        let outcome = scanner.collect();

        assert_eq!(names(&outcome), vec!["ok.txt"]);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].path.ends_with("dangling.txt"));
    }

    #[test]
    fn test_skip_dir_equal_to_root_is_still_scanned() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        fs::write(temp_dir.path().join("b.jpg"), "b").unwrap();

        let scanner = Scanner::new(
            temp_dir.path(),
            ScanOptions {
                skip_dirs: vec![temp_dir.path().to_path_buf()],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(names(&scanner.collect()), vec!["a.txt", "b.jpg"]);
    }
}
