/// Plan execution: copying or moving files to their planned destinations.
///
/// The executor re-validates every source right before touching it, creates
/// destination folders as needed, applies the configured conflict policy and
/// reports one [`ExecutionResult`] per operation, in plan order. A failure on
/// one file never stops the batch.
use crate::planner::{OperationKind, PlanRejection, PlannedOperation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// What to do when a destination already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Replace the existing file.
    Overwrite,
    /// Leave both files alone and report the conflict.
    #[default]
    Skip,
    /// Write to `name (1).ext`, `name (2).ext`, ... instead.
    Rename,
}

/// Filesystem primitives used by the [`Executor`].
///
/// The default methods use `std::fs`; implementors override individual
/// calls to redirect or fail them.
pub trait FileOps: Send + Sync {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn same_file(&self, a: &Path, b: &Path) -> bool {
        match (fs::canonicalize(a), fs::canonicalize(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    /// Copies contents and permissions, then carries over the modification time.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let bytes = fs::copy(from, to)?;
        let preserved = fs::metadata(from)
            .and_then(|m| m.modified())
            .and_then(|modified| {
                fs::File::options()
                    .write(true)
                    .open(to)
                    .and_then(|file| file.set_modified(modified))
            });
        if let Err(e) = preserved {
            debug!(path = %to.display(), error = %e, "could not preserve modification time");
        }
        Ok(bytes)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// [`FileOps`] backed directly by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileOps;

impl FileOps for StdFileOps {}

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Overrides every operation's own kind when set.
    pub mode: Option<OperationKind>,
    pub conflict: ConflictPolicy,
    /// Checked between operations; completed operations are never rolled back.
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    SkippedConflict,
    SkippedMissingSource,
    Failed,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::SkippedConflict => "skipped (conflict)",
            Outcome::SkippedMissingSource => "skipped (missing source)",
            Outcome::Failed => "failed",
        }
    }
}

/// The result of executing one [`PlannedOperation`].
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub operation: PlannedOperation,
    /// The kind actually performed, after applying the executor's mode.
    pub kind: OperationKind,
    pub outcome: Outcome,
    /// Where the file was written; differs from the planned destination
    /// when it was auto-renamed.
    pub final_path: Option<PathBuf>,
    /// Human-readable reason for skipped and failed operations.
    pub detail: Option<String>,
}

impl ExecutionResult {
    fn new(operation: &PlannedOperation, kind: OperationKind, outcome: Outcome) -> Self {
        Self {
            operation: operation.clone(),
            kind,
            outcome,
            final_path: None,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn with_final_path(mut self, path: PathBuf) -> Self {
        self.final_path = Some(path);
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }
}

/// Results of a batch, in plan order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub results: Vec<ExecutionResult>,
    /// Set when the batch stopped early; `results` covers the executed prefix.
    pub cancelled: bool,
    /// Files left out of the plan; they count as skipped.
    pub rejected: Vec<PlanRejection>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    /// Skipped and failed operations, each with a reason.
    pub fn problems(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Skipped operations plus rejected files.
    pub fn skipped(&self) -> usize {
        self.count(Outcome::SkippedConflict)
            + self.count(Outcome::SkippedMissingSource)
            + self.rejected.len()
    }

    pub fn is_complete_success(&self) -> bool {
        !self.cancelled && self.rejected.is_empty() && self.problems().next().is_none()
    }
}

/// Carries out planned operations.
pub struct Executor<F: FileOps = StdFileOps> {
    ops: F,
    options: ExecuteOptions,
    dir_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl Executor<StdFileOps> {
    pub fn new(options: ExecuteOptions) -> Self {
        Self::with_file_ops(StdFileOps, options)
    }
}

impl<F: FileOps> Executor<F> {
    pub fn with_file_ops(ops: F, options: ExecuteOptions) -> Self {
        Self {
            ops,
            options,
            dir_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    pub fn execute(&self, plan: &[PlannedOperation]) -> ExecutionReport {
        self.execute_with_progress(plan, |_, _| {})
    }

    /// Executes sequentially, calling `on_result` after each operation with
    /// its index in the plan.
    pub fn execute_with_progress<P>(
        &self,
        plan: &[PlannedOperation],
        mut on_result: P,
    ) -> ExecutionReport
    where
        P: FnMut(usize, &ExecutionResult),
    {
        info!(
            operations = plan.len(),
            mode = ?self.options.mode,
            conflict = ?self.options.conflict,
            "executing plan"
        );

        let mut report = ExecutionReport::default();
        for (index, operation) in plan.iter().enumerate() {
            if self.is_cancelled() {
                info!(completed = index, remaining = plan.len() - index, "execution cancelled");
                report.cancelled = true;
                break;
            }

            let result = self.execute_one(operation);
            match result.outcome {
                Outcome::Succeeded => debug!(
                    source = %operation.source.path.display(),
                    destination = ?result.final_path,
                    "{}", result.kind
                ),
                _ => warn!(
                    source = %operation.source.path.display(),
                    outcome = result.outcome.label(),
                    detail = result.detail.as_deref().unwrap_or_default(),
                    "operation not completed"
                ),
            }
            on_result(index, &result);
            report.results.push(result);
        }
        report
    }

    /// Executes one operation.
    pub fn execute_one(&self, operation: &PlannedOperation) -> ExecutionResult {
        let kind = self.options.mode.unwrap_or(operation.kind);
        let source = operation.source.path.as_path();
        let destination = operation.destination.as_path();

        if !self.ops.is_file(source) {
            return ExecutionResult::new(operation, kind, Outcome::SkippedMissingSource)
                .with_detail(format!("source {} no longer exists", source.display()));
        }

        let Some(dir) = destination.parent() else {
            return ExecutionResult::new(operation, kind, Outcome::Failed).with_detail(format!(
                "destination {} has no parent directory",
                destination.display()
            ));
        };
        if let Err(e) = self.ops.create_dir_all(dir) {
            return ExecutionResult::new(operation, kind, Outcome::Failed)
                .with_detail(format!("cannot create directory {}: {}", dir.display(), e));
        }

        // Suffix allocation and the transfer itself must not interleave with
        // another operation targeting the same directory.
        let lock = self.dir_lock(dir);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.ops.same_file(source, destination) {
            return ExecutionResult::new(operation, kind, Outcome::SkippedConflict)
                .with_detail(format!("{} is already in place", source.display()));
        }

        let target = if !self.ops.exists(destination) {
            destination.to_path_buf()
        } else {
            match self.options.conflict {
                ConflictPolicy::Skip => {
                    return ExecutionResult::new(operation, kind, Outcome::SkippedConflict)
                        .with_detail(format!("{} already exists", destination.display()));
                }
                ConflictPolicy::Overwrite => destination.to_path_buf(),
                ConflictPolicy::Rename => self.next_free_name(destination),
            }
        };

        match self.transfer(kind, source, &target) {
            Ok(()) => ExecutionResult::new(operation, kind, Outcome::Succeeded)
                .with_final_path(target),
            Err(detail) => ExecutionResult::new(operation, kind, Outcome::Failed)
                .with_detail(detail),
        }
    }

    fn transfer(&self, kind: OperationKind, source: &Path, target: &Path) -> Result<(), String> {
        match kind {
            OperationKind::Copy => self.ops.copy(source, target).map(|_| ()).map_err(|e| {
                format!(
                    "failed to copy {} to {}: {}",
                    source.display(),
                    target.display(),
                    e
                )
            }),
            OperationKind::Move => self.move_file(source, target),
        }
    }

    /// Renames when possible, otherwise copies and removes the source. The
    /// move only counts as done once the source is confirmed gone.
    fn move_file(&self, source: &Path, target: &Path) -> Result<(), String> {
        if let Err(rename_err) = self.ops.rename(source, target) {
            debug!(
                source = %source.display(),
                error = %rename_err,
                "rename failed, falling back to copy and remove"
            );
            self.ops.copy(source, target).map_err(|e| {
                format!(
                    "failed to move {} to {}: rename: {}; copy: {}",
                    source.display(),
                    target.display(),
                    rename_err,
                    e
                )
            })?;
            if let Err(e) = self.ops.remove_file(source) {
                return Err(duplicate_detail(source, target, &e.to_string()));
            }
        }

        if self.ops.exists(source) {
            return Err(duplicate_detail(source, target, "source still present after move"));
        }
        Ok(())
    }

    fn next_free_name(&self, destination: &Path) -> PathBuf {
        let stem = destination
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = destination
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut n: u64 = 1;
        loop {
            let candidate = destination.with_file_name(format!("{stem} ({n}){extension}"));
            if !self.ops.exists(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn dir_lock(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.dir_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(dir.to_path_buf()).or_default().clone()
    }

    fn is_cancelled(&self) -> bool {
        self.options
            .cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

fn duplicate_detail(source: &Path, target: &Path, reason: &str) -> String {
    format!(
        "copied to {} but could not remove the source {} ({}); the file now exists at both locations",
        target.display(),
        source.display(),
        reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::FileRecord;
    use std::fs;
    use tempfile::TempDir;

    fn planned(source: &Path, destination: PathBuf, kind: OperationKind) -> PlannedOperation {
        let record = FileRecord::from_path(source).expect("source record");
        PlannedOperation {
            relative: PathBuf::from(destination.file_name().unwrap()),
            source: record,
            rule: "test".to_string(),
            destination,
            kind,
        }
    }

    #[test]
    fn test_copy_creates_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "data").unwrap();
        let destination = temp_dir.path().join("out/2023/05/a.txt");

        let report = Executor::new(ExecuteOptions::default())
            .execute(&[planned(&source, destination.clone(), OperationKind::Copy)]);

        assert!(report.is_complete_success());
        assert_eq!(report.results[0].final_path.as_deref(), Some(destination.as_path()));
        assert_eq!(fs::read_to_string(&destination).unwrap(), "data");
        assert!(source.exists());
    }

    #[test]
    fn test_default_policy_skips_existing_destination() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "new").unwrap();
        let destination = temp_dir.path().join("out/a.txt");
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&destination, "old").unwrap();

        let report = Executor::new(ExecuteOptions::default())
            .execute(&[planned(&source, destination.clone(), OperationKind::Move)]);

        assert_eq!(report.results[0].outcome, Outcome::SkippedConflict);
        assert!(report.results[0].detail.as_ref().unwrap().contains("already exists"));
        assert_eq!(fs::read_to_string(&destination).unwrap(), "old");
        assert!(source.exists());
    }

    #[test]
    fn test_overwrite_policy_replaces_destination() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "new").unwrap();
        let destination = temp_dir.path().join("a-copy.txt");
        fs::write(&destination, "old").unwrap();

        let executor = Executor::new(ExecuteOptions {
            conflict: ConflictPolicy::Overwrite,
            ..Default::default()
        });
        let report = executor.execute(&[planned(&source, destination.clone(), OperationKind::Copy)]);

        assert!(report.is_complete_success());
        assert_eq!(fs::read_to_string(&destination).unwrap(), "new");
    }

    #[test]
    fn test_rename_policy_allocates_distinct_names() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir(temp_dir.path().join("x")).unwrap();
        fs::create_dir(temp_dir.path().join("y")).unwrap();
        let first = temp_dir.path().join("x/report.pdf");
        let second = temp_dir.path().join("y/report.pdf");
        fs::write(&first, "one").unwrap();
        fs::write(&second, "two").unwrap();
        let destination = temp_dir.path().join("out/report.pdf");

        let executor = Executor::new(ExecuteOptions {
            conflict: ConflictPolicy::Rename,
            ..Default::default()
        });
        let report = executor.execute(&[
            planned(&first, destination.clone(), OperationKind::Copy),
            planned(&second, destination.clone(), OperationKind::Copy),
        ]);

        assert!(report.is_complete_success());
        let renamed = temp_dir.path().join("out/report (1).pdf");
        assert_eq!(report.results[1].final_path.as_deref(), Some(renamed.as_path()));
        assert_eq!(fs::read_to_string(&destination).unwrap(), "one");
        assert_eq!(fs::read_to_string(&renamed).unwrap(), "two");
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("gone.txt");
        fs::write(&source, "x").unwrap();
        let op = planned(&source, temp_dir.path().join("out/gone.txt"), OperationKind::Move);
        fs::remove_file(&source).unwrap();

        let report = Executor::new(ExecuteOptions::default()).execute(&[op]);
        assert_eq!(report.results[0].outcome, Outcome::SkippedMissingSource);
        assert!(!temp_dir.path().join("out").exists());
    }

    #[test]
    fn test_move_removes_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "data").unwrap();
        let destination = temp_dir.path().join("out/a.txt");

        let report = Executor::new(ExecuteOptions::default())
            .execute(&[planned(&source, destination.clone(), OperationKind::Move)]);

        assert!(report.is_complete_success());
        assert!(!source.exists());
        assert!(destination.exists());
    }

    #[test]
    fn test_global_mode_overrides_operation_kind() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "data").unwrap();

        let executor = Executor::new(ExecuteOptions {
            mode: Some(OperationKind::Copy),
            ..Default::default()
        });
        let report = executor.execute(&[planned(
            &source,
            temp_dir.path().join("out/a.txt"),
            OperationKind::Move,
        )]);

        assert_eq!(report.results[0].kind, OperationKind::Copy);
        assert!(source.exists());
    }

    #[test]
    fn test_same_file_is_not_overwritten() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "keep me").unwrap();

        let executor = Executor::new(ExecuteOptions {
            conflict: ConflictPolicy::Overwrite,
            ..Default::default()
        });
        let report = executor.execute(&[planned(&source, source.clone(), OperationKind::Copy)]);

        assert_eq!(report.results[0].outcome, Outcome::SkippedConflict);
        assert_eq!(fs::read_to_string(&source).unwrap(), "keep me");
    }

    /// Forces the copy-and-remove path and refuses to delete sources.
    struct StickySource;

    impl FileOps for StickySource {
        fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
            Err(io::Error::other("cross-device link"))
        }

        fn remove_file(&self, _path: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only source"))
        }
    }

    #[test]
    fn test_move_reports_duplicate_when_source_removal_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "data").unwrap();
        let destination = temp_dir.path().join("out/a.txt");

        let executor = Executor::with_file_ops(StickySource, ExecuteOptions::default());
        let report = executor.execute(&[planned(&source, destination.clone(), OperationKind::Move)]);

        let result = &report.results[0];
        assert_eq!(result.outcome, Outcome::Failed);
        let detail = result.detail.as_deref().unwrap();
        assert!(detail.contains(&source.display().to_string()));
        assert!(detail.contains(&destination.display().to_string()));
        assert!(detail.contains("both locations"));
        assert!(source.exists());
        assert!(destination.exists());
    }

    #[test]
    fn test_cancellation_reports_executed_prefix() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let cancel = Arc::new(AtomicBool::new(false));
        let executor = Executor::new(ExecuteOptions {
            cancel_flag: Some(cancel.clone()),
            ..Default::default()
        });
        let plan = [
            planned(&a, temp_dir.path().join("out/a.txt"), OperationKind::Copy),
            planned(&b, temp_dir.path().join("out/b.txt"), OperationKind::Copy),
        ];
        let report = executor.execute_with_progress(&plan, |_, _| cancel.store(true, Ordering::Relaxed));

        assert!(report.cancelled);
        assert_eq!(report.results.len(), 1);
        assert!(temp_dir.path().join("out/a.txt").exists());
        assert!(!temp_dir.path().join("out/b.txt").exists());
    }

    #[test]
    fn test_rejected_files_count_as_skipped() {
        let error = crate::planner::PlanError::PathEscape {
            path: PathBuf::from("/in/evil.bin"),
            rendered: "bin/../../secret".to_string(),
        };
        let report = ExecutionReport {
            rejected: vec![PlanRejection {
                index: 0,
                source: PathBuf::from("/in/evil.bin"),
                rule: "bin".to_string(),
                reason: error.to_string(),
                error,
            }],
            ..Default::default()
        };

        assert_eq!(report.skipped(), 1);
        assert!(!report.is_complete_success());
    }
}
