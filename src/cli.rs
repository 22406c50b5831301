//! Command orchestration for the `smartorg` binary.
//!
//! Argument parsing lives in `main.rs`; this module turns a parsed
//! [`Command`] into a scan → plan → execute pipeline.

use crate::config::{CompiledSettings, Settings};
use crate::executor::{ConflictPolicy, ExecuteOptions, ExecutionReport, Executor, Outcome};
use crate::output::OutputFormatter;
use crate::planner::{OperationKind, Plan, PlanOptions, Planner};
use crate::scan::{AccessError, ScanOptions, Scanner};
use crate::undo::{OperationLog, UndoManager};
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default output folder name, created inside the scanned root.
pub const DEFAULT_OUTPUT_DIR: &str = "Organized";

/// Arguments shared by `preview` and `organize`.
#[derive(Debug, Clone)]
pub struct PlanArgs {
    pub root: PathBuf,
    pub profile: String,
    /// Defaults to `<root>/Organized`.
    pub output: Option<PathBuf>,
    /// Overrides `organizer.recursive` when set.
    pub recursive: Option<bool>,
}

impl PlanArgs {
    pub fn output_root(&self) -> PathBuf {
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| self.root.join(DEFAULT_OUTPUT_DIR));
        std::path::absolute(&output).unwrap_or(output)
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    Preview {
        args: PlanArgs,
        json: bool,
    },
    Organize {
        args: PlanArgs,
        mode: Option<OperationKind>,
        conflict: Option<ConflictPolicy>,
    },
    Undo {
        output: PathBuf,
    },
    Profiles,
    Tags,
    Migrate {
        legacy: PathBuf,
        write: Option<PathBuf>,
    },
}

/// How a command that did not error out finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// At least one file operation failed; the report lists which.
    PartialFailure,
}

/// Runs one command with settings looked up from `config_path` or the
/// default locations.
pub fn run(command: Command, config_path: Option<&Path>) -> Result<RunStatus> {
    match command {
        Command::Preview { args, json } => {
            let settings = load_settings(config_path)?;
            let (plan, errors) = build_plan(&settings, &args)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&plan).context("failed to serialize plan")?
                );
            } else {
                OutputFormatter::dry_run_notice(&format!(
                    "Organizing {} into {}",
                    args.root.display(),
                    plan.output_root.display()
                ));
                for error in &errors {
                    OutputFormatter::warning(&error.to_string());
                }
                OutputFormatter::preview(&plan, &args.root);
                OutputFormatter::summary_table(&plan.summary(), plan.len());
                for path in plan.shared_destinations() {
                    OutputFormatter::warning(&format!(
                        "Several files are planned for {}",
                        path.display()
                    ));
                }
            }
            Ok(RunStatus::Completed)
        }
        Command::Organize {
            args,
            mode,
            conflict,
        } => {
            let settings = load_settings(config_path)?;
            let options = ExecuteOptions {
                mode: Some(mode.unwrap_or(settings.organizer.operation)),
                conflict: conflict.unwrap_or(settings.organizer.conflict),
                cancel_flag: None,
            };
            let report = organize(&settings, &args, options)?;
            OutputFormatter::execution_report(&report);
            if report.succeeded().next().is_some() {
                OutputFormatter::info(&format!(
                    "History saved. Use 'smartorg undo {}' to revert changes.",
                    args.output_root().display()
                ));
            }
            if report.count(Outcome::Failed) > 0 {
                Ok(RunStatus::PartialFailure)
            } else {
                Ok(RunStatus::Completed)
            }
        }
        Command::Undo { output } => {
            OutputFormatter::info("Undoing previous organization...");
            let report = UndoManager::undo(&output)
                .with_context(|| format!("cannot undo organization in {}", output.display()))?;
            OutputFormatter::undo_report(&report);
            if report.failed_restores.is_empty() {
                Ok(RunStatus::Completed)
            } else {
                Ok(RunStatus::PartialFailure)
            }
        }
        Command::Profiles => {
            let settings = load_settings(config_path)?;
            OutputFormatter::profiles(&settings.profiles);
            Ok(RunStatus::Completed)
        }
        Command::Tags => {
            OutputFormatter::tags();
            Ok(RunStatus::Completed)
        }
        Command::Migrate { legacy, write } => {
            migrate(&legacy, write.as_deref())?;
            Ok(RunStatus::Completed)
        }
    }
}

/// Loads and validates settings; any profile defect aborts here.
pub fn load_settings(config_path: Option<&Path>) -> Result<CompiledSettings> {
    let settings = Settings::load(config_path).context("error loading configuration")?;
    settings.compile().context("invalid configuration")
}

/// Scans `args.root` and plans it with the selected profile.
///
/// Files that cannot be read are left out of the plan and returned alongside it.
pub fn build_plan(
    settings: &CompiledSettings,
    args: &PlanArgs,
) -> Result<(Plan, Vec<AccessError>)> {
    if !args.root.is_dir() {
        bail!("{} is not a directory", args.root.display());
    }
    let profile = settings.profile(&args.profile)?;
    let output_root = args.output_root();

    let scanner = Scanner::new(
        &args.root,
        ScanOptions {
            recursive: args.recursive.unwrap_or(settings.organizer.recursive),
            detect_mime: settings.organizer.detect_mime,
            filters: settings.filters.clone(),
            skip_dirs: vec![output_root.clone()],
            ..Default::default()
        },
    )?;
    let outcome = scanner.collect();

    let planner = Planner::new(
        profile,
        &settings.tiers,
        PlanOptions {
            output_root,
            operation: settings.organizer.operation,
        },
    );
    Ok((planner.plan(&outcome.records), outcome.errors))
}

/// Plans and executes, then appends successful transfers to the journal.
///
/// Files the plan rejected are carried into the report as skipped.
pub fn organize(
    settings: &CompiledSettings,
    args: &PlanArgs,
    options: ExecuteOptions,
) -> Result<ExecutionReport> {
    let (plan, errors) = build_plan(settings, args)?;
    for error in &errors {
        OutputFormatter::warning(&error.to_string());
    }
    if plan.is_empty() {
        if plan.rejected.is_empty() {
            OutputFormatter::plain("No files found to organize.");
        }
        return Ok(ExecutionReport {
            rejected: plan.rejected,
            ..Default::default()
        });
    }

    let executor = Executor::new(options);
    let pb = OutputFormatter::create_progress_bar(plan.len() as u64);
    let mut report = executor.execute_with_progress(&plan.operations, |_, result| {
        pb.set_message(result.operation.source.file_name.clone());
        pb.inc(1);
    });
    pb.finish_and_clear();
    report.rejected = plan.rejected;

    if report.succeeded().next().is_some() {
        fs::create_dir_all(&plan.output_root)
            .with_context(|| format!("cannot create {}", plan.output_root.display()))?;
        let mut log = OperationLog::load(&plan.output_root)?
            .unwrap_or_else(|| OperationLog::new(&plan.output_root));
        log.record(&report);
        log.save()?;
        info!(entries = log.operations.len(), "history updated");
    }
    Ok(report)
}

/// Converts a legacy preset file; prints the TOML unless `write` is given.
pub fn migrate(legacy: &Path, write: Option<&Path>) -> Result<()> {
    let settings = Settings::load_from_file(legacy)
        .with_context(|| format!("cannot migrate {}", legacy.display()))?;
    settings
        .compile()
        .context("migrated presets are not valid")?;
    let text = settings.to_toml_string()?;

    match write {
        Some(path) => {
            if path.exists() {
                bail!("{} already exists; refusing to overwrite it", path.display());
            }
            fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))?;
            OutputFormatter::success(&format!(
                "Migrated {} profile(s) to {}",
                settings.profiles.len(),
                path.display()
            ));
        }
        None => print!("{text}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_root_is_inside_root() {
        let args = PlanArgs {
            root: PathBuf::from("/data/photos"),
            profile: "photos".to_string(),
            output: None,
            recursive: None,
        };
        assert_eq!(args.output_root(), PathBuf::from("/data/photos/Organized"));
    }

    #[test]
    fn test_build_plan_rejects_missing_root() {
        let settings = Settings::default().compile().unwrap();
        let args = PlanArgs {
            root: PathBuf::from("/definitely/not/here"),
            profile: "photos".to_string(),
            output: None,
            recursive: None,
        };
        assert!(build_plan(&settings, &args).is_err());
    }
}
